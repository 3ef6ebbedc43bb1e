//! Triple-slot single-producer/single-consumer handoff buffer.
//!
//! Writers never block: a write either lands in a free slot or is silently
//! dropped if none is free. A reader always sees the most recently written
//! value that has not already been read.

use std::sync::{Condvar, Mutex};

const NUM_SLOTS: usize = 3;

struct Indices {
    newest: Option<usize>,
    reading: Option<usize>,
    writing: Option<usize>,
}

/// A 3-slot overwriting buffer for `T`.
///
/// Construct one `T` value up front per slot; `read`/`write` give callers a
/// reference into a slot rather than handing out owned values, matching the
/// reference implementation's in-place reader/writer closures.
pub struct OverwritingBuffer<T> {
    slots: Box<[Mutex<T>; NUM_SLOTS]>,
    indices: Mutex<Indices>,
    ready: Condvar,
}

impl<T> OverwritingBuffer<T>
where
    T: Default,
{
    pub fn new() -> Self {
        Self {
            slots: Box::new([
                Mutex::new(T::default()),
                Mutex::new(T::default()),
                Mutex::new(T::default()),
            ]),
            indices: Mutex::new(Indices {
                newest: None,
                reading: None,
                writing: None,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T> Default for OverwritingBuffer<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OverwritingBuffer<T> {
    /// Blocks until a fresh value is available, then invokes `reader` with
    /// it. Only one reader may be in flight at a time.
    pub fn read<R>(&self, reader: impl FnOnce(&T) -> R) -> R {
        let mut guard = self.indices.lock().unwrap();
        guard = self
            .ready
            .wait_while(guard, |idx| idx.newest.is_none() || idx.reading.is_some())
            .unwrap();

        let slot = guard.newest.take().unwrap();
        guard.reading = Some(slot);
        drop(guard);

        let result = reader(&self.slots[slot].lock().unwrap());

        let mut guard = self.indices.lock().unwrap();
        guard.reading = None;
        result
    }

    /// Invokes `writer` with a free slot and publishes it as the newest
    /// value. If no slot is free (never the case with one reader and one
    /// writer) the write is dropped.
    pub fn write(&self, writer: impl FnOnce(&mut T)) {
        let mut guard = self.indices.lock().unwrap();
        let free = (0..NUM_SLOTS).find(|i| {
            Some(*i) != guard.newest && Some(*i) != guard.reading && Some(*i) != guard.writing
        });
        let Some(slot) = free else { return };
        guard.writing = Some(slot);
        drop(guard);

        writer(&mut self.slots[slot].lock().unwrap());

        let mut guard = self.indices.lock().unwrap();
        guard.newest = Some(slot);
        guard.writing = None;
        drop(guard);
        self.ready.notify_one();
    }
}
