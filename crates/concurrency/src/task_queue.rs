//! Single-worker FIFO task queue.
//!
//! Every enqueued closure runs, in order, on one dedicated background
//! thread. Used anywhere work must be serialized off a hot path: message
//! log writes, SLAM adapter calls, and the server's low-priority deletion
//! queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    work_available: Condvar,
    running: AtomicBool,
}

pub struct TaskQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    finished: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            work_available: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("whisker-task-queue".into())
            .spawn(move || process_tasks(worker_shared))
            .expect("failed to spawn task queue worker thread");

        Self {
            shared,
            worker: Some(worker),
            finished: AtomicBool::new(false),
        }
    }

    /// Enqueues `task` to run on the worker thread.
    pub fn add(&self, task: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Box::new(task));
        drop(queue);
        self.shared.work_available.notify_one();
    }

    pub fn num_pending(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Stops accepting conceptual new work, drains whatever is queued, and
    /// joins the worker thread. Safe to call more than once.
    pub fn finish_sync(&mut self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = self.num_pending();
        if pending > 1 {
            tracing::warn!(pending, "finishing task queue with work still pending");
        }
        self.shared.running.store(false, Ordering::Release);
        self.shared.work_available.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.finish_sync();
    }
}

fn process_tasks(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        queue = shared
            .work_available
            .wait_while(queue, |q| q.is_empty() && shared.running.load(Ordering::Acquire))
            .unwrap();

        let Some(task) = queue.pop_front() else {
            // queue empty and running == false: nothing left to drain.
            return;
        };
        drop(queue);
        task();
    }
}
