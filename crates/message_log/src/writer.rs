//! Append-only compressed message log writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use concurrency::TaskQueue;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::instrument;

use crate::error::MessageLogError;
use crate::DEFAULT_MAGIC_HEADER;

/// Writes length-prefixed, JSON-encoded records to a gzip-compressed file.
///
/// Every [`write`](Self::write) call is enqueued onto an internal
/// [`TaskQueue`] and returns immediately; use [`num_pending`](Self::num_pending)
/// to observe backpressure. Dropping the writer drains the queue before
/// closing the underlying file, so no write is lost.
pub struct MessageLogWriter {
    encoder: std::sync::Arc<Mutex<GzEncoder<File>>>,
    queue: TaskQueue,
}

impl MessageLogWriter {
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>) -> Result<Self, MessageLogError> {
        Self::create_with_header(path, DEFAULT_MAGIC_HEADER)
    }

    pub fn create_with_header(
        path: impl AsRef<Path>,
        magic_header: u64,
    ) -> Result<Self, MessageLogError> {
        let file = File::create(path.as_ref())?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&magic_header.to_le_bytes())?;

        Ok(Self {
            encoder: std::sync::Arc::new(Mutex::new(encoder)),
            queue: TaskQueue::new(),
        })
    }

    /// Enqueues `value` to be serialized and appended. Returns immediately.
    pub fn write<T>(&self, value: T)
    where
        T: Serialize + Send + 'static,
    {
        let encoder = self.encoder.clone();
        self.queue.add(move || {
            if let Err(err) = append_frame(&encoder, &value) {
                tracing::error!(error = %err, "message log write failed");
            }
        });
    }

    /// Number of writes still queued (and not yet flushed to disk).
    pub fn num_pending(&self) -> usize {
        self.queue.num_pending()
    }
}

fn append_frame<T: Serialize>(
    encoder: &std::sync::Arc<Mutex<GzEncoder<File>>>,
    value: &T,
) -> Result<(), MessageLogError> {
    let payload = serde_json::to_vec(value)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| MessageLogError::FrameTooLarge { len: payload.len() })?;

    let mut encoder = encoder.lock().unwrap();
    encoder.write_all(&len.to_le_bytes())?;
    encoder.write_all(&payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MessageLogReader;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: u32,
        note: String,
    }

    #[test]
    fn writes_are_readable_back_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("observations.log");

        let writer = MessageLogWriter::create(&path).unwrap();
        writer.write(Sample {
            id: 1,
            note: "init".into(),
        });
        writer.write(Sample {
            id: 2,
            note: "second".into(),
        });
        drop(writer);

        let mut reader = MessageLogReader::open(&path).unwrap();
        let first: Sample = reader.read().unwrap();
        let second: Sample = reader.read().unwrap();
        assert_eq!(first, Sample { id: 1, note: "init".into() });
        assert_eq!(second, Sample { id: 2, note: "second".into() });
        assert!(reader.read::<Sample>().is_none());
    }

    #[test]
    fn drop_flushes_pending_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flush.log");

        let writer = MessageLogWriter::create(&path).unwrap();
        for i in 0..20 {
            writer.write(Sample {
                id: i,
                note: format!("entry-{i}"),
            });
        }
        drop(writer);

        let mut reader = MessageLogReader::open(&path).unwrap();
        let mut count = 0;
        while reader.read::<Sample>().is_some() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
