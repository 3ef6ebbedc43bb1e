//! Sequential reader for logs written by [`crate::MessageLogWriter`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;

use crate::error::MessageLogError;
use crate::DEFAULT_MAGIC_HEADER;

/// Wraps a `Read` and counts bytes pulled through it, so callers can
/// report progress through the compressed file even though the decoder
/// in front of it only exposes decompressed bytes.
#[derive(Debug)]
struct CountingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

#[derive(Debug)]
pub struct MessageLogReader {
    decoder: GzDecoder<CountingReader<File>>,
    file_len: u64,
}

impl MessageLogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MessageLogError> {
        Self::open_with_header(path, DEFAULT_MAGIC_HEADER)
    }

    pub fn open_with_header(
        path: impl AsRef<Path>,
        magic_header: u64,
    ) -> Result<Self, MessageLogError> {
        let file = File::open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        let mut decoder = GzDecoder::new(CountingReader {
            inner: file,
            bytes_read: 0,
        });

        let mut header_bytes = [0u8; 8];
        decoder.read_exact(&mut header_bytes)?;
        let found = u64::from_le_bytes(header_bytes);
        if found != magic_header {
            return Err(MessageLogError::HeaderMismatch {
                expected: magic_header,
                found,
            });
        }

        Ok(Self { decoder, file_len })
    }

    /// Reads the next record, or `None` on clean end-of-stream or any
    /// truncation.
    pub fn read<T: DeserializeOwned>(&mut self) -> Option<T> {
        let mut len_bytes = [0u8; 4];
        self.decoder.read_exact(&mut len_bytes).ok()?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; len];
        self.decoder.read_exact(&mut payload).ok()?;

        serde_json::from_slice(&payload).ok()
    }

    /// Fraction of the underlying compressed file consumed so far, in
    /// `0.0..=1.0`.
    pub fn read_percent(&self) -> f32 {
        if self.file_len == 0 {
            return 1.0;
        }
        let consumed = self.decoder.get_ref().bytes_read;
        (consumed as f32 / self.file_len as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MessageLogWriter;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: i32,
    }

    #[test]
    fn rejects_mismatched_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.log");
        let writer = MessageLogWriter::create_with_header(&path, 0xDEADBEEF).unwrap();
        drop(writer);

        let err = MessageLogReader::open(&path).unwrap_err();
        assert!(matches!(err, MessageLogError::HeaderMismatch { .. }));
    }

    #[test]
    fn empty_log_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.log");
        let writer = MessageLogWriter::create(&path).unwrap();
        drop(writer);

        let mut reader = MessageLogReader::open(&path).unwrap();
        assert!(reader.read::<Sample>().is_none());
    }
}
