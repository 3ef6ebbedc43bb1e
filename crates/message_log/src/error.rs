use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("header mismatch: expected {expected:#x}, found {found:#x}")]
    HeaderMismatch { expected: u64, found: u64 },

    #[error("encoded frame of {len} bytes exceeds u32 length prefix limit")]
    FrameTooLarge { len: usize },
}
