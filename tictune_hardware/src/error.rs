use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link timeout")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
    #[error("device rejected command 0x{0:02X}")]
    Rejected(u8),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("serial: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
