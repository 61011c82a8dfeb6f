// error.rs — error taxonomy for the wire codec and server loop

use std::fmt;

/// A failure while decoding, encoding, or dispatching on the wire.
#[derive(Debug, Clone)]
pub enum NetError {
    /// Malformed input at the bit/byte layer: bad magic, short buffer,
    /// out-of-bounds seek, varint overflow, unknown message id.
    Decode(String),
    /// A sequenced packet's CRC did not match its payload.
    ChecksumMismatch,
    /// Valid-looking input this core refuses to process.
    Unsupported(String),
    /// An out-of-order state transition (e.g. Connect before GetChallenge).
    Protocol(String),
    /// UDP send/receive failure.
    Io(String),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Decode(msg) => write!(f, "decode error: {}", msg),
            NetError::ChecksumMismatch => write!(f, "checksum does not match data"),
            NetError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            NetError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            NetError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for NetError {}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        NetError::Io(err.to_string())
    }
}

pub type NetResult<T> = Result<T, NetError>;
