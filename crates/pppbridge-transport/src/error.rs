use std::path::PathBuf;

/// Errors from the serial, packet-socket and chatscript plumbing.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open or configure the serial device.
    #[error("failed to open modem on {path}: {source}")]
    SerialOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested baud rate has no termios constant.
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),

    /// Failed to create or bind the raw packet socket.
    #[error("failed to open packet socket on {interface}: {source}")]
    PacketBind {
        interface: String,
        source: std::io::Error,
    },

    /// The named interface does not exist or has no hardware address.
    #[error("failed to query interface {interface}: {source}")]
    InterfaceQuery {
        interface: String,
        source: std::io::Error,
    },

    /// Failed to spawn the chat program.
    #[error("failed to run {program}: {source}")]
    ChatSpawn {
        program: String,
        source: std::io::Error,
    },

    /// The chatscript ran but did not reach its success branch.
    #[error("chatscript failed with {status}")]
    ChatFailed { status: std::process::ExitStatus },

    /// An I/O error on an open transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
