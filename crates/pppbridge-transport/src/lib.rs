//! Host I/O for the bridge: the serial modem, the raw Ethernet sockets and
//! the chatscript runner.
//!
//! Everything here is thin, synchronous plumbing over `libc`. The framing
//! and protocol logic live in `pppbridge-frame` and `pppbridge-pppoe`;
//! this crate only moves bytes. Linux-only: PPPoE needs `AF_PACKET`.

pub mod chat;
pub mod error;
pub mod packet_socket;
pub mod serial;

pub use error::{Result, TransportError};
pub use packet_socket::PacketSocket;
pub use serial::SerialPort;
