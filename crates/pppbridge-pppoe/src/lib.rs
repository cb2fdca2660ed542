//! PPPoE (RFC 2516) for the serial bridge: discovery/session wire codec and
//! a minimal access concentrator.
//!
//! The codec half ([`mac`], [`tag`], [`packet`]) is pure and allocation
//! happens only into caller-supplied [`bytes::BytesMut`] buffers. The
//! [`ac::Ac`] state machine owns the session table and drives discovery;
//! actual sockets are injected through [`ac::EtherTx`] so the whole
//! handshake is testable in memory.

pub mod ac;
pub mod error;
pub mod mac;
pub mod packet;
pub mod tag;

pub use ac::{Ac, EtherTx, Service, ServiceFailure};
pub use error::PppoeError;
pub use mac::MacAddr;
pub use packet::{Code, PppoeFrame, ETHERTYPE_DISCOVERY, ETHERTYPE_SESSION};
pub use tag::Tags;
