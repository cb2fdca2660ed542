//! Access concentrator: answers PPPoE discovery and routes session traffic.
//!
//! One `Ac` per Ethernet interface. Services (the serial modems being
//! offered) live outside the `Ac` and are passed into each handler, so the
//! I/O loop can also drive them directly; the `Ac` only keeps the session
//! table. Outbound frames go through an [`EtherTx`] sink, which the tests
//! replace with an in-memory capture.

use std::collections::HashMap;
use std::io;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::mac::MacAddr;
use crate::packet::{
    self, encode_discovery, encode_session, parse_frame, Code, ETHERTYPE_DISCOVERY,
    ETHERTYPE_SESSION,
};
use crate::tag::{self, Tags};

/// Sink for raw Ethernet frames.
pub trait EtherTx {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

impl<F> EtherTx for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self(frame)
    }
}

/// A service refused to come up (modem failed to open, chatscript failed).
/// Reported to the requesting host inside a PADS AC-System-Error tag.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ServiceFailure(pub String);

/// Something the access concentrator can offer: in this bridge, a serial
/// modem. `connect` brings the underlying device up; payloads flow through
/// `handle_session_payload` once connected.
pub trait Service {
    fn name(&self) -> &str;
    fn is_idle(&self) -> bool;
    fn connect(&mut self, peer: MacAddr, session_id: u16) -> Result<(), ServiceFailure>;
    fn disconnect(&mut self);
    fn handle_session_payload(&mut self, payload: &[u8]);
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    service: usize,
    peer: MacAddr,
}

/// PPPoE access concentrator state machine.
pub struct Ac {
    name: String,
    mac: MacAddr,
    mtu: usize,
    sessions: HashMap<u16, SessionEntry>,
    next_session_id: u16,
    scratch: BytesMut,
}

impl Ac {
    pub fn new(name: impl Into<String>, mac: MacAddr, mtu: usize) -> Self {
        let mut seed = [0u8; 2];
        let start = match getrandom::getrandom(&mut seed) {
            Ok(()) => u16::from_be_bytes(seed).max(1),
            Err(_) => 1,
        };
        Ac {
            name: name.into(),
            mac,
            mtu,
            sessions: HashMap::new(),
            next_session_id: start,
            scratch: BytesMut::with_capacity(1536),
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handle one raw frame from the discovery socket.
    pub fn handle_discovery<S: Service>(
        &mut self,
        raw: &[u8],
        services: &mut [S],
        tx: &mut dyn EtherTx,
    ) {
        let frame = match parse_frame(raw, ETHERTYPE_DISCOVERY) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("ignoring discovery frame: {err}");
                return;
            }
        };
        let tags = match Tags::parse(frame.payload) {
            Ok(tags) => tags,
            Err(err) => {
                debug!("invalid tags in discovery payload: {err}");
                return;
            }
        };
        match Code::from_u8(frame.code) {
            Some(Code::Padi) => {
                if frame.session_id != 0 {
                    debug!("PADI with non-zero session id");
                    return;
                }
                self.handle_padi(frame.src, &tags, services, tx);
            }
            Some(Code::Padr) => {
                if frame.dst != self.mac {
                    debug!("PADR with incorrect destination address");
                    return;
                }
                if frame.session_id != 0 {
                    debug!("PADR with non-zero session id");
                    return;
                }
                self.handle_padr(frame.src, &tags, services, tx);
            }
            Some(Code::Padt) => {
                if frame.session_id == 0 {
                    debug!("PADT with zero session id");
                    return;
                }
                self.handle_padt(frame.session_id, services);
            }
            _ => debug!(code = frame.code, "ignoring discovery code"),
        }
    }

    /// Handle one raw frame from the session socket. Payloads for live
    /// sessions are dispatched to the owning service; unknown sessions get
    /// a PADT back so the host stops sending.
    pub fn handle_session<S: Service>(
        &mut self,
        raw: &[u8],
        services: &mut [S],
        tx: &mut dyn EtherTx,
    ) {
        let frame = match parse_frame(raw, ETHERTYPE_SESSION) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("ignoring session frame: {err}");
                return;
            }
        };
        if frame.code != 0 {
            debug!(code = frame.code, "session packet with non-zero code");
            return;
        }
        match self.sessions.get(&frame.session_id) {
            Some(entry) => services[entry.service].handle_session_payload(frame.payload),
            None => {
                info!(
                    "sending PADT to {} for unknown session {:#06x}",
                    frame.src, frame.session_id
                );
                self.send_discovery(frame.src, Code::Padt, frame.session_id, &Tags::new(), tx);
            }
        }
    }

    /// Send one PPP packet to the host as a PPPoE session frame. Payloads
    /// above the interface MTU are dropped.
    pub fn send_session(
        &mut self,
        peer: MacAddr,
        session_id: u16,
        payload: &[u8],
        tx: &mut dyn EtherTx,
    ) {
        if payload.len() > self.mtu {
            debug!(
                len = payload.len(),
                mtu = self.mtu,
                "dropping oversized session payload"
            );
            return;
        }
        self.scratch.clear();
        encode_session(peer, self.mac, session_id, payload, &mut self.scratch);
        if let Err(err) = tx.send(&self.scratch) {
            warn!("failed to send session frame: {err}");
        }
    }

    /// Close a session on the service's initiative (modem unplugged, for
    /// example) and tell the host why.
    pub fn close_session(
        &mut self,
        peer: MacAddr,
        session_id: u16,
        error_message: Option<&str>,
        tx: &mut dyn EtherTx,
    ) {
        self.sessions.remove(&session_id);
        let mut tags = Tags::new();
        if let Some(message) = error_message {
            tags.push(tag::AC_SYSTEM_ERROR, message.as_bytes().to_vec());
        }
        self.send_discovery(peer, Code::Padt, session_id, &tags, tx);
    }

    /// Tear down every live session, sending PADT with the given message.
    pub fn shutdown<S: Service>(&mut self, message: &str, services: &mut [S], tx: &mut dyn EtherTx) {
        let live: Vec<(u16, SessionEntry)> = self.sessions.drain().collect();
        for (session_id, entry) in live {
            services[entry.service].disconnect();
            let mut tags = Tags::new();
            tags.push(tag::AC_SYSTEM_ERROR, message.as_bytes().to_vec());
            self.send_discovery(entry.peer, Code::Padt, session_id, &tags, tx);
        }
    }

    fn handle_padi<S: Service>(
        &mut self,
        peer: MacAddr,
        tags: &Tags,
        services: &[S],
        tx: &mut dyn EtherTx,
    ) {
        debug!("PADI from {peer}");
        let requested = match requested_service_name(tags) {
            Some(name) => name,
            None => return,
        };
        let known = services.iter().any(|s| s.name() == requested);
        if !requested.is_empty() && !known {
            return; // not ours; some other concentrator may answer
        }
        let mut reply = Tags::new();
        for service in services {
            reply.push(tag::SERVICE_NAME, service.name().as_bytes().to_vec());
        }
        reply.push(tag::AC_NAME, self.name.as_bytes().to_vec());
        reply.echo_from(tags, tag::HOST_UNIQ);
        reply.echo_from(tags, tag::RELAY_SESSION_ID);
        self.send_discovery(peer, Code::Pado, 0, &reply, tx);
    }

    fn handle_padr<S: Service>(
        &mut self,
        peer: MacAddr,
        tags: &Tags,
        services: &mut [S],
        tx: &mut dyn EtherTx,
    ) {
        debug!("PADR from {peer}");
        let requested = match requested_service_name(tags) {
            Some(name) => name,
            None => return,
        };
        let candidate = services
            .iter()
            .position(|s| requested.is_empty() || s.name() == requested);

        let mut reply = Tags::new();
        reply.echo_from(tags, tag::HOST_UNIQ);
        reply.echo_from(tags, tag::RELAY_SESSION_ID);

        let index = match candidate {
            Some(index) => index,
            None => {
                reply.push(
                    tag::SERVICE_NAME_ERROR,
                    &b"Requested service does not exist"[..],
                );
                self.send_discovery(peer, Code::Pads, 0, &reply, tx);
                return;
            }
        };
        reply.push(tag::SERVICE_NAME, services[index].name().as_bytes().to_vec());

        if !services[index].is_idle() {
            // A new PADR for a busy service displaces whoever holds it;
            // the stale session gets a PADT before the modem is reused.
            if let Some((old_id, old_entry)) = self
                .sessions
                .iter()
                .find(|(_, e)| e.service == index)
                .map(|(id, e)| (*id, *e))
            {
                info!(
                    "service {}: sending PADT to close existing session {:#06x}",
                    services[index].name(),
                    old_id
                );
                self.sessions.remove(&old_id);
                self.send_discovery(old_entry.peer, Code::Padt, old_id, &Tags::new(), tx);
            }
            services[index].disconnect();
        }

        let session_id = self.allocate_session_id();
        if let Err(failure) = services[index].connect(peer, session_id) {
            warn!(
                service = services[index].name(),
                "service failed to connect: {failure}"
            );
            reply.push(tag::AC_SYSTEM_ERROR, failure.to_string().into_bytes());
            self.send_discovery(peer, Code::Pads, 0, &reply, tx);
            return;
        }

        info!(
            "service {} connected to {peer} with session id {session_id:#06x}",
            services[index].name()
        );
        self.sessions.insert(
            session_id,
            SessionEntry {
                service: index,
                peer,
            },
        );
        self.send_discovery(peer, Code::Pads, session_id, &reply, tx);
    }

    fn handle_padt<S: Service>(&mut self, session_id: u16, services: &mut [S]) {
        match self.sessions.remove(&session_id) {
            Some(entry) => {
                info!(
                    "received PADT for session {session_id:#06x}: disconnecting service {}",
                    services[entry.service].name()
                );
                services[entry.service].disconnect();
            }
            None => debug!("received PADT for unknown session {session_id:#06x}"),
        }
    }

    fn send_discovery(
        &mut self,
        peer: MacAddr,
        code: Code,
        session_id: u16,
        tags: &Tags,
        tx: &mut dyn EtherTx,
    ) {
        self.scratch.clear();
        encode_discovery(peer, self.mac, code, session_id, tags, &mut self.scratch);
        if let Err(err) = tx.send(&self.scratch) {
            warn!("failed to send discovery frame: {err}");
        }
    }

    /// Next unused session id, wrapping within 1..=0xFFFF.
    fn allocate_session_id(&mut self) -> u16 {
        loop {
            let id = self.next_session_id;
            self.next_session_id = if id == 0xFFFF { 1 } else { id + 1 };
            if id != 0 && !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Extract the Service-Name from a PADI/PADR: there must be exactly one
/// such tag and it must be valid UTF-8.
fn requested_service_name(tags: &Tags) -> Option<String> {
    match tags.count(tag::SERVICE_NAME) {
        0 => {
            debug!("request has no Service-Name tag");
            None
        }
        1 => {
            let raw = tags.first(tag::SERVICE_NAME).unwrap();
            match std::str::from_utf8(raw) {
                Ok(name) => Some(name.to_string()),
                Err(_) => {
                    debug!("invalid UTF-8 in Service-Name tag");
                    None
                }
            }
        }
        n => {
            debug!("request has {n} Service-Name tags");
            None
        }
    }
}
