//! The serial modem as a PPPoE service.
//!
//! One `SerialService` owns one device path. While a session is up it holds
//! the open port, an outbound stuffing buffer and the inbound unstuffer.
//! The downstream direction (host to modem) flows through the
//! [`Service`](pppbridge_pppoe::Service) trait; the upstream direction is
//! pumped by the bridge loop via [`SerialService::pump_modem`] whenever the
//! port fd polls readable.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use pppbridge_frame::{stuff, stuffed_upper_bound, Unstuffer};
use pppbridge_pppoe::{MacAddr, Service, ServiceFailure};
use pppbridge_transport::{chat, SerialPort};

/// Largest PPP packet carried in either direction. Well above any LCP MRU a
/// dial-up peer will negotiate.
const MAX_PPP_PACKET: usize = 2048;

pub struct SerialService {
    name: String,
    device: PathBuf,
    baud: u32,
    chatscript: Option<PathBuf>,
    link: Option<Link>,
}

/// Per-session state, alive from `connect` to `disconnect`.
struct Link {
    port: SerialPort,
    unstuffer: Unstuffer,
    outbuf: Vec<u8>,
    peer: MacAddr,
    session_id: u16,
}

/// Result of draining the modem fd.
pub enum ModemStatus {
    Active,
    /// The line dropped; the session named here must be torn down.
    Disconnected { peer: MacAddr, session_id: u16 },
}

impl SerialService {
    pub fn new(
        name: impl Into<String>,
        device: impl AsRef<Path>,
        baud: u32,
        chatscript: Option<PathBuf>,
    ) -> Self {
        SerialService {
            name: name.into(),
            device: device.as_ref().to_path_buf(),
            baud,
            chatscript,
            link: None,
        }
    }

    /// The port fd for the poll loop, when a session is up.
    pub fn poll_fd(&self) -> Option<RawFd> {
        self.link.as_ref().map(|link| link.port.as_raw_fd())
    }

    /// Drain everything the modem has queued and hand each complete PPP
    /// packet to `deliver` along with the session it belongs to.
    pub fn pump_modem(&mut self, mut deliver: impl FnMut(MacAddr, u16, &[u8])) -> ModemStatus {
        let Some(link) = self.link.as_mut() else {
            return ModemStatus::Active;
        };
        let peer = link.peer;
        let session_id = link.session_id;

        let mut buf = [0u8; 1024];
        let failure = loop {
            match link.port.read(&mut buf) {
                Ok(0) => break Some("modem hung up".to_string()),
                Ok(n) => {
                    link.unstuffer
                        .process(&buf[..n], |packet| deliver(peer, session_id, packet));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break None,
                Err(err) => break Some(format!("modem read failed: {err}")),
            }
        };

        match failure {
            None => ModemStatus::Active,
            Some(reason) => {
                warn!(service = %self.name, "{reason}");
                self.link = None;
                ModemStatus::Disconnected { peer, session_id }
            }
        }
    }
}

impl Service for SerialService {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_idle(&self) -> bool {
        self.link.is_none()
    }

    fn connect(&mut self, peer: MacAddr, session_id: u16) -> Result<(), ServiceFailure> {
        let port = SerialPort::open(&self.device, self.baud)
            .map_err(|err| ServiceFailure(err.to_string()))?;

        // A dead session may have left modem chatter ("NO CARRIER") queued;
        // it must not reach the chatscript or the unstuffer.
        if let Err(err) = port.flush_input() {
            return Err(ServiceFailure(format!("failed to flush modem: {err}")));
        }

        if let Some(script) = &self.chatscript {
            chat::run(&port, script).map_err(|err| ServiceFailure(err.to_string()))?;
        }

        info!(service = %self.name, device = %self.device.display(), "modem line up");
        self.link = Some(Link {
            port,
            unstuffer: Unstuffer::new(MAX_PPP_PACKET),
            outbuf: vec![0u8; stuffed_upper_bound(MAX_PPP_PACKET)],
            peer,
            session_id,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.link.take().is_some() {
            info!(service = %self.name, "modem line down");
        }
    }

    fn handle_session_payload(&mut self, payload: &[u8]) {
        let Some(link) = self.link.as_mut() else {
            debug!(service = %self.name, "dropping payload for disconnected modem");
            return;
        };
        if payload.len() > MAX_PPP_PACKET {
            warn!(
                service = %self.name,
                len = payload.len(),
                "dropping oversized PPP packet"
            );
            return;
        }

        let n = stuff(payload, &mut link.outbuf);
        let mut written = 0;
        while written < n {
            match link.port.write(&link.outbuf[written..n]) {
                Ok(m) => written += m,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    // The line is saturated. PPP tolerates loss; dropping
                    // the rest of the frame beats stalling the bridge.
                    warn!(
                        service = %self.name,
                        dropped = n - written,
                        "modem backpressure, dropping frame tail"
                    );
                    return;
                }
                Err(err) => {
                    warn!(service = %self.name, "modem write failed: {err}");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pppbridge_frame::{stuff, stuffed_upper_bound};

    const HOST: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);

    /// Open a pty and return the master fd plus the slave's device path, so
    /// the service can open the slave like a real modem device.
    fn pty_with_path() -> (RawFd, PathBuf) {
        let mut master: RawFd = -1;
        let mut slave: RawFd = -1;
        let ret = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, 0, "openpty failed");

        let mut name = [0 as libc::c_char; 128];
        let ret = unsafe { libc::ptsname_r(master, name.as_mut_ptr(), name.len()) };
        assert_eq!(ret, 0, "ptsname_r failed");
        let path = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) }
            .to_str()
            .unwrap()
            .to_string();
        // Keep the original slave fd open so the master does not see HUP
        // when the service's own handle comes and goes.
        (master, PathBuf::from(path))
    }

    fn read_available(master: RawFd) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        // The pty is opened non-blocking by the port; the master side here
        // is blocking, so poll it first.
        let mut pfd = libc::pollfd {
            fd: master,
            events: libc::POLLIN,
            revents: 0,
        };
        while unsafe { libc::poll(&mut pfd, 1, 100) } > 0 {
            let n = unsafe { libc::read(master, buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        out
    }

    #[test]
    fn connect_requires_an_openable_device() {
        let mut service =
            SerialService::new("modem", "/dev/does-not-exist-pppbridge", 115200, None);
        let failure = service.connect(HOST, 1).unwrap_err();
        assert!(failure.to_string().contains("failed to open modem"));
        assert!(service.is_idle());
    }

    #[test]
    fn downstream_payload_is_framed_onto_the_line() {
        let (master, path) = pty_with_path();
        let mut service = SerialService::new("modem", &path, 115200, None);
        service.connect(HOST, 0x0001).unwrap();
        assert!(!service.is_idle());

        service.handle_session_payload(&[0xC0, 0x21, 0x01, 0x01]);

        let wire = read_available(master);
        let mut expected = vec![0u8; stuffed_upper_bound(4)];
        let n = stuff(&[0xC0, 0x21, 0x01, 0x01], &mut expected);
        assert_eq!(wire, expected[..n]);

        unsafe { libc::close(master) };
    }

    #[test]
    fn upstream_frames_are_unstuffed_and_delivered() {
        let (master, path) = pty_with_path();
        let mut service = SerialService::new("modem", &path, 115200, None);
        service.connect(HOST, 0x00AB).unwrap();

        let payload = [0xC0, 0x21, 0x02, 0x7E, 0x7D];
        let mut wire = vec![0u8; stuffed_upper_bound(payload.len())];
        let n = stuff(&payload, &mut wire);
        let written = unsafe { libc::write(master, wire.as_ptr().cast(), n) };
        assert_eq!(written as usize, n);

        let mut delivered = Vec::new();
        // Wait for the kernel to move the bytes across the pty.
        for _ in 0..100 {
            match service.pump_modem(|peer, session_id, packet| {
                delivered.push((peer, session_id, packet.to_vec()));
            }) {
                ModemStatus::Active if delivered.is_empty() => {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                _ => break,
            }
        }
        assert_eq!(delivered, vec![(HOST, 0x00AB, payload.to_vec())]);

        unsafe { libc::close(master) };
    }

    #[test]
    fn hangup_reports_disconnection() {
        let (master, path) = pty_with_path();
        let mut service = SerialService::new("modem", &path, 115200, None);
        service.connect(HOST, 0x0007).unwrap();

        unsafe { libc::close(master) };
        // With every master handle closed the slave reads EOF (or EIO).
        let mut waited = 0;
        loop {
            match service.pump_modem(|_, _, _| {}) {
                ModemStatus::Disconnected { peer, session_id } => {
                    assert_eq!((peer, session_id), (HOST, 0x0007));
                    break;
                }
                ModemStatus::Active => {
                    waited += 1;
                    assert!(waited < 100, "hangup never surfaced");
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            }
        }
        assert!(service.is_idle());
        assert!(service.poll_fd().is_none());
    }

    #[test]
    fn payloads_while_idle_are_dropped() {
        let mut service = SerialService::new("modem", "/dev/null", 115200, None);
        // Must not panic or open anything.
        service.handle_session_payload(&[0xC0, 0x21]);
        assert!(service.is_idle());
    }
}
