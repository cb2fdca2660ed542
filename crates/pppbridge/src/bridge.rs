//! The single-threaded poll loop tying the Ethernet side to the modem.
//!
//! Three fds at most: the discovery socket, the session socket and, while a
//! session is up, the serial port. Everything is non-blocking, so one
//! `libc::poll` drives the whole bridge.

use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use pppbridge_pppoe::packet::{ETH_HEADER_LEN, PPPOE_HEADER_LEN};
use pppbridge_pppoe::{Ac, EtherTx, MacAddr, ETHERTYPE_DISCOVERY, ETHERTYPE_SESSION};
use pppbridge_transport::{packet_socket, PacketSocket, TransportError};

use crate::service::{ModemStatus, SerialService};
use crate::Cli;

const POLL_TIMEOUT_MS: libc::c_int = 500;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// `EtherTx` over a bound packet socket.
struct SocketTx<'a>(&'a PacketSocket);

impl EtherTx for SocketTx<'_> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.send(frame).map(|_| ())
    }
}

pub fn run(cli: &Cli) -> Result<(), BridgeError> {
    let mac = MacAddr(packet_socket::interface_mac(&cli.interface)?);
    let mtu = packet_socket::interface_mtu(&cli.interface)?;

    let discovery = PacketSocket::bind(&cli.interface, ETHERTYPE_DISCOVERY)?;
    let session = PacketSocket::bind(&cli.interface, ETHERTYPE_SESSION)?;

    // The PPPoE header eats into the interface MTU (RFC 2516 section 7).
    let mut ac = Ac::new(&cli.ac_name, mac, mtu - PPPOE_HEADER_LEN);
    let mut services = [SerialService::new(
        &cli.service_name,
        &cli.device,
        cli.baud,
        cli.chatscript.clone(),
    )];

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(running.clone())?;

    info!(
        interface = %cli.interface,
        mac = %mac,
        service = %cli.service_name,
        ac_name = %cli.ac_name,
        "access concentrator up"
    );

    let mut frame_buf = vec![0u8; mtu + ETH_HEADER_LEN];
    while running.load(Ordering::SeqCst) {
        let modem_fd = services[0].poll_fd();

        let mut pollfds = [
            libc::pollfd {
                fd: discovery.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: session.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                // poll ignores negative fds, which stands in for "no modem"
                fd: modem_fd.unwrap_or(-1),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        let ready = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                POLL_TIMEOUT_MS,
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue; // signal; the loop condition decides what happens
            }
            return Err(TransportError::Io(err).into());
        }
        if ready == 0 {
            continue;
        }

        if pollfds[0].revents != 0 {
            drain_socket(&discovery, &mut frame_buf, |frame| {
                ac.handle_discovery(frame, &mut services, &mut SocketTx(&discovery));
            });
        }
        if pollfds[1].revents != 0 {
            drain_socket(&session, &mut frame_buf, |frame| {
                ac.handle_session(frame, &mut services, &mut SocketTx(&session));
            });
        }
        if modem_fd.is_some() && pollfds[2].revents != 0 {
            let status = services[0].pump_modem(|peer, session_id, packet| {
                debug!(len = packet.len(), "PPP packet from modem");
                ac.send_session(peer, session_id, packet, &mut SocketTx(&session));
            });
            if let ModemStatus::Disconnected { peer, session_id } = status {
                ac.close_session(
                    peer,
                    session_id,
                    Some("Modem disconnected"),
                    &mut SocketTx(&discovery),
                );
            }
        }
    }

    info!("shutting down");
    ac.shutdown("Shutting down", &mut services, &mut SocketTx(&discovery));
    Ok(())
}

/// Receive until the socket runs dry.
fn drain_socket(socket: &PacketSocket, buf: &mut [u8], mut handle: impl FnMut(&[u8])) {
    loop {
        match socket.recv(buf) {
            Ok(n) => handle(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            Err(err) => {
                warn!(interface = socket.interface(), "receive failed: {err}");
                return;
            }
        }
    }
}

fn install_signal_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
}
