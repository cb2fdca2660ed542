//! Raw `AF_PACKET` sockets bound to one interface and one ethertype.
//!
//! PPPoE uses two ethertypes (discovery 0x8863, session 0x8864); the bridge
//! opens one socket per ethertype so the kernel does the demultiplexing.

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A non-blocking raw socket receiving and sending whole Ethernet frames.
pub struct PacketSocket {
    fd: RawFd,
    interface: String,
}

impl PacketSocket {
    /// Open a raw socket bound to `interface`, filtered to `ethertype`.
    /// Requires CAP_NET_RAW.
    pub fn bind(interface: &str, ethertype: u16) -> Result<Self> {
        let bind_err = |source: io::Error| TransportError::PacketBind {
            interface: interface.to_string(),
            source,
        };

        let proto = ethertype.to_be(); // htons
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                proto as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }
        let socket = PacketSocket {
            fd,
            interface: interface.to_string(),
        };

        let ifindex = interface_index(interface)?;
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = proto;
        addr.sll_ifindex = ifindex as libc::c_int;

        let rc = unsafe {
            libc::bind(
                fd,
                (&addr as *const libc::sockaddr_ll).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }

        debug!(interface, ethertype, "bound packet socket");
        Ok(socket)
    }

    /// Receive one frame. `WouldBlock` when nothing is queued.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::recv(self.fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Send one complete Ethernet frame.
    pub fn send(&self, frame: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::send(self.fd, frame.as_ptr().cast(), frame.len(), 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

fn interface_index(interface: &str) -> Result<libc::c_uint> {
    let c_name =
        std::ffi::CString::new(interface).map_err(|_| TransportError::InterfaceQuery {
            interface: interface.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "invalid interface name"),
        })?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(TransportError::InterfaceQuery {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(index)
}

/// Run one SIOCGIF* ioctl against a throwaway datagram socket; these
/// queries need no special privileges.
fn interface_ioctl(interface: &str, request: libc::Ioctl) -> Result<libc::ifreq> {
    let query_err = |source: io::Error| TransportError::InterfaceQuery {
        interface: interface.to_string(),
        source,
    };

    let name_bytes = interface.as_bytes();
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    if name_bytes.len() >= ifr.ifr_name.len() {
        return Err(query_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        )));
    }
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
        *dst = *src as libc::c_char;
    }

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(query_err(io::Error::last_os_error()));
    }
    let rc = unsafe { libc::ioctl(fd, request, &mut ifr) };
    let saved = io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if rc != 0 {
        return Err(query_err(saved));
    }
    Ok(ifr)
}

/// Hardware (MAC) address of the named interface.
pub fn interface_mac(interface: &str) -> Result<[u8; 6]> {
    let ifr = interface_ioctl(interface, libc::SIOCGIFHWADDR)?;
    let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
    let mut mac = [0u8; 6];
    for (dst, src) in mac.iter_mut().zip(&sa_data[..6]) {
        *dst = *src as u8;
    }
    Ok(mac)
}

/// MTU of the named interface.
pub fn interface_mtu(interface: &str) -> Result<usize> {
    let ifr = interface_ioctl(interface, libc::SIOCGIFMTU)?;
    let mtu = unsafe { ifr.ifr_ifru.ifru_mtu };
    Ok(mtu as usize)
}
