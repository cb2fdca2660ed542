//! Raw serial port access via libc termios.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A modem serial port in raw 8N1 mode, non-blocking by default so it can
/// sit in the bridge's poll loop.
#[derive(Debug)]
pub struct SerialPort {
    fd: RawFd,
    path: PathBuf,
}

impl SerialPort {
    /// Open and configure the device: raw mode, 8 data bits, no parity,
    /// one stop bit, no flow control, non-blocking.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_to_speed(baud)?;
        let open_err = |source: io::Error| TransportError::SerialOpen {
            path: path.clone(),
            source,
        };

        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| open_err(io::Error::new(io::ErrorKind::InvalidInput, "invalid path")))?;

        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if fd < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }
        let port = SerialPort {
            fd,
            path: path.clone(),
        };

        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
            return Err(open_err(io::Error::last_os_error()));
        }

        // cfmakeraw equivalent
        termios.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IXON);
        termios.c_oflag &= !libc::OPOST;
        termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

        // 8N1, receiver on, modem control lines ignored
        termios.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
        termios.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

        // No software flow control: PPP escapes XON/XOFF itself if asked,
        // and the bridge must pass all byte values through.
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);

        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;

        unsafe {
            libc::cfsetispeed(&mut termios, speed);
            libc::cfsetospeed(&mut termios, speed);
        }

        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
            return Err(open_err(io::Error::last_os_error()));
        }

        debug!(path = %port.path.display(), baud, "opened serial port");
        Ok(port)
    }

    /// Discard anything already buffered from the device. A previous
    /// connection may have left a "NO CARRIER" message behind that would
    /// confuse a chatscript.
    pub fn flush_input(&self) -> io::Result<()> {
        if unsafe { libc::tcflush(self.fd, libc::TCIFLUSH) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Toggle O_NONBLOCK. The chatscript needs blocking semantics while it
    /// owns the fd; the poll loop needs non-blocking the rest of the time.
    pub fn set_blocking(&self, blocking: bool) -> io::Result<()> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if blocking {
            flags & !libc::O_NONBLOCK
        } else {
            flags | libc::O_NONBLOCK
        };
        if unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adopt an already-open fd (a pty in tests) as a port.
    #[cfg(test)]
    pub(crate) fn from_raw_parts(fd: RawFd, path: PathBuf) -> Self {
        SerialPort { fd, path }
    }
}

impl AsRawFd for SerialPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Map a numeric baud rate to its termios constant. Rates below 9600 are
/// of no use for PPP and are left out.
fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    match baud {
        9600 => Ok(libc::B9600),
        19200 => Ok(libc::B19200),
        38400 => Ok(libc::B38400),
        57600 => Ok(libc::B57600),
        115200 => Ok(libc::B115200),
        230400 => Ok(libc::B230400),
        460800 => Ok(libc::B460800),
        921600 => Ok(libc::B921600),
        _ => Err(TransportError::UnsupportedBaud(baud)),
    }
}
