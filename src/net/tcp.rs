//! IPv4 TCP socket constructors: a listening socket bound to `ip:port`
//! with a fixed backlog, and a client socket that connects out.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::str::FromStr;

use crate::error::Result;
use crate::fd::Fd;
use crate::sys::unix::sockopt;

/// Backlog passed to `listen(2)`.
const LISTEN_BACKLOG: libc::c_int = 30;

/// A bound, listening TCP socket. Hand it to
/// [`crate::dispatch::ConcurrentReactors::bind_listening_socket`] or
/// register it directly on a [`crate::reactor::Reactor`].
pub struct ServerSocket {
    fd: Fd,
}

impl ServerSocket {
    /// Creates a socket, sets `SO_REUSEADDR`, binds to `ip:port`, and
    /// starts listening. `port` of `0` asks the kernel for an ephemeral
    /// port; read it back with [`Self::local_port`].
    pub fn listen_req(ip: &str, port: u16) -> Result<ServerSocket> {
        let fd = new_stream_socket()?;
        sockopt::set_reuseaddr(fd.raw())?;

        let addr = parse_addr(ip, port)?;
        let (raw_addr, len) = sockaddr_in(addr);
        syscall(unsafe {
            libc::bind(fd.raw(), &raw_addr as *const _ as *const libc::sockaddr, len)
        })?;
        syscall(unsafe { libc::listen(fd.raw(), LISTEN_BACKLOG) })?;

        Ok(ServerSocket { fd })
    }

    /// Accepts one pending connection, if any; non-blocking callers should
    /// treat `WouldBlock` as "nothing pending right now".
    pub fn accept_req(&self) -> io::Result<Fd> {
        let accepted =
            unsafe { libc::accept(self.fd.raw(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if accepted == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: accept(2) just handed us a freshly-opened, exclusively
        // owned descriptor.
        Ok(unsafe { Fd::from_raw(accepted) })
    }

    pub fn raw(&self) -> RawFd {
        self.fd.raw()
    }

    /// The port actually bound, useful when [`Self::listen_req`] was asked
    /// for an ephemeral one.
    pub fn local_port(&self) -> io::Result<u16> {
        local_port(self.fd.raw())
    }

    /// Unwraps into the underlying [`Fd`], for handing to a reactor or
    /// dispatcher that takes ownership of the descriptor.
    pub fn into_fd(self) -> Fd {
        self.fd
    }
}

/// A TCP socket that has connected out to a remote peer.
pub struct ClientSocket {
    fd: Fd,
}

impl ClientSocket {
    /// Creates a socket and connects it to `remote_ip:remote_port`.
    pub fn launch_req(remote_ip: &str, remote_port: u16) -> Result<ClientSocket> {
        let fd = new_stream_socket()?;
        let addr = parse_addr(remote_ip, remote_port)?;
        let (raw_addr, len) = sockaddr_in(addr);
        syscall(unsafe {
            libc::connect(fd.raw(), &raw_addr as *const _ as *const libc::sockaddr, len)
        })?;
        Ok(ClientSocket { fd })
    }

    pub fn raw(&self) -> RawFd {
        self.fd.raw()
    }

    pub fn into_fd(self) -> Fd {
        self.fd
    }
}

fn new_stream_socket() -> Result<Fd> {
    let sock = unsafe { libc::socket(libc::PF_INET, libc::SOCK_STREAM, 0) };
    if sock == -1 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: socket(2) just handed us a freshly-opened, exclusively owned
    // descriptor.
    Ok(unsafe { Fd::from_raw(sock) })
}

fn parse_addr(ip: &str, port: u16) -> Result<SocketAddrV4> {
    let addr = Ipv4Addr::from_str(ip)
        .map_err(|_| crate::error::Error::Configuration("invalid IPv4 address"))?;
    Ok(SocketAddrV4::new(addr, port))
}

fn sockaddr_in(addr: SocketAddrV4) -> (libc::sockaddr_in, libc::socklen_t) {
    let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    raw.sin_family = libc::AF_INET as libc::sa_family_t;
    raw.sin_port = addr.port().to_be();
    raw.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    (raw, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
}

fn local_port(fd: RawFd) -> io::Result<u16> {
    let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(
            fd,
            &mut raw as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(u16::from_be(raw.sin_port))
}

fn syscall(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
