//! Descriptor option helpers: non-blocking toggle, `SO_REUSEADDR`,
//! `TCP_NODELAY`, send/receive buffer sizes.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;

fn syscall(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    syscall(unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) })
}

pub fn set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let option: libc::c_int = 1;
    syscall(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &option as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
}

pub fn set_tcp_nodelay(fd: RawFd, enable: bool) -> io::Result<()> {
    let option: libc::c_int = enable as libc::c_int;
    syscall(unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &option as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
}

pub fn set_send_buffer_size(fd: RawFd, size: usize) -> io::Result<()> {
    let size = size as libc::c_int;
    syscall(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
}

pub fn set_recv_buffer_size(fd: RawFd, size: usize) -> io::Result<()> {
    let size = size as libc::c_int;
    syscall(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
}

pub fn send_buffer_size(fd: RawFd) -> io::Result<usize> {
    get_int_opt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF)
}

pub fn recv_buffer_size(fd: RawFd) -> io::Result<usize> {
    get_int_opt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF)
}

fn get_int_opt(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<usize> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    syscall(unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            &mut value as *mut _ as *mut libc::c_void,
            &mut len,
        )
    })?;
    Ok(value as usize)
}
