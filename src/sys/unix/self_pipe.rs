//! Process-wide signal self-pipe: a signal handler writes one byte, the
//! reactor thread reads it back through the normal selector loop. Created
//! at most once per process; every reactor that registers a signal shares
//! the same pipe.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::OnceLock;

use crate::fd::Fd;

struct Pipe {
    read: Fd,
    write: Fd,
}

static PIPE: OnceLock<Pipe> = OnceLock::new();

/// Ensures the self-pipe exists, creating it on first call. Returns the
/// read end's fd for registration with the reactor's selector.
///
/// Returns `Err` if this is not the first caller to successfully create the
/// pipe but somehow the creation failed earlier (practically: only a
/// `pipe2(2)` failure reaches this, and that's an `Io` error at the call
/// site since the reactor is the only caller).
pub fn ensure_initialized() -> io::Result<RawFd> {
    if let Some(pipe) = PIPE.get() {
        return Ok(pipe.read.raw());
    }

    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 just handed us two freshly-opened, exclusively-owned fds.
    let pipe = Pipe {
        read: unsafe { Fd::from_raw(fds[0]) },
        write: unsafe { Fd::from_raw(fds[1]) },
    };
    let read_fd = pipe.read.raw();

    // Lost the race: another thread initialized it first. Drop ours (closes
    // both ends) and report the winner's read fd instead.
    if PIPE.set(pipe).is_err() {
        return Ok(PIPE.get().expect("set just failed so get succeeds").read.raw());
    }

    Ok(read_fd)
}

/// Returns the write end's fd, if the pipe has been created. A signal
/// handler installed by [`crate::reactor::Reactor::add_signal`] captures
/// this value once and writes `signum as u8` to it.
pub fn write_fd() -> Option<RawFd> {
    PIPE.get().map(|p| p.write.raw())
}

/// Async-signal-safe: writes exactly one byte (the signal number, truncated
/// to `u8`) to the write end. Called only from inside a signal handler.
///
/// # Safety
/// Must only be called after [`ensure_initialized`] has successfully run at
/// least once on some thread (guaranteed by `add_signal`, which installs the
/// handler only after the pipe exists).
pub unsafe fn notify_signal(write_fd: RawFd, signum: i32) {
    let saved_errno = *libc::__errno_location();
    let byte = signum as u8;
    libc::write(write_fd, &byte as *const u8 as *const libc::c_void, 1);
    *libc::__errno_location() = saved_errno;
}

/// Reads up to `buf.len()` pending signal bytes from the read end. Intended
/// to be called with a small fixed-size buffer, since each pending signal
/// is a single byte.
pub fn drain(read_fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n == -1 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(0);
        }
        return Err(err);
    }
    Ok(n as usize)
}
