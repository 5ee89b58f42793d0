use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::interest::{Interest, Mode};

/// Thin wrapper over a single epoll instance.
///
/// Registration keys off the raw fd directly (`epoll_event.data.fd`)
/// rather than through an opaque token. The disconnect/error bits
/// (`EPOLLRDHUP | EPOLLERR | EPOLLHUP`) are folded into every registration
/// unconditionally, so callers never have to ask for disconnect
/// notifications explicitly. `close()` is an idempotent, thread-safe
/// `&self` method rather than living behind `Drop` alone, since
/// [`crate::reactor::Reactor::shutdown`] must be callable from a different
/// thread than the one blocked in `select()`.
#[derive(Debug)]
pub struct Selector {
    ep: RawFd,
    closed: Arc<AtomicBool>,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let ep = syscall(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        Ok(Selector {
            ep,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A cheap, `Send + Sync` handle that can close this selector from any
    /// thread, independent of `Selector`'s own lifetime.
    pub fn handle(&self) -> SelectorHandle {
        SelectorHandle {
            ep: self.ep,
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn register(&self, fd: RawFd, interest: Interest, mode: Mode) -> io::Result<()> {
        let mut event = epoll_event_for(fd, interest, mode);
        syscall(unsafe { libc::epoll_ctl(self.ep, libc::EPOLL_CTL_ADD, fd, &mut event) })?;
        Ok(())
    }

    pub fn reregister(&self, fd: RawFd, interest: Interest, mode: Mode) -> io::Result<()> {
        let mut event = epoll_event_for(fd, interest, mode);
        syscall(unsafe { libc::epoll_ctl(self.ep, libc::EPOLL_CTL_MOD, fd, &mut event) })?;
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        syscall(unsafe {
            libc::epoll_ctl(self.ep, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        })?;
        Ok(())
    }

    /// Blocks until at least one event is ready or `timeout` elapses
    /// (`None` waits indefinitely), filling `events` with the ready set.
    ///
    /// Retries transparently on `EINTR`.
    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d
                .checked_add(Duration::from_nanos(999_999))
                .unwrap_or(d)
                .as_millis()
                .try_into()
                .unwrap_or(i32::MAX),
        };

        events.inner.clear();
        loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.ep,
                    events.inner.as_mut_ptr(),
                    events.inner.capacity() as i32,
                    timeout_ms,
                )
            };
            if n >= 0 {
                // SAFETY: epoll_wait just initialized the first `n` slots.
                unsafe { events.inner.set_len(n as usize) };
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Closes the epoll fd. Idempotent: a second call is a no-op, matching
    /// `reactor::Reactor::shutdown`'s "reentrant" contract. Safe to call
    /// from a thread other than the one that created the selector.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe {
            libc::close(self.ep);
        }
    }
}

impl AsRawFd for Selector {
    fn as_raw_fd(&self) -> RawFd {
        self.ep
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        self.close();
    }
}

/// `Send + Sync` handle that can close a [`Selector`] from any thread. See
/// [`Selector::handle`].
#[derive(Debug, Clone)]
pub struct SelectorHandle {
    ep: RawFd,
    closed: Arc<AtomicBool>,
}

impl SelectorHandle {
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe {
            libc::close(self.ep);
        }
    }
}

fn epoll_event_for(fd: RawFd, interest: Interest, mode: Mode) -> libc::epoll_event {
    let mut bits: u32 = libc::EPOLLRDHUP as u32 | libc::EPOLLERR as u32 | libc::EPOLLHUP as u32;
    if interest.is_readable() {
        bits |= libc::EPOLLIN as u32;
    }
    if interest.is_writable() {
        bits |= libc::EPOLLOUT as u32;
    }
    if mode.is_edge_triggered() {
        bits |= libc::EPOLLET as u32;
    }
    if mode.is_oneshot() {
        bits |= libc::EPOLLONESHOT as u32;
    }
    libc::epoll_event {
        events: bits,
        u64: fd as u64,
    }
}

fn syscall(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A growable batch buffer for `epoll_wait` results.
#[derive(Debug)]
pub struct Events {
    inner: Vec<libc::epoll_event>,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events {
            inner: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Doubles the batch capacity. Called by the reactor when a wait
    /// returns a full batch, so a busy reactor's buffer grows to the
    /// working set instead of always taking two wakeups to drain it.
    pub fn grow(&mut self) {
        let additional = self.inner.capacity().max(64);
        self.inner.reserve(additional);
    }

    pub fn iter(&self) -> impl Iterator<Item = ReadyEvent> + '_ {
        self.inner.iter().map(|e| ReadyEvent {
            fd: e.u64 as RawFd,
            readable: e.events & (libc::EPOLLIN as u32) != 0,
            writable: e.events & (libc::EPOLLOUT as u32) != 0,
            disconnect: e.events
                & (libc::EPOLLRDHUP as u32 | libc::EPOLLERR as u32 | libc::EPOLLHUP as u32)
                != 0,
        })
    }
}

/// A single decoded readiness event: which fd, and which bits fired.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    pub disconnect: bool,
}
