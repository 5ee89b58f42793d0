//! Single-threaded, callback-dispatching event reactor.
//!
//! Dispatch precedence: a per-fd callback beats disconnect, which beats
//! the shared readable/writable callbacks, which beat the signal
//! self-pipe.

use std::collections::{BTreeMap, HashMap};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::interest::{Interest, Mode};
use crate::sys::unix::self_pipe;
use crate::sys::unix::selector::{Events, ReadyEvent, Selector, SelectorHandle};

/// Callback invoked with the fd that became ready.
pub type FdCallback = Box<dyn FnMut(RawFd) + Send>;
/// Callback invoked when a registered signal is delivered.
pub type SignalCallback = Box<dyn FnMut(i32) + Send>;
/// Callback invoked when a wait times out with no events.
pub type TimeoutCallback = Box<dyn FnMut() + Send>;

/// Tunables for [`Reactor::new`].
#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// Initial wait timeout in milliseconds; `-1` waits indefinitely.
    pub initial_timeout_ms: i64,
    /// Initial capacity of the event-batch buffer.
    pub initial_event_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> ReactorConfig {
        ReactorConfig {
            initial_timeout_ms: -1,
            initial_event_capacity: 128,
        }
    }
}

/// A handle that can shut a [`Reactor`] down from any thread.
///
/// The concurrent-reactor dispatcher keeps one of these per worker so
/// `destroy()` can ask every worker to stop without owning the worker's
/// `Reactor` (which lives on the worker's own thread for the duration of
/// `activate()`).
#[derive(Clone)]
pub struct ReactorHandle {
    stop: Arc<AtomicBool>,
    selector: SelectorHandle,
}

impl ReactorHandle {
    /// Sets the stop flag and closes the demultiplex handle. Reentrant.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.selector.close();
    }
}

/// Single-threaded event reactor: one epoll instance, callback dispatch,
/// optional signal integration.
pub struct Reactor {
    selector: Selector,
    events: Events,
    per_fd: HashMap<RawFd, FdCallback>,
    signal_cbs: BTreeMap<i32, SignalCallback>,
    readable_cb: Option<FdCallback>,
    writable_cb: Option<FdCallback>,
    disconnect_cb: Option<FdCallback>,
    timeout_cb: Option<TimeoutCallback>,
    stop: Arc<AtomicBool>,
    self_pipe_fd: Option<RawFd>,
    timeout_ms: i64,
}

impl Reactor {
    pub fn new() -> Result<Reactor> {
        Reactor::with_config(ReactorConfig::default())
    }

    pub fn with_config(config: ReactorConfig) -> Result<Reactor> {
        Ok(Reactor {
            selector: Selector::new()?,
            events: Events::with_capacity(config.initial_event_capacity),
            per_fd: HashMap::new(),
            signal_cbs: BTreeMap::new(),
            readable_cb: None,
            writable_cb: None,
            disconnect_cb: None,
            timeout_cb: None,
            stop: Arc::new(AtomicBool::new(false)),
            self_pipe_fd: None,
            timeout_ms: config.initial_timeout_ms,
        })
    }

    /// A cross-thread handle that can call [`Reactor::shutdown`]'s effect
    /// without owning this reactor.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            stop: Arc::clone(&self.stop),
            selector: self.selector.handle(),
        }
    }

    /// Registers `fd` with no per-fd callback; events route to the shared
    /// readable/writable callbacks.
    pub fn add_fd(&mut self, fd: RawFd, events: Interest, mode: Mode) -> Result<()> {
        self.selector.register(fd, events, mode)?;
        Ok(())
    }

    /// Registers `fd` with a per-fd callback, taking precedence over every
    /// shared callback including disconnect.
    pub fn add_fd_with(
        &mut self,
        fd: RawFd,
        events: Interest,
        mode: Mode,
        cb: FdCallback,
    ) -> Result<()> {
        self.selector.register(fd, events, mode)?;
        self.per_fd.insert(fd, cb);
        Ok(())
    }

    /// Updates an existing registration. Required between notifications in
    /// one-shot modes to re-arm.
    pub fn mod_fd(&mut self, fd: RawFd, events: Interest, mode: Mode) -> Result<()> {
        self.selector.reregister(fd, events, mode)?;
        Ok(())
    }

    pub fn remove_fd(&mut self, fd: RawFd) -> Result<()> {
        self.selector.deregister(fd)?;
        self.per_fd.remove(&fd);
        Ok(())
    }

    /// Ensures the signal self-pipe exists and is registered, installs a
    /// process-level handler for `sig`, and stores `cb` for that signal.
    ///
    /// Installing the self-pipe twice *on this reactor* is a programming
    /// error and returns [`Error::Configuration`]; the pipe itself is a
    /// process-wide singleton created at most once across all reactors.
    pub fn add_signal(&mut self, sig: i32, cb: SignalCallback) -> Result<()> {
        if self.self_pipe_fd.is_none() {
            let read_fd = self_pipe::ensure_initialized()?;
            self.selector
                .register(read_fd, Interest::READABLE, Mode::Level)?;
            self.self_pipe_fd = Some(read_fd);
        } else if self.signal_cbs.contains_key(&sig) {
            return Err(Error::Configuration(
                "signal already registered on this reactor",
            ));
        }

        install_signal_handler(sig)?;
        self.signal_cbs.insert(sig, cb);
        Ok(())
    }

    pub fn set_readable_cb(&mut self, cb: FdCallback) {
        self.readable_cb = Some(cb);
    }

    pub fn set_writable_cb(&mut self, cb: FdCallback) {
        self.writable_cb = Some(cb);
    }

    pub fn set_disconnect_cb(&mut self, cb: FdCallback) {
        self.disconnect_cb = Some(cb);
    }

    pub fn set_timeout_cb(&mut self, cb: TimeoutCallback) {
        self.timeout_cb = Some(cb);
    }

    pub fn has_readable_cb(&self) -> bool {
        self.readable_cb.is_some()
    }

    pub fn has_writable_cb(&self) -> bool {
        self.writable_cb.is_some()
    }

    pub fn has_disconnect_cb(&self) -> bool {
        self.disconnect_cb.is_some()
    }

    pub fn has_timeout_cb(&self) -> bool {
        self.timeout_cb.is_some()
    }

    /// Changes the wait bound; `-1` waits indefinitely.
    pub fn reset_timeout(&mut self, ms: i64) {
        self.timeout_ms = ms;
    }

    /// Runs the loop until [`Reactor::shutdown`]. Blocks the calling thread.
    pub fn activate(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::Acquire) {
            self.tick()?;
        }
        Ok(())
    }

    /// Sets the stop flag and closes the demultiplex handle. Reentrant.
    pub fn shutdown(&self) {
        self.handle().shutdown();
    }

    fn tick(&mut self) -> Result<()> {
        let timeout = if self.timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms as u64))
        };

        match self.selector.select(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if self.stop.load(Ordering::Acquire) => {
                // The selector was closed by `shutdown()` racing us into
                // `select()`; that's the expected unblocking mechanism, not
                // a failure.
                log::debug!("reactor: selector closed during shutdown: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        log::debug!("reactor: tick, {} events", self.events.len());

        if self.events.is_empty() {
            if let Some(cb) = self.timeout_cb.as_mut() {
                cb();
            }
            return Ok(());
        }

        if self.events.len() == self.events.capacity() {
            self.events.grow();
        }

        let ready: Vec<ReadyEvent> = self.events.iter().collect();
        for evt in ready {
            self.dispatch(evt);
        }

        Ok(())
    }

    fn dispatch(&mut self, evt: ReadyEvent) {
        if let Some(cb) = self.per_fd.get_mut(&evt.fd) {
            cb(evt.fd);
            return;
        }

        if evt.disconnect {
            if let Some(cb) = self.disconnect_cb.as_mut() {
                cb(evt.fd);
            } else {
                unsafe {
                    libc::close(evt.fd);
                }
            }
            return;
        }

        if Some(evt.fd) == self.self_pipe_fd && evt.readable {
            self.drain_signals();
            return;
        }

        if evt.readable {
            if let Some(cb) = self.readable_cb.as_mut() {
                cb(evt.fd);
            }
            return;
        }

        if evt.writable {
            if let Some(cb) = self.writable_cb.as_mut() {
                cb(evt.fd);
            }
        }
    }

    fn drain_signals(&mut self) {
        let fd = match self.self_pipe_fd {
            Some(fd) => fd,
            None => return,
        };
        let mut buf = [0u8; 24];
        let n = match self_pipe::drain(fd, &mut buf) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("reactor: self-pipe read failed: {e}");
                return;
            }
        };
        for &signum in &buf[..n] {
            if let Some(cb) = self.signal_cbs.get_mut(&(signum as i32)) {
                cb(signum as i32);
            }
        }
    }
}

fn install_signal_handler(sig: i32) -> Result<()> {
    extern "C" fn handler(signum: libc::c_int) {
        if let Some(write_fd) = self_pipe::write_fd() {
            // SAFETY: async-signal-safe; writes one byte and restores errno.
            unsafe {
                self_pipe::notify_signal(write_fd, signum);
            }
        }
    }

    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = libc::SA_RESTART;
        if libc::sigaction(sig, &sa, std::ptr::null_mut()) == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn make_pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        unsafe {
            assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        }
        (fds[0], fds[1])
    }

    #[test]
    fn per_fd_callback_takes_precedence() {
        let (r, w) = make_pipe();
        let mut reactor = Reactor::new().unwrap();
        crate::sys::unix::sockopt::set_nonblocking(r, true).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        reactor
            .add_fd_with(
                r,
                Interest::READABLE,
                Mode::Level,
                Box::new(move |_fd| {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        unsafe {
            libc::write(w, b"x".as_ptr() as *const _, 1);
        }
        reactor.tick().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn one_shot_requires_rearm() {
        let (r, w) = make_pipe();
        crate::sys::unix::sockopt::set_nonblocking(r, true).unwrap();
        let mut reactor = Reactor::with_config(ReactorConfig {
            initial_timeout_ms: 50,
            ..ReactorConfig::default()
        })
        .unwrap();

        let hits = Arc::new(Mutex::new(0usize));
        let hits2 = Arc::clone(&hits);
        reactor
            .add_fd_with(
                r,
                Interest::READABLE,
                Mode::EdgeOneshot,
                Box::new(move |_fd| {
                    *hits2.lock().unwrap() += 1;
                }),
            )
            .unwrap();

        unsafe {
            libc::write(w, b"ab".as_ptr() as *const _, 2);
        }
        reactor.tick().unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);

        // Feeding more data without re-arming must not trigger another callback.
        unsafe {
            libc::write(w, b"cd".as_ptr() as *const _, 2);
        }
        reactor.tick().unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);

        reactor
            .mod_fd(r, Interest::READABLE, Mode::EdgeOneshot)
            .unwrap();
        reactor.tick().unwrap();
        assert_eq!(*hits.lock().unwrap(), 2);

        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn shutdown_is_reentrant() {
        let reactor = Reactor::new().unwrap();
        reactor.shutdown();
        reactor.shutdown();
    }
}
