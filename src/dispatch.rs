//! Multi-loop "one-reactor-per-thread" dispatcher: a root reactor accepts
//! and round-robins accepted fds out to `N` worker reactors over connected
//! socket pairs, skipping a worker that can't take the handoff right now
//! and recording the fd on an overflow list instead. Each worker installs
//! a default connect callback unless the caller set its own, bridges the
//! dispatcher's uniform callbacks onto its own reactor only where the
//! worker hasn't set its own, then activates.

use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::fd::Fd;
use crate::interest::{Interest, Mode};
use crate::reactor::{FdCallback, Reactor, ReactorConfig, TimeoutCallback};
use crate::sys::unix::sockopt;

/// Invoked on a worker's own reactor with the freshly-accepted fd, so the
/// callback can register it (the default does `set_nonblocking` plus an
/// edge-triggered readable registration).
pub type ConnectCallback = Arc<dyn Fn(&mut Reactor, RawFd) + Send + Sync>;
/// Uniform per-fd callback applied to every worker that hasn't set its own.
pub type UniformCallback = Arc<dyn Fn(RawFd) + Send + Sync>;
/// Uniform timeout callback applied to every worker that hasn't set its own.
pub type UniformTimeoutCallback = Arc<dyn Fn() + Send + Sync>;

const DEFAULT_WORKER_COUNT: usize = 4;
/// Wire size of one queued fd identifier: native-endian u16. This never
/// crosses a host boundary so there's no need for an on-the-wire byte order.
const FD_WIRE_SIZE: usize = std::mem::size_of::<u16>();
const WORKER_BUF_LEN: usize = 128 - (128 % FD_WIRE_SIZE);

/// Tunables for [`ConcurrentReactors::init_workers`].
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub worker_count: usize,
    pub worker_timeout_ms: i64,
}

impl Default for DispatchConfig {
    fn default() -> DispatchConfig {
        DispatchConfig {
            worker_count: DEFAULT_WORKER_COUNT,
            worker_timeout_ms: -1,
        }
    }
}

struct PendingWorker {
    reactor: Reactor,
    read_fd: Fd,
    write_fd: Fd,
}

/// Root reactor plus N worker reactors, each run on its own thread.
pub struct ConcurrentReactors {
    root: Reactor,
    listener: Option<Fd>,
    pending: Vec<PendingWorker>,
    worker_writers: Vec<Fd>,
    worker_write_fds: Arc<Mutex<Vec<RawFd>>>,
    worker_handles: Vec<crate::reactor::ReactorHandle>,
    cursor: Arc<Mutex<usize>>,
    join_handles: Vec<JoinHandle<()>>,
    overflow: Arc<Mutex<Vec<RawFd>>>,
    connect_cb: Option<ConnectCallback>,
    readable_cb: Option<UniformCallback>,
    writable_cb: Option<UniformCallback>,
    disconnect_cb: Option<UniformCallback>,
    timeout_cb: Option<UniformTimeoutCallback>,
}

impl ConcurrentReactors {
    pub fn new() -> Result<ConcurrentReactors> {
        Ok(ConcurrentReactors {
            root: Reactor::new()?,
            listener: None,
            pending: Vec::new(),
            worker_writers: Vec::new(),
            worker_write_fds: Arc::new(Mutex::new(Vec::new())),
            worker_handles: Vec::new(),
            cursor: Arc::new(Mutex::new(0)),
            join_handles: Vec::new(),
            overflow: Arc::new(Mutex::new(Vec::new())),
            connect_cb: None,
            readable_cb: None,
            writable_cb: None,
            disconnect_cb: None,
            timeout_cb: None,
        })
    }

    /// The root reactor, for registering anything besides the listener.
    pub fn root(&mut self) -> &mut Reactor {
        &mut self.root
    }

    /// Takes ownership of a bound, listening socket, sets it non-blocking,
    /// and registers the accept loop on the root reactor.
    pub fn bind_listening_socket(&mut self, sock: Fd) -> Result<()> {
        let fd = sock.raw();
        sockopt::set_nonblocking(fd, true)?;
        self.listener = Some(sock);

        let write_fds = Arc::clone(&self.worker_write_fds);
        let cursor = Arc::clone(&self.cursor);
        let overflow = Arc::clone(&self.overflow);
        self.root.add_fd_with(
            fd,
            Interest::READABLE,
            Mode::Edge,
            Box::new(move |listen_fd| {
                accept_loop(listen_fd, &write_fds, &cursor, &overflow);
            }),
        )?;
        Ok(())
    }

    /// Creates `config.worker_count` worker contexts, each with its own
    /// reactor and a connected socket pair for fd handoff. Safe to call
    /// more than once to add further workers before [`Self::activate`].
    pub fn init_workers(&mut self, config: DispatchConfig) -> Result<()> {
        assert!(config.worker_count > 0, "worker_count must be positive");
        for _ in 0..config.worker_count {
            let reactor = Reactor::with_config(ReactorConfig {
                initial_timeout_ms: config.worker_timeout_ms,
                ..ReactorConfig::default()
            })?;
            self.worker_handles.push(reactor.handle());
            let (read_fd, write_fd) = socketpair()?;
            sockopt::set_nonblocking(write_fd.raw(), true)?;
            self.worker_write_fds
                .lock()
                .expect("worker_write_fds mutex poisoned")
                .push(write_fd.raw());
            self.pending.push(PendingWorker {
                reactor,
                read_fd,
                write_fd,
            });
        }
        Ok(())
    }

    pub fn set_connect_cb<F>(&mut self, cb: F)
    where
        F: Fn(&mut Reactor, RawFd) + Send + Sync + 'static,
    {
        self.connect_cb = Some(Arc::new(cb));
    }

    pub fn set_readable_cb<F>(&mut self, cb: F)
    where
        F: Fn(RawFd) + Send + Sync + 'static,
    {
        self.readable_cb = Some(Arc::new(cb));
    }

    pub fn set_writable_cb<F>(&mut self, cb: F)
    where
        F: Fn(RawFd) + Send + Sync + 'static,
    {
        self.writable_cb = Some(Arc::new(cb));
    }

    pub fn set_disconnect_cb<F>(&mut self, cb: F)
    where
        F: Fn(RawFd) + Send + Sync + 'static,
    {
        self.disconnect_cb = Some(Arc::new(cb));
    }

    pub fn set_timeout_cb<F>(&mut self, cb: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.timeout_cb = Some(Arc::new(cb));
    }

    /// Fds the dispatcher could not currently hand off to any worker
    /// (every worker's socket-pair send buffer was full). The caller
    /// decides whether to retry, log, or close these.
    pub fn failure_fds(&self) -> Vec<RawFd> {
        self.overflow
            .lock()
            .expect("overflow mutex poisoned")
            .clone()
    }

    /// Spawns one thread per worker, then runs the root reactor's loop on
    /// the calling thread. Blocks until [`Self::destroy`] is called from
    /// another thread. Requires [`Self::bind_listening_socket`] to have
    /// run first; lazily creates the default worker count if
    /// [`Self::init_workers`] was never called.
    pub fn activate(&mut self) -> Result<()> {
        if self.listener.is_none() {
            return Err(Error::NotBound);
        }
        if self.pending.is_empty() {
            self.init_workers(DispatchConfig::default())?;
        }

        for pending in self.pending.drain(..) {
            let connect_cb = self.connect_cb.clone();
            let readable_cb = self.readable_cb.clone();
            let writable_cb = self.writable_cb.clone();
            let disconnect_cb = self.disconnect_cb.clone();
            let timeout_cb = self.timeout_cb.clone();

            let join = thread::Builder::new()
                .name("vortex-worker".into())
                .spawn(move || {
                    worker_main(
                        pending.reactor,
                        pending.read_fd,
                        connect_cb,
                        readable_cb,
                        writable_cb,
                        disconnect_cb,
                        timeout_cb,
                    );
                })
                .expect("failed to spawn worker thread");
            self.join_handles.push(join);
            self.worker_writers.push(pending.write_fd);
        }

        self.root.activate()?;
        Ok(())
    }

    /// Every reactor's shutdown handle: the root's, then each worker's
    /// (captured in [`Self::init_workers`], before the worker's `Reactor`
    /// moves onto its own thread in [`Self::activate`]).
    pub fn handles(&self) -> Vec<crate::reactor::ReactorHandle> {
        let mut handles = Vec::with_capacity(1 + self.worker_handles.len());
        handles.push(self.root.handle());
        handles.extend(self.worker_handles.iter().cloned());
        handles
    }

    /// Signals the root reactor and every worker reactor to stop, then
    /// detaches the worker threads (drops their `JoinHandle`s without
    /// joining) so each finishes its in-flight callback and exits on its
    /// own rather than blocking this call.
    pub fn destroy(&mut self) {
        self.root.shutdown();
        for handle in self.worker_handles.drain(..) {
            handle.shutdown();
        }
        self.worker_writers.clear();
        self.join_handles.clear();
    }
}

fn accept_loop(
    listen_fd: RawFd,
    worker_write_fds: &Arc<Mutex<Vec<RawFd>>>,
    cursor: &Arc<Mutex<usize>>,
    overflow: &Arc<Mutex<Vec<RawFd>>>,
) {
    let writers = worker_write_fds
        .lock()
        .expect("worker_write_fds mutex poisoned");
    if writers.is_empty() {
        return;
    }
    let mut cur = cursor.lock().expect("cursor mutex poisoned");

    loop {
        let accepted =
            unsafe { libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if accepted < 0 {
            break;
        }

        let id = accepted as u16;
        let bytes = id.to_ne_bytes();
        let start = *cur % writers.len();
        let mut handed_off = false;
        for step in 0..writers.len() {
            let idx = (start + step) % writers.len();
            let n = unsafe {
                libc::write(writers[idx], bytes.as_ptr() as *const libc::c_void, bytes.len())
            };
            if n == bytes.len() as isize {
                *cur = (idx + 1) % writers.len();
                handed_off = true;
                break;
            }
        }
        if !handed_off {
            overflow
                .lock()
                .expect("overflow mutex poisoned")
                .push(accepted);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    mut reactor: Reactor,
    read_fd: Fd,
    connect_cb: Option<ConnectCallback>,
    readable_cb: Option<UniformCallback>,
    writable_cb: Option<UniformCallback>,
    disconnect_cb: Option<UniformCallback>,
    timeout_cb: Option<UniformTimeoutCallback>,
) {
    let notify_fd = read_fd.raw();
    if let Err(e) = sockopt::set_nonblocking(notify_fd, true) {
        log::warn!("vortex worker: failed to set notify fd non-blocking: {e}");
        return;
    }

    let connect_cb = connect_cb.unwrap_or_else(|| {
        Arc::new(|rec: &mut Reactor, fd: RawFd| {
            let _ = sockopt::set_nonblocking(fd, true);
            let _ = rec.add_fd(fd, Interest::READABLE, Mode::Edge);
        })
    });

    // A uniform callback only ever displaces the worker's own if the
    // worker hasn't set one.
    if let Some(cb) = readable_cb {
        if !reactor.has_readable_cb() {
            reactor.set_readable_cb(to_fd_callback(cb));
        }
    }
    if let Some(cb) = writable_cb {
        if !reactor.has_writable_cb() {
            reactor.set_writable_cb(to_fd_callback(cb));
        }
    }
    if let Some(cb) = disconnect_cb {
        if !reactor.has_disconnect_cb() {
            reactor.set_disconnect_cb(to_fd_callback(cb));
        }
    }
    if let Some(cb) = timeout_cb {
        if !reactor.has_timeout_cb() {
            let cb: TimeoutCallback = Box::new(move || cb());
            reactor.set_timeout_cb(cb);
        }
    }

    // SAFETY: this pointer is only ever dereferenced from inside a
    // callback invoked synchronously by `reactor`'s own `tick()`, on this
    // same thread, for as long as `reactor` is alive below. `activate()`
    // takes `&mut Reactor` rather than moving it, so the pointee's address
    // stays stable for the whole borrow.
    let reactor_ptr: *mut Reactor = &mut reactor;
    let decode_cb: FdCallback = Box::new(move |fd| {
        let mut buf = [0u8; WORKER_BUF_LEN];
        loop {
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n <= 0 {
                break;
            }
            let count = n as usize / FD_WIRE_SIZE;
            for i in 0..count {
                let bytes = [buf[i * FD_WIRE_SIZE], buf[i * FD_WIRE_SIZE + 1]];
                let accepted_fd = u16::from_ne_bytes(bytes) as RawFd;
                let rec = unsafe { &mut *reactor_ptr };
                connect_cb(rec, accepted_fd);
            }
        }
    });

    if let Err(e) = reactor.add_fd_with(notify_fd, Interest::READABLE, Mode::Edge, decode_cb) {
        log::warn!("vortex worker: failed to register notify fd: {e}");
        return;
    }

    if let Err(e) = reactor.activate() {
        log::warn!("vortex worker: reactor loop exited with error: {e}");
    }
}

fn to_fd_callback(cb: UniformCallback) -> FdCallback {
    Box::new(move |fd| cb(fd))
}

fn socketpair() -> Result<(Fd, Fd)> {
    let mut fds = [0; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    // SAFETY: socketpair just handed us two freshly-opened, exclusively
    // owned, connected descriptors.
    Ok(unsafe { (Fd::from_raw(fds[0]), Fd::from_raw(fds[1])) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::net::tcp::ServerSocket;

    #[test]
    fn round_robins_across_workers() {
        let mut dispatcher = ConcurrentReactors::new().unwrap();
        dispatcher
            .init_workers(DispatchConfig {
                worker_count: 2,
                worker_timeout_ms: 50,
            })
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        dispatcher.set_readable_cb(move |fd: RawFd| {
            let mut buf = [0u8; 16];
            unsafe {
                libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
            }
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let listener = ServerSocket::listen_req("127.0.0.1", 0).unwrap();
        let port = listener.local_port().unwrap();
        dispatcher
            .bind_listening_socket(listener.into_fd())
            .unwrap();

        let handles = dispatcher.handles();
        let t = thread::spawn(move || {
            dispatcher.activate().unwrap();
            dispatcher
        });
        thread::sleep(Duration::from_millis(50));

        for _ in 0..4 {
            let mut s = TcpStream::connect(("127.0.0.1", port)).unwrap();
            s.write_all(b"hi").unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(100));

        for h in handles {
            h.shutdown();
        }
        let mut dispatcher = t.join().unwrap();
        dispatcher.destroy();

        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn saturated_writer_overflows_instead_of_handoff() {
        // Pre-fill the handoff socket's send buffer so the real accept_loop
        // can't write the 2-byte fd id into it, proving the fd lands on
        // the overflow list instead.
        let (_read_fd, write_fd) = socketpair().unwrap();
        sockopt::set_nonblocking(write_fd.raw(), true).unwrap();
        let mut filler = [0u8; 4096];
        loop {
            let n = unsafe {
                libc::write(
                    write_fd.raw(),
                    filler.as_mut_ptr() as *const libc::c_void,
                    filler.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }

        let listener = ServerSocket::listen_req("127.0.0.1", 0).unwrap();
        let port = listener.local_port().unwrap();
        sockopt::set_nonblocking(listener.raw(), true).unwrap();
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(20));

        let writers = Arc::new(Mutex::new(vec![write_fd.raw()]));
        let cursor = Arc::new(Mutex::new(0));
        let overflow = Arc::new(Mutex::new(Vec::new()));
        accept_loop(listener.raw(), &writers, &cursor, &overflow);

        let failures = overflow.lock().unwrap();
        assert_eq!(failures.len(), 1);
    }
}
