use std::io::Write;
use std::net::TcpStream;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vortex::net::tcp::ServerSocket;
use vortex::{ConcurrentReactors, DispatchConfig};

/// 4 workers, 16 clients connecting in rapid succession: each worker should
/// receive exactly 4 of the accepted fds.
#[test]
fn distributes_sixteen_clients_across_four_workers() {
    drop(env_logger::try_init());

    const WORKERS: usize = 4;
    const CLIENTS: usize = 16;

    let mut dispatcher = ConcurrentReactors::new().unwrap();
    dispatcher
        .init_workers(DispatchConfig {
            worker_count: WORKERS,
            worker_timeout_ms: 50,
        })
        .unwrap();

    let hits = Arc::new(Mutex::new(vec![0usize; WORKERS]));
    let next_worker_slot = Arc::new(AtomicUsize::new(0));
    let thread_slots: Arc<Mutex<std::collections::HashMap<std::thread::ThreadId, usize>>> =
        Arc::new(Mutex::new(std::collections::HashMap::new()));

    let hits2 = Arc::clone(&hits);
    let next_worker_slot2 = Arc::clone(&next_worker_slot);
    let thread_slots2 = Arc::clone(&thread_slots);
    dispatcher.set_readable_cb(move |fd: RawFd| {
        let tid = thread::current().id();
        let slot = *thread_slots2.lock().unwrap().entry(tid).or_insert_with(|| {
            next_worker_slot2.fetch_add(1, Ordering::SeqCst)
        });

        let mut buf = [0u8; 16];
        unsafe {
            libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
        }
        hits2.lock().unwrap()[slot % WORKERS] += 1;
    });

    let listener = ServerSocket::listen_req("127.0.0.1", 0).unwrap();
    let port = listener.local_port().unwrap();
    dispatcher.bind_listening_socket(listener.into_fd()).unwrap();

    let handles = dispatcher.handles();
    let join = thread::spawn(move || {
        dispatcher.activate().unwrap();
        dispatcher
    });
    thread::sleep(Duration::from_millis(50));

    for _ in 0..CLIENTS {
        let mut s = TcpStream::connect(("127.0.0.1", port)).unwrap();
        s.write_all(b"hi").unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(150));

    for h in handles {
        h.shutdown();
    }
    let mut dispatcher = join.join().unwrap();
    dispatcher.destroy();

    let totals = hits.lock().unwrap();
    assert_eq!(totals.iter().sum::<usize>(), CLIENTS);
    // Distinct worker threads each took an equal share, since the dispatcher
    // hands connections off round robin and every client sent exactly once.
    assert_eq!(totals.len(), WORKERS);
    for &count in totals.iter() {
        assert_eq!(count, CLIENTS / WORKERS);
    }
}
