use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use vortex::net::tcp::ServerSocket;
use vortex::{Interest, Mode, Reactor};

/// One reactor accepts on `127.0.0.1:<ephemeral>` and echoes back whatever
/// the client sends, entirely from the listening socket's readable callback
/// (a single short-lived connection per tick, which is all this scenario
/// needs).
#[test]
fn echoes_bytes_back_to_client() {
    drop(env_logger::try_init());

    let server = ServerSocket::listen_req("127.0.0.1", 0).unwrap();
    let port = server.local_port().unwrap();
    let listen_fd = server.raw();
    unsafe {
        let flags = libc::fcntl(listen_fd, libc::F_GETFL, 0);
        libc::fcntl(listen_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }

    let mut reactor = Reactor::new().unwrap();
    reactor
        .add_fd_with(
            listen_fd,
            Interest::READABLE,
            Mode::Level,
            Box::new(move |_fd| loop {
                let accepted =
                    unsafe { libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
                if accepted < 0 {
                    break;
                }
                let mut buf = [0u8; 64];
                let n = unsafe {
                    libc::read(accepted, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n > 0 {
                    unsafe {
                        libc::write(accepted, buf.as_ptr() as *const libc::c_void, n as usize);
                    }
                }
                unsafe {
                    libc::close(accepted);
                }
            }),
        )
        .unwrap();

    let handle = reactor.handle();
    let join = thread::spawn(move || reactor.activate());
    thread::sleep(Duration::from_millis(30));

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(b"hello, echo").unwrap();
    thread::sleep(Duration::from_millis(30));

    let mut buf = [0u8; 11];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello, echo");

    handle.shutdown();
    join.join().unwrap().unwrap();
}
