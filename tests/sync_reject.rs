use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wsprobe::{Server, Settings};

use log::debug;

const REJECT_BODY: &str = "only ws connections are accepted";

fn reply_to(server: &Server, request: &[u8]) -> String {
    let mut tcp = TcpStream::connect(server.local_addr()).unwrap();
    tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    tcp.write_all(request).unwrap();

    // the server closes after the reply
    let mut buf = Vec::new();
    tcp.read_to_end(&mut buf).unwrap();
    debug!("client: got {} bytes", buf.len());
    String::from_utf8(buf).unwrap()
}

#[test]
fn sync_reject() {
    let _ = env_logger::try_init();

    let upgraded = Arc::new(AtomicUsize::new(0));
    let settings = {
        let upgraded = upgraded.clone();
        Settings::new()
            .port(0)
            .bind_loopback_only(true)
            .poll_interval(Duration::from_millis(5))
            .on_new_client(move |_, _| {
                upgraded.fetch_add(1, Ordering::SeqCst);
            })
    };
    let server = Server::start(settings).unwrap();

    for request in [
        &b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"[..],
        b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nUpgrade: h2c\r\nConnection: Upgrade\r\n\r\n",
        b"POST / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
    ] {
        let reply = reply_to(&server, request);
        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", reply);
        assert!(reply.contains("\r\nConnection: close\r\n"));
        assert!(reply.contains(&format!("\r\nContent-Length: {}\r\n", REJECT_BODY.len())));
        assert!(reply.ends_with(REJECT_BODY));
    }

    assert_eq!(upgraded.load(Ordering::SeqCst), 0);
    assert_eq!(server.handle().client_count(), 0);
}
