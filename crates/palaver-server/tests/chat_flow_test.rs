//! End-to-end chat flow over real sockets.
//!
//! Runs the server on an ephemeral loopback port and drives it with plain
//! blocking `std::net` clients speaking the fixed-frame protocol.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use palaver_proto::{FRAME_LEN, Frame};
use palaver_server::{Server, ServerConfig};

/// Give the event loop time to observe a step before taking the next one.
const SETTLE: Duration = Duration::from_millis(300);

fn start_server() -> SocketAddr {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_owned(),
        poll_timeout: Duration::from_millis(50),
    };
    let server = Server::bind(config).expect("bind server");
    let addr = server.local_addr().expect("local addr");
    thread::spawn(move || {
        server.run();
    });
    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).expect("read timeout");
    thread::sleep(SETTLE);
    stream
}

fn send(stream: &mut TcpStream, text: &str) {
    stream.write_all(Frame::encode(text).as_bytes()).expect("send frame");
    thread::sleep(SETTLE);
}

fn recv(stream: &mut TcpStream) -> String {
    let mut bytes = [0u8; FRAME_LEN];
    stream.read_exact(&mut bytes).expect("receive frame");
    Frame::from_wire(bytes).decode().into_owned()
}

#[test]
fn two_client_chat_rename_and_disconnect_flow() {
    let addr = start_server();

    let mut client1 = connect(addr);
    let mut client2 = connect(addr);

    // The join notice goes to everyone except the new client.
    assert_eq!(recv(&mut client1), "User2 connected");

    // Chat is prefixed with the sender's name and not echoed back.
    send(&mut client1, "hello");
    assert_eq!(recv(&mut client2), "User1: hello");

    // The rename notice reaches everyone, including the renamer.
    send(&mut client1, "!USERINFO Bob");
    assert_eq!(recv(&mut client1), "User1 changed name to Bob");
    assert_eq!(recv(&mut client2), "User1 changed name to Bob");

    // Subsequent chat uses the new name.
    send(&mut client1, "hi");
    assert_eq!(recv(&mut client2), "Bob: hi");

    // Disconnect produces exactly one leave notice for the survivor.
    drop(client2);
    thread::sleep(SETTLE);
    assert_eq!(recv(&mut client1), "User2 has disconnected");

    // client1 never received the echo of its own messages: every frame it
    // saw is accounted for above, so the next read must time out.
    let mut probe = [0u8; FRAME_LEN];
    client1.set_read_timeout(Some(Duration::from_millis(500))).expect("read timeout");
    assert!(client1.read_exact(&mut probe).is_err());
}

#[test]
fn three_clients_all_peers_receive_chat() {
    let addr = start_server();

    let mut client1 = connect(addr);
    let mut client2 = connect(addr);
    let mut client3 = connect(addr);

    // Drain join notices: client1 sees two joins, client2 sees one.
    assert_eq!(recv(&mut client1), "User2 connected");
    assert_eq!(recv(&mut client1), "User3 connected");
    assert_eq!(recv(&mut client2), "User3 connected");

    send(&mut client2, "to everyone");
    assert_eq!(recv(&mut client1), "User2: to everyone");
    assert_eq!(recv(&mut client3), "User2: to everyone");
}

#[test]
fn registry_and_watch_set_stay_in_lock_step() {
    // Drive the loop manually so membership can be checked between
    // iterations instead of racing a background thread.
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_owned(),
        poll_timeout: Duration::from_millis(50),
    };
    let mut server = Server::bind(config).expect("bind server");
    let addr = server.local_addr().expect("local addr");

    let assert_lock_step = |server: &Server, expected: usize| {
        assert_eq!(server.connection_count(), expected);
        assert_eq!(server.registered_count(), expected);
        assert_eq!(server.watched_count(), expected);
    };

    assert_lock_step(&server, 0);

    let client1 = TcpStream::connect(addr).expect("connect");
    let client2 = TcpStream::connect(addr).expect("connect");
    for _ in 0..20 {
        server.poll_once();
        if server.connection_count() == 2 {
            break;
        }
    }
    assert_lock_step(&server, 2);

    drop(client1);
    for _ in 0..20 {
        server.poll_once();
        if server.connection_count() == 1 {
            break;
        }
    }
    assert_lock_step(&server, 1);

    drop(client2);
    for _ in 0..20 {
        server.poll_once();
        if server.connection_count() == 0 {
            break;
        }
    }
    assert_lock_step(&server, 0);
}
