#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};
use switchyard::prelude::*;

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Block until `socket` has at least `n` attached peers.
pub fn wait_for_peers(socket: &Socket, n: usize) {
    let deadline = Instant::now() + PATIENCE;
    while socket.peer_count() < n {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {n} peers (have {})",
            socket.peer_count()
        );
        thread::sleep(Duration::from_millis(2));
    }
}

/// Block until `socket` has no attached peers left.
pub fn wait_for_no_peers(socket: &Socket) {
    let deadline = Instant::now() + PATIENCE;
    while socket.peer_count() > 0 {
        assert!(Instant::now() < deadline, "peers never went away");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Make blocking receives fail instead of hanging a broken test.
pub fn bounded_recv(socket: &Socket) {
    socket
        .set_option(SocketOption::RecvTimeout(Some(PATIENCE)))
        .unwrap();
}

pub fn text(msg: &Message) -> Vec<String> {
    msg.frames()
        .iter()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect()
}
