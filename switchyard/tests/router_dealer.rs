//! ROUTER/DEALER tests: identity routing, peer registry, broker chains.

mod common;

use bytes::Bytes;
use common::{bounded_recv, text, wait_for_no_peers, wait_for_peers, PATIENCE};
use std::thread;
use std::time::{Duration, Instant};
use switchyard::prelude::*;
use switchyard::{Error, SocketEvent};

fn router(ctx: &Context, name: &str) -> Socket {
    let router = ctx.socket(SocketType::Router).unwrap();
    bounded_recv(&router);
    router.bind(&format!("inproc://{name}")).unwrap();
    router
}

fn dealer(ctx: &Context, name: &str, identity: Option<&'static str>) -> Socket {
    let dealer = ctx.socket(SocketType::Dealer).unwrap();
    bounded_recv(&dealer);
    if let Some(identity) = identity {
        dealer
            .set_option(SocketOption::Identity(Bytes::from_static(identity.as_bytes())))
            .unwrap();
    }
    dealer.connect(&format!("inproc://{name}")).unwrap();
    dealer
}

/// ROUTER prefixes the sender's identity and routes replies by it
#[test]
fn test_router_routes_by_identity() {
    let ctx = Context::new(1).unwrap();
    let router = router(&ctx, "rd-identity");
    let alice = dealer(&ctx, "rd-identity", Some("alice"));
    let bob = dealer(&ctx, "rd-identity", Some("bob"));
    wait_for_peers(&router, 2);

    alice.send("from alice", SendFlags::empty()).unwrap();
    bob.send("from bob", SendFlags::empty()).unwrap();

    for _ in 0..2 {
        let msg = router.recv(RecvFlags::empty()).unwrap();
        let frames = text(&msg);
        match frames[0].as_str() {
            "alice" => assert_eq!(frames[1], "from alice"),
            "bob" => assert_eq!(frames[1], "from bob"),
            other => panic!("unexpected identity {other}"),
        }
    }

    router
        .send(Message::new().push_str("bob").push_str("hi bob"), SendFlags::empty())
        .unwrap();
    router
        .send(Message::new().push_str("alice").push_str("hi alice"), SendFlags::empty())
        .unwrap();
    assert_eq!(text(&alice.recv(RecvFlags::empty()).unwrap()), ["hi alice"]);
    assert_eq!(text(&bob.recv(RecvFlags::empty()).unwrap()), ["hi bob"]);
}

/// Peers without an identity get a generated one
#[test]
fn test_router_generates_identity() {
    let ctx = Context::new(1).unwrap();
    let router = router(&ctx, "rd-generated");
    let anon = dealer(&ctx, "rd-generated", None);
    wait_for_peers(&router, 1);

    anon.send("hello", SendFlags::empty()).unwrap();
    let msg = router.recv(RecvFlags::empty()).unwrap();
    let identity = msg.frames()[0].clone();
    assert_eq!(identity.len(), 5);
    assert_eq!(identity[0], 0);

    let reply = Message::new().push(identity).push_str("welcome");
    router.send(reply, SendFlags::empty()).unwrap();
    assert_eq!(text(&anon.recv(RecvFlags::empty()).unwrap()), ["welcome"]);
}

#[test]
fn test_router_addressing_errors() {
    let ctx = Context::new(1).unwrap();
    let router = router(&ctx, "rd-errors");

    match router.send(Message::new().push_str("nobody").push_str("x"), SendFlags::empty()) {
        Err(Error::UnknownPeer(identity)) => assert_eq!(identity.as_ref(), b"nobody"),
        other => panic!("expected UnknownPeer, got {other:?}"),
    }
    assert!(matches!(
        router.send("identity only", SendFlags::empty()),
        Err(Error::MalformedMessage(_))
    ));
}

/// A second peer claiming a taken identity is rejected
#[test]
fn test_router_rejects_duplicate_identity() {
    let ctx = Context::new(1).unwrap();
    let router = router(&ctx, "rd-duplicate");
    let events = router.monitor();
    let _first = dealer(&ctx, "rd-duplicate", Some("twin"));
    wait_for_peers(&router, 1);
    let _second = dealer(&ctx, "rd-duplicate", Some("twin"));

    let deadline = Instant::now() + PATIENCE;
    let mut rejected = false;
    while !rejected && Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
            rejected = matches!(event, SocketEvent::PeerRejected { .. });
        }
    }
    assert!(rejected);
    assert_eq!(router.peer_count(), 1);
}

/// Identity changes are validated
#[test]
fn test_invalid_identity_rejected() {
    let ctx = Context::new(1).unwrap();
    let socket = ctx.socket(SocketType::Dealer).unwrap();
    assert!(matches!(
        socket.set_option(SocketOption::Identity(Bytes::new())),
        Err(Error::InvalidOption(_))
    ));
    assert!(matches!(
        socket.set_option(SocketOption::Identity(Bytes::from_static(b"\0reserved"))),
        Err(Error::InvalidOption(_))
    ));
}

/// Once the peer is gone its identity is unknown again
#[test]
fn test_router_forgets_disconnected_peer() {
    let ctx = Context::new(1).unwrap();
    let router = router(&ctx, "rd-forget");
    let gone = dealer(&ctx, "rd-forget", Some("gone"));
    wait_for_peers(&router, 1);

    drop(gone);
    wait_for_no_peers(&router);
    assert!(matches!(
        router.send(Message::new().push_str("gone").push_str("x"), SendFlags::empty()),
        Err(Error::UnknownPeer(_))
    ));
}

/// Silent peers are dropped after the idle timeout
#[test]
fn test_router_peer_idle_timeout() {
    let ctx = Context::new(1).unwrap();
    let router = ctx.socket(SocketType::Router).unwrap();
    router
        .set_option(SocketOption::PeerIdleTimeout(Some(Duration::from_millis(100))))
        .unwrap();
    router.bind("inproc://rd-idle").unwrap();
    let quiet = dealer(&ctx, "rd-idle", Some("quiet"));
    wait_for_peers(&router, 1);

    quiet.send("once", SendFlags::empty()).unwrap();
    wait_for_no_peers(&router);
}

/// DEALER load-balances over ROUTER peers and fair-queues replies
#[test]
fn test_dealer_load_balances() {
    let ctx = Context::new(2).unwrap();
    let dealer = ctx.socket(SocketType::Dealer).unwrap();
    bounded_recv(&dealer);
    dealer.bind("inproc://rd-dealer-lb").unwrap();

    let routers: Vec<Socket> = (0..2)
        .map(|_| {
            let router = ctx.socket(SocketType::Router).unwrap();
            router
                .set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(200))))
                .unwrap();
            router.connect("inproc://rd-dealer-lb").unwrap();
            router
        })
        .collect();
    wait_for_peers(&dealer, 2);

    for i in 0..10u32 {
        dealer.send(Message::new().push_u32(i), SendFlags::empty()).unwrap();
    }
    for router in &routers {
        let mut count = 0;
        while let Ok(mut msg) = router.recv(RecvFlags::empty()) {
            let identity = msg.pop_front().unwrap();
            router
                .send(Message::new().push(identity).push_str("ack"), SendFlags::empty())
                .unwrap();
            count += 1;
        }
        assert_eq!(count, 5);
    }
    for _ in 0..10 {
        assert_eq!(text(&dealer.recv(RecvFlags::empty()).unwrap()), ["ack"]);
    }
}

/// REQ → ROUTER ⇄ proxy ⇄ DEALER → REP: replies find their way back
#[test]
fn test_broker_chain_through_proxy() {
    let ctx = Context::new(2).unwrap();
    let frontend = ctx.socket(SocketType::Router).unwrap();
    frontend.bind("inproc://rd-broker-front").unwrap();
    let backend = ctx.socket(SocketType::Dealer).unwrap();
    backend.bind("inproc://rd-broker-back").unwrap();

    let worker = ctx.socket(SocketType::Rep).unwrap();
    worker
        .set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(300))))
        .unwrap();
    worker.connect("inproc://rd-broker-back").unwrap();

    let clients: Vec<Socket> = (0..3)
        .map(|_| {
            let client = ctx.socket(SocketType::Req).unwrap();
            bounded_recv(&client);
            client.connect("inproc://rd-broker-front").unwrap();
            client
        })
        .collect();
    wait_for_peers(&frontend, 3);
    wait_for_peers(&backend, 1);

    thread::scope(|s| {
        let broker = s.spawn(|| switchyard::proxy(&frontend, &backend, None));
        s.spawn(|| {
            while let Ok(request) = worker.recv(RecvFlags::empty()) {
                let mut reply = text(&request).remove(0);
                reply.insert_str(0, "re:");
                worker.send(reply, SendFlags::empty()).unwrap();
            }
        });

        for round in 0..5 {
            for (i, client) in clients.iter().enumerate() {
                let body = format!("c{i}-r{round}");
                client.send(body.clone(), SendFlags::empty()).unwrap();
                assert_eq!(
                    text(&client.recv(RecvFlags::empty()).unwrap()),
                    [format!("re:{body}")]
                );
            }
        }

        frontend.close();
        assert!(matches!(broker.join().unwrap(), Err(Error::Closed)));
    });
}
