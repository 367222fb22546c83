//! Poller tests over sockets and raw readiness sources.

mod common;

use common::{bounded_recv, wait_for_peers};
use std::thread;
use std::time::{Duration, Instant};
use switchyard::prelude::*;
use switchyard::Queue;

/// Only the socket with pending input is reported
#[test]
fn test_poll_reports_only_ready_socket() {
    let ctx = Context::new(1).unwrap();
    let pulls: Vec<Socket> = (0..3)
        .map(|i| {
            let pull = ctx.socket(SocketType::Pull).unwrap();
            pull.bind(&format!("inproc://poll-only-{i}")).unwrap();
            pull
        })
        .collect();
    let push = ctx.socket(SocketType::Push).unwrap();
    push.connect("inproc://poll-only-1").unwrap();
    wait_for_peers(&pulls[1], 1);

    let items: Vec<PollItem<'_>> = pulls.iter().map(|p| PollItem::readable(p)).collect();
    assert!(poll(&items, Some(Duration::ZERO)).unwrap().is_empty());

    push.send("wake", SendFlags::empty()).unwrap();
    let ready = poll(&items, Some(common::PATIENCE)).unwrap();
    assert_eq!(ready, vec![(1, PollEvents::IN)]);

    // readiness is not consumption
    assert_eq!(poll(&items, Some(Duration::ZERO)).unwrap(), ready);
    bounded_recv(&pulls[1]);
    pulls[1].recv(RecvFlags::empty()).unwrap();
    assert!(poll(&items, Some(Duration::ZERO)).unwrap().is_empty());
}

#[test]
fn test_poll_zero_timeout_returns_immediately() {
    let ctx = Context::new(1).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    let items = [PollItem::readable(&pull)];

    let start = Instant::now();
    assert!(poll(&items, Some(Duration::ZERO)).unwrap().is_empty());
    assert!(start.elapsed() < Duration::from_millis(50));
}

/// A blocked poll wakes when a message arrives from another thread
#[test]
fn test_poll_wakes_on_arrival() {
    let ctx = Context::new(1).unwrap();
    let pair_a = ctx.socket(SocketType::Pair).unwrap();
    pair_a.bind("inproc://poll-wake").unwrap();
    let pair_b = ctx.socket(SocketType::Pair).unwrap();
    pair_b.connect("inproc://poll-wake").unwrap();
    wait_for_peers(&pair_b, 1);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(40));
            pair_b.send("late", SendFlags::empty()).unwrap();
        });
        let items = [PollItem::readable(&pair_a)];
        let start = Instant::now();
        let ready = poll(&items, None).unwrap();
        assert_eq!(ready, vec![(0, PollEvents::IN)]);
        assert!(start.elapsed() >= Duration::from_millis(30));
    });
}

/// REQ/REP readiness follows the state machine
#[test]
fn test_poll_follows_req_rep_state() {
    let ctx = Context::new(1).unwrap();
    let rep = ctx.socket(SocketType::Rep).unwrap();
    bounded_recv(&rep);
    rep.bind("inproc://poll-reqrep").unwrap();
    let req = ctx.socket(SocketType::Req).unwrap();
    bounded_recv(&req);
    req.connect("inproc://poll-reqrep").unwrap();
    wait_for_peers(&req, 1);

    let both = PollEvents::IN | PollEvents::OUT;
    let req_item = [PollItem::new(&req, both)];
    let rep_item = [PollItem::new(&rep, both)];

    assert_eq!(poll(&req_item, Some(Duration::ZERO)).unwrap(), vec![(0, PollEvents::OUT)]);
    assert!(poll(&rep_item, Some(Duration::ZERO)).unwrap().is_empty());

    req.send("q", SendFlags::empty()).unwrap();
    assert!(poll(&req_item, Some(Duration::ZERO)).unwrap().is_empty());
    assert_eq!(poll(&rep_item, None).unwrap(), vec![(0, PollEvents::IN)]);

    rep.recv(RecvFlags::empty()).unwrap();
    assert_eq!(poll(&rep_item, Some(Duration::ZERO)).unwrap(), vec![(0, PollEvents::OUT)]);
    rep.send("a", SendFlags::empty()).unwrap();
    assert_eq!(poll(&req_item, None).unwrap(), vec![(0, PollEvents::IN)]);
}

/// Closed sockets report ERR even when only IN was asked for
#[test]
fn test_poll_reports_err_for_closed_socket() {
    let ctx = Context::new(1).unwrap();
    let open = ctx.socket(SocketType::Pull).unwrap();
    let closed = ctx.socket(SocketType::Pull).unwrap();
    closed.close();

    let items = [PollItem::readable(&open), PollItem::readable(&closed)];
    assert_eq!(poll(&items, None).unwrap(), vec![(1, PollEvents::ERR)]);
}

/// Closing a socket wakes a poll blocked on it
#[test]
fn test_poll_wakes_on_close() {
    let ctx = Context::new(1).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            pull.close();
        });
        let items = [PollItem::readable(&pull)];
        assert_eq!(poll(&items, None).unwrap(), vec![(0, PollEvents::ERR)]);
    });
}

/// Sockets and application queues can be polled together
#[test]
fn test_poll_mixes_sockets_and_queues() {
    let ctx = Context::new(1).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    let jobs: Queue = Queue::new(8);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            jobs.try_enqueue(Message::from("job")).unwrap();
        });
        let items = [PollItem::readable(&pull), PollItem::readable(&jobs)];
        assert_eq!(poll(&items, Some(common::PATIENCE)).unwrap(), vec![(1, PollEvents::IN)]);
    });
}
