//! PUSH/PULL pipeline tests: load balancing, fair queueing, direction checks.

mod common;

use common::{bounded_recv, wait_for_peers};
use std::collections::HashSet;
use std::time::Duration;
use switchyard::prelude::*;
use switchyard::Error;

/// PUSH spreads messages evenly across connected PULL peers
#[test]
fn test_push_round_robin_across_pulls() {
    let ctx = Context::new(2).unwrap();
    let push = ctx.socket(SocketType::Push).unwrap();
    push.bind("inproc://pipeline-rr").unwrap();

    let pulls: Vec<Socket> = (0..3)
        .map(|_| {
            let pull = ctx.socket(SocketType::Pull).unwrap();
            pull.set_option(SocketOption::RecvTimeout(Some(Duration::from_millis(300))))
                .unwrap();
            pull.connect("inproc://pipeline-rr").unwrap();
            pull
        })
        .collect();
    wait_for_peers(&push, 3);

    for i in 0..300u32 {
        push.send(Message::new().push_u32(i), SendFlags::empty()).unwrap();
    }

    let mut total = 0;
    for pull in &pulls {
        let mut count = 0;
        while pull.recv(RecvFlags::empty()).is_ok() {
            count += 1;
        }
        assert!(
            (90..=110).contains(&count),
            "uneven distribution: one peer got {count} of 300"
        );
        total += count;
    }
    assert_eq!(total, 300);
}

/// PULL fair-queues between PUSH peers and keeps each sender's order
#[test]
fn test_pull_fair_queues_between_pushes() {
    let ctx = Context::new(1).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();
    bounded_recv(&pull);
    pull.bind("inproc://pipeline-fq").unwrap();

    let pushes: Vec<Socket> = (0..2)
        .map(|_| {
            let push = ctx.socket(SocketType::Push).unwrap();
            push.connect("inproc://pipeline-fq").unwrap();
            push
        })
        .collect();
    wait_for_peers(&pull, 2);

    for (sender, push) in pushes.iter().enumerate() {
        for seq in 0..20u32 {
            let msg = Message::new().push_u32(sender as u32).push_u32(seq);
            push.send(msg, SendFlags::empty()).unwrap();
        }
    }

    // let both inbound queues fill before reading
    std::thread::sleep(Duration::from_millis(50));

    let mut next = [0u32; 2];
    let mut first_ten = HashSet::new();
    for n in 0..40 {
        let msg = pull.recv(RecvFlags::empty()).unwrap();
        let sender = u32::from_be_bytes(msg.frames()[0][..].try_into().unwrap()) as usize;
        let seq = u32::from_be_bytes(msg.frames()[1][..].try_into().unwrap());
        assert_eq!(seq, next[sender], "per-sender order broken");
        next[sender] += 1;
        if n < 10 {
            first_ten.insert(sender);
        }
    }
    assert_eq!(next, [20, 20]);
    // both senders had data queued, so both are served early
    assert_eq!(first_ten.len(), 2);
}

#[test]
fn test_push_without_peers() {
    let ctx = Context::new(1).unwrap();
    let push = ctx.socket(SocketType::Push).unwrap();
    push.bind("inproc://pipeline-empty").unwrap();

    assert!(matches!(push.send("lost?", SendFlags::DONTWAIT), Err(Error::WouldBlock)));

    push.set_option(SocketOption::SendTimeout(Some(Duration::from_millis(30))))
        .unwrap();
    assert!(matches!(push.send("lost?", SendFlags::empty()), Err(Error::TimedOut)));
}

#[test]
fn test_pipeline_direction_is_enforced() {
    let ctx = Context::new(1).unwrap();
    let push = ctx.socket(SocketType::Push).unwrap();
    let pull = ctx.socket(SocketType::Pull).unwrap();

    assert!(matches!(pull.send("x", SendFlags::DONTWAIT), Err(Error::NotSupported(_))));
    assert!(matches!(push.recv(RecvFlags::DONTWAIT), Err(Error::NotSupported(_))));
}

/// Incompatible socket types never become peers
#[test]
fn test_push_does_not_pair_with_push() {
    let ctx = Context::new(1).unwrap();
    let a = ctx.socket(SocketType::Push).unwrap();
    let events = a.monitor();
    a.bind("inproc://pipeline-mismatch").unwrap();
    let b = ctx.socket(SocketType::Push).unwrap();
    b.connect("inproc://pipeline-mismatch").unwrap();

    let rejected = events
        .iter()
        .take(5)
        .find(|event| matches!(event, switchyard::SocketEvent::PeerRejected { .. }));
    assert!(rejected.is_some());
    assert_eq!(a.peer_count(), 0);
}
