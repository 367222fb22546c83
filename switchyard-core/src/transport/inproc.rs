//! In-process transport.
//!
//! Channels are two bounded packet queues crossed between the ends, so
//! messages move between sockets without copying. Endpoint names live in a
//! `DashMap` owned by the transport, which makes them scoped to the context
//! that registered it. An endpoint must be bound before anyone connects to it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

use super::{Acceptor, Channel, Disconnected, Listener, Packet, Transport, WriteError};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::queue::{EnqueueError, Queue};
use crate::signal::{Notify, WatchKey};

type Registry = DashMap<String, Acceptor>;

pub struct InprocTransport {
    registry: Arc<Registry>,
    capacity: usize,
}

impl InprocTransport {
    /// `capacity` bounds each direction of every channel (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Whether a name is currently bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }
}

fn inproc_name(endpoint: &Endpoint) -> Result<&str> {
    match endpoint {
        Endpoint::Inproc(name) => Ok(name),
        other => Err(Error::not_supported(format!(
            "inproc transport cannot handle {other}"
        ))),
    }
}

impl Transport for InprocTransport {
    fn scheme(&self) -> &'static str {
        "inproc"
    }

    fn listen(&self, endpoint: &Endpoint, acceptor: Acceptor) -> Result<Box<dyn Listener>> {
        let name = inproc_name(endpoint)?;
        match self.registry.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(Error::AddressInUse(endpoint.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(acceptor);
            }
        }
        trace!("[INPROC] bound {}", endpoint);
        Ok(Box::new(InprocListener {
            endpoint: endpoint.clone(),
            registry: Arc::downgrade(&self.registry),
        }))
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>> {
        let name = inproc_name(endpoint)?;
        // Clone out of the map so the shard lock is not held while accepting.
        let acceptor = self
            .registry
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::ConnectionRefused(endpoint.to_string()))?;

        let (client, server) = InprocChannel::pair(name, self.capacity);
        acceptor(Box::new(server));
        trace!("[INPROC] connected {}", endpoint);
        Ok(Box::new(client))
    }
}

impl fmt::Debug for InprocTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InprocTransport")
            .field("bound", &self.registry.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[derive(Debug)]
struct InprocListener {
    endpoint: Endpoint,
    registry: Weak<Registry>,
}

impl Listener for InprocListener {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for InprocListener {
    fn drop(&mut self) {
        if let (Some(registry), Endpoint::Inproc(name)) = (self.registry.upgrade(), &self.endpoint) {
            registry.remove(name);
            trace!("[INPROC] unbound {}", self.endpoint);
        }
    }
}

/// One end of an in-process connection.
pub struct InprocChannel {
    name: String,
    tx: Arc<Queue<Packet>>,
    rx: Arc<Queue<Packet>>,
    watches: SmallVec<[(Arc<Queue<Packet>>, WatchKey); 2]>,
}

impl InprocChannel {
    /// Create both ends of a connection.
    pub fn pair(name: &str, capacity: usize) -> (Self, Self) {
        let a = Arc::new(Queue::new(capacity));
        let b = Arc::new(Queue::new(capacity));
        let client = Self {
            name: name.to_string(),
            tx: Arc::clone(&a),
            rx: Arc::clone(&b),
            watches: SmallVec::new(),
        };
        let server = Self {
            name: name.to_string(),
            tx: b,
            rx: a,
            watches: SmallVec::new(),
        };
        (client, server)
    }

    fn unwatch_all(&mut self) {
        for (queue, key) in self.watches.drain(..) {
            queue.unwatch(key);
        }
    }
}

impl Channel for InprocChannel {
    fn try_write(&mut self, packet: Packet) -> std::result::Result<(), WriteError> {
        self.tx.try_enqueue(packet).map_err(|e| match e {
            EnqueueError::Full(p) => WriteError::Full(p),
            EnqueueError::Closed(p) | EnqueueError::TimedOut(p) => WriteError::Disconnected(p),
        })
    }

    fn try_read(&mut self) -> std::result::Result<Option<Packet>, Disconnected> {
        match self.rx.try_dequeue() {
            Ok(packet) => Ok(Some(packet)),
            Err(Error::WouldBlock) => Ok(None),
            Err(_) => Err(Disconnected),
        }
    }

    fn watch(&mut self, notify: Arc<dyn Notify>) {
        for queue in [Arc::clone(&self.tx), Arc::clone(&self.rx)] {
            let key = queue.watch(Arc::clone(&notify));
            self.watches.push((queue, key));
        }
    }

    fn close(&mut self) {
        self.unwatch_all();
        self.tx.close();
        self.rx.close();
    }
}

impl Drop for InprocChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for InprocChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InprocChannel")
            .field("name", &self.name)
            .field("outbound", &self.tx.len())
            .field("inbound", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::socket_type::SocketType;
    use crate::transport::Greeting;
    use parking_lot::Mutex;

    fn collecting_acceptor() -> (Acceptor, Arc<Mutex<Vec<Box<dyn Channel>>>>) {
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&accepted);
        let acceptor: Acceptor = Arc::new(move |ch| sink.lock().push(ch));
        (acceptor, accepted)
    }

    #[test]
    fn test_connect_before_bind_is_refused() {
        let transport = InprocTransport::new(16);
        let endpoint = Endpoint::parse("inproc://nobody").unwrap();
        assert!(matches!(
            transport.connect(&endpoint),
            Err(Error::ConnectionRefused(_))
        ));
    }

    #[test]
    fn test_duplicate_bind_rejected_and_unbind_on_drop() {
        let transport = InprocTransport::new(16);
        let endpoint = Endpoint::parse("inproc://dup").unwrap();
        let (acceptor, _) = collecting_acceptor();

        let listener = transport.listen(&endpoint, Arc::clone(&acceptor)).unwrap();
        assert!(matches!(
            transport.listen(&endpoint, Arc::clone(&acceptor)),
            Err(Error::AddressInUse(_))
        ));

        drop(listener);
        assert!(!transport.is_bound("dup"));
        assert!(transport.listen(&endpoint, acceptor).is_ok());
    }

    #[test]
    fn test_packets_flow_both_ways() {
        let transport = InprocTransport::new(16);
        let endpoint = Endpoint::parse("inproc://flow").unwrap();
        let (acceptor, accepted) = collecting_acceptor();
        let _listener = transport.listen(&endpoint, acceptor).unwrap();

        let mut client = transport.connect(&endpoint).unwrap();
        let mut server = accepted.lock().pop().unwrap();

        let greeting = Packet::Greeting(Greeting {
            socket_type: SocketType::Push,
            identity: None,
        });
        client.try_write(greeting.clone()).unwrap();
        assert_eq!(server.try_read().unwrap(), Some(greeting));
        assert_eq!(server.try_read().unwrap(), None);

        server
            .try_write(Packet::Message(Message::from("pong")))
            .unwrap();
        assert_eq!(
            client.try_read().unwrap(),
            Some(Packet::Message(Message::from("pong")))
        );
    }

    #[test]
    fn test_capacity_and_disconnect() {
        let (mut a, mut b) = InprocChannel::pair("cap", 1);
        a.try_write(Packet::Message(Message::from("1"))).unwrap();
        assert!(matches!(
            a.try_write(Packet::Message(Message::from("2"))),
            Err(WriteError::Full(_))
        ));

        a.close();
        // Data written before the close is still delivered.
        assert!(matches!(b.try_read(), Ok(Some(Packet::Message(_)))));
        assert_eq!(b.try_read(), Err(Disconnected));
        assert!(matches!(
            b.try_write(Packet::Message(Message::from("3"))),
            Err(WriteError::Disconnected(_))
        ));
    }
}
