//! Multi-node scenarios over in-memory links.

use mesh_node::{
    Interface, InterfaceId, ManualClock, MeshError, Node, NodeConfig, PipeTransport,
    SequentialUid, Transport, TransportError,
};
use mesh_wire::{unframe, Address, Message, MessageBuilder, MessageRef};
use std::sync::{Arc, Mutex};

type Inbox = Arc<Mutex<Vec<Message>>>;

/// Pipe end that records every frame its node transmits
struct Tap {
    inner: PipeTransport,
    sent: Inbox,
}

impl Transport for Tap {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.transmit(bytes)?;
        self.sent.lock().unwrap().push(unframe(bytes).unwrap());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.inner.receive(buf)
    }
}

struct Mesh {
    nodes: Vec<Node>,
    inboxes: Vec<Inbox>,
    sent: Vec<Inbox>,
    clock: ManualClock,
}

impl Mesh {
    fn new(addresses: &[u8]) -> Self {
        let clock = ManualClock::new(0);
        let mut nodes = Vec::new();
        let mut inboxes = Vec::new();
        for &addr in addresses {
            let mut node = Node::with_env(
                NodeConfig::with_address(Address(addr)),
                clock.clone(),
                SequentialUid::starting_at((u128::from(addr) << 64) | 1),
            )
            .unwrap();
            let inbox: Inbox = Arc::default();
            let sink = inbox.clone();
            node.set_handler(move |_: InterfaceId, msg: MessageRef<'_>| {
                sink.lock().unwrap().push(msg.to_message());
            });
            nodes.push(node);
            inboxes.push(inbox);
        }
        let sent = addresses.iter().map(|_| Inbox::default()).collect();
        Self {
            nodes,
            inboxes,
            sent,
            clock,
        }
    }

    fn link(&mut self, a: usize, b: usize) -> (InterfaceId, InterfaceId) {
        let (end_a, end_b) = PipeTransport::pair(8192);
        let ia = self.nodes[a]
            .register_interface(
                Interface::builder(format!("to-{}", b))
                    .transport(Tap {
                        inner: end_a,
                        sent: self.sent[a].clone(),
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ib = self.nodes[b]
            .register_interface(
                Interface::builder(format!("to-{}", a))
                    .transport(Tap {
                        inner: end_b,
                        sent: self.sent[b].clone(),
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        (ia, ib)
    }

    fn pump(&mut self) {
        for _ in 0..16 {
            for node in self.nodes.iter_mut() {
                node.poll_interfaces().unwrap();
            }
        }
    }

    fn discover(&mut self, index: usize, timeout_ms: u32) {
        assert_eq!(
            self.nodes[index].discover().unwrap(),
            mesh_node::DiscoveryStatus::Discovering
        );
        self.pump();
        self.clock.advance(timeout_ms + 1);
        assert_eq!(
            self.nodes[index].discover().unwrap(),
            mesh_node::DiscoveryStatus::Complete
        );
    }

    /// (requests, responses) transmitted by node `index`
    fn discovery_sent(&self, index: usize) -> (usize, usize) {
        let sent = self.sent[index].lock().unwrap();
        let requests = sent.iter().filter(|m| m.header.ctl.is_request()).count();
        (requests, sent.len() - requests)
    }
}

#[test]
fn test_three_node_line() {
    let mut mesh = Mesh::new(&[1, 2, 3]);
    let (n1_to_2, _) = mesh.link(0, 1);
    let (n2_to_3, _) = mesh.link(1, 2);

    mesh.discover(0, 1000);

    let n1 = &mesh.nodes[0];
    assert_eq!(n1.routes().lookup(Address(2)), Ok(n1_to_2));
    assert_eq!(n1.routes().lookup(Address(3)), Ok(n1_to_2));
    assert_eq!(mesh.nodes[1].routes().lookup(Address(3)), Ok(n2_to_3));

    mesh.nodes[0].send_user(Address(3), b"hello node 3").unwrap();
    mesh.pump();

    let inbox = mesh.inboxes[2].lock().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].header.src, Address(1));
    assert_eq!(&inbox[0].payload[..], b"hello node 3");
    assert!(mesh.inboxes[1].lock().unwrap().is_empty());
}

#[test]
fn test_unreachable_before_discovery() {
    let mut mesh = Mesh::new(&[1, 2, 3]);
    mesh.link(0, 1);
    mesh.link(1, 2);

    assert!(matches!(
        mesh.nodes[0].send_user(Address(3), b"too early"),
        Err(MeshError::Route(_))
    ));
}

#[test]
fn test_triangle_terminates() {
    let mut mesh = Mesh::new(&[1, 2, 3]);
    let (n1_to_2, _) = mesh.link(0, 1);
    let (n1_to_3, _) = mesh.link(0, 2);
    mesh.link(1, 2);

    mesh.discover(0, 1000);

    let routes = mesh.nodes[0].routes();
    assert_eq!(routes.lookup(Address(2)), Ok(n1_to_2));
    assert_eq!(routes.lookup(Address(3)), Ok(n1_to_3));

    // The origin floods on both links; each neighbour answers once and
    // forwards once, and every response ends at the origin.
    assert_eq!(mesh.discovery_sent(0), (2, 0));
    assert_eq!(mesh.discovery_sent(1), (1, 1));
    assert_eq!(mesh.discovery_sent(2), (1, 1));

    let uids: Vec<_> = mesh
        .sent
        .iter()
        .flat_map(|sent| sent.lock().unwrap().clone())
        .map(|m| m.payload)
        .collect();
    assert!(uids.windows(2).all(|w| w[0] == w[1]));

    let before: Vec<usize> = mesh.sent.iter().map(|s| s.lock().unwrap().len()).collect();
    mesh.pump();
    let after: Vec<usize> = mesh.sent.iter().map(|s| s.lock().unwrap().len()).collect();
    assert_eq!(before, after);

    mesh.nodes[0].send_user(Address(3), b"direct").unwrap();
    mesh.pump();
    assert_eq!(mesh.inboxes[2].lock().unwrap().len(), 1);
}

#[test]
fn test_broadcast_user_delivered_to_neighbours() {
    let mut mesh = Mesh::new(&[1, 2, 3]);
    mesh.link(0, 1);
    mesh.link(0, 2);

    let msg = MessageBuilder::user()
        .dst(Address::BROADCAST)
        .src(Address(1))
        .payload(b"all")
        .build()
        .unwrap();
    mesh.nodes[0].broadcast(&msg).unwrap();
    mesh.pump();

    assert_eq!(mesh.inboxes[1].lock().unwrap().len(), 1);
    assert_eq!(mesh.inboxes[2].lock().unwrap().len(), 1);
    assert!(mesh.inboxes[0].lock().unwrap().is_empty());
}

fn drain(remote: &mut PipeTransport) -> Vec<Message> {
    let mut buf = [0u8; 8192];
    let n = remote.receive(&mut buf).unwrap();
    buf[..n]
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| unframe(chunk).unwrap())
        .collect()
}

#[test]
fn test_discovery_dedup_across_three_interfaces() {
    let mut node = Node::with_env(
        NodeConfig::with_address(Address(2)),
        ManualClock::new(0),
        SequentialUid::default(),
    )
    .unwrap();

    let mut remotes = Vec::new();
    let mut ids = Vec::new();
    for i in 0..3 {
        let (local, remote) = PipeTransport::pair(4096);
        ids.push(
            node.register_interface(
                Interface::builder(format!("uart{}", i))
                    .transport(local)
                    .build()
                    .unwrap(),
            )
            .unwrap(),
        );
        remotes.push(remote);
    }

    let request = MessageBuilder::discovery()
        .src(Address(1))
        .payload(&[0x5A; mesh_node::UID_LEN])
        .build()
        .unwrap();
    let framed = request.frame().unwrap();

    for &id in &ids {
        node.on_bytes_received(id, &framed).unwrap();
    }

    let first = drain(&mut remotes[0]);
    assert_eq!(first.len(), 1);
    assert!(!first[0].header.ctl.is_request());
    assert_eq!(first[0].header.dst, Address(1));
    assert_eq!(first[0].header.src, Address(2));

    for remote in &mut remotes[1..] {
        assert_eq!(drain(remote), vec![request.clone()]);
    }
}

#[test]
fn test_noise_on_link_is_skipped() {
    let mut mesh = Mesh::new(&[1, 2]);
    let (_, n2_from_1) = mesh.link(0, 1);

    let msg = MessageBuilder::user()
        .dst(Address(2))
        .src(Address(1))
        .payload(b"through the noise")
        .build()
        .unwrap();

    let mut stream = vec![0x55, 0x00, 0x03, 0x99];
    stream.extend_from_slice(&msg.frame().unwrap());
    stream.extend_from_slice(&[0xFF, 0xFE]);
    stream.extend_from_slice(&msg.frame().unwrap());

    for chunk in stream.chunks(3) {
        mesh.nodes[1].on_bytes_received(n2_from_1, chunk).unwrap();
    }

    let inbox = mesh.inboxes[1].lock().unwrap();
    assert_eq!(inbox.len(), 2);
    assert!(inbox.iter().all(|m| *m == msg));
}
