use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use cellmesh::config::{MeshConfig, PeerAddress};
use cellmesh::p2p::{Cell, CellProfile, Operation, RelayNode, RequesterHandle, ResultCallback, SharedRegistry};

struct Mesh {
    shutdown: CancellationToken,
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn cell_config(node: SocketAddr) -> MeshConfig {
    MeshConfig {
        peers: vec![PeerAddress::new("127.0.0.1", node.port())],
        ack_pending_threshold: 10,
        dispatch_poll_interval_ms: 20,
        connection_retry_delay_ms: 10,
        connection_retry_attempts: 5,
    }
}

async fn start_node(mesh: &Mesh, peers: Vec<PeerAddress>) -> (SocketAddr, SharedRegistry) {
    let config = MeshConfig { peers, ..MeshConfig::default() };
    let node = RelayNode::bind_addr("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("bind should be ok");

    let addr = node.local_addr();
    let registry = node.registry();
    tokio::spawn(node.run(mesh.shutdown.clone()));
    (addr, registry)
}

async fn start_server(mesh: &Mesh, node: SocketAddr) {
    let cell = Cell::connect(CellProfile::server(), &cell_config(node))
        .await
        .expect("server should attach");
    tokio::spawn(cell.run(Arc::new(|_: String| {}), mesh.shutdown.clone()));
}

async fn start_requester(mesh: &Mesh, node: SocketAddr) -> (RequesterHandle, Arc<Mutex<Vec<String>>>) {
    let cell = Cell::connect(CellProfile::requester(), &cell_config(node))
        .await
        .expect("requester should attach");
    let handle = cell.requester_handle();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let on_result: ResultCallback = Arc::new(move |text: String| sink.lock().push(text));
    tokio::spawn(cell.run(on_result, mesh.shutdown.clone()));
    (handle, results)
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn division_through_one_node() {
    let mesh = Mesh { shutdown: CancellationToken::new() };
    let (node, registry) = start_node(&mesh, vec![]).await;
    start_server(&mesh, node).await;
    let (requester, results) = start_requester(&mesh, node).await;
    wait_until(|| registry.other_count() == 2).await;

    requester.submit(Operation::Div, 10, 2);
    wait_until(|| !results.lock().is_empty()).await;

    // resends and late duplicates must not surface again
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*results.lock(), vec!["5".to_string()]);
}

#[tokio::test]
async fn division_by_zero_is_reported() {
    let mesh = Mesh { shutdown: CancellationToken::new() };
    let (node, registry) = start_node(&mesh, vec![]).await;
    start_server(&mesh, node).await;
    let (requester, results) = start_requester(&mesh, node).await;
    wait_until(|| registry.other_count() == 2).await;

    requester.submit(Operation::Div, 7, 0);
    wait_until(|| !results.lock().is_empty()).await;
    assert_eq!(*results.lock(), vec!["error: division by zero".to_string()]);
}

#[tokio::test]
async fn two_requesters_across_meshed_nodes() {
    let mesh = Mesh { shutdown: CancellationToken::new() };
    let (a, a_registry) = start_node(&mesh, vec![]).await;
    let (b, b_registry) = start_node(&mesh, vec![PeerAddress::new("127.0.0.1", a.port())]).await;
    wait_until(|| a_registry.node_count() == 1 && b_registry.node_count() == 1).await;

    // one server per node: every request is answered twice
    start_server(&mesh, a).await;
    start_server(&mesh, b).await;
    let (first, first_results) = start_requester(&mesh, a).await;
    let (second, second_results) = start_requester(&mesh, b).await;
    wait_until(|| a_registry.other_count() == 2 && b_registry.other_count() == 2).await;

    first.submit(Operation::Add, 20, 22);
    second.submit(Operation::Add, 20, 22);
    wait_until(|| first_results.lock().len() == 1 && second_results.lock().len() == 1).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*first_results.lock(), vec!["42".to_string()]);
    assert_eq!(*second_results.lock(), vec!["42".to_string()]);
}
