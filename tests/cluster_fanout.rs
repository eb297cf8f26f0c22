//! Two plugin nodes joined by an in-memory cluster network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use boards_realtime::adapters::access::{StaticReadTokens, StaticTeamAccess};
use boards_realtime::adapters::cluster::InMemoryClusterNetwork;
use boards_realtime::adapters::realtime::{
    ClusterPublisher, ClusterPublisherConfig, CommandDispatcher, ListenerHub, PluginAdapter,
    PluginSettings, RecordingPluginHost, CLUSTER_EVENT_ID,
};
use boards_realtime::domain::foundation::{BlockId, ConnectionId, TeamId, UserId};
use boards_realtime::domain::realtime::{Block, ClientConfig};
use boards_realtime::ports::{ClusterTransport, RealtimeNotifier, ServerId};

struct Node {
    adapter: PluginAdapter,
    host: Arc<RecordingPluginHost>,
}

fn node(network: &Arc<InMemoryClusterNetwork>, name: &str) -> Node {
    let access = StaticTeamAccess::new()
        .grant(UserId::new("alice").unwrap(), TeamId::new("t1").unwrap())
        .grant(UserId::new("bob").unwrap(), TeamId::new("t1").unwrap());
    let dispatcher = CommandDispatcher::new(
        Arc::new(ListenerHub::new()),
        Arc::new(access),
        Arc::new(StaticReadTokens::new()),
    );
    let host = RecordingPluginHost::new();
    let transport = network.node(ServerId::new(name));
    let (publisher, _handle) =
        ClusterPublisher::spawn(transport.clone(), ClusterPublisherConfig::default());
    let adapter = PluginAdapter::new(Arc::new(dispatcher), host.clone(), PluginSettings::default())
        .with_cluster(publisher);
    transport.register_handler(CLUSTER_EVENT_ID, adapter.cluster_handler());
    Node { adapter, host }
}

async fn subscribe_team(node: &Node, connection: &str, user: &str, team: &str) {
    let connection = ConnectionId::new(connection).unwrap();
    let user = UserId::new(user).unwrap();
    node.adapter.on_web_connection_opened(&connection, &user).await;
    node.adapter
        .on_web_socket_message(
            &connection,
            &user,
            "custom_boards_SUBSCRIBE_TEAM",
            &json!({"teamId": team}),
        )
        .await;
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn block_change_on_one_node_reaches_listeners_on_the_other() {
    let network = InMemoryClusterNetwork::new();
    let a = node(&network, "node-a");
    let b = node(&network, "node-b");
    subscribe_team(&a, "a1", "alice", "t1").await;
    subscribe_team(&b, "b1", "bob", "t1").await;

    a.adapter
        .broadcast_block_change(
            &TeamId::new("t1").unwrap(),
            &Block::new(BlockId::new("card-1").unwrap()),
        )
        .await;

    wait_for(|| !b.host.deliveries().is_empty()).await;
    // let any stray republish land before counting
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(a.host.deliveries().len(), 1);
    let remote = b.host.deliveries();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].connection_id, ConnectionId::new("b1").unwrap());
    assert_eq!(remote[0].event, "custom_boards_UPDATE_BLOCK");
    assert_eq!(remote[0].payload["block"]["id"], "card-1");

    assert_eq!(network.publications_from(&ServerId::new("node-a")).len(), 1);
    assert!(network.publications_from(&ServerId::new("node-b")).is_empty());
}

#[tokio::test]
async fn config_change_reaches_every_connection_cluster_wide() {
    let network = InMemoryClusterNetwork::new();
    let a = node(&network, "node-a");
    let b = node(&network, "node-b");
    let user = UserId::new("bob").unwrap();
    b.adapter
        .on_web_connection_opened(&ConnectionId::new("b1").unwrap(), &user)
        .await;
    b.adapter
        .on_web_connection_opened(&ConnectionId::new("b2").unwrap(), &user)
        .await;

    a.adapter.broadcast_config_change(&ClientConfig::default()).await;

    wait_for(|| b.host.deliveries().len() == 2).await;
    assert!(b
        .host
        .deliveries()
        .iter()
        .all(|d| d.event == "custom_boards_UPDATE_CLIENT_CONFIG"));
    assert!(a.host.deliveries().is_empty());
}

#[tokio::test]
async fn peer_without_listeners_receives_nothing() {
    let network = InMemoryClusterNetwork::new();
    let a = node(&network, "node-a");
    let b = node(&network, "node-b");
    subscribe_team(&b, "b1", "bob", "t1").await;

    a.adapter
        .broadcast_block_change(
            &TeamId::new("t2").unwrap(),
            &Block::new(BlockId::new("card-1").unwrap()),
        )
        .await;

    wait_for(|| network.publication_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(b.host.deliveries().is_empty());
}
