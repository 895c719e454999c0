//! Queue reconciliation from peer scans

use machine_hub::Hub;
use machine_hub::peers::Peers;
use machine_hub::snapshot::SnapshotStore;

mod common;
use common::{device, last_broadcast, mock_peer, mock_scan, received, sessions, user};

#[tokio::test]
async fn disjoint_reports_are_unioned_in_fifo_order() {
    let peer_a = mock_peer().await;
    let peer_b = mock_peer().await;

    let mut from_a = device("M1", Some(&peer_a.uri()));
    from_a.queue = vec![
        user("a1", &peer_a.uri(), "M1").at(100),
        user("a2", &peer_a.uri(), "M1").at(300),
    ];
    let mut from_b = device("M1", None);
    from_b.queue = vec![
        user("b1", &peer_b.uri(), "M1").at(200),
        user("b2", &peer_b.uri(), "M1").at(400),
    ];
    mock_scan(&peer_a, &[from_a]).await;
    mock_scan(&peer_b, &[from_b, device("M2", None)]).await;

    let hub = Hub::new(Peers::new([peer_a.uri(), peer_b.uri()]), None);
    let summary = hub.reconcile().await;

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.touched.len(), 2);
    assert_eq!(sessions(&hub, "M1").await, vec!["a1", "b1", "a2", "b2"]);
    assert_eq!(
        hub.device("M1").await.unwrap().owner_peer,
        Some(peer_a.uri())
    );
}

#[tokio::test]
async fn failing_peers_are_skipped() {
    let peer_a = mock_peer().await;
    let mut reported = device("M1", Some(&peer_a.uri()));
    reported.queue = vec![user("u1", &peer_a.uri(), "M1").at(10)];
    mock_scan(&peer_a, &[reported]).await;

    // nothing listens on the discard port
    let dead = "http://127.0.0.1:9".to_string();
    // no scan mock: answers 404
    let silent = mock_peer().await;

    let hub = Hub::new(Peers::new([dead, peer_a.uri(), silent.uri()]), None);
    let summary = hub.reconcile().await;

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(sessions(&hub, "M1").await, vec!["u1"]);
}

#[tokio::test]
async fn reconnecting_peer_is_purged_then_rescanned() {
    let peer_a = mock_peer().await;
    let peer_b = mock_peer().await;

    let mut fresh = device("M1", None);
    fresh.queue = vec![user("a9", &peer_a.uri(), "M1").at(1)];
    mock_scan(&peer_a, &[fresh]).await;

    let hub = Hub::new(Peers::new([peer_a.uri(), peer_b.uri()]), None);
    hub.device_connect(device("M1", Some(&peer_b.uri()))).await.unwrap();
    hub.user_connect(user("a1", &peer_a.uri(), "M1")).await.unwrap().settled().await;
    hub.user_connect(user("b1", &peer_b.uri(), "M1")).await.unwrap().settled().await;

    let dispatch = hub.server_connect(&format!("{}/", peer_a.uri())).await.unwrap();
    dispatch.settled().await;

    // a1 is gone, a9 came back from the rescan and sorts first
    assert_eq!(sessions(&hub, "M1").await, vec!["a9", "b1"]);

    // the owner saw both the purge and the rescanned queue
    let pushed = received(&peer_b, "/hub/broadcast").await;
    let orders: Vec<Vec<&str>> = pushed
        .iter()
        .map(|d| {
            d["queue"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["session"].as_str().unwrap())
                .collect()
        })
        .collect();
    assert!(orders.contains(&vec!["b1"]));
    assert!(orders.contains(&vec!["a9", "b1"]));
}

#[tokio::test]
async fn rescan_keeps_a_completed_handoff() {
    let peer_a = mock_peer().await;
    let peer_b = mock_peer().await;

    let mut reported = device("M1", None);
    reported.queue = vec![user("a1", &peer_a.uri(), "M1").at(4_102_444_800_000)];
    mock_scan(&peer_a, &[reported]).await;

    let hub = Hub::new(Peers::new([peer_a.uri(), peer_b.uri()]), None);
    hub.device_connect(device("M1", Some(&peer_b.uri()))).await.unwrap();
    hub.user_connect(user("u1", &peer_b.uri(), "M1")).await.unwrap().settled().await;
    hub.user_connect(user("u2", &peer_b.uri(), "M1")).await.unwrap().settled().await;
    hub.control_force("M1", "u2").await.unwrap().settled().await;

    hub.server_connect(&peer_a.uri()).await.unwrap().settled().await;

    assert_eq!(sessions(&hub, "M1").await, vec!["u2", "u1", "a1"]);
    assert_eq!(
        last_broadcast(&peer_b).await,
        Some(vec!["u2".to_string(), "u1".to_string(), "a1".to_string()])
    );
}

#[tokio::test]
async fn snapshot_restores_metadata_but_not_queues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("machines.json");
    let peer = mock_peer().await;

    {
        let hub = Hub::new(Peers::new([peer.uri()]), Some(SnapshotStore::new(&path)));
        let mut connected = device("M1", Some(&peer.uri()));
        connected.correlation_keys = vec!["serial-1".to_string()];
        hub.device_connect(connected).await.unwrap();
        hub.user_connect(user("u1", &peer.uri(), "M1")).await.unwrap().settled().await;
        // placeholder creation is persisted too
        hub.user_connect(user("u2", &peer.uri(), "M2")).await.unwrap().settled().await;
    }

    let hub = Hub::new(Peers::new([peer.uri()]), Some(SnapshotStore::new(&path)));
    assert_eq!(hub.restore_snapshot().await.unwrap(), 2);

    let restored = hub.device("M1").await.unwrap();
    assert_eq!(restored.owner_peer, Some(peer.uri()));
    assert_eq!(restored.correlation_keys, vec!["serial-1"]);
    assert!(restored.queue.is_empty());
    assert!(hub.device("M2").await.unwrap().queue.is_empty());
}
