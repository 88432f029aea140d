#![allow(clippy::unwrap_used)]
// Integration tests for inventory and address reconciliation in the
// session manager.

mod common;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use common::{Call, FakeConnector, FakePlatform, PlainDecryptor, eventually, location, record, settings};
use purelink_core::{ConnectionState, DeviceRecord, NetworkLocation, Platform, SessionManager};

fn manager(connector: &Arc<FakeConnector>, platform: &Arc<FakePlatform>) -> SessionManager {
    let platform: Arc<dyn Platform> = platform.clone();
    SessionManager::new(platform, connector.clone(), Arc::new(PlainDecryptor), settings())
}

fn inventory(records: &[DeviceRecord]) -> HashMap<String, DeviceRecord> {
    records.iter().map(|r| (r.id.clone(), r.clone())).collect()
}

fn addresses(locations: &[NetworkLocation]) -> HashMap<String, NetworkLocation> {
    locations
        .iter()
        .map(|l| (l.device_id.clone(), l.clone()))
        .collect()
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test(start_paused = true)]
async fn inventory_swap_tears_down_missing_and_adds_new() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);

    manager
        .reconcile_addresses(addresses(&[location("A", 10), location("B", 11)]))
        .await;
    let diff = manager
        .reconcile_inventory(inventory(&[record("A", "Alpha"), record("B", "Bravo")]))
        .await;
    assert_eq!(diff.added, ids(&["A", "B"]));
    eventually(|| connector.link_count() == 2).await;

    let diff = manager
        .reconcile_inventory(inventory(&[record("B", "Bravo"), record("C", "Charlie")]))
        .await;
    assert_eq!(diff.missing, ids(&["A"]));
    assert_eq!(diff.added, ids(&["C"]));
    assert!(diff.changed.is_empty());

    // C has no address yet, so only B keeps a session.
    let states: Vec<String> = manager
        .session_states()
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(states, vec!["B".to_owned()]);
    assert_eq!(manager.known_device_ids().await, vec!["B", "C"]);
    assert!(manager.lookup("A").await.is_none());

    let calls = platform.calls();
    assert!(calls.contains(&Call::Delete("A".into())));
    assert!(calls.contains(&Call::Add("C".into())));
    assert_eq!(calls.last(), Some(&Call::Sync(vec!["B".into(), "C".into()])));

    // A's link was closed during teardown.
    let a_link = (0..connector.link_count())
        .map(|i| connector.link(i))
        .find(|l| l.options.username == "A")
        .unwrap();
    assert!(a_link.is_disconnected());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unchanged_inventory_does_nothing() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);
    let snapshot = inventory(&[record("A", "Alpha")]);

    manager.reconcile_inventory(snapshot.clone()).await;
    let before = platform.calls().len();
    let diff = manager.reconcile_inventory(snapshot).await;

    assert!(diff.is_empty());
    assert_eq!(platform.calls().len(), before);
}

#[tokio::test(start_paused = true)]
async fn rejected_add_is_retried_next_cycle() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);
    platform.reject_add("A", true);

    let snapshot = inventory(&[record("A", "Alpha")]);
    manager.reconcile_inventory(snapshot.clone()).await;
    assert!(manager.lookup("A").await.is_none());

    platform.reject_add("A", false);
    let diff = manager.reconcile_inventory(snapshot).await;
    assert_eq!(diff.added, ids(&["A"]));
    assert!(manager.lookup("A").await.is_some());
    assert_eq!(platform.count(|c| matches!(c, Call::Add(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn rename_is_propagated_or_rolled_back() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);

    manager.reconcile_inventory(inventory(&[record("A", "Alpha")])).await;

    let diff = manager
        .reconcile_inventory(inventory(&[record("A", "Living room")]))
        .await;
    assert_eq!(diff.changed, ids(&["A"]));
    assert!(platform
        .calls()
        .contains(&Call::Update("A".into(), "Living room".into())));
    assert_eq!(manager.lookup("A").await.unwrap().record.display_name, "Living room");

    platform.reject_updates(true);
    manager
        .reconcile_inventory(inventory(&[record("A", "Bedroom")]))
        .await;
    assert_eq!(manager.lookup("A").await.unwrap().record.display_name, "Living room");
}

#[tokio::test(start_paused = true)]
async fn address_before_inventory_starts_session_on_listing() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);

    manager.reconcile_addresses(addresses(&[location("A", 10)])).await;
    assert_eq!(connector.attempts(), 0);

    manager.reconcile_inventory(inventory(&[record("A", "Alpha")])).await;
    let link = connector.wait_link(0).await;
    assert_eq!(link.options.address.to_string(), "192.168.1.10");
    assert_eq!(link.options.password.expose_secret(), "pw-A");

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn address_changes_relocate_and_missing_keeps_session() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);

    manager.reconcile_inventory(inventory(&[record("A", "Alpha")])).await;
    manager.reconcile_addresses(addresses(&[location("A", 10)])).await;
    connector.wait_link(0).await;

    let diff = manager.reconcile_addresses(addresses(&[location("A", 42)])).await;
    assert_eq!(diff.changed, ids(&["A"]));
    let moved = connector.wait_link(1).await;
    assert_eq!(moved.options.address.to_string(), "192.168.1.42");

    let diff = manager.reconcile_addresses(HashMap::new()).await;
    assert_eq!(diff.missing, ids(&["A"]));
    let session = manager.lookup("A").await.unwrap().session.unwrap();
    assert_ne!(session.state(), ConnectionState::Closed);

    // Seen again at the same place: treated as added, session reused.
    manager.reconcile_addresses(addresses(&[location("A", 42)])).await;
    assert_eq!(manager.session_states().await.len(), 1);

    manager.shutdown().await;
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn undecryptable_credential_starts_no_session() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = manager(&connector, &platform);

    let mut broken = record("A", "Alpha");
    broken.encrypted_credential = "garbage".into();
    manager.reconcile_inventory(inventory(&[broken])).await;
    manager.reconcile_addresses(addresses(&[location("A", 10)])).await;

    assert!(manager.session_states().await.is_empty());
    assert_eq!(connector.attempts(), 0);
    assert!(manager.lookup("A").await.unwrap().session.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sightings_start_one_session_per_device() {
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let manager = Arc::new(manager(&connector, &platform));

    let mut records = Vec::new();
    let mut locations = Vec::new();
    for i in 0..20u8 {
        let id = format!("D{i}");
        records.push(record(&id, "Device"));
        locations.push(location(&id, 20 + i));

        // Each call alone would start the session for the new id.
        let by_inventory = tokio::spawn({
            let manager = Arc::clone(&manager);
            let snapshot = inventory(&records);
            async move { manager.reconcile_inventory(snapshot).await }
        });
        let by_address = tokio::spawn({
            let manager = Arc::clone(&manager);
            let snapshot = addresses(&locations);
            async move { manager.reconcile_addresses(snapshot).await }
        });
        let (a, b) = tokio::join!(by_inventory, by_address);
        a.unwrap();
        b.unwrap();
    }

    eventually(|| connector.attempts() == 20).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(connector.attempts(), 20);
    assert_eq!(connector.link_count(), 20);
    assert_eq!(manager.session_states().await.len(), 20);

    manager.shutdown().await;
}
