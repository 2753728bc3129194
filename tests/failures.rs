mod support;

use inventory_storage::{FailureStatus, InventoryConfig, MemoryBroker};
use support::{item, Harness, ENVIRONMENT, TENANT};

#[test]
fn refused_event_does_not_fail_the_mutation() {
    let h = Harness::new();
    h.seed_hierarchy();
    h.broker.fail_next(1);

    let created = h.inventory.items().create_item(item("it-1", "h-1")).unwrap();
    assert!(created.into_record().is_some());
    assert!(h.broker.sent().is_empty());

    let failures = h.inventory.failures().list().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].topic, h.topic("item"));
    assert_eq!(failures[0].key, "i-1");
    assert_eq!(failures[0].status, FailureStatus::Pending);
    assert!(failures[0].payload.contains("\"it-1\""));
}

#[test]
fn replay_delivers_pending_failures() {
    let h = Harness::new();
    h.seed_hierarchy();
    h.broker.fail_next(1);
    h.seed_item(item("it-1", "h-1"));

    let result = h.inventory.failures().replay(&h.broker).unwrap();
    assert_eq!(result.attempted, 1);
    assert_eq!(result.replayed, 1);

    let events = h.events("item");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type().as_deref(), Some("CREATE"));
    assert!(h.inventory.failures().pending().unwrap().is_empty());

    let again = h.inventory.failures().replay(&h.broker).unwrap();
    assert_eq!(again.attempted, 0);
}

#[test]
fn replay_gives_up_after_max_attempts() {
    let broker = MemoryBroker::new();
    let h = Harness::with_broker(
        InventoryConfig::new(TENANT).with_environment(ENVIRONMENT),
        broker.clone(),
    );
    h.seed_instance("i-1");
    broker.fail_all(true);
    h.inventory
        .instances()
        .delete_instance("i-1")
        .unwrap();

    let first = h.inventory.failures().replay(&broker).unwrap();
    let second = h.inventory.failures().replay(&broker).unwrap();
    let third = h.inventory.failures().replay(&broker).unwrap();
    assert_eq!((first.retrying, second.retrying, third.failed), (1, 1, 1));

    let failures = h.inventory.failures().list().unwrap();
    assert_eq!(failures[0].status, FailureStatus::Failed);
    assert_eq!(failures[0].attempts, 3);
    assert!(failures[0].last_error.as_deref().unwrap().contains("unavailable"));
    assert!(h.inventory.failures().pending().unwrap().is_empty());
}
