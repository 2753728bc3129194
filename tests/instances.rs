mod support;

use inventory_storage::{
    HridKind, HridSetting, Instance, Record, RecordStore, RecordsExt, UnitOfWork,
    NULL_INSTANCE_ID,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use support::Harness;

/// A row of a collection cleared together with instances.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Relationship {
    id: String,
    super_instance_id: String,
}

impl Record for Relationship {
    const COLLECTION: &'static str = "instance_relationship";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[test]
fn create_instance_assigns_hrid_and_keys_by_id() {
    let h = Harness::new();
    let created = h
        .inventory
        .instances()
        .create_instance(Instance::new("i-1", "Moby Dick"))
        .unwrap()
        .into_record()
        .unwrap();

    assert_eq!(created.hrid.as_deref(), Some("in00000000001"));
    let events = h.events("instance");
    assert_eq!(events[0].key, "i-1");
    assert_eq!(events[0].json()["new"]["title"], json!("Moby Dick"));
}

#[test]
fn supplied_hrid_is_kept() {
    let h = Harness::new();
    let created = h
        .inventory
        .instances()
        .create_instance(Instance {
            hrid: Some("legacy-7".into()),
            ..Instance::new("i-1", "A")
        })
        .unwrap()
        .into_record()
        .unwrap();

    assert_eq!(created.hrid.as_deref(), Some("legacy-7"));
    assert_eq!(h.store.stats().unwrap().sequence_calls, 0);
}

#[test]
fn duplicate_hrid_is_a_conflict() {
    let h = Harness::new();
    let first = h.seed_instance("i-1");

    let err = h
        .inventory
        .instances()
        .create_instance(Instance {
            hrid: first.hrid.clone(),
            ..Instance::new("i-2", "B")
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        err.to_string(),
        "hrid value already exists in table instance: in00000000001"
    );
}

#[test]
fn configured_start_number_and_prefix_apply() {
    let h = Harness::new();
    let mut settings = h.inventory.hrids().settings().unwrap();
    *settings.setting_mut(HridKind::Instances) = HridSetting::new("bib", 500);
    h.inventory.hrids().update_settings(settings).unwrap();

    let created = h
        .inventory
        .instances()
        .create_instances(
            vec![Instance::new("i-1", "A"), Instance::new("i-2", "B")],
            None,
        )
        .unwrap()
        .into_record()
        .unwrap();
    let hrids: Vec<&str> = created.iter().filter_map(|i| i.hrid.as_deref()).collect();
    assert_eq!(hrids, vec!["bib00000000500", "bib00000000501"]);
}

#[test]
fn hrid_change_rejected_unless_consortium_copy() {
    let h = Harness::new();
    let stored = h.seed_instance("i-1");

    let renamed = Instance {
        hrid: Some("in99".into()),
        ..stored.clone()
    };
    let err = h
        .inventory
        .instances()
        .update_instance("i-1", renamed)
        .unwrap_err();
    assert!(err.is_validation());

    let shadow = Instance {
        hrid: Some("cons00000000042".into()),
        source: Some("CONSORTIUM-FOLIO".into()),
        ..stored
    };
    let updated = h
        .inventory
        .instances()
        .update_instance("i-1", shadow)
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(updated.hrid.as_deref(), Some("cons00000000042"));
    assert_eq!(
        h.store.records::<Instance>().fetch("i-1").unwrap().hrid.as_deref(),
        Some("cons00000000042")
    );
}

#[test]
fn metadata_only_change_is_noop() {
    let h = Harness::new();
    let stored = h.seed_instance("i-1");

    let mut touched = stored.clone();
    touched.metadata.as_mut().unwrap().updated_by_user_id = Some("someone".into());
    let outcome = h
        .inventory
        .instances()
        .update_instance("i-1", touched)
        .unwrap();

    assert!(outcome.is_no_content());
    assert!(h.broker.sent().is_empty());
}

#[test]
fn delete_all_instances_clears_dependents() {
    let h = Harness::new();
    h.seed_instance("i-1");
    h.seed_instance("i-2");
    let mut unit = UnitOfWork::new();
    unit.insert(&Relationship {
        id: "r-1".into(),
        super_instance_id: "i-1".into(),
    })
    .unwrap();
    h.store.run_atomic(unit).unwrap();

    h.inventory
        .instances()
        .delete_instances("cql.allRecords=1 sortBy title")
        .unwrap();

    assert!(h.store.records::<Instance>().find(&|_| true).unwrap().is_empty());
    assert!(h.store.records::<Relationship>().get("r-1").unwrap().is_none());
    let events = h.events("instance");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, NULL_INSTANCE_ID);
    assert_eq!(events[0].event_type().as_deref(), Some("DELETE_ALL"));
}

#[test]
fn delete_instances_by_title() {
    let h = Harness::new();
    h.seed_instance("i-1");
    h.seed_instance("i-2");

    h.inventory
        .instances()
        .delete_instances("title==\"Title i-2\"")
        .unwrap();

    let left: Vec<String> = h
        .store
        .records::<Instance>()
        .find(&|_| true)
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(left, vec!["i-1"]);
    let events = h.events("instance");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "i-2");
    assert_eq!(events[0].json()["old"]["id"], json!("i-2"));
}

#[test]
fn unsupported_query_is_rejected() {
    let h = Harness::new();
    let err = h
        .inventory
        .instances()
        .delete_instances("title any moby or title any dick")
        .unwrap_err();
    assert!(err.is_validation());
}
