mod schemas;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use datx::{ChangeKind, ChangeSet, Collection, DatxError, Id, Record, RefValue};
use proptest::prelude::*;
use serde_json::json;

use schemas::{collection, Person};

// =============================================================================
// Identity map and merging
// =============================================================================

#[test]
fn same_key_is_one_instance() {
    let collection = collection();
    let first = collection
        .add("person", json!({ "id": "1", "name": "A" }))
        .unwrap();
    let second = collection
        .add("person", json!({ "id": "1", "name": "B" }))
        .unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(collection.find_all("person").len(), 1);
    let found = collection.find_one("person", "1").unwrap();
    assert_eq!(found.get::<String>("name").as_deref(), Some("B"));
}

#[test]
fn merge_only_touches_present_fields() {
    let collection = collection();
    collection
        .add("person", json!({ "id": "1", "name": "Ada", "age": 36 }))
        .unwrap();
    let person = collection
        .add("person", json!({ "id": "1", "name": "Ada L." }))
        .unwrap();

    assert_eq!(person.get::<String>("name").as_deref(), Some("Ada L."));
    assert_eq!(person.get::<u32>("age"), Some(36));
}

#[test]
fn unknown_types_are_rejected() {
    let collection = collection();
    let err = collection.add("spaceship", json!({ "id": 1 })).unwrap_err();
    assert_eq!(err, DatxError::UnknownType("spaceship".into()));
    assert!(collection.is_empty());
}

// =============================================================================
// Relationships
// =============================================================================

#[test]
fn nested_records_are_added_and_linked() {
    let collection = collection();
    let event = collection
        .add(
            "event",
            json!({
                "id": "e1",
                "title": "Launch",
                "responsible": { "id": "p1", "name": "Ada" },
                "organizers": ["p1", { "id": "p2", "name": "Bob" }]
            }),
        )
        .unwrap();

    let responsible = event.one("responsible").unwrap().unwrap();
    assert!(responsible.ptr_eq(&collection.find_one("person", "p1").unwrap()));
    let organizers: Vec<Id> = event.many("organizers").unwrap().iter().map(|m| m.id()).collect();
    assert_eq!(organizers, vec![Id::from("p1"), Id::from("p2")]);
    assert_eq!(collection.find_all("person").len(), 2);
}

#[test]
fn removing_a_person_cascades_into_events() {
    let collection = collection();
    let event = collection
        .add(
            "event",
            json!({
                "id": "e1",
                "responsible": { "id": "p1" },
                "organizers": [{ "id": "p1" }, { "id": "p2" }]
            }),
        )
        .unwrap();
    let person = collection.find_one("person", "p1").unwrap();

    assert!(collection.remove_one(&person));

    assert_eq!(event.one("responsible").unwrap(), None);
    assert_eq!(event.ref_value("responsible"), Some(RefValue::One(None)));
    let organizers: Vec<Id> = event.many("organizers").unwrap().iter().map(|m| m.id()).collect();
    assert_eq!(organizers, vec![Id::from("p2")]);
    assert!(collection.find_one("event", "e1").is_some());
    assert!(!event.is_dirty());
}

#[test]
fn links_must_point_at_the_declared_type() {
    let collection = collection();
    collection.add("pet", json!({ "id": 1, "name": "Rex" })).unwrap();

    let err = collection
        .add("event", json!({ "id": "e1", "responsible": { "type": "pet", "id": 1 } }))
        .unwrap_err();

    assert!(matches!(err, DatxError::InvalidReference { .. }));
    assert!(collection.find_one("event", "e1").is_none());

    let event = collection
        .add("event", json!({ "id": "e1", "responsible": { "type": "person", "id": 1 } }))
        .unwrap();
    let person = event.one("responsible").unwrap().unwrap();
    assert_eq!(person.type_name(), "person");
    collection.remove_one(&collection.find_one("pet", 1).unwrap());
    assert!(event.one("responsible").unwrap().is_some());
}

#[test]
fn inverse_follows_the_forward_side() {
    let collection = collection();
    let list = collection
        .add("list", json!({ "id": "l1", "items": [{ "id": "i1" }, { "id": "i2" }] }))
        .unwrap();
    let item = collection.find_one("item", "i1").unwrap();

    assert!(item.one("owner").unwrap().unwrap().ptr_eq(&list));

    assert!(list.remove_from_many("items", &item).unwrap());
    assert_eq!(item.one("owner").unwrap(), None);
    let other = collection.find_one("item", "i2").unwrap();
    assert!(other.one("owner").unwrap().unwrap().ptr_eq(&list));
}

#[test]
fn writing_an_inverse_updates_the_forward_side() {
    let collection = collection();
    let ada = collection.add("person", json!({ "id": "p1" })).unwrap();
    let rex = collection.add("pet", json!({ "id": 1, "name": "Rex" })).unwrap();
    let tom = collection.add("pet", json!({ "id": 2, "name": "Tom" })).unwrap();

    ada.set_many("pets", &[rex.clone(), tom.clone()]).unwrap();
    assert!(rex.one("owner").unwrap().unwrap().ptr_eq(&ada));
    assert!(tom.one("owner").unwrap().unwrap().ptr_eq(&ada));

    ada.set_many("pets", &[tom.clone()]).unwrap();
    assert_eq!(rex.one("owner").unwrap(), None);
    assert_eq!(ada.many("pets").unwrap().len(), 1);
}

#[test]
fn relationship_reads_can_be_scoped_to_a_collection() {
    let first = collection();
    let second = collection();
    let event = first
        .add("event", json!({ "id": "e1", "responsible": { "id": "p1", "name": "Ada" } }))
        .unwrap();
    second.add_model(&event).unwrap();

    assert!(event.one_in(&first, "responsible").unwrap().is_some());
    assert_eq!(event.one_in(&second, "responsible").unwrap(), None);
    assert_eq!(event.collections().len(), 2);
}

// =============================================================================
// Dirty tracking and identifiers
// =============================================================================

#[test]
fn dirty_tracking_through_a_save() {
    let collection = collection();
    let person = collection
        .add("person", json!({ "id": "1", "name": "Ada" }))
        .unwrap();
    assert!(person.dirty_fields().is_empty());

    person.set("name", "Ada L.").unwrap();
    assert!(person.is_field_dirty("name"));

    collection.save(&person).unwrap();
    assert!(!person.is_dirty());
    assert!(person.is_persisted());
}

#[test]
fn server_data_clears_dirty_fields_it_writes() {
    let collection = collection();
    let person = collection
        .add("person", json!({ "id": "1", "name": "Ada", "age": 36 }))
        .unwrap();
    person.set("name", "Local").unwrap();
    person.set("age", 37).unwrap();

    collection
        .add("person", json!({ "id": "1", "name": "Server" }))
        .unwrap();

    assert!(!person.is_field_dirty("name"));
    assert!(person.is_field_dirty("age"));
}

#[test]
fn changing_an_id_rewrites_references() {
    let collection = collection();
    let event = collection
        .add("event", json!({ "id": "e1", "responsible": { "name": "Draft" } }))
        .unwrap();
    let person = event.one("responsible").unwrap().unwrap();
    assert!(person.id().is_temporary());

    person.set_id("p9").unwrap();

    assert!(collection.find_one("person", "p9").unwrap().ptr_eq(&person));
    assert!(event.one("responsible").unwrap().unwrap().ptr_eq(&person));

    collection.save(&person).unwrap();
    assert!(matches!(
        person.set_id("p10").unwrap_err(),
        DatxError::ImmutableIdentifier { .. }
    ));
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn date_attributes_survive_a_snapshot_round_trip() {
    let source = collection();
    source
        .add(
            "event",
            json!({ "id": "e1", "title": "Launch", "date": "2024-05-01T12:30:00Z" }),
        )
        .unwrap();

    let text = serde_json::to_string(&source.snapshot()).unwrap();
    let target = collection();
    target.restore(serde_json::from_str(&text).unwrap()).unwrap();

    let event = target.find_one("event", "e1").unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    assert_eq!(event.get::<DateTime<Utc>>("date"), Some(expected));
    assert_eq!(event.get::<String>("title").as_deref(), Some("Launch"));
}

// =============================================================================
// Typed records and change notification
// =============================================================================

#[test]
fn typed_repository() {
    let collection = collection();
    let people = collection.records::<Person>();
    people.add(json!({ "id": "1", "name": "Ada" })).unwrap();
    people.add(json!({ "id": "2", "name": "Bob" })).unwrap();

    assert_eq!(people.get("1").and_then(|p| p.name()).as_deref(), Some("Ada"));
    assert_eq!(people.find(&|p: &Person| p.name().as_deref() == Some("Bob")).len(), 1);
    assert_eq!(people.len(), 2);
}

#[test]
fn batched_changes_arrive_as_one_set() {
    let collection = collection();
    let seen: Arc<Mutex<Vec<ChangeSet>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = collection.subscribe(move |set| sink.lock().unwrap().push(set));

    collection
        .add_all("person", json!([{ "id": "1" }, { "id": "2" }, { "id": "3" }]))
        .unwrap();

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].of_kind(ChangeKind::Added).count(), 3);
    }

    assert!(collection.unsubscribe(&subscription));
    collection.add("person", json!({ "id": "4" })).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// =============================================================================
// Properties
// =============================================================================

fn person_ids() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..8, 1..40)
}

proptest! {
    #[test]
    fn one_instance_per_key(ids in person_ids()) {
        let collection = Collection::new();
        collection.register(Person::schema());
        for (n, id) in ids.iter().enumerate() {
            collection
                .add("person", json!({ "id": *id as i64, "name": format!("v{}", n) }))
                .unwrap();
        }

        let mut distinct = ids.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(collection.find_all("person").len(), distinct.len());

        // Last write wins for every key.
        for id in distinct {
            let last = ids.iter().rposition(|x| *x == id).unwrap();
            let person = collection.find_one("person", id as i64).unwrap();
            prop_assert_eq!(person.get::<String>("name"), Some(format!("v{}", last)));
        }
    }

    #[test]
    fn partial_merge_keeps_untouched_fields(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
        let collection = Collection::new();
        collection.register(Person::schema());
        collection.add("person", json!({ "id": 1, "name": a, "age": b })).unwrap();
        let person = collection.add("person", json!({ "id": 1, "name": c })).unwrap();

        prop_assert_eq!(person.get::<i64>("name"), Some(c));
        prop_assert_eq!(person.get::<i64>("age"), Some(b));
    }
}
