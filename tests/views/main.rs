use datx::{Collection, DatxError, Id, Schema, SortMethod, View};
use serde_json::json;

fn collection() -> Collection {
    let collection = Collection::new();
    collection.register(Schema::new("person").attribute("name"));
    collection.register(
        Schema::new("event")
            .attribute("title")
            .attribute("starts")
            .to_one("responsible", "person"),
    );
    collection
}

fn titles(view: &View) -> Vec<String> {
    view.list()
        .iter()
        .filter_map(|m| m.get::<String>("title"))
        .collect()
}

#[test]
fn unique_view_syncs_an_id_once() {
    let collection = collection();
    let view = View::new("event", &collection, None, &[], true).unwrap();

    view.sync(json!({ "id": "1", "title": "Launch" })).unwrap();
    view.sync(json!({ "id": "1", "title": "Launch" })).unwrap();

    assert_eq!(view.len(), 1);
    assert_eq!(collection.find_all("event").len(), 1);
}

#[test]
fn named_views_live_in_the_collection() {
    let collection = collection();
    let upcoming = collection
        .create_view("upcoming", "event", Some(SortMethod::field("starts")), true)
        .unwrap();
    upcoming
        .sync(json!([
            { "id": 1, "title": "later", "starts": "2024-06-01" },
            { "id": 2, "title": "sooner", "starts": "2024-05-01" }
        ]))
        .unwrap();

    let again = collection.view("upcoming").unwrap();
    assert_eq!(titles(&again), vec!["sooner", "later"]);
    assert_eq!(
        collection.view("past").unwrap_err(),
        DatxError::UnknownView("past".into())
    );
}

#[test]
fn views_see_merged_data() {
    let collection = collection();
    let view = View::new("event", &collection, Some(SortMethod::field("title")), &[], true).unwrap();
    view.sync(json!([{ "id": 1, "title": "b" }, { "id": 2, "title": "c" }]))
        .unwrap();

    collection.add("event", json!({ "id": 2, "title": "a" })).unwrap();

    assert_eq!(titles(&view), vec!["a", "b"]);
}

#[test]
fn removed_records_leave_every_view() {
    let collection = collection();
    let all = collection.create_view("all", "event", None, false).unwrap();
    let mine = View::new("event", &collection, None, &[], true).unwrap();
    all.sync(json!([{ "id": 1 }, { "id": 2 }])).unwrap();
    mine.sync(json!(1)).unwrap();

    let first = collection.find_one("event", 1).unwrap();
    collection.remove_one(&first);

    assert_eq!(all.ids(), vec![Id::from(2)]);
    assert!(mine.ids().is_empty());
}

#[test]
fn reset_empties_named_views() {
    let collection = collection();
    let all = collection.create_view("all", "event", None, true).unwrap();
    all.sync(json!([{ "id": 1 }, { "id": 2 }])).unwrap();

    collection.reset();

    assert!(collection.is_empty());
    assert!(collection.view("all").unwrap().is_empty());
}

#[test]
fn membership_follows_an_id_change() {
    let collection = collection();
    let view = View::new("event", &collection, None, &[], true).unwrap();
    let draft = view.sync(json!({ "title": "Draft" })).unwrap().remove(0);
    assert!(draft.id().is_temporary());

    draft.set_id("e1").unwrap();

    assert_eq!(view.ids(), vec![Id::from("e1")]);
    assert!(view.contains(&draft));
}

#[test]
fn views_do_not_keep_the_collection_alive() {
    let collection = collection();
    let view = View::new("event", &collection, None, &[], true).unwrap();
    view.sync(json!({ "id": 1 })).unwrap();

    drop(collection);

    assert!(view.collection().is_none());
    assert!(view.list().is_empty());
    assert!(view.sync(json!({ "id": 2 })).is_err());
}

#[test]
fn remove_all_keeps_records() {
    let collection = collection();
    let view = View::new("event", &collection, None, &[], true).unwrap();
    view.sync(json!([{ "id": 1 }, { "id": 2 }])).unwrap();

    view.remove_all();

    assert!(view.is_empty());
    assert_eq!(collection.find_all("event").len(), 2);
}
