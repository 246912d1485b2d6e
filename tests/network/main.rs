mod mock;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use datx::network::{
    CachingStrategy, Method, NetworkConfig, NetworkStore, RawResponse, RequestOptions,
    RequestStatus, ResponseData,
};
use datx::{Collection, DatxError, Id, Schema, View};
use serde_json::json;

use mock::{event, event_page, ok, MockServer, BASE};

fn collection() -> Collection {
    let collection = Collection::new();
    collection.register(Schema::new("person").attribute("name"));
    collection.register(
        Schema::new("event")
            .attribute("title")
            .to_one("responsible", "person")
            .to_many("organizers", "person"),
    );
    collection.register(Schema::new("tag").attribute("label").endpoint("labels"));
    collection
}

fn store(server: &MockServer, configure: impl FnOnce(NetworkConfig) -> NetworkConfig) -> NetworkStore {
    NetworkStore::new(collection(), configure(NetworkConfig::new(BASE, server.clone())))
}

fn title(store: &NetworkStore, id: &str) -> Option<String> {
    store
        .collection()
        .find_one("event", id)
        .and_then(|m| m.get::<String>("title"))
}

/// Wait for background refreshes scheduled on the runtime.
async fn settle(server: &MockServer, calls: usize) {
    for _ in 0..100 {
        if server.calls() >= calls {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn fetch_one_merges_included_records() {
    let server = MockServer::new();
    server.on(
        Method::Get,
        "/event/1",
        ok(json!({
            "data": {
                "type": "event", "id": "1",
                "attributes": { "title": "Launch" },
                "relationships": {
                    "responsible": { "data": { "type": "person", "id": "p1" } },
                    "organizers": { "data": [{ "type": "person", "id": "p1" }, { "type": "person", "id": "p2" }] }
                }
            },
            "included": [
                { "type": "person", "id": "p1", "attributes": { "name": "Ada" } },
                { "type": "person", "id": "p2", "attributes": { "name": "Bob" } }
            ],
            "meta": { "request": "abc" }
        })),
    );
    let store = store(&server, |c| c);

    let response = store.fetch_one("event", "1", RequestOptions::new()).await;
    assert!(response.is_ok(), "{:?}", response.error());
    assert_eq!(response.status(), Some(200));
    assert_eq!(response.meta(), Some(&json!({ "request": "abc" })));

    let event = response.model().unwrap();
    assert!(event.is_persisted());
    let responsible = event.one("responsible").unwrap().unwrap();
    assert_eq!(responsible.get::<String>("name").as_deref(), Some("Ada"));
    assert_eq!(event.many("organizers").unwrap().len(), 2);
}

#[tokio::test]
async fn explicit_endpoints_win_over_type_names() {
    let server = MockServer::new();
    server.on(
        Method::Get,
        "/labels",
        ok(json!({ "data": [{ "type": "tag", "id": "t1", "attributes": { "label": "rust" } }] })),
    );
    let store = store(&server, |c| c.infer_endpoints(false));

    let response = store.fetch_all("tag", RequestOptions::new()).await;
    assert_eq!(response.models().len(), 1);

    let missing = store.fetch_all("event", RequestOptions::new()).await;
    assert!(matches!(
        missing.error(),
        Some(DatxError::MissingRequestDefinition { type_name, .. }) if type_name == "event"
    ));
    assert_eq!(server.calls(), 1);
}

#[tokio::test]
async fn api_errors_surface_in_the_response() {
    let server = MockServer::new();
    server.on(
        Method::Get,
        "/event/9",
        RawResponse::new(
            404,
            Some(json!({ "errors": [{ "status": "404", "detail": "no such event" }] })),
        ),
    );
    let store = store(&server, |c| c);

    let response = store.fetch_one("event", "9", RequestOptions::new()).await;
    match response.into_result() {
        Err(DatxError::Api { status, errors }) => {
            assert_eq!(status, 404);
            assert_eq!(errors[0].detail.as_deref(), Some("no such event"));
        }
        other => panic!("expected an api error, got {:?}", other),
    }
}

#[tokio::test]
async fn transport_failures_surface_in_the_response() {
    let server = MockServer::new();
    server.offline(true);
    let store = store(&server, |c| c);

    let response = store.fetch_all("event", RequestOptions::new()).await;
    assert!(matches!(response.error(), Some(DatxError::Network(_))));
    assert_eq!(response.status(), None);
}

#[tokio::test]
async fn hooks_and_headers_reach_the_fetcher() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=1, None).header("x-token", "fresh"));
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let store = store(&server, move |c| {
        c.header("Accept-Language", "en")
            .transform_request(|mut request| {
                request
                    .headers
                    .insert("authorization".into(), "Bearer secret".into());
                request
            })
            .transform_response(move |response| {
                *sink.lock().unwrap() = response.headers.get("x-token").cloned();
                response
            })
    });

    store.fetch_all("event", RequestOptions::new()).await;

    let request = &server.requests()[0];
    assert_eq!(request.headers["authorization"], "Bearer secret");
    assert_eq!(request.headers["accept-language"], "en");
    assert_eq!(seen.lock().unwrap().as_deref(), Some("fresh"));
}

// =============================================================================
// Caching strategies
// =============================================================================

#[tokio::test]
async fn cache_first_serves_fresh_entries_without_a_call() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=3, None));
    let store = store(&server, |c| c.max_age(Duration::from_secs(60)));

    let first = store.fetch_all("event", RequestOptions::new()).await;
    let second = store.fetch_all("event", RequestOptions::new()).await;

    assert_eq!(server.calls(), 1);
    assert!(!first.is_cached());
    assert!(second.is_cached());
    assert_eq!(first.models(), second.models());
}

#[tokio::test]
async fn cache_first_refetches_expired_entries() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=3, None));
    let store = store(&server, |c| c.max_age(Duration::from_millis(20)));

    store.fetch_all("event", RequestOptions::new()).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    let response = store.fetch_all("event", RequestOptions::new()).await;

    assert_eq!(server.calls(), 2);
    assert!(!response.is_cached());
}

#[tokio::test]
async fn network_only_always_fetches() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=2, None));
    let store = store(&server, |c| c.strategy(CachingStrategy::NetworkOnly));

    store.fetch_all("event", RequestOptions::new()).await;
    store.fetch_all("event", RequestOptions::new()).await;

    assert_eq!(server.calls(), 2);
}

#[tokio::test]
async fn network_first_falls_back_to_the_cache_when_offline() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=2, None));
    let store = store(&server, |c| c.strategy(CachingStrategy::NetworkFirst));

    let online = store.fetch_all("event", RequestOptions::new()).await;
    assert!(!online.is_cached());

    server.offline(true);
    let offline = store.fetch_all("event", RequestOptions::new()).await;
    assert!(offline.is_ok());
    assert!(offline.is_cached());
    assert_eq!(offline.models().len(), 2);
    assert_eq!(server.calls(), 2);

    let uncached = store.fetch_one("event", "1", RequestOptions::new()).await;
    assert!(matches!(uncached.error(), Some(DatxError::Network(_))));
}

#[tokio::test]
async fn cache_only_never_fetches() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=2, None));
    let store = store(&server, |c| c);
    let cache_only = || RequestOptions::new().strategy(CachingStrategy::CacheOnly);

    let miss = store.fetch_all("event", cache_only()).await;
    assert!(matches!(miss.error(), Some(DatxError::CacheMiss(_))));
    assert_eq!(server.calls(), 0);

    store.fetch_all("event", RequestOptions::new()).await;
    let hit = store.fetch_all("event", cache_only()).await;
    assert!(hit.is_cached());
    assert_eq!(server.calls(), 1);
}

#[tokio::test]
async fn stale_while_revalidate_refreshes_for_the_next_read() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", ok(json!({ "data": [event(1, "old")] })));
    let store = store(&server, |c| c.strategy(CachingStrategy::StaleWhileRevalidate));

    store.fetch_all("event", RequestOptions::new()).await;
    server.set(Method::Get, "/event", ok(json!({ "data": [event(1, "new")] })));

    let mut stale = store.fetch_all("event", RequestOptions::new()).await;
    assert!(stale.is_cached());
    assert!(stale.take_update().is_none());
    assert_eq!(title(&store, "1").as_deref(), Some("old"));

    settle(&server, 2).await;
    assert_eq!(server.calls(), 2);
    assert_eq!(title(&store, "1").as_deref(), Some("new"));

    let next = store.fetch_all("event", RequestOptions::new()).await;
    assert!(next.is_cached());
    assert_eq!(next.model().unwrap().get::<String>("title").as_deref(), Some("new"));
}

#[tokio::test]
async fn stale_and_update_delivers_a_second_response() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", ok(json!({ "data": [event(1, "old")] })));
    let store = store(&server, |c| c.strategy(CachingStrategy::StaleAndUpdate));

    store.fetch_all("event", RequestOptions::new()).await;
    server.set(Method::Get, "/event", ok(json!({ "data": [event(1, "new")] })));

    let mut stale = store.fetch_all("event", RequestOptions::new()).await;
    assert!(stale.is_cached());
    let stale_model = stale.model().unwrap();
    assert_eq!(stale_model.get::<String>("title").as_deref(), Some("old"));

    let fresh = stale.take_update().unwrap().await.unwrap();
    assert!(!fresh.is_cached());
    let fresh_model = fresh.model().unwrap();
    assert!(fresh_model.ptr_eq(&stale_model));
    assert_eq!(fresh_model.get::<String>("title").as_deref(), Some("new"));
}

#[tokio::test]
async fn per_request_options_override_the_config() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=1, None));
    let store = store(&server, |c| c.strategy(CachingStrategy::NetworkOnly));

    store.fetch_all("event", RequestOptions::new()).await;
    let cached = store
        .fetch_all("event", RequestOptions::new().strategy(CachingStrategy::CacheFirst))
        .await;

    assert!(cached.is_cached());
    assert_eq!(server.calls(), 1);
}

#[tokio::test]
async fn identical_requests_share_one_fetch() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=2, None));
    server.delay(Duration::from_millis(30));
    let store = store(&server, |c| c.strategy(CachingStrategy::NetworkOnly));

    let (a, b) = tokio::join!(
        store.fetch_all("event", RequestOptions::new()),
        store.fetch_all("event", RequestOptions::new())
    );

    assert_eq!(server.calls(), 1);
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(a.models(), b.models());
}

#[tokio::test]
async fn request_status_tracks_each_key() {
    let server = MockServer::new();
    server.on(Method::Get, "/event/1", ok(json!({ "data": event(1, "Launch") })));
    server.on(Method::Get, "/event/2", RawResponse::new(500, None));
    let store = store(&server, |c| c);
    let options = RequestOptions::new();

    let status = |id: &str| store.request_status("event", Some(Id::from(id)), &options).unwrap();
    assert_eq!(status("1"), RequestStatus::Idle);

    store.fetch_one("event", "1", RequestOptions::new()).await;
    store.fetch_one("event", "2", RequestOptions::new()).await;

    assert_eq!(status("1"), RequestStatus::Resolved);
    assert_eq!(status("2"), RequestStatus::Errored);
    assert!(store.request_status("ghost", None, &options).is_err());
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn next_page_accumulates_into_the_collection() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=15, Some("/event?page=2")));
    server.on(Method::Get, "/event?page=2", event_page(16..=22, None));
    let store = store(&server, |c| c);

    let first = store.fetch_all("event", RequestOptions::new()).await;
    assert_eq!(first.models().len(), 15);
    let second = first.next().await.unwrap();
    assert_eq!(second.models().len(), 7);
    assert!(second.next().await.is_none());

    assert_eq!(store.collection().find_all("event").len(), 22);
}

#[tokio::test]
async fn get_all_follows_every_page_without_duplicates() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=10, Some("/event?page=2")));
    server.on(Method::Get, "/event?page=2", event_page(10..=15, Some("/event?page=3")));
    server.on(Method::Get, "/event?page=3", event_page(16..=17, None));
    let store = store(&server, |c| c);

    let response = store.get_all("event", RequestOptions::new()).await;

    assert!(response.is_ok());
    assert_eq!(server.calls(), 3);
    assert_eq!(response.models().len(), 17);
    assert_eq!(store.collection().find_all("event").len(), 17);
}

#[tokio::test]
async fn get_all_stops_at_the_first_failed_page() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=5, Some("/event?page=2")));
    server.on(Method::Get, "/event?page=2", RawResponse::new(500, None));
    let store = store(&server, |c| c);

    let response = store.get_all("event", RequestOptions::new()).await;

    assert!(matches!(response.error(), Some(DatxError::Api { status: 500, .. })));
    assert_eq!(store.collection().find_all("event").len(), 5);
}

#[tokio::test]
async fn get_all_respects_the_page_cap() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=1, Some("/event?page=2")));
    server.on(Method::Get, "/event?page=2", event_page(2..=2, Some("/event?page=3")));
    server.on(Method::Get, "/event?page=3", event_page(3..=3, None));
    let store = store(&server, |c| c.max_pages(2));

    let response = store.get_all("event", RequestOptions::new()).await;

    assert_eq!(server.calls(), 2);
    assert_eq!(response.models().len(), 2);
}

#[tokio::test]
async fn pages_append_to_a_view() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=3, Some("/event?page=2")));
    server.on(Method::Get, "/event?page=2", event_page(4..=5, None));
    let store = store(&server, |c| c);
    let view = View::new("event", store.collection(), None, &[], true).unwrap();

    let first = store.fetch_all_into(&view, RequestOptions::new()).await;
    assert_eq!(view.len(), 3);
    assert!(first.view().is_some());

    first.next().await.unwrap();
    assert_eq!(view.len(), 5);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn saving_a_new_record_posts_everything() {
    let server = MockServer::new();
    server.on(
        Method::Post,
        "/event",
        RawResponse::new(201, Some(json!({ "data": event(7, "Launch") }))),
    );
    let store = store(&server, |c| c);
    let event = store
        .collection()
        .add("event", json!({ "title": "Launch", "organizers": [] }))
        .unwrap();

    let response = store.save(&event).await;

    assert!(response.is_ok(), "{:?}", response.error());
    let request = &server.requests()[0];
    assert_eq!(request.method, Method::Post);
    let body = request.body.as_ref().unwrap();
    assert_eq!(body["data"]["attributes"]["title"], "Launch");
    assert!(body["data"].get("id").is_none());

    assert_eq!(event.id(), Id::from("7"));
    assert!(event.is_persisted());
    assert!(store.collection().find_one("event", "7").unwrap().ptr_eq(&event));
}

#[tokio::test]
async fn saving_a_persisted_record_patches_dirty_fields() {
    let server = MockServer::new();
    server.on(Method::Get, "/event/1", ok(json!({ "data": event(1, "Launch") })));
    server.on(Method::Patch, "/event/1", RawResponse::new(204, None));
    let store = store(&server, |c| c);

    let event = store
        .fetch_one("event", "1", RequestOptions::new())
        .await
        .model()
        .unwrap();
    event.set("title", "Launch party").unwrap();
    assert!(event.is_dirty());

    let response = store.save(&event).await;

    assert!(response.is_ok(), "{:?}", response.error());
    let request = &server.requests()[1];
    assert_eq!(request.method, Method::Patch);
    assert_eq!(
        request.body.as_ref().unwrap()["data"],
        json!({ "type": "event", "id": "1", "attributes": { "title": "Launch party" } })
    );
    assert!(!event.is_dirty());
}

#[tokio::test]
async fn edits_made_during_a_save_stay_dirty() {
    let server = MockServer::new();
    server.on(Method::Get, "/event/1", ok(json!({ "data": event(1, "A") })));
    server.on(Method::Patch, "/event/1", RawResponse::new(204, None));
    let store = store(&server, |c| c);
    let event = store
        .fetch_one("event", "1", RequestOptions::new())
        .await
        .model()
        .unwrap();
    event.set("title", "B").unwrap();
    server.delay(Duration::from_millis(50));

    let (response, _) = tokio::join!(store.save(&event), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        event.set("title", "C").unwrap();
    });

    assert!(response.is_ok(), "{:?}", response.error());
    assert_eq!(
        server.requests()[1].body.as_ref().unwrap()["data"]["attributes"]["title"],
        "B"
    );
    assert_eq!(event.get::<String>("title").as_deref(), Some("C"));
    assert!(event.is_field_dirty("title"));

    event.revert();
    assert_eq!(event.get::<String>("title").as_deref(), Some("B"));
}

#[tokio::test]
async fn failed_saves_keep_local_edits() {
    let server = MockServer::new();
    server.on(
        Method::Post,
        "/event",
        RawResponse::new(
            422,
            Some(json!({ "errors": [{ "status": "422", "detail": "title is blank" }] })),
        ),
    );
    let store = store(&server, |c| c);
    let event = store.collection().add("event", json!({})).unwrap();
    event.set("title", "").unwrap();

    let response = store.save(&event).await;

    assert!(matches!(response.error(), Some(DatxError::Api { status: 422, .. })));
    assert!(event.is_field_dirty("title"));
    assert!(!event.is_persisted());
}

#[tokio::test]
async fn successful_writes_purge_the_type_cache() {
    let server = MockServer::new();
    server.on(Method::Get, "/event", event_page(1..=2, None));
    server.on(Method::Patch, "/event/1", RawResponse::new(204, None));
    let store = store(&server, |c| c);

    let listed = store.fetch_all("event", RequestOptions::new()).await;
    assert_eq!(store.cached_responses(), 1);

    let event = listed.models().remove(0);
    event.set("title", "Renamed").unwrap();
    store.save(&event).await;
    assert_eq!(store.cached_responses(), 0);

    let again = store.fetch_all("event", RequestOptions::new()).await;
    assert!(!again.is_cached());
    assert_eq!(server.calls(), 3);
}

#[tokio::test]
async fn destroy_deletes_and_removes() {
    let server = MockServer::new();
    server.on(Method::Get, "/event/1", ok(json!({ "data": event(1, "Launch") })));
    server.on(Method::Delete, "/event/1", RawResponse::new(204, None));
    let store = store(&server, |c| c);
    let event = store
        .fetch_one("event", "1", RequestOptions::new())
        .await
        .model()
        .unwrap();

    let response = store.destroy(&event).await;

    assert!(response.is_ok());
    assert_eq!(server.requests()[1].method, Method::Delete);
    assert!(store.collection().find_one("event", "1").is_none());
    assert_eq!(response.data(), Some(&ResponseData::One(None)));
}

#[tokio::test]
async fn arbitrary_requests_merge_their_records() {
    let server = MockServer::new();
    server.on(
        Method::Post,
        "/event/1/publish",
        ok(json!({ "data": event(1, "Published") })),
    );
    let store = store(&server, |c| c);

    let response = store
        .request("/event/1/publish", Method::Post, Some(json!({})), RequestOptions::new())
        .await;

    assert!(response.is_ok());
    assert_eq!(title(&store, "1").as_deref(), Some("Published"));
}
