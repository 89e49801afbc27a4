//! Integration tests for the notification history store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, TOKEN};
use pushreg::history::HistoryCache;
use pushreg::{
    DirectoryClient, Error, HistoryStore, HistoryView, StaticTokenProvider,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn history_json() -> serde_json::Value {
    serde_json::json!([
        {
            "_id": "a",
            "title": "Welcome",
            "body": "Thanks for subscribing",
            "type": "individual",
            "token": TOKEN,
            "sentAt": "2024-06-01T08:00:00Z"
        },
        {
            "_id": "b",
            "title": "Match tonight",
            "body": "Kickoff at 20:00",
            "type": "broadcast",
            "filters": { "interests": ["sports"] },
            "sentAt": "2024-06-02T18:00:00Z"
        },
        {
            "_id": "c",
            "title": "Storm warning",
            "body": "Stay indoors",
            "type": "broadcast",
            "filters": { "radiusKm": 10 },
            "sentAt": "2024-06-03T06:30:00Z"
        }
    ])
}

async fn mount_registered_device(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/devices/me/{TOKEN}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"userInfo": {"userId": "u1"}})),
        )
        .mount(server)
        .await;
}

async fn mount_history(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/notifications/history/{TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_json()))
        .mount(server)
        .await;
}

fn ids(view: &HistoryView) -> Vec<&str> {
    view.entries().iter().map(|e| e.id.as_str()).collect()
}

#[tokio::test]
async fn test_unregistered_device_has_no_history() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/devices/me/{TOKEN}")))
        .respond_with(ResponseTemplate::new(404).set_body_string("Device not found"))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/notifications/history/{TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_json()))
        .expect(0)
        .mount(&h.server)
        .await;

    let view = h.runtime.history().fetch_current().await.unwrap();
    assert_eq!(view, HistoryView::Unregistered);
    assert!(view.entries().is_empty());
}

#[tokio::test]
async fn test_fetch_returns_fresh_list_and_placeholder() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;

    let history = h.runtime.history();
    assert!(history.placeholder(TOKEN).is_empty());

    let view = history.fetch(TOKEN).await.unwrap();
    assert!(matches!(view, HistoryView::Fresh(_)));
    assert_eq!(ids(&view), ["a", "b", "c"]);
    assert_eq!(history.placeholder(TOKEN), view.entries());
}

#[tokio::test]
async fn test_failed_delete_rolls_back_at_original_index() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/b"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let history = h.runtime.history();
    history.fetch(TOKEN).await.unwrap();

    let err = history.delete("b").await.unwrap_err();
    assert!(matches!(err, Error::ServerError { code: 500, .. }));

    let after: Vec<String> = history.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(after, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_delete_is_optimistic() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/b"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&h.server)
        .await;

    let history = h.runtime.history();
    history.fetch(TOKEN).await.unwrap();

    let (result, during) = tokio::join!(history.delete("b"), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        history.entries().len()
    });
    result.unwrap();
    assert_eq!(during, 2, "entry leaves the list before the directory confirms");

    let after: Vec<String> = history.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(after, ["a", "c"]);
}

#[tokio::test]
async fn test_failed_fetch_falls_back_to_previous_list() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    Mock::given(method("GET"))
        .and(path(format!("/notifications/history/{TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_json()))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/notifications/history/{TOKEN}")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let history = h.runtime.history();
    history.fetch(TOKEN).await.unwrap();

    let view = history.fetch(TOKEN).await.unwrap();
    match &view {
        HistoryView::Cached { error, .. } => {
            assert!(matches!(error, Error::ServerError { code: 503, .. }));
        }
        other => panic!("expected cached view, got {other:?}"),
    }
    assert_eq!(ids(&view), ["a", "b", "c"]);
}

#[tokio::test]
async fn test_failed_fetch_without_previous_list_is_error() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/devices/me/{TOKEN}")))
        .respond_with(ResponseTemplate::new(502))
        .mount(&h.server)
        .await;

    let err = h.runtime.history().fetch(TOKEN).await.unwrap_err();
    assert!(matches!(err, Error::ServerError { code: 502, .. }));
}

#[tokio::test]
async fn test_disk_mirror_survives_restart() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;
    h.runtime.history().fetch(TOKEN).await.unwrap();

    // A new store over the same cache directory, with the directory offline.
    let offline = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&offline)
        .await;
    let store = HistoryStore::new(
        DirectoryClient::new(&offline.uri(), Duration::from_secs(5)).unwrap(),
        Arc::new(StaticTokenProvider::new(TOKEN)),
        Some(HistoryCache::new(h.cache_dir.path())),
    );

    assert_eq!(store.placeholder(TOKEN).len(), 3);
    let view = store.fetch_current().await.unwrap();
    assert!(matches!(view, HistoryView::Cached { .. }));
    assert_eq!(ids(&view), ["a", "b", "c"]);
}

#[tokio::test]
async fn test_refetch_during_failed_delete_is_not_duplicated() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/b"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&h.server)
        .await;

    let history = h.runtime.history();
    history.fetch(TOKEN).await.unwrap();

    let (deleted, refreshed) = tokio::join!(history.delete("b"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        history.fetch(TOKEN).await
    });
    assert!(deleted.is_err());
    assert!(matches!(refreshed.unwrap(), HistoryView::Fresh(_)));

    let after: Vec<String> = history.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(after, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_failed_delete_returns_between_neighbours() {
    let h = harness().await;
    mount_registered_device(&h.server).await;
    mount_history(&h.server).await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/b"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/a"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    let history = h.runtime.history();
    history.fetch(TOKEN).await.unwrap();

    let (failed, succeeded) = tokio::join!(history.delete("b"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        history.delete("a").await
    });
    assert!(failed.is_err());
    succeeded.unwrap();

    let after: Vec<String> = history.entries().into_iter().map(|e| e.id).collect();
    assert_eq!(after, ["b", "c"]);
}
