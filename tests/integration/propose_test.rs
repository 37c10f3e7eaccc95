//! Integration tests for proposing edits.

mod helpers;

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use verdant_core::config::SuggestionConfig;
use verdant_database::SuggestionRepository;
use verdant_entity::changeset::{ChangeKind, ChangeOperation};
use verdant_storage::local::LocalBlobStorage;

use helpers::{FailingInserts, TestApp, contributor, new_photo, png_base64, tomato, with_photo};

fn find<'a>(ops: &'a [ChangeOperation], key: &str) -> &'a ChangeOperation {
    ops.iter()
        .find(|op| op.key == key)
        .unwrap_or_else(|| panic!("no operation for {key}"))
}

#[tokio::test]
async fn test_photo_and_origin_proposal_uploads_image() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let photo = new_photo("flor", &png_base64());
    let photo_id = photo["id"].as_str().unwrap().to_string();
    let mut updated = with_photo(current.clone(), photo);
    updated.origin = Some("Peru".into());

    let outcome = app
        .service
        .propose_edit(&contributor(), &current, updated)
        .await;
    assert!(outcome.is_ok(), "{:?}", outcome.error_code);
    let id = outcome.suggestion_id.unwrap();
    assert_eq!(outcome.redirect, Some(format!("/sugestoes/{id}")));

    let suggestion = app.suggestion(&id.to_string()).await;
    assert_eq!(suggestion.snapshot, current);
    assert_eq!(app.blobs.len().await, 1);

    let origin = find(&suggestion.diff, "origin");
    assert_eq!(origin.kind, ChangeKind::Update);
    assert_eq!(origin.value, Some(json!("Peru")));

    let photos = find(&suggestion.diff, "photos");
    assert_eq!(photos.embedded_key.as_deref(), Some("id"));
    let added = find(&photos.changes, &photo_id);
    assert_eq!(added.kind, ChangeKind::Add);
    let value = added.value.as_ref().unwrap();
    let storage_id = value["storage_id"].as_str().unwrap();
    assert!(app.blobs.contains(storage_id).await);
    assert!(value.get("data").is_none());
}

#[tokio::test]
async fn test_stored_diff_never_carries_image_bytes() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    updated.varieties.push(
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "names": ["Cereja"],
            "photos": [new_photo("cereja", &png_base64())]
        }))
        .unwrap(),
    );
    let updated = with_photo(updated, new_photo("folha", &png_base64()));

    let suggestion = app.propose(&current, updated).await;
    let wire = serde_json::to_string(&suggestion.diff).unwrap();
    assert!(!wire.contains("\"data\""));
    assert!(!wire.contains("\"mime_type\""));
    assert_eq!(app.blobs.len().await, 2);
}

#[tokio::test]
async fn test_upload_failure_drops_photo_but_keeps_origin() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;
    app.blobs.fail_uploads(true);

    let mut updated = with_photo(current.clone(), new_photo("flor", &png_base64()));
    updated.origin = Some("Peru".into());

    let suggestion = app.propose(&current, updated).await;
    assert_eq!(suggestion.diff.len(), 1);
    assert_eq!(suggestion.diff[0].key, "origin");
    assert_eq!(app.blobs.len().await, 0);
}

#[tokio::test]
async fn test_non_image_payload_is_dropped() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    // "hello" is valid base64 but not an image.
    let mut updated = with_photo(current.clone(), new_photo("texto", "aGVsbG8="));
    updated.content = Some("Planta anual".into());

    let suggestion = app.propose(&current, updated).await;
    assert!(suggestion.diff.iter().all(|op| op.key != "photos"));
    assert_eq!(app.blobs.len().await, 0);
}

#[tokio::test]
async fn test_unchanged_edit_is_rejected() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut reordered = current.clone();
    reordered.photos.reverse();
    let outcome = app
        .service
        .propose_edit(&contributor(), &current, reordered)
        .await;
    assert_eq!(outcome.error_code, Some("INVALID_INPUT"));
    assert_eq!(outcome.suggestion_id, None);
    assert_eq!(app.store.row_counts().await.suggestions, 0);
}

#[tokio::test]
async fn test_edit_of_another_vegetable_is_rejected() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    updated.id = Uuid::new_v4();
    let outcome = app
        .service
        .propose_edit(&contributor(), &current, updated)
        .await;
    assert_eq!(outcome.error_code, Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_invalid_aggregate_is_rejected() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    updated.handle = "Not A Slug".into();
    let outcome = app
        .service
        .propose_edit(&contributor(), &current, updated)
        .await;
    assert_eq!(outcome.error_code, Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_local_storage_receives_uploaded_image() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalBlobStorage::new(dir.path()).await.unwrap());
    let (store, service) = TestApp::build(storage.clone());
    let current = tomato();
    store.insert_aggregate(&current).await.unwrap();

    let updated = with_photo(current.clone(), new_photo("raiz", &png_base64()));
    let outcome = service.propose_edit(&contributor(), &current, updated).await;
    assert!(outcome.is_ok(), "{:?}", outcome.error_code);

    let suggestion = service
        .preview(&helpers::reviewer(), &outcome.suggestion_id.unwrap().to_string())
        .await
        .unwrap()
        .suggestion;
    let added = &find(&suggestion.diff, "photos").changes[0];
    let storage_id = added.value.as_ref().unwrap()["storage_id"].as_str().unwrap();
    assert!(storage_id.ends_with(".png"));
    let path = dir.path().join(&storage_id[..2]).join(storage_id);
    assert!(path.is_file());
}

#[tokio::test]
async fn test_unknown_target_uploads_nothing() {
    let app = TestApp::new().await;
    let current = tomato();

    let updated = with_photo(current.clone(), new_photo("flor", &png_base64()));
    let outcome = app
        .service
        .propose_edit(&contributor(), &current, updated)
        .await;
    assert_eq!(outcome.error_code, Some("NOT_FOUND"));
    assert_eq!(app.blobs.len().await, 0);
}

#[tokio::test]
async fn test_failed_insert_discards_uploaded_images() {
    let app = TestApp::with(
        |store| Arc::new(FailingInserts(store.clone())) as Arc<dyn SuggestionRepository>,
        &SuggestionConfig::default(),
    );
    let current = tomato();
    app.seed(&[&current]).await;

    let updated = with_photo(current.clone(), new_photo("flor", &png_base64()));
    let outcome = app
        .service
        .propose_edit(&contributor(), &current, updated)
        .await;
    assert_eq!(outcome.error_code, Some("UNKNOWN_ERROR"));
    assert_eq!(app.blobs.peak_in_flight(), 1);
    assert_eq!(app.blobs.len().await, 0);
}

#[tokio::test]
async fn test_uploads_are_bounded_by_configured_concurrency() {
    let config = SuggestionConfig {
        upload_concurrency: 2,
        ..SuggestionConfig::default()
    };
    let app = TestApp::with(
        |store| Arc::new(store.clone()) as Arc<dyn SuggestionRepository>,
        &config,
    );
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    for label in ["a", "b", "c", "d", "e"] {
        updated = with_photo(updated, new_photo(label, &png_base64()));
    }
    let suggestion = app.propose(&current, updated).await;

    assert_eq!(app.blobs.len().await, 5);
    assert_eq!(app.blobs.peak_in_flight(), 2);
    assert_eq!(find(&suggestion.diff, "photos").changes.len(), 5);
}

#[tokio::test]
async fn test_variety_sources_are_kept_in_the_diff() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let source_id = Uuid::new_v4();
    let mut updated = current.clone();
    updated.varieties.push(
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "names": ["Cereja"],
            "sources": [{"id": source_id, "credits": "Embrapa"}]
        }))
        .unwrap(),
    );

    let suggestion = app.propose(&current, updated).await;
    let varieties = find(&suggestion.diff, "varieties");
    let added = varieties.changes[0].value.as_ref().unwrap();
    assert_eq!(added["sources"][0]["id"], json!(source_id));
    assert_eq!(added["sources"][0]["credits"], json!("Embrapa"));
}
