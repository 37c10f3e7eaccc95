//! Integration tests for reviewing and merging suggestions.

mod helpers;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use verdant_core::error::ErrorKind;
use verdant_database::MergeStep;
use verdant_entity::suggestion::{ReviewDecision, SuggestionStatus};
use verdant_entity::vegetable::{Friend, ImageRef, Tip};
use verdant_service::MergeExecutor;

use helpers::{TestApp, contributor, new_photo, plain, png_base64, reviewer, tomato, with_photo};

#[tokio::test]
async fn test_approve_photo_and_origin() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let photo = new_photo("flor", &png_base64());
    let photo_id: Uuid = photo["id"].as_str().unwrap().parse().unwrap();
    let mut updated = with_photo(current.clone(), photo);
    updated.origin = Some("Peru".into());
    let suggestion = app.propose(&current, updated).await;

    let outcome = app
        .service
        .review_suggestion(&reviewer(), &suggestion.id.to_string(), ReviewDecision::Approve)
        .await;
    assert_eq!(outcome.error_code, None);
    assert_eq!(outcome.status, Some(SuggestionStatus::Merged));
    assert_eq!(outcome.redirect.as_deref(), Some("/vegetables/tomate"));

    let live = app.live(current.id).await;
    assert_eq!(live.origin.as_deref(), Some("Peru"));
    assert_eq!(live.revision, current.revision + 1);
    assert_eq!(live.photos.len(), 2);
    let merged_photo = live.photos.iter().find(|p| p.id == photo_id).unwrap();
    assert!(matches!(merged_photo.image, ImageRef::Stored { .. }));
    assert_eq!(live.photos[0], current.photos[0]);

    let stored = app.suggestion(&suggestion.id.to_string()).await;
    assert_eq!(stored.status, SuggestionStatus::Merged);
    assert!(stored.reviewed_by.is_some());
}

#[tokio::test]
async fn test_disjoint_suggestions_approved_in_sequence() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut first = current.clone();
    first.origin = Some("Peru".into());
    let first = app.propose(&current, first).await;

    let mut second = current.clone();
    second.tips.push(Tip {
        id: Uuid::new_v4(),
        subjects: vec!["plantio".into()],
        content: "Tutorar as hastes".into(),
        handle: None,
        sources: vec![],
    });
    let second = app.propose(&current, second).await;

    app.approve(&first).await;
    app.approve(&second).await;

    let live = app.live(current.id).await;
    assert_eq!(live.origin.as_deref(), Some("Peru"));
    assert_eq!(live.tips.len(), 1);
    assert_eq!(live.tips[0].content, "Tutorar as hastes");
    assert_eq!(live.revision, current.revision + 2);
}

#[tokio::test]
async fn test_stale_suggestion_keeps_newer_changes() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut rename = current.clone();
    rename.names = vec!["Tomate".into(), "Tomateiro".into()];
    let rename = app.propose(&current, rename).await;

    let mut photo_label = current.clone();
    photo_label.photos[0].label = Some("Fruto verde".into());
    let photo_label = app.propose(&current, photo_label).await;

    app.approve(&photo_label).await;
    app.approve(&rename).await;

    let live = app.live(current.id).await;
    assert_eq!(live.names, vec!["Tomate", "Tomateiro"]);
    assert_eq!(live.photos[0].label.as_deref(), Some("Fruto verde"));
}

#[tokio::test]
async fn test_failed_merge_leaves_store_untouched() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = with_photo(current.clone(), new_photo("muda", &png_base64()));
    updated.origin = Some("Peru".into());
    let tip: Tip = serde_json::from_value(json!({
        "id": Uuid::new_v4(),
        "content": "Regar pela manhã",
        "sources": [{"id": Uuid::new_v4(), "credits": "Horta comunitária"}]
    }))
    .unwrap();
    updated.tips.push(tip);
    let suggestion = app.propose(&current, updated).await;

    let rows_before = app.store.row_counts().await;
    app.store.fail_merge_at(Some(MergeStep::Tips)).await;

    let outcome = app
        .service
        .review_suggestion(&reviewer(), &suggestion.id.to_string(), ReviewDecision::Approve)
        .await;
    assert_eq!(outcome.error_code, Some("UNKNOWN_ERROR"));
    assert_eq!(outcome.status, None);

    assert_eq!(app.store.row_counts().await, rows_before);
    assert_eq!(app.live(current.id).await, current);
    let stored = app.suggestion(&suggestion.id.to_string()).await;
    assert_eq!(stored.status, SuggestionStatus::PendingReview);

    app.store.fail_merge_at(None).await;
    app.approve(&suggestion).await;
    let live = app.live(current.id).await;
    assert_eq!(live.origin.as_deref(), Some("Peru"));
    assert_eq!(live.tips.len(), 1);
    assert_eq!(live.photos.len(), 2);
}

#[tokio::test]
async fn test_friendships_are_symmetric_and_idempotent() {
    let app = TestApp::new().await;
    let (corn, bean, squash) = (plain("milho"), plain("feijao"), plain("abobora"));
    app.seed(&[&corn, &bean, &squash]).await;

    let mut updated = corn.clone();
    updated.friends = vec![Friend { id: bean.id }];
    let suggestion = app.propose(&corn, updated).await;
    app.approve(&suggestion).await;

    let bean_live = app.live(bean.id).await;
    assert_eq!(bean_live.friends, vec![Friend { id: corn.id }]);
    assert_eq!(app.store.friendships().await.len(), 1);

    // Linking from the other side reuses the existing pair.
    let mut updated = bean_live.clone();
    updated.friends.push(Friend { id: squash.id });
    let suggestion = app.propose(&bean_live, updated).await;
    app.approve(&suggestion).await;
    assert_eq!(app.store.friendships().await.len(), 2);

    let corn_live = app.live(corn.id).await;
    let mut updated = corn_live.clone();
    updated.friends.clear();
    let suggestion = app.propose(&corn_live, updated).await;
    app.approve(&suggestion).await;

    let links = app.store.friendships().await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].other(bean.id), Some(squash.id));
    assert!(app.live(corn.id).await.friends.is_empty());
}

#[tokio::test]
async fn test_preview_resolves_friend_summaries() {
    let app = TestApp::new().await;
    let (corn, bean) = (plain("milho"), plain("feijao"));
    app.seed(&[&corn, &bean]).await;

    let mut updated = corn.clone();
    updated.friends = vec![Friend { id: bean.id }];
    let suggestion = app.propose(&corn, updated).await;

    let screen = app
        .service
        .preview(&reviewer(), &suggestion.id.to_string())
        .await
        .unwrap();
    assert_eq!(screen.friends.len(), 1);
    assert_eq!(screen.friends[0].handle, "feijao");
    assert_eq!(
        screen.preview.data_that_changed.keys().collect::<Vec<_>>(),
        vec!["friends"]
    );
}

#[tokio::test]
async fn test_reject_does_not_touch_vegetable() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    updated.origin = None;
    let suggestion = app.propose(&current, updated).await;

    let outcome = app
        .service
        .review_suggestion(&reviewer(), &suggestion.id.to_string(), ReviewDecision::Reject)
        .await;
    assert_eq!(outcome.status, Some(SuggestionStatus::Rejected));
    assert_eq!(outcome.redirect, None);
    assert_eq!(app.live(current.id).await, current);

    let again = app
        .service
        .review_suggestion(&reviewer(), &suggestion.id.to_string(), ReviewDecision::Approve)
        .await;
    assert_eq!(again.error_code, Some("CONFLICT"));
}

#[tokio::test]
async fn test_contributor_cannot_review() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut updated = current.clone();
    updated.origin = Some("Chile".into());
    let suggestion = app.propose(&current, updated).await;

    let outcome = app
        .service
        .review_suggestion(&contributor(), &suggestion.id.to_string(), ReviewDecision::Approve)
        .await;
    assert_eq!(outcome.error_code, Some("NOT_ALLOWED"));
    assert_eq!(app.live(current.id).await, current);
}

#[tokio::test]
async fn test_malformed_and_unknown_ids() {
    let app = TestApp::new().await;

    let outcome = app
        .service
        .review_suggestion(&reviewer(), "../etc", ReviewDecision::Approve)
        .await;
    assert_eq!(outcome.error_code, Some("INVALID_INPUT"));

    let outcome = app
        .service
        .review_suggestion(&reviewer(), &Uuid::new_v4().to_string(), ReviewDecision::Reject)
        .await;
    assert_eq!(outcome.error_code, Some("NOT_FOUND"));
}

#[tokio::test]
async fn test_merge_with_stale_revision_conflicts() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let mut first = current.clone();
    first.origin = Some("Peru".into());
    let first = app.propose(&current, first).await;
    let mut second = current.clone();
    second.content = Some("Fruto de verão".into());
    let second = app.propose(&current, second).await;

    let executor = MergeExecutor::new(Arc::new(app.store.clone()));
    let changes = BTreeMap::from([("origin".to_string(), json!("Peru"))]);
    executor
        .merge(&changes, current.id, first.id, Uuid::new_v4(), current.revision)
        .await
        .unwrap();

    let changes = BTreeMap::from([("content".to_string(), json!("Fruto de verão"))]);
    let err = executor
        .merge(&changes, current.id, second.id, Uuid::new_v4(), current.revision)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let live = app.live(current.id).await;
    assert_eq!(live.content, None);
    let stored = app.suggestion(&second.id.to_string()).await;
    assert_eq!(stored.status, SuggestionStatus::PendingReview);
}

#[tokio::test]
async fn test_approve_variety_with_sources() {
    let app = TestApp::new().await;
    let current = tomato();
    app.seed(&[&current]).await;

    let shared = current.photos[0].sources[0].clone();
    let mut updated = current.clone();
    updated.varieties.push(
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "names": ["Cereja"],
            "sources": [
                {"id": Uuid::new_v4(), "credits": "Embrapa"},
                shared
            ]
        }))
        .unwrap(),
    );
    let suggestion = app.propose(&current, updated.clone()).await;
    let sources_before = app.store.row_counts().await.sources;
    app.approve(&suggestion).await;

    let live = app.live(current.id).await;
    assert_eq!(live.varieties, updated.varieties);
    assert_eq!(live.varieties[0].sources[0].credits.as_deref(), Some("Embrapa"));
    assert_eq!(app.store.row_counts().await.sources, sources_before + 1);
}
