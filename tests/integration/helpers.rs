//! Shared test helpers for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use verdant_core::config::{StorageConfig, SuggestionConfig};
use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_core::traits::{BlobStorage, StoredBlob};
use verdant_database::{MemoryStore, SuggestionRepository};
use verdant_entity::suggestion::{EditSuggestion, SuggestionStatus};
use verdant_entity::vegetable::Vegetable;
use verdant_service::{RequestContext, SuggestionService, UserRole};

/// Blob storage keeping blobs in memory, with switchable upload failures.
///
/// Uploads take a few milliseconds so that concurrent uploads overlap, and
/// the highest number of uploads in flight at once is recorded.
#[derive(Debug, Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, Bytes>>,
    fail_uploads: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryBlobs {
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn contains(&self, storage_id: &str) -> bool {
        self.blobs.lock().await.contains_key(storage_id)
    }

    /// Most uploads that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobs {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn upload(&self, data: Bytes, _mime_type: &str) -> AppResult<StoredBlob> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::storage("Blob store unavailable"));
        }
        let storage_id = Uuid::new_v4().to_string();
        let size_bytes = data.len() as u64;
        self.blobs.lock().await.insert(storage_id.clone(), data);
        Ok(StoredBlob {
            storage_id,
            size_bytes,
            mime_type: "image/png".to_string(),
        })
    }

    async fn delete(&self, storage_id: &str) -> AppResult<()> {
        self.blobs.lock().await.remove(storage_id);
        Ok(())
    }
}

/// Suggestion repository whose inserts always fail.
#[derive(Debug, Clone)]
pub struct FailingInserts(pub MemoryStore);

#[async_trait]
impl SuggestionRepository for FailingInserts {
    async fn create(&self, _suggestion: &EditSuggestion) -> AppResult<EditSuggestion> {
        Err(AppError::database("Suggestion table is read-only"))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EditSuggestion>> {
        self.0.find_by_id(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        reviewer: Option<Uuid>,
    ) -> AppResult<Option<EditSuggestion>> {
        self.0.transition(id, status, reviewer).await
    }

    async fn find_by_target(
        &self,
        target_id: Uuid,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>> {
        self.0.find_by_target(target_id, status).await
    }
}

/// Test application context
pub struct TestApp {
    /// Vegetable and suggestion store
    pub store: MemoryStore,
    /// In-memory blob storage
    pub blobs: Arc<MemoryBlobs>,
    /// The service under test
    pub service: SuggestionService,
}

impl TestApp {
    /// Create a new test application over in-memory storage
    pub async fn new() -> Self {
        let blobs = Arc::new(MemoryBlobs::default());
        let (store, service) = Self::build(blobs.clone());
        Self {
            store,
            blobs,
            service,
        }
    }

    /// Create a test application with custom wiring around a fresh store
    pub fn with(
        suggestions: impl FnOnce(&MemoryStore) -> Arc<dyn SuggestionRepository>,
        config: &SuggestionConfig,
    ) -> Self {
        let store = MemoryStore::new();
        let blobs = Arc::new(MemoryBlobs::default());
        let service = SuggestionService::new(
            Arc::new(store.clone()),
            suggestions(&store),
            blobs.clone(),
            config,
            &StorageConfig::default(),
        );
        Self {
            store,
            blobs,
            service,
        }
    }

    /// Create a service over the given blob storage
    pub fn build(storage: Arc<dyn BlobStorage>) -> (MemoryStore, SuggestionService) {
        let store = MemoryStore::new();
        let service = SuggestionService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            storage,
            &SuggestionConfig::default(),
            &StorageConfig::default(),
        );
        (store, service)
    }

    /// Insert vegetables into the store
    pub async fn seed(&self, vegetables: &[&Vegetable]) {
        for vegetable in vegetables {
            self.store
                .insert_aggregate(vegetable)
                .await
                .expect("Failed to seed vegetable");
        }
    }

    /// Live aggregate of a vegetable
    pub async fn live(&self, id: Uuid) -> Vegetable {
        self.service.vegetable(id).await.expect("Vegetable exists")
    }

    /// Propose an edit and return the stored suggestion
    pub async fn propose(&self, current: &Vegetable, updated: Vegetable) -> EditSuggestion {
        let outcome = self
            .service
            .propose_edit(&contributor(), current, updated)
            .await;
        assert!(outcome.is_ok(), "Proposal failed: {:?}", outcome.error_code);
        let id = outcome.suggestion_id.expect("Suggestion id");
        self.suggestion(&id.to_string()).await
    }

    /// Approve a suggestion, asserting success
    pub async fn approve(&self, suggestion: &EditSuggestion) {
        let outcome = self
            .service
            .review_suggestion(
                &reviewer(),
                &suggestion.id.to_string(),
                verdant_entity::suggestion::ReviewDecision::Approve,
            )
            .await;
        assert_eq!(outcome.error_code, None);
        assert_eq!(outcome.status, Some(SuggestionStatus::Merged));
    }

    /// Fetch a suggestion through the service
    pub async fn suggestion(&self, id: &str) -> EditSuggestion {
        self.service
            .preview(&reviewer(), id)
            .await
            .expect("Suggestion exists")
            .suggestion
    }
}

pub fn contributor() -> RequestContext {
    RequestContext::new(Uuid::new_v4(), UserRole::Contributor)
}

pub fn reviewer() -> RequestContext {
    RequestContext::new(Uuid::new_v4(), UserRole::Reviewer)
}

/// Build a vegetable from its JSON shape
pub fn vegetable(value: Value) -> Vegetable {
    serde_json::from_value(value).expect("Valid vegetable")
}

/// A vegetable with one sourced photo and no friends
pub fn tomato() -> Vegetable {
    vegetable(json!({
        "id": Uuid::new_v4(),
        "names": ["Tomate"],
        "scientific_names": ["Solanum lycopersicum"],
        "handle": "tomate",
        "origin": "Andes",
        "photos": [{
            "id": Uuid::new_v4(),
            "label": "Fruto maduro",
            "storage_id": "seed-tomate.jpg",
            "sources": [{"id": Uuid::new_v4(), "credits": "Acervo Verdant"}]
        }]
    }))
}

/// A bare vegetable with the given handle
pub fn plain(handle: &str) -> Vegetable {
    vegetable(json!({
        "id": Uuid::new_v4(),
        "names": [handle],
        "handle": handle
    }))
}

/// Base64 of bytes starting with the PNG signature
pub fn png_base64() -> String {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R', 0, 0, 0, 1, 0, 0, 0, 1]);
    STANDARD.encode(bytes)
}

/// A photo carrying an inline payload
pub fn new_photo(label: &str, data: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "label": label,
        "data": data,
        "mime_type": "image/png",
        "file_name": format!("{label}.png")
    })
}

/// Add a photo given as JSON to an aggregate
pub fn with_photo(mut vegetable: Vegetable, photo: Value) -> Vegetable {
    vegetable
        .photos
        .push(serde_json::from_value(photo).expect("Valid photo"));
    vegetable
}
