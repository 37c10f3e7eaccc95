//! Image materialization before a suggestion is stored.
//!
//! Contributors submit new photos inline as base64. Before the diff is
//! persisted every inline payload reached through an ADD is uploaded to blob
//! storage and replaced by its storage id, then the diff is recomputed so it
//! never carries image bytes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use verdant_changeset::{IdentityKeys, added_values, diff};
use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_core::traits::{BlobStorage, StoredBlob};
use verdant_entity::changeset::ChangeOperation;

/// Fields of a photo carrying an inline payload.
const PAYLOAD_FIELDS: &[&str] = &["data", "mime_type", "file_name"];

/// An inline photo found in the post-state.
#[derive(Debug, Clone, PartialEq)]
struct PendingImage {
    photo_id: String,
    data: String,
    mime_type: String,
}

/// Outcome of the pre-pass.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// Post-state with every payload replaced or removed.
    pub post_state: Value,
    /// Diff from the pre-state to `post_state`.
    pub diff: Vec<ChangeOperation>,
    /// Blobs uploaded, keyed by photo id.
    pub uploaded: HashMap<String, StoredBlob>,
    /// Photos dropped because their image could not be stored.
    pub dropped: Vec<String>,
}

/// Uploads inline images with bounded concurrency.
#[derive(Clone)]
pub struct ImageMaterializer {
    storage: Arc<dyn BlobStorage>,
    concurrency: usize,
    max_image_bytes: u64,
}

impl std::fmt::Debug for ImageMaterializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageMaterializer")
            .field("provider", &self.storage.provider_type())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ImageMaterializer {
    /// Creates a materializer uploading at most `concurrency` images at once.
    pub fn new(storage: Arc<dyn BlobStorage>, concurrency: usize, max_image_bytes: u64) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
            max_image_bytes,
        }
    }

    /// Diff `before` against `after`, upload the new images the diff adds,
    /// and return the rewritten post-state with its final diff.
    pub async fn materialize(
        &self,
        before: &Value,
        mut after: Value,
        keys: &IdentityKeys,
    ) -> AppResult<Materialized> {
        let first_pass = diff(before, &after, keys);
        let pending = pending_images(&first_pass);

        let uploaded = self.upload_all(pending).await;

        let stored_before = stored_ids(before);
        let mut dropped = Vec::new();
        rewrite(&mut after, &uploaded, &stored_before, &mut dropped);
        for photo_id in &dropped {
            warn!(photo_id = %photo_id, "Dropped photo whose image could not be stored");
        }

        let final_diff = diff(before, &after, keys);
        if !uploaded.is_empty() || !dropped.is_empty() {
            info!(
                uploaded = uploaded.len(),
                dropped = dropped.len(),
                "Materialized inline images"
            );
        }

        Ok(Materialized {
            post_state: after,
            diff: final_diff,
            uploaded,
            dropped,
        })
    }

    /// Delete blobs uploaded for a submission that was not stored.
    ///
    /// Failures are logged and left for the storage provider to reclaim.
    pub async fn discard(&self, uploaded: &HashMap<String, StoredBlob>) {
        let deletions = uploaded.iter().map(|(photo_id, blob)| async move {
            if let Err(e) = self.storage.delete(&blob.storage_id).await {
                warn!(
                    photo_id = %photo_id,
                    storage_id = %blob.storage_id,
                    error = %e,
                    "Failed to delete orphaned image"
                );
            }
        });
        join_all(deletions).await;

        if !uploaded.is_empty() {
            info!(discarded = uploaded.len(), "Discarded images of a refused submission");
        }
    }

    async fn upload_all(&self, pending: Vec<PendingImage>) -> HashMap<String, StoredBlob> {
        let limiter = Arc::new(Semaphore::new(self.concurrency));

        let tasks = pending.into_iter().map(|image| {
            let limiter = Arc::clone(&limiter);
            async move {
                let result = match limiter.acquire().await {
                    Ok(_permit) => self.upload_one(&image).await,
                    Err(_) => Err(AppError::upload("Upload limiter closed")),
                };
                (image.photo_id, result)
            }
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|(photo_id, result)| match result {
                Ok(blob) => Some((photo_id, blob)),
                Err(e) => {
                    warn!(photo_id = %photo_id, error = %e, "Image upload failed");
                    None
                }
            })
            .collect()
    }

    async fn upload_one(&self, image: &PendingImage) -> AppResult<StoredBlob> {
        let bytes = decode_payload(&image.data)?;
        if bytes.len() as u64 > self.max_image_bytes {
            return Err(AppError::upload(format!(
                "Image of photo {} exceeds {} bytes",
                image.photo_id, self.max_image_bytes
            )));
        }

        let format = image::guess_format(&bytes).map_err(|e| {
            AppError::with_source(
                ErrorKind::Upload,
                format!("Payload of photo {} is not an image", image.photo_id),
                e,
            )
        })?;
        let mime_type = format.to_mime_type();
        if mime_type != image.mime_type {
            warn!(
                photo_id = %image.photo_id,
                declared = %image.mime_type,
                detected = mime_type,
                "Declared image type does not match content"
            );
        }

        self.storage
            .upload(Bytes::from(bytes), mime_type)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Upload,
                    format!("Failed to store image of photo {}", image.photo_id),
                    e,
                )
            })
    }
}

/// Decode a base64 payload, accepting an optional `data:<mime>;base64,` prefix.
fn decode_payload(data: &str) -> AppResult<Vec<u8>> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Inline photos reached through an ADD, including photos nested inside
/// added varieties.
fn pending_images(ops: &[ChangeOperation]) -> Vec<PendingImage> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for added in added_values(ops) {
        if added.is_member_of("photos") {
            collect_photo(added.value, &mut seen, &mut out);
        }
        collect_nested(added.value, &mut seen, &mut out);
    }
    out
}

fn collect_nested(value: &Value, seen: &mut HashSet<String>, out: &mut Vec<PendingImage>) {
    let Value::Object(fields) = value else {
        return;
    };
    for (field, child) in fields {
        match child {
            Value::Array(items) if field == "photos" => {
                for photo in items {
                    collect_photo(photo, seen, out);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| collect_nested(item, seen, out)),
            Value::Object(_) => collect_nested(child, seen, out),
            _ => {}
        }
    }
}

fn collect_photo(photo: &Value, seen: &mut HashSet<String>, out: &mut Vec<PendingImage>) {
    let (Some(id), Some(data)) = (
        photo.get("id").and_then(Value::as_str),
        photo.get("data").and_then(Value::as_str),
    ) else {
        return;
    };
    if seen.insert(id.to_string()) {
        out.push(PendingImage {
            photo_id: id.to_string(),
            data: data.to_string(),
            mime_type: photo
                .get("mime_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
}

/// Storage ids of every photo in a state, keyed by photo id.
fn stored_ids(state: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    visit_photos(state, &mut |photo| {
        if let (Some(id), Some(storage_id)) = (
            photo.get("id").and_then(Value::as_str),
            photo.get("storage_id").and_then(Value::as_str),
        ) {
            out.insert(id.to_string(), storage_id.to_string());
        }
    });
    out
}

fn visit_photos(value: &Value, f: &mut dyn FnMut(&Map<String, Value>)) {
    let Value::Object(fields) = value else {
        return;
    };
    for (field, child) in fields {
        match child {
            Value::Array(items) => {
                for item in items {
                    if field == "photos" {
                        if let Value::Object(photo) = item {
                            f(photo);
                        }
                    }
                    visit_photos(item, f);
                }
            }
            Value::Object(_) => visit_photos(child, f),
            _ => {}
        }
    }
}

/// Replace uploaded payloads with their storage id. A leftover payload on a
/// photo that already had an image restores that image; a leftover payload
/// on a new photo drops the photo.
fn rewrite(
    value: &mut Value,
    uploaded: &HashMap<String, StoredBlob>,
    stored_before: &HashMap<String, String>,
    dropped: &mut Vec<String>,
) {
    let Value::Object(fields) = value else {
        return;
    };
    for (field, child) in fields.iter_mut() {
        match child {
            Value::Array(items) if field == "photos" => {
                items.retain_mut(|photo| {
                    let keep = rewrite_photo(photo, uploaded, stored_before, dropped);
                    if keep {
                        rewrite(photo, uploaded, stored_before, dropped);
                    }
                    keep
                });
            }
            Value::Array(items) => {
                for item in items {
                    rewrite(item, uploaded, stored_before, dropped);
                }
            }
            Value::Object(_) => rewrite(child, uploaded, stored_before, dropped),
            _ => {}
        }
    }
}

fn rewrite_photo(
    photo: &mut Value,
    uploaded: &HashMap<String, StoredBlob>,
    stored_before: &HashMap<String, String>,
    dropped: &mut Vec<String>,
) -> bool {
    let Value::Object(fields) = photo else {
        return true;
    };
    if !fields.contains_key("data") {
        return true;
    }
    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let storage_id = match (uploaded.get(&id), stored_before.get(&id)) {
        (Some(blob), _) => blob.storage_id.clone(),
        (None, Some(previous)) => {
            warn!(
                photo_id = %id,
                storage_id = %previous,
                "Image replacement on an existing photo ignored, keeping the stored image"
            );
            previous.clone()
        }
        (None, None) => {
            dropped.push(id);
            return false;
        }
    };

    for field in PAYLOAD_FIELDS {
        fields.remove(*field);
    }
    fields.insert("storage_id".to_string(), Value::String(storage_id));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_accepts_data_urls() {
        assert_eq!(decode_payload("aGk=").unwrap(), b"hi");
        assert_eq!(decode_payload("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(decode_payload("not base64!").is_err());
    }

    #[test]
    fn test_pending_images_include_photos_of_added_varieties() {
        let before = json!({"photos": [], "varieties": []});
        let after = json!({
            "photos": [{"id": "p1", "data": "AA==", "mime_type": "image/png"}],
            "varieties": [{"id": "v1", "names": ["Roxa"], "photos": [
                {"id": "p2", "data": "AA==", "mime_type": "image/jpeg"}
            ]}]
        });
        let ops = diff(&before, &after, &IdentityKeys::default());
        let ids: Vec<String> = pending_images(&ops).into_iter().map(|p| p.photo_id).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn test_rewrite_restores_or_drops_leftovers() {
        let mut state = json!({"photos": [
            {"id": "old", "data": "AA==", "mime_type": "image/png"},
            {"id": "failed", "data": "AA==", "mime_type": "image/png"},
            {"id": "kept", "storage_id": "s-kept"}
        ]});
        let stored_before = HashMap::from([("old".to_string(), "s-old".to_string())]);
        let mut dropped = Vec::new();
        rewrite(&mut state, &HashMap::new(), &stored_before, &mut dropped);

        assert_eq!(dropped, vec!["failed"]);
        assert_eq!(
            state,
            json!({"photos": [
                {"id": "old", "storage_id": "s-old"},
                {"id": "kept", "storage_id": "s-kept"}
            ]})
        );
    }
}
