// src/blob.rs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ExamError;

/// Blob storage that rendered certificates are uploaded to. The
/// production implementation lives in the surrounding application
/// (object storage, CDN-backed bucket, ...); the engine only needs a
/// public URL back.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, ExamError>;
}

/// In-process blob store for tests and demos. Uploaded objects are kept
/// in a map keyed by path and addressed with a `memory://` URL.
#[derive(Default)]
pub struct MemoryBlobStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(path).cloned()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        _content_type: &str,
    ) -> Result<String, ExamError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| ExamError::TransientIo("blob store mutex poisoned".to_string()))?;
        objects.insert(path.to_string(), bytes);
        Ok(format!("memory://{}", path))
    }
}
