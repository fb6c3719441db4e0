//! Concurrent artifact downloads

use bytes::Bytes;
use cgm_rg_common::{Artifact, ScanVersion};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::xor_stream;
use crate::{ApiError, ScanApi};

/// Downloads artifact payloads, one concurrent request per artifact
pub struct ArtifactFetcher {
    api: Arc<dyn ScanApi>,
    decryption_key: Option<Vec<u8>>,
}

impl ArtifactFetcher {
    #[must_use]
    pub fn new(api: Arc<dyn ScanApi>, decryption_key: Option<String>) -> Self {
        Self {
            api,
            decryption_key: decryption_key.map(String::into_bytes),
        }
    }

    /// Fill `raw_file` on every artifact.
    ///
    /// A failed download is retried once before the error propagates. Payloads
    /// of encrypted scan versions are decrypted before being stored.
    ///
    /// # Errors
    /// Returns the second failure of any artifact, or
    /// [`ApiError::MissingDecryptionKey`] if the version is encrypted and no
    /// key is configured.
    pub async fn fetch_all(
        &self,
        artifacts: &mut [Artifact],
        version: &ScanVersion,
    ) -> Result<(), ApiError> {
        let key = if version.is_encrypted() {
            Some(
                self.decryption_key
                    .as_deref()
                    .ok_or_else(|| ApiError::MissingDecryptionKey(version.as_str().to_string()))?,
            )
        } else {
            None
        };

        try_join_all(artifacts.iter_mut().map(|artifact| async move {
            let payload = self.download(&artifact.file).await?;
            artifact.raw_file = Some(match key {
                Some(key) => Bytes::from(xor_stream(&payload, key)),
                None => payload,
            });
            Ok::<_, ApiError>(())
        }))
        .await?;
        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, ApiError> {
        debug!("Downloading file {}", file_id);
        match self.api.get_file(file_id).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!("Download of file {} failed, retrying once: {}", file_id, e);
                self.api.get_file(file_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cgm_rg_common::{ResultRecord, ScanMetadata, Workflow};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves files from a map and fails the first `failures` requests per file
    struct FlakyFiles {
        files: HashMap<String, Bytes>,
        failures: usize,
        attempts: Mutex<HashMap<String, usize>>,
    }

    impl FlakyFiles {
        fn new(failures: usize) -> Self {
            let files = [("f1", &b"first"[..]), ("f2", &b"second"[..])]
                .into_iter()
                .map(|(id, data)| (id.to_string(), Bytes::from_static(data)))
                .collect();
            Self {
                files,
                failures,
                attempts: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ScanApi for FlakyFiles {
        async fn get_scan_metadata(&self, scan_id: &str) -> Result<ScanMetadata, ApiError> {
            Err(ApiError::NotFound(scan_id.to_string()))
        }

        async fn get_workflows(&self) -> Result<Vec<Workflow>, ApiError> {
            Ok(Vec::new())
        }

        async fn get_file(&self, file_id: &str) -> Result<Bytes, ApiError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let count = attempts.entry(file_id.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            if attempt <= self.failures {
                return Err(ApiError::Status {
                    method: "GET",
                    url: file_id.to_string(),
                    status: 503,
                    body: String::new(),
                });
            }
            self.files
                .get(file_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(file_id.to_string()))
        }

        async fn post_file(&self, _data: Bytes, _mime_type: &str) -> Result<String, ApiError> {
            Ok("posted".to_string())
        }

        async fn post_results(&self, _results: &[ResultRecord]) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn artifact(id: &str, file: &str) -> Artifact {
        Artifact {
            id: id.to_string(),
            format: "rgb".to_string(),
            file: file.to_string(),
            order: None,
            scan_id: "scan-1".to_string(),
            raw_file: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_fills_payloads() {
        let fetcher = ArtifactFetcher::new(Arc::new(FlakyFiles::new(0)), None);
        let mut artifacts = vec![artifact("a1", "f1"), artifact("a2", "f2")];
        fetcher
            .fetch_all(&mut artifacts, &ScanVersion("v1.0".into()))
            .await
            .unwrap();
        assert_eq!(artifacts[0].raw_file.as_deref(), Some(&b"first"[..]));
        assert_eq!(artifacts[1].raw_file.as_deref(), Some(&b"second"[..]));
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let api = Arc::new(FlakyFiles::new(1));
        let fetcher = ArtifactFetcher::new(api.clone(), None);
        let mut artifacts = vec![artifact("a1", "f1")];
        fetcher
            .fetch_all(&mut artifacts, &ScanVersion("v1.0".into()))
            .await
            .unwrap();
        assert!(artifacts[0].raw_file.is_some());
        assert_eq!(api.attempts.lock().unwrap()["f1"], 2);
    }

    #[tokio::test]
    async fn test_second_failure_propagates() {
        let fetcher = ArtifactFetcher::new(Arc::new(FlakyFiles::new(2)), None);
        let mut artifacts = vec![artifact("a1", "f1")];
        let err = fetcher
            .fetch_all(&mut artifacts, &ScanVersion("v1.0".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_encrypted_versions_are_decrypted() {
        let key = "k3y";
        let mut api = FlakyFiles::new(0);
        api.files.insert(
            "enc".to_string(),
            Bytes::from(xor_stream(b"plain depth", key.as_bytes())),
        );
        let fetcher = ArtifactFetcher::new(Arc::new(api), Some(key.to_string()));
        let mut artifacts = vec![artifact("a1", "enc")];
        fetcher
            .fetch_all(&mut artifacts, &ScanVersion("v3.0.1".into()))
            .await
            .unwrap();
        assert_eq!(artifacts[0].raw_file.as_deref(), Some(&b"plain depth"[..]));
    }

    #[tokio::test]
    async fn test_encrypted_without_key_fails() {
        let fetcher = ArtifactFetcher::new(Arc::new(FlakyFiles::new(0)), None);
        let mut artifacts = vec![artifact("a1", "f1")];
        let err = fetcher
            .fetch_all(&mut artifacts, &ScanVersion("ir-2.0".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingDecryptionKey(_)));
    }
}
