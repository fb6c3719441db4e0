//! Request ceilings applied in front of an [`InferenceService`]
//!
//! Pose calls (person detection and keypoints) share a semaphore; face
//! detection requests are spaced so no more than the configured number start
//! in any one second.

use async_trait::async_trait;
use bytes::Bytes;
use ndarray::{Array2, Array3, Array4};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::{FaceDetection, InferenceError, InferenceService, PersonDetection};

/// Decorator enforcing the pose concurrency ceiling and the face request rate
pub struct RateLimitedInference {
    inner: Arc<dyn InferenceService>,
    pose_permits: Semaphore,
    face_interval: Duration,
    next_face_slot: Mutex<Option<Instant>>,
}

impl RateLimitedInference {
    /// # Arguments
    ///
    /// * `max_concurrent_pose` - in-flight ceiling for pose calls (at least 1)
    /// * `face_requests_per_second` - face detection rate; non-positive disables spacing
    #[must_use]
    pub fn new(
        inner: Arc<dyn InferenceService>,
        max_concurrent_pose: usize,
        face_requests_per_second: f64,
    ) -> Self {
        let face_interval = if face_requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / face_requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            inner,
            pose_permits: Semaphore::new(max_concurrent_pose.max(1)),
            face_interval,
            next_face_slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_config(
        inner: Arc<dyn InferenceService>,
        config: &cgm_rg_common::config::InferenceConfig,
    ) -> Self {
        Self::new(
            inner,
            config.max_concurrent_pose,
            config.face_requests_per_second,
        )
    }

    /// Reserve the next face-request slot and wait for it
    async fn wait_for_face_slot(&self) {
        let slot = {
            let mut next = self.next_face_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.face_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    async fn pose_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, InferenceError> {
        self.pose_permits
            .acquire()
            .await
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }
}

#[async_trait]
impl InferenceService for RateLimitedInference {
    async fn detect_faces(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<FaceDetection>, InferenceError> {
        self.wait_for_face_slot().await;
        self.inner.detect_faces(service, image).await
    }

    async fn detect_people(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<PersonDetection>, InferenceError> {
        let _permit = self.pose_permit().await?;
        self.inner.detect_people(service, image).await
    }

    async fn keypoint_heatmaps(
        &self,
        service: &str,
        input: Array4<f32>,
    ) -> Result<Array3<f32>, InferenceError> {
        let _permit = self.pose_permit().await?;
        self.inner.keypoint_heatmaps(service, input).await
    }

    async fn classify_standing_laying(
        &self,
        service: &str,
        batch: Array4<f32>,
    ) -> Result<Vec<f32>, InferenceError> {
        self.inner.classify_standing_laying(service, batch).await
    }

    async fn regress(&self, service: &str, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.inner.regress(service, batch).await
    }

    async fn segment_depth(
        &self,
        service: &str,
        depth: Array2<f32>,
    ) -> Result<Array2<u8>, InferenceError> {
        self.inner.segment_depth(service, depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records peak concurrency of keypoint calls
    #[derive(Default)]
    struct SlowModel {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InferenceService for SlowModel {
        async fn detect_faces(
            &self,
            _service: &str,
            _image: Bytes,
        ) -> Result<Vec<FaceDetection>, InferenceError> {
            Ok(Vec::new())
        }

        async fn detect_people(
            &self,
            _service: &str,
            _image: Bytes,
        ) -> Result<Vec<PersonDetection>, InferenceError> {
            Ok(Vec::new())
        }

        async fn keypoint_heatmaps(
            &self,
            _service: &str,
            _input: Array4<f32>,
        ) -> Result<Array3<f32>, InferenceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Array3::zeros((17, 1, 1)))
        }

        async fn classify_standing_laying(
            &self,
            _service: &str,
            batch: Array4<f32>,
        ) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0; batch.dim().0])
        }

        async fn regress(
            &self,
            _service: &str,
            batch: Array4<f32>,
        ) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![0.0; batch.dim().0])
        }

        async fn segment_depth(
            &self,
            _service: &str,
            depth: Array2<f32>,
        ) -> Result<Array2<u8>, InferenceError> {
            Ok(Array2::zeros(depth.dim()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pose_concurrency_ceiling() {
        let model = Arc::new(SlowModel::default());
        let limited = Arc::new(RateLimitedInference::new(model.clone(), 4, 5.0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let limited = limited.clone();
            tasks.spawn(async move {
                limited
                    .keypoint_heatmaps("pose", Array4::zeros((1, 3, 2, 2)))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(model.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_face_requests_are_spaced() {
        let limited = RateLimitedInference::new(Arc::new(SlowModel::default()), 4, 2.0);
        let start = Instant::now();
        for _ in 0..3 {
            limited
                .detect_faces("faces", Bytes::from_static(b"jpeg"))
                .await
                .unwrap();
        }
        // First request is immediate, the next two wait 500ms each
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1000));
        assert!(waited < Duration::from_millis(1100));
    }
}
