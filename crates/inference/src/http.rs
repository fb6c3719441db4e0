//! JSON-over-HTTP inference client
//!
//! Requests carry images as base64 JPEG and tensors as base64 little-endian
//! `f32` buffers with an explicit shape. Responses are plain JSON.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use cgm_rg_common::config::InferenceConfig;
use cgm_rg_imaging::BoundingBox;
use ndarray::{Array, Array2, Array3, Array4, Dimension};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::{FaceDetection, InferenceError, InferenceService, PersonDetection};

#[derive(Serialize)]
struct ImageRequest {
    image: String,
}

#[derive(Serialize)]
struct TensorRequest {
    shape: Vec<usize>,
    data: String,
}

impl TensorRequest {
    fn new<D: Dimension>(tensor: &Array<f32, D>) -> Self {
        let mut data = Vec::with_capacity(tensor.len() * 4);
        for value in tensor.iter() {
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self {
            shape: tensor.shape().to_vec(),
            data: BASE64.encode(data),
        }
    }
}

#[derive(Deserialize)]
struct WireFace {
    bbox: [f32; 4],
    confidence: f32,
    #[serde(flatten)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct FacesResponse {
    faces: Vec<WireFace>,
}

#[derive(Deserialize)]
struct WirePerson {
    bbox: [f32; 4],
    score: f32,
}

#[derive(Deserialize)]
struct PeopleResponse {
    people: Vec<WirePerson>,
}

#[derive(Deserialize)]
struct TensorResponse {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct PredictionsResponse {
    predictions: Vec<f32>,
}

#[derive(Deserialize)]
struct LabelsResponse {
    shape: [usize; 2],
    labels: String,
}

fn to_box([x1, y1, x2, y2]: [f32; 4]) -> BoundingBox {
    BoundingBox::new(x1, y1, x2, y2)
}

/// [`InferenceService`] backed by per-service HTTP endpoints
#[derive(Debug, Clone)]
pub struct HttpInference {
    client: Client,
    endpoints: HashMap<String, String>,
    retry: RetryPolicy,
}

impl HttpInference {
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn endpoint(&self, service: &str) -> Result<&str, InferenceError> {
        self.endpoints
            .get(service)
            .map(String::as_str)
            .ok_or_else(|| InferenceError::UnknownService(service.to_string()))
    }

    async fn call<Req, Resp>(&self, service: &str, body: &Req) -> Result<Resp, InferenceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(service)?;
        self.retry
            .run(service, || async move {
                debug!("POST {} ({})", url, service);
                let response = self.client.post(url).json(body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(InferenceError::Status {
                        service: service.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                let text = response.text().await?;
                serde_json::from_str(&text)
                    .map_err(|e| InferenceError::malformed(service, e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl InferenceService for HttpInference {
    async fn detect_faces(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<FaceDetection>, InferenceError> {
        let request = ImageRequest {
            image: BASE64.encode(&image),
        };
        let response: FacesResponse = self.call(service, &request).await?;
        Ok(response
            .faces
            .into_iter()
            .map(|face| FaceDetection {
                bbox: to_box(face.bbox),
                confidence: face.confidence,
                attributes: face.attributes,
            })
            .collect())
    }

    async fn detect_people(
        &self,
        service: &str,
        image: Bytes,
    ) -> Result<Vec<PersonDetection>, InferenceError> {
        let request = ImageRequest {
            image: BASE64.encode(&image),
        };
        let response: PeopleResponse = self.call(service, &request).await?;
        Ok(response
            .people
            .into_iter()
            .map(|person| PersonDetection {
                bbox: to_box(person.bbox),
                score: person.score,
            })
            .collect())
    }

    async fn keypoint_heatmaps(
        &self,
        service: &str,
        input: Array4<f32>,
    ) -> Result<Array3<f32>, InferenceError> {
        let response: TensorResponse = self.call(service, &TensorRequest::new(&input)).await?;
        let shape = match response.shape.as_slice() {
            [joints, h, w] | [1, joints, h, w] => (*joints, *h, *w),
            other => {
                return Err(InferenceError::malformed(
                    service,
                    format!("expected heatmaps of rank 3, got shape {other:?}"),
                ))
            }
        };
        Array3::from_shape_vec(shape, response.data)
            .map_err(|e| InferenceError::malformed(service, e.to_string()))
    }

    async fn classify_standing_laying(
        &self,
        service: &str,
        batch: Array4<f32>,
    ) -> Result<Vec<f32>, InferenceError> {
        self.regress(service, batch).await
    }

    async fn regress(&self, service: &str, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let expected = batch.dim().0;
        let response: PredictionsResponse = self.call(service, &TensorRequest::new(&batch)).await?;
        if response.predictions.len() != expected {
            return Err(InferenceError::malformed(
                service,
                format!(
                    "{} predictions for a batch of {}",
                    response.predictions.len(),
                    expected
                ),
            ));
        }
        Ok(response.predictions)
    }

    async fn segment_depth(
        &self,
        service: &str,
        depth: Array2<f32>,
    ) -> Result<Array2<u8>, InferenceError> {
        let expected = depth.dim();
        let response: LabelsResponse = self.call(service, &TensorRequest::new(&depth)).await?;
        let [w, h] = response.shape;
        if (w, h) != expected {
            return Err(InferenceError::malformed(
                service,
                format!("label map {:?} does not match depth {:?}", (w, h), expected),
            ));
        }
        let labels = BASE64
            .decode(response.labels.as_bytes())
            .map_err(|e| InferenceError::malformed(service, e.to_string()))?;
        Array2::from_shape_vec((w, h), labels)
            .map_err(|e| InferenceError::malformed(service, e.to_string()))
    }
}
