//! Fixed-size batching for batched models

use ndarray::{Array3, Array4, ArrayView3, Axis};
use std::future::Future;

use crate::InferenceError;

/// Stack `items` into `(n, h, w, c)` batches of at most `batch_size` and
/// collect one prediction per item, in input order.
///
/// # Errors
/// Fails on mismatched item shapes, on any failed call, or when a call returns
/// a prediction count different from its batch size.
pub async fn predict_in_batches<F, Fut>(
    items: &[Array3<f32>],
    batch_size: usize,
    mut predict: F,
) -> Result<Vec<f32>, InferenceError>
where
    F: FnMut(Array4<f32>) -> Fut,
    Fut: Future<Output = Result<Vec<f32>, InferenceError>>,
{
    let mut predictions = Vec::with_capacity(items.len());
    for chunk in items.chunks(batch_size.max(1)) {
        let views: Vec<ArrayView3<'_, f32>> = chunk.iter().map(Array3::view).collect();
        let batch = ndarray::stack(Axis(0), &views)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))?;
        let output = predict(batch).await?;
        if output.len() != chunk.len() {
            return Err(InferenceError::InvalidInput(format!(
                "{} predictions for a batch of {}",
                output.len(),
                chunk.len()
            )));
        }
        predictions.extend(output);
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_chunks_preserve_order() {
        let items: Vec<Array3<f32>> = (0..20)
            .map(|i| Array3::from_elem((2, 2, 1), i as f32))
            .collect();
        let sizes = Mutex::new(Vec::new());
        let predictions = predict_in_batches(&items, 9, |batch| {
            sizes.lock().unwrap().push(batch.dim().0);
            let values: Vec<f32> = batch.outer_iter().map(|item| item[[0, 0, 0]]).collect();
            async move { Ok(values) }
        })
        .await
        .unwrap();

        assert_eq!(*sizes.lock().unwrap(), vec![9, 9, 2]);
        assert_eq!(predictions, (0..20).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_short_response_rejected() {
        let items = vec![Array3::<f32>::zeros((1, 1, 1)); 3];
        let err = predict_in_batches(&items, 9, |_| async { Ok(vec![0.0]) })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput(_)));
    }
}
