use crate::{
    error::{ApiError, ByteLimit},
    model_service::ModelService,
    prediction::Prediction,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use std::time::Instant;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";

struct ImageUpload {
    file_name: String,
    data: Bytes,
}

/// Pulls the `image` part out of the form. The size limit is enforced while
/// streaming, so an oversized upload is rejected before anything decodes it.
async fn read_image_field(
    multipart: &mut Multipart,
    limit: ByteLimit,
) -> Result<ImageUpload, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, limit))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // A part without `filename=` is a plain form value, not a file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file_name.is_empty() {
            return Err(ApiError::NoFileSelected);
        }

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::from_multipart(e, limit))?
        {
            if data.len() + chunk.len() > limit.0 {
                return Err(ApiError::FileTooLarge(limit));
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(ApiError::EmptyImage);
        }

        return Ok(ImageUpload {
            file_name,
            data: Bytes::from(data),
        });
    }

    Err(ApiError::MissingImage)
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    state.metrics.record_request("/predict");

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Request is not a multipart upload: {}", e);
        ApiError::MissingImage
    })?;

    let upload = read_image_field(&mut multipart, ByteLimit(state.max_upload_bytes)).await?;
    tracing::info!(
        "Processing: {} ({} bytes)",
        upload.file_name,
        upload.data.len()
    );

    let started = Instant::now();
    let prediction = state.classifier.predict(upload.data).await?;
    state.metrics.record_prediction(
        started.elapsed().as_millis() as u64,
        &prediction.label,
        prediction.all_probabilities.is_some(),
    );

    Ok(Json(prediction))
}
