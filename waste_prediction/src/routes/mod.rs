mod health;
mod metrics;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

use health::{connectivity, healthcheck};
use metrics::metrics_handler;
use predict::predict;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/predict", post(predict::<M>))
        .route("/health", get(healthcheck::<M>))
        .route("/test", get(connectivity))
        .route("/metrics", get(metrics_handler::<M>))
}

#[cfg(test)]
mod tests {
    use super::{health::HealthStatus, *};
    use crate::{
        classifier::{Classifier, ClassifierSettings},
        error::ErrorBody,
        prediction::Prediction,
        preprocessing::Preprocessor,
        server::build_router,
        telemetry::Metrics,
        test_support::{png_bytes, waste_labels, CallCounter, MockModelService},
    };
    use axum::{
        body::{to_bytes, Body, Bytes},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "waste-test-boundary";
    const ORIGIN: &str = "https://www.recycl-ai.com";

    fn router_with(mock_model: MockModelService, max_upload_bytes: usize) -> (Router, CallCounter) {
        let calls = mock_model.calls();
        let classifier = Classifier::new(
            mock_model,
            waste_labels(),
            Preprocessor::new(&Default::default()),
            ClassifierSettings::default(),
        )
        .unwrap();
        let state = SharedState::new(
            Arc::new(classifier),
            Arc::new(Metrics::new().unwrap()),
            max_upload_bytes,
        );
        (build_router(state, ORIGIN).unwrap(), calls)
    }

    fn router(scores: Vec<f32>) -> (Router, CallCounter) {
        router_with(MockModelService::with_scores(scores), 10 * 1024 * 1024)
    }

    fn multipart_body(field: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
        let disposition = match file_name {
            Some(name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
        };
        let mut body = format!("--{}\r\n{}", BOUNDARY, disposition).into_bytes();
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn predict_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn error_message(response: Response) -> String {
        let body: ErrorBody = serde_json::from_slice(&body_bytes(response).await).unwrap();
        body.error
    }

    #[tokio::test]
    async fn test_predict_returns_label_and_confidence() {
        let (app, calls) = router(vec![0.02, 0.03, 0.9, 0.03, 0.02]);

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("banana.png"),
                &png_bytes(64, 48),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["label"], "Organic");
        assert!(json.get("all_probabilities").is_none());
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_includes_all_probabilities() {
        let (app, _) = router(vec![0.1, 0.2, 0.42, 0.18, 0.1]);

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("peel.png"),
                &png_bytes(500, 375),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let prediction: Prediction = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(prediction.label, "Organic");
        assert!((prediction.confidence - 0.42).abs() < 1e-6);
        let probabilities = prediction.all_probabilities.unwrap();
        assert_eq!(probabilities.len(), 5);
        let sum: f32 = probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_missing_image_field_is_rejected_without_inference() {
        let (app, calls) = router(vec![0.2; 5]);

        let response = app
            .oneshot(predict_request(multipart_body(
                "photo",
                Some("banana.png"),
                &png_bytes(8, 8),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "No image file provided");
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_rejected() {
        let (app, calls) = router(vec![0.2; 5]);

        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "No image file provided");
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn test_empty_filename_is_rejected() {
        let (app, calls) = router(vec![0.2; 5]);

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some(""),
                &png_bytes(8, 8),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "No file selected");
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn test_image_form_value_without_filename_is_not_a_file() {
        let (app, calls) = router(vec![0.2; 5]);

        let response = app
            .oneshot(predict_request(multipart_body("image", None, &png_bytes(8, 8))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "No image file provided");
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let (app, _) = router(vec![0.2; 5]);

        let response = app
            .oneshot(predict_request(multipart_body("image", Some("a.png"), b"")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_message(response).await, "Empty image file");
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected_before_decoding() {
        let (app, calls) = router_with(MockModelService::with_scores(vec![0.2; 5]), 1024);

        // Not an image: a decode attempt would answer 500 instead.
        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("huge.bin"),
                &vec![0u8; 4096],
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_message(response).await,
            "File too large (max 1024 bytes)"
        );
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_a_generic_500_and_service_recovers() {
        let (app, calls) = router(vec![0.02, 0.03, 0.9, 0.03, 0.02]);

        let response = app
            .clone()
            .oneshot(predict_request(multipart_body(
                "image",
                Some("broken.jpg"),
                b"\xff\xd8\xff\xe0 truncated jpeg",
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_message(response).await, "Failed to process image");
        assert_eq!(calls.count(), 0);

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("ok.png"),
                &png_bytes(32, 32),
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_same_image_twice_gives_same_answer() {
        let (app, _) = router(vec![0.1, 0.6, 0.1, 0.1, 0.1]);
        let image = png_bytes(200, 100);

        let mut answers = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(predict_request(multipart_body(
                    "image",
                    Some("bag.png"),
                    &image,
                )))
                .await
                .unwrap();
            let prediction: Prediction =
                serde_json::from_slice(&body_bytes(response).await).unwrap();
            answers.push(prediction);
        }

        assert_eq!(answers[0], answers[1]);
        assert_eq!(answers[0].label, "NonRecyclable");
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let (app, _) = router(vec![0.2; 5]);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthStatus = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.model_loaded);
    }

    #[tokio::test]
    async fn test_degraded_service_refuses_predictions() {
        let classifier: Classifier<MockModelService> = Classifier::unavailable(
            "Model file not found",
            waste_labels(),
            Preprocessor::new(&Default::default()),
            ClassifierSettings::default(),
        );
        let state = SharedState::new(
            Arc::new(classifier),
            Arc::new(Metrics::new().unwrap()),
            10 * 1024 * 1024,
        );
        let app = build_router(state, ORIGIN).unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health: HealthStatus = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "degraded");
        assert!(!health.model_loaded);

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("a.png"),
                &png_bytes(8, 8),
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_message(response).await, "Model not loaded");
    }

    #[tokio::test]
    async fn test_connectivity_probe() {
        let (app, _) = router(vec![0.2; 5]);

        let response = app
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["message"], "API is working!");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_only() {
        let (app, _) = router(vec![0.2; 5]);

        let allowed = app
            .clone()
            .oneshot(
                Request::get("/test")
                    .header(header::ORIGIN, ORIGIN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            ORIGIN
        );
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );

        let other = app
            .oneshot(
                Request::get("/test")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(other
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = router(vec![0.2; 5]);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
