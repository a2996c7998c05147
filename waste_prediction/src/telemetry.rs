use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to build prometheus exporter: {0}")]
    Exporter(String),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("waste_prediction");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Predictions served, by label")
            .build();

        // Preprocessing alone is a few ms, CPU inference on a 224x224 input tens of ms.
        let boundaries = latency_boundaries(&[(5, 50, 5), (50, 250, 25), (250, 1000, 250)]);

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of prediction operations in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_counter,
            prediction_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction(&self, duration_ms: u64, label: &str, low_confidence: bool) {
        let attributes = vec![
            KeyValue::new("label", label.to_string()),
            KeyValue::new("low_confidence", low_confidence),
        ];
        self.prediction_counter.add(1, &attributes);
        self.prediction_duration
            .record(duration_ms, &[KeyValue::new("label", label.to_string())]);
    }
}

/// Histogram buckets from `(start, end, step)` segments, deduplicated where
/// segments meet.
fn latency_boundaries(segments: &[(u32, u32, usize)]) -> Vec<f64> {
    let mut boundaries: Vec<u32> = segments
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step.max(1)))
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries.into_iter().map(f64::from).collect()
}
