mod classifier;
mod error;
mod labels;
mod model_service;
mod ort_service;
mod prediction;
mod preprocessing;
mod routes;
mod server;
mod telemetry;

#[cfg(test)]
mod test_support;

pub mod app;
pub mod config;

pub use app::start_app;
