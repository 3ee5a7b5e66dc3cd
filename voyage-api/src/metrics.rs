use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Booking operation counters, exposed at `/metrics`.
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let operations = IntCounterVec::new(
            Opts::new("voyage_booking_operations_total", "Booking operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        Ok(Self { registry, operations })
    }

    pub fn record<T, E>(&self, operation: &str, result: &Result<T, E>) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        self.operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations.with_label_values(&[operation, outcome]).get()
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
