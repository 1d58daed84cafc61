//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Analysis runs by terminal state.
pub static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "paperwatch_runs_total",
        "Analysis runs by terminal state",
        &["state"]
    )
    .unwrap()
});

/// Triggers refused because the document was recently processed.
pub static DUPLICATE_TRIGGERS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paperwatch_duplicate_triggers_total",
        "Triggers dropped by de-duplication"
    )
    .unwrap()
});

/// Characters streamed back from the model.
pub static GENERATED_CHARS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paperwatch_generated_chars_total",
        "Characters of analysis generated"
    )
    .unwrap()
});

/// Model discovery calls made against the backend.
pub static MODEL_DISCOVERIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paperwatch_model_discoveries_total",
        "Model list requests sent to the backend"
    )
    .unwrap()
});

/// Paths with a live debounce timer.
pub static PENDING_EVENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "paperwatch_pending_events",
        "Paths waiting for their debounce timer"
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*RUNS_TOTAL;
    let _ = &*DUPLICATE_TRIGGERS;
    let _ = &*GENERATED_CHARS;
    let _ = &*MODEL_DISCOVERIES;
    let _ = &*PENDING_EVENTS;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render the default registry in the text exposition format.
#[must_use]
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();

        PENDING_EVENTS.set(3);
        assert_eq!(PENDING_EVENTS.get(), 3);

        let before = RUNS_TOTAL.with_label_values(&["done"]).get();
        RUNS_TOTAL.with_label_values(&["done"]).inc();
        assert_eq!(RUNS_TOTAL.with_label_values(&["done"]).get(), before + 1);
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        init_metrics();
        MODEL_DISCOVERIES.inc();

        let text = render();
        assert!(text.contains("paperwatch_model_discoveries_total"));
    }
}
