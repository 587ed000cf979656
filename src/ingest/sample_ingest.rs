//! Sample ingest
//!
//! Turns raw measurement messages into validated [`Sample`]s, stores them in
//! the shared sample window and publishes each one as a metric data point.
//!
//! Accepted payloads are JSON objects with a numeric `weight` (or `grams`, as
//! written by the scale process), an optional RFC 3339 `datetime` and an
//! optional `unit`:
//!
//! ```json
//! {"weight": 9350.5}
//! {"grams": 9350.5, "datetime": "2024-03-01T12:00:00Z"}
//! {"weight": 9.35, "unit": "kg"}
//! ```

use crate::aggregator::SampleWindow;
use crate::error::{IngestError, SinkError};
use crate::events::{Sample, Timestamp};
use crate::metrics::{MetricIdentity, MetricsSink};
use chrono::Utc;
use log::{debug, error, warn};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const GRAMS_PER_KILOGRAM: f64 = 1_000.0;
const GRAMS_PER_POUND: f64 = 453.592_37;
const GRAMS_PER_OUNCE: f64 = 28.349_523_125;

/// Raw measurement message as pushed by a reporting device
#[derive(Debug, Deserialize)]
struct WeightMessage {
    #[serde(default, alias = "grams")]
    weight: Option<f64>,
    #[serde(default)]
    datetime: Option<Timestamp>,
    #[serde(default)]
    unit: Option<String>,
}

/// Factor converting `unit` to grams
fn grams_per_unit(unit: &str) -> Result<f64, IngestError> {
    match unit.trim().to_lowercase().as_str() {
        "g" | "gram" | "grams" => Ok(1.0),
        "kg" | "kilogram" | "kilograms" => Ok(GRAMS_PER_KILOGRAM),
        "lb" | "lbs" | "pound" | "pounds" => Ok(GRAMS_PER_POUND),
        "oz" | "ounce" | "ounces" => Ok(GRAMS_PER_OUNCE),
        other => Err(IngestError::UnknownUnit(other.to_string())),
    }
}

/// Entry point for measurement messages
///
/// Cheap to clone; every clone shares the same window and sink, so one
/// instance can be handed to each connection task.
#[derive(Clone)]
pub struct SampleIngest {
    window: Arc<Mutex<SampleWindow>>,
    sink: Arc<dyn MetricsSink>,
    metric: Arc<MetricIdentity>,
    emit_timeout: Duration,
}

impl SampleIngest {
    pub fn new(
        window: Arc<Mutex<SampleWindow>>,
        sink: Arc<dyn MetricsSink>,
        metric: MetricIdentity,
        emit_timeout: Duration,
    ) -> Self {
        Self {
            window,
            sink,
            metric: Arc::new(metric),
            emit_timeout,
        }
    }

    /// Validate a raw message and build a sample
    ///
    /// `received_at` is used as the timestamp when the message carries none.
    ///
    /// # Errors
    ///
    /// Returns an `IngestError` for unparseable JSON, a missing weight, a
    /// negative or non-finite weight, or an unknown unit.
    pub fn parse(raw: &str, received_at: Timestamp) -> Result<Sample, IngestError> {
        let message: WeightMessage = serde_json::from_str(raw.trim())?;
        let weight = message.weight.ok_or(IngestError::MissingWeight)?;

        let factor = match message.unit.as_deref() {
            Some(unit) => grams_per_unit(unit)?,
            None => 1.0,
        };
        let grams = weight * factor;

        if !grams.is_finite() {
            return Err(IngestError::NonFiniteWeight);
        }
        if grams < 0.0 {
            return Err(IngestError::NegativeWeight(weight));
        }

        Ok(Sample::new(
            grams,
            message.datetime.unwrap_or(received_at),
        ))
    }

    /// Ingest one message received now
    pub async fn ingest(&self, raw: &str) -> Result<Sample, IngestError> {
        self.ingest_at(raw, Utc::now()).await
    }

    /// Ingest one message received at `received_at`
    ///
    /// Malformed messages are logged and rejected without touching the
    /// window. The window buckets the sample by `received_at`; the device
    /// timestamp is only carried on the published metric. A failed or
    /// timed-out metric publish is logged and dropped; the sample stays in
    /// the window either way.
    pub async fn ingest_at(&self, raw: &str, received_at: Timestamp) -> Result<Sample, IngestError> {
        let sample = match Self::parse(raw, received_at) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Dropping malformed sample {:?}: {}", raw.trim(), e);
                return Err(e);
            }
        };

        {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            window.add_sample(Sample::new(sample.value, received_at));
        }
        debug!("Accepted sample {} g at {}", sample.value, sample.timestamp);

        let datum = self.metric.datum(sample.value, sample.timestamp);
        let published = tokio::time::timeout(self.emit_timeout, self.sink.emit(&datum))
            .await
            .unwrap_or(Err(SinkError::Timeout));
        if let Err(e) = published {
            error!("Failed to publish metric {}: {}", self.metric.name, e);
        }

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MockMetricsSink;
    use chrono::TimeZone;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn window() -> Arc<Mutex<SampleWindow>> {
        Arc::new(Mutex::new(SampleWindow::new(
            chrono::Duration::minutes(5),
            chrono::Duration::minutes(15),
            100,
        )))
    }

    fn ingest_with(
        window: Arc<Mutex<SampleWindow>>,
        sink: Arc<MockMetricsSink>,
    ) -> SampleIngest {
        SampleIngest::new(
            window,
            sink,
            MetricIdentity::default(),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_parse_weight() {
        let sample = SampleIngest::parse(r#"{"weight": 9000}"#, t0()).unwrap();
        assert_eq!(sample.value, 9_000.0);
        assert_eq!(sample.timestamp, t0());
    }

    #[test]
    fn test_parse_scale_format() {
        let sample = SampleIngest::parse(
            r#"{"datetime":"2024-03-01T11:58:00Z","grams":8500.5}"#,
            t0(),
        )
        .unwrap();
        assert_eq!(sample.value, 8_500.5);
        assert_eq!(sample.timestamp, t0() - chrono::Duration::minutes(2));
    }

    #[test]
    fn test_parse_normalizes_units() {
        let kg = SampleIngest::parse(r#"{"weight": 9.5, "unit": "kg"}"#, t0()).unwrap();
        assert_eq!(kg.value, 9_500.0);

        let lb = SampleIngest::parse(r#"{"weight": 1, "unit": "LB"}"#, t0()).unwrap();
        assert!((lb.value - GRAMS_PER_POUND).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(
            SampleIngest::parse(r#"{"weight": -5}"#, t0()),
            Err(IngestError::NegativeWeight(w)) if w == -5.0
        ));
        assert!(matches!(
            SampleIngest::parse(r#"{"temperature": 4}"#, t0()),
            Err(IngestError::MissingWeight)
        ));
        assert!(matches!(
            SampleIngest::parse(r#"{"weight": null}"#, t0()),
            Err(IngestError::MissingWeight)
        ));
        assert!(matches!(
            SampleIngest::parse(r#"{"weight": "heavy"}"#, t0()),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            SampleIngest::parse("not json", t0()),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            SampleIngest::parse(r#"{"weight": 1, "unit": "stone"}"#, t0()),
            Err(IngestError::UnknownUnit(_))
        ));
        assert!(matches!(
            SampleIngest::parse(r#"{"weight": 1e308, "unit": "kg"}"#, t0()),
            Err(IngestError::NonFiniteWeight)
        ));
    }

    #[test]
    fn test_zero_weight_is_valid() {
        assert_eq!(SampleIngest::parse(r#"{"weight": 0}"#, t0()).unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_ingest_stores_and_publishes() {
        let window = window();
        let sink = Arc::new(MockMetricsSink::success());
        let ingest = ingest_with(window.clone(), sink.clone());

        ingest.ingest_at(r#"{"weight": 9000}"#, t0()).await.unwrap();

        assert_eq!(window.lock().unwrap().len(), 1);
        let emitted = sink.emitted();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].name, "beerWeight");
        assert_eq!(emitted[0].namespace, "elva-labs");
        assert_eq!(emitted[0].value, 9_000.0);
        assert_eq!(emitted[0].timestamp, t0());
    }

    #[tokio::test]
    async fn test_malformed_sample_leaves_window_untouched() {
        let window = window();
        let sink = Arc::new(MockMetricsSink::success());
        let ingest = ingest_with(window.clone(), sink.clone());

        assert!(ingest.ingest_at(r#"{"weight": -5}"#, t0()).await.is_err());
        assert!(ingest.ingest_at(r#"{}"#, t0()).await.is_err());

        assert!(window.lock().unwrap().is_empty());
        assert!(sink.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_sample() {
        let window = window();
        let ingest = ingest_with(window.clone(), Arc::new(MockMetricsSink::failure()));

        assert!(ingest.ingest_at(r#"{"weight": 9000}"#, t0()).await.is_ok());
        assert_eq!(window.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_sink_is_bounded_by_timeout() {
        let window = window();
        let sink = Arc::new(MockMetricsSink::slow(Duration::from_secs(5)));
        let ingest = ingest_with(window.clone(), sink.clone());

        let started = std::time::Instant::now();
        assert!(ingest.ingest_at(r#"{"weight": 9000}"#, t0()).await.is_ok());

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(sink.emitted().is_empty());
        assert_eq!(window.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_late_stamped_sample_is_counted_in_open_period() {
        let window = window();
        let sink = Arc::new(MockMetricsSink::success());
        let ingest = ingest_with(window.clone(), sink.clone());
        assert!(window.lock().unwrap().close_period(t0()).is_empty());

        // Device clock one second behind, delivered two minutes after the tick
        let raw = r#"{"grams": 5000, "datetime": "2024-03-01T11:59:59Z"}"#;
        ingest
            .ingest_at(raw, t0() + chrono::Duration::minutes(2))
            .await
            .unwrap();

        let values = window
            .lock()
            .unwrap()
            .close_period(t0() + chrono::Duration::minutes(5));
        assert_eq!(values, vec![5_000.0]);
        assert_eq!(sink.emitted()[0].timestamp, t0() - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_concurrent_ingest_serializes_window_writes() {
        let window = window();
        let ingest = ingest_with(window.clone(), Arc::new(MockMetricsSink::success()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let ingest = ingest.clone();
                tokio::spawn(async move {
                    let raw = format!(r#"{{"weight": {}}}"#, 9_000 + i);
                    ingest.ingest_at(&raw, t0()).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(window.lock().unwrap().len(), 20);
    }
}
