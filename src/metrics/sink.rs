use crate::error::SinkError;
use crate::events::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Where ingested samples are published: namespace, metric name, unit and dimensions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricIdentity {
    pub namespace: String,
    pub name: String,
    pub unit: String,
    pub dimensions: BTreeMap<String, String>,
}

impl Default for MetricIdentity {
    fn default() -> Self {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("service".to_string(), "byra".to_string());
        Self {
            namespace: "elva-labs".to_string(),
            name: "beerWeight".to_string(),
            unit: "Count".to_string(),
            dimensions,
        }
    }
}

impl MetricIdentity {
    /// Build the data point for one sample value
    pub fn datum(&self, value: f64, timestamp: Timestamp) -> MetricDatum {
        MetricDatum {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
            dimensions: self.dimensions.clone(),
            value,
            timestamp,
        }
    }
}

/// One metric data point as handed to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub namespace: String,
    pub name: String,
    pub unit: String,
    pub dimensions: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: Timestamp,
}

/// Write-only destination for metric data points
pub trait MetricsSink: Send + Sync {
    fn emit<'a>(
        &'a self,
        datum: &'a MetricDatum,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

/// Sink writing CloudWatch Embedded Metric Format records, one JSON per line
///
/// The log pipeline of the host (e.g. CloudWatch Logs reading stdout) turns
/// each record into a metric data point. Writes run on the blocking pool so a
/// stalled pipe or disk never holds up a runtime worker, and the caller's
/// timeout stays effective.
pub struct EmfMetricsSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EmfMetricsSink {
    /// Create a sink writing to the given writer
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Create a sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Encode a datum as an EMF record
    pub fn encode(datum: &MetricDatum) -> Value {
        let dimension_keys: Vec<&str> = datum.dimensions.keys().map(String::as_str).collect();

        let mut record = Map::new();
        record.insert(
            "_aws".to_string(),
            json!({
                "Timestamp": datum.timestamp.timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": datum.namespace,
                    "Dimensions": [dimension_keys],
                    "Metrics": [{ "Name": datum.name, "Unit": datum.unit }],
                }],
            }),
        );
        for (key, value) in &datum.dimensions {
            record.insert(key.clone(), Value::String(value.clone()));
        }
        record.insert(datum.name.clone(), json!(datum.value));

        Value::Object(record)
    }
}

impl MetricsSink for EmfMetricsSink {
    fn emit<'a>(
        &'a self,
        datum: &'a MetricDatum,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let line = serde_json::to_string(&Self::encode(datum))?;
            let writer = Arc::clone(&self.writer);

            tokio::task::spawn_blocking(move || -> Result<(), SinkError> {
                let mut writer = writer.lock().map_err(|_| {
                    SinkError::EmitFailed("metric writer lock poisoned".to_string())
                })?;
                writeln!(writer, "{}", line)?;
                writer.flush()?;
                Ok(())
            })
            .await
            .map_err(|e| SinkError::EmitFailed(format!("metric writer task failed: {}", e)))?
        })
    }
}

/// Sink that discards every data point
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn emit<'a>(
        &'a self,
        _datum: &'a MetricDatum,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

/// In-memory sink for testing
///
/// Records every data point it accepts; can be configured to fail or to
/// respond slowly.
#[derive(Debug, Default)]
pub struct MockMetricsSink {
    emitted: Mutex<Vec<MetricDatum>>,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockMetricsSink {
    /// Create a sink that accepts every data point
    pub fn success() -> Self {
        Self::default()
    }

    /// Create a sink that rejects every data point
    pub fn failure() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Create a sink that waits `delay` before accepting
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Data points accepted so far
    pub fn emitted(&self) -> Vec<MetricDatum> {
        self.emitted
            .lock()
            .map(|emitted| emitted.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for MockMetricsSink {
    fn emit<'a>(
        &'a self,
        datum: &'a MetricDatum,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.should_fail {
                return Err(SinkError::EmitFailed("mock sink failure".to_string()));
            }
            if let Ok(mut emitted) = self.emitted.lock() {
                emitted.push(datum.clone());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn beer_datum() -> MetricDatum {
        MetricIdentity::default().datum(9_000.0, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    /// Writer that appends into a shared buffer
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_emf_encoding() {
        let record = EmfMetricsSink::encode(&beer_datum());

        assert_eq!(record["_aws"]["Timestamp"], json!(1_709_294_400_000i64));
        let directive = &record["_aws"]["CloudWatchMetrics"][0];
        assert_eq!(directive["Namespace"], "elva-labs");
        assert_eq!(directive["Dimensions"], json!([["service"]]));
        assert_eq!(directive["Metrics"][0]["Name"], "beerWeight");
        assert_eq!(directive["Metrics"][0]["Unit"], "Count");
        assert_eq!(record["service"], "byra");
        assert_eq!(record["beerWeight"], json!(9_000.0));
    }

    #[test]
    fn test_metric_identity_partial_override() {
        let identity: MetricIdentity = toml::from_str("namespace = \"home\"").unwrap();
        assert_eq!(identity.namespace, "home");
        assert_eq!(identity.name, "beerWeight");
        assert_eq!(identity.dimensions.get("service").map(String::as_str), Some("byra"));
    }

    #[tokio::test]
    async fn test_emf_sink_writes_one_line_per_datum() {
        let buffer = SharedBuffer::default();
        let sink = EmfMetricsSink::new(Box::new(buffer.clone()));

        sink.emit(&beer_datum()).await.unwrap();
        sink.emit(&beer_datum()).await.unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["beerWeight"], json!(9_000.0));
    }

    /// Writer that stalls on every write
    struct StalledWriter(Duration);

    impl Write for StalledWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            std::thread::sleep(self.0);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_writer_does_not_defeat_timeout() {
        let sink = EmfMetricsSink::new(Box::new(StalledWriter(Duration::from_secs(1))));
        let datum = beer_datum();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_millis(100), sink.emit(&datum)).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_mock_sink_records_and_fails() {
        let sink = MockMetricsSink::success();
        sink.emit(&beer_datum()).await.unwrap();
        assert_eq!(sink.emitted().len(), 1);

        let failing = MockMetricsSink::failure();
        assert!(failing.emit(&beer_datum()).await.is_err());
        assert!(failing.emitted().is_empty());
    }
}
