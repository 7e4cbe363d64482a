use crate::metering_p1::structs::Snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink transport error `{0}`")]
    Transport(String),
    #[error("Unable to encode measurement `{0}`")]
    Encoding(#[from] serde_json::Error),
}

/// One row for the storage backend: a category plus tag and field maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub category: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub time: DateTime<Utc>,
}

impl Measurement {
    fn new(category: &str, metric: &str, time: DateTime<Utc>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("source".to_string(), "dsmr".to_string());
        tags.insert("metric".to_string(), metric.to_string());
        tags.insert("type".to_string(), category.to_string());

        Measurement {
            category: category.to_string(),
            tags,
            fields: BTreeMap::new(),
            time,
        }
    }

    fn field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// InfluxDB line protocol, nanosecond precision.
    pub fn to_line_protocol(&self) -> String {
        let tags: Vec<String> = self
            .tags
            .iter()
            .map(|(k, v)| format!("{}={}", escape_key(k), escape_key(v)))
            .collect();
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", escape_key(k), v))
            .collect();

        let mut line = escape_key(&self.category);
        if !tags.is_empty() {
            line.push(',');
            line.push_str(&tags.join(","));
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        if let Some(nanos) = self.time.timestamp_nanos_opt() {
            line.push(' ');
            line.push_str(&nanos.to_string());
        }
        line
    }
}

fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

/// Splits a snapshot into the electricity and gas measurements.
pub fn measurements(snapshot: &Snapshot) -> [Measurement; 2] {
    let readings = &snapshot.readings;
    [
        Measurement::new("electricity", "kwh", snapshot.captured_at)
            .field("delivered_low", readings.delivered_tariff1)
            .field("delivered_high", readings.delivered_tariff2)
            .field("returned_low", readings.returned_tariff1)
            .field("returned_high", readings.returned_tariff2),
        Measurement::new("gas", "m2", snapshot.captured_at)
            .field("delivered", readings.gas_delivered),
    ]
}

/// Storage backend for finished telegrams. Shared between meters, so it must
/// accept interleaved calls.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn insert(&self, measurement: &Measurement) -> Result<(), SinkError>;
}

/// Hands both measurements of a snapshot to the sink. Failures are logged and
/// swallowed, the caller keeps parsing.
pub async fn deliver<S: ReadingSink + ?Sized>(sink: &S, snapshot: &Snapshot) -> usize {
    let mut delivered = 0;
    for measurement in measurements(snapshot) {
        debug!("sending fields: {:?}", measurement.fields);
        match sink.insert(&measurement).await {
            Ok(_) => delivered += 1,
            Err(e) => error!("Failed to insert {} measurement: {}", measurement.category, e),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering_p1::structs::Readings;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FlakySink {
        fail_category: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReadingSink for FlakySink {
        async fn insert(&self, measurement: &Measurement) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push(measurement.category.clone());
            if measurement.category == self.fail_category {
                return Err(SinkError::Transport("broker unreachable".to_string()));
            }
            Ok(())
        }
    }

    fn snapshot() -> Snapshot {
        let mut readings = Readings::default();
        readings.delivered_tariff1 = 12972.117;
        readings.delivered_tariff2 = 14730.9;
        readings.returned_tariff1 = 746.379;
        readings.returned_tariff2 = 1722.431;
        readings.power_delivered = 0.43;
        readings.gas_delivered = 8950.179;
        Snapshot {
            captured_at: Utc.with_ymd_and_hms(2020, 10, 24, 22, 12, 13).unwrap(),
            readings,
        }
    }

    #[test]
    fn test_measurement_shapes() {
        let [electricity, gas] = measurements(&snapshot());

        assert_eq!(electricity.category, "electricity");
        assert_eq!(electricity.tags["source"], "dsmr");
        assert_eq!(electricity.tags["metric"], "kwh");
        assert_eq!(electricity.tags["type"], "electricity");
        assert_eq!(electricity.fields.len(), 4);
        assert_eq!(electricity.fields["delivered_low"], 12972.117);
        assert_eq!(electricity.fields["delivered_high"], 14730.9);
        assert_eq!(electricity.fields["returned_low"], 746.379);
        assert_eq!(electricity.fields["returned_high"], 1722.431);

        assert_eq!(gas.category, "gas");
        assert_eq!(gas.tags["source"], "dsmr");
        assert_eq!(gas.tags["metric"], "m2");
        assert_eq!(gas.tags["type"], "gas");
        assert_eq!(gas.fields.len(), 1);
        assert_eq!(gas.fields["delivered"], 8950.179);
    }

    #[test]
    fn test_line_protocol() {
        let [_, gas] = measurements(&snapshot());
        assert_eq!(
            gas.to_line_protocol(),
            "gas,metric=m2,source=dsmr,type=gas delivered=8950.179 1603577533000000000"
        );
    }

    #[test]
    fn test_escape_key() {
        assert_eq!(escape_key("a b,c=d"), "a\\ b\\,c\\=d");
    }

    #[tokio::test]
    async fn test_deliver_continues_after_failure() {
        let sink = FlakySink {
            fail_category: "electricity",
            seen: Mutex::new(Vec::new()),
        };
        let delivered = deliver(&sink, &snapshot()).await;

        assert_eq!(delivered, 1);
        assert_eq!(*sink.seen.lock().unwrap(), vec!["electricity", "gas"]);
    }
}
