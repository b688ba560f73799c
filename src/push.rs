use crate::record::{LogRecord, Severity};
use serde::Serialize;
use std::collections::BTreeMap;

/// Label key carrying the severity of every entry in a stream.
pub const LEVEL_LABEL: &str = "level";

/// Group of log values sharing one label set.
///
/// Serializes to Loki's `{"stream": {..}, "values": [[ts, line], ..]}`
/// shape. `values` keeps the arrival order of the originating records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stream {
    #[serde(rename = "stream")]
    pub labels: BTreeMap<String, String>,
    pub values: Vec<(String, String)>,
}

/// Body of one push request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushBatch {
    pub streams: Vec<Stream>,
}

impl PushBatch {
    /// Partition `records` by severity into one stream per distinct level.
    ///
    /// Each stream is labelled with `labels` plus `level=<severity>`; a
    /// default label named `level` is overridden. Streams appear in the
    /// order their severity was first seen in `records`.
    pub fn from_records(records: &[LogRecord], labels: &BTreeMap<String, String>) -> Self {
        let mut order: Vec<Severity> = Vec::new();
        let mut partitions: BTreeMap<Severity, Vec<(String, String)>> = BTreeMap::new();

        for record in records {
            let values = partitions.entry(record.severity).or_insert_with(|| {
                order.push(record.severity);
                Vec::new()
            });
            values.push((record.unix_nanos(), record.message.clone()));
        }

        let streams = order
            .into_iter()
            .filter_map(|severity| {
                let values = partitions.remove(&severity)?;
                let mut stream_labels = labels.clone();
                stream_labels.insert(LEVEL_LABEL.to_string(), severity.as_str().to_string());
                Some(Stream {
                    labels: stream_labels,
                    values,
                })
            })
            .collect();

        PushBatch { streams }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Total number of values across all streams.
    pub fn len(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(secs: i64, severity: Severity, msg: &str) -> LogRecord {
        LogRecord::at(Utc.timestamp_opt(secs, 0).unwrap(), severity, msg)
    }

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), "billing".to_string())])
    }

    #[test]
    fn partitions_by_severity_and_keeps_arrival_order() {
        let records = vec![
            record(1, Severity::Info, "a"),
            record(2, Severity::Error, "boom"),
            record(3, Severity::Info, "b"),
            record(4, Severity::Error, "bang"),
            record(5, Severity::Debug, "trace"),
        ];

        let batch = PushBatch::from_records(&records, &labels());

        assert_eq!(batch.streams.len(), 3);
        assert_eq!(batch.len(), records.len());

        let info = &batch.streams[0];
        assert_eq!(info.labels.get("level").map(String::as_str), Some("info"));
        assert_eq!(info.labels.get("app").map(String::as_str), Some("billing"));
        let messages: Vec<&str> = info.values.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(messages, ["a", "b"]);

        let error = &batch.streams[1];
        assert_eq!(error.labels["level"], "error");
        assert_eq!(error.values[0].1, "boom");
        assert_eq!(error.values[1].1, "bang");

        assert_eq!(batch.streams[2].labels["level"], "debug");
    }

    #[test]
    fn level_label_overrides_a_default_of_the_same_name() {
        let mut defaults = labels();
        defaults.insert("level".to_string(), "bogus".to_string());

        let batch = PushBatch::from_records(&[record(1, Severity::Warn, "w")], &defaults);

        assert_eq!(batch.streams[0].labels["level"], "warn");
        assert_eq!(batch.streams[0].labels.len(), 2);
    }

    #[test]
    fn serializes_to_loki_push_shape() {
        let batch = PushBatch::from_records(&[record(1, Severity::Info, "hello")], &labels());
        let json: serde_json::Value = serde_json::from_slice(&batch.to_json().unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "streams": [{
                    "stream": { "app": "billing", "level": "info" },
                    "values": [["1000000000", "hello"]]
                }]
            })
        );
    }

    #[test]
    fn empty_input_builds_empty_batch() {
        let batch = PushBatch::from_records(&[], &labels());
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
