//! Data model for the import pipeline: decoded CSV rows, operating states,
//! and the canonical timed record that flows through every stage.

use core::fmt;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sentinel value carried by synthesized gap records.
pub const GAP_VALUE: f64 = -1.0;

/// One decoded row of the input file, field names matching the CSV header.
///
/// Numeric fields arrive as text and are converted when the row is admitted
/// into the pipeline; rows for other metrics are dropped before conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub deviceid: String,
    /// Epoch milliseconds as text.
    pub timestamp: String,
    pub metricid: String,
    /// Measured quantity as decimal text.
    pub calcvalue: String,
}

/// Machine operating state, persisted as its integer code.
///
/// `Off` is only ever assigned to synthesized gap records; a real reading of
/// zero current on a powered machine classifies as `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Off = 1,
    Unloaded = 2,
    Idle = 3,
    Loaded = 4,
}

impl MachineState {
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Canonical unit flowing through dedup, sequencing, gap fill, and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedRecord {
    pub device_id: String,
    /// Epoch milliseconds; unique within one device+metric stream after dedup.
    pub timestamp_millis: i64,
    /// Measured quantity, or [`GAP_VALUE`] for synthesized gap records.
    pub value: f64,
    /// Unset until classification; gap records are pre-assigned `Off`.
    pub state: Option<MachineState>,
    /// `None` for synthesized gap records.
    pub metric_id: Option<String>,
    /// Populated only by the optional span-merge pass.
    pub duration_secs: Option<i64>,
}

impl TimedRecord {
    /// Synthesized no-data boundary record for an inferred gap.
    pub fn gap(device_id: String, timestamp_millis: i64) -> Self {
        TimedRecord {
            device_id,
            timestamp_millis,
            value: GAP_VALUE,
            state: Some(MachineState::Off),
            metric_id: None,
            duration_secs: None,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.metric_id.is_none()
    }
}

/// A numeric field of an input row failed to parse.
#[derive(Debug)]
pub struct MalformedRowError {
    pub field: &'static str,
    pub value: String,
}

impl Display for MalformedRowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {} field: {:?}", self.field, self.value)
    }
}

impl Error for MalformedRowError {}

impl RawReading {
    /// Parse the raw timestamp text as epoch milliseconds.
    pub fn timestamp_millis(&self) -> Result<i64, MalformedRowError> {
        self.timestamp.trim().parse::<i64>().map_err(|_| MalformedRowError {
            field: "timestamp",
            value: self.timestamp.clone(),
        })
    }

    /// Convert into an (unclassified) pipeline record.
    ///
    /// Takes the already-parsed timestamp so callers deduplicating on it do
    /// not parse twice.
    pub fn into_record(self, timestamp_millis: i64) -> Result<TimedRecord, MalformedRowError> {
        let value = self.calcvalue.trim().parse::<f64>().map_err(|_| MalformedRowError {
            field: "calcvalue",
            value: self.calcvalue.clone(),
        })?;

        Ok(TimedRecord {
            device_id: self.deviceid,
            timestamp_millis,
            value,
            state: None,
            metric_id: Some(self.metricid),
            duration_secs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(timestamp: &str, calcvalue: &str) -> RawReading {
        RawReading {
            deviceid: "compressor-1".to_string(),
            timestamp: timestamp.to_string(),
            metricid: "Iavg_A".to_string(),
            calcvalue: calcvalue.to_string(),
        }
    }

    #[test]
    fn state_codes_are_stable() {
        assert_eq!(MachineState::Off.code(), 1);
        assert_eq!(MachineState::Unloaded.code(), 2);
        assert_eq!(MachineState::Idle.code(), 3);
        assert_eq!(MachineState::Loaded.code(), 4);
    }

    #[test]
    fn converts_valid_row() {
        let reading = raw("1600000000000", "42.5");
        let ts = reading.timestamp_millis().expect("timestamp parses");
        assert_eq!(ts, 1_600_000_000_000);

        let record = reading.into_record(ts).expect("row converts");
        assert_eq!(record.value, 42.5);
        assert_eq!(record.state, None);
        assert_eq!(record.metric_id.as_deref(), Some("Iavg_A"));
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let err = raw("not-a-number", "1.0").timestamp_millis().unwrap_err();
        assert_eq!(err.field, "timestamp");
    }

    #[test]
    fn rejects_malformed_value() {
        let reading = raw("1000", "n/a");
        let ts = reading.timestamp_millis().expect("timestamp parses");
        let err = reading.into_record(ts).unwrap_err();
        assert_eq!(err.field, "calcvalue");
    }

    #[test]
    fn gap_records_carry_sentinel_and_off_state() {
        let gap = TimedRecord::gap("compressor-1".to_string(), 30_000);
        assert!(gap.is_gap());
        assert_eq!(gap.value, GAP_VALUE);
        assert_eq!(gap.state, Some(MachineState::Off));
        assert_eq!(gap.metric_id, None);
    }
}
