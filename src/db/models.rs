//! Diesel model structs for the `machine_states` hypertable.

use chrono::{DateTime, Utc};
use core::fmt;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::reading::TimedRecord;
use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::machine_states)]
pub struct StateRecord {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub device_id: String,
    pub metric_id: Option<String>,
    pub value: f64,
    pub state: i16,
    pub timestamp_value: i64,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::machine_states)]
pub struct NewStateRecord {
    pub time: DateTime<Utc>,
    pub device_id: String,
    pub metric_id: Option<String>,
    pub value: f64,
    pub state: i16,
    pub timestamp_value: i64,
    pub duration_secs: Option<i64>,
}

/// A pipeline record could not be turned into an insertable row.
#[derive(Debug)]
pub enum RecordConvertError {
    /// The record reached persistence without a classified state.
    Unclassified(i64),
    /// Epoch milliseconds outside the representable timestamp range.
    TimestampOutOfRange(i64),
}

impl Display for RecordConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RecordConvertError::Unclassified(ts) => {
                write!(f, "record at {} has no classified state", ts)
            }
            RecordConvertError::TimestampOutOfRange(ts) => {
                write!(f, "timestamp {} is outside the representable range", ts)
            }
        }
    }
}

impl Error for RecordConvertError {}

impl NewStateRecord {
    /// Build an insertable row from a fully classified pipeline record,
    /// deriving the structured instant from its epoch milliseconds.
    pub fn from_timed(record: TimedRecord) -> Result<Self, RecordConvertError> {
        let ts = record.timestamp_millis;
        let state = record.state.ok_or(RecordConvertError::Unclassified(ts))?;
        let time = DateTime::<Utc>::from_timestamp_millis(ts).ok_or(RecordConvertError::TimestampOutOfRange(ts))?;

        Ok(NewStateRecord {
            time,
            device_id: record.device_id,
            metric_id: record.metric_id,
            value: record.value,
            state: state.code(),
            timestamp_value: ts,
            duration_secs: record.duration_secs,
        })
    }
}
