use crate::models::reading::{MalformedRowError, RawReading, TimedRecord};
use std::collections::BTreeMap;

/// Collapse readings sharing a timestamp into one record each, keyed by epoch
/// milliseconds. The first reading encountered for a timestamp wins; later
/// duplicates are dropped without error (documented limitation of the input
/// data, not a fault).
///
/// A malformed numeric field fails the whole batch; nothing downstream runs.
pub fn dedup_by_timestamp(readings: Vec<RawReading>) -> Result<BTreeMap<i64, TimedRecord>, MalformedRowError> {
    let mut by_ts = BTreeMap::new();

    for reading in readings {
        let ts = reading.timestamp_millis()?;
        if by_ts.contains_key(&ts) {
            // first wins
            continue;
        }
        by_ts.insert(ts, reading.into_record(ts)?);
    }

    Ok(by_ts)
}

/// Deduplicated records in ascending timestamp order. Ties cannot occur; the
/// map key is the timestamp.
pub fn sequence(by_ts: BTreeMap<i64, TimedRecord>) -> Vec<TimedRecord> {
    by_ts.into_values().collect()
}
