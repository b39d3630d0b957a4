//! Gap inference and state classification over the ordered record sequence,
//! done in a single interleaved pass.

use crate::models::reading::{MachineState, TimedRecord};

/// Fraction of the operating load below which a machine counts as idling.
const IDLE_LOAD_FRACTION: f64 = 0.2;

/// Map a measured value to an operating state.
///
/// Comparison order matters: the thresholds are not disjoint ranges. A value
/// of exactly zero still classifies as `Unloaded` (powered, drawing no
/// current); `Off` is reserved for synthesized gap records.
pub fn classify(value: f64, min_threshold: f64, operating_load: f64) -> MachineState {
    if value <= min_threshold {
        MachineState::Unloaded
    } else if value <= operating_load * IDLE_LOAD_FRACTION {
        MachineState::Idle
    } else {
        MachineState::Loaded
    }
}

/// Walk the time-ordered sequence, classifying every real record and inserting
/// one synthetic OFF boundary record wherever the elapsed time since the
/// previous *original* record exceeds `data_min_period_secs`.
///
/// The boundary record is stamped at `previous + period` and carries the
/// sentinel value; only one is inserted per detected gap, however large the
/// gap is. Output remains time-ascending and may be longer than the input.
pub fn fill_gaps_and_classify(
    records: Vec<TimedRecord>,
    min_threshold: f64,
    operating_load: f64,
    data_min_period_secs: u64,
) -> Vec<TimedRecord> {
    let period_ms = data_min_period_secs as i64 * 1000;
    let mut out = Vec::with_capacity(records.len());
    let mut prev_ts: Option<i64> = None;

    for mut record in records {
        // Gap check against the preceding input record, never against an
        // already-inserted boundary record.
        if let Some(prev) = prev_ts {
            let delta_ms = record.timestamp_millis - prev;
            if delta_ms > period_ms {
                out.push(TimedRecord::gap(record.device_id.clone(), prev + period_ms));
            }
        }
        prev_ts = Some(record.timestamp_millis);

        record.state = Some(classify(record.value, min_threshold, operating_load));
        out.push(record);
    }

    out
}

/// Optional post-pass: collapse consecutive same-state records into one span
/// carrying an accumulated duration (`data_min_period_secs` per merged
/// record). Disabled by default; enabled via `MERGE_SPANS`.
pub fn merge_spans(records: Vec<TimedRecord>, data_min_period_secs: u64) -> Vec<TimedRecord> {
    let period_secs = data_min_period_secs as i64;
    let mut spans: Vec<TimedRecord> = Vec::new();

    for mut record in records {
        match spans.last_mut() {
            Some(last) if last.state == record.state => {
                last.duration_secs = Some(last.duration_secs.unwrap_or(period_secs) + period_secs);
            }
            _ => {
                record.duration_secs = Some(period_secs);
                spans.push(record);
            }
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::GAP_VALUE;

    const MIN_THRESHOLD: f64 = 0.60;
    const OPERATING_LOAD: f64 = 100.0;
    const PERIOD_SECS: u64 = 30;

    fn real(timestamp_millis: i64, value: f64) -> TimedRecord {
        TimedRecord {
            device_id: "compressor-1".to_string(),
            timestamp_millis,
            value,
            state: None,
            metric_id: Some("Iavg_A".to_string()),
            duration_secs: None,
        }
    }

    fn run(records: Vec<TimedRecord>) -> Vec<TimedRecord> {
        fill_gaps_and_classify(records, MIN_THRESHOLD, OPERATING_LOAD, PERIOD_SECS)
    }

    #[test]
    fn classify_is_pure_and_ordered() {
        assert_eq!(classify(0.0, MIN_THRESHOLD, OPERATING_LOAD), MachineState::Unloaded);
        assert_eq!(classify(0.60, MIN_THRESHOLD, OPERATING_LOAD), MachineState::Unloaded);
        assert_eq!(classify(0.61, MIN_THRESHOLD, OPERATING_LOAD), MachineState::Idle);
        assert_eq!(classify(20.0, MIN_THRESHOLD, OPERATING_LOAD), MachineState::Idle);
        assert_eq!(classify(20.1, MIN_THRESHOLD, OPERATING_LOAD), MachineState::Loaded);
        // Same inputs, same answer.
        assert_eq!(
            classify(20.0, MIN_THRESHOLD, OPERATING_LOAD),
            classify(20.0, MIN_THRESHOLD, OPERATING_LOAD)
        );
    }

    #[test]
    fn close_readings_produce_no_gap_record() {
        // Readings 10s apart with a 30s period: both pass through, both
        // below the 0.60 threshold.
        let out = run(vec![real(0, 0.3), real(10_000, 0.5)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].state, Some(MachineState::Unloaded));
        assert_eq!(out[1].state, Some(MachineState::Unloaded));
    }

    #[test]
    fn wide_delta_inserts_one_off_record_at_period_boundary() {
        // 40s apart with a 30s period: one OFF record at t=30s between them.
        let out = run(vec![real(0, 50.0), real(40_000, 50.0)]);
        assert_eq!(out.len(), 3);

        let gap = &out[1];
        assert!(gap.is_gap());
        assert_eq!(gap.timestamp_millis, 30_000);
        assert_eq!(gap.value, GAP_VALUE);
        assert_eq!(gap.state, Some(MachineState::Off));
        assert_eq!(gap.device_id, "compressor-1");

        // 50 > 100 * 0.2, so both real readings are Loaded.
        assert_eq!(out[0].state, Some(MachineState::Loaded));
        assert_eq!(out[2].state, Some(MachineState::Loaded));
    }

    #[test]
    fn delta_equal_to_period_is_not_a_gap() {
        let out = run(vec![real(0, 1.0), real(30_000, 1.0)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| !r.is_gap()));
    }

    #[test]
    fn huge_gap_still_yields_a_single_boundary_record() {
        // Two days of silence: still exactly one OFF marker, at prev + period.
        let out = run(vec![real(0, 1.0), real(2 * 24 * 3600 * 1000, 1.0)]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].timestamp_millis, 30_000);
    }

    #[test]
    fn first_record_skips_the_gap_check() {
        let out = run(vec![real(1_000_000, 1.0)]);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_gap());
    }

    #[test]
    fn gaps_measured_against_original_predecessor() {
        // Three readings each 40s apart: a boundary record goes after each
        // original record, measured record-to-record, not against the
        // previously inserted boundary.
        let out = run(vec![real(0, 1.0), real(40_000, 1.0), real(80_000, 1.0)]);
        let stamps: Vec<i64> = out.iter().map(|r| r.timestamp_millis).collect();
        assert_eq!(stamps, vec![0, 30_000, 40_000, 70_000, 80_000]);
        for pair in out.windows(2) {
            assert!(pair[0].timestamp_millis <= pair[1].timestamp_millis);
        }
    }

    #[test]
    fn merge_collapses_consecutive_same_state_runs() {
        let classified = run(vec![real(0, 50.0), real(10_000, 60.0), real(20_000, 0.1)]);
        let spans = merge_spans(classified, PERIOD_SECS);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].state, Some(MachineState::Loaded));
        assert_eq!(spans[0].duration_secs, Some(60));
        assert_eq!(spans[1].state, Some(MachineState::Unloaded));
        assert_eq!(spans[1].duration_secs, Some(30));
    }
}
