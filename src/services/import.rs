use crate::config::Config;
use crate::db::models::{NewStateRecord, RecordConvertError};
use crate::models::reading::{MalformedRowError, RawReading};
use crate::pipeline::{gapfill, normalize};
use crate::services::persist::{self, PersistError, RecordWriter};
use core::fmt;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

/// Why an import run failed. Decoding failures abort the run before anything
/// is persisted; a persistence failure may leave earlier chunks committed.
#[derive(Debug)]
pub enum ImportError {
    Read(std::io::Error),
    Decode(csv::Error),
    MalformedRow(MalformedRowError),
    Convert(RecordConvertError),
    Persist(PersistError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Read(e) => write!(f, "ingestion failed: reading input file: {}", e),
            ImportError::Decode(e) => write!(f, "ingestion failed: malformed input: {}", e),
            ImportError::MalformedRow(e) => write!(f, "ingestion failed: malformed input: {}", e),
            ImportError::Convert(e) => write!(f, "ingestion failed: {}", e),
            ImportError::Persist(e) => write!(f, "persistence failed: {}", e),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImportError::Read(e) => Some(e),
            ImportError::Decode(e) => Some(e),
            ImportError::MalformedRow(e) => Some(e),
            ImportError::Convert(e) => Some(e),
            ImportError::Persist(e) => Some(e),
        }
    }
}

impl From<MalformedRowError> for ImportError {
    fn from(value: MalformedRowError) -> Self {
        ImportError::MalformedRow(value)
    }
}

impl From<RecordConvertError> for ImportError {
    fn from(value: RecordConvertError) -> Self {
        ImportError::Convert(value)
    }
}

impl From<PersistError> for ImportError {
    fn from(value: PersistError) -> Self {
        ImportError::Persist(value)
    }
}

/// Decode header-mapped delimited text into raw readings. Any undecodable
/// row fails the batch.
fn decode_readings(input: &[u8]) -> Result<Vec<RawReading>, ImportError> {
    let mut reader = csv::Reader::from_reader(input);
    let mut readings = Vec::new();
    for row in reader.deserialize::<RawReading>() {
        readings.push(row.map_err(ImportError::Decode)?);
    }
    Ok(readings)
}

/// Run one import: read the file, decode, filter to the target metric, dedup,
/// sequence, fill gaps and classify, optionally merge spans, persist.
///
/// Returns the number of records written. The whole record sequence is held
/// in memory for the duration of the run; persistence starts only after the
/// transform completes.
pub fn run_import(cfg: &Config, writer: &dyn RecordWriter, path: &Path) -> Result<usize, ImportError> {
    let contents = fs::read_to_string(path).map_err(ImportError::Read)?;
    let readings = decode_readings(contents.as_bytes())?;
    info!("Import: parsed {} row(s) from {}", readings.len(), path.display());

    let readings: Vec<RawReading> = readings.into_iter().filter(|r| r.metricid == cfg.target_metric).collect();
    info!(
        "Import: {} row(s) after filtering to metric {}",
        readings.len(),
        cfg.target_metric
    );

    let by_ts = normalize::dedup_by_timestamp(readings)?;
    let ordered = normalize::sequence(by_ts);
    info!("Import: {} record(s) after timestamp dedup", ordered.len());

    let period_secs = cfg.data_min_period.as_secs();
    let mut timeline = gapfill::fill_gaps_and_classify(ordered, cfg.min_threshold, cfg.operating_load, period_secs);
    info!("Import: {} record(s) after gap fill", timeline.len());

    if cfg.merge_spans {
        timeline = gapfill::merge_spans(timeline, period_secs);
        info!("Import: {} span(s) after merging consecutive states", timeline.len());
    }

    let rows = timeline
        .into_iter()
        .map(NewStateRecord::from_timed)
        .collect::<Result<Vec<_>, _>>()?;

    let written = persist::persist_records(writer, &rows)?;
    info!("Import: wrote {} record(s)", written);
    Ok(written)
}
