use crate::db::models::NewStateRecord;
use crate::schema;
use core::fmt;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;

/// Backend-imposed atomic-write limit per commit.
pub const CHUNK_SIZE: usize = 500;

/// Durable batch writer seam. One call commits one chunk atomically; commits
/// for different chunks may run concurrently.
pub trait RecordWriter: Sync {
    fn commit_chunk(&self, rows: &[NewStateRecord]) -> Result<usize, String>;
}

/// Writer backed by Postgres/TimescaleDB. Chunk commits run on independent
/// threads and `PgConnection` is not shareable, so each commit establishes its
/// own connection.
pub struct PgRecordWriter {
    database_url: String,
}

impl PgRecordWriter {
    pub fn new(database_url: impl Into<String>) -> Self {
        PgRecordWriter {
            database_url: database_url.into(),
        }
    }
}

impl RecordWriter for PgRecordWriter {
    fn commit_chunk(&self, rows: &[NewStateRecord]) -> Result<usize, String> {
        use schema::machine_states::dsl as M;

        let mut conn =
            PgConnection::establish(&self.database_url).map_err(|e| format!("DB connection failed: {}", e))?;

        diesel::insert_into(M::machine_states)
            .values(rows)
            .execute(&mut conn)
            .map_err(|e| format!("insert state rows failed: {}", e))
    }
}

/// One or more chunk commits failed. Chunks that committed before or
/// alongside the failure stay persisted; there is no rollback.
#[derive(Debug)]
pub struct PersistError {
    /// Zero-based chunk index paired with the commit failure message.
    pub failed_chunks: Vec<(usize, String)>,
    pub total_chunks: usize,
    pub committed_rows: usize,
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let detail = self
            .failed_chunks
            .iter()
            .map(|(i, msg)| format!("chunk {}: {}", i, msg))
            .collect::<Vec<_>>()
            .join("; ");
        write!(
            f,
            "{} of {} chunk commit(s) failed ({} row(s) from other chunks remain persisted): {}",
            self.failed_chunks.len(),
            self.total_chunks,
            self.committed_rows,
            detail
        )
    }
}

impl Error for PersistError {}

/// Partition the final record sequence into chunks of at most [`CHUNK_SIZE`]
/// rows and commit every chunk concurrently, joining all commits before
/// returning.
///
/// Ordering across chunks is not guaranteed during the import window; a
/// reader may observe a later chunk before an earlier one. On failure the
/// error names every failed chunk, and rows from successful chunks are not
/// undone.
pub fn persist_records(writer: &dyn RecordWriter, rows: &[NewStateRecord]) -> Result<usize, PersistError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let total_chunks = rows.len().div_ceil(CHUNK_SIZE);
    info!(
        "Persist: committing {} record(s) in {} chunk(s)",
        rows.len(),
        total_chunks
    );

    // Fan out one commit per chunk, then join the whole set.
    let results: Vec<Result<usize, String>> = thread::scope(|scope| {
        let handles: Vec<_> = rows
            .chunks(CHUNK_SIZE)
            .map(|chunk| scope.spawn(move || writer.commit_chunk(chunk)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err("chunk commit thread panicked".to_string()))
            })
            .collect()
    });

    let mut committed_rows = 0;
    let mut failed_chunks = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(count) => committed_rows += count,
            Err(msg) => {
                warn!("Persist: chunk {} failed: {}", index, msg);
                failed_chunks.push((index, msg));
            }
        }
    }

    if failed_chunks.is_empty() {
        Ok(committed_rows)
    } else {
        Err(PersistError {
            failed_chunks,
            total_chunks,
            committed_rows,
        })
    }
}
