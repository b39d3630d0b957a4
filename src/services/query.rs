use crate::db::models::StateRecord;
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;

/// Count the stored records carrying the given metric identifier.
///
/// Synthesized gap records persist a NULL metric id, so they are not counted
/// here; the read surface reports real readings only.
pub fn count_records(conn: &mut PgConnection, metric_id: &str) -> Result<i64, String> {
    use schema::machine_states::dsl as M;

    M::machine_states
        .filter(M::metric_id.eq(metric_id))
        .count()
        .get_result(conn)
        .map_err(|e| format!("count stored records failed: {}", e))
}

/// Most recent stored records for the metric, newest first. Gap records are
/// included: they are part of the timeline.
pub fn recent_records(conn: &mut PgConnection, metric_id: &str, limit: i64) -> Result<Vec<StateRecord>, String> {
    use schema::machine_states::dsl as M;

    M::machine_states
        .filter(M::metric_id.eq(metric_id).or(M::metric_id.is_null()))
        .order(M::time.desc())
        .limit(limit)
        .select(StateRecord::as_select())
        .load(conn)
        .map_err(|e| format!("fetch recent records failed: {}", e))
}
