//! Handwritten Diesel schema declaration used by model structs.
//!
//! Migrations will define the actual table and constraints. This module only
//! provides the `diesel::table!` declaration so we can derive
//! Insertable/Queryable in a type-safe way without running
//! `diesel print-schema`.

// TimescaleDB hypertable (intended): gap-aware machine state timeline
diesel::table! {
    machine_states (id) {
        id -> BigInt,
        time -> Timestamptz,
        device_id -> Text,
        metric_id -> Nullable<Text>, // NULL for synthesized gap records
        value -> Double,
        state -> SmallInt, // 1=OFF 2=UNLOADED 3=IDLE 4=LOADED
        timestamp_value -> BigInt,
        duration_secs -> Nullable<BigInt>, // set only by the span-merge pass
    }
}
