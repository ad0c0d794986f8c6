//! Event store database schema.
//!
//! Mirrors the bundled migration so the DDL can be inspected or applied by
//! hand.

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    event_id        UUID PRIMARY KEY,
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    TEXT NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    sequence_number BIGINT NOT NULL,
    payload         JSONB NOT NULL,
    correlation_id  UUID NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    UNIQUE (aggregate_type, aggregate_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_created_at
    ON domain_events (aggregate_type, aggregate_id, created_at);

CREATE INDEX IF NOT EXISTS idx_domain_events_correlation_id
    ON domain_events (correlation_id);
";

/// SQL to create the snapshots table. One row per aggregate, overwritten on
/// every save.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aggregate_snapshots (
    aggregate_type          VARCHAR(255) NOT NULL,
    aggregate_id            TEXT NOT NULL,
    version                 BIGINT NOT NULL,
    latest_snapshot_version BIGINT NOT NULL,
    last_modified           TIMESTAMPTZ,
    state                   JSONB NOT NULL,
    PRIMARY KEY (aggregate_type, aggregate_id)
);
";
