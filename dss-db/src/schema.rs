//! PostgreSQL schema definitions for the DSS

/// Complete DSS schema.
///
/// `updated_at` is the version source on every table: stamped with
/// `transaction_timestamp()` on each write, it becomes the RID timestamp
/// version directly and is hashed into the SCD OVN. Cell columns are
/// `BIGINT[]` under a GIN index so spatial searches reduce to the `&&`
/// array-overlap operator.
pub const DSS_SCHEMA: &str = r#"
-- ============================================
-- Schema version probe (single row)
-- ============================================
CREATE TABLE IF NOT EXISTS schema_versions (
  onerow_enforcer BOOL PRIMARY KEY DEFAULT TRUE CHECK (onerow_enforcer),
  schema_version TEXT NOT NULL
);
INSERT INTO schema_versions (schema_version)
  VALUES ('v4.0.0')
  ON CONFLICT (onerow_enforcer) DO NOTHING;

-- ============================================
-- Remote-ID: identification service areas
-- ============================================
CREATE TABLE IF NOT EXISTS identification_service_areas (
  id UUID PRIMARY KEY,
  owner TEXT NOT NULL,
  url TEXT NOT NULL,
  altitude_lower REAL,
  altitude_upper REAL,
  starts_at TIMESTAMPTZ,
  ends_at TIMESTAMPTZ,
  cells BIGINT[] NOT NULL CHECK (cardinality(cells) > 0),
  writer TEXT,
  updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS isa_cells_idx
  ON identification_service_areas USING GIN (cells);
CREATE INDEX IF NOT EXISTS isa_ends_at_idx
  ON identification_service_areas (ends_at);

-- ============================================
-- Remote-ID: subscriptions
-- ============================================
CREATE TABLE IF NOT EXISTS subscriptions (
  id UUID PRIMARY KEY,
  owner TEXT NOT NULL,
  url TEXT NOT NULL,
  notification_index INT4 NOT NULL DEFAULT 0,
  cells BIGINT[] NOT NULL CHECK (cardinality(cells) > 0),
  starts_at TIMESTAMPTZ,
  ends_at TIMESTAMPTZ,
  writer TEXT,
  updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS subscriptions_cells_idx
  ON subscriptions USING GIN (cells);
CREATE INDEX IF NOT EXISTS subscriptions_owner_idx
  ON subscriptions (owner);
CREATE INDEX IF NOT EXISTS subscriptions_ends_at_idx
  ON subscriptions (ends_at);

-- ============================================
-- SCD: operational intents
-- ============================================
CREATE TABLE IF NOT EXISTS scd_operations (
  id UUID PRIMARY KEY,
  owner TEXT NOT NULL,
  version INT4 NOT NULL DEFAULT 0,
  state TEXT NOT NULL,
  uss_base_url TEXT NOT NULL,
  subscription_id UUID NOT NULL,
  altitude_lower REAL,
  altitude_upper REAL,
  starts_at TIMESTAMPTZ,
  ends_at TIMESTAMPTZ,
  cells BIGINT[] NOT NULL CHECK (cardinality(cells) > 0),
  updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS scd_operations_cells_idx
  ON scd_operations USING GIN (cells);
CREATE INDEX IF NOT EXISTS scd_operations_subscription_idx
  ON scd_operations (subscription_id);

-- ============================================
-- SCD: constraints
-- ============================================
CREATE TABLE IF NOT EXISTS scd_constraints (
  id UUID PRIMARY KEY,
  owner TEXT NOT NULL,
  version INT4 NOT NULL DEFAULT 0,
  uss_base_url TEXT NOT NULL,
  altitude_lower REAL,
  altitude_upper REAL,
  starts_at TIMESTAMPTZ,
  ends_at TIMESTAMPTZ,
  cells BIGINT[] NOT NULL CHECK (cardinality(cells) > 0),
  updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS scd_constraints_cells_idx
  ON scd_constraints USING GIN (cells);

-- ============================================
-- SCD: subscriptions
-- ============================================
CREATE TABLE IF NOT EXISTS scd_subscriptions (
  id UUID PRIMARY KEY,
  owner TEXT NOT NULL,
  uss_base_url TEXT NOT NULL,
  notification_index INT4 NOT NULL DEFAULT 0,
  notify_for_operational_intents BOOL NOT NULL DEFAULT FALSE,
  notify_for_constraints BOOL NOT NULL DEFAULT FALSE,
  implicit BOOL NOT NULL DEFAULT FALSE,
  altitude_lower REAL,
  altitude_upper REAL,
  starts_at TIMESTAMPTZ,
  ends_at TIMESTAMPTZ,
  cells BIGINT[] NOT NULL CHECK (cardinality(cells) > 0),
  updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS scd_subscriptions_cells_idx
  ON scd_subscriptions USING GIN (cells);
CREATE INDEX IF NOT EXISTS scd_subscriptions_owner_idx
  ON scd_subscriptions (owner);
"#;

/// Splits the schema into single statements, dropping comment-only chunks.
pub fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_split() {
        let statements = schema_statements(DSS_SCHEMA);
        assert!(statements.len() > 10);
        assert!(statements.iter().all(|s| !s.is_empty()));
        assert!(statements
            .iter()
            .any(|s| s.contains("identification_service_areas")));
        assert!(statements.iter().any(|s| s.contains("USING GIN")));
    }

    #[test]
    fn test_every_table_has_updated_at() {
        for table in [
            "identification_service_areas",
            "subscriptions",
            "scd_operations",
            "scd_constraints",
            "scd_subscriptions",
        ] {
            let stmt = schema_statements(DSS_SCHEMA)
                .into_iter()
                .find(|s| s.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")))
                .unwrap_or_else(|| panic!("missing table {table}"));
            assert!(stmt.contains("updated_at TIMESTAMPTZ NOT NULL"));
        }
    }
}
