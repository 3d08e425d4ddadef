use crate::error::StoreError;

/// 타임스탬프는 UNIX epoch 밀리초(INTEGER)로 저장합니다.
const SCHEMA_SQL: &str = r#"
-- One row per analysis job
CREATE TABLE IF NOT EXISTS scans (
    id                    TEXT PRIMARY KEY,
    ecu_name              TEXT NOT NULL,
    ecu_type              TEXT NOT NULL,
    version               TEXT NOT NULL,
    manufacturer          TEXT,
    platform              TEXT,
    architecture          TEXT NOT NULL,
    file_name             TEXT NOT NULL,
    file_size             INTEGER NOT NULL,
    file_hash             TEXT,
    priority              TEXT NOT NULL,
    compliance_frameworks TEXT NOT NULL,
    deep_analysis         INTEGER NOT NULL,
    status                TEXT NOT NULL,
    progress              INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
    risk_score            INTEGER CHECK (risk_score IS NULL OR risk_score BETWEEN 0 AND 100),
    executive_summary     TEXT,
    created_at            INTEGER NOT NULL,
    started_at            INTEGER,
    completed_at          INTEGER,
    updated_at            INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scans_created ON scans(created_at);
CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status, updated_at);

CREATE TABLE IF NOT EXISTS vulnerabilities (
    id                 TEXT PRIMARY KEY,
    scan_id            TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    severity           TEXT NOT NULL,
    cwe_id             TEXT,
    cve_id             TEXT,
    cvss_score         REAL,
    title              TEXT NOT NULL,
    description        TEXT,
    affected_component TEXT,
    affected_function  TEXT,
    code_snippet       TEXT,
    line_number        INTEGER,
    detection_method   TEXT NOT NULL,
    remediation        TEXT,
    attack_vector      TEXT,
    impact             TEXT,
    enrichment         TEXT,
    status             TEXT NOT NULL,
    created_at         INTEGER NOT NULL,
    updated_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vuln_scan ON vulnerabilities(scan_id, created_at);

CREATE TABLE IF NOT EXISTS compliance_results (
    id               TEXT PRIMARY KEY,
    scan_id          TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    framework        TEXT NOT NULL,
    rule_id          TEXT NOT NULL,
    rule_description TEXT,
    status           TEXT NOT NULL,
    details          TEXT,
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_compliance_scan ON compliance_results(scan_id, created_at);

CREATE TABLE IF NOT EXISTS sbom_components (
    id              TEXT PRIMARY KEY,
    scan_id         TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    component_name  TEXT NOT NULL,
    version         TEXT,
    license         TEXT,
    source_file     TEXT,
    vulnerabilities TEXT NOT NULL,
    created_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sbom_scan ON sbom_components(scan_id, component_name);

-- Append-only audit trail of pipeline progress
CREATE TABLE IF NOT EXISTS analysis_logs (
    id         TEXT PRIMARY KEY,
    scan_id    TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    stage      TEXT NOT NULL,
    log_level  TEXT NOT NULL,
    message    TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_scan ON analysis_logs(scan_id, created_at);
"#;

/// 연결 설정과 스키마 생성
///
/// 외래 키는 연결마다 켜야 CASCADE 삭제가 동작합니다.
pub fn initialize(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('scans', 'vulnerabilities', 'compliance_results', \
                 'sbom_components', 'analysis_logs')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn foreign_keys_are_enabled() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
