use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use ecuscan_core::event::{ChangeKind, ChangeTable};
use ecuscan_core::metrics as m;
use ecuscan_core::pipeline::{ScanStatus, validate_transition};
use ecuscan_core::types::{
    AnalysisLog, Architecture, ComplianceResult, ComplianceStatus, DetectionMethod, EcuType,
    LogLevel, NewComplianceResult, NewSbomComponent, NewScan, NewVulnerability, Priority,
    SbomComponent, Scan, Severity, Vulnerability, VulnerabilityStatus,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::feed::ChangeFeed;
use crate::schema;

/// 스캔 완료 요청
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCompletion {
    /// 0..=100
    pub risk_score: u8,
    pub executive_summary: Option<String>,
    /// 완료 로그 메시지
    pub message: String,
}

impl ScanCompletion {
    pub fn new(risk_score: u8) -> Self {
        Self {
            risk_score,
            executive_summary: None,
            message: format!("Analysis complete - Risk Score: {risk_score}"),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.executive_summary = Some(summary.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// SQLite 기반 스캔 저장소
///
/// 연결 하나를 뮤텍스로 직렬화하고, 여러 문장으로 이루어진 변경은 트랜잭션으로 묶습니다.
/// 커밋된 모든 변경은 [`ChangeFeed`]로 발행됩니다.
pub struct ScanStore {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl std::fmt::Debug for ScanStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStore").finish_non_exhaustive()
    }
}

impl ScanStore {
    /// 파일 DB를 엽니다. 상위 디렉토리가 없으면 생성합니다.
    pub fn open(path: &Path, feed: ChangeFeed) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Other(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "scan database opened");
        Ok(Self {
            conn: Mutex::new(conn),
            feed,
        })
    }

    /// 인메모리 DB를 엽니다 (테스트/데모).
    pub fn open_in_memory(feed: ChangeFeed) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed,
        })
    }

    /// 변경 피드
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("scan database lock poisoned".to_owned()))
    }

    /// 연결이 쿼리에 응답하는지 확인합니다.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ─── 스캔 ──────────────────────────────────────────────────────

    /// `queued`, 진행률 0으로 스캔을 생성합니다.
    pub fn create_scan(&self, new: &NewScan) -> Result<Scan, StoreError> {
        new.validate().map_err(StoreError::InvalidRecord)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let frameworks = serde_json::to_string(&new.compliance_frameworks)?;

        let scan = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO scans (id, ecu_name, ecu_type, version, manufacturer, platform,
                    architecture, file_name, file_size, file_hash, priority,
                    compliance_frameworks, deep_analysis, status, progress, risk_score,
                    executive_summary, created_at, started_at, completed_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0,
                    NULL, NULL, ?15, NULL, NULL, ?15)",
                params![
                    id,
                    new.ecu_name,
                    new.ecu_type.as_str(),
                    new.version,
                    new.manufacturer,
                    new.platform,
                    new.architecture.as_str(),
                    new.file_name,
                    i64::try_from(new.file_size).unwrap_or(i64::MAX),
                    new.file_hash,
                    new.priority.as_str(),
                    frameworks,
                    new.deep_analysis,
                    ScanStatus::Queued.as_str(),
                    now,
                ],
            )?;
            load_scan(&conn, &id)?
        };

        metrics::counter!(m::SCANS_CREATED_TOTAL).increment(1);
        info!(scan_id = %scan.id, ecu = %scan.ecu_name, "scan created");
        self.feed
            .emit(ChangeTable::Scans, ChangeKind::Insert, &scan.id, &scan.id);
        Ok(scan)
    }

    /// 스캔을 조회합니다.
    pub fn get_scan(&self, scan_id: &str) -> Result<Scan, StoreError> {
        let conn = self.conn()?;
        load_scan(&conn, scan_id)
    }

    /// 모든 스캔 (최신 생성 순)
    pub fn list_scans(&self) -> Result<Vec<Scan>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map([], scan_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// `queued` 스캔을 `parsing`(10%)으로 전환합니다.
    ///
    /// 확인과 전환이 한 트랜잭션이므로 같은 스캔을 두 번 시작할 수 없습니다.
    pub fn begin(&self, scan_id: &str) -> Result<Scan, StoreError> {
        let progress = ScanStatus::Parsing.stage_progress().unwrap_or(10);
        self.transition(scan_id, ScanStatus::Parsing, progress, true)
    }

    /// 파이프라인 단계 진입 또는 단계 내 진행률 갱신
    ///
    /// `complete`와 `failed`는 각각 [`complete`](Self::complete),
    /// [`fail`](Self::fail)로만 도달합니다. 상태가 바뀌면 단계 로그를 남깁니다.
    pub fn advance(
        &self,
        scan_id: &str,
        status: ScanStatus,
        progress: u8,
    ) -> Result<Scan, StoreError> {
        self.transition(scan_id, status, progress, false)
    }

    fn transition(
        &self,
        scan_id: &str,
        status: ScanStatus,
        progress: u8,
        require_queued: bool,
    ) -> Result<Scan, StoreError> {
        if status.is_terminal() {
            return Err(StoreError::InvalidRecord(format!(
                "advance cannot enter terminal state {status}"
            )));
        }

        let (scan, log_id) = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let (from, from_progress) = scan_state(&tx, scan_id)?;
            if require_queued && from != ScanStatus::Queued {
                return Err(StoreError::NotQueued {
                    scan_id: scan_id.to_owned(),
                    status: from,
                });
            }
            validate_transition(from, from_progress, status, progress)?;

            let now = now_ms();
            tx.execute(
                "UPDATE scans SET status = ?2, progress = ?3, updated_at = ?4,
                    started_at = COALESCE(started_at, ?4)
                 WHERE id = ?1",
                params![scan_id, status.as_str(), progress, now],
            )?;

            let log_id = if from != status {
                let message = format!("Stage {status} started - Progress: {progress}%");
                Some(insert_log(
                    &tx,
                    scan_id,
                    status.as_str(),
                    LogLevel::Info,
                    &message,
                )?)
            } else {
                None
            };
            tx.commit()?;
            (load_scan(&conn, scan_id)?, log_id)
        };

        debug!(scan_id, status = %status, progress, "scan advanced");
        self.feed
            .emit(ChangeTable::Scans, ChangeKind::Update, scan_id, scan_id);
        if let Some(log_id) = log_id {
            self.feed
                .emit(ChangeTable::AnalysisLogs, ChangeKind::Insert, scan_id, &log_id);
        }
        Ok(scan)
    }

    /// 스캔을 완료 처리합니다. 진행률 100, 위험도 점수 설정.
    pub fn complete(&self, scan_id: &str, completion: &ScanCompletion) -> Result<Scan, StoreError> {
        if completion.risk_score > 100 {
            return Err(StoreError::InvalidRecord(format!(
                "risk_score {} is out of range 0..=100",
                completion.risk_score
            )));
        }

        let (scan, log_id) = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let (from, from_progress) = scan_state(&tx, scan_id)?;
            validate_transition(from, from_progress, ScanStatus::Complete, 100)?;

            let now = now_ms();
            tx.execute(
                "UPDATE scans SET status = ?2, progress = 100, risk_score = ?3,
                    executive_summary = ?4, completed_at = ?5, updated_at = ?5,
                    started_at = COALESCE(started_at, ?5)
                 WHERE id = ?1",
                params![
                    scan_id,
                    ScanStatus::Complete.as_str(),
                    completion.risk_score,
                    completion.executive_summary,
                    now,
                ],
            )?;
            let log_id = insert_log(
                &tx,
                scan_id,
                ScanStatus::Complete.as_str(),
                LogLevel::Info,
                &completion.message,
            )?;
            tx.commit()?;
            (load_scan(&conn, scan_id)?, log_id)
        };

        metrics::counter!(m::SCANS_COMPLETED_TOTAL).increment(1);
        info!(scan_id, risk_score = completion.risk_score, "scan complete");
        self.feed
            .emit(ChangeTable::Scans, ChangeKind::Update, scan_id, scan_id);
        self.feed
            .emit(ChangeTable::AnalysisLogs, ChangeKind::Insert, scan_id, &log_id);
        Ok(scan)
    }

    /// 종료되지 않은 스캔을 실패 처리합니다. 진행률은 그대로 둡니다.
    pub fn fail(&self, scan_id: &str, message: &str) -> Result<Scan, StoreError> {
        let (scan, log_id) = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let (from, from_progress) = scan_state(&tx, scan_id)?;
            validate_transition(from, from_progress, ScanStatus::Failed, from_progress)?;

            let now = now_ms();
            tx.execute(
                "UPDATE scans SET status = ?2, completed_at = ?3, updated_at = ?3 WHERE id = ?1",
                params![scan_id, ScanStatus::Failed.as_str(), now],
            )?;
            let log_id = insert_log(
                &tx,
                scan_id,
                ScanStatus::Failed.as_str(),
                LogLevel::Error,
                &format!("Analysis failed: {message}"),
            )?;
            tx.commit()?;
            (load_scan(&conn, scan_id)?, log_id)
        };

        metrics::counter!(m::SCANS_FAILED_TOTAL).increment(1);
        warn!(scan_id, reason = message, "scan failed");
        self.feed
            .emit(ChangeTable::Scans, ChangeKind::Update, scan_id, scan_id);
        self.feed
            .emit(ChangeTable::AnalysisLogs, ChangeKind::Insert, scan_id, &log_id);
        Ok(scan)
    }

    /// 스캔과 모든 하위 레코드를 삭제합니다.
    pub fn delete_scan(&self, scan_id: &str) -> Result<(), StoreError> {
        let deleted = {
            let conn = self.conn()?;
            conn.execute("DELETE FROM scans WHERE id = ?1", params![scan_id])?
        };
        if deleted == 0 {
            return Err(StoreError::scan_not_found(scan_id));
        }
        info!(scan_id, "scan deleted");
        self.feed
            .emit(ChangeTable::Scans, ChangeKind::Delete, scan_id, scan_id);
        Ok(())
    }

    /// `cutoff` 이전부터 갱신이 없는 진행 중 스캔 (`queued`는 제외)
    pub fn stale_scans(&self, cutoff: DateTime<Utc>) -> Result<Vec<Scan>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans
             WHERE status IN ('parsing', 'decompiling', 'analyzing', 'enriching')
               AND updated_at < ?1
             ORDER BY updated_at ASC"
        ))?;
        let rows = stmt.query_map(params![cutoff.timestamp_millis()], scan_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 상태별 스캔 수
    pub fn count_by_status(&self) -> Result<BTreeMap<String, usize>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM scans GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    // ─── 결과 레코드 ────────────────────────────────────────────────

    /// 취약점을 추가합니다. 종료된 스캔에는 쓸 수 없습니다.
    pub fn insert_vulnerability(
        &self,
        scan_id: &str,
        new: &NewVulnerability,
    ) -> Result<Vulnerability, StoreError> {
        new.validate().map_err(StoreError::InvalidRecord)?;
        let id = uuid::Uuid::new_v4().to_string();
        let enrichment = new
            .enrichment
            .as_ref()
            .filter(|e| !e.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        let record = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            ensure_writable(&tx, scan_id)?;
            let now = now_ms();
            tx.execute(
                "INSERT INTO vulnerabilities (id, scan_id, severity, cwe_id, cve_id, cvss_score,
                    title, description, affected_component, affected_function, code_snippet,
                    line_number, detection_method, remediation, attack_vector, impact,
                    enrichment, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?19)",
                params![
                    id,
                    scan_id,
                    new.severity.as_str(),
                    new.cwe_id,
                    new.cve_id,
                    new.cvss_score,
                    new.title,
                    new.description,
                    new.affected_component,
                    new.affected_function,
                    new.code_snippet,
                    new.line_number,
                    new.detection_method.as_str(),
                    new.remediation,
                    new.attack_vector,
                    new.impact,
                    enrichment,
                    VulnerabilityStatus::New.as_str(),
                    now,
                ],
            )?;
            touch_scan(&tx, scan_id, now)?;
            tx.commit()?;
            load_vulnerability(&conn, &id)?
        };

        self.feed.emit(
            ChangeTable::Vulnerabilities,
            ChangeKind::Insert,
            scan_id,
            &record.id,
        );
        Ok(record)
    }

    /// 컴플라이언스 판정을 추가합니다. 종료된 스캔에는 쓸 수 없습니다.
    pub fn insert_compliance_result(
        &self,
        scan_id: &str,
        new: &NewComplianceResult,
    ) -> Result<ComplianceResult, StoreError> {
        if new.rule_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "rule_id must not be empty".to_owned(),
            ));
        }
        let id = uuid::Uuid::new_v4().to_string();

        let record = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            ensure_writable(&tx, scan_id)?;
            let now = now_ms();
            tx.execute(
                "INSERT INTO compliance_results (id, scan_id, framework, rule_id,
                    rule_description, status, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    scan_id,
                    new.framework,
                    new.rule_id,
                    new.rule_description,
                    new.status.as_str(),
                    new.details,
                    now,
                ],
            )?;
            touch_scan(&tx, scan_id, now)?;
            tx.commit()?;
            ComplianceResult {
                id,
                scan_id: scan_id.to_owned(),
                detail: new.clone(),
                created_at: millis_to_datetime(now),
            }
        };

        self.feed.emit(
            ChangeTable::ComplianceResults,
            ChangeKind::Insert,
            scan_id,
            &record.id,
        );
        Ok(record)
    }

    /// SBOM 컴포넌트를 추가합니다. 종료된 스캔에는 쓸 수 없습니다.
    pub fn insert_sbom_component(
        &self,
        scan_id: &str,
        new: &NewSbomComponent,
    ) -> Result<SbomComponent, StoreError> {
        if new.component_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "component_name must not be empty".to_owned(),
            ));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let vulnerabilities = serde_json::to_string(&new.vulnerabilities)?;

        let record = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            ensure_writable(&tx, scan_id)?;
            let now = now_ms();
            tx.execute(
                "INSERT INTO sbom_components (id, scan_id, component_name, version, license,
                    source_file, vulnerabilities, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    scan_id,
                    new.component_name,
                    new.version,
                    new.license,
                    new.source_file,
                    vulnerabilities,
                    now,
                ],
            )?;
            touch_scan(&tx, scan_id, now)?;
            tx.commit()?;
            SbomComponent {
                id,
                scan_id: scan_id.to_owned(),
                detail: new.clone(),
                created_at: millis_to_datetime(now),
            }
        };

        self.feed.emit(
            ChangeTable::SbomComponents,
            ChangeKind::Insert,
            scan_id,
            &record.id,
        );
        Ok(record)
    }

    /// 분석 로그를 추가합니다. 종료된 스캔에도 허용됩니다.
    pub fn append_log(
        &self,
        scan_id: &str,
        stage: &str,
        level: LogLevel,
        message: &str,
    ) -> Result<AnalysisLog, StoreError> {
        let log = {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            scan_state(&tx, scan_id)?;
            let id = insert_log(&tx, scan_id, stage, level, message)?;
            tx.commit()?;
            conn.query_row(
                &format!("SELECT {LOG_COLUMNS} FROM analysis_logs WHERE id = ?1"),
                params![id],
                log_from_row,
            )?
        };

        self.feed.emit(
            ChangeTable::AnalysisLogs,
            ChangeKind::Insert,
            scan_id,
            &log.id,
        );
        Ok(log)
    }

    /// 취약점 검토 상태를 변경합니다. 심각도/CVSS는 바뀌지 않습니다.
    pub fn update_vulnerability_status(
        &self,
        vulnerability_id: &str,
        status: VulnerabilityStatus,
    ) -> Result<Vulnerability, StoreError> {
        let record = {
            let conn = self.conn()?;
            let updated = conn.execute(
                "UPDATE vulnerabilities SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![vulnerability_id, status.as_str(), now_ms()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "vulnerability",
                    id: vulnerability_id.to_owned(),
                });
            }
            load_vulnerability(&conn, vulnerability_id)?
        };

        info!(vulnerability_id, status = %status, "vulnerability status updated");
        self.feed.emit(
            ChangeTable::Vulnerabilities,
            ChangeKind::Update,
            &record.scan_id,
            &record.id,
        );
        Ok(record)
    }

    /// 취약점 단건 조회
    pub fn get_vulnerability(&self, vulnerability_id: &str) -> Result<Vulnerability, StoreError> {
        let conn = self.conn()?;
        load_vulnerability(&conn, vulnerability_id)
    }

    /// 스캔의 취약점 (최신 생성 순)
    pub fn list_vulnerabilities(&self, scan_id: &str) -> Result<Vec<Vulnerability>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {VULN_COLUMNS} FROM vulnerabilities WHERE scan_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![scan_id], vulnerability_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 스캔의 컴플라이언스 판정 (생성 순)
    pub fn list_compliance_results(
        &self,
        scan_id: &str,
    ) -> Result<Vec<ComplianceResult>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, framework, rule_id, rule_description, status, details, created_at
             FROM compliance_results WHERE scan_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![scan_id], |row| {
            Ok(ComplianceResult {
                id: row.get(0)?,
                scan_id: row.get(1)?,
                detail: NewComplianceResult {
                    framework: row.get(2)?,
                    rule_id: row.get(3)?,
                    rule_description: row.get(4)?,
                    status: parse_col(row, 5, ComplianceStatus::from_str_loose)?,
                    details: row.get(6)?,
                },
                created_at: millis_to_datetime(row.get(7)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 스캔의 SBOM 컴포넌트 (이름 순)
    pub fn list_sbom_components(&self, scan_id: &str) -> Result<Vec<SbomComponent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, component_name, version, license, source_file,
                vulnerabilities, created_at
             FROM sbom_components WHERE scan_id = ?1
             ORDER BY component_name ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![scan_id], |row| {
            Ok(SbomComponent {
                id: row.get(0)?,
                scan_id: row.get(1)?,
                detail: NewSbomComponent {
                    component_name: row.get(2)?,
                    version: row.get(3)?,
                    license: row.get(4)?,
                    source_file: row.get(5)?,
                    vulnerabilities: json_col(row, 6)?,
                },
                created_at: millis_to_datetime(row.get(7)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 스캔의 분석 로그 (생성 순)
    pub fn list_logs(&self, scan_id: &str) -> Result<Vec<AnalysisLog>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM analysis_logs WHERE scan_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![scan_id], log_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ─── 행 매핑 ──────────────────────────────────────────────────────

const SCAN_COLUMNS: &str = "id, ecu_name, ecu_type, version, manufacturer, platform, \
    architecture, file_name, file_size, file_hash, priority, compliance_frameworks, \
    deep_analysis, status, progress, risk_score, executive_summary, created_at, started_at, \
    completed_at, updated_at";

const VULN_COLUMNS: &str = "id, scan_id, severity, cwe_id, cve_id, cvss_score, title, \
    description, affected_component, affected_function, code_snippet, line_number, \
    detection_method, remediation, attack_vector, impact, enrichment, status, created_at, \
    updated_at";

const LOG_COLUMNS: &str = "id, scan_id, stage, log_level, message, created_at";

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<Scan> {
    Ok(Scan {
        id: row.get(0)?,
        ecu_name: row.get(1)?,
        ecu_type: parse_col(row, 2, EcuType::from_str_loose)?,
        version: row.get(3)?,
        manufacturer: row.get(4)?,
        platform: row.get(5)?,
        architecture: parse_col(row, 6, Architecture::from_str_loose)?,
        file_name: row.get(7)?,
        file_size: u64::try_from(row.get::<_, i64>(8)?).unwrap_or(0),
        file_hash: row.get(9)?,
        priority: parse_col(row, 10, Priority::from_str_loose)?,
        compliance_frameworks: json_col(row, 11)?,
        deep_analysis: row.get(12)?,
        status: parse_col(row, 13, ScanStatus::from_str_loose)?,
        progress: row.get(14)?,
        risk_score: row.get(15)?,
        executive_summary: row.get(16)?,
        created_at: millis_to_datetime(row.get(17)?),
        started_at: row.get::<_, Option<i64>>(18)?.map(millis_to_datetime),
        completed_at: row.get::<_, Option<i64>>(19)?.map(millis_to_datetime),
        updated_at: millis_to_datetime(row.get(20)?),
    })
}

fn vulnerability_from_row(row: &Row<'_>) -> rusqlite::Result<Vulnerability> {
    let enrichment = match row.get::<_, Option<String>>(16)? {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(16, Type::Text, e.into()))?,
        ),
        None => None,
    };
    Ok(Vulnerability {
        id: row.get(0)?,
        scan_id: row.get(1)?,
        detail: NewVulnerability {
            severity: parse_col(row, 2, Severity::from_str_loose)?,
            cwe_id: row.get(3)?,
            cve_id: row.get(4)?,
            cvss_score: row.get(5)?,
            title: row.get(6)?,
            description: row.get(7)?,
            affected_component: row.get(8)?,
            affected_function: row.get(9)?,
            code_snippet: row.get(10)?,
            line_number: row.get(11)?,
            detection_method: parse_col(row, 12, DetectionMethod::from_str_loose)?,
            remediation: row.get(13)?,
            attack_vector: row.get(14)?,
            impact: row.get(15)?,
            enrichment,
        },
        status: parse_col(row, 17, VulnerabilityStatus::from_str_loose)?,
        created_at: millis_to_datetime(row.get(18)?),
        updated_at: millis_to_datetime(row.get(19)?),
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisLog> {
    Ok(AnalysisLog {
        id: row.get(0)?,
        scan_id: row.get(1)?,
        stage: row.get(2)?,
        log_level: parse_col(row, 3, LogLevel::from_str_loose)?,
        message: row.get(4)?,
        created_at: millis_to_datetime(row.get(5)?),
    })
}

/// 텍스트 컬럼을 열거형으로 변환합니다.
fn parse_col<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value '{text}'").into(),
        )
    })
}

/// JSON 텍스트 컬럼을 역직렬화합니다.
fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

// ─── 트랜잭션 헬퍼 ────────────────────────────────────────────────

fn load_scan(conn: &Connection, scan_id: &str) -> Result<Scan, StoreError> {
    conn.query_row(
        &format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?1"),
        params![scan_id],
        scan_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::scan_not_found(scan_id))
}

fn load_vulnerability(conn: &Connection, id: &str) -> Result<Vulnerability, StoreError> {
    conn.query_row(
        &format!("SELECT {VULN_COLUMNS} FROM vulnerabilities WHERE id = ?1"),
        params![id],
        vulnerability_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound {
        entity: "vulnerability",
        id: id.to_owned(),
    })
}

fn scan_state(tx: &Transaction<'_>, scan_id: &str) -> Result<(ScanStatus, u8), StoreError> {
    tx.query_row(
        "SELECT status, progress FROM scans WHERE id = ?1",
        params![scan_id],
        |row| {
            Ok((
                parse_col(row, 0, ScanStatus::from_str_loose)?,
                row.get::<_, u8>(1)?,
            ))
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::scan_not_found(scan_id))
}

/// 스캔이 존재하고 종료되지 않았는지 확인합니다.
fn ensure_writable(tx: &Transaction<'_>, scan_id: &str) -> Result<(), StoreError> {
    let (status, _) = scan_state(tx, scan_id)?;
    if status.is_terminal() {
        return Err(StoreError::ScanTerminal {
            scan_id: scan_id.to_owned(),
            status,
        });
    }
    Ok(())
}

fn touch_scan(tx: &Transaction<'_>, scan_id: &str, now: i64) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE scans SET updated_at = ?2 WHERE id = ?1",
        params![scan_id, now],
    )?;
    Ok(())
}

fn insert_log(
    tx: &Transaction<'_>,
    scan_id: &str,
    stage: &str,
    level: LogLevel,
    message: &str,
) -> Result<String, StoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO analysis_logs (id, scan_id, stage, log_level, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, scan_id, stage, level.as_str(), message, now_ms()],
    )?;
    Ok(id)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
