//! 파이프라인 실행기 -- 스캔 하나를 queued부터 complete(또는 failed)까지 구동합니다.
//!
//! # 단계
//!
//! | 상태 | 진행률 | 작업 |
//! |------|--------|------|
//! | parsing | 10 | 소스 설명, 해시 확인, 미리보기 |
//! | decompiling | 30 | 대기 |
//! | analyzing | 50 | [`Analyzer`] 호출 |
//! | enriching | 75 | 보강, 결과 저장, 요약 로그 |
//! | complete | 100 | 위험도와 요약 기록 |
//!
//! 어느 단계에서든 에러가 나면 스캔을 `failed`로 기록하고 에러를 반환합니다.
//! 결과 레코드 저장은 건별 best-effort이며 실패한 건은 경고 로그와 메트릭으로 남습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ecuscan_core::metrics as m;
use ecuscan_core::pipeline::ScanStatus;
use ecuscan_core::risk::RiskPolicy;
use ecuscan_core::types::{DetectionMethod, LogLevel, Scan, Severity};
use ecuscan_store::{ScanCompletion, ScanStore, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{AnalysisFindings, Analyzer};
use crate::error::ExecutorError;
use crate::gateway::{LlmGateway, enrich_vulnerability};
use crate::source::{AnalysisSource, preview, sha256_hex};

/// 기본 단계 간 대기 시간
pub const DEFAULT_STAGE_DELAY: Duration = Duration::from_millis(500);

/// 파이프라인 실행기
///
/// 복제 비용이 낮으며(`Arc` 필드), 스캔마다 독립된 tokio 태스크로 실행됩니다.
#[derive(Clone)]
pub struct PipelineExecutor {
    store: Arc<ScanStore>,
    analyzer: Arc<dyn Analyzer>,
    gateway: Option<Arc<dyn LlmGateway>>,
    policy: RiskPolicy,
    stage_delay: Duration,
    cancel: CancellationToken,
}

impl PipelineExecutor {
    pub fn new(store: Arc<ScanStore>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            store,
            analyzer,
            gateway: None,
            policy: RiskPolicy::default(),
            stage_delay: DEFAULT_STAGE_DELAY,
            cancel: CancellationToken::new(),
        }
    }

    /// deep analysis 보강용 게이트웨이
    pub fn with_gateway(mut self, gateway: Arc<dyn LlmGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_policy(mut self, policy: RiskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// 종료 시 진행 중인 실행을 중단시키는 토큰
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<ScanStore> {
        &self.store
    }

    pub fn engine_name(&self) -> &str {
        self.analyzer.name()
    }

    /// 스캔을 시작 상태로 전환한 뒤 백그라운드 태스크로 실행합니다.
    ///
    /// 전환은 호출 시점에 동기적으로 일어나므로 `queued`가 아니면 즉시
    /// [`StoreError::NotQueued`]를 반환합니다.
    pub fn spawn(
        &self,
        scan_id: &str,
        source: AnalysisSource,
    ) -> Result<JoinHandle<Result<Scan, ExecutorError>>, ExecutorError> {
        let scan = self.store.begin(scan_id)?;
        let executor = self.clone();
        Ok(tokio::spawn(async move { executor.drive(scan, source).await }))
    }

    /// 현재 태스크에서 끝까지 실행합니다.
    pub async fn run(&self, scan_id: &str, source: AnalysisSource) -> Result<Scan, ExecutorError> {
        let scan = self.store.begin(scan_id)?;
        self.drive(scan, source).await
    }

    async fn drive(&self, scan: Scan, source: AnalysisSource) -> Result<Scan, ExecutorError> {
        let engine = self.analyzer.name().to_owned();
        let started = Instant::now();
        metrics::counter!(m::SCANS_STARTED_TOTAL, m::LABEL_ENGINE => engine.clone()).increment(1);
        metrics::gauge!(m::SCANS_IN_FLIGHT).increment(1.0);
        info!(
            scan_id = %scan.id,
            engine = %engine,
            source = source.kind(),
            "analysis started"
        );

        let result = self.stages(&scan, &source).await;

        metrics::gauge!(m::SCANS_IN_FLIGHT).decrement(1.0);
        metrics::histogram!(m::PIPELINE_SCAN_DURATION_SECONDS, m::LABEL_ENGINE => engine)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(done) => {
                info!(
                    scan_id = %done.id,
                    risk_score = ?done.risk_score,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "analysis complete"
                );
                Ok(done)
            }
            Err(err) => {
                error!(scan_id = %scan.id, error = %err, "analysis failed");
                if let Err(record_err) = self.store.fail(&scan.id, &err.to_string()) {
                    warn!(
                        scan_id = %scan.id,
                        error = %record_err,
                        "could not record scan failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn stages(&self, scan: &Scan, source: &AnalysisSource) -> Result<Scan, ExecutorError> {
        let stage = ScanStatus::Parsing.as_str();
        self.log(&scan.id, stage, LogLevel::Info, &source.describe())?;
        if let AnalysisSource::Binary { file_name, content } = source {
            self.check_content(scan, file_name, content)?;
        }
        self.pause().await?;

        self.enter(&scan.id, ScanStatus::Decompiling)?;
        self.pause().await?;

        self.enter(&scan.id, ScanStatus::Analyzing)?;
        let findings = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ExecutorError::Cancelled),
            found = self.analyzer.analyze(scan, source) => found?,
        };
        for note in &findings.notes {
            self.log(&scan.id, ScanStatus::Analyzing.as_str(), LogLevel::Info, note)?;
        }
        self.pause().await?;

        self.enter(&scan.id, ScanStatus::Enriching)?;
        let mut findings = findings;
        if scan.deep_analysis {
            self.enrich(scan, &mut findings).await?;
        }
        self.persist(&scan.id, &findings);
        self.summary_logs(&scan.id, &findings)?;

        let risk_score = findings
            .risk_score
            .map(|score| score.min(100))
            .unwrap_or_else(|| self.policy.score(&findings.severity_counts()));
        let total = findings.vulnerabilities.len();
        let mut completion = ScanCompletion::new(risk_score).with_message(format!(
            "Analysis complete - Found {total} total findings, Risk Score: {risk_score}"
        ));
        if let Some(summary) = findings.executive_summary {
            completion = completion.with_summary(summary);
        }
        Ok(self.store.complete(&scan.id, &completion)?)
    }

    fn enter(&self, scan_id: &str, status: ScanStatus) -> Result<(), ExecutorError> {
        let progress = status.stage_progress().unwrap_or(0);
        self.store.advance(scan_id, status, progress)?;
        debug!(scan_id, stage = status.as_str(), progress, "stage entered");
        Ok(())
    }

    fn log(
        &self,
        scan_id: &str,
        stage: &str,
        level: LogLevel,
        message: &str,
    ) -> Result<(), ExecutorError> {
        self.store.append_log(scan_id, stage, level, message)?;
        Ok(())
    }

    /// 단계 사이 대기. 종료 신호가 오면 중단합니다.
    async fn pause(&self) -> Result<(), ExecutorError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        if self.stage_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ExecutorError::Cancelled),
            _ = tokio::time::sleep(self.stage_delay) => Ok(()),
        }
    }

    fn check_content(
        &self,
        scan: &Scan,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), ExecutorError> {
        let stage = ScanStatus::Parsing.as_str();
        let digest = sha256_hex(content);
        self.log(&scan.id, stage, LogLevel::Info, &format!("SHA-256: {digest}"))?;

        let declared = scan
            .file_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.eq_ignore_ascii_case(&digest));
        if let Some(declared) = declared {
            warn!(scan_id = %scan.id, declared, actual = %digest, "file hash mismatch");
            self.log(
                &scan.id,
                stage,
                LogLevel::Warning,
                &format!("Declared file hash {declared} does not match content hash {digest}"),
            )?;
        }
        debug!(scan_id = %scan.id, preview = %preview(file_name, content), "content preview");
        Ok(())
    }

    async fn enrich(&self, scan: &Scan, findings: &mut AnalysisFindings) -> Result<(), ExecutorError> {
        let stage = ScanStatus::Enriching.as_str();
        let Some(gateway) = self.gateway.as_ref() else {
            self.log(
                &scan.id,
                stage,
                LogLevel::Info,
                "Deep analysis requested but no AI gateway is configured",
            )?;
            return Ok(());
        };

        let targets = findings
            .vulnerabilities
            .iter()
            .filter(|v| v.severity >= Severity::High)
            .count();
        if targets == 0 {
            return Ok(());
        }
        self.log(
            &scan.id,
            stage,
            LogLevel::Info,
            &format!("Enriching {targets} critical/high findings with AI analysis"),
        )?;

        let mut enriched = 0usize;
        for vuln in findings
            .vulnerabilities
            .iter_mut()
            .filter(|v| v.severity >= Severity::High)
        {
            if self.cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            if enrich_vulnerability(gateway.as_ref(), vuln).await {
                enriched += 1;
            }
        }
        if enriched < targets {
            self.log(
                &scan.id,
                stage,
                LogLevel::Warning,
                &format!("Enrichment unavailable for {} of {targets} findings", targets - enriched),
            )?;
        }
        Ok(())
    }

    /// 결과 레코드를 건별로 저장합니다. 실패한 건은 건너뜁니다.
    fn persist(&self, scan_id: &str, findings: &AnalysisFindings) {
        for vuln in &findings.vulnerabilities {
            match self.store.insert_vulnerability(scan_id, vuln) {
                Ok(_) => {
                    metrics::counter!(
                        m::PIPELINE_FINDINGS_TOTAL,
                        m::LABEL_SEVERITY => vuln.severity.as_str()
                    )
                    .increment(1);
                }
                Err(e) => insert_failed(scan_id, "vulnerabilities", &vuln.title, &e),
            }
        }
        for result in &findings.compliance_results {
            if let Err(e) = self.store.insert_compliance_result(scan_id, result) {
                insert_failed(scan_id, "compliance_results", &result.rule_id, &e);
            }
        }
        for component in &findings.sbom_components {
            if let Err(e) = self.store.insert_sbom_component(scan_id, component) {
                insert_failed(scan_id, "sbom_components", &component.component_name, &e);
            }
        }
    }

    fn summary_logs(&self, scan_id: &str, findings: &AnalysisFindings) -> Result<(), ExecutorError> {
        let stage = ScanStatus::Enriching.as_str();
        let critical = findings.severity_counts().critical;
        if critical > 0 {
            self.log(
                scan_id,
                stage,
                LogLevel::Error,
                &format!("CRITICAL: Found {critical} critical vulnerability(ies)"),
            )?;
        }
        let secrets = findings.count_by_method(DetectionMethod::Secrets);
        if secrets > 0 {
            self.log(
                scan_id,
                stage,
                LogLevel::Error,
                &format!("SECRETS DETECTED: Found {secrets} hardcoded secrets/credentials"),
            )?;
        }
        let pii = findings.count_by_method(DetectionMethod::Pii);
        if pii > 0 {
            self.log(
                scan_id,
                stage,
                LogLevel::Warning,
                &format!("PII DETECTED: Found {pii} instances of personal data"),
            )?;
        }
        Ok(())
    }
}

fn insert_failed(scan_id: &str, table: &'static str, record: &str, err: &StoreError) {
    metrics::counter!(m::PIPELINE_INSERT_FAILURES_TOTAL, m::LABEL_TABLE => table).increment(1);
    warn!(scan_id, table, record, error = %err, "result insert failed; skipping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecuscan_core::types::NewScan;
    use ecuscan_store::ChangeFeed;

    use crate::simulated::SimulatedAnalyzer;

    fn executor() -> PipelineExecutor {
        let store = Arc::new(ScanStore::open_in_memory(ChangeFeed::default()).unwrap());
        PipelineExecutor::new(store, Arc::new(SimulatedAnalyzer::new()))
            .with_stage_delay(Duration::ZERO)
    }

    fn binary() -> AnalysisSource {
        AnalysisSource::Binary {
            file_name: "bcm.bin".to_owned(),
            content: vec![1, 2, 3],
        }
    }

    fn new_scan() -> NewScan {
        NewScan {
            ecu_name: "BCM".to_owned(),
            version: "1.0".to_owned(),
            file_name: "bcm.bin".to_owned(),
            file_size: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn binary_run_scores_with_policy() {
        let exec = executor();
        let scan = exec.store().create_scan(&new_scan()).unwrap();

        let done = exec.run(&scan.id, binary()).await.unwrap();

        assert_eq!(done.status, ScanStatus::Complete);
        assert_eq!(done.progress, 100);
        // 1 critical, 2 high: 25 + 30 + 20
        assert_eq!(done.risk_score, Some(75));
        assert_eq!(exec.store().list_vulnerabilities(&scan.id).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let exec = executor();
        let scan = exec.store().create_scan(&new_scan()).unwrap();
        exec.run(&scan.id, binary()).await.unwrap();

        let err = exec.run(&scan.id, binary()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Store(StoreError::NotQueued { .. })));
    }

    #[tokio::test]
    async fn cancelled_run_fails_the_scan() {
        let cancel = CancellationToken::new();
        let exec = executor().with_cancellation(cancel.clone());
        let scan = exec.store().create_scan(&new_scan()).unwrap();
        cancel.cancel();

        let err = exec.run(&scan.id, binary()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
        let stored = exec.store().get_scan(&scan.id).unwrap();
        assert_eq!(stored.status, ScanStatus::Failed);
    }
}
