//! 정체 스캔 정리
//!
//! 진행 중 상태(parsing..enriching)에서 `timeout` 동안 갱신이 없는 스캔을
//! `failed`로 전환합니다. `queued` 스캔은 대상이 아닙니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ecuscan_core::metrics as m;
use ecuscan_store::{ScanStore, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 정체 스캔을 한 번 정리하고 실패 처리한 스캔 ID를 반환합니다.
pub fn sweep_stale(store: &ScanStore, timeout: Duration) -> Result<Vec<String>, StoreError> {
    let timeout_chrono = chrono::Duration::from_std(timeout)
        .map_err(|e| StoreError::Other(format!("invalid stale timeout: {e}")))?;
    let Some(cutoff) = Utc::now().checked_sub_signed(timeout_chrono) else {
        return Ok(Vec::new());
    };

    let reason = format!("timed out after {}s without progress", timeout.as_secs());
    let mut swept = Vec::new();
    for scan in store.stale_scans(cutoff)? {
        if fail_stale(store, &scan.id, scan.status.as_str(), &reason)? {
            swept.push(scan.id);
        }
    }
    Ok(swept)
}

/// 정체 스캔 하나를 실패 처리합니다.
///
/// 조회 이후 완료되었거나 삭제된 스캔은 건너뛰고 `false`를 반환합니다.
fn fail_stale(store: &ScanStore, scan_id: &str, stage: &str, reason: &str) -> Result<bool, StoreError> {
    match store.fail(scan_id, reason) {
        Ok(_) => {
            metrics::counter!(m::SCANS_TIMED_OUT_TOTAL).increment(1);
            info!(scan_id, stage, "stale scan failed");
            Ok(true)
        }
        Err(StoreError::Pipeline(e)) => {
            debug!(scan_id, error = %e, "stale scan already finished");
            Ok(false)
        }
        Err(StoreError::NotFound { .. }) => {
            debug!(scan_id, "stale scan deleted before sweep");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// 주기적으로 [`sweep_stale`]을 실행하는 태스크를 시작합니다.
pub fn spawn_sweeper(
    store: Arc<ScanStore>,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            timeout_secs = timeout.as_secs(),
            interval_secs = interval.as_secs(),
            "stale scan sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("stale scan sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match sweep_stale(&store, timeout) {
                        Ok(swept) if !swept.is_empty() => {
                            info!(count = swept.len(), "stale scans swept");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "stale scan sweep failed"),
                    }
                }
            }
        }
    })
}
