//! 스토어 에러 타입

use ecuscan_core::error::{EcuscanError, PipelineError, StorageError};
use ecuscan_core::pipeline::ScanStatus;

/// 스토어 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 에러
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON 컬럼 직렬화 에러
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 레코드 없음
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 종료된 스캔에 결과 쓰기 시도
    #[error("scan {scan_id} is {status}; result writes are rejected")]
    ScanTerminal { scan_id: String, status: ScanStatus },

    /// 분석 시작 요청 시 스캔이 `queued`가 아님
    #[error("scan {scan_id} is {status}; only queued scans can be started")]
    NotQueued { scan_id: String, status: ScanStatus },

    /// 상태 전이 위반
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// 레코드 값 검증 실패
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// 기타 (디렉토리 생성, 잠금 오염 등)
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub(crate) fn scan_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "scan",
            id: id.to_owned(),
        }
    }
}

impl From<StoreError> for EcuscanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Pipeline(e) => EcuscanError::Pipeline(e),
            StoreError::NotQueued { status, .. } => {
                EcuscanError::Pipeline(PipelineError::InvalidTransition {
                    from: status,
                    to: ScanStatus::Parsing,
                })
            }
            StoreError::NotFound { entity, id } => {
                EcuscanError::Storage(StorageError::NotFound { entity, id })
            }
            StoreError::ScanTerminal { scan_id, status } => {
                EcuscanError::Storage(StorageError::ScanTerminal { scan_id, status })
            }
            StoreError::InvalidRecord(msg) => {
                EcuscanError::Storage(StorageError::InvalidRecord(msg))
            }
            StoreError::Other(msg) => EcuscanError::Storage(StorageError::Connection(msg)),
            other => EcuscanError::Storage(StorageError::Query(other.to_string())),
        }
    }
}
