//! 분석 실행기 에러 타입
//!
//! [`ExecutorError`]는 파이프라인 실행 중 발생하는 엔진 에러와 스토어 에러를 함께 표현합니다.
//! `From<ExecutorError> for EcuscanError` 변환으로 상위 레이어에서 `?`로 전파할 수 있습니다.

use ecuscan_core::error::{AnalysisError, EcuscanError};
use ecuscan_store::StoreError;

/// 파이프라인 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// 분석 엔진 또는 입력 소스 에러
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// 스캔 상태 갱신 등 스토어 에러
    #[error(transparent)]
    Store(#[from] StoreError),

    /// SAST 규칙 컴파일 실패
    #[error("rule compile error: rule '{rule_id}': {reason}")]
    RuleCompile {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 종료 신호로 실행 중단
    #[error("analysis cancelled")]
    Cancelled,
}

impl From<ExecutorError> for EcuscanError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Analysis(e) => EcuscanError::Analysis(e),
            ExecutorError::Store(e) => e.into(),
            ExecutorError::RuleCompile { rule_id, reason } => EcuscanError::Analysis(
                AnalysisError::Engine(format!("rule '{rule_id}': {reason}")),
            ),
            ExecutorError::Cancelled => {
                EcuscanError::Analysis(AnalysisError::Engine("analysis cancelled".to_owned()))
            }
        }
    }
}
