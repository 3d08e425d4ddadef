//! 리포트 생성 에러

use ecuscan_core::error::{EcuscanError, ReportError};
use ecuscan_store::StoreError;

/// 리포트 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    /// 형식 또는 렌더링 에러
    #[error(transparent)]
    Report(#[from] ReportError),

    /// 스캔/하위 레코드 조회 실패
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ReportingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Report(ReportError::Render(err.to_string()))
    }
}

impl From<ReportingError> for EcuscanError {
    fn from(err: ReportingError) -> Self {
        match err {
            ReportingError::Report(e) => EcuscanError::Report(e),
            ReportingError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_keeps_message() {
        let err = ReportingError::from(ReportError::UnsupportedFormat("pdf".to_owned()));
        assert_eq!(err.to_string(), "unsupported report format: pdf");
        assert!(matches!(EcuscanError::from(err), EcuscanError::Report(_)));
    }
}
