//! 에러 타입: 도메인별 에러 정의

use crate::pipeline::ScanStatus;

/// ecuscan 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum EcuscanError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 파이프라인 상태 전이 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 분석 엔진 에러
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// 리포트 생성 에러
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스캔 상태 머신 위반
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// 종료 상태(complete, failed)에서는 더 이상 전이할 수 없음
    #[error("scan is already {0}; no further transitions allowed")]
    TerminalState(ScanStatus),

    /// 역방향 전이
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    /// 진행률 감소
    #[error("progress must not decrease ({from}% -> {to}%)")]
    ProgressRegression { from: u8, to: u8 },

    /// 진행률 범위 초과
    #[error("progress {0}% is out of range 0..=100")]
    ProgressOutOfRange(u8),

    /// complete 이외 상태에서 100%, 또는 complete인데 100% 미만
    #[error("progress {progress}% is not allowed for status {status}")]
    CompletionMismatch { status: ScanStatus, progress: u8 },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 레코드 없음
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 종료된 스캔에 결과 쓰기 시도
    #[error("scan {scan_id} is {status}; result writes are rejected")]
    ScanTerminal { scan_id: String, status: ScanStatus },

    /// 잘못된 레코드 값
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// 분석 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// 입력 소스 디코딩 실패 (base64 등)
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// 엔진이 지원하지 않는 소스
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    /// 외부 엔진/게이트웨이 호출 실패
    #[error("engine failure: {0}")]
    Engine(String),

    /// 엔진 응답 파싱 실패
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),
}

/// 리포트 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// 지원하지 않는 형식
    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    /// 렌더링 실패
    #[error("render failed: {0}")]
    Render(String),
}
