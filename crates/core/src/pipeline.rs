//! 스캔 파이프라인 상태 머신
//!
//! 정상 진행 순서는 전순서이고, `failed`는 종료되지 않은 모든 상태에서 도달 가능한
//! 흡수 상태입니다.
//!
//! ```text
//! queued → parsing → decompiling → analyzing → enriching → complete
//!    └──────────┴───────────┴────────────┴───────────┴──────→ failed
//! ```
//!
//! 이 모듈은 전이를 스케줄링하지 않습니다. 외부 드라이버(파이프라인 실행기 또는
//! 호환 드라이버)가 요청한 `(status, progress)` 변경이 유효한지만 판정합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// dyn-호환 trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 스캔 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// 생성 직후, 분석 대기
    Queued,
    /// 입력 파싱
    Parsing,
    /// 디컴파일
    Decompiling,
    /// 정적/AI 분석
    Analyzing,
    /// 결과 보강 및 저장
    Enriching,
    /// 완료 (종료 상태)
    Complete,
    /// 실패 (종료 상태)
    Failed,
}

impl ScanStatus {
    /// 실행기가 순서대로 방문하는 단계
    pub const STAGES: [ScanStatus; 5] = [
        Self::Parsing,
        Self::Decompiling,
        Self::Analyzing,
        Self::Enriching,
        Self::Complete,
    ];

    /// 정상 진행 순서상의 위치. `failed`는 순서 밖입니다.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::Parsing => Some(1),
            Self::Decompiling => Some(2),
            Self::Analyzing => Some(3),
            Self::Enriching => Some(4),
            Self::Complete => Some(5),
            Self::Failed => None,
        }
    }

    /// 종료 상태 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// 드라이버가 작업 중인 상태 여부 (parsing..enriching)
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Parsing | Self::Decompiling | Self::Analyzing | Self::Enriching
        )
    }

    /// 단계 진입 시 기록하는 표준 진행률
    ///
    /// `failed`는 진행률을 바꾸지 않으므로 `None`입니다.
    pub fn stage_progress(self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::Parsing => Some(10),
            Self::Decompiling => Some(30),
            Self::Analyzing => Some(50),
            Self::Enriching => Some(75),
            Self::Complete => Some(100),
            Self::Failed => None,
        }
    }

    /// 상태 순서만 고려한 전이 가능 여부
    ///
    /// 같은 상태로의 재설정(단계 내 진행률 갱신)은 허용하고, 앞으로 건너뛰는 것도
    /// 허용합니다. 역방향과 종료 상태 이탈은 거부합니다.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target >= current,
            (None, Some(_)) => false,
        }
    }

    /// DB/API 표현
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Parsing => "parsing",
            Self::Decompiling => "decompiling",
            Self::Analyzing => "analyzing",
            Self::Enriching => "enriching",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// 문자열에서 상태를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "parsing" => Some(Self::Parsing),
            "decompiling" => Some(Self::Decompiling),
            "analyzing" => Some(Self::Analyzing),
            "enriching" => Some(Self::Enriching),
            "complete" | "completed" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(from, from_progress)`에서 `(to, to_progress)`로의 변경을 검증합니다.
///
/// 거부 조건:
/// - 종료 상태에서의 모든 변경
/// - 역방향 전이
/// - 진행률 감소 또는 100 초과
/// - `complete`가 아닌 상태에서 100%, `complete`인데 100% 미만
pub fn validate_transition(
    from: ScanStatus,
    from_progress: u8,
    to: ScanStatus,
    to_progress: u8,
) -> Result<(), PipelineError> {
    if from.is_terminal() {
        return Err(PipelineError::TerminalState(from));
    }
    if !from.can_transition_to(to) {
        return Err(PipelineError::InvalidTransition { from, to });
    }
    if to_progress > 100 {
        return Err(PipelineError::ProgressOutOfRange(to_progress));
    }
    if to_progress < from_progress {
        return Err(PipelineError::ProgressRegression {
            from: from_progress,
            to: to_progress,
        });
    }
    let completes = to == ScanStatus::Complete;
    if completes != (to_progress == 100) {
        return Err(PipelineError::CompletionMismatch {
            status: to,
            progress: to_progress,
        });
    }
    Ok(())
}

/// 컴포넌트 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}
