//! ecuscan 분석 파이프라인
//!
//! 스캔 하나를 queued부터 complete까지 구동하는 실행기와 교체 가능한 분석 엔진을 제공합니다.
//!
//! # 모듈 구성
//!
//! - [`executor`]: 단계 전이, 결과 저장, 위험도 산정 (`PipelineExecutor`)
//! - [`engine`]: 분석 엔진 trait (`Analyzer`)와 결과 (`AnalysisFindings`)
//! - [`simulated`]: 고정 결과 엔진
//! - [`sast`]: 정규식 규칙 기반 정적 분석 엔진
//! - [`rules`]: SAST 규칙 테이블과 사전 컴파일된 `RuleSet`
//! - [`gateway`]: LLM 게이트웨이 trait, 응답 해석, 보강
//! - [`http_gateway`]: OpenAI 호환 chat completions 게이트웨이 (`ChatGateway`)
//! - [`source`]: 분석 입력 (업로드 바이너리 / 원격 저장소)
//! - [`sweep`]: 정체 스캔 정리
//! - [`error`]: 실행기 에러
//!
//! # 흐름
//!
//! ```text
//! begin(queued -> parsing) -> decompiling -> analyzing(Analyzer) -> enriching(LlmGateway) -> complete
//!                                                                        |
//!                                                        insert vulnerabilities / compliance / sbom
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod http_gateway;
pub mod rules;
pub mod sast;
pub mod simulated;
pub mod source;
pub mod sweep;

use std::sync::Arc;

use ecuscan_core::config::AnalysisConfig;
use ecuscan_core::error::AnalysisError;

pub use engine::{AnalysisFindings, Analyzer};
pub use error::ExecutorError;
pub use executor::PipelineExecutor;
pub use gateway::{AnalysisPrompt, GatewayAnalyzer, GatewayReport, LlmGateway};
pub use http_gateway::ChatGateway;
pub use rules::RuleSet;
pub use sast::SastAnalyzer;
pub use simulated::SimulatedAnalyzer;
pub use source::{AnalysisSource, GitProvider, RepositoryRef};
pub use sweep::{spawn_sweeper, sweep_stale};

/// `gateway_url`이 설정되어 있으면 LLM 게이트웨이를 만듭니다.
pub fn gateway_from_config(
    config: &AnalysisConfig,
) -> Result<Option<Arc<dyn LlmGateway>>, ExecutorError> {
    if !config.gateway_enabled() {
        return Ok(None);
    }
    Ok(Some(Arc::new(ChatGateway::from_config(config)?)))
}

/// 설정의 엔진 이름으로 분석 엔진을 만듭니다.
pub fn analyzer_from_config(config: &AnalysisConfig) -> Result<Arc<dyn Analyzer>, ExecutorError> {
    match config.engine.as_str() {
        "sast" => Ok(Arc::new(SastAnalyzer::new()?)),
        "simulated" => Ok(Arc::new(SimulatedAnalyzer::new())),
        "ai" => match gateway_from_config(config)? {
            Some(gateway) => Ok(Arc::new(GatewayAnalyzer::new(gateway))),
            None => Err(ExecutorError::Analysis(AnalysisError::Engine(
                "engine 'ai' requires analysis.gateway_url".to_owned(),
            ))),
        },
        other => Err(ExecutorError::Analysis(AnalysisError::Engine(format!(
            "unknown engine '{other}'"
        )))),
    }
}
