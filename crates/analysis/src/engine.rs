//! 분석 엔진 trait -- 파이프라인의 analyzing 단계 확장 포인트
//!
//! 엔진은 스캔 메타데이터와 입력 소스를 받아 [`AnalysisFindings`]를 돌려줍니다.
//! 결과 저장, 상태 전이, 위험도 계산은 실행기가 담당합니다.
//!
//! `Arc<dyn Analyzer>`로 설정에 따라 런타임에 엔진을 고를 수 있도록
//! [`BoxFuture`]를 반환합니다.

use ecuscan_core::error::AnalysisError;
use ecuscan_core::pipeline::BoxFuture;
use ecuscan_core::risk::SeverityCounts;
use ecuscan_core::types::{
    DetectionMethod, NewComplianceResult, NewSbomComponent, NewVulnerability, Scan,
};

use crate::source::AnalysisSource;

/// 분석 엔진
pub trait Analyzer: Send + Sync {
    /// 엔진 이름 (메트릭 레이블, 로그)
    fn name(&self) -> &str;

    /// 소스를 분석합니다.
    fn analyze<'a>(
        &'a self,
        scan: &'a Scan,
        source: &'a AnalysisSource,
    ) -> BoxFuture<'a, Result<AnalysisFindings, AnalysisError>>;
}

/// 엔진 결과
#[derive(Debug, Clone, Default)]
pub struct AnalysisFindings {
    pub vulnerabilities: Vec<NewVulnerability>,
    pub compliance_results: Vec<NewComplianceResult>,
    pub sbom_components: Vec<NewSbomComponent>,
    pub executive_summary: Option<String>,
    /// 엔진이 직접 산정한 점수. `None`이면 실행기의 정책 점수를 사용합니다.
    pub risk_score: Option<u8>,
    /// analyzing 단계 로그로 남길 엔진 메모
    pub notes: Vec<String>,
}

impl AnalysisFindings {
    /// 취약점 심각도 집계
    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::from_severities(self.vulnerabilities.iter().map(|v| v.severity))
    }

    /// 특정 탐지 방법으로 나온 취약점 수
    pub fn count_by_method(&self, method: DetectionMethod) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.detection_method == method)
            .count()
    }

    pub fn total_records(&self) -> usize {
        self.vulnerabilities.len() + self.compliance_results.len() + self.sbom_components.len()
    }
}
