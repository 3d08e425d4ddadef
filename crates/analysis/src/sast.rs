//! 패턴 기반 SAST 엔진
//!
//! 업로드된 소스 파일을 [`RuleSet`]으로 줄 단위 검사합니다.
//! 텍스트가 아닌 이미지는 검사하지 않고 메모만 남깁니다.

use ecuscan_core::error::AnalysisError;
use ecuscan_core::pipeline::BoxFuture;
use ecuscan_core::risk::RiskPolicy;
use ecuscan_core::types::Scan;
use tracing::debug;

use crate::engine::{AnalysisFindings, Analyzer};
use crate::error::ExecutorError;
use crate::rules::RuleSet;
use crate::source::{AnalysisSource, is_text_file};

/// SAST 엔진
pub struct SastAnalyzer {
    rules: RuleSet,
    policy: RiskPolicy,
}

impl SastAnalyzer {
    /// 내장 규칙으로 엔진을 만듭니다.
    pub fn new() -> Result<Self, ExecutorError> {
        Ok(Self::with_rules(RuleSet::builtin()?))
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules,
            policy: RiskPolicy::sast(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn scan_binary(&self, file_name: &str, content: &[u8]) -> AnalysisFindings {
        if !is_text_file(file_name) {
            return AnalysisFindings {
                notes: vec![format!(
                    "Skipping pattern analysis: {file_name} is not a text source"
                )],
                ..Default::default()
            };
        }

        let text = String::from_utf8_lossy(content);
        let vulnerabilities = self.rules.scan_file(file_name, &text);
        debug!(
            file = file_name,
            rules = self.rules.len(),
            findings = vulnerabilities.len(),
            "pattern scan finished"
        );

        let mut findings = AnalysisFindings {
            notes: vec![format!(
                "SAST found {} potential issues",
                vulnerabilities.len()
            )],
            vulnerabilities,
            ..Default::default()
        };
        findings.risk_score = Some(self.policy.score(&findings.severity_counts()));
        findings
    }
}

impl Analyzer for SastAnalyzer {
    fn name(&self) -> &str {
        "sast"
    }

    fn analyze<'a>(
        &'a self,
        _scan: &'a Scan,
        source: &'a AnalysisSource,
    ) -> BoxFuture<'a, Result<AnalysisFindings, AnalysisError>> {
        Box::pin(async move {
            match source {
                AnalysisSource::Binary { file_name, content } => {
                    Ok(self.scan_binary(file_name, content))
                }
                AnalysisSource::Repository(repo) => Err(AnalysisError::UnsupportedSource(format!(
                    "sast engine cannot fetch repository {}",
                    repo.slug()
                ))),
            }
        })
    }
}
