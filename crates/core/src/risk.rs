//! 위험도 점수 정책
//!
//! 분석 엔진이 점수를 제공하지 않을 때 심각도 개수로부터 0..=100 점수를 계산합니다.
//! 엔진이 제공한 점수는 [`clamp_score`]로 범위만 보정합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// 심각도별 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    /// 심각도 목록에서 개수를 집계합니다.
    pub fn from_severities<I>(severities: I) -> Self
    where
        I: IntoIterator<Item = Severity>,
    {
        let mut counts = Self::default();
        for severity in severities {
            counts.add(severity);
        }
        counts
    }

    /// 한 건을 더합니다.
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    /// 심각도에 해당하는 개수
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// 심각도 가중치 기반 점수 정책
///
/// `min(100, critical * critical_weight + high * high_weight + medium * medium_weight + base_offset)`
///
/// critical 가중치가 가장 커야 합니다. [`RiskPolicy::validate`]가 이를 확인합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub critical_weight: u32,
    pub high_weight: u32,
    pub medium_weight: u32,
    pub base_offset: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            critical_weight: 25,
            high_weight: 15,
            medium_weight: 0,
            base_offset: 20,
        }
    }
}

impl RiskPolicy {
    /// SAST 엔진용 프리셋 (medium도 소폭 반영)
    pub fn sast() -> Self {
        Self {
            critical_weight: 25,
            high_weight: 15,
            medium_weight: 5,
            base_offset: 10,
        }
    }

    /// critical 우위와 offset 범위를 확인합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.critical_weight < self.high_weight || self.high_weight < self.medium_weight {
            return Err(format!(
                "weights must satisfy critical >= high >= medium (got {}/{}/{})",
                self.critical_weight, self.high_weight, self.medium_weight
            ));
        }
        if self.base_offset > 100 {
            return Err(format!("base_offset {} exceeds 100", self.base_offset));
        }
        Ok(())
    }

    /// 심각도 개수로 점수를 계산합니다. 결과는 항상 0..=100입니다.
    pub fn score(&self, counts: &SeverityCounts) -> u8 {
        let critical = u32::try_from(counts.critical).unwrap_or(u32::MAX);
        let high = u32::try_from(counts.high).unwrap_or(u32::MAX);
        let medium = u32::try_from(counts.medium).unwrap_or(u32::MAX);
        let raw = critical
            .saturating_mul(self.critical_weight)
            .saturating_add(high.saturating_mul(self.high_weight))
            .saturating_add(medium.saturating_mul(self.medium_weight))
            .saturating_add(self.base_offset);
        // min(100) 이후이므로 u8 범위 안
        raw.min(100) as u8
    }
}

/// 엔진이 보고한 점수를 0..=100으로 보정합니다.
///
/// NaN은 0으로 취급합니다.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// 점수 구간 라벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// 80 이상 Critical, 60 이상 High, 40 이상 Medium, 그 외 Low
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Critical,
            60..=79 => Self::High,
            40..=59 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_findings_dominate_and_cap_at_hundred() {
        let counts = SeverityCounts::from_severities([
            Severity::Critical,
            Severity::Critical,
            Severity::High,
        ]);
        // 25*2 + 15 + 20 = 85
        assert_eq!(RiskPolicy::default().score(&counts), 85);

        let counts = SeverityCounts::from_severities([
            Severity::Critical,
            Severity::Critical,
            Severity::Critical,
            Severity::High,
        ]);
        assert_eq!(RiskPolicy::default().score(&counts), 100);
    }

    #[test]
    fn single_high_scores_thirty_five() {
        let counts = SeverityCounts::from_severities([Severity::High]);
        assert_eq!(RiskPolicy::default().score(&counts), 35);
    }

    #[test]
    fn no_findings_scores_base_offset() {
        assert_eq!(RiskPolicy::default().score(&SeverityCounts::default()), 20);
    }

    #[test]
    fn medium_and_low_do_not_contribute() {
        let counts = SeverityCounts::from_severities([
            Severity::Medium,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ]);
        assert_eq!(RiskPolicy::default().score(&counts), 20);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn sast_preset_counts_medium() {
        let counts = SeverityCounts::from_severities([Severity::High, Severity::Medium]);
        assert_eq!(RiskPolicy::sast().score(&counts), 30);
    }

    #[test]
    fn validate_rejects_inverted_weights() {
        let policy = RiskPolicy {
            critical_weight: 10,
            high_weight: 15,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        assert!(RiskPolicy::default().validate().is_ok());
        assert!(RiskPolicy::sast().validate().is_ok());
    }

    #[test]
    fn huge_counts_saturate() {
        let counts = SeverityCounts {
            critical: usize::MAX,
            ..Default::default()
        };
        assert_eq!(RiskPolicy::default().score(&counts), 100);
    }

    #[test]
    fn clamp_score_bounds() {
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(150.0), 100);
        assert_eq!(clamp_score(72.4), 72);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
    }

    // Property-based tests using proptest
    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn score_is_always_capped(
                critical in 0usize..10_000,
                high in 0usize..10_000,
                medium in 0usize..10_000,
                base_offset in 0u32..=100,
            ) {
                let policy = RiskPolicy { base_offset, ..RiskPolicy::sast() };
                let counts = SeverityCounts { critical, high, medium, low: 0, info: 0 };
                prop_assert!(policy.score(&counts) <= 100);
            }

            #[test]
            fn adding_a_critical_never_lowers_score(critical in 0usize..20, high in 0usize..20) {
                let policy = RiskPolicy::default();
                let before = SeverityCounts { critical, high, ..Default::default() };
                let after = SeverityCounts { critical: critical + 1, high, ..Default::default() };
                prop_assert!(policy.score(&after) >= policy.score(&before));
            }

            #[test]
            fn clamp_score_stays_in_range(raw in any::<f64>()) {
                prop_assert!(clamp_score(raw) <= 100);
            }
        }
    }
}
