//! 컴플라이언스 프레임워크 매칭과 통과율 집계
//!
//! 컴플라이언스 레코드의 프레임워크 이름은 자유 텍스트입니다. 고정된 별칭 테이블에 대한
//! 대소문자 무시 부분 문자열 매칭으로 표준 프레임워크에 연결합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ComplianceStatus, NewComplianceResult};

/// 표준 컴플라이언스 프레임워크
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    MisraC,
    Iso26262,
    Iso21434,
    Autosar,
    UneceWp29,
}

impl Framework {
    /// 표시 순서
    pub const ALL: [Framework; 5] = [
        Self::MisraC,
        Self::Iso26262,
        Self::Iso21434,
        Self::Autosar,
        Self::UneceWp29,
    ];

    /// 짧은 식별자
    pub fn id(self) -> &'static str {
        match self {
            Self::MisraC => "misra",
            Self::Iso26262 => "iso26262",
            Self::Iso21434 => "iso21434",
            Self::Autosar => "autosar",
            Self::UneceWp29 => "unece",
        }
    }

    /// 표시 이름
    pub fn display_name(self) -> &'static str {
        match self {
            Self::MisraC => "MISRA C:2023",
            Self::Iso26262 => "ISO 26262:2018",
            Self::Iso21434 => "ISO 21434:2021",
            Self::Autosar => "AUTOSAR R22-11",
            Self::UneceWp29 => "UNECE WP.29 R155",
        }
    }

    /// 부분 문자열 매칭에 사용하는 별칭
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::MisraC => &["MISRA"],
            Self::Iso26262 => &["ISO 26262", "iso26262", "ISO-26262"],
            Self::Iso21434 => &["ISO 21434", "iso21434", "ISO-21434", "ISO/SAE 21434"],
            Self::Autosar => &["AUTOSAR"],
            Self::UneceWp29 => &["UNECE", "WP.29", "R155", "R156"],
        }
    }

    /// 자유 텍스트 프레임워크 이름이 이 프레임워크에 해당하는지 확인합니다.
    pub fn matches(self, raw: &str) -> bool {
        let haystack = raw.to_lowercase();
        self.aliases()
            .iter()
            .any(|alias| haystack.contains(&alias.to_lowercase()))
    }

    /// 첫 번째로 매칭되는 프레임워크
    pub fn classify(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|framework| framework.matches(raw))
    }

    /// 업로드 시 선택한 프레임워크 식별자(`misra-c`, `iso-21434` 등)를 해석합니다.
    ///
    /// 소문자화 후 영숫자가 아닌 문자를 제거하고 비교합니다.
    pub fn from_selection(selection: &str) -> Option<Self> {
        let wanted = normalize(selection);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|framework| {
            let id = normalize(framework.id());
            wanted.starts_with(&id)
                || framework
                    .aliases()
                    .iter()
                    .any(|alias| normalize(alias) == wanted)
        })
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// 통과율 (0..=100, 반올림)
///
/// 결과가 없으면 0%입니다.
pub fn pass_rate(pass: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rate = (pass.min(total) as f64 / total as f64) * 100.0;
    rate.round() as u8
}

/// 프레임워크별 집계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkSummary {
    pub framework: Framework,
    pub name: &'static str,
    pub pass: usize,
    pub fail: usize,
    pub warning: usize,
    pub total: usize,
    pub pass_rate: u8,
}

/// 컴플라이언스 레코드를 표준 프레임워크별로 집계합니다.
///
/// 하나의 레코드가 여러 프레임워크 별칭에 매칭되면 각 프레임워크에 모두 집계됩니다.
/// 결과가 없는 프레임워크도 0%로 포함됩니다.
pub fn summarize<'a, I>(results: I) -> Vec<FrameworkSummary>
where
    I: IntoIterator<Item = &'a NewComplianceResult>,
{
    let results: Vec<&NewComplianceResult> = results.into_iter().collect();
    Framework::ALL
        .into_iter()
        .map(|framework| {
            let mut summary = FrameworkSummary {
                framework,
                name: framework.display_name(),
                pass: 0,
                fail: 0,
                warning: 0,
                total: 0,
                pass_rate: 0,
            };
            for result in results.iter().filter(|r| framework.matches(&r.framework)) {
                match result.status {
                    ComplianceStatus::Pass => summary.pass += 1,
                    ComplianceStatus::Fail => summary.fail += 1,
                    ComplianceStatus::Warning => summary.warning += 1,
                }
                summary.total += 1;
            }
            summary.pass_rate = pass_rate(summary.pass, summary.total);
            summary
        })
        .collect()
}

/// 스캔에 선택된 프레임워크 목록이 자유 텍스트 프레임워크 이름을 포함하는지 확인합니다.
///
/// 선택 목록이 비어 있으면 아무것도 매칭되지 않습니다.
pub fn selection_matches(selected: &[String], raw: &str) -> bool {
    selected
        .iter()
        .filter_map(|s| Framework::from_selection(s))
        .any(|framework| framework.matches(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(framework: &str, status: ComplianceStatus) -> NewComplianceResult {
        NewComplianceResult {
            framework: framework.to_owned(),
            rule_id: "R-1".to_owned(),
            rule_description: None,
            status,
            details: None,
        }
    }

    #[test]
    fn iso21434_aliases_match() {
        for raw in ["ISO 21434", "iso21434 clause 9", "ISO-21434", "ISO/SAE 21434:2021"] {
            assert!(Framework::Iso21434.matches(raw), "{raw}");
        }
        assert!(!Framework::Iso21434.matches("ISO 26262"));
    }

    #[test]
    fn unece_matches_regulation_numbers() {
        assert_eq!(Framework::classify("R155 CSMS"), Some(Framework::UneceWp29));
        assert_eq!(Framework::classify("UN R156"), Some(Framework::UneceWp29));
        assert_eq!(Framework::classify("CERT C"), None);
    }

    #[test]
    fn misra_matches_case_insensitively() {
        assert_eq!(Framework::classify("misra c:2012"), Some(Framework::MisraC));
    }

    #[test]
    fn pass_rate_zero_total_is_zero() {
        assert_eq!(pass_rate(0, 0), 0);
        assert_eq!(pass_rate(5, 0), 0);
    }

    #[test]
    fn pass_rate_rounds() {
        assert_eq!(pass_rate(1, 3), 33);
        assert_eq!(pass_rate(2, 3), 67);
        assert_eq!(pass_rate(3, 3), 100);
    }

    #[test]
    fn summarize_counts_per_framework() {
        let results = vec![
            result("ISO 21434", ComplianceStatus::Pass),
            result("ISO/SAE 21434", ComplianceStatus::Warning),
            result("MISRA C", ComplianceStatus::Fail),
        ];
        let summaries = summarize(&results);
        assert_eq!(summaries.len(), Framework::ALL.len());

        let iso = summaries
            .iter()
            .find(|s| s.framework == Framework::Iso21434)
            .unwrap();
        assert_eq!((iso.pass, iso.warning, iso.total), (1, 1, 2));
        assert_eq!(iso.pass_rate, 50);

        let misra = summaries
            .iter()
            .find(|s| s.framework == Framework::MisraC)
            .unwrap();
        assert_eq!(misra.pass_rate, 0);

        let autosar = summaries
            .iter()
            .find(|s| s.framework == Framework::Autosar)
            .unwrap();
        assert_eq!(autosar.total, 0);
        assert_eq!(autosar.pass_rate, 0);
    }

    #[test]
    fn upload_selection_ids_resolve() {
        assert_eq!(Framework::from_selection("misra-c"), Some(Framework::MisraC));
        assert_eq!(
            Framework::from_selection("iso-21434"),
            Some(Framework::Iso21434)
        );
        assert_eq!(
            Framework::from_selection("iso-26262"),
            Some(Framework::Iso26262)
        );
        assert_eq!(Framework::from_selection("autosar"), Some(Framework::Autosar));
        assert_eq!(Framework::from_selection("WP.29"), Some(Framework::UneceWp29));
        assert_eq!(Framework::from_selection("pci-dss"), None);
        assert_eq!(Framework::from_selection("--"), None);
    }

    #[test]
    fn selection_filters_by_framework() {
        assert!(!selection_matches(&[], "MISRA C:2012"));
        let selected = vec!["misra-c".to_owned()];
        assert!(selection_matches(&selected, "MISRA C:2012"));
        assert!(!selection_matches(&selected, "ISO 21434"));
    }
}
