//! ecuscan 스캔 리포트
//!
//! 스캔 메타데이터, 위험도, 취약점, 컴플라이언스 집계, SBOM을 하나의 문서로 만듭니다.
//!
//! # 모듈 구성
//!
//! - [`generator`]: 스토어 조회(`collect`)와 렌더링(`render`, `generate`)
//! - [`types`]: `ReportFormat`, `ScanReport`, `ReportDocument`
//! - [`error`]: `ReportingError`

pub mod error;
pub mod generator;
pub mod types;

pub use error::ReportingError;
pub use generator::{collect, generate, render};
pub use types::{ReportDocument, ReportFormat, SbomEntry, ScanReport};
