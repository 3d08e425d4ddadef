//! ecuscan 스캔 저장소
//!
//! 스캔과 하위 레코드(취약점, 컴플라이언스 판정, SBOM 컴포넌트, 분석 로그)를
//! SQLite에 영속화하고, 커밋된 변경을 [`ChangeFeed`]로 발행합니다.
//!
//! # 모듈 구조
//!
//! - [`store`]: 스캔 수명주기와 결과 레코드 CRUD (`ScanStore`)
//! - [`feed`]: 변경 이벤트 브로드캐스트 (`ChangeFeed`)
//! - [`schema`]: 테이블 정의와 연결 초기화
//! - [`error`]: 스토어 에러 (`StoreError`)
//!
//! # 불변식
//!
//! - 스캔 상태는 [`ecuscan_core::validate_transition`]을 통과한 경우에만 바뀝니다.
//! - `complete`/`failed` 스캔에는 결과 레코드를 쓸 수 없습니다. 분석 로그는 예외입니다.
//! - 스캔 삭제는 모든 하위 레코드를 함께 삭제합니다.

pub mod error;
pub mod feed;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use feed::ChangeFeed;
pub use store::{ScanCompletion, ScanStore};
