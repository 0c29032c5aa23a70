//! # Core Module
//!
//! 캐시 클라이언트 전반에서 공유하는 기반 기능을 제공합니다.
//!
//! ## 모듈 구성
//!
//! ### [`registry`] - 컴포넌트 레지스트리
//! - **Component**: 인스턴스 / 팩토리 / 이름 중 하나로 지정되는 플러그형 설정값
//! - **ComponentRegistry**: `inventory` 기반 내장 구현 + 호스트 등록 이름 해석
//! - **지연 해석**: 클라이언트 생성 시가 아니라 최초 사용 시점에 해석
//!
//! ### [`errors`] - 통합 에러 처리
//! - **CacheError**: `thiserror` 기반 에러 분류 (`NotFound`, `Transport`, `Configuration` …)
//! - **ErrorContext**: 파싱 실패 등을 설정 에러로 변환하는 확장 트레이트
//!
//! ## 트러블슈팅
//!
//! ### 등록되지 않은 이름
//! ```text
//! Configuration error: unknown serializer 'msgpack' (available: json)
//! ```
//! **해결**: 애플리케이션 시작 시 `ComponentRegistry::register()`로 등록하거나
//! 내장 이름을 사용하세요.

pub mod errors;
pub mod registry;

pub use errors::*;
pub use registry::*;
