//! # Configuration Module
//!
//! 캐시 클라이언트의 설정 관리를 담당하는 모듈입니다.
//! 호스트 애플리케이션의 설정 블록(JSON) 또는 환경 변수에서 서버 목록,
//! 기본 만료 시간, 컴포넌트 이름, 드라이버 옵션을 읽어 클라이언트를 만듭니다.
//!
//! ## 모듈 구성
//!
//! - [`cache_config`] - `CacheConfig`, 서버 위치와 옵션 파싱
//!
//! ## 설계 원칙
//!
//! ### 1. 부작용 없는 생성
//!
//! 설정을 읽고 클라이언트를 만드는 동안 네트워크에 접속하지 않습니다.
//! 서버 목록만 즉시 검증하고, 컴포넌트 이름과 드라이버 옵션은 최초 사용 시 검증됩니다.
//!
//! ### 2. 환경 분리
//!
//! 바이너리는 `PROFILE`에 따라 `.env.dev` / `.env.prod` / `.env`를 먼저 읽고,
//! 그 다음 `CacheConfig::from_env()`를 호출합니다.
//!
//! ## 사용 예제
//!
//! ```rust,ignore
//! use replica_cache::config::CacheConfig;
//!
//! let cache = CacheConfig::from_env()?.into_client()?;
//! ```
//!
//! ## 환경 변수 설정 가이드
//!
//! ```bash
//! # 서버 목록 (첫 번째가 primary)
//! export CACHE_LOCATION="redis://primary:6379;redis://replica-1:6379;redis://replica-2:6379"
//!
//! # 기본 만료 시간 (초, none이면 만료 없음)
//! export CACHE_TIMEOUT="300"
//!
//! # 컴포넌트
//! export CACHE_SERIALIZER="json"
//! export CACHE_POOL_CLASS="redis"
//! export CACHE_PARSER_CLASS="resp2"
//!
//! # 드라이버 옵션
//! export CACHE_OPTIONS="db=1&max_idle=8&connect_timeout=2"
//! ```

pub mod cache_config;

pub use cache_config::{CacheConfig, CacheOptions, DEFAULT_LOCATION, Location};
