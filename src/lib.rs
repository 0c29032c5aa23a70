//! 레플리카 캐시 클라이언트
//!
//! 하나의 primary와 여러 replica Redis 서버 앞에 놓이는 키-값 캐시 클라이언트입니다.
//! 쓰기는 primary로, 읽기는 replica로 분산하며, 서버마다 커넥션 풀을 하나씩
//! 지연 생성해 재사용합니다.
//!
//! # Features
//!
//! - **라우팅**: 쓰기는 항상 0번 서버, 읽기는 replica 중 무작위
//! - **풀 레지스트리**: 서버 인덱스당 풀 하나, 동시 최초 사용에도 중복 생성 없음
//! - **작업 파사드**: add / get / set / touch / delete / incr / 배치 작업 / clear
//! - **두 가지 호출 방식**: 비동기 `CacheClient`와 동기 `BlockingCacheClient`
//! - **플러그형 컴포넌트**: 직렬화기, 풀 클래스, 프로토콜 파서를 인스턴스나 이름으로 지정
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ BlockingCacheClient  │ ← 전용 스레드 + 런타임, 작업 후 커넥션 닫기
//! └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │     CacheClient      │ ← 작업 의미, 직렬화
//! └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │     PoolRegistry     │ ← 라우팅, 인덱스별 지연 풀 생성
//! └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ ConnectionPool (풀)  │ ← redis / memory
//! └──────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use replica_cache::caching::{CacheClient, ClientOptions, Timeout};
//!
//! let cache = CacheClient::from_location(
//!     "redis://primary:6379;redis://replica:6379",
//!     ClientOptions::default(),
//! )?;
//!
//! cache.set("c", &5, Timeout::Never).await?;
//! assert_eq!(cache.incr("c", 3).await?, 8);
//! ```

pub mod caching;
pub mod config;
pub mod core;
pub mod pool;
