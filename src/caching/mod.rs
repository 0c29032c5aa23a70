//! 캐싱 계층 모듈
//!
//! primary/replica Redis 서버 묶음을 대상으로 하는 캐시 클라이언트를 제공합니다.
//!
//! # 주요 기능
//!
//! - 쓰기는 primary, 읽기는 replica로 보내는 라우팅
//! - 서버별 커넥션 풀의 지연 생성 (인덱스당 하나)
//! - 비동기 API와, 같은 구현 위에 얹은 블로킹 API
//! - 교체 가능한 직렬화기 (기본 JSON)
//!
//! # 모듈 구성
//!
//! - [`router`] - `ServerList`, `PoolRegistry`
//! - [`client`] - 비동기 작업 파사드 `CacheClient`
//! - [`blocking`] - 동기 어댑터 `BlockingCacheClient`
//! - [`serializer`] - `Serializer` 트레이트와 `JsonSerializer`
//! - [`timeout`] - `Timeout` 해석
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use replica_cache::caching::{BlockingCacheClient, CacheClient, ClientOptions, Timeout};
//!
//! let cache = CacheClient::from_location("redis://primary:6379;redis://replica:6379", ClientOptions::default())?;
//! cache.set("user:123", &user_data, Timeout::Seconds(3600)).await?;
//! let cached: Option<User> = cache.get("user:123", None).await?;
//!
//! // 동기 코드에서는
//! let blocking = BlockingCacheClient::new(&cache);
//! blocking.delete("user:123")?;
//! ```
//!
//! # 환경 설정
//!
//! ```bash
//! CACHE_LOCATION=redis://primary:6379;redis://replica:6379
//! CACHE_TIMEOUT=300
//! ```

pub mod blocking;
pub mod client;
pub mod router;
pub mod serializer;
pub mod timeout;

pub use blocking::BlockingCacheClient;
pub use client::{CacheClient, ClientOptions, DEFAULT_TIMEOUT};
pub use router::{PoolRegistry, ServerList};
pub use serializer::{JsonSerializer, Serializer};
pub use timeout::Timeout;
