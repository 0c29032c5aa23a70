//! # Cache Error Handling System
//!
//! 캐시 클라이언트 전역에서 사용하는 통합 에러 타입입니다.
//! `thiserror` 기반으로 정의되며, 드라이버(`redis`) 에러는 가공하지 않고
//! 그대로 호출자에게 전달합니다.
//!
//! ## 에러 분류
//!
//! | 변형 | 발생 지점 | 비고 |
//! |------|-----------|------|
//! | `NotFound` | `incr` / `decr` | 키가 없을 때만 발생 |
//! | `Transport` | 모든 드라이버 호출 | 재시도 없이 그대로 전파 |
//! | `Configuration` | 서버 목록, 컴포넌트 이름, 풀 옵션 | 컴포넌트 관련 오류는 최초 사용 시점에 발생 |
//! | `Serialization` | 값 인코딩/디코딩 | |
//! | `PoolExhausted` | 커넥션 획득 | `max_connections` 초과 |
//! | `Runtime` | 블로킹 어댑터 | 런타임 생성 실패 |
//!
//! ## 사용 패턴
//!
//! ```rust,ignore
//! use replica_cache::core::errors::CacheError;
//!
//! match cache.incr("counter", 1).await {
//!     Ok(value) => println!("현재 값: {}", value),
//!     Err(CacheError::NotFound(key)) => println!("{} 키가 없습니다", key),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// 캐시 클라이언트 전역 에러 타입
#[derive(Error, Debug)]
pub enum CacheError {
    /// `incr`/`decr` 대상 키가 존재하지 않음
    #[error("Key '{0}' not found.")]
    NotFound(String),

    /// 서버 연결 또는 통신 실패 (드라이버 에러 원본)
    #[error("Transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 풀의 최대 커넥션 수에 도달함
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// 블로킹 호출용 런타임을 만들지 못함
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CacheError {
    /// `incr`의 키 부재 에러인지 확인합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// 커넥션을 더 이상 재사용할 수 없는 전송 계층 에러인지 확인합니다.
    ///
    /// 서버가 돌려준 명령 에러(예: 정수가 아닌 값에 대한 INCRBY)는
    /// 커넥션 자체는 정상이므로 `false`입니다.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            CacheError::Transport(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// 캐시 작업 결과 타입
pub type CacheResult<T> = Result<T, CacheError>;

/// 외부 에러에 설정 컨텍스트를 덧붙여 `CacheError::Configuration`으로 변환합니다.
///
/// 환경 변수나 풀 옵션 파싱처럼 "잘못된 설정"으로 분류되는 실패에 사용합니다.
///
/// ```rust,ignore
/// let max_idle: usize = raw.parse().context("max_idle must be an integer")?;
/// ```
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> CacheResult<T>;

    fn with_context<F>(self, f: F) -> CacheResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> CacheResult<T> {
        self.map_err(|e| CacheError::Configuration(format!("{}: {}", msg, e)))
    }

    fn with_context<F>(self, f: F) -> CacheResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CacheError::Configuration(format!("{}: {}", f(), e)))
    }
}
