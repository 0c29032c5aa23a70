//! # Connection Pool Module
//!
//! 서버별 커넥션 풀과 드라이버 추상화를 담당하는 모듈입니다.
//! 캐시 파사드는 여기 정의된 트레이트만 알고, 실제 와이어 프로토콜은
//! 각 풀 클래스(`redis`, `memory`)가 처리합니다.
//!
//! ## 모듈 구성
//!
//! - [`redis_pool`] - `redis` 크레이트 기반 풀 (기본 풀 클래스 `"redis"`)
//! - [`memory_pool`] - 프로세스 내 메모리 풀 (`"memory"`, 테스트/로컬 개발용)
//! - [`parser`] - 프로토콜 파서 선택 (`"resp2"`, `"resp3"`)
//!
//! ## 구성 요소
//!
//! | 타입 | 역할 |
//! |------|------|
//! | [`CacheConnection`] | 드라이버 명령 집합 (GET/SET/MGET/DEL/EXPIRE/PERSIST/INCRBY/EXISTS/TTL/FLUSHDB/파이프라인) |
//! | [`ConnectionPool`] | 한 서버에 대한 커넥션 재사용 |
//! | [`PoolFactory`] | 주소 + 파서 + 옵션으로 풀 생성 (풀 클래스) |
//! | [`PooledConnection`] | 작업 하나가 소유하는 RAII 커넥션 핸들 |
//! | [`PoolSlots`] | 풀 구현이 공유하는 유휴 목록/개수 관리 |
//!
//! ## 커넥션 생명주기
//!
//! ```text
//! PooledConnection::acquire(pool, close)
//!    ├─ close=false → 유휴 커넥션 재사용, 없으면 새로 연결
//!    ├─ close=true  → 유휴 목록을 거치지 않고 항상 새로 연결
//!    ├─ 드라이버 명령 실행 (전송 계층 에러 시 invalid 표시)
//!    └─ Drop
//!         ├─ invalid 또는 close=true → 폐기
//!         └─ 그 외 → 유휴 목록으로 반환
//! ```

pub mod memory_pool;
pub mod parser;
pub mod redis_pool;

#[cfg(test)]
pub(crate) mod stub_server;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use crate::core::errors::{CacheError, CacheResult, ErrorContext};
use crate::core::registry::Registrable;

pub use memory_pool::{MemoryPool, MemoryPoolFactory};
pub use parser::{ProtocolParser, Resp2Parser, Resp3Parser};
pub use redis_pool::{RedisConnectionPool, RedisPoolFactory};

/// 키의 만료 상태 (Redis TTL 의미 그대로)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// 키가 없거나 이미 만료됨
    Missing,
    /// 만료 시간이 없는 키
    NoExpiry,
    /// 지정된 시간 후 만료
    ExpiresIn(Duration),
}

impl KeyTtl {
    /// 서버의 TTL 응답(-2, -1, 초)을 변환합니다.
    pub fn from_reply(seconds: i64) -> Self {
        match seconds {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::NoExpiry,
            s => KeyTtl::ExpiresIn(Duration::from_secs(s as u64)),
        }
    }
}

/// 파이프라인으로 묶어 보낼 수 있는 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    /// 여러 키를 한 번에 저장 (만료 시간 없음)
    MSet(Vec<(String, Vec<u8>)>),
    /// 키에 만료 시간 설정 (0이면 즉시 삭제)
    Expire { key: String, seconds: u64 },
}

/// 한 서버와의 커넥션이 제공하는 드라이버 명령 집합
///
/// 구현체는 한 번에 하나의 작업만 사용하므로 `Sync`가 필요하지 않습니다.
#[async_trait]
pub trait CacheConnection: Send {
    async fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// `SET key value [EX seconds] [NX]`. 값이 저장되었는지 반환합니다.
    async fn set(&mut self, key: &str, value: &[u8], expiry: Option<u64>, only_if_absent: bool) -> CacheResult<bool>;

    /// 요청한 키 순서대로 값(또는 `None`)을 반환합니다.
    async fn mget(&mut self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>>;

    /// 삭제된 키 개수
    async fn delete(&mut self, keys: &[String]) -> CacheResult<u64>;

    async fn expire(&mut self, key: &str, seconds: u64) -> CacheResult<bool>;

    /// 만료 시간을 제거하고, 키가 존재했는지 반환합니다.
    ///
    /// Redis `PERSIST`는 만료 시간이 없던 키에 대해 0을 돌려주므로,
    /// 구현체는 존재 여부를 같은 원자적 단위 안에서 함께 확인해야 합니다.
    async fn persist(&mut self, key: &str) -> CacheResult<bool>;

    async fn incr(&mut self, key: &str, delta: i64) -> CacheResult<i64>;

    async fn exists(&mut self, key: &str) -> CacheResult<bool>;

    async fn ttl(&mut self, key: &str) -> CacheResult<KeyTtl>;

    /// 선택된 서버의 현재 DB 전체 삭제
    async fn flush(&mut self) -> CacheResult<()>;

    /// 명령들을 하나의 원자적 파이프라인으로 실행합니다.
    async fn pipeline(&mut self, commands: &[DriverCommand]) -> CacheResult<()>;
}

/// 풀 상태 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
}

/// 한 서버에 대한 커넥션 풀
///
/// 풀은 클라이언트 수명 동안 공유되며 여러 스레드/작업에서 동시에
/// 획득·반환될 수 있어야 합니다.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// 이 풀이 연결하는 서버 주소
    fn address(&self) -> &str;

    /// 유휴 커넥션을 꺼내거나 새로 연결합니다.
    async fn acquire(&self) -> CacheResult<Box<dyn CacheConnection>>;

    /// 유휴 목록을 거치지 않고 새로 연결합니다. 커넥션 수 제한은 그대로 적용됩니다.
    ///
    /// 닫을 예정인 커넥션에 사용합니다. 유휴 커넥션은 다른 런타임에서 만들어졌을 수 있습니다.
    async fn open(&self) -> CacheResult<Box<dyn CacheConnection>>;

    /// 재사용 가능한 커넥션을 유휴 목록으로 돌려놓습니다.
    fn release(&self, connection: Box<dyn CacheConnection>);

    /// 커넥션을 닫고 슬롯을 반납합니다.
    fn discard(&self, connection: Box<dyn CacheConnection>);

    /// 유휴 커넥션을 모두 닫고, 닫은 개수를 반환합니다.
    fn disconnect(&self) -> usize;

    fn stats(&self) -> PoolStats;
}

/// 풀 클래스: 서버 주소로부터 풀을 만드는 생성자
///
/// `create`는 네트워크에 접속하지 않아야 합니다. 실제 연결은 첫 `acquire`에서 일어납니다.
pub trait PoolFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(
        &self,
        address: &str,
        parser: &dyn ProtocolParser,
        options: &PoolOptions,
    ) -> CacheResult<Arc<dyn ConnectionPool>>;
}

/// 링크 타임 풀 클래스 등록 정보
pub struct PoolFactoryRegistration {
    pub name: &'static str,
    pub constructor: fn() -> Arc<dyn PoolFactory>,
}

inventory::collect!(PoolFactoryRegistration);

impl Registrable for dyn PoolFactory {
    const KIND: &'static str = "pool class";

    fn builtin(name: &str) -> Option<Arc<Self>> {
        for registration in inventory::iter::<PoolFactoryRegistration> {
            if registration.name == name {
                return Some((registration.constructor)());
            }
        }
        None
    }

    fn builtin_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        for registration in inventory::iter::<PoolFactoryRegistration> {
            names.push(registration.name);
        }
        names
    }
}

/// 풀 클래스에 그대로 전달되는 드라이버 옵션 (`key=value`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOptions {
    values: BTreeMap<String, String>,
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 옵션을 추가한 새 값을 반환합니다 (빌더 스타일).
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 옵션 값을 파싱합니다. 값이 없으면 `Ok(None)`.
    pub fn parse<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("invalid pool option {}={:?}", key, raw)),
            None => Ok(None),
        }
    }

    /// 풀 클래스가 모르는 옵션이 있으면 설정 에러를 반환합니다.
    pub fn ensure_known(&self, known: &[&str], pool_class: &str) -> CacheResult<()> {
        let unknown: Vec<&str> = self
            .values
            .keys()
            .map(String::as_str)
            .filter(|key| !known.contains(key))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Configuration(format!(
                "pool class '{}' does not accept option(s): {}",
                pool_class,
                unknown.join(", ")
            )))
        }
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for PoolOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = PoolOptions::new();
        for (key, value) in iter {
            options.insert(key, value);
        }
        options
    }
}

/// 풀 크기 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// 유지할 최대 유휴 커넥션 수
    pub max_idle: usize,
    /// 최대 전체 커넥션 수 (유휴 + 사용 중). `None`이면 제한 없음
    pub max_connections: Option<usize>,
}

impl PoolLimits {
    pub const DEFAULT_MAX_IDLE: usize = 8;

    pub fn from_options(options: &PoolOptions) -> CacheResult<Self> {
        Ok(Self {
            max_idle: options.parse("max_idle")?.unwrap_or(Self::DEFAULT_MAX_IDLE),
            max_connections: options.parse("max_connections")?,
        })
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_idle: Self::DEFAULT_MAX_IDLE,
            max_connections: None,
        }
    }
}

struct SlotState {
    idle: VecDeque<Box<dyn CacheConnection>>,
    total: usize,
}

/// 풀 구현이 공유하는 유휴 커넥션 목록과 전체 개수 관리
///
/// 뮤텍스는 유휴 커넥션을 옮기는 동안에만 잡으며, 연결 중에는 잡지 않습니다.
pub struct PoolSlots {
    limits: PoolLimits,
    state: Mutex<SlotState>,
}

impl PoolSlots {
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(SlotState {
                idle: VecDeque::with_capacity(limits.max_idle),
                total: 0,
            }),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// 유휴 커넥션을 재사용하거나 `open`으로 새 커넥션을 만듭니다.
    ///
    /// 최대 커넥션 수에 도달했으면 기다리지 않고 `PoolExhausted`를 반환합니다.
    pub async fn checkout<F, Fut>(&self, address: &str, open: F) -> CacheResult<Box<dyn CacheConnection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Box<dyn CacheConnection>>>,
    {
        if let Some(connection) = self.pop_idle() {
            debug!("Reusing idle connection to {}", address);
            return Ok(connection);
        }

        self.open_new(address, open).await
    }

    /// 유휴 목록과 관계없이 `open`으로 새 커넥션을 만듭니다.
    pub async fn open_new<F, Fut>(&self, address: &str, open: F) -> CacheResult<Box<dyn CacheConnection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Box<dyn CacheConnection>>>,
    {
        if !self.try_reserve() {
            return Err(CacheError::PoolExhausted(address.to_string()));
        }

        match open().await {
            Ok(connection) => {
                debug!("Opened new connection to {}", address);
                Ok(connection)
            }
            Err(e) => {
                self.release_slot();
                Err(e)
            }
        }
    }

    /// 커넥션을 유휴 목록으로 반환합니다. 유휴 목록이 가득 차면 닫습니다.
    pub fn checkin(&self, connection: Box<dyn CacheConnection>) {
        let overflow = {
            let mut state = self.state.lock().expect("pool mutex poisoned");
            if state.idle.len() < self.limits.max_idle {
                state.idle.push_back(connection);
                None
            } else {
                state.total = state.total.saturating_sub(1);
                Some(connection)
            }
        };
        drop(overflow);
    }

    pub fn discard(&self, connection: Box<dyn CacheConnection>) {
        self.release_slot();
        drop(connection);
    }

    /// 유휴 커넥션을 모두 닫습니다.
    pub fn drain_idle(&self) -> usize {
        let drained: Vec<Box<dyn CacheConnection>> = {
            let mut state = self.state.lock().expect("pool mutex poisoned");
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            drained
        };
        drained.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().expect("pool mutex poisoned");
        PoolStats {
            idle: state.idle.len(),
            in_use: state.total.saturating_sub(state.idle.len()),
        }
    }

    fn pop_idle(&self) -> Option<Box<dyn CacheConnection>> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        state.idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        if let Some(max) = self.limits.max_connections {
            if state.total >= max {
                return false;
            }
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        state.total = state.total.saturating_sub(1);
    }
}

/// 작업 하나가 소유하는 RAII 커넥션 핸들
///
/// Drop 시점에 커넥션을 풀로 돌려놓거나 닫습니다. 에러로 조기 반환하는
/// 경로에서도 동일하게 동작하므로 커넥션이 새지 않습니다.
///
/// - 전송 계층 에러가 한 번이라도 발생하면 커넥션은 재사용되지 않습니다.
/// - `close`가 켜져 있으면 정상 종료여도 커넥션을 닫습니다.
pub struct PooledConnection {
    pool: Arc<dyn ConnectionPool>,
    connection: Option<Box<dyn CacheConnection>>,
    valid: bool,
    close: bool,
}

impl PooledConnection {
    /// `close`가 켜져 있으면 유휴 커넥션을 재사용하지 않고 새로 연결합니다.
    pub async fn acquire(pool: Arc<dyn ConnectionPool>, close: bool) -> CacheResult<Self> {
        let connection = if close {
            pool.open().await?
        } else {
            pool.acquire().await?
        };
        Ok(Self {
            pool,
            connection: Some(connection),
            valid: true,
            close,
        })
    }

    pub fn address(&self) -> &str {
        self.pool.address()
    }

    fn connection(&mut self) -> &mut (dyn CacheConnection + 'static) {
        match self.connection.as_deref_mut() {
            Some(connection) => connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }

    fn track<T>(&mut self, result: CacheResult<T>) -> CacheResult<T> {
        if let Err(e) = &result {
            if e.is_connection_fatal() {
                self.valid = false;
            }
        }
        result
    }

    pub async fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let result = self.connection().get(key).await;
        self.track(result)
    }

    pub async fn set(&mut self, key: &str, value: &[u8], expiry: Option<u64>, only_if_absent: bool) -> CacheResult<bool> {
        let result = self.connection().set(key, value, expiry, only_if_absent).await;
        self.track(result)
    }

    pub async fn mget(&mut self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let result = self.connection().mget(keys).await;
        self.track(result)
    }

    pub async fn delete(&mut self, keys: &[String]) -> CacheResult<u64> {
        let result = self.connection().delete(keys).await;
        self.track(result)
    }

    pub async fn expire(&mut self, key: &str, seconds: u64) -> CacheResult<bool> {
        let result = self.connection().expire(key, seconds).await;
        self.track(result)
    }

    pub async fn persist(&mut self, key: &str) -> CacheResult<bool> {
        let result = self.connection().persist(key).await;
        self.track(result)
    }

    pub async fn incr(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
        let result = self.connection().incr(key, delta).await;
        self.track(result)
    }

    pub async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let result = self.connection().exists(key).await;
        self.track(result)
    }

    pub async fn ttl(&mut self, key: &str) -> CacheResult<KeyTtl> {
        let result = self.connection().ttl(key).await;
        self.track(result)
    }

    pub async fn flush(&mut self) -> CacheResult<()> {
        let result = self.connection().flush().await;
        self.track(result)
    }

    pub async fn pipeline(&mut self, commands: &[DriverCommand]) -> CacheResult<()> {
        let result = self.connection().pipeline(commands).await;
        self.track(result)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => return,
        };

        if !self.valid {
            warn!("Discarding broken connection to {}", self.pool.address());
            self.pool.discard(connection);
        } else if self.close {
            debug!("Closing connection to {} after use", self.pool.address());
            self.pool.discard(connection);
        } else {
            self.pool.release(connection);
        }
    }
}
