//! # 캐시 작업 파사드
//!
//! [`CacheClient`]는 primary/replica 서버 묶음 위에서 균일한 캐시 작업을 제공하는
//! 비동기 클라이언트입니다. 모든 작업은 같은 흐름을 따릅니다.
//!
//! ```text
//! 작업(key, value, timeout)
//!    ├─ PoolRegistry::pool_for(key, write)   ← 쓰기는 primary, 읽기는 replica
//!    ├─ PooledConnection::acquire(pool)      ← 작업 하나가 커넥션 하나를 소유
//!    ├─ 드라이버 명령 (필요하면 원자적 파이프라인)
//!    ├─ 값 인코딩/디코딩 (Serializer)
//!    └─ Drop: 커넥션 반환 또는 닫기         ← 에러 경로 포함
//! ```
//!
//! ## 작업 의미
//!
//! | 작업 | 서버 | 동작 |
//! |------|------|------|
//! | `add` | primary | `SET NX`. timeout 0이면 성공 시 바로 삭제하고 성공 여부만 반환 |
//! | `get` | replica | 값이 없으면 `default` |
//! | `set` | primary | timeout 0이면 `DEL` |
//! | `touch` | primary | `Never`면 `PERSIST`, 아니면 `EXPIRE`. 키 존재 여부 반환 |
//! | `delete` | primary | 키가 있었는지 반환 |
//! | `get_many` | replica | 존재하는 키만 담은 맵 |
//! | `has_key` | replica | `EXISTS` |
//! | `incr` / `decr` | primary | 키가 없으면 `CacheError::NotFound` |
//! | `set_many` | primary | `MSET` + 키별 `EXPIRE`를 하나의 원자적 파이프라인으로 |
//! | `delete_many` | primary | 없는 키는 무시 |
//! | `clear` | primary | `FLUSHDB` (되돌릴 수 없음) |
//!
//! 키는 호출자가 이미 네임스페이스/버전을 붙인 최종 키입니다.
//!
//! ## 사용 예제
//!
//! ```rust,ignore
//! use replica_cache::caching::{CacheClient, ClientOptions, ServerList, Timeout};
//!
//! let servers = ServerList::parse("redis://primary:6379;redis://replica:6379")?;
//! let cache = CacheClient::new(servers, ClientOptions::default());
//!
//! cache.set("user:1", &user, Timeout::Seconds(60)).await?;
//! let cached: Option<User> = cache.get("user:1", None).await?;
//!
//! match cache.incr("visits", 1).await {
//!     Ok(count) => println!("방문 수: {}", count),
//!     Err(e) if e.is_not_found() => cache.set("visits", &1, Timeout::Never).await?,
//!     Err(e) => return Err(e),
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;
use serde::{Serialize, de::DeserializeOwned};

use crate::caching::router::{PoolRegistry, ServerList};
use crate::caching::serializer::Serializer;
use crate::caching::timeout::Timeout;
use crate::core::errors::{CacheError, CacheResult};
use crate::core::registry::Component;
use crate::pool::{DriverCommand, KeyTtl, PoolFactory, PoolOptions, PooledConnection, ProtocolParser};

/// 기본 만료 시간 (초)
pub const DEFAULT_TIMEOUT: u64 = 300;

/// 클라이언트 구성 옵션
///
/// 컴포넌트는 인스턴스, 팩토리, 등록 이름 중 하나로 지정하며 최초 사용 시 해석됩니다.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub serializer: Component<dyn Serializer>,
    pub pool_class: Component<dyn PoolFactory>,
    pub parser_class: Component<dyn ProtocolParser>,
    /// 풀 클래스에 그대로 전달되는 드라이버 옵션
    pub pool_options: PoolOptions,
    /// `Timeout::Default`가 가리키는 만료 시간. `None`이면 만료 없음
    pub default_timeout: Option<u64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            serializer: "json".into(),
            pool_class: "redis".into(),
            parser_class: "resp2".into(),
            pool_options: PoolOptions::new(),
            default_timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl ClientOptions {
    pub fn serializer(mut self, serializer: impl Into<Component<dyn Serializer>>) -> Self {
        self.serializer = serializer.into();
        self
    }

    pub fn pool_class(mut self, pool_class: impl Into<Component<dyn PoolFactory>>) -> Self {
        self.pool_class = pool_class.into();
        self
    }

    pub fn parser_class(mut self, parser_class: impl Into<Component<dyn ProtocolParser>>) -> Self {
        self.parser_class = parser_class.into();
        self
    }

    pub fn pool_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.pool_options.insert(key, value);
        self
    }

    pub fn pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = options;
        self
    }

    pub fn default_timeout(mut self, timeout: Option<u64>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

struct ClientInner {
    registry: PoolRegistry,
    serializer: Component<dyn Serializer>,
    resolved_serializer: OnceCell<Arc<dyn Serializer>>,
    default_timeout: Option<u64>,
}

/// primary/replica 캐시 클라이언트 (비동기)
///
/// 복제해도 같은 풀 레지스트리를 공유합니다. 풀은 마지막 복제본이
/// 사라질 때 함께 정리됩니다.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
    close_connections: bool,
}

impl CacheClient {
    /// 클라이언트를 만듭니다. 네트워크에 접속하지 않으며, 컴포넌트 해석도 하지 않습니다.
    pub fn new(servers: ServerList, options: ClientOptions) -> Self {
        let registry = PoolRegistry::new(
            servers,
            options.pool_class,
            options.parser_class,
            options.pool_options,
        );

        Self {
            inner: Arc::new(ClientInner {
                registry,
                serializer: options.serializer,
                resolved_serializer: OnceCell::new(),
                default_timeout: options.default_timeout,
            }),
            close_connections: false,
        }
    }

    /// `;`/`,`로 구분된 서버 문자열로 클라이언트를 만듭니다.
    pub fn from_location(location: &str, options: ClientOptions) -> CacheResult<Self> {
        Ok(Self::new(ServerList::parse(location)?, options))
    }

    /// 같은 풀을 공유하되, 작업이 끝날 때마다 커넥션을 닫는 뷰를 반환합니다.
    pub fn closing(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            close_connections: true,
        }
    }

    pub fn closes_connections(&self) -> bool {
        self.close_connections
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.inner.registry
    }

    pub fn default_timeout(&self) -> Option<u64> {
        self.inner.default_timeout
    }

    /// 키가 없을 때만 저장합니다. 저장했는지 반환합니다.
    pub async fn add<T>(&self, key: &str, value: &T, timeout: impl Into<Timeout>) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let data = self.encode(value)?;
        let expiry = self.backend_timeout(timeout.into());
        let mut conn = self.connection(Some(key), true).await?;

        match expiry {
            Some(0) => {
                let stored = conn.set(key, &data, None, true).await?;
                if stored {
                    conn.delete(&[key.to_string()]).await?;
                }
                Ok(stored)
            }
            expiry => conn.set(key, &data, expiry, true).await,
        }
    }

    /// 값을 읽습니다. 키가 없으면 `default`를 반환합니다.
    ///
    /// `Option<T>`로 읽으면 부재를 `None`으로 받을 수 있습니다.
    pub async fn get<T>(&self, key: &str, default: T) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.connection(Some(key), false).await?;
        match conn.get(key).await? {
            Some(data) => self.decode(&data),
            None => Ok(default),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T, timeout: impl Into<Timeout>) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let data = self.encode(value)?;
        let expiry = self.backend_timeout(timeout.into());
        let mut conn = self.connection(Some(key), true).await?;

        match expiry {
            Some(0) => {
                conn.delete(&[key.to_string()]).await?;
            }
            expiry => {
                conn.set(key, &data, expiry, false).await?;
            }
        }
        Ok(())
    }

    /// 만료 시간을 갱신합니다. 키가 있었는지 반환합니다.
    pub async fn touch(&self, key: &str, timeout: impl Into<Timeout>) -> CacheResult<bool> {
        let expiry = self.backend_timeout(timeout.into());
        let mut conn = self.connection(Some(key), true).await?;

        match expiry {
            None => conn.persist(key).await,
            Some(seconds) => conn.expire(key, seconds).await,
        }
    }

    /// 키를 삭제합니다. 키가 있었는지 반환합니다.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection(Some(key), true).await?;
        let removed = conn.delete(&[key.to_string()]).await?;
        Ok(removed > 0)
    }

    /// 여러 키를 한 번에 읽습니다. 서버에 없는 키는 결과에 포함되지 않습니다.
    pub async fn get_many<T, K>(&self, keys: &[K]) -> CacheResult<HashMap<String, T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_string()).collect();
        let mut conn = self.connection(None, false).await?;
        let values = conn.mget(&keys).await?;

        let mut found = HashMap::with_capacity(values.len());
        for (key, value) in keys.into_iter().zip(values) {
            if let Some(data) = value {
                let decoded = self.decode(&data)?;
                found.insert(key, decoded);
            }
        }
        Ok(found)
    }

    pub async fn has_key(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection(Some(key), false).await?;
        conn.exists(key).await
    }

    /// 정수 값을 `delta`만큼 증가시키고 새 값을 반환합니다.
    ///
    /// 존재 확인과 증가는 별도 명령이므로, 그 사이에 다른 클라이언트가 키를
    /// 지우면 키가 0에서 다시 만들어질 수 있습니다.
    ///
    /// ## 에러
    ///
    /// - `CacheError::NotFound` - 키가 없음
    /// - `CacheError::Transport` - 저장된 값이 정수가 아님 등 서버 에러
    pub async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.connection(Some(key), true).await?;

        if !conn.exists(key).await? {
            debug!("incr on missing key '{}'", key);
            return Err(CacheError::NotFound(key.to_string()));
        }
        conn.incr(key, delta).await
    }

    pub async fn decr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.incr(key, delta.saturating_neg()).await
    }

    /// 여러 키를 하나의 원자적 파이프라인으로 저장합니다.
    ///
    /// 만료 시간이 있으면 키마다 `EXPIRE`를 같은 파이프라인에 덧붙입니다.
    /// timeout 0은 결과적으로 모든 키를 삭제합니다.
    pub async fn set_many<I, K, V>(&self, data: I, timeout: impl Into<Timeout>) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let mut pairs = Vec::new();
        for (key, value) in data {
            pairs.push((key.into(), self.encode(&value)?));
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let expiry = self.backend_timeout(timeout.into());
        let mut commands = Vec::with_capacity(pairs.len() + 1);
        if let Some(seconds) = expiry {
            for (key, _) in &pairs {
                commands.push(DriverCommand::Expire {
                    key: key.clone(),
                    seconds,
                });
            }
        }
        commands.insert(0, DriverCommand::MSet(pairs));

        let mut conn = self.connection(None, true).await?;
        conn.pipeline(&commands).await
    }

    /// 여러 키를 한 번에 삭제합니다. 없는 키는 무시하며, 삭제된 개수를 반환합니다.
    pub async fn delete_many<K>(&self, keys: &[K]) -> CacheResult<u64>
    where
        K: AsRef<str>,
    {
        if keys.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_string()).collect();
        let mut conn = self.connection(None, true).await?;
        conn.delete(&keys).await
    }

    /// primary 서버의 현재 DB를 통째로 비웁니다.
    ///
    /// 이 클라이언트가 쓰지 않은 키까지 모두 삭제됩니다.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection(None, true).await?;
        info!("Flushing cache database on {}", conn.address());
        conn.flush().await
    }

    /// 값을 읽고, 없으면 `default`로 계산해 `add`한 뒤 다시 읽습니다.
    pub async fn get_or_set<T, F>(&self, key: &str, default: F, timeout: impl Into<Timeout>) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get::<Option<T>>(key, None).await? {
            return Ok(value);
        }

        let value = default();
        self.add(key, &value, timeout).await?;
        match self.get::<Option<T>>(key, None).await? {
            Some(stored) => Ok(stored),
            None => Ok(value),
        }
    }

    /// 키의 남은 만료 시간
    pub async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut conn = self.connection(Some(key), false).await?;
        conn.ttl(key).await
    }

    /// 생성된 모든 풀의 유휴 커넥션을 닫고, 닫은 개수를 반환합니다.
    pub fn disconnect(&self) -> usize {
        let closed = self.inner.registry.disconnect_all();
        info!("Closed {} idle cache connection(s)", closed);
        closed
    }

    async fn connection(&self, key: Option<&str>, write: bool) -> CacheResult<PooledConnection> {
        let pool = self.inner.registry.pool_for(key, write)?;
        PooledConnection::acquire(pool, self.close_connections).await
    }

    fn serializer(&self) -> CacheResult<Arc<dyn Serializer>> {
        self.inner
            .resolved_serializer
            .get_or_try_init(|| {
                let serializer = self.inner.serializer.resolve()?;
                info!("Using serializer '{}'", serializer.name());
                Ok::<_, CacheError>(serializer)
            })
            .cloned()
    }

    fn encode<T>(&self, value: &T) -> CacheResult<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.serializer()?.dumps(&value)
    }

    fn decode<T>(&self, data: &[u8]) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let value = self.serializer()?.loads(data)?;
        Ok(serde_json::from_value(value)?)
    }

    fn backend_timeout(&self, timeout: Timeout) -> Option<u64> {
        timeout.resolve(self.inner.default_timeout)
    }
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("registry", &self.inner.registry)
            .field("serializer", &self.inner.serializer)
            .field("default_timeout", &self.inner.default_timeout)
            .field("close_connections", &self.close_connections)
            .finish()
    }
}
