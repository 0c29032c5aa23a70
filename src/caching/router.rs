//! # 서버 목록과 풀 레지스트리
//!
//! 쓰기/읽기 라우팅 정책과 서버별 커넥션 풀의 지연 생성을 담당합니다.
//!
//! ## 라우팅 정책
//!
//! ```text
//! servers = [primary, replica1, replica2]
//!
//! write                 → 0 (primary)
//! read, 서버 1대        → 0
//! read, 서버 N대 (N≥2)  → 1..=N-1 중 균등 무작위 (primary는 읽지 않음)
//! ```
//!
//! 헬스 체크, 장애 조치, 세션 고정은 하지 않습니다.
//!
//! ## 풀 수명
//!
//! 풀은 인덱스마다 최초 사용 시 한 번만 만들어지며, 레지스트리(즉 클라이언트)가
//! 살아 있는 동안 교체되지 않습니다. 클라이언트 생성은 네트워크에 접속하지 않습니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;
use rand::Rng;

use crate::core::errors::{CacheError, CacheResult};
use crate::core::registry::Component;
use crate::pool::{ConnectionPool, PoolFactory, PoolOptions, ProtocolParser};

/// 순서가 있는 서버 주소 목록. 0번이 primary입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    servers: Vec<String>,
}

impl ServerList {
    /// 주소 목록으로 생성합니다. 공백은 제거하고 빈 항목은 버립니다.
    ///
    /// ## 에러
    ///
    /// - `CacheError::Configuration` - 남은 주소가 하나도 없음
    pub fn new<I, S>(servers: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let servers: Vec<String> = servers
            .into_iter()
            .map(|server| server.as_ref().trim().to_string())
            .filter(|server| !server.is_empty())
            .collect();

        if servers.is_empty() {
            return Err(CacheError::Configuration(
                "at least one cache server must be configured".to_string(),
            ));
        }

        Ok(Self { servers })
    }

    /// `;` 또는 `,`로 구분된 문자열을 파싱합니다.
    ///
    /// ```rust,ignore
    /// let servers = ServerList::parse("redis://a:6379;redis://b:6379,redis://c:6379")?;
    /// assert_eq!(servers.len(), 3);
    /// ```
    pub fn parse(raw: &str) -> CacheResult<Self> {
        Self::new(raw.split([';', ',']))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// 항상 `false`입니다. 빈 목록은 만들 수 없습니다.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.servers.get(index).map(String::as_str)
    }

    pub fn primary(&self) -> &str {
        &self.servers[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(String::as_str)
    }
}

impl FromStr for ServerList {
    type Err = CacheError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for ServerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.servers.join(";"))
    }
}

/// 서버 인덱스별 커넥션 풀 레지스트리
///
/// 클라이언트 하나가 소유하며, 풀의 수명은 레지스트리의 수명과 같습니다.
/// 인덱스마다 `OnceCell`을 두어 동시에 처음 접근해도 풀은 하나만 생성됩니다.
pub struct PoolRegistry {
    servers: ServerList,
    pool_class: Component<dyn PoolFactory>,
    parser_class: Component<dyn ProtocolParser>,
    options: PoolOptions,
    factory: OnceCell<Arc<dyn PoolFactory>>,
    parser: OnceCell<Arc<dyn ProtocolParser>>,
    pools: Vec<OnceCell<Arc<dyn ConnectionPool>>>,
}

impl PoolRegistry {
    /// 레지스트리를 만듭니다. 컴포넌트 해석과 풀 생성은 최초 사용 시점으로 미룹니다.
    pub fn new(
        servers: ServerList,
        pool_class: Component<dyn PoolFactory>,
        parser_class: Component<dyn ProtocolParser>,
        options: PoolOptions,
    ) -> Self {
        let pools = (0..servers.len()).map(|_| OnceCell::new()).collect();
        Self {
            servers,
            pool_class,
            parser_class,
            options,
            factory: OnceCell::new(),
            parser: OnceCell::new(),
            pools,
        }
    }

    pub fn servers(&self) -> &ServerList {
        &self.servers
    }

    /// 작업이 사용할 서버 인덱스를 고릅니다.
    pub fn select_index(&self, write: bool) -> usize {
        let count = self.servers.len();
        if write || count == 1 {
            return 0;
        }
        rand::rng().random_range(1..count)
    }

    /// 인덱스에 해당하는 풀을 반환합니다. 처음이면 생성합니다.
    ///
    /// ## 에러
    ///
    /// - `CacheError::Configuration` - 범위를 벗어난 인덱스, 풀 클래스/파서 해석 실패, 잘못된 풀 옵션
    pub fn get_pool(&self, index: usize) -> CacheResult<Arc<dyn ConnectionPool>> {
        let cell = self.pools.get(index).ok_or_else(|| {
            CacheError::Configuration(format!(
                "server index {} out of range ({} configured)",
                index,
                self.servers.len()
            ))
        })?;

        cell.get_or_try_init(|| {
            let factory = self.factory()?;
            let parser = self.parser()?;
            let address = &self.servers.servers[index];

            debug!("Creating pool #{} for {} with pool class '{}'", index, address, factory.name());
            factory.create(address, parser.as_ref(), &self.options)
        })
        .cloned()
    }

    /// 키와 쓰기 여부로 풀을 고릅니다.
    ///
    /// 키는 샤딩 정책을 위한 자리이며 기본 정책은 사용하지 않습니다.
    pub fn pool_for(&self, key: Option<&str>, write: bool) -> CacheResult<Arc<dyn ConnectionPool>> {
        let index = self.select_index(write);
        debug!(
            "Routing {} of {:?} to server #{}",
            if write { "write" } else { "read" },
            key.unwrap_or("*"),
            index
        );
        self.get_pool(index)
    }

    /// 지금까지 생성된 풀 개수
    pub fn created_pools(&self) -> usize {
        self.pools.iter().filter(|cell| cell.get().is_some()).count()
    }

    /// 생성된 모든 풀의 유휴 커넥션을 닫습니다. 풀 자체는 유지됩니다.
    pub fn disconnect_all(&self) -> usize {
        self.pools
            .iter()
            .filter_map(|cell| cell.get())
            .map(|pool| pool.disconnect())
            .sum()
    }

    fn factory(&self) -> CacheResult<Arc<dyn PoolFactory>> {
        self.factory
            .get_or_try_init(|| {
                let factory = self.pool_class.resolve()?;
                info!("Using pool class '{}'", factory.name());
                Ok::<_, CacheError>(factory)
            })
            .cloned()
    }

    fn parser(&self) -> CacheResult<Arc<dyn ProtocolParser>> {
        self.parser
            .get_or_try_init(|| {
                let parser = self.parser_class.resolve()?;
                info!("Using parser class '{}'", parser.name());
                Ok::<_, CacheError>(parser)
            })
            .cloned()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("servers", &self.servers)
            .field("pool_class", &self.pool_class)
            .field("parser_class", &self.parser_class)
            .field("created_pools", &self.created_pools())
            .finish()
    }
}
