//! 캐시 클라이언트 설정
//!
//! JSON 설정 블록(serde) 또는 환경 변수에서 [`CacheConfig`]를 읽고,
//! 이를 [`CacheClient`]로 바꿉니다.

use std::collections::BTreeMap;
use std::env;

use serde::Deserialize;
use serde_json::Value;

use crate::caching::client::{CacheClient, ClientOptions, DEFAULT_TIMEOUT};
use crate::caching::router::ServerList;
use crate::core::errors::{CacheError, CacheResult, ErrorContext};
use crate::pool::PoolOptions;

/// `CACHE_LOCATION`/`REDIS_URL`이 모두 없을 때 쓰는 주소
pub const DEFAULT_LOCATION: &str = "redis://localhost:6379";

/// 서버 위치: 구분자(`;`, `,`)로 이은 문자열 또는 주소 목록
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Delimited(String),
    List(Vec<String>),
}

impl Location {
    pub fn servers(&self) -> CacheResult<ServerList> {
        match self {
            Location::Delimited(raw) => ServerList::parse(raw),
            Location::List(servers) => ServerList::new(servers),
        }
    }
}

/// 컴포넌트 이름과 드라이버 옵션
///
/// 알려진 키(`serializer`, `pool_class`, `parser_class`) 외의 항목은
/// 모두 풀 클래스에 그대로 전달됩니다.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CacheOptions {
    pub serializer: Option<String>,
    pub pool_class: Option<String>,
    pub parser_class: Option<String>,
    #[serde(flatten)]
    pub driver: BTreeMap<String, Value>,
}

/// 캐시 설정 블록
///
/// ```json
/// {
///   "location": "redis://primary:6379;redis://replica:6379",
///   "timeout": 300,
///   "options": { "pool_class": "redis", "db": 1, "max_idle": 4 }
/// }
/// ```
///
/// `timeout`이 없으면 300초, `null`이면 만료 없음입니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
    pub location: Location,
    #[serde(default = "default_timeout")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub options: CacheOptions,
}

fn default_timeout() -> Option<u64> {
    Some(DEFAULT_TIMEOUT)
}

impl CacheConfig {
    /// JSON 문자열에서 설정을 읽습니다.
    pub fn from_json(raw: &str) -> CacheResult<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid cache configuration")?;
        if let Some(seconds) = config.timeout {
            checked_timeout(seconds)?;
        }
        Ok(config)
    }

    /// 환경 변수에서 설정을 읽습니다.
    ///
    /// # Environment Variables
    ///
    /// - `CACHE_LOCATION`: 서버 목록 (없으면 `REDIS_URL`, 그것도 없으면 `redis://localhost:6379`)
    /// - `CACHE_TIMEOUT`: 기본 만료 시간(초). `none`이면 만료 없음
    /// - `CACHE_SERIALIZER`, `CACHE_POOL_CLASS`, `CACHE_PARSER_CLASS`: 컴포넌트 이름
    /// - `CACHE_OPTIONS`: 드라이버 옵션 (`db=1&max_idle=4`)
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 이름 → 값 조회 함수로 설정을 읽습니다. 빈 값은 없는 것으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let location = var("CACHE_LOCATION")
            .or_else(|| var("REDIS_URL"))
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let timeout = match var("CACHE_TIMEOUT") {
            Some(raw) if raw.eq_ignore_ascii_case("none") => None,
            Some(raw) => {
                let seconds = raw
                    .parse::<u64>()
                    .with_context(|| format!("invalid CACHE_TIMEOUT={:?}", raw))?;
                Some(checked_timeout(seconds)?)
            }
            None => Some(DEFAULT_TIMEOUT),
        };

        let driver = match var("CACHE_OPTIONS") {
            Some(raw) => parse_driver_options(&raw)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            location: Location::Delimited(location),
            timeout,
            options: CacheOptions {
                serializer: var("CACHE_SERIALIZER"),
                pool_class: var("CACHE_POOL_CLASS"),
                parser_class: var("CACHE_PARSER_CLASS"),
                driver,
            },
        })
    }

    /// 드라이버 옵션을 풀 옵션 문자열로 변환합니다. `null` 값은 버립니다.
    pub fn pool_options(&self) -> PoolOptions {
        self.options
            .driver
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key.clone(), s.clone())),
                other => Some((key.clone(), other.to_string())),
            })
            .collect()
    }

    /// 설정에 맞는 클라이언트 옵션
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default()
            .pool_options(self.pool_options())
            .default_timeout(self.timeout);

        if let Some(serializer) = &self.options.serializer {
            options = options.serializer(serializer.as_str());
        }
        if let Some(pool_class) = &self.options.pool_class {
            options = options.pool_class(pool_class.as_str());
        }
        if let Some(parser_class) = &self.options.parser_class {
            options = options.parser_class(parser_class.as_str());
        }
        options
    }

    /// 클라이언트를 만듭니다. 서버 목록만 검증하며 네트워크에는 접속하지 않습니다.
    pub fn into_client(self) -> CacheResult<CacheClient> {
        let servers = self.location.servers()?;
        Ok(CacheClient::new(servers, self.client_options()))
    }
}

/// 서버 만료 시간은 `i64` 초를 넘을 수 없습니다.
fn checked_timeout(seconds: u64) -> CacheResult<u64> {
    if i64::try_from(seconds).is_ok() {
        Ok(seconds)
    } else {
        Err(CacheError::Configuration(format!("timeout of {} seconds is out of range", seconds)))
    }
}

fn parse_driver_options(raw: &str) -> CacheResult<BTreeMap<String, Value>> {
    let mut options = BTreeMap::new();

    for pair in raw.split('&').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            CacheError::Configuration(format!("invalid CACHE_OPTIONS entry {:?} (expected key=value)", pair))
        })?;
        options.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }

    Ok(options)
}
