//! # Redis 커넥션 풀 구현
//!
//! `redis` 크레이트의 멀티플렉스 비동기 커넥션을 서버별로 재사용하는
//! 기본 풀 클래스(`"redis"`)입니다.
//!
//! ## 연결 관리
//!
//! - 풀 생성 시에는 URL 파싱과 `redis::Client` 생성만 하며 네트워크에 접속하지 않습니다.
//! - 첫 `acquire`에서 `get_multiplexed_async_connection_with_config`로 연결합니다.
//! - 커넥션은 한 번에 하나의 작업만 사용하고, 작업이 끝나면 유휴 목록으로 돌아갑니다.
//!
//! 멀티플렉스 커넥션의 드라이버 태스크는 커넥션을 만든 tokio 런타임에 묶입니다.
//! 그래서 블로킹 어댑터는 유휴 커넥션을 쓰지 않고 호출마다 새로 연결한 뒤 닫습니다.
//!
//! 만료 시간은 `i64` 범위를 넘으면 명령을 보내기 전에 설정 에러로 거부합니다.
//!
//! ## 지원 옵션
//!
//! | 옵션 | 의미 | 기본값 |
//! |------|------|--------|
//! | `db` | 선택할 DB 번호 | URL 값 |
//! | `username` / `password` | 인증 정보 | URL 값 |
//! | `max_idle` | 최대 유휴 커넥션 수 | 8 |
//! | `max_connections` | 최대 전체 커넥션 수 | 제한 없음 |
//! | `connect_timeout` | 연결 타임아웃 (초) | 드라이버 기본값 |
//! | `response_timeout` | 응답 타임아웃 (초) | 드라이버 기본값 |
//!
//! ## 사용 예제
//!
//! ```rust,ignore
//! use replica_cache::pool::{PoolFactory, PoolOptions, RedisPoolFactory, Resp2Parser};
//!
//! let options = PoolOptions::new().with("db", 2).with("max_idle", 4);
//! let pool = RedisPoolFactory.create("redis://localhost:6379", &Resp2Parser, &options)?;
//! let mut conn = pool.acquire().await?;
//! conn.set("greeting", b"\"hello\"", Some(60), false).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, AsyncConnectionConfig, Client, IntoConnectionInfo};

use crate::core::errors::{CacheError, CacheResult, ErrorContext};
use crate::pool::{
    CacheConnection, ConnectionPool, DriverCommand, KeyTtl, PoolFactory, PoolFactoryRegistration, PoolLimits,
    PoolOptions, PoolSlots, PoolStats, ProtocolParser,
};

const REDIS_POOL_OPTIONS: [&str; 7] = [
    "db",
    "username",
    "password",
    "max_idle",
    "max_connections",
    "connect_timeout",
    "response_timeout",
];

fn expiry_arg(seconds: u64) -> CacheResult<i64> {
    i64::try_from(seconds)
        .map_err(|_| CacheError::Configuration(format!("expiry of {} seconds is out of range", seconds)))
}

/// Redis 서버 하나와의 멀티플렉스 커넥션
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl CacheConnection for RedisConnection {
    async fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self.conn.get(key).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &[u8], expiry: Option<u64>, only_if_absent: bool) -> CacheResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(seconds) = expiry {
            cmd.arg("EX").arg(expiry_arg(seconds)?);
        }
        if only_if_absent {
            cmd.arg("NX");
        }

        // NX가 실패하면 nil 응답
        let reply: Option<String> = cmd.query_async(&mut self.conn).await?;
        Ok(reply.is_some())
    }

    async fn mget(&mut self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET").arg(keys).query_async(&mut self.conn).await?;
        Ok(values)
    }

    async fn delete(&mut self, keys: &[String]) -> CacheResult<u64> {
        let removed: u64 = self.conn.del(keys).await?;
        Ok(removed)
    }

    async fn expire(&mut self, key: &str, seconds: u64) -> CacheResult<bool> {
        let updated: bool = self.conn.expire(key, expiry_arg(seconds)?).await?;
        Ok(updated)
    }

    async fn persist(&mut self, key: &str) -> CacheResult<bool> {
        let (existed, _removed): (bool, bool) = redis::pipe()
            .atomic()
            .exists(key)
            .persist(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(existed)
    }

    async fn incr(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
        let value: i64 = self.conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let exists: bool = self.conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&mut self, key: &str) -> CacheResult<KeyTtl> {
        let seconds: i64 = self.conn.ttl(key).await?;
        Ok(KeyTtl::from_reply(seconds))
    }

    async fn flush(&mut self) -> CacheResult<()> {
        redis::cmd("FLUSHDB").query_async::<()>(&mut self.conn).await?;
        Ok(())
    }

    async fn pipeline(&mut self, commands: &[DriverCommand]) -> CacheResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for command in commands {
            match command {
                DriverCommand::MSet(pairs) => {
                    let mut mset = redis::cmd("MSET");
                    for (key, value) in pairs {
                        mset.arg(key).arg(value.as_slice());
                    }
                    pipe.add_command(mset).ignore();
                }
                DriverCommand::Expire { key, seconds } => {
                    pipe.cmd("EXPIRE").arg(key).arg(expiry_arg(*seconds)?).ignore();
                }
            }
        }

        pipe.query_async::<()>(&mut self.conn).await?;
        Ok(())
    }
}

/// Redis 서버 하나에 대한 커넥션 풀
pub struct RedisConnectionPool {
    address: String,
    client: Client,
    config: AsyncConnectionConfig,
    slots: PoolSlots,
}

impl RedisConnectionPool {
    async fn connect(&self) -> CacheResult<Box<dyn CacheConnection>> {
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&self.config)
            .await?;
        Ok(Box::new(RedisConnection { conn }))
    }
}

#[async_trait]
impl ConnectionPool for RedisConnectionPool {
    fn address(&self) -> &str {
        &self.address
    }

    async fn acquire(&self) -> CacheResult<Box<dyn CacheConnection>> {
        self.slots.checkout(&self.address, || self.connect()).await
    }

    async fn open(&self) -> CacheResult<Box<dyn CacheConnection>> {
        self.slots.open_new(&self.address, || self.connect()).await
    }

    fn release(&self, connection: Box<dyn CacheConnection>) {
        self.slots.checkin(connection);
    }

    fn discard(&self, connection: Box<dyn CacheConnection>) {
        self.slots.discard(connection);
    }

    fn disconnect(&self) -> usize {
        self.slots.drain_idle()
    }

    fn stats(&self) -> PoolStats {
        self.slots.stats()
    }
}

/// 기본 풀 클래스 `"redis"`
pub struct RedisPoolFactory;

impl PoolFactory for RedisPoolFactory {
    fn name(&self) -> &str {
        "redis"
    }

    fn create(
        &self,
        address: &str,
        parser: &dyn ProtocolParser,
        options: &PoolOptions,
    ) -> CacheResult<Arc<dyn ConnectionPool>> {
        options.ensure_known(&REDIS_POOL_OPTIONS, self.name())?;

        let mut info = address
            .into_connection_info()
            .with_context(|| format!("invalid redis address '{}'", address))?;
        if let Some(db) = options.parse::<i64>("db")? {
            info.redis.db = db;
        }
        if let Some(username) = options.get("username") {
            info.redis.username = Some(username.to_string());
        }
        if let Some(password) = options.get("password") {
            info.redis.password = Some(password.to_string());
        }
        info.redis.protocol = parser.protocol();

        let mut config = AsyncConnectionConfig::new();
        if let Some(seconds) = options.parse::<u64>("connect_timeout")? {
            config = config.set_connection_timeout(Duration::from_secs(seconds));
        }
        if let Some(seconds) = options.parse::<u64>("response_timeout")? {
            config = config.set_response_timeout(Duration::from_secs(seconds));
        }

        let limits = PoolLimits::from_options(options)?;
        let client = Client::open(info).with_context(|| format!("invalid redis address '{}'", address))?;

        info!(
            "Created redis pool for {} (parser: {}, max_idle: {})",
            address,
            parser.name(),
            limits.max_idle
        );

        Ok(Arc::new(RedisConnectionPool {
            address: address.to_string(),
            client,
            config,
            slots: PoolSlots::new(limits),
        }))
    }
}

fn redis_factory() -> Arc<dyn PoolFactory> {
    Arc::new(RedisPoolFactory)
}

inventory::submit! {
    PoolFactoryRegistration { name: "redis", constructor: redis_factory }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::stub_server::{Reply, StubServer};
    use crate::pool::{Resp2Parser, Resp3Parser};

    fn command(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    async fn stub_connection(server: &StubServer) -> Box<dyn CacheConnection> {
        let pool = RedisPoolFactory
            .create(&server.url(), &Resp2Parser, &PoolOptions::new())
            .unwrap();
        pool.acquire().await.unwrap()
    }

    #[test]
    fn test_create_does_not_connect() {
        // 아무도 듣지 않는 포트여도 풀 생성은 성공해야 한다
        let pool = RedisPoolFactory
            .create("redis://127.0.0.1:1", &Resp2Parser, &PoolOptions::new())
            .unwrap();

        assert_eq!(pool.address(), "redis://127.0.0.1:1");
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_accepts_driver_options() {
        let options = PoolOptions::new()
            .with("db", 3)
            .with("password", "secret")
            .with("max_idle", 2)
            .with("connect_timeout", 1)
            .with("response_timeout", 1);

        assert!(
            RedisPoolFactory
                .create("redis://localhost:6379", &Resp3Parser, &options)
                .is_ok()
        );
    }

    #[test]
    fn test_rejects_unknown_option() {
        let options = PoolOptions::new().with("socket_keepalive", "true");

        assert!(matches!(
            RedisPoolFactory.create("redis://localhost:6379", &Resp2Parser, &options),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_address() {
        assert!(matches!(
            RedisPoolFactory.create("not a url", &Resp2Parser, &PoolOptions::new()),
            Err(CacheError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_surfaces_transport_error() {
        let options = PoolOptions::new().with("connect_timeout", 1);
        let pool = RedisPoolFactory
            .create("redis://127.0.0.1:1", &Resp2Parser, &options)
            .unwrap();

        let result = pool.acquire().await;

        assert!(matches!(result, Err(CacheError::Transport(_))));
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[tokio::test]
    async fn test_set_reads_nx_nil_reply_as_not_stored() {
        let server = StubServer::start(|args| match args[1].as_str() {
            "taken" => Reply::Nil,
            _ => Reply::Ok,
        });
        let mut conn = stub_connection(&server).await;

        assert!(conn.set("fresh", b"1", Some(30), true).await.unwrap());
        assert!(!conn.set("taken", b"2", Some(30), true).await.unwrap());
        assert!(conn.set("plain", b"3", None, false).await.unwrap());

        assert_eq!(
            server.commands(),
            vec![
                command(&["SET", "fresh", "1", "EX", "30", "NX"]),
                command(&["SET", "taken", "2", "EX", "30", "NX"]),
                command(&["SET", "plain", "3"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_persist_reports_existence_not_persist_reply() {
        let server = StubServer::start(|args| match (args[0].as_str(), args[1].as_str()) {
            ("EXISTS", "present") => Reply::Int(1),
            _ => Reply::Int(0),
        });
        let mut conn = stub_connection(&server).await;

        // PERSIST는 두 키 모두 0을 돌려준다
        assert!(conn.persist("present").await.unwrap());
        assert!(!conn.persist("absent").await.unwrap());

        assert_eq!(
            server.commands(),
            vec![
                command(&["MULTI"]),
                command(&["EXISTS", "present"]),
                command(&["PERSIST", "present"]),
                command(&["EXEC"]),
                command(&["MULTI"]),
                command(&["EXISTS", "absent"]),
                command(&["PERSIST", "absent"]),
                command(&["EXEC"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pipeline_sends_mset_and_expires_in_one_transaction() {
        let server = StubServer::start(|args| match args[0].as_str() {
            "EXPIRE" => Reply::Int(1),
            _ => Reply::Ok,
        });
        let mut conn = stub_connection(&server).await;

        conn.pipeline(&[
            DriverCommand::MSet(vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]),
            DriverCommand::Expire {
                key: "a".to_string(),
                seconds: 30,
            },
            DriverCommand::Expire {
                key: "b".to_string(),
                seconds: 30,
            },
        ])
        .await
        .unwrap();

        assert_eq!(
            server.commands(),
            vec![
                command(&["MULTI"]),
                command(&["MSET", "a", "1", "b", "2"]),
                command(&["EXPIRE", "a", "30"]),
                command(&["EXPIRE", "b", "30"]),
                command(&["EXEC"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_mget_keeps_request_order() {
        let server = StubServer::start(|args| {
            Reply::Array(
                args[1..]
                    .iter()
                    .map(|key| match key.as_str() {
                        "a" => Reply::bulk("1"),
                        "b" => Reply::bulk("2"),
                        _ => Reply::Nil,
                    })
                    .collect(),
            )
        });
        let mut conn = stub_connection(&server).await;

        let keys = ["b".to_string(), "z".to_string(), "a".to_string()];
        assert_eq!(
            conn.mget(&keys).await.unwrap(),
            vec![Some(b"2".to_vec()), None, Some(b"1".to_vec())]
        );
        assert_eq!(server.commands(), vec![command(&["MGET", "b", "z", "a"])]);
    }

    #[tokio::test]
    async fn test_single_commands_map_replies() {
        let server = StubServer::start(|args| match (args[0].as_str(), args.get(1).map(String::as_str)) {
            ("GET", Some("k")) => Reply::bulk("\"v\""),
            ("GET", _) => Reply::Nil,
            ("DEL", _) => Reply::Int(1),
            ("EXPIRE", _) => Reply::Int(1),
            ("INCRBY", Some("word")) => Reply::Error("ERR value is not an integer or out of range".to_string()),
            ("INCRBY", _) => Reply::Int(8),
            ("EXISTS", _) => Reply::Int(1),
            ("TTL", _) => Reply::Int(-1),
            _ => Reply::Ok,
        });
        let mut conn = stub_connection(&server).await;

        assert_eq!(conn.get("k").await.unwrap(), Some(b"\"v\"".to_vec()));
        assert_eq!(conn.get("missing").await.unwrap(), None);
        assert_eq!(conn.delete(&["k".to_string(), "missing".to_string()]).await.unwrap(), 1);
        assert!(conn.expire("k", 30).await.unwrap());
        assert_eq!(conn.incr("c", 3).await.unwrap(), 8);
        assert!(conn.exists("c").await.unwrap());
        assert_eq!(conn.ttl("c").await.unwrap(), KeyTtl::NoExpiry);
        conn.flush().await.unwrap();

        let error = conn.incr("word", 1).await.unwrap_err();
        assert!(matches!(error, CacheError::Transport(_)));
        assert!(!error.is_connection_fatal());

        assert_eq!(
            server.commands(),
            vec![
                command(&["GET", "k"]),
                command(&["GET", "missing"]),
                command(&["DEL", "k", "missing"]),
                command(&["EXPIRE", "k", "30"]),
                command(&["INCRBY", "c", "3"]),
                command(&["EXISTS", "c"]),
                command(&["TTL", "c"]),
                command(&["FLUSHDB"]),
                command(&["INCRBY", "word", "1"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_is_not_sent() {
        let server = StubServer::start(|_| Reply::Ok);
        let mut conn = stub_connection(&server).await;

        assert!(matches!(conn.expire("k", u64::MAX).await, Err(CacheError::Configuration(_))));
        assert!(matches!(
            conn.set("k", b"1", Some(i64::MAX as u64 + 1), false).await,
            Err(CacheError::Configuration(_))
        ));
        let batch = [DriverCommand::Expire {
            key: "k".to_string(),
            seconds: u64::MAX,
        }];
        assert!(matches!(conn.pipeline(&batch).await, Err(CacheError::Configuration(_))));

        assert!(server.commands().is_empty());
    }

    #[tokio::test]
    async fn test_open_bypasses_idle_connections() {
        let server = StubServer::start(|_| Reply::Ok);
        let pool = RedisPoolFactory
            .create(&server.url(), &Resp2Parser, &PoolOptions::new())
            .unwrap();

        let mut idle = pool.acquire().await.unwrap();
        idle.flush().await.unwrap();
        pool.release(idle);
        let mut fresh = pool.open().await.unwrap();
        fresh.flush().await.unwrap();

        assert_eq!(pool.stats(), PoolStats { idle: 1, in_use: 1 });
        pool.discard(fresh);
        assert_eq!(server.connections(), 2);
    }
}
