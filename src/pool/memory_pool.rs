//! # In-Process Memory Pool
//!
//! 네트워크 없이 Redis 명령 의미를 흉내 내는 풀 클래스(`"memory"`)입니다.
//! 로컬 개발과 테스트에서 실제 서버 대신 사용합니다.
//!
//! 같은 팩토리에서 같은 주소로 만든 풀은 하나의 저장소를 공유합니다.
//! 따라서 `"memory://a;memory://a"`처럼 같은 주소를 여러 번 설정하면
//! 이미 복제가 끝난 primary/replica 구성처럼 동작합니다.
//!
//! ## 흉내 내는 의미
//!
//! - `SET … EX n NX`, `EX 0` 거부
//! - `EXPIRE key 0` → 즉시 삭제
//! - `INCRBY`: 없는 키는 0에서 시작, 정수가 아닌 값은 `TypeError`
//! - `MSET`은 기존 만료 시간을 지움
//! - 파이프라인은 저장소 잠금 하나로 원자적으로 실행
//! - 범위를 벗어난 만료 시간은 `invalid expire time` 응답 에러
//!
//! 만료된 키는 다시 접근될 때 지워지고, 쓰기 [`SWEEP_INTERVAL`]회마다 한 번 전체를 훑어 지웁니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::info;

use crate::core::errors::{CacheError, CacheResult};
use crate::pool::{
    CacheConnection, ConnectionPool, DriverCommand, KeyTtl, PoolFactory, PoolFactoryRegistration, PoolLimits,
    PoolOptions, PoolSlots, PoolStats, ProtocolParser,
};

const MEMORY_POOL_OPTIONS: [&str; 2] = ["max_idle", "max_connections"];

/// 만료된 키 전체 정리 주기 (쓰기 횟수)
pub const SWEEP_INTERVAL: usize = 256;

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 주소 하나에 해당하는 메모리 "서버"
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    writes: AtomicUsize,
}

type Entries = HashMap<String, MemoryEntry>;

fn response_error(message: &'static str) -> CacheError {
    redis::RedisError::from((redis::ErrorKind::ResponseError, message)).into()
}

fn type_error(message: &'static str) -> CacheError {
    redis::RedisError::from((redis::ErrorKind::TypeError, message)).into()
}

fn live<'a>(entries: &'a mut Entries, key: &str) -> Option<&'a mut MemoryEntry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn sweep(entries: &mut Entries) {
    let now = Instant::now();
    entries.retain(|_, entry| !entry.is_expired(now));
}

/// Redis처럼 밀리초로 `i64`를 넘는 만료 시간은 거부합니다.
fn deadline(seconds: u64, message: &'static str) -> CacheResult<Instant> {
    seconds
        .checked_mul(1000)
        .filter(|millis| i64::try_from(*millis).is_ok())
        .and_then(|_| Instant::now().checked_add(Duration::from_secs(seconds)))
        .ok_or_else(|| response_error(message))
}

fn apply_expire(entries: &mut Entries, key: &str, seconds: u64, deadline: Option<Instant>) -> bool {
    if seconds == 0 {
        return live(entries, key).is_some() && entries.remove(key).is_some();
    }
    match live(entries, key) {
        Some(entry) => {
            entry.expires_at = deadline;
            true
        }
        None => false,
    }
}

fn apply_mset(entries: &mut Entries, pairs: &[(String, Vec<u8>)]) {
    for (key, value) in pairs {
        entries.insert(
            key.clone(),
            MemoryEntry {
                value: value.clone(),
                expires_at: None,
            },
        );
    }
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().expect("memory store lock poisoned")
    }

    /// 쓰기용 잠금. 주기적으로 만료된 키를 정리합니다.
    fn write(&self) -> MutexGuard<'_, Entries> {
        let mut entries = self.lock();
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            sweep(&mut entries);
        }
        entries
    }

    /// 만료되지 않은 키 개수. 만료된 키는 이때 정리됩니다.
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        sweep(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 메모리 풀의 커넥션. 저장소에 대한 핸들일 뿐이다.
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl CacheConnection for MemoryConnection {
    async fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.store.lock();
        Ok(live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    async fn set(&mut self, key: &str, value: &[u8], expiry: Option<u64>, only_if_absent: bool) -> CacheResult<bool> {
        const INVALID: &str = "invalid expire time in 'set' command";
        if expiry == Some(0) {
            return Err(response_error(INVALID));
        }
        let expires_at = expiry.map(|seconds| deadline(seconds, INVALID)).transpose()?;

        let mut entries = self.store.write();
        if only_if_absent && live(&mut entries, key).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn mget(&mut self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let mut entries = self.store.lock();
        Ok(keys
            .iter()
            .map(|key| live(&mut entries, key).map(|entry| entry.value.clone()))
            .collect())
    }

    async fn delete(&mut self, keys: &[String]) -> CacheResult<u64> {
        let mut entries = self.store.lock();
        let mut removed = 0;
        for key in keys {
            if live(&mut entries, key).is_some() {
                entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn expire(&mut self, key: &str, seconds: u64) -> CacheResult<bool> {
        let at = deadline(seconds, "invalid expire time in 'expire' command")?;
        let mut entries = self.store.lock();
        Ok(apply_expire(&mut entries, key, seconds, Some(at)))
    }

    async fn persist(&mut self, key: &str) -> CacheResult<bool> {
        let mut entries = self.store.lock();
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut entries = self.store.write();
        let (current, expires_at) = match live(&mut entries, key) {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|text| text.parse::<i64>().ok())
                    .ok_or_else(|| type_error("value is not an integer or out of range"))?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current
            .checked_add(delta)
            .ok_or_else(|| response_error("increment or decrement would overflow"))?;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let mut entries = self.store.lock();
        Ok(live(&mut entries, key).is_some())
    }

    async fn ttl(&mut self, key: &str) -> CacheResult<KeyTtl> {
        let mut entries = self.store.lock();
        let now = Instant::now();
        Ok(match live(&mut entries, key) {
            None => KeyTtl::Missing,
            Some(MemoryEntry { expires_at: None, .. }) => KeyTtl::NoExpiry,
            Some(MemoryEntry {
                expires_at: Some(at), ..
            }) => {
                // Redis rounds the remaining milliseconds to the nearest second.
                let millis = at.saturating_duration_since(now).as_millis() as u64;
                KeyTtl::ExpiresIn(Duration::from_secs((millis + 500) / 1000))
            }
        })
    }

    async fn flush(&mut self) -> CacheResult<()> {
        self.store.lock().clear();
        Ok(())
    }

    async fn pipeline(&mut self, commands: &[DriverCommand]) -> CacheResult<()> {
        // 만료 시간을 먼저 검증해 일부만 적용되는 일이 없게 한다
        let deadlines = commands
            .iter()
            .map(|command| match command {
                DriverCommand::Expire { seconds, .. } => {
                    deadline(*seconds, "invalid expire time in 'expire' command").map(Some)
                }
                DriverCommand::MSet(_) => Ok(None),
            })
            .collect::<CacheResult<Vec<_>>>()?;

        let mut entries = self.store.write();
        for (command, at) in commands.iter().zip(deadlines) {
            match command {
                DriverCommand::MSet(pairs) => apply_mset(&mut entries, pairs),
                DriverCommand::Expire { key, seconds } => {
                    apply_expire(&mut entries, key, *seconds, at);
                }
            }
        }
        Ok(())
    }
}

/// 메모리 저장소에 대한 커넥션 풀
pub struct MemoryPool {
    address: String,
    store: Arc<MemoryStore>,
    slots: PoolSlots,
}

impl MemoryPool {
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    fn address(&self) -> &str {
        &self.address
    }

    async fn acquire(&self) -> CacheResult<Box<dyn CacheConnection>> {
        let store = self.store.clone();
        self.slots
            .checkout(&self.address, || async move {
                Ok(Box::new(MemoryConnection { store }) as Box<dyn CacheConnection>)
            })
            .await
    }

    async fn open(&self) -> CacheResult<Box<dyn CacheConnection>> {
        let store = self.store.clone();
        self.slots
            .open_new(&self.address, || async move {
                Ok(Box::new(MemoryConnection { store }) as Box<dyn CacheConnection>)
            })
            .await
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

/// `"memory"` 풀 클래스
///
/// 주소별 저장소를 팩토리가 보관하므로, 같은 팩토리에서 같은 주소로 만든
/// 풀들은 데이터를 공유합니다.
#[derive(Default)]
pub struct MemoryPoolFactory {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryPoolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주소에 해당하는 저장소 (없으면 생성)
    pub fn store(&self, address: &str) -> Arc<MemoryStore> {
        let mut stores = self.stores.lock().expect("memory factory lock poisoned");
        stores.entry(address.to_string()).or_default().clone()
    }
}

impl PoolFactory for MemoryPoolFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(
        &self,
        address: &str,
        _parser: &dyn ProtocolParser,
        options: &PoolOptions,
    ) -> CacheResult<Arc<dyn ConnectionPool>> {
        options.ensure_known(&MEMORY_POOL_OPTIONS, self.name())?;
        let limits = PoolLimits::from_options(options)?;

        info!("Created memory pool for {}", address);
        Ok(Arc::new(MemoryPool {
            address: address.to_string(),
            store: self.store(address),
            slots: PoolSlots::new(limits),
        }))
    }
}

fn memory_factory() -> Arc<dyn PoolFactory> {
    Arc::new(MemoryPoolFactory::new())
}

inventory::submit! {
    PoolFactoryRegistration { name: "memory", constructor: memory_factory }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Resp2Parser;

    fn connection(factory: &MemoryPoolFactory, address: &str) -> MemoryConnection {
        MemoryConnection {
            store: factory.store(address),
        }
    }

    #[tokio::test]
    async fn test_set_nx_and_expiry() {
        let factory = MemoryPoolFactory::new();
        let mut conn = connection(&factory, "memory://nx");

        assert!(conn.set("k", b"1", Some(10), true).await.unwrap());
        assert!(!conn.set("k", b"2", Some(10), true).await.unwrap());
        assert_eq!(conn.get("k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(conn.ttl("k").await.unwrap(), KeyTtl::ExpiresIn(Duration::from_secs(10)));
        assert!(conn.set("k", b"3", Some(0), false).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_zero_deletes() {
        let factory = MemoryPoolFactory::new();
        let mut conn = connection(&factory, "memory://expire");

        conn.set("k", b"1", None, false).await.unwrap();
        assert!(conn.expire("k", 0).await.unwrap());
        assert!(!conn.exists("k").await.unwrap());
        assert!(!conn.expire("k", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_semantics() {
        let factory = MemoryPoolFactory::new();
        let mut conn = connection(&factory, "memory://incr");

        assert_eq!(conn.incr("fresh", 2).await.unwrap(), 2);
        conn.set("word", b"\"abc\"", None, false).await.unwrap();
        assert!(conn.incr("word", 1).await.is_err());
        conn.set("max", i64::MAX.to_string().as_bytes(), None, false).await.unwrap();
        assert!(conn.incr("max", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_pipeline_mset_clears_ttl() {
        let factory = MemoryPoolFactory::new();
        let mut conn = connection(&factory, "memory://pipeline");

        conn.set("a", b"0", Some(100), false).await.unwrap();
        conn.pipeline(&[
            DriverCommand::MSet(vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]),
            DriverCommand::Expire {
                key: "b".to_string(),
                seconds: 30,
            },
        ])
        .await
        .unwrap();

        assert_eq!(conn.ttl("a").await.unwrap(), KeyTtl::NoExpiry);
        assert_eq!(conn.ttl("b").await.unwrap(), KeyTtl::ExpiresIn(Duration::from_secs(30)));
        assert_eq!(
            conn.mget(&["a".to_string(), "z".to_string()]).await.unwrap(),
            vec![Some(b"1".to_vec()), None]
        );
    }

    #[tokio::test]
    async fn test_same_address_shares_store() {
        let factory = MemoryPoolFactory::new();
        let parser = Resp2Parser;
        let first = factory.create("memory://shared", &parser, &PoolOptions::new()).unwrap();
        let second = factory.create("memory://shared", &parser, &PoolOptions::new()).unwrap();

        let mut writer = first.acquire().await.unwrap();
        writer.set("k", b"v", None, false).await.unwrap();
        let mut reader = second.acquire().await.unwrap();

        assert_eq!(reader.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(factory.store("memory://shared").len(), 1);
    }

    fn insert_expired(store: &MemoryStore, count: usize) {
        let mut entries = store.lock();
        for i in 0..count {
            entries.insert(
                format!("stale:{}", i),
                MemoryEntry {
                    value: b"x".to_vec(),
                    expires_at: Some(Instant::now()),
                },
            );
        }
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_keys() {
        let factory = MemoryPoolFactory::new();
        let store = factory.store("memory://sweep_writes");
        let mut conn = connection(&factory, "memory://sweep_writes");
        insert_expired(&store, 100);

        for _ in 0..SWEEP_INTERVAL {
            conn.set("live", b"1", None, false).await.unwrap();
        }

        assert_eq!(store.lock().len(), 1);
    }

    #[test]
    fn test_len_sweeps_expired_keys() {
        let store = MemoryStore::default();
        insert_expired(&store, 10);

        assert_eq!(store.len(), 0);
        assert!(store.lock().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_is_rejected() {
        let factory = MemoryPoolFactory::new();
        let mut conn = connection(&factory, "memory://huge_expiry");
        conn.set("k", b"1", None, false).await.unwrap();

        assert!(matches!(conn.expire("k", u64::MAX).await, Err(CacheError::Transport(_))));
        assert!(matches!(conn.set("k", b"2", Some(u64::MAX), false).await, Err(CacheError::Transport(_))));

        let batch = [
            DriverCommand::MSet(vec![("k".to_string(), b"3".to_vec())]),
            DriverCommand::Expire {
                key: "k".to_string(),
                seconds: u64::MAX,
            },
        ];
        assert!(conn.pipeline(&batch).await.is_err());
        assert_eq!(conn.get("k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(conn.ttl("k").await.unwrap(), KeyTtl::NoExpiry);
    }

    #[test]
    fn test_rejects_driver_options() {
        let factory = MemoryPoolFactory::new();
        let options = PoolOptions::new().with("password", "secret");

        assert!(matches!(
            factory.create("memory://opts", &Resp2Parser, &options),
            Err(CacheError::Configuration(_))
        ));
    }
}
