//! # 블로킹 어댑터
//!
//! 비동기 [`CacheClient`]의 작업을 동기 코드에서 호출할 수 있게 해 줍니다.
//! 작업마다 구현을 따로 두지 않고, 하나의 제네릭 `run`으로 비동기 작업을 끝까지 실행합니다.
//!
//! ## 동작 방식
//!
//! ```text
//! BlockingCacheClient::get(key)
//!    └─ run(|client| client.get(key))
//!         ├─ 전용 스레드 생성 (std::thread::scope)
//!         ├─ current-thread tokio 런타임 생성
//!         ├─ block_on(비동기 작업)         ← closing 뷰: 매번 새로 연결하고 작업 후 닫음
//!         └─ join (패닉은 호출자에게 다시 던짐)
//! ```
//!
//! 런타임이 별도 스레드에 있으므로 비동기 컨텍스트 안에서 호출해도
//! "runtime within runtime" 패닉이 나지 않습니다. 다만 호출 스레드는 작업이
//! 끝날 때까지 블록됩니다.
//!
//! 유휴 커넥션은 다른 런타임(호출자의 런타임 포함)에 묶여 있을 수 있으므로
//! 블로킹 호출은 유휴 목록을 쓰지 않습니다.

use std::collections::HashMap;
use std::future::Future;
use std::panic;
use std::thread;

use serde::{Serialize, de::DeserializeOwned};
use tokio::runtime::Builder;

use crate::caching::client::CacheClient;
use crate::caching::timeout::Timeout;
use crate::core::errors::CacheResult;
use crate::pool::KeyTtl;

/// [`CacheClient`]의 동기 버전
///
/// 원본 클라이언트와 같은 풀 레지스트리를 공유하지만, 작업이 끝나면 커넥션을
/// 풀에 돌려놓지 않고 닫습니다. 블로킹 호출이 반환된 뒤에는 어떤 커넥션도
/// 사용 중으로 남지 않습니다.
#[derive(Debug, Clone)]
pub struct BlockingCacheClient {
    client: CacheClient,
}

impl BlockingCacheClient {
    pub fn new(client: &CacheClient) -> Self {
        Self {
            client: client.closing(),
        }
    }

    /// 내부에서 사용하는 closing 뷰
    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    fn run<'a, F, Fut, T>(&'a self, op: F) -> CacheResult<T>
    where
        F: FnOnce(&'a CacheClient) -> Fut + Send,
        Fut: Future<Output = CacheResult<T>>,
        T: Send,
    {
        let client = &self.client;

        thread::scope(|scope| {
            let handle = scope.spawn(move || -> CacheResult<T> {
                let runtime = Builder::new_current_thread().enable_all().build()?;
                runtime.block_on(op(client))
            });

            match handle.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }

    pub fn add<T>(&self, key: &str, value: &T, timeout: impl Into<Timeout>) -> CacheResult<bool>
    where
        T: Serialize + Sync + ?Sized,
    {
        let timeout = timeout.into();
        self.run(|client| client.add(key, value, timeout))
    }

    pub fn get<T>(&self, key: &str, default: T) -> CacheResult<T>
    where
        T: DeserializeOwned + Send,
    {
        self.run(|client| client.get(key, default))
    }

    pub fn set<T>(&self, key: &str, value: &T, timeout: impl Into<Timeout>) -> CacheResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let timeout = timeout.into();
        self.run(|client| client.set(key, value, timeout))
    }

    pub fn touch(&self, key: &str, timeout: impl Into<Timeout>) -> CacheResult<bool> {
        let timeout = timeout.into();
        self.run(|client| client.touch(key, timeout))
    }

    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        self.run(|client| client.delete(key))
    }

    pub fn get_many<T, K>(&self, keys: &[K]) -> CacheResult<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
        K: AsRef<str> + Sync,
    {
        self.run(|client| client.get_many(keys))
    }

    pub fn has_key(&self, key: &str) -> CacheResult<bool> {
        self.run(|client| client.has_key(key))
    }

    pub fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.run(|client| client.incr(key, delta))
    }

    pub fn decr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.run(|client| client.decr(key, delta))
    }

    pub fn set_many<I, K, V>(&self, data: I, timeout: impl Into<Timeout>) -> CacheResult<()>
    where
        I: IntoIterator<Item = (K, V)> + Send,
        K: Into<String>,
        V: Serialize,
    {
        let timeout = timeout.into();
        self.run(|client| client.set_many(data, timeout))
    }

    pub fn delete_many<K>(&self, keys: &[K]) -> CacheResult<u64>
    where
        K: AsRef<str> + Sync,
    {
        self.run(|client| client.delete_many(keys))
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.run(|client| client.clear())
    }

    pub fn get_or_set<T, F>(&self, key: &str, default: F, timeout: impl Into<Timeout>) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> T + Send,
    {
        let timeout = timeout.into();
        self.run(|client| client.get_or_set(key, default, timeout))
    }

    pub fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.run(|client| client.ttl(key))
    }

    pub fn disconnect(&self) -> usize {
        self.client.disconnect()
    }
}
