//! # Component Registry - 이름 기반 컴포넌트 해석
//!
//! 직렬화기(serializer), 커넥션 풀 클래스(pool class), 프로토콜 파서(parser class)처럼
//! 설정 문자열로 지정되는 플러그형 컴포넌트를 타입 안전하게 찾아주는 레지스트리입니다.
//!
//! 문자열로 임의의 생성자를 동적 import 하는 대신, 다음 두 경로로만 이름을 해석합니다.
//!
//! 1. **호스트 등록**: 애플리케이션이 시작 시 [`ComponentRegistry::register`]로 직접 등록
//! 2. **내장 등록**: 각 모듈이 `inventory::submit!`으로 링크 타임에 제출한 기본 구현
//!
//! 호스트 등록이 항상 우선하므로 내장 구현(`"json"`, `"redis"` 등)을 같은 이름으로
//! 덮어쓸 수 있습니다.
//!
//! ## 구성 요소
//!
//! | 타입 | 역할 |
//! |------|------|
//! | [`Registrable`] | 레지스트리에 올릴 수 있는 컴포넌트 종류 (`dyn Serializer` 등) |
//! | [`Component`] | 인스턴스 / 팩토리 / 이름 중 하나로 표현된 설정값 |
//! | [`ComponentRegistry`] | `(TypeId, 이름)` → 인스턴스 전역 맵 |
//!
//! ## 동작 원리
//!
//! ```text
//! Component::Named("json")
//!    ├─ ComponentRegistry 캐시 조회 (RwLock read)
//!    ├─ 없으면 Registrable::builtin("json") → inventory 순회
//!    └─ 찾은 인스턴스를 캐시에 저장 (먼저 저장한 쪽이 이김)
//! ```
//!
//! ## 사용 예제
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use replica_cache::core::registry::{Component, ComponentRegistry};
//! use replica_cache::caching::serializer::Serializer;
//!
//! // 애플리케이션 시작 시 커스텀 직렬화기 등록
//! ComponentRegistry::register::<dyn Serializer>("compact", Arc::new(CompactSerializer));
//!
//! // 설정에서는 이름으로 참조
//! let serializer: Component<dyn Serializer> = "compact".into();
//! let resolved = serializer.resolve()?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use once_cell::sync::Lazy;

use crate::core::errors::{CacheError, CacheResult};

/// 레지스트리에서 이름으로 찾을 수 있는 컴포넌트 종류
///
/// 트레이트 객체 타입(`dyn Serializer`, `dyn PoolFactory`, `dyn ProtocolParser`)에
/// 대해 구현되며, 링크 타임에 제출된 내장 구현을 찾는 방법을 제공합니다.
pub trait Registrable: Send + Sync + 'static {
    /// 에러 메시지에 쓰이는 종류 이름 (예: `"serializer"`)
    const KIND: &'static str;

    /// `inventory`로 제출된 내장 구현 중 `name`에 해당하는 인스턴스를 생성합니다.
    fn builtin(name: &str) -> Option<Arc<Self>>;

    /// 내장 구현 이름 목록
    fn builtin_names() -> Vec<&'static str>;
}

/// 인스턴스, 팩토리, 또는 등록 이름으로 지정된 컴포넌트
///
/// 설정 단계에서는 아무것도 생성하지 않고, [`Component::resolve`]가 호출되는
/// 최초 사용 시점에 실제 인스턴스로 해석됩니다. 잘못된 이름은 그때
/// `CacheError::Configuration`으로 드러납니다.
pub enum Component<T: ?Sized> {
    /// 이미 만들어진 인스턴스
    Instance(Arc<T>),
    /// 인자 없는 생성자
    Factory(fn() -> Arc<T>),
    /// [`ComponentRegistry`]에 등록된 이름
    Named(String),
}

impl<T: Registrable + ?Sized> Component<T> {
    /// 컴포넌트를 실제 인스턴스로 해석합니다.
    ///
    /// ## 에러
    ///
    /// - `CacheError::Configuration` - 등록되지 않은 이름
    pub fn resolve(&self) -> CacheResult<Arc<T>> {
        match self {
            Component::Instance(instance) => Ok(instance.clone()),
            Component::Factory(constructor) => Ok(constructor()),
            Component::Named(name) => ComponentRegistry::lookup::<T>(name).ok_or_else(|| {
                CacheError::Configuration(format!(
                    "unknown {} '{}' (available: {})",
                    T::KIND,
                    name,
                    ComponentRegistry::names::<T>().join(", ")
                ))
            }),
        }
    }
}

impl<T: ?Sized> Clone for Component<T> {
    fn clone(&self) -> Self {
        match self {
            Component::Instance(instance) => Component::Instance(instance.clone()),
            Component::Factory(constructor) => Component::Factory(*constructor),
            Component::Named(name) => Component::Named(name.clone()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Instance(_) => f.write_str("Component::Instance(..)"),
            Component::Factory(_) => f.write_str("Component::Factory(..)"),
            Component::Named(name) => write!(f, "Component::Named({:?})", name),
        }
    }
}

impl<T: ?Sized> From<&str> for Component<T> {
    fn from(name: &str) -> Self {
        Component::Named(name.to_string())
    }
}

impl<T: ?Sized> From<String> for Component<T> {
    fn from(name: String) -> Self {
        Component::Named(name)
    }
}

impl<T: ?Sized> From<Arc<T>> for Component<T> {
    fn from(instance: Arc<T>) -> Self {
        Component::Instance(instance)
    }
}

type RegistryKey = (TypeId, String);

/// 프로세스 전역 컴포넌트 레지스트리
///
/// 키는 `(컴포넌트 종류의 TypeId, 소문자 이름)`이며, 값은 `Arc<T>`를
/// `Any`로 감싼 것입니다. 커넥션 풀 자체는 여기에 두지 않습니다. 풀은
/// 각 클라이언트가 소유합니다.
pub struct ComponentRegistry {
    instances: RwLock<HashMap<RegistryKey, Arc<dyn Any + Send + Sync>>>,
}

impl ComponentRegistry {
    fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }

    fn key<T: Registrable + ?Sized>(name: &str) -> RegistryKey {
        (TypeId::of::<T>(), name.trim().to_ascii_lowercase())
    }

    /// 이름으로 컴포넌트를 등록합니다. 같은 이름의 기존 등록(내장 포함)을 덮어씁니다.
    ///
    /// 애플리케이션 시작 시, 클라이언트가 해당 이름을 처음 해석하기 전에 호출해야 합니다.
    /// 이미 해석되어 클라이언트에 캐시된 인스턴스는 바뀌지 않습니다.
    pub fn register<T: Registrable + ?Sized>(name: &str, component: Arc<T>) {
        let key = Self::key::<T>(name);
        info!("📦 Registering {} '{}'", T::KIND, key.1);

        let mut instances = REGISTRY.instances.write().expect("component registry lock poisoned");
        instances.insert(key, Arc::new(component) as Arc<dyn Any + Send + Sync>);
    }

    /// 이름으로 컴포넌트를 찾습니다. 호스트 등록을 먼저 보고, 없으면 내장 구현을 생성해 캐시합니다.
    pub fn lookup<T: Registrable + ?Sized>(name: &str) -> Option<Arc<T>> {
        let key = Self::key::<T>(name);

        {
            let instances = REGISTRY.instances.read().expect("component registry lock poisoned");
            if let Some(found) = instances.get(&key) {
                return found.downcast_ref::<Arc<T>>().cloned();
            }
        }

        let built = T::builtin(&key.1)?;
        debug!("Resolved builtin {} '{}'", T::KIND, key.1);

        let mut instances = REGISTRY.instances.write().expect("component registry lock poisoned");
        let stored = instances
            .entry(key)
            .or_insert_with(|| Arc::new(built) as Arc<dyn Any + Send + Sync>);
        stored.downcast_ref::<Arc<T>>().cloned()
    }

    /// 해당 종류로 해석 가능한 모든 이름 (정렬됨)
    pub fn names<T: Registrable + ?Sized>() -> Vec<String> {
        let type_id = TypeId::of::<T>();
        let mut names: Vec<String> = T::builtin_names().into_iter().map(str::to_string).collect();

        {
            let instances = REGISTRY.instances.read().expect("component registry lock poisoned");
            names.extend(
                instances
                    .keys()
                    .filter(|(id, _)| *id == type_id)
                    .map(|(_, name)| name.clone()),
            );
        }

        names.sort();
        names.dedup();
        names
    }
}

static REGISTRY: Lazy<ComponentRegistry> = Lazy::new(ComponentRegistry::new);
