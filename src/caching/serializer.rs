//! # 값 직렬화
//!
//! 캐시 값은 서버에 바이트열로 저장됩니다. [`Serializer`]는 `serde_json::Value`와
//! 바이트열 사이의 변환만 담당하고, 타입 변환(`T: Serialize`)은 파사드가 처리합니다.
//!
//! 기본 직렬화기 `"json"`은 정수를 십진수 텍스트(`b"42"`)로 저장하므로
//! 서버 측 `INCRBY`가 그대로 동작합니다.
//!
//! ## 커스텀 직렬화기
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use replica_cache::caching::serializer::Serializer;
//! use replica_cache::core::registry::ComponentRegistry;
//!
//! ComponentRegistry::register::<dyn Serializer>("pretty", Arc::new(PrettyJson));
//! // CACHE_SERIALIZER=pretty
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::core::errors::CacheResult;
use crate::core::registry::Registrable;

/// 값 ↔ 바이트열 변환기
///
/// `loads`는 서버가 값을 돌려준 경우에만 호출됩니다.
pub trait Serializer: Send + Sync {
    fn name(&self) -> &str;

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>>;

    fn loads(&self, data: &[u8]) -> CacheResult<Value>;
}

/// 기본 JSON 직렬화기
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn dumps(&self, value: &Value) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads(&self, data: &[u8]) -> CacheResult<Value> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// 링크 타임 직렬화기 등록 정보
pub struct SerializerRegistration {
    pub name: &'static str,
    pub constructor: fn() -> Arc<dyn Serializer>,
}

inventory::collect!(SerializerRegistration);

fn json() -> Arc<dyn Serializer> {
    Arc::new(JsonSerializer)
}

inventory::submit! {
    SerializerRegistration { name: "json", constructor: json }
}

impl Registrable for dyn Serializer {
    const KIND: &'static str = "serializer";

    fn builtin(name: &str) -> Option<Arc<Self>> {
        for registration in inventory::iter::<SerializerRegistration> {
            if registration.name == name {
                return Some((registration.constructor)());
            }
        }
        None
    }

    fn builtin_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        for registration in inventory::iter::<SerializerRegistration> {
            names.push(registration.name);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::CacheError;
    use serde_json::json;

    #[test]
    fn test_integers_are_stored_as_decimal_text() {
        let bytes = JsonSerializer.dumps(&json!(42)).unwrap();

        assert_eq!(bytes, b"42");
        assert_eq!(JsonSerializer.loads(b"8").unwrap(), json!(8));
    }

    #[test]
    fn test_structured_values_survive() {
        let value = json!({"name": "kim", "tags": ["a", "b"], "score": 1.5, "active": true, "none": null});

        let decoded = JsonSerializer.loads(&JsonSerializer.dumps(&value).unwrap()).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn test_invalid_payload_is_serialization_error() {
        assert!(matches!(
            JsonSerializer.loads(b"\x80not json"),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_json_is_builtin() {
        let names = <dyn Serializer as Registrable>::builtin_names();

        assert!(names.contains(&"json"));
        assert!(<dyn Serializer as Registrable>::builtin("json").is_some());
        assert!(<dyn Serializer as Registrable>::builtin("pickle").is_none());
    }
}
