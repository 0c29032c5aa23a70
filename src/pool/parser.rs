//! 와이어 프로토콜 파서 선택
//!
//! 파싱 자체는 `redis` 크레이트가 수행하며, 여기서는 어느 프로토콜 버전으로
//! 연결할지만 고릅니다. 기본값은 드라이버 표준인 RESP2입니다.

use std::sync::Arc;

use redis::ProtocolVersion;

use crate::core::registry::Registrable;

/// 풀이 연결 시 사용할 프로토콜 파서
pub trait ProtocolParser: Send + Sync {
    fn name(&self) -> &str;

    fn protocol(&self) -> ProtocolVersion;
}

pub struct Resp2Parser;

impl ProtocolParser for Resp2Parser {
    fn name(&self) -> &str {
        "resp2"
    }

    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::RESP2
    }
}

pub struct Resp3Parser;

impl ProtocolParser for Resp3Parser {
    fn name(&self) -> &str {
        "resp3"
    }

    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::RESP3
    }
}

/// 링크 타임 파서 등록 정보
pub struct ParserRegistration {
    pub name: &'static str,
    pub constructor: fn() -> Arc<dyn ProtocolParser>,
}

inventory::collect!(ParserRegistration);

fn resp2() -> Arc<dyn ProtocolParser> {
    Arc::new(Resp2Parser)
}

fn resp3() -> Arc<dyn ProtocolParser> {
    Arc::new(Resp3Parser)
}

inventory::submit! {
    ParserRegistration { name: "resp2", constructor: resp2 }
}

inventory::submit! {
    ParserRegistration { name: "resp3", constructor: resp3 }
}

impl Registrable for dyn ProtocolParser {
    const KIND: &'static str = "parser class";

    fn builtin(name: &str) -> Option<Arc<Self>> {
        for registration in inventory::iter::<ParserRegistration> {
            if registration.name == name {
                return Some((registration.constructor)());
            }
        }
        None
    }

    fn builtin_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        for registration in inventory::iter::<ParserRegistration> {
            names.push(registration.name);
        }
        names
    }
}
