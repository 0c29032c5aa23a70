//! 레플리카 캐시 커맨드라인 도구
//!
//! 환경 변수로 구성한 캐시 클라이언트에 단일 명령을 실행합니다.
//! 블로킹 어댑터를 사용하므로 명령마다 커넥션을 열고 닫습니다.

use std::process::ExitCode;

use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use serde_json::Value;

use replica_cache::caching::{BlockingCacheClient, Timeout};
use replica_cache::config::CacheConfig;
use replica_cache::core::errors::{CacheError, CacheResult, ErrorContext};
use replica_cache::pool::KeyTtl;

const USAGE: &str = "\
usage: replica_cache <command> [args]

commands:
  get <key>                      값 조회
  set <key> <value> [timeout]    값 저장 (timeout: 초 | none)
  add <key> <value> [timeout]    키가 없을 때만 저장
  touch <key> [timeout]          만료 시간 갱신
  delete <key>                   키 삭제
  has <key>                      존재 여부
  incr <key> [delta]             정수 증가
  decr <key> [delta]             정수 감소
  ttl <key>                      남은 만료 시간
  clear                          primary DB 전체 삭제";

fn main() -> ExitCode {
    // 환경 설정 및 로깅 초기화
    load_env_file();
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

/// 명령을 실행하고 출력할 문자열을 반환합니다
fn run(args: &[String]) -> CacheResult<String> {
    let config = CacheConfig::from_env()?;
    info!("🚀 캐시 서버: {:?}", config.location);

    let client = config.into_client()?;
    let cache = BlockingCacheClient::new(&client);

    let command = args[0].as_str();
    let arg = |index: usize| {
        args.get(index)
            .map(String::as_str)
            .ok_or_else(|| CacheError::Configuration(format!("missing argument #{} for '{}'\n\n{}", index, command, USAGE)))
    };

    let output = match command {
        "get" => cache.get(arg(1)?, Value::Null)?.to_string(),
        "set" => {
            cache.set(arg(1)?, &parse_value(arg(2)?), parse_timeout(args.get(3))?)?;
            "OK".to_string()
        }
        "add" => cache.add(arg(1)?, &parse_value(arg(2)?), parse_timeout(args.get(3))?)?.to_string(),
        "touch" => cache.touch(arg(1)?, parse_timeout(args.get(2))?)?.to_string(),
        "delete" => cache.delete(arg(1)?)?.to_string(),
        "has" => cache.has_key(arg(1)?)?.to_string(),
        "incr" => cache.incr(arg(1)?, parse_delta(args.get(2))?)?.to_string(),
        "decr" => cache.decr(arg(1)?, parse_delta(args.get(2))?)?.to_string(),
        "ttl" => match cache.ttl(arg(1)?)? {
            KeyTtl::Missing => "missing".to_string(),
            KeyTtl::NoExpiry => "no expiry".to_string(),
            KeyTtl::ExpiresIn(left) => format!("{}s", left.as_secs()),
        },
        "clear" => {
            cache.clear()?;
            "OK".to_string()
        }
        other => {
            return Err(CacheError::Configuration(format!(
                "unknown command '{}'\n\n{}",
                other, USAGE
            )));
        }
    };

    Ok(output)
}

/// JSON으로 읽히면 JSON 값, 아니면 문자열로 취급합니다
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_timeout(raw: Option<&String>) -> CacheResult<Timeout> {
    match raw.map(|s| s.trim()) {
        None => Ok(Timeout::Default),
        Some(s) if s.eq_ignore_ascii_case("none") => Ok(Timeout::Never),
        Some(s) => s
            .parse::<i64>()
            .map(Timeout::Seconds)
            .with_context(|| format!("invalid timeout {:?}", s)),
    }
}

fn parse_delta(raw: Option<&String>) -> CacheResult<i64> {
    match raw {
        None => Ok(1),
        Some(s) => s.trim().parse().with_context(|| format!("invalid delta {:?}", s)),
    }
}

/// 환경별 설정 파일을 로드합니다
///
/// PROFILE 환경변수에 따라 적절한 .env 파일을 로드합니다.
///
/// # Environment Variables
///
/// * `PROFILE=dev` - .env.dev 파일 로드 (기본값)
/// * `PROFILE=prod` - .env.prod 파일 로드
/// * 기타 - 기본 .env 파일 로드
///
/// # Examples
///
/// ```bash
/// PROFILE=prod replica_cache get user:1
/// ```
fn load_env_file() {
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "dev".to_string());

    match profile.as_str() {
        "prod" => {
            dotenv::from_filename(".env.prod").ok();
        }
        "dev" => {
            dotenv::from_filename(".env.dev").ok();
        }
        _ => {
            dotenv().ok();
        }
    }
}

/// 로깅 시스템을 초기화합니다
///
/// 환경변수 RUST_LOG를 기반으로 로깅 레벨을 설정합니다.
///
/// # Environment Variables
///
/// * `RUST_LOG` - 로깅 레벨 설정 (기본값: "info,replica_cache=debug")
///
/// # Examples
///
/// ```bash
/// # 라우팅/커넥션 로그 숨기기
/// RUST_LOG=warn replica_cache has user:1
/// ```
fn init_logging() {
    env_logger::init_from_env(Env::default().default_filter_or("info,replica_cache=debug"));
}
