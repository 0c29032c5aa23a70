//! 만료 시간 해석
//!
//! 호출자가 넘긴 [`Timeout`]을 서버에 보낼 만료 시간(`Option<u64>` 초)으로 바꿉니다.
//!
//! | 입력 | 결과 |
//! |------|------|
//! | `Timeout::Default` | 클라이언트 기본값 (기본 300초) |
//! | `Timeout::Never` | `None` (만료 없음) |
//! | `Timeout::Seconds(n)` | `Some(max(0, n))`, 0은 삭제를 의미 |

use std::time::Duration;

/// 작업별 만료 시간 지정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// 클라이언트에 설정된 기본값 사용
    #[default]
    Default,
    /// 만료 없음
    Never,
    /// 초 단위 만료 시간. 음수는 0으로 취급하며, 0은 즉시 삭제입니다.
    Seconds(i64),
}

impl Timeout {
    /// 서버에 보낼 만료 시간으로 해석합니다.
    pub fn resolve(self, default: Option<u64>) -> Option<u64> {
        match self {
            Timeout::Default => default,
            Timeout::Never => None,
            Timeout::Seconds(seconds) => Some(seconds.max(0) as u64),
        }
    }
}

impl From<i64> for Timeout {
    fn from(seconds: i64) -> Self {
        Timeout::Seconds(seconds)
    }
}

impl From<Option<i64>> for Timeout {
    fn from(seconds: Option<i64>) -> Self {
        match seconds {
            Some(seconds) => Timeout::Seconds(seconds),
            None => Timeout::Never,
        }
    }
}

impl From<Duration> for Timeout {
    /// 초 미만은 버립니다.
    fn from(duration: Duration) -> Self {
        Timeout::Seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution() {
        assert_eq!(Timeout::Default.resolve(Some(300)), Some(300));
        assert_eq!(Timeout::Default.resolve(None), None);
        assert_eq!(Timeout::Never.resolve(Some(300)), None);
        assert_eq!(Timeout::Seconds(10).resolve(Some(300)), Some(10));
        assert_eq!(Timeout::Seconds(0).resolve(Some(300)), Some(0));
        assert_eq!(Timeout::Seconds(-5).resolve(Some(300)), Some(0));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Timeout::from(Duration::from_millis(2999)), Timeout::Seconds(2));
        assert_eq!(Timeout::from(None::<i64>), Timeout::Never);
        assert_eq!(Timeout::from(Some(7_i64)), Timeout::Seconds(7));
        assert_eq!(Timeout::from(3_i64), Timeout::Seconds(3));
    }
}
