use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::messages;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// 制限超過時のメッセージ（待ち時間付き）
fn check(limiter: &KeyedLimiter, key: &str) -> Result<(), String> {
    match limiter.check_key(&key.to_string()) {
        Ok(_) => Ok(()),
        Err(negative) => {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            let minutes = wait_time.as_secs() / 60;
            let seconds = wait_time.as_secs() % 60;

            let time_msg = if minutes > 0 {
                format!("{}m {}s", minutes, seconds)
            } else {
                format!("{}s", seconds.max(1))
            };

            Err(format!("{} ({})", messages::TOO_MANY_REQUESTS, time_msg))
        }
    }
}

/// 認証エンドポイント用のレートリミッター（IPごと）
pub struct AuthRateLimiter {
    per_ip: Arc<KeyedLimiter>,
}

impl AuthRateLimiter {
    pub fn new() -> Self {
        // 1時間に30回
        Self::with_quota(Quota::per_hour(non_zero(30)))
    }

    pub fn with_quota(quota: Quota) -> Self {
        Self {
            per_ip: Arc::new(RateLimiter::dashmap(quota)),
        }
    }

    pub fn check_ip_limit(&self, ip: &str) -> Result<(), String> {
        check(&self.per_ip, ip)
    }
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// AI要約生成用のレートリミッター（IPごと、匿名利用のため）
pub struct GenerationRateLimiter {
    per_ip: Arc<KeyedLimiter>,
}

impl GenerationRateLimiter {
    pub fn new() -> Self {
        // 1分間に5回
        Self::with_quota(Quota::per_minute(non_zero(5)))
    }

    pub fn with_quota(quota: Quota) -> Self {
        Self {
            per_ip: Arc::new(RateLimiter::dashmap(quota)),
        }
    }

    pub fn check_ip_limit(&self, ip: &str) -> Result<(), String> {
        check(&self.per_ip, ip)
    }
}

impl Default for GenerationRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// パスワードリセットメール用のレートリミッター（アドレスごと）
pub struct EmailRateLimiter {
    per_email: Arc<KeyedLimiter>,
}

impl EmailRateLimiter {
    pub fn new() -> Self {
        // 15分間に3通まで
        let quota = Quota::with_period(Duration::from_secs(5 * 60))
            .unwrap_or_else(|| Quota::per_hour(non_zero(12)))
            .allow_burst(non_zero(3));
        Self::with_quota(quota)
    }

    pub fn with_quota(quota: Quota) -> Self {
        Self {
            per_email: Arc::new(RateLimiter::dashmap(quota)),
        }
    }

    pub fn check_email_limit(&self, email: &str) -> Result<(), String> {
        check(&self.per_email, email)
    }
}

impl Default for EmailRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
