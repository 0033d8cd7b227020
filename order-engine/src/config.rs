//! Engine configuration

use shared::order::OrderFilter;
use shared::stats::{BusinessCalendar, parse_cutoff, parse_timezone};
use std::time::Duration;

/// 变更订阅 (feed) 连接配置
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// 客户端名称 (握手时上报)
    pub client_name: String,
    /// 握手超时
    pub handshake_timeout: Duration,
    /// 是否启用自动重连
    pub auto_reconnect: bool,
    /// 重连延迟
    pub reconnect_delay: Duration,
    /// 最大重连延迟 (指数退避上限)
    pub max_reconnect_delay: Duration,
    /// 最大重连尝试次数 (0 表示无限重试)
    pub max_reconnect_attempts: u32,
}

impl Default for FeedConfig {
    /// 局域网优化配置
    fn default() -> Self {
        Self {
            client_name: "order-dashboard".to_string(),
            handshake_timeout: Duration::from_secs(3),
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(500),  // 首次重连 500ms
            max_reconnect_delay: Duration::from_secs(10), // 最长 10 秒退避
            max_reconnect_attempts: 0,
        }
    }
}

impl FeedConfig {
    /// 局域网配置 (默认)
    pub fn lan() -> Self {
        Self::default()
    }

    /// 广域网/互联网配置
    ///
    /// 容忍高延迟，退避上限 60 秒
    pub fn wan() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// 设置客户端名称
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// 设置自动重连
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// 设置重连延迟 (首次, 上限)
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    /// 设置最大重连尝试次数 (0 表示无限重试)
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// 第 `attempt` 次重连前的等待时间 (从 1 开始计数)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }

    /// 是否还允许第 `attempt` 次重连
    pub fn may_retry(&self, attempt: u32) -> bool {
        self.auto_reconnect
            && (self.max_reconnect_attempts == 0 || attempt <= self.max_reconnect_attempts)
    }
}

/// Engine configuration for one dashboard session
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tenant whose orders this session observes
    pub tenant_id: String,

    /// Which orders the displayed lists show (statistics always cover every order)
    pub filter: OrderFilter,

    /// Bound on every re-fetch
    pub fetch_timeout: Duration,

    /// Bound on every status write
    pub mutation_timeout: Duration,

    /// Condition writes on the status observed in the local view
    pub conditional_updates: bool,

    /// Tenant day boundary for statistics
    pub calendar: BusinessCalendar,

    /// Change feed connection settings
    pub feed: FeedConfig,

    /// Order store base URL (HTTP adapter)
    pub store_url: Option<String>,

    /// Bearer token for the order store
    pub store_token: Option<String>,

    /// Message bus address (TCP feed adapter), e.g. "127.0.0.1:8081"
    pub feed_addr: Option<String>,
}

impl EngineConfig {
    /// Create a configuration with defaults for `tenant_id`
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            filter: OrderFilter::All,
            fetch_timeout: Duration::from_secs(10),
            mutation_timeout: Duration::from_secs(10),
            conditional_updates: false,
            calendar: BusinessCalendar::default(),
            feed: FeedConfig::default(),
            store_url: None,
            store_token: None,
            feed_addr: None,
        }
    }

    /// Load from `ENGINE_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("ENGINE_TENANT_ID").unwrap_or_else(|_| "default".into()),
        );

        if let Some(ms) = env_parse::<u64>("ENGINE_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("ENGINE_MUTATION_TIMEOUT_MS") {
            config.mutation_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = env_parse::<bool>("ENGINE_CONDITIONAL_UPDATES") {
            config.conditional_updates = enabled;
        }
        if let Ok(filter) = std::env::var("ENGINE_FILTER") {
            config.filter = match filter.as_str() {
                "active" => OrderFilter::Active,
                _ => OrderFilter::All,
            };
        }
        if let Ok(name) = std::env::var("ENGINE_TIMEZONE") {
            match parse_timezone(&name) {
                Some(tz) => config.calendar.timezone = tz,
                None => tracing::warn!("Unknown ENGINE_TIMEZONE '{}', using UTC", name),
            }
        }
        if let Ok(cutoff) = std::env::var("ENGINE_DAY_CUTOFF") {
            config.calendar.day_cutoff = parse_cutoff(&cutoff);
        }
        if let Some(enabled) = env_parse::<bool>("ENGINE_FEED_AUTO_RECONNECT") {
            config.feed.auto_reconnect = enabled;
        }

        config.store_url = std::env::var("ENGINE_STORE_URL").ok();
        config.store_token = std::env::var("ENGINE_STORE_TOKEN").ok();
        config.feed_addr = std::env::var("ENGINE_FEED_ADDR").ok();
        config
    }

    pub fn with_filter(mut self, filter: OrderFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout = timeout;
        self
    }

    pub fn with_conditional_updates(mut self, enabled: bool) -> Self {
        self.conditional_updates = enabled;
        self
    }

    pub fn with_calendar(mut self, calendar: BusinessCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_feed(mut self, feed: FeedConfig) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    pub fn with_feed_addr(mut self, addr: impl Into<String>) -> Self {
        self.feed_addr = Some(addr.into());
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
