//! 营业日计算 — 租户时区 + 营业日切换时间
//!
//! 统计按租户的营业日划分，而不是按进程所在时区，
//! 避免租户与服务运行在不同时区时出现日期偏移。

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Tenant day-boundary function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    /// 租户时区
    pub timezone: Tz,
    /// 营业日切换时间 (默认 00:00)
    pub day_cutoff: NaiveTime,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            day_cutoff: NaiveTime::MIN,
        }
    }
}

impl BusinessCalendar {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            day_cutoff: NaiveTime::MIN,
        }
    }

    /// 设置营业日切换时间
    pub fn with_cutoff(mut self, cutoff: NaiveTime) -> Self {
        self.day_cutoff = cutoff;
        self
    }

    /// 计算时间戳所属营业日 (业务时区)
    ///
    /// 本地时间 < cutoff → 仍属于"昨天"的营业日
    pub fn day_of(&self, millis: i64) -> NaiveDate {
        let utc: DateTime<Utc> = DateTime::from_timestamp_millis(millis).unwrap_or_default();
        let local = self.timezone.from_utc_datetime(&utc.naive_utc());
        if local.time() < self.day_cutoff {
            (local - chrono::Duration::days(1)).date_naive()
        } else {
            local.date_naive()
        }
    }

    /// Closure form for `aggregate`
    pub fn day_fn(&self) -> impl Fn(i64) -> NaiveDate + '_ {
        move |millis| self.day_of(millis)
    }
}

/// 解析时区名称 (IANA, 例如 "Europe/Madrid")
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// 解析 cutoff 时间字符串 (HH:MM)，失败返回 00:00
pub fn parse_cutoff(cutoff: &str) -> NaiveTime {
    NaiveTime::parse_from_str(cutoff, "%H:%M").unwrap_or_else(|e| {
        tracing::warn!(
            "Failed to parse business_day_cutoff '{}': {}, falling back to 00:00",
            cutoff,
            e
        );
        NaiveTime::MIN
    })
}
