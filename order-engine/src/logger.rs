//! Logging Infrastructure
//!
//! - Console output (pretty for development, JSON for production)
//! - Daily rotating application logs, deleted after 14 days
//! - Permanent audit logs for every submitted status transition

use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, prelude::*};

/// Application log retention
pub const APP_LOG_RETENTION_DAYS: i64 = 14;

const AUDIT_TARGET: &str = "audit";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Clean up application log files older than [`APP_LOG_RETENTION_DAYS`]
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);
    cleanup_logs_before(log_dir, cutoff)
}

/// Delete `app/` log files dated strictly before `cutoff`. Audit logs are never touched.
pub fn cleanup_logs_before(log_dir: &Path, cutoff: NaiveDate) -> anyhow::Result<usize> {
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(date) = log_file_date(name)
            && date < cutoff
        {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(removed)
}

/// Extract the date of `app.YYYY-MM-DD` (tracing-appender) or `app-YYYY-MM-DD.log`
fn log_file_date(name: &str) -> Option<NaiveDate> {
    let date_part = name
        .strip_prefix("app.")
        .or_else(|| name.strip_prefix("app-").and_then(|d| d.strip_suffix(".log")))?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn")
/// * `json_format` - JSON output (production) or pretty output (development)
/// * `log_dir` - Optional directory for file logging (e.g., Some("./logs"))
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// order_engine::logger::init_logger_with_file("info", true, Some("./logs"))?;
/// # Ok(())
/// # }
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    // Console layer
    layers.push(if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    });

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        let app_log_dir = log_dir.join("app");
        let audit_log_dir = log_dir.join("audit");
        fs::create_dir_all(&app_log_dir)?;
        fs::create_dir_all(&audit_log_dir)?;

        // 应用日志: 排除 audit target
        let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
        layers.push(file_layer(app_log, json_format, |target| target != AUDIT_TARGET));

        // 审计日志: 永久保存
        let audit_log = RollingFileAppender::new(Rotation::DAILY, audit_log_dir, "audit");
        layers.push(file_layer(audit_log, json_format, |target| target == AUDIT_TARGET));

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(periodic_cleanup(log_dir.to_path_buf()));
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

fn file_layer(
    appender: RollingFileAppender,
    json_format: bool,
    accept: fn(&str) -> bool,
) -> BoxedLayer {
    let filter = tracing_subscriber::filter::filter_fn(move |meta| accept(meta.target()));
    let writer = std::sync::Mutex::new(appender);

    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

/// Hourly cleanup of expired application logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Audit log helper - records order status writes
///
/// Audit logs go to `audit/` and are never deleted.
///
/// ```ignore
/// audit_log!("tenant-1", "transition", "order:42", "pending -> confirmed");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($tenant_id:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            tenant_id = $tenant_id,
            action = $action,
            resource = $resource,
            timestamp = chrono::Utc::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($tenant_id:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            tenant_id = $tenant_id,
            action = $action,
            resource = $resource,
            details = $details,
            timestamp = chrono::Utc::now().to_rfc3339(),
            "AUDIT"
        );
    };
}
