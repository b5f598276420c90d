//! Environment-driven configuration.

use std::time::Duration;

use crate::defaults;

/// Which work-queue backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Process-external durable broker, for production.
    Broker,
    /// In-memory FIFO with a bounded worker pool, for development and tests.
    Memory,
}

impl std::str::FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "broker" => Ok(QueueBackend::Broker),
            "memory" => Ok(QueueBackend::Memory),
            other => Err(format!("unknown QUEUE_BACKEND: {other}")),
        }
    }
}

/// Per-analyser enablement flags: a disabled analyser is skipped without
/// failing the job.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerFlags {
    pub image_inspector_enabled: bool,
    pub vulnerability_scan_enabled: bool,
    pub cis_audit_enabled: bool,
    pub layer_efficiency_enabled: bool,
}

impl Default for AnalyzerFlags {
    fn default() -> Self {
        Self {
            image_inspector_enabled: true,
            vulnerability_scan_enabled: true,
            cis_audit_enabled: true,
            layer_efficiency_enabled: true,
        }
    }
}

/// Top-level process configuration, assembled once at startup from the
/// environment and passed as an explicit dependency through the composition
/// root.
#[derive(Debug, Clone)]
pub struct Config {
    pub analyzers: AnalyzerFlagsConfig,
    pub ai_hook_url: String,
    pub ai_hook_provider: String,
    pub queue_backend: QueueBackend,
    pub broker_url: Option<String>,
    pub object_store_root: String,
    pub job_store_dsn: String,
    /// Base64-encoded 32-byte authenticated-encryption key for credentials at rest.
    pub encryption_key_base64: Option<String>,
    pub telemetry_enabled: bool,
    pub service_name: String,
    pub analyzer_timeout: Duration,
    pub inspection_timeout: Duration,
    pub lease_interval: Duration,
    pub max_retry: u32,
    pub bind_addr: String,
}

/// Env-var-backed mirror of [`AnalyzerFlags`]; kept separate so the
/// HTTP-facing `Config` doesn't need to know about the worker's runtime type.
pub type AnalyzerFlagsConfig = AnalyzerFlags;

impl Config {
    /// Load configuration from the process environment, falling back to
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            analyzers: AnalyzerFlags {
                image_inspector_enabled: env_bool("ANALYSER_IMAGE_INSPECTOR_ENABLED", true),
                vulnerability_scan_enabled: env_bool("ANALYSER_VULNERABILITY_SCAN_ENABLED", true),
                cis_audit_enabled: env_bool("ANALYSER_CIS_AUDIT_ENABLED", true),
                layer_efficiency_enabled: env_bool("ANALYSER_LAYER_EFFICIENCY_ENABLED", true),
            },
            ai_hook_url: std::env::var("AI_HOOK_URL")
                .unwrap_or_else(|_| "http://localhost:9090/synthesize".to_string()),
            ai_hook_provider: std::env::var("AI_HOOK_PROVIDER").unwrap_or_else(|_| "default".to_string()),
            queue_backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(QueueBackend::Memory),
            broker_url: std::env::var("QUEUE_BROKER_URL").ok(),
            object_store_root: std::env::var("OBJECT_STORE_ROOT")
                .unwrap_or_else(|_| "./data/artifacts".to_string()),
            job_store_dsn: std::env::var("JOB_STORE_DSN")
                .unwrap_or_else(|_| "sqlite://./data/hygiene.db?mode=rwc".to_string()),
            encryption_key_base64: std::env::var("HYGIENE_ENCRYPTION_KEY").ok(),
            telemetry_enabled: env_bool("TELEMETRY_ENABLED", true),
            service_name: std::env::var("HYGIENE_SERVICE_NAME")
                .unwrap_or_else(|_| "hygiene-platform".to_string()),
            analyzer_timeout: env_duration_secs("ANALYSER_TIMEOUT_SECONDS", defaults::DEFAULT_ANALYZER_TIMEOUT),
            inspection_timeout: env_duration_secs(
                "INSPECTION_TIMEOUT_SECONDS",
                defaults::DEFAULT_INSPECTION_TIMEOUT,
            ),
            lease_interval: env_duration_secs("LEASE_INTERVAL_SECONDS", defaults::DEFAULT_LEASE_INTERVAL),
            max_retry: std::env::var("QUEUE_MAX_RETRY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::DEFAULT_MAX_RETRY),
            bind_addr: std::env::var("HYGIENE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<QueueBackend>().unwrap(), QueueBackend::Memory);
        assert_eq!("BROKER".parse::<QueueBackend>().unwrap(), QueueBackend::Broker);
        assert!("bogus".parse::<QueueBackend>().is_err());
    }

    #[test]
    fn default_analyzer_flags_are_all_enabled() {
        let flags = AnalyzerFlags::default();
        assert!(flags.image_inspector_enabled);
        assert!(flags.vulnerability_scan_enabled);
        assert!(flags.cis_audit_enabled);
        assert!(flags.layer_efficiency_enabled);
    }
}
