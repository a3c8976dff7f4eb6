//! Configuration for the conversion service.
//!
//! Every knob lives in one immutable [`ServiceConfig`], built once at startup
//! via [`ServiceConfigBuilder`] and then shared read-only (behind an `Arc`) by
//! the orchestrator, the artifact store, the expiry scheduler and the HTTP
//! layer. Nothing reads the environment after `build()`.

use crate::error::DocConvError;
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted artifact lifetime: 100 years.
pub const MAX_EXPIRY_HOURS: u64 = 100 * 365 * 24;

/// How long persisted artifacts live before the expiry scheduler removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Artifacts are kept forever; the scheduler never starts.
    Never,
    /// Artifacts older than this are deleted on the next sweep.
    After(Duration),
}

impl Default for ExpiryPolicy {
    /// 24 hours.
    fn default() -> Self {
        ExpiryPolicy::After(Duration::from_secs(24 * 3600))
    }
}

impl ExpiryPolicy {
    /// Interpret an hour count the way the service has always done:
    /// zero or negative means "never expire".
    pub fn from_hours(hours: i64) -> Self {
        if hours <= 0 {
            ExpiryPolicy::Never
        } else {
            let secs = (hours as u64).checked_mul(3600);
            ExpiryPolicy::After(secs.map_or(Duration::MAX, Duration::from_secs))
        }
    }

    /// The effective time-to-live, or `None` when expiry is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            ExpiryPolicy::Never => None,
            ExpiryPolicy::After(d) if d.is_zero() => None,
            ExpiryPolicy::After(d) => Some(*d),
        }
    }

    /// Whole hours of TTL, `0` when disabled. Reported by the health endpoint.
    pub fn hours(&self) -> u64 {
        self.ttl().map(|d| d.as_secs() / 3600).unwrap_or(0)
    }
}

/// Configuration for a conversion service instance.
///
/// Built via [`ServiceConfig::builder()`] or using [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docconv::{ExpiryPolicy, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .data_dir("/var/lib/docconv/data")
///     .tmp_dir("/var/lib/docconv/tmp")
///     .expiry(ExpiryPolicy::from_hours(6))
///     .build()
///     .unwrap();
/// assert_eq!(config.expiry.hours(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Program name or path of the LibreOffice executable. Default: `soffice`.
    pub soffice_path: PathBuf,

    /// Durable root for converted artifacts (`<data_dir>/<YYYYMMDD>/...`). Default: `./data`.
    pub data_dir: PathBuf,

    /// Shared root for per-request workspaces (`<tmp_dir>/work_<id>`). Default: `./tmp`.
    pub tmp_dir: PathBuf,

    /// Artifact time-to-live. Default: 24 hours.
    pub expiry: ExpiryPolicy,

    /// Period of the expiry sweep. Default: 1 hour.
    pub sweep_interval: Duration,

    /// Hard limit for one engine invocation. Default: 120 s.
    ///
    /// A wedged LibreOffice process never exits on its own; without a limit the
    /// request (and its workspace) would live forever.
    pub engine_timeout: Duration,

    /// Maximum accepted upload size in bytes. Default: 100 MiB.
    pub max_content_length: usize,

    /// Maximum simultaneous engine invocations; `0` means unbounded. Default: 0.
    pub max_concurrent_conversions: usize,

    /// Listen address. Default: `0.0.0.0`.
    pub host: String,

    /// Listen port. Default: 15000.
    pub port: u16,

    /// Verbose logging. Default: false.
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            soffice_path: PathBuf::from(soffice_locate::DEFAULT_PROGRAM),
            data_dir: PathBuf::from("data"),
            tmp_dir: PathBuf::from("tmp"),
            expiry: ExpiryPolicy::default(),
            sweep_interval: Duration::from_secs(3600),
            engine_timeout: Duration::from_secs(120),
            max_content_length: 100 * 1024 * 1024,
            max_concurrent_conversions: 0,
            host: "0.0.0.0".to_string(),
            port: 15000,
            debug: false,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` for the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tmp_dir = dir.into();
        self
    }

    pub fn expiry(mut self, policy: ExpiryPolicy) -> Self {
        self.config.expiry = policy;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn engine_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine_timeout = timeout;
        self
    }

    pub fn max_content_length(mut self, bytes: usize) -> Self {
        self.config.max_content_length = bytes;
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.config.debug = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DocConvError> {
        let c = &self.config;
        if c.data_dir.as_os_str().is_empty() {
            return Err(DocConvError::InvalidConfig(
                "data directory must not be empty".into(),
            ));
        }
        if c.tmp_dir.as_os_str().is_empty() {
            return Err(DocConvError::InvalidConfig(
                "temporary directory must not be empty".into(),
            ));
        }
        if c.data_dir == c.tmp_dir {
            return Err(DocConvError::InvalidConfig(
                "data and temporary directories must differ".into(),
            ));
        }
        if c.sweep_interval.is_zero() {
            return Err(DocConvError::InvalidConfig(
                "sweep interval must be > 0".into(),
            ));
        }
        if c.engine_timeout.is_zero() {
            return Err(DocConvError::InvalidConfig(
                "engine timeout must be > 0".into(),
            ));
        }
        if let Some(ttl) = c.expiry.ttl() {
            if ttl > Duration::from_secs(MAX_EXPIRY_HOURS * 3600) {
                return Err(DocConvError::InvalidConfig(format!(
                    "file expiry must be at most {MAX_EXPIRY_HOURS} hours"
                )));
            }
        }
        if c.max_content_length == 0 {
            return Err(DocConvError::InvalidConfig(
                "max content length must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
