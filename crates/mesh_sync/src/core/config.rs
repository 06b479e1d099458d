//! # Sync Configuration
//!
//! Every behavioral switch of the mesh sync pipeline lives here and is handed
//! to the [`ResourceRegistry`](crate::registry::ResourceRegistry) when it is
//! constructed. Nothing in the pipeline reads the process environment.
//!
//! ## Configuration Categories
//!
//! - **Sync Config**: quadrangulation, normal packing, CPU/GPU compute, sharing
//! - **Logging Config**: default log level for applications
//! - **Application Config**: the two above bundled for file loading

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Mesh Sync Configuration
///
/// Switches consulted while resolving topology and primvars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quadrangulate every mesh whose scheme does not refine to triangles
    pub force_quadrangulate: bool,
    /// Store generated normals in the packed 2_10_10_10 encoding when possible
    pub packed_normals: bool,
    /// Queue GPU computations instead of CPU buffer-source computations
    pub gpu_compute: bool,
    /// Share immutable vertex primvar ranges between prims with equal content
    pub shared_vertex_primvar: bool,
    /// Run expensive invariant checks (hash collision equality)
    pub safe_mode: bool,
    /// Sync dirty prims with a parallel-for
    pub parallel_sync: bool,
}

impl SyncConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            force_quadrangulate: false,
            packed_normals: true,
            gpu_compute: false,
            shared_vertex_primvar: true,
            safe_mode: cfg!(debug_assertions),
            parallel_sync: true,
        }
    }

    /// Force quadrangulation
    pub fn with_force_quadrangulate(mut self, enabled: bool) -> Self {
        self.force_quadrangulate = enabled;
        self
    }

    /// Enable or disable packed normals
    pub fn with_packed_normals(mut self, enabled: bool) -> Self {
        self.packed_normals = enabled;
        self
    }

    /// Select GPU computations
    pub fn with_gpu_compute(mut self, enabled: bool) -> Self {
        self.gpu_compute = enabled;
        self
    }

    /// Enable or disable shared vertex primvar ranges
    pub fn with_shared_vertex_primvar(mut self, enabled: bool) -> Self {
        self.shared_vertex_primvar = enabled;
        self
    }

    /// Enable or disable safe mode checks
    pub fn with_safe_mode(mut self, enabled: bool) -> Self {
        self.safe_mode = enabled;
        self
    }

    /// Enable or disable parallel prim sync
    pub fn with_parallel_sync(mut self, enabled: bool) -> Self {
        self.parallel_sync = enabled;
        self
    }

    /// Validate the configuration
    ///
    /// Every combination of switches is meaningful today; this exists so
    /// loaders have a single place to reject settings later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Logging Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
}

impl LoggingConfig {
    const LEVELS: [&'static str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

    /// Create a new logging configuration
    pub fn new() -> Self {
        Self { level: "info".to_string() }
    }

    /// Set log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Validate the log level name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Self::LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                field: "logging.level",
                reason: format!("unknown level '{}'", self.level),
            })
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration loaded by applications driving the sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Sync pipeline configuration
    pub sync: SyncConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;
        self.logging.validate()
    }
}

impl Config for ApplicationConfig {}
