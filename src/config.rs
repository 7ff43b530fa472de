//! Configuration management for Agora.

use serde::{Deserialize, Serialize};

use crate::error::{AgoraError, Result};
use crate::ratelimit::{RateLimitPolicies, DEFAULT_SWEEP_INTERVAL_MS};

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgoraConfig {
    /// Photo compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Photo gallery configuration
    #[serde(default)]
    pub photos: PhotoConfig,
}

/// Photo compression configuration.
///
/// Qualities are percentages in `1..=100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Largest accepted upload, checked before decoding
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,

    /// Bounding box for the main image
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// Bounding box for the thumbnail
    #[serde(default = "default_thumbnail_dimension")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_dimension")]
    pub thumbnail_height: u32,

    /// Byte budget for the main image
    #[serde(default = "default_target_bytes")]
    pub target_bytes: usize,

    /// First JPEG attempt
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Second and last JPEG attempt when the first is over budget
    #[serde(default = "default_fallback_quality")]
    pub fallback_quality: u8,

    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,

    /// Check every Nth pixel when looking for transparency
    #[serde(default = "default_alpha_sample_stride")]
    pub alpha_sample_stride: usize,

    /// Alpha at or above this counts as opaque
    #[serde(default = "default_opaque_alpha")]
    pub opaque_alpha: u8,

    /// Photos of one batch decoded at the same time
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            thumbnail_width: default_thumbnail_dimension(),
            thumbnail_height: default_thumbnail_dimension(),
            target_bytes: default_target_bytes(),
            quality: default_quality(),
            fallback_quality: default_fallback_quality(),
            thumbnail_quality: default_thumbnail_quality(),
            alpha_sample_stride: default_alpha_sample_stride(),
            opaque_alpha: default_opaque_alpha(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

fn default_max_input_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_dimension() -> u32 {
    1200
}

fn default_thumbnail_dimension() -> u32 {
    400
}

fn default_target_bytes() -> usize {
    500 * 1024
}

fn default_quality() -> u8 {
    75
}

fn default_fallback_quality() -> u8 {
    60
}

fn default_thumbnail_quality() -> u8 {
    50
}

fn default_alpha_sample_stride() -> usize {
    100
}

fn default_opaque_alpha() -> u8 {
    250
}

fn default_batch_concurrency() -> usize {
    4
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Minimum time between sweeps of idle windows
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: i64,

    /// Accounts younger than this use the new-account posting rule
    #[serde(default = "default_new_account_age")]
    pub new_account_age_secs: i64,

    /// Skip rate limits for moderators and admins
    #[serde(default)]
    pub exempt_staff: bool,

    /// Per-action rules
    #[serde(default)]
    pub policies: RateLimitPolicies,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval(),
            new_account_age_secs: default_new_account_age(),
            exempt_staff: false,
            policies: RateLimitPolicies::default(),
        }
    }
}

fn default_sweep_interval() -> i64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

/// Largest account age threshold that still fits in milliseconds.
const MAX_NEW_ACCOUNT_AGE_SECS: i64 = i64::MAX / 1000;

fn default_new_account_age() -> i64 {
    24 * 60 * 60
}

/// Photo gallery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoConfig {
    /// Photos a single user may keep in the gallery
    #[serde(default = "default_photo_quota")]
    pub quota: u32,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            quota: default_photo_quota(),
        }
    }
}

fn default_photo_quota() -> u32 {
    100
}

impl AgoraConfig {
    /// Load configuration from a file path.
    ///
    /// Values can be overridden from the environment with the `AGORA`
    /// prefix, e.g. `AGORA_PHOTOS__QUOTA=250`.
    pub fn from_file(path: &str) -> Result<Self> {
        let config: AgoraConfig = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("AGORA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AgoraError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AgoraConfig = serde_yaml::from_str(yaml)
            .map_err(|e| AgoraError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.compression;

        if c.max_width == 0 || c.max_height == 0 {
            return Err(AgoraError::Config("main image box must be non-zero".into()));
        }
        if c.thumbnail_width == 0 || c.thumbnail_height == 0 {
            return Err(AgoraError::Config("thumbnail box must be non-zero".into()));
        }
        for (name, quality) in [
            ("quality", c.quality),
            ("fallback_quality", c.fallback_quality),
            ("thumbnail_quality", c.thumbnail_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(AgoraError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, quality
                )));
            }
        }
        if c.fallback_quality > c.quality {
            return Err(AgoraError::Config(format!(
                "fallback_quality ({}) must not exceed quality ({})",
                c.fallback_quality, c.quality
            )));
        }
        if c.alpha_sample_stride == 0 {
            return Err(AgoraError::Config("alpha_sample_stride must be at least 1".into()));
        }

        if c.batch_concurrency == 0 {
            return Err(AgoraError::Config("batch_concurrency must be at least 1".into()));
        }

        if self.rate_limiting.sweep_interval_ms <= 0 {
            return Err(AgoraError::Config("sweep_interval_ms must be positive".into()));
        }
        if !(0..=MAX_NEW_ACCOUNT_AGE_SECS).contains(&self.rate_limiting.new_account_age_secs) {
            return Err(AgoraError::Config(format!(
                "new_account_age_secs must be between 0 and {}",
                MAX_NEW_ACCOUNT_AGE_SECS
            )));
        }
        for (name, rule) in self.rate_limiting.policies.iter() {
            if rule.requests_per_unit == 0 {
                return Err(AgoraError::Config(format!(
                    "rate limit {} must allow at least one request",
                    name
                )));
            }
        }

        Ok(())
    }
}
