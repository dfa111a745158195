//! Core daemon settings and loading logic

use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Filesystem locations the daemon works with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Directories scanned for source recordings
    #[serde(default)]
    pub watch_roots: Vec<PathBuf>,
    /// Directory converted files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory for in-flight conversion output
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("converted")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/convertd")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            watch_roots: Vec::new(),
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Conversion behavior knobs shared by all profiles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionConfig {
    /// Default backend attempt order; profiles may override
    #[serde(default = "default_backend_order")]
    pub backend_order: Vec<String>,
    /// Profile applied to files picked up by the watch-folder scanner
    #[serde(default)]
    pub default_profile: String,
    /// Maximum output width in pixels; wider sources are scaled down
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// User quality multiplier; 1.0 = profile quality as-is
    #[serde(default = "default_quality_multiplier")]
    pub quality_multiplier: f64,
    /// Seconds of encoder silence before a process is presumed hung (0 disables)
    #[serde(default = "default_hang_period_secs")]
    pub hang_period_secs: u64,
    /// Seconds a file's size must stay unchanged before it is picked up
    #[serde(default = "default_stability_wait_secs")]
    pub stability_wait_secs: u64,
    /// Whether to write .why.txt sidecars explaining failed conversions
    #[serde(default = "default_write_why_sidecars")]
    pub write_why_sidecars: bool,
}

fn default_backend_order() -> Vec<String> {
    vec![
        "copy".to_string(),
        "ffmpeg".to_string(),
        "mencoder".to_string(),
        "handbrake".to_string(),
    ]
}

fn default_max_width() -> u32 {
    720
}

fn default_quality_multiplier() -> f64 {
    1.0
}

fn default_hang_period_secs() -> u64 {
    300
}

fn default_stability_wait_secs() -> u64 {
    10
}

fn default_write_why_sidecars() -> bool {
    true
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend_order: default_backend_order(),
            default_profile: String::new(),
            max_width: default_max_width(),
            quality_multiplier: default_quality_multiplier(),
            hang_period_secs: default_hang_period_secs(),
            stability_wait_secs: default_stability_wait_secs(),
            write_why_sidecars: default_write_why_sidecars(),
        }
    }
}

/// CPU priority class applied to running encoder processes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CpuPriority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
}

impl Default for CpuPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// IO priority class applied to running encoder processes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IoPriority {
    Idle,
    Low,
    Normal,
}

impl Default for IoPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Scheduling settings applied live to every supervised encoder process
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SchedulingConfig {
    #[serde(default)]
    pub cpu_priority: CpuPriority,
    #[serde(default)]
    pub io_priority: IoPriority,
    /// Logical CPU indices the encoder may run on (empty = all)
    #[serde(default)]
    pub affinity: Vec<u32>,
    /// Maximum concurrent conversion jobs (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - CONVERTD_MAX_WIDTH -> conversion.max_width
    /// - CONVERTD_QUALITY_MULTIPLIER -> conversion.quality_multiplier
    /// - CONVERTD_HANG_PERIOD_SECS -> conversion.hang_period_secs
    /// - CONVERTD_MAX_CONCURRENT_JOBS -> scheduling.max_concurrent_jobs
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CONVERTD_MAX_WIDTH") {
            if let Ok(width) = val.parse::<u32>() {
                self.conversion.max_width = width;
            }
        }

        if let Ok(val) = env::var("CONVERTD_QUALITY_MULTIPLIER") {
            if let Ok(mult) = val.parse::<f64>() {
                self.conversion.quality_multiplier = mult;
            }
        }

        if let Ok(val) = env::var("CONVERTD_HANG_PERIOD_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.conversion.hang_period_secs = secs;
            }
        }

        if let Ok(val) = env::var("CONVERTD_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.scheduling.max_concurrent_jobs = jobs;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("CONVERTD_MAX_WIDTH");
        env::remove_var("CONVERTD_QUALITY_MULTIPLIER");
        env::remove_var("CONVERTD_HANG_PERIOD_SECS");
        env::remove_var("CONVERTD_MAX_CONCURRENT_JOBS");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Any valid TOML configuration string parses with all sections populated.
        #[test]
        fn prop_config_parses_all_sections(
            max_width in 16u32..4096,
            quality in 0.1f64..4.0,
            hang_secs in 0u64..3600,
            stability_secs in 0u64..300,
            max_jobs in 0u32..16,
            why_sidecars in proptest::bool::ANY,
        ) {
            let toml_str = format!(
                r#"
[paths]
watch_roots = ["/srv/recordings"]
output_dir = "/srv/converted"

[conversion]
max_width = {}
quality_multiplier = {}
hang_period_secs = {}
stability_wait_secs = {}
write_why_sidecars = {}

[scheduling]
cpu_priority = "below_normal"
io_priority = "low"
max_concurrent_jobs = {}
"#,
                max_width, quality, hang_secs, stability_secs, why_sidecars, max_jobs
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.conversion.max_width, max_width);
            prop_assert!((config.conversion.quality_multiplier - quality).abs() < 1e-9);
            prop_assert_eq!(config.conversion.hang_period_secs, hang_secs);
            prop_assert_eq!(config.conversion.stability_wait_secs, stability_secs);
            prop_assert_eq!(config.conversion.write_why_sidecars, why_sidecars);
            prop_assert_eq!(config.scheduling.max_concurrent_jobs, max_jobs);
            prop_assert_eq!(config.scheduling.cpu_priority, CpuPriority::BelowNormal);
            prop_assert_eq!(config.scheduling.io_priority, IoPriority::Low);
            prop_assert_eq!(
                config.paths.watch_roots,
                vec![PathBuf::from("/srv/recordings")]
            );
        }

        #[test]
        fn prop_env_overrides_max_width(
            initial_width in 16u32..4096,
            override_width in 16u32..4096,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[conversion]
max_width = {}
"#,
                initial_width
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("CONVERTD_MAX_WIDTH", override_width.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.conversion.max_width, override_width);
        }

        #[test]
        fn prop_env_overrides_hang_period(
            initial_secs in 0u64..3600,
            override_secs in 0u64..3600,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[conversion]
hang_period_secs = {}
"#,
                initial_secs
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("CONVERTD_HANG_PERIOD_SECS", override_secs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.conversion.hang_period_secs, override_secs);
        }

        #[test]
        fn prop_env_overrides_max_concurrent_jobs(
            initial_jobs in 0u32..8,
            override_jobs in 0u32..16,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[scheduling]
max_concurrent_jobs = {}
"#,
                initial_jobs
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("CONVERTD_MAX_CONCURRENT_JOBS", override_jobs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scheduling.max_concurrent_jobs, override_jobs);
        }
    }

    // Test that missing sections use defaults
    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert!(config.paths.watch_roots.is_empty());
        assert_eq!(config.conversion.max_width, 720);
        assert!((config.conversion.quality_multiplier - 1.0).abs() < 1e-9);
        assert_eq!(config.conversion.hang_period_secs, 300);
        assert_eq!(config.scheduling.cpu_priority, CpuPriority::Normal);
        assert_eq!(config.scheduling.io_priority, IoPriority::Normal);
        assert!(config.scheduling.affinity.is_empty());
        assert_eq!(config.scheduling.max_concurrent_jobs, 0);
        assert!(config.profiles.is_empty());
        assert_eq!(
            config.conversion.backend_order,
            vec!["copy", "ffmpeg", "mencoder", "handbrake"]
        );
    }

    // Test partial config with some sections missing
    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[conversion]
max_width = 1280
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.conversion.max_width, 1280);
        assert_eq!(config.conversion.hang_period_secs, 300); // default
        assert_eq!(config.scheduling.max_concurrent_jobs, 0); // default
        assert!(config.conversion.write_why_sidecars); // default
    }

    #[test]
    fn test_profile_lookup() {
        let toml_str = r#"
[[profile]]
name = "mp4-normal"

[[profile]]
name = "mkv-high"
"#;
        let config = Config::parse_toml(toml_str).expect("Should parse profiles");

        assert_eq!(config.profiles.len(), 2);
        assert!(config.profile("mp4-normal").is_some());
        assert!(config.profile("mkv-high").is_some());
        assert!(config.profile("missing").is_none());
    }
}
