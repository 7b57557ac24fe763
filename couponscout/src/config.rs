use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::coupon::DEFAULT_TOKEN_LEN;
use crate::errors::{SearchError, SearchResult};

/// Configuration for coupon verification.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.couponscout.yaml` in the current directory
/// 3. Global `$HOME/.config/couponscout/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Coupon base files, each holding one code per line
/// coupon_files:
///   - "couponbase/couponbase1"
///   - "couponbase/couponbase2"
///   - "couponbase/couponbase3"
///
/// # Number of distinct files a code must appear in
/// coupon_min: 2
///
/// # Readers (byte ranges) and line scanners per file
/// producers_per_file: 10
/// consumers_per_file: 10
///
/// # Queue slots per reader, bounding memory per file
/// queue_capacity_per_producer: 100
///
/// # Accepted coupon code length, in bytes
/// min_token_len: 8
/// max_token_len: 10
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// The camel-cased keys `couponBase` and `couponMin` are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Files searched for the coupon code
    #[serde(alias = "couponBase", alias = "couponbase")]
    pub coupon_files: Vec<PathBuf>,

    /// Minimum number of distinct files that must contain the code
    #[serde(alias = "couponMin", alias = "couponmin", default = "default_coupon_min")]
    pub coupon_min: usize,

    /// Byte ranges read concurrently per file
    #[serde(default = "default_workers_per_file")]
    pub producers_per_file: NonZeroUsize,

    /// Line scanners draining each file's queue
    #[serde(default = "default_workers_per_file")]
    pub consumers_per_file: NonZeroUsize,

    /// Queue capacity contributed by each reader of a file
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity_per_producer: NonZeroUsize,

    /// Upper bound on worker threads a single search may use
    #[serde(default = "default_max_workers")]
    pub max_workers: NonZeroUsize,

    /// Shortest accepted coupon code, in bytes
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Longest accepted coupon code, in bytes
    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_coupon_min() -> usize {
    1
}

fn default_workers_per_file() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap()
}

fn default_queue_capacity() -> NonZeroUsize {
    NonZeroUsize::new(100).unwrap()
}

fn default_max_workers() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().max(1) * 64).unwrap()
}

fn default_min_token_len() -> usize {
    *DEFAULT_TOKEN_LEN.start()
}

fn default_max_token_len() -> usize {
    *DEFAULT_TOKEN_LEN.end()
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Values supplied on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub coupon_files: Vec<PathBuf>,
    pub coupon_min: Option<usize>,
    pub producers_per_file: Option<NonZeroUsize>,
    pub consumers_per_file: Option<NonZeroUsize>,
    pub max_workers: Option<NonZeroUsize>,
    pub log_level: Option<String>,
}

impl SearchConfig {
    /// Creates a configuration with default tuning for the given files.
    pub fn new(coupon_files: Vec<PathBuf>, coupon_min: usize) -> Self {
        Self {
            coupon_files,
            coupon_min,
            producers_per_file: default_workers_per_file(),
            consumers_per_file: default_workers_per_file(),
            queue_capacity_per_producer: default_queue_capacity(),
            max_workers: default_max_workers(),
            min_token_len: default_min_token_len(),
            max_token_len: default_max_token_len(),
            log_level: default_log_level(),
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("couponscout/config.yaml")),
            Some(PathBuf::from(".couponscout.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if !cli.coupon_files.is_empty() {
            self.coupon_files = cli.coupon_files;
        }
        if let Some(min) = cli.coupon_min {
            self.coupon_min = min;
        }
        if let Some(producers) = cli.producers_per_file {
            self.producers_per_file = producers;
        }
        if let Some(consumers) = cli.consumers_per_file {
            self.consumers_per_file = consumers;
        }
        if let Some(max_workers) = cli.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    /// Accepted coupon code lengths, in bytes
    pub fn token_len_range(&self) -> RangeInclusive<usize> {
        self.min_token_len..=self.max_token_len
    }

    /// Worker threads one search over every configured file asks for, before
    /// scaling to `max_workers`.
    pub fn workers_per_search(&self) -> usize {
        self.coupon_files.len()
            * (self.producers_per_file.get() + self.consumers_per_file.get())
    }

    /// Checks the invariants the engine relies on, including that every
    /// coupon file exists.
    pub fn validate(&self) -> SearchResult<()> {
        if self.coupon_files.is_empty() {
            return Err(SearchError::config_error("no coupon files configured"));
        }
        if self.coupon_min == 0 {
            return Err(SearchError::config_error("coupon_min must be at least 1"));
        }
        if self.coupon_min > self.coupon_files.len() {
            return Err(SearchError::config_error(format!(
                "coupon_min is {} but only {} coupon files are configured",
                self.coupon_min,
                self.coupon_files.len()
            )));
        }
        if self.min_token_len == 0 || self.min_token_len > self.max_token_len {
            return Err(SearchError::config_error(format!(
                "invalid coupon length range {}..={}",
                self.min_token_len, self.max_token_len
            )));
        }
        // Larger layouts are scaled down per search; one producer and one
        // consumer per file is the floor.
        if self.coupon_files.len() * 2 > self.max_workers.get() {
            return Err(SearchError::config_error(format!(
                "{} coupon files need at least {} workers but max_workers is {}",
                self.coupon_files.len(),
                self.coupon_files.len() * 2,
                self.max_workers
            )));
        }
        for path in &self.coupon_files {
            let metadata = path
                .metadata()
                .map_err(|e| SearchError::from_io(path, e))?;
            if !metadata.is_file() {
                return Err(SearchError::config_error(format!(
                    "coupon file {} is not a regular file",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            coupon_files: ["couponbase1", "couponbase2", "couponbase3"]
            coupon_min: 2
            producers_per_file: 4
            consumers_per_file: 2
            queue_capacity_per_producer: 16
            min_token_len: 6
            max_token_len: 12
            log_level: "debug"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = SearchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(
            config.coupon_files,
            vec![
                PathBuf::from("couponbase1"),
                PathBuf::from("couponbase2"),
                PathBuf::from("couponbase3")
            ]
        );
        assert_eq!(config.coupon_min, 2);
        assert_eq!(config.producers_per_file, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.consumers_per_file, NonZeroUsize::new(2).unwrap());
        assert_eq!(
            config.queue_capacity_per_producer,
            NonZeroUsize::new(16).unwrap()
        );
        assert_eq!(config.token_len_range(), 6..=12);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_camel_case_aliases() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "couponBase: [\"a\", \"b\"]\ncouponMin: 2\n",
        )
        .unwrap();

        let config = SearchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.coupon_files.len(), 2);
        assert_eq!(config.coupon_min, 2);
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "coupon_files: [\"only\"]\n").unwrap();

        let config = SearchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.coupon_min, 1);
        assert_eq!(config.producers_per_file, NonZeroUsize::new(10).unwrap());
        assert_eq!(config.consumers_per_file, NonZeroUsize::new(10).unwrap());
        assert_eq!(
            config.queue_capacity_per_producer,
            NonZeroUsize::new(100).unwrap()
        );
        assert_eq!(config.token_len_range(), DEFAULT_TOKEN_LEN);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "coupon_files: 42\nproducers_per_file: \"many\"\n",
        )
        .unwrap();

        assert!(SearchConfig::load_from(Some(&config_path)).is_err());
    }

    #[test]
    fn test_merge_with_cli() {
        let config = SearchConfig::new(vec![PathBuf::from("a"), PathBuf::from("b")], 1);
        let merged = config.merge_with_cli(ConfigOverrides {
            coupon_files: vec![PathBuf::from("c")],
            coupon_min: Some(1),
            producers_per_file: NonZeroUsize::new(3),
            consumers_per_file: None,
            max_workers: None,
            log_level: Some("trace".to_string()),
        });

        assert_eq!(merged.coupon_files, vec![PathBuf::from("c")]);
        assert_eq!(merged.producers_per_file, NonZeroUsize::new(3).unwrap());
        assert_eq!(merged.consumers_per_file, NonZeroUsize::new(10).unwrap());
        assert_eq!(merged.log_level, "trace");
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "CODE0001\n").unwrap();
        std::fs::write(&b, "CODE0002\n").unwrap();

        assert!(SearchConfig::new(vec![a.clone(), b.clone()], 2)
            .validate()
            .is_ok());

        let err = SearchConfig::new(vec![a.clone(), b.clone()], 3)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SearchError::ConfigError(_)));

        assert!(SearchConfig::new(vec![a.clone()], 0).validate().is_err());
        assert!(SearchConfig::new(vec![], 0).validate().is_err());

        let missing = dir.path().join("missing");
        let err = SearchConfig::new(vec![a.clone(), missing], 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SearchError::FileNotFound(_)));

        let mut tight = SearchConfig::new(vec![a, b], 1);
        tight.max_workers = NonZeroUsize::new(4).unwrap();
        assert!(tight.validate().is_ok());
        tight.max_workers = NonZeroUsize::new(3).unwrap();
        assert!(matches!(
            tight.validate(),
            Err(SearchError::ConfigError(_))
        ));
    }
}
