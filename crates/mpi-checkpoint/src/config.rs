//! Checkpoint configuration
//!
//! Configuration comes from an optional `key = value` file named by the
//! `MPI_CHECKPOINT_CONFIG` environment variable, with two further
//! environment overrides: `MPI_NO_CHECKPOINT` (set at all: disable every
//! create/restore) and `MPI_CHECKPOINT` (`dmtcp`: route creation through
//! the external whole-process tool; a directory path: restore source;
//! unset: no restore requested).

use std::env;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;

/// Maximum accepted `compression-level`. The mmap core never compresses;
/// the key is range-checked for compatibility with the file-based variant.
const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Where `create` sends checkpoints and `restore` finds them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckpointSource {
    /// No restore requested; creation writes mapped per-rank files.
    #[default]
    None,
    /// Whole-process checkpoints taken by the external DMTCP tool.
    Dmtcp,
    /// Restore from the per-rank files under this directory.
    Directory(PathBuf),
}

/// Process-wide checkpoint policy, fixed at initialization.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Path prefix for new checkpoint directories.
    pub prefix: String,
    /// Minimum wall-clock seconds between successful creations.
    pub min_interval_secs: u64,
    /// Emit per-checkpoint diagnostic lines.
    pub verbose: bool,
    /// Parsed but unused by the mmap core.
    pub compression_level: u32,
    /// All creation and restoration disabled.
    pub disabled: bool,
    /// Checkpoint backend / restore source.
    pub source: CheckpointSource,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            min_interval_secs: 0,
            verbose: false,
            compression_level: 0,
            disabled: false,
            source: CheckpointSource::None,
        }
    }
}

impl CheckpointConfig {
    /// Parse a configuration file body, overlaying `self`.
    ///
    /// Lines without `=` are skipped; whitespace is trimmed around both
    /// sides of the `=`; unknown keys are ignored.
    pub fn apply_file(&mut self, text: &str) -> Result<(), ConfigError> {
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            trace!("config entry: {key:?} = {value:?}");
            match key {
                "checkpoint-prefix" => {
                    self.prefix = value.to_string();
                }
                "checkpoint-min-interval" => {
                    self.min_interval_secs = parse_interval(value)?;
                }
                "verbose" => {
                    self.verbose = match value {
                        "0" => false,
                        "1" => true,
                        other => return Err(ConfigError::BadVerboseFlag(other.to_string())),
                    };
                }
                "compression-level" => {
                    let level: u32 = value
                        .parse()
                        .map_err(|_| ConfigError::BadCompressionLevel(value.to_string()))?;
                    if level > MAX_COMPRESSION_LEVEL {
                        return Err(ConfigError::BadCompressionLevel(value.to_string()));
                    }
                    self.compression_level = level;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build the configuration from the environment: defaults, then the
    /// file named by `MPI_CHECKPOINT_CONFIG` (if any), then the override
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = env::var_os("MPI_CHECKPOINT_CONFIG") {
            let path = PathBuf::from(path);
            let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            config.apply_file(&text)?;
            debug!("loaded checkpoint configuration from {}", path.display());
        }
        if env::var_os("MPI_NO_CHECKPOINT").is_some() {
            config.disabled = true;
        }
        config.source = match env::var("MPI_CHECKPOINT") {
            Ok(value) if value == "dmtcp" => CheckpointSource::Dmtcp,
            Ok(value) if value.is_empty() => CheckpointSource::None,
            Ok(value) => CheckpointSource::Directory(PathBuf::from(value)),
            Err(_) => CheckpointSource::None,
        };
        Ok(config)
    }
}

/// Parse an interval with an optional `s`/`m`/`h`/`d` suffix into seconds.
fn parse_interval(value: &str) -> Result<u64, ConfigError> {
    let digits_end = value
        .rfind(|c: char| c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let (number, suffix) = value.split_at(digits_end);
    let multiplier = match suffix {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(ConfigError::BadIntervalSuffix(other.to_string())),
    };
    let seconds: u64 = number
        .parse()
        .map_err(|_| ConfigError::BadInterval(value.to_string()))?;
    Ok(seconds * multiplier)
}

/// Default checkpoint prefix: the running program's own name.
fn default_prefix() -> String {
    env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "checkpoint".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_keys() {
        let mut config = CheckpointConfig::default();
        config
            .apply_file(
                "checkpoint-prefix = /scratch/run42\n\
                 checkpoint-min-interval = 30m\n\
                 verbose = 1\n\
                 compression-level = 6\n",
            )
            .unwrap();
        assert_eq!(config.prefix, "/scratch/run42");
        assert_eq!(config.min_interval_secs, 30 * 60);
        assert!(config.verbose);
        assert_eq!(config.compression_level, 6);
    }

    #[test]
    fn skips_unknown_keys_and_bare_lines() {
        let mut config = CheckpointConfig::default();
        config
            .apply_file("no equals here\nsome-other-tool = on\n")
            .unwrap();
        assert_eq!(config.min_interval_secs, 0);
        assert!(!config.verbose);
    }

    #[test]
    fn interval_suffixes() {
        assert_eq!(parse_interval("90").unwrap(), 90);
        assert_eq!(parse_interval("90s").unwrap(), 90);
        assert_eq!(parse_interval("2m").unwrap(), 120);
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("2d").unwrap(), 2 * 86400);
        assert!(matches!(
            parse_interval("10w"),
            Err(ConfigError::BadIntervalSuffix(_))
        ));
        assert!(matches!(
            parse_interval("tenseconds"),
            Err(ConfigError::BadIntervalSuffix(_))
        ));
        assert!(matches!(parse_interval("s"), Err(ConfigError::BadInterval(_))));
    }

    #[test]
    fn rejects_out_of_range_compression_level() {
        let mut config = CheckpointConfig::default();
        let err = config.apply_file("compression-level = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadCompressionLevel(_)));
    }

    #[test]
    fn whitespace_is_trimmed_around_equals() {
        let mut config = CheckpointConfig::default();
        config
            .apply_file("   checkpoint-prefix   =   app   \n")
            .unwrap();
        assert_eq!(config.prefix, "app");
    }
}
