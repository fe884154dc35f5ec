//! Driver settings file.
//!
//! Every key is optional:
//!
//! ```toml
//! device = "/dev/hidraw3"   # skip the search
//! backend = "udev"          # or "stream"
//! retry = true              # look for the receiver again after it is lost
//! backoff_ms = 500
//! calibration = "/etc/ebeamd/calibration.toml"
//! smoothing = false
//! ```
//!
//! Command line flags override values read from the file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How receiver nodes are enumerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Probe `/dev/hidrawN` and read ids from sysfs.
    #[default]
    Stream,
    /// Ask udev for hidraw devices.
    Udev,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub device: Option<PathBuf>,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_true")]
    pub retry: bool,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub calibration: Option<PathBuf>,
    #[serde(default)]
    pub smoothing: bool,
}

fn default_true() -> bool {
    true
}
fn default_backoff_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            backend: Backend::default(),
            retry: default_true(),
            backoff_ms: default_backoff_ms(),
            calibration: None,
            smoothing: false,
        }
    }
}

/// Values given on the command line. `None`/`false` leaves the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub no_retry: bool,
    pub calibration: Option<PathBuf>,
    pub smooth: bool,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if overrides.device.is_some() {
            self.device = overrides.device;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if overrides.no_retry {
            self.retry = false;
        }
        if overrides.calibration.is_some() {
            self.calibration = overrides.calibration;
        }
        self.smoothing |= overrides.smooth;
        self
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_gives_defaults() {
        let file = write("");
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.retry);
        assert_eq!(settings.backoff(), Duration::from_millis(500));
        assert_eq!(settings.backend, Backend::Stream);
    }

    #[test]
    fn reads_every_key() {
        let file = write(
            r#"
device = "/dev/hidraw3"
backend = "udev"
retry = false
backoff_ms = 2000
calibration = "/etc/ebeamd/calibration.toml"
smoothing = true
"#,
        );
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.device, Some(PathBuf::from("/dev/hidraw3")));
        assert_eq!(settings.backend, Backend::Udev);
        assert!(!settings.retry);
        assert_eq!(settings.backoff(), Duration::from_secs(2));
        assert_eq!(
            settings.calibration,
            Some(PathBuf::from("/etc/ebeamd/calibration.toml"))
        );
        assert!(settings.smoothing);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let file = write("retries = 3\n");
        assert!(matches!(
            Settings::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Settings::load(Path::new("/nonexistent/ebeamd.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn command_line_wins() {
        let file = Settings {
            device: Some("/dev/hidraw1".into()),
            calibration: Some("/a.toml".into()),
            ..Settings::default()
        };
        let settings = file.apply(Overrides {
            device: Some("/dev/hidraw2".into()),
            backend: Some(Backend::Udev),
            no_retry: true,
            calibration: None,
            smooth: true,
        });
        assert_eq!(settings.device, Some(PathBuf::from("/dev/hidraw2")));
        assert_eq!(settings.backend, Backend::Udev);
        assert!(!settings.retry);
        assert_eq!(settings.calibration, Some(PathBuf::from("/a.toml")));
        assert!(settings.smoothing);
    }

    #[test]
    fn empty_overrides_keep_file_values() {
        let file = Settings {
            retry: false,
            smoothing: true,
            backend: Backend::Udev,
            ..Settings::default()
        };
        assert_eq!(file.clone().apply(Overrides::default()), file);
    }
}
