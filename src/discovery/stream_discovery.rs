//! Character-device backend: probe `/dev/hidraw0` .. `/dev/hidraw99` and read
//! each node's identity from its sysfs `device` link.

use super::{open_hidraw, parse_hid_id, CandidateSource, LocatorError, MAX_CANDIDATES};
use crate::catalog::HardwareId;
use crate::input::DeviceTransport;
use std::fs;
use std::path::{Path, PathBuf};

pub struct StreamDiscovery {
    dev_dir: PathBuf,
    sysfs_class: PathBuf,
}

impl Default for StreamDiscovery {
    fn default() -> Self {
        Self::new("/dev", "/sys/class/hidraw")
    }
}

impl StreamDiscovery {
    pub fn new(dev_dir: impl Into<PathBuf>, sysfs_class: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
            sysfs_class: sysfs_class.into(),
        }
    }
}

impl CandidateSource for StreamDiscovery {
    fn candidates(&self) -> Result<Vec<PathBuf>, LocatorError> {
        Ok((0..MAX_CANDIDATES)
            .map(|i| self.dev_dir.join(format!("hidraw{i}")))
            .filter(|path| path.exists())
            .collect())
    }

    fn identify(&self, path: &Path) -> Result<HardwareId, LocatorError> {
        let path_error = |reason: String| LocatorError::PathError {
            path: path.to_path_buf(),
            reason,
        };

        // Follow user-made aliases such as /dev/ebeam to the hidraw node.
        let node = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let name = node
            .file_name()
            .ok_or_else(|| path_error("not a device node".into()))?;

        let link = self.sysfs_class.join(name).join("device");
        let target = fs::read_link(&link)
            .map_err(|e| path_error(format!("{}: {e}", link.display())))?;
        let hid_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| path_error(format!("{} has no target name", link.display())))?;

        parse_hid_id(hid_name)
            .ok_or_else(|| path_error(format!("malformed device link {hid_name:?}")))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError> {
        open_hidraw(path)
    }
}
