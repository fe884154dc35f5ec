//! Bus backend: walk udev's `hidraw` subsystem and read each node's identity
//! from the parent HID device's `HID_ID` property.

use super::{open_hidraw, parse_hid_id, CandidateSource, LocatorError, MAX_CANDIDATES};
use crate::catalog::HardwareId;
use crate::input::DeviceTransport;
use std::path::{Path, PathBuf};

pub struct UdevDiscovery;

fn udev_error(e: std::io::Error) -> LocatorError {
    LocatorError::Enumerate(e.to_string())
}

impl UdevDiscovery {
    fn hidraw_device(path: &Path) -> Result<udev::Device, LocatorError> {
        let path_error = |reason: String| LocatorError::PathError {
            path: path.to_path_buf(),
            reason,
        };

        let node = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let sysname = node
            .file_name()
            .ok_or_else(|| path_error("not a device node".into()))?;

        let mut enumerator = udev::Enumerator::new().map_err(udev_error)?;
        enumerator.match_subsystem("hidraw").map_err(udev_error)?;
        enumerator.match_sysname(sysname).map_err(udev_error)?;

        let device = enumerator.scan_devices().map_err(udev_error)?.next();
        device.ok_or_else(|| path_error("not known to udev".into()))
    }
}

impl CandidateSource for UdevDiscovery {
    fn candidates(&self) -> Result<Vec<PathBuf>, LocatorError> {
        let mut enumerator = udev::Enumerator::new().map_err(udev_error)?;
        enumerator.match_subsystem("hidraw").map_err(udev_error)?;

        let mut results: Vec<PathBuf> = enumerator
            .scan_devices()
            .map_err(udev_error)?
            .filter_map(|device| device.devnode().map(PathBuf::from))
            .collect();
        results.sort();
        results.truncate(MAX_CANDIDATES);
        Ok(results)
    }

    fn identify(&self, path: &Path) -> Result<HardwareId, LocatorError> {
        let path_error = |reason: String| LocatorError::PathError {
            path: path.to_path_buf(),
            reason,
        };

        let device = Self::hidraw_device(path)?;
        let hid = device
            .parent_with_subsystem("hid")
            .map_err(udev_error)?
            .ok_or_else(|| path_error("no HID parent".into()))?;
        let hid_id = hid
            .property_value("HID_ID")
            .and_then(|v| v.to_str())
            .ok_or_else(|| path_error("HID parent has no HID_ID".into()))?;

        parse_hid_id(hid_id).ok_or_else(|| path_error(format!("malformed HID_ID {hid_id:?}")))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError> {
        open_hidraw(path)
    }
}
