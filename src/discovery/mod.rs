#[cfg(target_os = "linux")]
pub mod stream_discovery;
#[cfg(target_os = "linux")]
pub mod udev_discovery;

use crate::catalog::{DeviceCatalog, HardwareId};
use crate::input::DeviceTransport;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on candidates probed per search.
pub const MAX_CANDIDATES: usize = 100;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("{path}: unsupported device {id}")]
    UnsupportedDevice { path: PathBuf, id: HardwareId },
    #[error("{path}: cannot determine hardware id: {reason}")]
    PathError { path: PathBuf, reason: String },
    #[error("no supported eBeam receiver found")]
    NoDeviceFound,
    #[error("{path} is held by another process")]
    Busy { path: PathBuf },
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("device enumeration failed: {0}")]
    Enumerate(String),
}

/// One way of listing, identifying and opening receiver nodes.
pub trait CandidateSource {
    /// Candidate nodes in a stable order.
    fn candidates(&self) -> Result<Vec<PathBuf>, LocatorError>;
    fn identify(&self, path: &Path) -> Result<HardwareId, LocatorError>;
    fn open(&self, path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError>;
}

/// What the driver loop needs from device discovery.
pub trait Discover {
    fn discover(&mut self) -> Result<Box<dyn DeviceTransport>, LocatorError>;
}

/// Finds the one receiver this driver instance will own.
pub struct DeviceLocator {
    source: Box<dyn CandidateSource>,
    catalog: DeviceCatalog,
    explicit: Option<PathBuf>,
}

impl DeviceLocator {
    pub fn new(source: Box<dyn CandidateSource>, catalog: DeviceCatalog) -> Self {
        Self {
            source,
            catalog,
            explicit: None,
        }
    }

    /// Always use `path` instead of searching.
    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Open `explicit` if given, otherwise the first supported candidate.
    ///
    /// An explicit path is still checked against the catalog. During a
    /// search, failures of single candidates are logged and skipped.
    pub fn discover_at(
        &self,
        explicit: Option<&Path>,
    ) -> Result<Box<dyn DeviceTransport>, LocatorError> {
        if let Some(path) = explicit {
            return self.probe(path);
        }

        let candidates = self.source.candidates()?;
        for path in candidates.iter().take(MAX_CANDIDATES) {
            match self.probe(path) {
                Ok(transport) => return Ok(transport),
                Err(e @ (LocatorError::Busy { .. } | LocatorError::Open { .. })) => {
                    warn!("skipping candidate: {e}")
                }
                Err(e) => debug!("skipping candidate: {e}"),
            }
        }
        Err(LocatorError::NoDeviceFound)
    }

    fn probe(&self, path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError> {
        let id = self.source.identify(path)?;
        let Some(label) = self.catalog.label(id) else {
            return Err(LocatorError::UnsupportedDevice {
                path: path.to_path_buf(),
                id,
            });
        };
        let transport = self.source.open(path)?;
        info!("found {label} ({id}) at {}", path.display());
        Ok(transport)
    }
}

impl Discover for DeviceLocator {
    fn discover(&mut self) -> Result<Box<dyn DeviceTransport>, LocatorError> {
        self.discover_at(self.explicit.as_deref())
    }
}

/// Parse a kernel HID id, either the `HID_ID` uevent property
/// (`0003:00002650:00001311`) or a HID device name (`0003:2650:1311.0004`).
pub fn parse_hid_id(text: &str) -> Option<HardwareId> {
    let ids = text.split('.').next()?;
    let mut parts = ids.split(':');
    let (_bus, vendor, product) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let vendor = u16::try_from(u32::from_str_radix(vendor, 16).ok()?).ok()?;
    let product = u16::try_from(u32::from_str_radix(product, 16).ok()?).ok()?;
    Some(HardwareId::new(vendor, product))
}

#[cfg(target_os = "linux")]
fn open_hidraw(path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError> {
    use crate::input::hidraw::HidrawDevice;

    match HidrawDevice::open(path) {
        Ok(device) => Ok(Box::new(device)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(LocatorError::Busy {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(LocatorError::Open {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, PID_CLASSIC, VENDOR_ID};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct NullTransport(PathBuf);

    impl DeviceTransport for NullTransport {
        fn path(&self) -> &Path {
            &self.0
        }

        fn read_report(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FakeSource {
        order: Vec<PathBuf>,
        ids: HashMap<PathBuf, Option<HardwareId>>,
        busy: Vec<PathBuf>,
        opened: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeSource {
        fn with(mut self, path: &str, id: Option<HardwareId>) -> Self {
            self.order.push(PathBuf::from(path));
            self.ids.insert(PathBuf::from(path), id);
            self
        }
    }

    impl CandidateSource for FakeSource {
        fn candidates(&self) -> Result<Vec<PathBuf>, LocatorError> {
            Ok(self.order.clone())
        }

        fn identify(&self, path: &Path) -> Result<HardwareId, LocatorError> {
            self.ids
                .get(path)
                .copied()
                .flatten()
                .ok_or_else(|| LocatorError::PathError {
                    path: path.to_path_buf(),
                    reason: "no device link".into(),
                })
        }

        fn open(&self, path: &Path) -> Result<Box<dyn DeviceTransport>, LocatorError> {
            if self.busy.iter().any(|p| p == path) {
                return Err(LocatorError::Busy {
                    path: path.to_path_buf(),
                });
            }
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(NullTransport(path.to_path_buf())))
        }
    }

    static ONLY_CLASSIC: &[CatalogEntry] = &[CatalogEntry {
        id: HardwareId::new(VENDOR_ID, PID_CLASSIC),
        label: "eBeam Classic",
    }];

    const CLASSIC: HardwareId = HardwareId::new(VENDOR_ID, PID_CLASSIC);
    const MOUSE: HardwareId = HardwareId::new(0x046D, 0xC077);

    fn locator(source: FakeSource) -> DeviceLocator {
        DeviceLocator::new(Box::new(source), DeviceCatalog::new(ONLY_CLASSIC))
    }

    #[test]
    fn search_returns_the_only_matching_candidate() {
        let source = FakeSource::default()
            .with("/dev/hidraw0", Some(MOUSE))
            .with("/dev/hidraw1", None)
            .with("/dev/hidraw2", Some(CLASSIC))
            .with("/dev/hidraw3", Some(HardwareId::new(VENDOR_ID, 0x9999)));
        let opened = Arc::clone(&source.opened);

        let transport = locator(source).discover_at(None).unwrap();
        assert_eq!(transport.path(), Path::new("/dev/hidraw2"));
        assert_eq!(*opened.lock().unwrap(), vec![PathBuf::from("/dev/hidraw2")]);
    }

    #[test]
    fn search_without_match_is_no_device_found() {
        let source = FakeSource::default()
            .with("/dev/hidraw0", Some(MOUSE))
            .with("/dev/hidraw1", None);
        assert!(matches!(
            locator(source).discover_at(None),
            Err(LocatorError::NoDeviceFound)
        ));
    }

    #[test]
    fn busy_candidate_is_skipped() {
        let mut source = FakeSource::default()
            .with("/dev/hidraw0", Some(CLASSIC))
            .with("/dev/hidraw1", Some(CLASSIC));
        source.busy.push(PathBuf::from("/dev/hidraw0"));
        let transport = locator(source).discover_at(None).unwrap();
        assert_eq!(transport.path(), Path::new("/dev/hidraw1"));
    }

    #[test]
    fn search_stops_at_candidate_limit() {
        let mut source = FakeSource::default();
        for i in 0..MAX_CANDIDATES {
            source = source.with(&format!("/dev/hidraw{i}"), Some(MOUSE));
        }
        source = source.with("/dev/hidraw_late", Some(CLASSIC));
        assert!(matches!(
            locator(source).discover_at(None),
            Err(LocatorError::NoDeviceFound)
        ));
    }

    #[test]
    fn explicit_path_is_still_validated() {
        let source = FakeSource::default()
            .with("/dev/hidraw0", Some(MOUSE))
            .with("/dev/hidraw1", None)
            .with("/dev/hidraw2", Some(CLASSIC));
        let locator = locator(source);

        assert!(matches!(
            locator.discover_at(Some(Path::new("/dev/hidraw0"))),
            Err(LocatorError::UnsupportedDevice { id: MOUSE, .. })
        ));
        assert!(matches!(
            locator.discover_at(Some(Path::new("/dev/hidraw1"))),
            Err(LocatorError::PathError { .. })
        ));
        let transport = locator.discover_at(Some(Path::new("/dev/hidraw2"))).unwrap();
        assert_eq!(transport.path(), Path::new("/dev/hidraw2"));
    }

    #[test]
    fn discover_uses_configured_path() {
        let source = FakeSource::default()
            .with("/dev/hidraw0", Some(CLASSIC))
            .with("/dev/hidraw1", Some(CLASSIC));
        let mut locator = locator(source).with_explicit_path(Some("/dev/hidraw1".into()));
        assert_eq!(locator.discover().unwrap().path(), Path::new("/dev/hidraw1"));
    }

    #[test]
    fn parses_both_kernel_id_spellings() {
        let classic = Some(HardwareId::new(0x2650, 0x1311));
        assert_eq!(parse_hid_id("0003:00002650:00001311"), classic);
        assert_eq!(parse_hid_id("0003:2650:1311.0004"), classic);
    }

    #[test]
    fn rejects_malformed_ids() {
        for text in [
            "",
            "hidraw0",
            "0003:2650",
            "0003:2650:1311:0000",
            "0003:zzzz:1311.0001",
            "0003:00012650:00001311",
        ] {
            assert_eq!(parse_hid_id(text), None, "{text:?}");
        }
    }
}
