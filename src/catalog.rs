//! Table of supported eBeam receivers.
//!
//! Every receiver enumerates under the Luidia / EFI vendor id `0x2650`. Only
//! the Classic receiver has been tested against real hardware; the other
//! product ids come from later receiver revisions and share the same 8-byte
//! report format.

use std::fmt;

/// Luidia (eBeam) USB vendor id.
pub const VENDOR_ID: u16 = 0x2650;

/// eBeam Classic receiver (confirmed).
pub const PID_CLASSIC: u16 = 0x1311;

/// eBeam Edge receiver (unverified).
pub const PID_EDGE: u16 = 0x1313;

/// eBeam Engage receiver (unverified).
pub const PID_ENGAGE: u16 = 0x1315;

/// USB vendor/product pair reported by a candidate device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId {
    pub vendor: u16,
    pub product: u16,
}

impl HardwareId {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor, self.product)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub id: HardwareId,
    pub label: &'static str,
}

const BUILTIN: &[CatalogEntry] = &[
    CatalogEntry {
        id: HardwareId::new(VENDOR_ID, PID_CLASSIC),
        label: "eBeam Classic",
    },
    CatalogEntry {
        id: HardwareId::new(VENDOR_ID, PID_EDGE),
        label: "eBeam Edge",
    },
    CatalogEntry {
        id: HardwareId::new(VENDOR_ID, PID_ENGAGE),
        label: "eBeam Engage",
    },
];

/// Read-only lookup over a static list of supported receivers.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCatalog {
    entries: &'static [CatalogEntry],
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeviceCatalog {
    /// The receivers this driver knows how to talk to.
    pub fn builtin() -> Self {
        Self { entries: BUILTIN }
    }

    pub fn new(entries: &'static [CatalogEntry]) -> Self {
        Self { entries }
    }

    pub fn is_supported(&self, id: HardwareId) -> bool {
        self.label(id).is_some()
    }

    pub fn label(&self, id: HardwareId) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.label)
    }

    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }
}
