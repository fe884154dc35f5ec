//! Projective mapping from receiver units to screen coordinates.
//!
//! The matrix is computed elsewhere (by a calibration tool) and loaded from a
//! TOML file of the form
//!
//! ```toml
//! matrix = [1.0, 0.0, 0.0,
//!           0.0, 1.0, 0.0,
//!           0.0, 0.0, 1.0]
//! ```
//!
//! Nine coefficients are a row-major 3x3 matrix. Sixteen coefficients are a
//! row-major 4x4 homogeneous matrix whose z row and column are dropped.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Entries of a row-major 4x4 matrix that survive once z is dropped.
const HOMOGENEOUS_2D: [usize; 9] = [0, 1, 3, 4, 5, 7, 12, 13, 15];

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration matrix needs 9 or 16 coefficients, got {0}")]
    WrongSize(usize),
    #[error("calibration coefficient {index} is not finite")]
    NotFinite { index: usize },
    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse calibration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationMatrix {
    m: [f64; 9],
}

impl Default for CalibrationMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Deserialize)]
struct CalibrationFile {
    matrix: Vec<f64>,
}

impl CalibrationMatrix {
    /// Raw passthrough; used until a calibration is loaded.
    pub const IDENTITY: CalibrationMatrix = CalibrationMatrix {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    pub fn new(m: [f64; 9]) -> Self {
        Self { m }
    }

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, CalibrationError> {
        if let Some(index) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(CalibrationError::NotFinite { index });
        }
        let m = match coefficients.len() {
            9 => {
                let mut m = [0.0; 9];
                m.copy_from_slice(coefficients);
                m
            }
            16 => HOMOGENEOUS_2D.map(|i| coefficients[i]),
            n => return Err(CalibrationError::WrongSize(n)),
        };
        Ok(Self { m })
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CalibrationFile =
            toml::from_str(&text).map_err(|source| CalibrationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let matrix = Self::from_coefficients(&file.matrix)?;
        debug!("loaded calibration from {}: {:?}", path.display(), matrix.m);
        Ok(matrix)
    }

    pub fn coefficients(&self) -> &[f64; 9] {
        &self.m
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Map a raw reading. Returns `None` when the projective scale is zero
    /// (or the division is otherwise not finite); callers keep their
    /// previous point in that case.
    pub fn apply(&self, raw_x: u16, raw_y: u16) -> Option<CalibratedPoint> {
        let m = &self.m;
        let (x, y) = (f64::from(raw_x), f64::from(raw_y));
        let scale = m[6] * x + m[7] * y + m[8];
        if scale == 0.0 {
            return None;
        }
        let point = CalibratedPoint {
            x: (m[0] * x + m[1] * y + m[2]) / scale,
            y: (m[3] * x + m[4] * y + m[5]) / scale,
        };
        (point.x.is_finite() && point.y.is_finite()).then_some(point)
    }
}
