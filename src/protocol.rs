//! eBeam receiver report format.
//!
//! Every report is 8 bytes, little-endian:
//!
//! | byte | meaning |
//! |------|---------|
//! | 0    | sensor flags; bit 0 ultrasound, bit 1 infrared. Both set = trusted |
//! | 1-2  | raw X |
//! | 3-4  | raw Y |
//! | 5    | panel key bitmask on keyboard frames, fiability otherwise |
//! | 6    | buttons (low nibble) and pointer tool (high nibble), `0xFE` = panel key |
//! | 7    | fiability, usually `0xFF` |
//!
//! An all-`0xFF` report is the receiver's keepalive. Its sensor byte has the
//! trusted bits set, so it is recognised by its full contents instead.

use std::fmt;
use thiserror::Error;

pub const FRAME_LEN: usize = 8;

/// Both sensor bits must be set for the payload to be trusted.
pub const SENSORS_OK: u8 = 0b11;

/// Button byte value marking a panel key report.
pub const KEYBOARD_SENTINEL: u8 = 0xFE;

/// Tip switch, inverted on the wire: 0 means pressed.
const TIP_BIT: u8 = 0;

/// Bit positions of the two auxiliary stylus buttons inside the button byte.
///
/// Receiver documentation disagrees on which bit is the small and which the
/// large button. These values match the most complete observation and need
/// checking against real hardware before they are relied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxButtonBits {
    pub small: u8,
    pub large: u8,
}

pub const AUX_BUTTON_BITS: AuxButtonBits = AuxButtonBits { small: 2, large: 3 };

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame: expected {FRAME_LEN} bytes, got {len}")]
    Malformed { len: usize },
}

/// Tip, small and large stylus buttons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub tip: bool,
    pub small: bool,
    pub large: bool,
}

impl ButtonState {
    pub const RELEASED: ButtonState = ButtonState {
        tip: false,
        small: false,
        large: false,
    };

    pub fn channels(self) -> [bool; 3] {
        [self.tip, self.small, self.large]
    }

    pub fn from_channels([tip, small, large]: [bool; 3]) -> Self {
        Self { tip, small, large }
    }
}

/// Membrane keys along the edge of the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PanelKey {
    Fullscreen,
    Mirror,
    Print,
    Email,
    Movie,
    Calibrate,
}

/// Bit of the aux byte → key. Bit 0 is reserved.
pub const KEY_BITS: [(u8, PanelKey); 6] = [
    (1, PanelKey::Fullscreen),
    (2, PanelKey::Mirror),
    (3, PanelKey::Print),
    (4, PanelKey::Email),
    (5, PanelKey::Movie),
    (7, PanelKey::Calibrate),
];

impl PanelKey {
    pub fn name(self) -> &'static str {
        match self {
            PanelKey::Fullscreen => "FULLSCREEN",
            PanelKey::Mirror => "MIRROR",
            PanelKey::Print => "PRINT",
            PanelKey::Email => "EMAIL",
            PanelKey::Movie => "MOVIE",
            PanelKey::Calibrate => "CALIBRATE",
        }
    }

    pub fn bit(self) -> u8 {
        KEY_BITS
            .iter()
            .find(|(_, key)| *key == self)
            .map(|(bit, _)| *bit)
            .unwrap_or(0)
    }

    fn mask(self) -> u8 {
        1 << self.bit()
    }
}

impl fmt::Display for PanelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of panel keys currently held, stored as the masked aux byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeySet(u8);

impl KeySet {
    pub const EMPTY: KeySet = KeySet(0);

    /// Keep only the bits that name a key.
    pub fn from_aux(aux: u8) -> Self {
        let known = KEY_BITS.iter().fold(0u8, |acc, (bit, _)| acc | (1 << bit));
        Self(aux & known)
    }

    pub fn contains(self, key: PanelKey) -> bool {
        self.0 & key.mask() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = PanelKey> {
        KEY_BITS
            .into_iter()
            .map(|(_, key)| key)
            .filter(move |key| self.contains(*key))
    }
}

impl FromIterator<PanelKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = PanelKey>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |acc, key| acc | key.mask()))
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, key) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(key.name())?;
        }
        f.write_str("}")
    }
}

/// Stylus identity carried in the high nibble of the button byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointerTool {
    Red,
    Blue,
    Green,
    Black,
    Eraser,
    Wand,
    #[default]
    None,
    Unknown(u8),
}

impl PointerTool {
    pub fn from_button_byte(buttons: u8) -> Self {
        match buttons >> 4 {
            0x1 => PointerTool::Red,
            0x2 => PointerTool::Blue,
            0x3 => PointerTool::Green,
            0x4 => PointerTool::Black,
            0x5 => PointerTool::Eraser,
            0x6 => PointerTool::Wand,
            0x0 => PointerTool::None,
            other => PointerTool::Unknown(other),
        }
    }
}

impl fmt::Display for PointerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerTool::Red => write!(f, "red"),
            PointerTool::Blue => write!(f, "blue"),
            PointerTool::Green => write!(f, "green"),
            PointerTool::Black => write!(f, "black"),
            PointerTool::Eraser => write!(f, "eraser"),
            PointerTool::Wand => write!(f, "wand"),
            PointerTool::None => write!(f, "none"),
            PointerTool::Unknown(id) => write!(f, "tool#{id}"),
        }
    }
}

/// One report, split into its fields. Nothing is interpreted yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedReading {
    pub sensor_flags: u8,
    pub raw_x: u16,
    pub raw_y: u16,
    pub aux: u8,
    pub buttons: u8,
    pub fiability: u8,
}

/// What a report means once its validity bits have been checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Sensor bits not both set. Keepalives land here.
    Invalid,
    /// A membrane key report; stylus buttons are considered released.
    Keyboard(KeySet),
    Pointer {
        raw_x: u16,
        raw_y: u16,
        buttons: ButtonState,
        tool: PointerTool,
    },
}

/// Split a report into fields.
///
/// Fails only when the transport handed over the wrong number of bytes.
pub fn decode(raw: &[u8]) -> Result<DecodedReading, FrameError> {
    let bytes: [u8; FRAME_LEN] = raw
        .try_into()
        .map_err(|_| FrameError::Malformed { len: raw.len() })?;
    let [flags, x_lo, x_hi, y_lo, y_hi, aux, buttons, fiability] = bytes;
    Ok(DecodedReading {
        sensor_flags: flags,
        raw_x: u16::from_le_bytes([x_lo, x_hi]),
        raw_y: u16::from_le_bytes([y_lo, y_hi]),
        aux,
        buttons,
        fiability,
    })
}

impl DecodedReading {
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let [x_lo, x_hi] = self.raw_x.to_le_bytes();
        let [y_lo, y_hi] = self.raw_y.to_le_bytes();
        [
            self.sensor_flags,
            x_lo,
            x_hi,
            y_lo,
            y_hi,
            self.aux,
            self.buttons,
            self.fiability,
        ]
    }

    pub fn is_keepalive(&self) -> bool {
        self.encode() == [0xFF; FRAME_LEN]
    }

    pub fn is_valid(&self) -> bool {
        self.sensor_flags & SENSORS_OK == SENSORS_OK && !self.is_keepalive()
    }

    pub fn is_keyboard(&self) -> bool {
        self.buttons == KEYBOARD_SENTINEL
    }

    pub fn classify(&self) -> FrameKind {
        if !self.is_valid() {
            return FrameKind::Invalid;
        }
        if self.is_keyboard() {
            return FrameKind::Keyboard(KeySet::from_aux(self.aux));
        }
        FrameKind::Pointer {
            raw_x: self.raw_x,
            raw_y: self.raw_y,
            buttons: ButtonState {
                tip: self.buttons & (1 << TIP_BIT) == 0,
                small: self.buttons & (1 << AUX_BUTTON_BITS.small) != 0,
                large: self.buttons & (1 << AUX_BUTTON_BITS.large) != 0,
            },
            tool: PointerTool::from_button_byte(self.buttons),
        }
    }
}

impl fmt::Display for DecodedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.encode().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}
