//! Inject board state through a uinput virtual device.

use super::{axis_value, OutputSink, SinkError, AXIS_MAX};
use crate::catalog::{PID_CLASSIC, VENDOR_ID};
use crate::protocol::{PanelKey, KEY_BITS};
use crate::session::SessionState;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    UinputAbsSetup,
};
use tracing::info;

pub const DEVICE_NAME: &str = "eBeam whiteboard";

/// Stylus buttons in `ButtonState::channels` order.
const BUTTON_CODES: [Key; 3] = [Key::BTN_LEFT, Key::BTN_MIDDLE, Key::BTN_RIGHT];

/// Host keys sent for a panel key, pressed in order and released in reverse.
fn key_codes(key: PanelKey) -> &'static [Key] {
    match key {
        PanelKey::Print => &[Key::KEY_LEFTCTRL, Key::KEY_P],
        PanelKey::Fullscreen => &[Key::KEY_F11],
        PanelKey::Mirror => &[Key::KEY_SWITCHVIDEOMODE],
        PanelKey::Email => &[Key::KEY_MAIL],
        PanelKey::Movie => &[Key::KEY_MEDIA],
        PanelKey::Calibrate => &[Key::KEY_CONFIG],
    }
}

fn key_event(code: Key, pressed: bool) -> InputEvent {
    InputEvent::new(EventType::KEY, code.code(), i32::from(pressed))
}

fn abs_event(axis: AbsoluteAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE, axis.0, value)
}

/// Events that move the host from `prev` to `next`.
///
/// A missing `prev` is treated as the released, keyless start state. The
/// trailing `SYN_REPORT` is left to the device.
pub fn translate(prev: Option<&SessionState>, next: &SessionState) -> Vec<InputEvent> {
    let prev = prev.copied().unwrap_or_default();
    let mut events = Vec::new();

    if let Some(point) = next.point {
        let (x, y) = (axis_value(point.x), axis_value(point.y));
        let moved = prev
            .point
            .map(|p| (axis_value(p.x), axis_value(p.y)) != (x, y))
            .unwrap_or(true);
        if moved {
            events.push(abs_event(AbsoluteAxisType::ABS_X, x));
            events.push(abs_event(AbsoluteAxisType::ABS_Y, y));
        }
    }

    let pairs = prev.buttons.channels().into_iter().zip(next.buttons.channels());
    for (code, (was, now)) in BUTTON_CODES.into_iter().zip(pairs) {
        if was != now {
            events.push(key_event(code, now));
        }
    }

    for (_, key) in KEY_BITS {
        let now = next.keys.contains(key);
        if prev.keys.contains(key) == now {
            continue;
        }
        let codes = key_codes(key);
        if now {
            events.extend(codes.iter().map(|&code| key_event(code, true)));
        } else {
            events.extend(codes.iter().rev().map(|&code| key_event(code, false)));
        }
    }

    events
}

pub struct UinputSink {
    device: VirtualDevice,
    last: Option<SessionState>,
}

impl UinputSink {
    pub fn create() -> Result<Self, SinkError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in BUTTON_CODES {
            keys.insert(code);
        }
        for (_, key) in KEY_BITS {
            for &code in key_codes(key) {
                keys.insert(code);
            }
        }

        let axis = AbsInfo::new(0, 0, AXIS_MAX, 0, 0, 0);
        let device = VirtualDeviceBuilder::new()
            .and_then(|b| {
                b.name(DEVICE_NAME)
                    .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PID_CLASSIC, 1))
                    .with_keys(&keys)
            })
            .and_then(|b| {
                b.with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_X, axis))
            })
            .and_then(|b| {
                b.with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisType::ABS_Y, axis))
            })
            .and_then(|b| b.build())
            .map_err(SinkError::Create)?;

        info!("created virtual input device \"{DEVICE_NAME}\"");
        Ok(Self { device, last: None })
    }
}

impl OutputSink for UinputSink {
    fn emit(&mut self, state: &SessionState) -> Result<(), SinkError> {
        let events = translate(self.last.as_ref(), state);
        if !events.is_empty() {
            self.device.emit(&events).map_err(SinkError::Write)?;
        }
        self.last = Some(*state);
        Ok(())
    }
}
