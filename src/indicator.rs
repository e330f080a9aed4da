//! Status LED driven by the link phase.
//!
//! - `Advertising` - triangle ramp 0 → 100 → 0 % in [`RAMP_STEP`] increments
//!   on [`ADVERTISING_COLOR`]
//! - `Connected` - [`CONNECTED_COLOR`] held at [`CONNECTED_BRIGHTNESS`]
//! - `Disconnected` - off
//!
//! Every [`StatusIndicator::render`] call advances by at most one step and
//! looks at the phase again, so a phase change shows up within one step.

use crate::config::{ADVERTISING_COLOR, CONNECTED_BRIGHTNESS, CONNECTED_COLOR, RAMP_STEP};
use crate::link::ConnectionPhase;

/// Peak ramp brightness (percent).
const RAMP_MAX: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale each channel by `percent` (clamped to 100).
    pub fn dimmed(self, percent: u8) -> Self {
        let p = u16::from(percent.min(100));
        let scale = |c: u8| ((u16::from(c) * p) / 100) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// One rendered LED state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub color: Rgb,
    /// Percent, 0..=100.
    pub brightness: u8,
}

/// Write-only RGB output.
pub trait StatusLed {
    fn show(&mut self, frame: Frame);
}

pub struct StatusIndicator<L> {
    led: L,
    level: u8,
    rising: bool,
    step: u8,
}

impl<L: StatusLed> StatusIndicator<L> {
    pub fn new(led: L) -> Self {
        Self::with_step(led, RAMP_STEP)
    }

    pub fn with_step(led: L, step: u8) -> Self {
        Self {
            led,
            level: 0,
            rising: true,
            step: step.clamp(1, RAMP_MAX),
        }
    }

    /// Compute the next frame for `phase`, advancing the ramp.
    pub fn next_frame(&mut self, phase: ConnectionPhase) -> Frame {
        match phase {
            ConnectionPhase::Advertising => {
                let frame = Frame {
                    color: ADVERTISING_COLOR,
                    brightness: self.level,
                };
                self.advance();
                frame
            }
            ConnectionPhase::Connected => {
                self.reset_ramp();
                Frame {
                    color: CONNECTED_COLOR,
                    brightness: CONNECTED_BRIGHTNESS,
                }
            }
            ConnectionPhase::Disconnected => {
                self.reset_ramp();
                Frame {
                    color: ADVERTISING_COLOR,
                    brightness: 0,
                }
            }
        }
    }

    /// Render one step for `phase` onto the LED.
    pub fn render(&mut self, phase: ConnectionPhase) -> Frame {
        let frame = self.next_frame(phase);
        self.led.show(frame);
        frame
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    fn advance(&mut self) {
        if self.rising {
            self.level = self.level.saturating_add(self.step).min(RAMP_MAX);
            if self.level == RAMP_MAX {
                self.rising = false;
            }
        } else {
            self.level = self.level.saturating_sub(self.step);
            if self.level == 0 {
                self.rising = true;
            }
        }
    }

    fn reset_ramp(&mut self) {
        self.level = 0;
        self.rising = true;
    }
}
