//! Local user interface - status LED + two trigger buttons.
//!
//! ## Components
//!
//! - **LED**: common-cathode RGB LED on PWM0, driven from the
//!   coordinator's `StatusIndicator` frames
//! - **Buttons**: A and B, each sends its device's signal like an HTTP
//!   request would

pub mod buttons;
pub mod led;
