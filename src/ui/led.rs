//! RGB status LED on PWM0.

use embassy_nrf::pwm::{Instance, SimplePwm};

use signal_bridge::indicator::{Frame, StatusLed};

/// PWM top value; one duty step per 8-bit color step.
const MAX_DUTY: u16 = 255;

pub struct PwmLed<'d, T: Instance> {
    pwm: SimplePwm<'d, T>,
}

impl<'d, T: Instance> PwmLed<'d, T> {
    /// `pwm` must have been created with channels 0/1/2 on R/G/B.
    pub fn new(mut pwm: SimplePwm<'d, T>) -> Self {
        pwm.set_max_duty(MAX_DUTY);
        let mut led = Self { pwm };
        led.show(Frame {
            color: signal_bridge::indicator::Rgb::OFF,
            brightness: 0,
        });
        led
    }
}

impl<T: Instance> StatusLed for PwmLed<'_, T> {
    fn show(&mut self, frame: Frame) {
        let c = frame.color.dimmed(frame.brightness);
        // The PWM output idles high; a duty of MAX_DUTY keeps the pin low.
        for (channel, level) in [c.r, c.g, c.b].into_iter().enumerate() {
            self.pwm.set_duty(channel, MAX_DUTY - u16::from(level));
        }
    }
}
