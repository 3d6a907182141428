use rppal::gpio::{Gpio, OutputPin};
use tracing::warn;

/// Indicator LED on the configured GPIO pin: lit while the serial session
/// to the unit is up. Hosts without usable GPIO (or with the pin taken)
/// just log a warning and the bridge runs dark.
pub struct StatusLed {
    pin: Option<OutputPin>,
}

impl StatusLed {
    pub fn new(bcm_pin: u8) -> Self {
        let pin = match Gpio::new().and_then(|gpio| gpio.get(bcm_pin)) {
            Ok(pin) => Some(pin.into_output_low()),
            Err(e) => {
                warn!("Status LED unavailable on GPIO {}: {}", bcm_pin, e);
                None
            }
        };
        Self { pin }
    }

    pub fn set(&mut self, lit: bool) {
        if let Some(pin) = &mut self.pin {
            if lit {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }
}
