// NV7 Controller — Channel Indicator LED
//
// Single GPIO output: low while channel A is active, high for channel B.

use crate::events::Channel;

pub trait ChannelIndicator: Send {
    fn show(&mut self, channel: Channel) -> anyhow::Result<()>;
}

#[cfg(target_os = "espidf")]
pub use hw::LedIndicator;

#[cfg(target_os = "espidf")]
mod hw {
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

    use super::ChannelIndicator;
    use crate::events::Channel;

    pub struct LedIndicator<'d> {
        pin: PinDriver<'d, AnyOutputPin, Output>,
    }

    impl<'d> LedIndicator<'d> {
        pub fn new(pin: PinDriver<'d, AnyOutputPin, Output>) -> Self {
            Self { pin }
        }
    }

    impl ChannelIndicator for LedIndicator<'static> {
        fn show(&mut self, channel: Channel) -> anyhow::Result<()> {
            match channel {
                Channel::A => self.pin.set_low()?,
                Channel::B => self.pin.set_high()?,
            }
            Ok(())
        }
    }
}
