// NV7 Controller — Analog Ladder Input
//
// The button ladder is a single ADC channel; each button pulls it into a
// different voltage band.

/// Raw analog input shared by every button on the ladder.
pub trait AnalogSource: Send {
    /// One raw conversion. Transient failures are retried by the sampler.
    fn read_raw(&mut self) -> anyhow::Result<i32>;

    /// Raw value corresponding to the top of the input range.
    fn full_scale(&self) -> i32;
}

#[cfg(target_os = "espidf")]
pub use hw::EspAdcSource;

#[cfg(target_os = "espidf")]
mod hw {
    use esp_idf_sys::esp;

    use super::AnalogSource;

    const ADC_FULL_SCALE_12BIT: i32 = 4095;

    /// One-shot ADC1 reader with 11 dB attenuation (0–3.3 V range).
    pub struct EspAdcSource {
        handle: esp_idf_sys::adc_oneshot_unit_handle_t,
        channel: esp_idf_sys::adc_channel_t,
    }

    // SAFETY: the one-shot handle is owned exclusively by this value and is
    // only ever used from the sampler thread that owns it.
    unsafe impl Send for EspAdcSource {}

    impl EspAdcSource {
        /// `channel` is the ADC1 channel number (GPIO2 is ADC1_CHANNEL_2 on the C3).
        pub fn new(channel: u32) -> anyhow::Result<Self> {
            let mut handle: esp_idf_sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
            let unit_cfg = esp_idf_sys::adc_oneshot_unit_init_cfg_t {
                unit_id: esp_idf_sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: esp_idf_sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                // SAFETY: plain C config struct, all-zero is a valid default.
                ..unsafe { core::mem::zeroed() }
            };
            // SAFETY: `handle` is a valid out-pointer for the duration of the call.
            esp!(unsafe { esp_idf_sys::adc_oneshot_new_unit(&unit_cfg, &mut handle) })?;

            let source = Self { handle, channel: channel as esp_idf_sys::adc_channel_t };

            let chan_cfg = esp_idf_sys::adc_oneshot_chan_cfg_t {
                atten: esp_idf_sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: esp_idf_sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            // SAFETY: handle was initialised above; on error `source` is dropped
            // and the unit released.
            esp!(unsafe { esp_idf_sys::adc_oneshot_config_channel(source.handle, source.channel, &chan_cfg) })?;

            log::info!("ADC1 channel {} configured for ladder input", channel);
            Ok(source)
        }
    }

    impl AnalogSource for EspAdcSource {
        fn read_raw(&mut self) -> anyhow::Result<i32> {
            let mut raw: i32 = 0;
            // SAFETY: handle is live until drop; `raw` is a valid out-pointer.
            esp!(unsafe { esp_idf_sys::adc_oneshot_read(self.handle, self.channel, &mut raw) })?;
            Ok(raw)
        }

        fn full_scale(&self) -> i32 {
            ADC_FULL_SCALE_12BIT
        }
    }

    impl Drop for EspAdcSource {
        fn drop(&mut self) {
            // SAFETY: the handle is deleted exactly once, here.
            let ret = unsafe { esp_idf_sys::adc_oneshot_del_unit(self.handle) };
            if ret != esp_idf_sys::ESP_OK {
                log::warn!("ADC unit release failed ({})", ret);
            } else {
                log::info!("ADC unit released");
            }
        }
    }
}
