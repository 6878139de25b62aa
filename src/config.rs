// NV7 Controller — Hardware & System Configuration
//
// Compile-time constants live at the top of this file. Everything an
// installation may want to tune (button centres, tolerance, timings) is read
// once at startup into `ControllerConfig` and never changes afterwards.

use std::time::Duration;

use thiserror::Error;

use crate::events::Button;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_SAMPLER: usize = 4096;
pub const STACK_CONTROLLER: usize = 8192;

// ---------------------------------------------------------------------------
// Analog input
// ---------------------------------------------------------------------------
pub const ADC_LADDER_CHANNEL: u32 = 2; // GPIO2 / ADC1_CHANNEL_2 — button ladder
pub const READING_SCALE: i32 = 1000;   // normalised readings are 0..=1000

// ---------------------------------------------------------------------------
// GPIO (ESP32-C3)
// ---------------------------------------------------------------------------
pub const GPIO_MAX: i32 = 21;
pub const GPIO_SPI_FLASH: std::ops::RangeInclusive<i32> = 12..=17; // wired to the flash chip

// ---------------------------------------------------------------------------
// Defaults (overridable through the configuration keys below)
// ---------------------------------------------------------------------------
pub const DEFAULT_LED_PIN: i32 = 10;
pub const DEFAULT_CHANNEL_TARGET: &[i32] = &[200];
pub const DEFAULT_MODE_TARGET: &[i32] = &[400];
pub const DEFAULT_COLOUR_TARGET: &[i32] = &[800];
pub const DEFAULT_SPEED_TARGET: &[i32] = &[600];
pub const DEFAULT_TOLERANCE: i32 = 20;
pub const DEFAULT_ACCURACY: u32 = 2;
pub const DEFAULT_HOLD_DURATION_MS: u64 = 2000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 2; // keep well under the poll rate
pub const DEFAULT_READ_RETRIES: u32 = 5;
pub const DEFAULT_MQTT_SCHEME: &str = "tcp";

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------
pub const SPEED_LEVELS: u8 = 3;

pub const DEFAULT_THEMES: &[(&str, &[&str])] = &[
    ("Theme 1", &["red", "green", "blue"]),
    ("Theme 2", &["white", "warm white", "amber"]),
    ("Theme 3", &["rainbow", "fire", "ocean"]),
];

// ---------------------------------------------------------------------------
// Configuration keys
// ---------------------------------------------------------------------------
pub const KEY_LED_PIN: &str = "CONTROLLER_LED_PIN";
pub const KEY_CHANNEL_TARGET: &str = "CONTROLLER_CHANNEL_TARGET";
pub const KEY_MODE_TARGET: &str = "CONTROLLER_MODE_TARGET";
pub const KEY_COLOUR_TARGET: &str = "CONTROLLER_COLOR_TARGET";
pub const KEY_SPEED_TARGET: &str = "CONTROLLER_SPEED_TARGET";
pub const KEY_TOLERANCE: &str = "CONTROLLER_TOLERANCE";
pub const KEY_ACCURACY: &str = "CONTROLLER_ACCURACY";
pub const KEY_HOLD_DURATION: &str = "CONTROLLER_HOLD_DURATION";
pub const KEY_POLL_RATE: &str = "CONTROLLER_POLL_RATE";
pub const KEY_SAMPLE_RATE: &str = "CONTROLLER_SAMPLE_RATE";
pub const KEY_READ_RETRIES: &str = "CONTROLLER_READ_RETRIES";
pub const KEY_MQTT_SCHEME: &str = "MQTT_PUBLISHER_SCHEME";
pub const KEY_MQTT_HOST: &str = "MQTT_PUBLISHER_HOST";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration value {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Centre values for one button; each centre becomes its own range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonTargets {
    pub button: Button,
    pub centres: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeConfig {
    pub name: String,
    pub colours: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub led_pin: i32,
    /// In classification priority order.
    pub targets: Vec<ButtonTargets>,
    pub tolerance: i32,
    pub accuracy: u32,
    pub hold_duration: Duration,
    pub poll_interval: Duration,
    pub sample_interval: Duration,
    pub read_retries: u32,
    pub themes: Vec<ThemeConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            led_pin: DEFAULT_LED_PIN,
            targets: vec![
                ButtonTargets { button: Button::Channel, centres: DEFAULT_CHANNEL_TARGET.to_vec() },
                ButtonTargets { button: Button::Mode, centres: DEFAULT_MODE_TARGET.to_vec() },
                ButtonTargets { button: Button::Colour, centres: DEFAULT_COLOUR_TARGET.to_vec() },
                ButtonTargets { button: Button::Speed, centres: DEFAULT_SPEED_TARGET.to_vec() },
            ],
            tolerance: DEFAULT_TOLERANCE,
            accuracy: DEFAULT_ACCURACY,
            hold_duration: Duration::from_millis(DEFAULT_HOLD_DURATION_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            read_retries: DEFAULT_READ_RETRIES,
            themes: default_themes(),
        }
    }
}

pub fn default_themes() -> Vec<ThemeConfig> {
    DEFAULT_THEMES
        .iter()
        .map(|(name, colours)| ThemeConfig {
            name: (*name).to_string(),
            colours: colours.iter().map(|c| (*c).to_string()).collect(),
        })
        .collect()
}

impl ControllerConfig {
    /// Build the configuration from a key lookup, falling back to defaults
    /// for absent keys. Any present-but-malformed value is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup(KEY_LED_PIN) {
            cfg.led_pin = parse_scalar(KEY_LED_PIN, &v)?;
        }

        for (key, button) in [
            (KEY_CHANNEL_TARGET, Button::Channel),
            (KEY_MODE_TARGET, Button::Mode),
            (KEY_COLOUR_TARGET, Button::Colour),
            (KEY_SPEED_TARGET, Button::Speed),
        ] {
            if let Some(v) = lookup(key) {
                let centres = parse_list(key, &v)?;
                if let Some(t) = cfg.targets.iter_mut().find(|t| t.button == button) {
                    t.centres = centres;
                }
            }
        }

        if let Some(v) = lookup(KEY_TOLERANCE) {
            cfg.tolerance = parse_scalar(KEY_TOLERANCE, &v)?;
        }
        if let Some(v) = lookup(KEY_ACCURACY) {
            cfg.accuracy = parse_scalar(KEY_ACCURACY, &v)?;
        }
        if let Some(v) = lookup(KEY_HOLD_DURATION) {
            cfg.hold_duration = Duration::from_millis(parse_scalar(KEY_HOLD_DURATION, &v)?);
        }
        if let Some(v) = lookup(KEY_POLL_RATE) {
            cfg.poll_interval = Duration::from_millis(parse_scalar(KEY_POLL_RATE, &v)?);
        }
        if let Some(v) = lookup(KEY_SAMPLE_RATE) {
            cfg.sample_interval = Duration::from_millis(parse_scalar(KEY_SAMPLE_RATE, &v)?);
        }
        if let Some(v) = lookup(KEY_READ_RETRIES) {
            cfg.read_retries = parse_scalar(KEY_READ_RETRIES, &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=GPIO_MAX).contains(&self.led_pin) {
            return Err(ConfigError::invalid(KEY_LED_PIN, self.led_pin.to_string(), "no such GPIO"));
        }
        if GPIO_SPI_FLASH.contains(&self.led_pin) {
            return Err(ConfigError::invalid(KEY_LED_PIN, self.led_pin.to_string(), "reserved for SPI flash"));
        }
        if self.led_pin == ADC_LADDER_CHANNEL as i32 {
            return Err(ConfigError::invalid(KEY_LED_PIN, self.led_pin.to_string(), "used by the button ladder ADC"));
        }
        if self.tolerance < 0 {
            return Err(ConfigError::invalid(KEY_TOLERANCE, self.tolerance.to_string(), "must not be negative"));
        }
        if self.accuracy < 1 {
            return Err(ConfigError::invalid(KEY_ACCURACY, self.accuracy.to_string(), "must be at least 1"));
        }
        if self.hold_duration.is_zero() {
            return Err(ConfigError::invalid(KEY_HOLD_DURATION, "0", "must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(KEY_POLL_RATE, "0", "must be positive"));
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::invalid(KEY_SAMPLE_RATE, "0", "must be positive"));
        }
        // Polls that find no samples read 0 and clear the debouncer.
        if self.sample_interval >= self.poll_interval {
            return Err(ConfigError::invalid(
                KEY_SAMPLE_RATE,
                self.sample_interval.as_millis().to_string(),
                format!("must be shorter than the {} ms poll rate", self.poll_interval.as_millis()),
            ));
        }
        if self.read_retries < 1 {
            return Err(ConfigError::invalid(KEY_READ_RETRIES, "0", "must be at least 1"));
        }
        if self.targets.iter().all(|t| t.centres.is_empty()) {
            return Err(ConfigError::invalid(KEY_CHANNEL_TARGET, "", "no button targets configured"));
        }
        if self.themes.is_empty() || self.themes.iter().any(|t| t.colours.is_empty()) {
            return Err(ConfigError::invalid("themes", "", "every theme needs at least one colour"));
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        for t in &self.targets {
            log::info!("  {:<8} centres {:?} ±{}", t.button.as_str(), t.centres, self.tolerance);
        }
        log::info!(
            "  accuracy {}, hold {} ms, poll {} ms, sample {} ms, LED GPIO{}",
            self.accuracy,
            self.hold_duration.as_millis(),
            self.poll_interval.as_millis(),
            self.sample_interval.as_millis(),
            self.led_pin
        );
    }
}

// ---------------------------------------------------------------------------
// MQTT publisher
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub scheme: String,
    pub host: String,
}

impl MqttConfig {
    /// `Ok(None)` when no broker host is configured.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup(KEY_MQTT_HOST) else {
            return Ok(None);
        };
        let host = host.trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::Missing(KEY_MQTT_HOST));
        }

        let scheme = lookup(KEY_MQTT_SCHEME).unwrap_or_else(|| DEFAULT_MQTT_SCHEME.to_string());
        let scheme = scheme.trim().to_ascii_lowercase();
        if !matches!(scheme.as_str(), "tcp" | "ssl" | "ws" | "wss") {
            return Err(ConfigError::invalid(KEY_MQTT_SCHEME, scheme, "expected tcp, ssl, ws or wss"));
        }

        Ok(Some(Self { scheme, host }))
    }

    pub fn url(&self) -> String {
        let scheme = match self.scheme.as_str() {
            "tcp" => "mqtt",
            "ssl" => "mqtts",
            other => other,
        };
        format!("{}://{}", scheme, self.host)
    }
}

/// Values baked into the firmware image from the build environment; the
/// device has no process environment of its own.
pub fn build_time(key: &str) -> Option<String> {
    let value = match key {
        KEY_LED_PIN => option_env!("CONTROLLER_LED_PIN"),
        KEY_CHANNEL_TARGET => option_env!("CONTROLLER_CHANNEL_TARGET"),
        KEY_MODE_TARGET => option_env!("CONTROLLER_MODE_TARGET"),
        KEY_COLOUR_TARGET => option_env!("CONTROLLER_COLOR_TARGET"),
        KEY_SPEED_TARGET => option_env!("CONTROLLER_SPEED_TARGET"),
        KEY_TOLERANCE => option_env!("CONTROLLER_TOLERANCE"),
        KEY_ACCURACY => option_env!("CONTROLLER_ACCURACY"),
        KEY_HOLD_DURATION => option_env!("CONTROLLER_HOLD_DURATION"),
        KEY_POLL_RATE => option_env!("CONTROLLER_POLL_RATE"),
        KEY_SAMPLE_RATE => option_env!("CONTROLLER_SAMPLE_RATE"),
        KEY_READ_RETRIES => option_env!("CONTROLLER_READ_RETRIES"),
        KEY_MQTT_SCHEME => option_env!("MQTT_PUBLISHER_SCHEME"),
        KEY_MQTT_HOST => option_env!("MQTT_PUBLISHER_HOST"),
        _ => None,
    };
    value.map(str::to_string)
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------
fn parse_scalar<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, raw, e.to_string()))
}

fn parse_list(key: &'static str, raw: &str) -> Result<Vec<i32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_scalar(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let cfg = ControllerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.accuracy, 2);
        assert_eq!(cfg.hold_duration, Duration::from_millis(2000));
    }

    #[test]
    fn target_order_is_channel_mode_colour_speed() {
        let cfg = ControllerConfig::default();
        let order: Vec<Button> = cfg.targets.iter().map(|t| t.button).collect();
        assert_eq!(order, vec![Button::Channel, Button::Mode, Button::Colour, Button::Speed]);
    }

    #[test]
    fn parses_lists_and_scalars() {
        let cfg = ControllerConfig::from_lookup(lookup_from(&[
            (KEY_CHANNEL_TARGET, "187, 197"),
            (KEY_TOLERANCE, "3"),
            (KEY_ACCURACY, "4"),
            (KEY_HOLD_DURATION, "1500"),
            (KEY_POLL_RATE, "25"),
        ]))
        .unwrap();

        assert_eq!(cfg.targets[0].centres, vec![187, 197]);
        assert_eq!(cfg.tolerance, 3);
        assert_eq!(cfg.accuracy, 4);
        assert_eq!(cfg.hold_duration, Duration::from_millis(1500));
        assert_eq!(cfg.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn malformed_value_is_rejected() {
        let err = ControllerConfig::from_lookup(lookup_from(&[(KEY_MODE_TARGET, "400,abc")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: KEY_MODE_TARGET, .. }));
    }

    #[test]
    fn zero_accuracy_is_rejected() {
        let err = ControllerConfig::from_lookup(lookup_from(&[(KEY_ACCURACY, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: KEY_ACCURACY, .. }));
    }

    #[test]
    fn sample_rate_must_be_faster_than_poll_rate() {
        for sample in ["40", "10"] {
            let err = ControllerConfig::from_lookup(lookup_from(&[(KEY_POLL_RATE, "10"), (KEY_SAMPLE_RATE, sample)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: KEY_SAMPLE_RATE, .. }));
        }
        assert!(ControllerConfig::from_lookup(lookup_from(&[(KEY_POLL_RATE, "10"), (KEY_SAMPLE_RATE, "9")])).is_ok());
    }

    #[test]
    fn led_pin_must_be_a_free_gpio() {
        for pin in ["-1", "22", "12", "13", "17", "2"] {
            let err = ControllerConfig::from_lookup(lookup_from(&[(KEY_LED_PIN, pin)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: KEY_LED_PIN, .. }), "pin {pin}");
        }
        for pin in ["0", "10", "11", "18", "21"] {
            assert!(ControllerConfig::from_lookup(lookup_from(&[(KEY_LED_PIN, pin)])).is_ok(), "pin {pin}");
        }
        assert_eq!(ControllerConfig::default().led_pin, 10);
    }

    #[test]
    fn mqtt_is_optional() {
        assert_eq!(MqttConfig::from_lookup(|_| None).unwrap(), None);
    }

    #[test]
    fn mqtt_defaults_to_tcp() {
        let cfg = MqttConfig::from_lookup(lookup_from(&[(KEY_MQTT_HOST, "broker.local:1883")]))
            .unwrap()
            .unwrap();
        assert_eq!(cfg.scheme, "tcp");
        assert_eq!(cfg.url(), "mqtt://broker.local:1883");
    }

    #[test]
    fn mqtt_rejects_unknown_scheme() {
        let err = MqttConfig::from_lookup(lookup_from(&[
            (KEY_MQTT_HOST, "broker.local"),
            (KEY_MQTT_SCHEME, "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: KEY_MQTT_SCHEME, .. }));
    }
}
