// NV7 Controller — Firmware Entry Point
//
// Boot sequence:
//   1. Load configuration (baked in at build time) and validate it.
//   2. Bring up Wi-Fi + MQTT when a broker host is configured.
//   3. Claim the channel LED and the ladder ADC.
//   4. Spawn the sampler and controller tasks.
//
// The controller never exits on its own. If the ADC stops responding the
// sampler gives up, the controller stops, and main returns the error so the
// chip restarts.
//
// On a development host the same pipeline runs against a simulated ladder
// and plays a short scripted button sequence.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::thread;
    use std::time::Duration;

    use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use nv7_controller::config::{self, ControllerConfig, MqttConfig, ADC_LADDER_CHANNEL};
    use nv7_controller::drivers::adc::EspAdcSource;
    use nv7_controller::drivers::indicator::LedIndicator;
    use nv7_controller::drivers::network::{connect_wifi, EspMqttTransport};
    use nv7_controller::{Controller, LogPublisher, MqttPublisher, Pipeline, PublisherSet, Sampler};

    pub fn run() -> anyhow::Result<()> {
        // Link esp-idf-sys runtime patches and initialise logging.
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("NV7 controller firmware starting…");

        // ---- Configuration ----------------------------------------------------
        let cfg = ControllerConfig::from_lookup(config::build_time)?;
        let mqtt = MqttConfig::from_lookup(config::build_time)?;
        log::info!("Configuration:");
        cfg.log_summary();

        // ---- Peripherals ------------------------------------------------------
        let peripherals = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        // ---- Publishers -------------------------------------------------------
        let mut publishers = PublisherSet::new().with(LogPublisher);
        let _wifi = match mqtt {
            Some(mqtt) => {
                let wifi = connect_wifi(peripherals.modem, sys_loop, nvs)?;
                publishers.register(Box::new(MqttPublisher::new(EspMqttTransport::connect(&mqtt)?)));
                Some(wifi)
            }
            None => {
                log::warn!("MQTT_PUBLISHER_HOST not set — events are only logged");
                None
            }
        };

        // ---- Hardware ---------------------------------------------------------
        // SAFETY: the pin number comes from validated configuration and no
        // other driver in this firmware claims it.
        let led_pin = unsafe { AnyOutputPin::new(cfg.led_pin) };
        let indicator = LedIndicator::new(PinDriver::output(led_pin)?);
        let source = EspAdcSource::new(ADC_LADDER_CHANNEL)?;

        // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) ---------------
        let sampler = Sampler::spawn(source, cfg.sample_interval, cfg.read_retries)?;
        let pipeline = Pipeline::new(&cfg, publishers, Box::new(indicator));
        let mut controller = Controller::start(sampler, pipeline, cfg.poll_interval)?;
        log::info!("Boot complete — entering normal operation");

        // Main thread only watches for a fatal controller failure.
        while controller.is_running() {
            thread::sleep(Duration::from_secs(1));
        }

        controller.shutdown()?;
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::io::Write;
    use std::thread;
    use std::time::Duration;

    use nv7_controller::drivers::sim::{LadderHandle, SimulatedIndicator, SimulatedLadder};
    use nv7_controller::{
        Button, Controller, ControllerConfig, LogPublisher, MqttConfig, MqttPublisher, MqttTransport, Pipeline,
        PublisherSet, Sampler,
    };

    /// Prints what would go over the wire instead of talking to a broker.
    struct ConsoleTransport {
        broker: String,
    }

    impl MqttTransport for ConsoleTransport {
        fn enqueue(&mut self, topic: &str, retain: bool, payload: &[u8]) -> anyhow::Result<()> {
            let mut out = std::io::stdout().lock();
            writeln!(
                out,
                "[{}] {}{} {}",
                self.broker,
                topic,
                if retain { " (retained)" } else { "" },
                String::from_utf8_lossy(payload)
            )?;
            Ok(())
        }
    }

    struct StderrLogger;

    impl log::Log for StderrLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                eprintln!("{:<5} {}: {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    pub fn run() -> anyhow::Result<()> {
        log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("logger: {e}"))?;
        log::set_max_level(log::LevelFilter::Info);
        log::info!("NV7 controller simulator starting…");

        let lookup = |key: &str| std::env::var(key).ok();
        let cfg = ControllerConfig::from_lookup(lookup)?;
        let broker = MqttConfig::from_lookup(lookup)?
            .map(|m| m.url())
            .unwrap_or_else(|| "dry-run".to_string());
        log::info!("Configuration:");
        cfg.log_summary();

        let publishers = PublisherSet::new()
            .with(LogPublisher)
            .with(MqttPublisher::new(ConsoleTransport { broker }));

        let ladder = SimulatedLadder::new();
        let keys = ladder.handle();
        let sampler = Sampler::spawn(ladder, cfg.sample_interval, cfg.read_retries)?;
        let pipeline = Pipeline::new(&cfg, publishers, Box::new(SimulatedIndicator::new()));
        let mut controller = Controller::start(sampler, pipeline, cfg.poll_interval)?;

        let script = Script { keys, cfg: &cfg };
        script.tap(Button::Speed);
        script.tap(Button::Colour);
        script.hold(Button::Mode);
        script.tap(Button::Mode);
        script.tap(Button::Mode);
        script.tap(Button::Channel);
        script.tap(Button::Colour);

        controller.shutdown()?;
        log::info!("Simulation finished");
        Ok(())
    }

    struct Script<'a> {
        keys: LadderHandle,
        cfg: &'a ControllerConfig,
    }

    impl Script<'_> {
        fn centre(&self, button: Button) -> Option<i32> {
            self.cfg
                .targets
                .iter()
                .find(|t| t.button == button)
                .and_then(|t| t.centres.first().copied())
        }

        fn press_for(&self, button: Button, duration: Duration) {
            let Some(level) = self.centre(button) else {
                log::warn!("No target configured for {}", button);
                return;
            };
            log::info!("-- {} down for {} ms", button, duration.as_millis());
            self.keys.set_level(level);
            thread::sleep(duration);
            self.keys.release();
            thread::sleep(self.cfg.poll_interval * 3);
        }

        fn tap(&self, button: Button) {
            self.press_for(button, self.cfg.poll_interval * (self.cfg.accuracy + 2));
        }

        fn hold(&self, button: Button) {
            self.press_for(button, self.cfg.hold_duration + self.cfg.poll_interval * 4);
        }
    }
}
