// NV7 Controller — Controller Poll Task
//
// On every poll: drain the sampler mean, classify it, feed the debouncer and
// apply any resulting gesture to the state machine. The pipeline is owned by
// the poll thread alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::classifier::Classifier;
use crate::config::{ControllerConfig, STACK_CONTROLLER};
use crate::drivers::indicator::ChannelIndicator;
use crate::events::{Channel, Event};
use crate::input::GestureDebouncer;
use crate::publisher::PublisherSet;
use crate::state::StateMachine;
use crate::tasks::sampler::{SampleBuffer, Sampler, SamplerError};

pub struct Pipeline {
    classifier: Classifier,
    debouncer: GestureDebouncer,
    machine: StateMachine,
    indicator: Box<dyn ChannelIndicator>,
    shown: Option<Channel>,
}

impl Pipeline {
    /// Publishes `Start` and drives the indicator to the initial channel.
    pub fn new(cfg: &ControllerConfig, publishers: PublisherSet, indicator: Box<dyn ChannelIndicator>) -> Self {
        let mut pipeline = Self {
            classifier: Classifier::from_targets(&cfg.targets, cfg.tolerance),
            debouncer: GestureDebouncer::new(cfg.accuracy, cfg.hold_duration),
            machine: StateMachine::new(&cfg.themes, publishers),
            indicator,
            shown: None,
        };
        pipeline.sync_indicator();
        pipeline
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn debouncer(&self) -> &GestureDebouncer {
        &self.debouncer
    }

    /// Process one averaged reading taken at `now`.
    pub fn step(&mut self, reading: i32, now: Instant) -> Vec<Event> {
        let classified = self.classifier.classify(reading);

        let mut events = Vec::new();
        for gesture in self.debouncer.observe(classified, now) {
            log::debug!("Gesture {:?} (reading {})", gesture, reading);
            events.extend(self.machine.apply(gesture));
        }

        self.sync_indicator();
        events
    }

    fn sync_indicator(&mut self) {
        let channel = self.machine.channel();
        if self.shown == Some(channel) {
            return;
        }
        match self.indicator.show(channel) {
            Ok(()) => self.shown = Some(channel),
            Err(e) => log::warn!("Channel indicator write failed: {:#}", e),
        }
    }
}

pub struct Controller {
    sampler: Option<Sampler>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<SamplerError>>>,
}

impl Controller {
    pub fn start(sampler: Sampler, pipeline: Pipeline, poll_interval: Duration) -> anyhow::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));

        let buffer = sampler.buffer();
        let task_stop = Arc::clone(&stop);
        let task_failure = Arc::clone(&failure);
        let handle = thread::Builder::new()
            .name("controller".into())
            .stack_size(STACK_CONTROLLER)
            .spawn(move || {
                if let Err(e) = controller_task(pipeline, buffer, task_stop, poll_interval) {
                    *task_failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(e);
                }
            })?;

        Ok(Self {
            sampler: Some(sampler),
            stop,
            handle: Some(handle),
            failure,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The fatal error that stopped the poll loop, if any.
    pub fn failure(&self) -> Option<SamplerError> {
        self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Stop polling, then stop sampling and release the analog source.
    /// Idempotent; reports the fatal error that ended the loop, if any.
    pub fn shutdown(&mut self) -> Result<(), SamplerError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Controller thread panicked");
            }
        }
        if let Some(mut sampler) = self.sampler.take() {
            sampler.shutdown();
        }

        match self.failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Controller stopped with error: {}", e);
        }
    }
}

fn controller_task(
    mut pipeline: Pipeline,
    buffer: SampleBuffer,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
) -> Result<(), SamplerError> {
    log::info!("Controller task started ({} ms poll)", poll_interval.as_millis());

    while !stop.load(Ordering::SeqCst) {
        let poll_time = Instant::now();

        let reading = match buffer.take() {
            Ok(r) => r,
            Err(e) => {
                log::error!("Controller stopping: {}", e);
                return Err(e);
            }
        };
        pipeline.step(reading, poll_time);

        let elapsed = poll_time.elapsed();
        if elapsed < poll_interval {
            thread::sleep(poll_interval - elapsed);
        }
    }

    log::info!("Controller task stopped");
    Ok(())
}
