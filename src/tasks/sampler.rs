// NV7 Controller — Sampler Task
//
// Reads the ladder ADC on a fast fixed tick and accumulates a running mean.
// The controller poll thread drains that mean with a destructive read, so
// every poll sees the average of all samples taken since the previous poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{READING_SCALE, STACK_SAMPLER};
use crate::drivers::adc::AnalogSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    #[error("analog source failed after {attempts} attempts: {reason}")]
    SourceFailed { attempts: u32, reason: String },
    #[error("analog source reports a full scale of {0}")]
    InvalidScale(i32),
    #[error("sampler has been stopped")]
    Stopped,
}

/// Scale a raw conversion onto 0..=READING_SCALE.
pub fn normalise(raw: i32, full_scale: i32) -> i32 {
    if full_scale <= 0 {
        return 0;
    }
    let scaled = (f64::from(raw) / f64::from(full_scale) * f64::from(READING_SCALE)).round();
    (scaled as i32).clamp(0, READING_SCALE)
}

/// Try up to `attempts` conversions, returning the first success.
pub fn read_with_retry<S: AnalogSource + ?Sized>(source: &mut S, attempts: u32) -> Result<i32, SamplerError> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match source.read_raw() {
            Ok(raw) => return Ok(raw),
            Err(e) => {
                log::debug!("ADC read attempt {}/{} failed: {:#}", attempt, attempts, e);
                last_err = Some(e);
            }
        }
    }
    Err(SamplerError::SourceFailed {
        attempts,
        reason: last_err.map(|e| format!("{:#}", e)).unwrap_or_default(),
    })
}

/// Take one reading from `source` and add it to `buffer`.
pub fn sample<S: AnalogSource + ?Sized>(source: &mut S, buffer: &SampleBuffer, retries: u32) -> Result<i32, SamplerError> {
    let full_scale = source.full_scale();
    if full_scale <= 0 {
        return Err(SamplerError::InvalidScale(full_scale));
    }
    let reading = normalise(read_with_retry(source, retries)?, full_scale);
    buffer.record(reading);
    Ok(reading)
}

#[derive(Debug, Default)]
struct Accumulator {
    sum: i64,
    count: u32,
    fault: Option<SamplerError>,
}

/// The one piece of state shared between the sampler and the poll thread.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    inner: Arc<Mutex<Accumulator>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        // Every critical section leaves the accumulator consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, reading: i32) {
        let mut acc = self.lock();
        acc.sum += i64::from(reading);
        acc.count += 1;
    }

    /// Mean since the last call (0 when nothing was sampled), then reset.
    /// Once the source has failed this keeps returning that failure.
    pub fn take(&self) -> Result<i32, SamplerError> {
        let mut acc = self.lock();
        if let Some(fault) = &acc.fault {
            return Err(fault.clone());
        }
        let mean = if acc.count == 0 { 0 } else { (acc.sum / i64::from(acc.count)) as i32 };
        acc.sum = 0;
        acc.count = 0;
        Ok(mean)
    }

    fn fail(&self, err: SamplerError) {
        let mut acc = self.lock();
        if acc.fault.is_none() {
            acc.fault = Some(err);
        }
    }
}

pub struct Sampler {
    buffer: SampleBuffer,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Takes ownership of `source` and starts sampling immediately. The
    /// source is dropped (released) when the sampling thread exits.
    pub fn spawn<S>(source: S, interval: Duration, retries: u32) -> anyhow::Result<Self>
    where
        S: AnalogSource + 'static,
    {
        let buffer = SampleBuffer::new();
        let stop = Arc::new(AtomicBool::new(false));

        let task_buffer = buffer.clone();
        let task_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("sampler".into())
            .stack_size(STACK_SAMPLER)
            .spawn(move || sampler_task(source, task_buffer, task_stop, interval, retries))?;

        Ok(Self {
            buffer,
            stop,
            handle: Some(handle),
        })
    }

    pub fn buffer(&self) -> SampleBuffer {
        self.buffer.clone()
    }

    pub fn read(&self) -> Result<i32, SamplerError> {
        if self.handle.is_none() {
            return Err(SamplerError::Stopped);
        }
        self.buffer.take()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the tick and wait for the thread, releasing the source. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Sampler thread panicked");
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sampler_task<S: AnalogSource>(
    mut source: S,
    buffer: SampleBuffer,
    stop: Arc<AtomicBool>,
    interval: Duration,
    retries: u32,
) {
    log::info!("Sampler task started ({} ms tick)", interval.as_millis());

    while !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();

        if let Err(e) = sample(&mut source, &buffer, retries) {
            log::error!("Sampler giving up: {}", e);
            buffer.fail(e);
            break;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    log::info!("Sampler task stopped, releasing analog source");
    drop(source);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::SimulatedLadder;

    struct Flaky {
        failures_left: u32,
        raw: i32,
    }

    struct Unscaled;

    impl AnalogSource for Unscaled {
        fn read_raw(&mut self) -> anyhow::Result<i32> {
            Ok(100)
        }

        fn full_scale(&self) -> i32 {
            0
        }
    }

    impl AnalogSource for Flaky {
        fn read_raw(&mut self) -> anyhow::Result<i32> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                anyhow::bail!("i2c nack");
            }
            Ok(self.raw)
        }

        fn full_scale(&self) -> i32 {
            32767
        }
    }

    #[test]
    fn normalise_rounds_onto_reading_scale() {
        assert_eq!(normalise(0, 32767), 0);
        assert_eq!(normalise(32767, 32767), 1000);
        assert_eq!(normalise(16384, 32767), 500);
        assert_eq!(normalise(2048, 4095), 500);
    }

    #[test]
    fn normalise_clamps_out_of_range_raw() {
        assert_eq!(normalise(-20, 4095), 0);
        assert_eq!(normalise(5000, 4095), 1000);
        assert_eq!(normalise(100, 0), 0);
    }

    #[test]
    fn take_returns_integer_mean_and_resets() {
        let buf = SampleBuffer::new();
        buf.record(400);
        buf.record(401);
        buf.record(403);
        assert_eq!(buf.take(), Ok(401));
        assert_eq!(buf.take(), Ok(0));
    }

    #[test]
    fn retry_recovers_from_transient_errors() {
        let mut src = Flaky { failures_left: 4, raw: 123 };
        assert_eq!(read_with_retry(&mut src, 5), Ok(123));
    }

    #[test]
    fn retry_gives_up_after_bound() {
        let mut src = Flaky { failures_left: 5, raw: 123 };
        let err = read_with_retry(&mut src, 5).unwrap_err();
        assert!(matches!(err, SamplerError::SourceFailed { attempts: 5, .. }));
    }

    #[test]
    fn sample_normalises_into_buffer() {
        let mut src = Flaky { failures_left: 1, raw: 16384 };
        let buf = SampleBuffer::new();
        assert_eq!(sample(&mut src, &buf, 2), Ok(500));
        assert_eq!(buf.take(), Ok(500));
    }

    #[test]
    fn zero_full_scale_is_an_error() {
        let buf = SampleBuffer::new();
        assert_eq!(sample(&mut Unscaled, &buf, 5), Err(SamplerError::InvalidScale(0)));
        assert_eq!(buf.take(), Ok(0));

        let sampler = Sampler::spawn(Unscaled, Duration::from_millis(1), 5).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!sampler.is_running());
        assert_eq!(sampler.read(), Err(SamplerError::InvalidScale(0)));
    }

    #[test]
    fn concurrent_record_and_take_never_tear() {
        const LEVEL: i32 = 617;
        let buf = SampleBuffer::new();
        let stop = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let buf = buf.clone();
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        buf.record(LEVEL);
                    }
                })
            })
            .collect();

        let mut non_empty = 0;
        for _ in 0..20_000 {
            match buf.take() {
                Ok(0) => {}
                Ok(mean) => {
                    assert_eq!(mean, LEVEL);
                    non_empty += 1;
                }
                Err(e) => panic!("unexpected fault: {e}"),
            }
        }

        stop.store(true, Ordering::SeqCst);
        for w in writers {
            w.join().unwrap();
        }
        assert!(non_empty > 0);
        assert!(matches!(buf.take(), Ok(0) | Ok(LEVEL)));
    }

    #[test]
    fn fault_is_sticky() {
        let buf = SampleBuffer::new();
        buf.record(10);
        buf.fail(SamplerError::SourceFailed { attempts: 5, reason: "gone".into() });
        assert!(buf.take().is_err());
        assert!(buf.take().is_err());
    }

    #[test]
    fn background_thread_accumulates_samples() {
        let ladder = SimulatedLadder::new();
        let keys = ladder.handle();
        keys.set_level(600);

        let mut sampler = Sampler::spawn(ladder, Duration::from_millis(1), 5).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sampler.read(), Ok(600));

        sampler.shutdown();
        sampler.shutdown();
        assert!(!sampler.is_running());
        assert_eq!(sampler.read(), Err(SamplerError::Stopped));
    }

    #[test]
    fn dead_source_stops_the_thread_and_surfaces() {
        let ladder = SimulatedLadder::new();
        ladder.handle().kill();

        let sampler = Sampler::spawn(ladder, Duration::from_millis(1), 3).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!sampler.is_running());
        assert!(matches!(sampler.read(), Err(SamplerError::SourceFailed { attempts: 3, .. })));
    }
}
