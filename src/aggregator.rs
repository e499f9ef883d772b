// Reset-on-read reducers that fold high-frequency samples into one value per window.
// Each reducer is owned by a single sampler loop; none of them lock.

use std::time::Duration;

/// Length of one telemetry window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Shared contract of the plain reducers: fold values, then read and reset in one step.
pub trait WindowReducer {
    type Input;
    type Output;

    fn accumulate(&mut self, value: Self::Input);

    /// Returns the reduced value and puts the reducer back at its floor.
    fn flush_and_reset(&mut self) -> Self::Output;
}

/// Arithmetic mean of everything added since the last reset. Empty = 0.0.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}

impl WindowReducer for RunningMean {
    type Input = f64;
    type Output = f64;

    fn accumulate(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn flush_and_reset(&mut self) -> f64 {
        let mean = self.mean();
        self.sum = 0.0;
        self.count = 0;
        mean
    }
}

/// Maximum since the last reset, never below `floor`.
#[derive(Debug, Clone)]
pub struct RunningMax<T> {
    floor: T,
    current: T,
}

impl<T: PartialOrd + Copy> RunningMax<T> {
    pub fn new(floor: T) -> Self {
        Self {
            floor,
            current: floor,
        }
    }

    pub fn current(&self) -> T {
        self.current
    }
}

impl<T: PartialOrd + Copy + Default> Default for RunningMax<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialOrd + Copy> WindowReducer for RunningMax<T> {
    type Input = T;
    type Output = T;

    fn accumulate(&mut self, value: T) {
        if value > self.current {
            self.current = value;
        }
    }

    fn flush_and_reset(&mut self) -> T {
        std::mem::replace(&mut self.current, self.floor)
    }
}

/// Mean over a time bucket whose boundary is checked on every sample.
///
/// `accumulate` returns true once the sample's timestamp is at least one window past the
/// bucket start. The caller then calls [`flush_and_reset`](Self::flush_and_reset), which
/// re-baselines the bucket at the given instant. Until then every further sample keeps
/// returning true.
///
/// The bucket start is taken from the first sample after construction.
#[derive(Debug, Clone)]
pub struct TimeBucketedMean {
    window_ms: i64,
    bucket_start: Option<i64>,
    sum: f64,
    count: u64,
}

impl Default for TimeBucketedMean {
    fn default() -> Self {
        Self::new(WINDOW)
    }
}

impl TimeBucketedMean {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as i64,
            bucket_start: None,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn bucket_start(&self) -> Option<i64> {
        self.bucket_start
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Folds `value` observed at `timestamp_ms`; true when the window has elapsed.
    pub fn accumulate(&mut self, timestamp_ms: i64, value: f64) -> bool {
        let start = *self.bucket_start.get_or_insert(timestamp_ms);
        self.sum += value;
        self.count += 1;
        timestamp_ms - start >= self.window_ms
    }

    pub fn flush_and_reset(&mut self, rebaseline_at: i64) -> f64 {
        let mean = if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        };
        self.sum = 0.0;
        self.count = 0;
        self.bucket_start = Some(rebaseline_at);
        mean
    }
}
