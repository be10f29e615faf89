//! Rotary filter for jog wheel motion
//!
//! Smooths relative jog ticks into a continuous scratch/bend amount using a
//! short moving average, scaled down by a calibration divisor.

/// Default number of samples in the moving average.
pub const DEFAULT_FILTER_LENGTH: usize = 4;

/// Default calibration divisor (the most sensitive jog mode).
pub const DEFAULT_CALIBRATION: f64 = 64.0;

/// Moving-average filter over calibrated jog deltas
#[derive(Debug, Clone)]
pub struct RotaryFilter {
    /// Ring buffer of calibrated samples
    history: Vec<f64>,
    /// Next slot to overwrite
    pos: usize,
    /// Divisor applied to every incoming delta
    calibration: f64,
}

impl RotaryFilter {
    /// Create a filter with the given length and calibration divisor.
    ///
    /// A zero length is bumped to 1 and a non-positive calibration falls back
    /// to [`DEFAULT_CALIBRATION`].
    pub fn new(filter_length: usize, calibration: f64) -> Self {
        let mut filter = Self {
            history: Vec::new(),
            pos: 0,
            calibration: DEFAULT_CALIBRATION,
        };
        filter.set_filter_length(filter_length);
        filter.set_calibration(calibration);
        filter
    }

    /// Push one delta and return the current average.
    pub fn filter(&mut self, delta: f64) -> f64 {
        self.history[self.pos] = delta / self.calibration;
        self.pos = (self.pos + 1) % self.history.len();

        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    /// Seed the whole history with one delta.
    ///
    /// Used when motion starts abruptly so the output does not ramp up over
    /// the filter length.
    pub fn fill_buffer(&mut self, delta: f64) -> f64 {
        let value = delta / self.calibration;
        self.history.iter_mut().for_each(|slot| *slot = value);
        value
    }

    /// Change the calibration divisor. History is kept as-is.
    pub fn set_calibration(&mut self, calibration: f64) {
        if calibration > 0.0 && calibration.is_finite() {
            self.calibration = calibration;
        }
    }

    pub fn calibration(&self) -> f64 {
        self.calibration
    }

    /// Resize the moving average window. Clears the history.
    pub fn set_filter_length(&mut self, filter_length: usize) {
        self.history = vec![0.0; filter_length.max(1)];
        self.pos = 0;
    }

    pub fn filter_length(&self) -> usize {
        self.history.len()
    }
}

impl Default for RotaryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_LENGTH, DEFAULT_CALIBRATION)
    }
}
