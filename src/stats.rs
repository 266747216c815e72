use serde::{Deserialize, Serialize};

/// Running summary of a trajectory: time average, spread and extremes.
///
/// Mean and variance are updated with Welford's method.
#[derive(Debug)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
    min: (f64, f64),
    max: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
    pub min_value: f64,
    pub min_time: f64,
    pub max_value: f64,
    pub max_time: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
            min: (f64::NAN, f64::INFINITY),
            max: (f64::NAN, f64::NEG_INFINITY),
        }
    }

    pub fn add(&mut self, time: f64, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;

        // Ties keep the earliest time.
        if val < self.min.1 {
            self.min = (time, val);
        }
        if val > self.max.1 {
            self.max = (time, val);
        }
    }

    pub fn report(&self) -> AccumulatorReport {
        let empty = self.n_vals == 0;
        AccumulatorReport {
            mean: if empty { f64::NAN } else { self.mean },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
            min_value: if empty { f64::NAN } else { self.min.1 },
            min_time: self.min.0,
            max_value: if empty { f64::NAN } else { self.max.1 },
            max_time: self.max.0,
        }
    }
}
