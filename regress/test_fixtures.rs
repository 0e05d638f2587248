//! Synthetic charge tables for unit tests.
//!
//! The default generator is log-linear: `ln(charges)` depends on age, smoking
//! status and BMI only, plus Gaussian noise, so tests know the true support.

use crate::data::Record;
use crate::encode::{DesignMatrix, EncoderConfig, EncodingSchema};
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub const REGIONS: [&str; 4] = ["northeast", "northwest", "southeast", "southwest"];

pub struct SyntheticCharges {
    n_samples: usize,
    seed: u64,
    noise_sd: f64,
}

impl SyntheticCharges {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            seed: 42,
            noise_sd: 0.3,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Standard deviation of the log-scale noise.
    pub fn with_noise(mut self, noise_sd: f64) -> Self {
        self.noise_sd = noise_sd;
        self
    }

    pub fn records(&self) -> Vec<Record> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.n_samples)
            .map(|i| {
                let age: u32 = rng.gen_range(18..=64);
                let smoker = rng.gen_bool(0.2);
                let bmi: f64 = rng.gen_range(16.0..45.0);
                let noise: f64 = rng.sample(StandardNormal);
                let log_charges = 7.0
                    + 0.035 * f64::from(age)
                    + if smoker { 1.5 } else { 0.0 }
                    + 0.02 * bmi
                    + self.noise_sd * noise;
                Record {
                    age,
                    gender: if rng.gen_bool(0.5) { "female" } else { "male" }.to_string(),
                    bmi,
                    kids: rng.gen_range(0..=4),
                    smoker: if smoker { "yes" } else { "no" }.to_string(),
                    exercise: rng.gen_range(0..=7),
                    // Cycling keeps every region present even in small samples.
                    region: REGIONS[i % REGIONS.len()].to_string(),
                    charges: log_charges.exp(),
                }
            })
            .collect()
    }

    /// Encodes the records with a schema fitted on themselves.
    pub fn design(&self) -> DesignMatrix {
        let records = self.records();
        let schema = EncodingSchema::fit(&records, &EncoderConfig::default())
            .expect("synthetic records always encode");
        schema.encode(&records).expect("synthetic charges are positive")
    }
}

/// Pearson correlation of two equal-length vectors.
pub fn correlation(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    cov / (var_a * var_b).sqrt()
}
