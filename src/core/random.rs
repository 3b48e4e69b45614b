//! Seeded random draw service.
//!
//! Every stochastic decision in a run (sequence generation, organ events,
//! uniform picks) consumes from one [`SimRng`]. It is owned by the simulation
//! root and threaded through by `&mut`, so one seed replays one exact run.

use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the stream; the following draws repeat those made after `new(seed)`.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Uniform value in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> Result<f64> {
        if !(low < high) {
            return Err(Error::invalid(format!(
                "uniform bounds must satisfy low < high, got [{low}, {high}]"
            )));
        }
        Ok(self.rng.random_range(low..=high))
    }

    pub fn uniform_scaled(&mut self, scale: f64) -> Result<f64> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(Error::invalid(format!(
                "uniform scale must be positive, got {scale}"
            )));
        }
        Ok(scale * self.random())
    }

    /// Integer in `[0, n - 1]`.
    pub fn uniform_int(&mut self, n: usize) -> Result<usize> {
        if n == 0 {
            return Err(Error::invalid("uniform_int needs n > 0"));
        }
        Ok(self.rng.random_range(0..n))
    }

    /// Shape-checked entry point: `[scale]` or `[low, high]`.
    pub fn draw(&mut self, args: &[f64]) -> Result<f64> {
        match *args {
            [scale] => self.uniform_scaled(scale),
            [low, high] => self.uniform(low, high),
            _ => Err(Error::invalid(format!(
                "draw expects 1 or 2 arguments, got {}",
                args.len()
            ))),
        }
    }

    pub fn boolean(&mut self, probability: f64) -> Result<bool> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::invalid(format!(
                "probability must lie in [0, 1], got {probability}"
            )));
        }
        Ok(self.random() < probability)
    }

    /// Categorical draw by CDF inversion, 1-indexed.
    ///
    /// `pdf` must already sum to exactly 1; it is never renormalized here.
    pub fn draw_index(&mut self, pdf: &[f64]) -> Result<usize> {
        if pdf.is_empty() {
            return Err(Error::invalid("draw_index needs a non-empty pdf"));
        }
        if pdf.iter().any(|p| *p < 0.0) {
            return Err(Error::invalid(format!("negative mass in pdf {pdf:?}")));
        }
        let total: f64 = pdf.iter().sum();
        if total != 1.0 {
            return Err(Error::invalid(format!(
                "pdf must sum to 1, got {total} for {pdf:?}"
            )));
        }
        let target = self.random();
        let mut cumulation = 0.0;
        for (i, p) in pdf.iter().enumerate() {
            cumulation += p;
            if cumulation > target {
                return Ok(i + 1);
            }
        }
        Ok(pdf.len())
    }

    pub fn sample<T, D: Distribution<T>>(&mut self, distribution: &D) -> T {
        self.rng.sample(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseed_replays_identical_stream() {
        let mut rng = SimRng::new(1163078255);
        let first: Vec<f64> = (0..16).map(|_| rng.random()).collect();
        rng.reseed(1163078255);
        let second: Vec<f64> = (0..16).map(|_| rng.random()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn uniform_stays_inside_bounds() {
        let mut rng = SimRng::new(3);
        for _ in 0..1000 {
            let x = rng.uniform(-2.0, 5.0).unwrap();
            assert!((-2.0..=5.0).contains(&x));
            let s = rng.uniform_scaled(1.5).unwrap();
            assert!((0.0..=1.5).contains(&s));
            let k = rng.uniform_int(9).unwrap();
            assert!(k < 9);
        }
    }

    #[test]
    fn draw_rejects_unsupported_shapes() {
        let mut rng = SimRng::new(1);
        assert!(rng.draw(&[]).is_err());
        assert!(rng.draw(&[1.0, 2.0, 3.0]).is_err());
        assert!(rng.draw(&[2.0, 1.0]).is_err());
        assert!(rng.draw(&[2.0]).is_ok());
        assert!(rng.draw(&[1.0, 2.0]).is_ok());
    }

    #[test]
    fn boolean_validates_probability() {
        let mut rng = SimRng::new(1);
        assert!(matches!(rng.boolean(1.5), Err(Error::InvalidArgument(_))));
        assert!(matches!(rng.boolean(-0.1), Err(Error::InvalidArgument(_))));
        assert!(rng.boolean(1.0).unwrap());
        assert!(!rng.boolean(0.0).unwrap());
    }

    #[test]
    fn draw_index_never_selects_zero_mass() {
        let mut rng = SimRng::new(11);
        for _ in 0..2000 {
            let idx = rng.draw_index(&[0.83, 0.17, 0.0]).unwrap();
            assert!(idx == 1 || idx == 2, "got {idx}");
        }
    }
}
