//! Yield generators for designs without field data.
//!
//! Generators are passed in explicitly, so analyses never depend on a
//! global random state.

use derive_builder::Builder;
use nalgebra::DMatrix;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::layout::Layout;

/// Produces a `(replications * k) x k` yield matrix for a layout.
pub trait YieldGenerator {
    fn generate(&mut self, layout: &Layout) -> DMatrix<f64>;
}

/// Every plot yields the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantYield(pub f64);

impl YieldGenerator for ConstantYield {
    fn generate(&mut self, layout: &Layout) -> DMatrix<f64> {
        let k = layout.block_size();
        DMatrix::from_element(layout.n_replications() * k, k, self.0)
    }
}

/// Additive field model: `mean + treatment + block + plot error`, each
/// term drawn from a centred normal with its own standard deviation.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(error = "crate::error::LatticeError", validate = "Self::validate"))]
pub struct FieldSimulator {
    #[builder(default = "40.0")]
    mean: f64,

    #[builder(default = "3.0")]
    treatment_sd: f64,

    #[builder(default = "2.0")]
    block_sd: f64,

    #[builder(default = "1.5")]
    error_sd: f64,

    #[builder(default = "42")]
    seed: u64,
}

impl FieldSimulatorBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(mean) = self.mean {
            if !mean.is_finite() {
                return Err(format!("mean {mean} must be finite"));
            }
        }
        for (name, sd) in [
            ("treatment_sd", self.treatment_sd),
            ("block_sd", self.block_sd),
            ("error_sd", self.error_sd),
        ] {
            if let Some(sd) = sd {
                if !(sd >= 0.0 && sd.is_finite()) {
                    return Err(format!("{name} {sd} must be finite and >= 0"));
                }
            }
        }
        Ok(())
    }
}

impl FieldSimulator {
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, sd: f64) -> f64 {
    if sd == 0.0 {
        return 0.0;
    }
    Normal::new(0.0, sd).map(|normal| normal.sample(rng)).unwrap_or(0.0)
}

impl YieldGenerator for FieldSimulator {
    fn generate(&mut self, layout: &Layout) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let k = layout.block_size();
        let reps = layout.n_replications();

        let treatment_effects: Vec<f64> = (0..layout.treatments()).map(|_| draw(&mut rng, self.treatment_sd)).collect();
        let block_effects: Vec<f64> = (0..reps * k).map(|_| draw(&mut rng, self.block_sd)).collect();

        let mut data = DMatrix::zeros(reps * k, k);
        for rep in 0..reps {
            for block in 0..k {
                for plot in 0..k {
                    let treatment = layout.treatment_at(rep, block, plot);
                    data[(rep * k + block, plot)] = self.mean
                        + treatment_effects[treatment]
                        + block_effects[rep * k + block]
                        + draw(&mut rng, self.error_sd);
                }
            }
        }
        data
    }
}
