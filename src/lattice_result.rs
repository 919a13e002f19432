use crate::anova::AnovaTable;
use crate::variance::{BlockEffects, DegreesOfFreedom, SumsOfSquares};

/// Treatment means after recovery of inter-block information.
///
/// # Fields
///
/// * `means` - Adjusted mean per treatment id
/// * `unadjusted_means` - Raw treatment means, ignoring blocks
/// * `adjustments` - `means - unadjusted_means`
/// * `se` - Pooled standard error of an adjusted mean
/// * `se_difference` - Standard error of the difference of two adjusted means
/// * `weight` - Weighting factor in [0, 1]; 0 leaves the means unadjusted
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedMeansResult {
    pub means: Vec<f64>,
    pub unadjusted_means: Vec<f64>,
    pub adjustments: Vec<f64>,
    pub se: f64,
    pub se_difference: f64,
    pub weight: f64,
}

/// Everything one `analyze()` call produces for a lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeAnalysis {
    pub anova: AnovaTable,
    pub sums_of_squares: SumsOfSquares,
    pub degrees_of_freedom: DegreesOfFreedom,
    pub adjusted: AdjustedMeansResult,
    pub block_effects: BlockEffects,
    /// Mean square of blocks within replications (adjusted).
    pub block_ms: f64,
    /// Intra-block error mean square.
    pub error_ms: f64,
    /// Error mean square inflated for the estimated block effects.
    pub effective_error_ms: f64,
    /// Relative efficiency against an RCBD, in percent.
    pub efficiency: f64,
    /// Coefficient of variation, in percent.
    pub cv: f64,
    pub grand_mean: f64,
}

impl LatticeAnalysis {
    pub fn means(&self) -> &[f64] {
        &self.adjusted.means
    }

    pub fn se(&self) -> f64 {
        self.adjusted.se
    }

    pub fn adjustments(&self) -> &[f64] {
        &self.adjusted.adjustments
    }

    pub fn weight(&self) -> f64 {
        self.adjusted.weight
    }

    pub fn error_df(&self) -> usize {
        self.degrees_of_freedom.error
    }
}
