//! Randomized complete block design: the baseline a lattice is compared with.

use nalgebra::DMatrix;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::debug;

use crate::anova::{mean_square, AnovaTable, SourceOfVariation};
use crate::comparison::{duncan_mrt, tukey_hsd, ComparisonResult};
use crate::error::{LatticeError, Result};
use crate::variance::{coefficient_of_variation, deviation_squares, snap_scale};

#[derive(Debug, Clone, PartialEq)]
pub struct RcbdAnalysis {
    pub anova: AnovaTable,
    /// Treatment means, indexed by treatment (column).
    pub means: Vec<f64>,
    /// Standard error of a treatment mean, `sqrt(MSE / blocks)`.
    pub se: f64,
    pub cv: f64,
    pub grand_mean: f64,
    pub error_ms: f64,
    pub error_df: usize,
}

/// Yields laid out one row per block, one column per treatment.
#[derive(Debug, Clone, PartialEq)]
pub struct Rcbd {
    treatments: usize,
    blocks: usize,
    data: DMatrix<f64>,
}

impl Rcbd {
    pub fn new(treatments: usize, blocks: usize, data: DMatrix<f64>) -> Result<Self> {
        if treatments < 2 {
            return Err(LatticeError::invalid_parameter(format!(
                "RCBD needs at least 2 treatments, got {treatments}"
            )));
        }
        if blocks < 2 {
            return Err(LatticeError::invalid_parameter(format!(
                "RCBD needs at least 2 blocks, got {blocks}"
            )));
        }
        if data.nrows() != blocks || data.ncols() != treatments {
            return Err(LatticeError::DataShape {
                expected_rows: blocks,
                expected_cols: treatments,
                rows: data.nrows(),
                cols: data.ncols(),
            });
        }
        if data.iter().any(|y| !y.is_finite()) {
            return Err(LatticeError::invalid_parameter("RCBD data contains a non-finite value"));
        }
        Ok(Self {
            treatments,
            blocks,
            data,
        })
    }

    pub fn treatments(&self) -> usize {
        self.treatments
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn analyze(&self) -> RcbdAnalysis {
        let (t, b) = (self.treatments as f64, self.blocks as f64);
        let grand = self.data.sum();
        let grand_mean = grand / (t * b);

        // all sums of squares about the grand mean
        let total_ss: f64 = self.data.iter().map(|y| (y - grand_mean) * (y - grand_mean)).sum();
        let block_totals: Vec<f64> = self.data.row_iter().map(|row| row.sum()).collect();
        let treatment_totals: Vec<f64> = self.data.column_iter().map(|col| col.sum()).collect();
        let block_ss = deviation_squares(&block_totals, t * grand_mean) / t;
        let treatment_ss = deviation_squares(&treatment_totals, b * grand_mean) / b;

        let scale = snap_scale(total_ss, self.data.iter().map(|y| y * y).sum());
        let snap = |ss: f64| if ss.abs() <= 1e-10 * scale { 0.0 } else { ss };
        let (total_ss, block_ss, treatment_ss) = (snap(total_ss), snap(block_ss), snap(treatment_ss));
        let error_ss = snap(total_ss - block_ss - treatment_ss);

        let block_df = self.blocks - 1;
        let treatment_df = self.treatments - 1;
        let error_df = block_df * treatment_df;
        let total_df = self.blocks * self.treatments - 1;
        let error_ms = mean_square(error_ss, error_df);

        let anova = AnovaTable::from_components(
            &[
                (SourceOfVariation::Blocks, block_df, block_ss),
                (SourceOfVariation::Treatments, treatment_df, treatment_ss),
            ],
            (error_df, error_ss),
            (total_df, total_ss),
        );

        let means: Vec<f64> = treatment_totals.iter().map(|total| total / b).collect();
        debug!(error_ms, error_df, "rcbd analysis");

        RcbdAnalysis {
            anova,
            means,
            se: (error_ms / b).sqrt(),
            cv: coefficient_of_variation(error_ms, grand_mean),
            grand_mean,
            error_ms,
            error_df,
        }
    }

    /// Fisher's least significant difference, `t(1 - alpha/2, df_e) * sqrt(2 MSE / b)`.
    pub fn lsd(&self, alpha: f64) -> Result<f64> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(LatticeError::invalid_parameter(format!("alpha {alpha} must lie in (0, 1)")));
        }
        let analysis = self.analyze();
        let t = StudentsT::new(0.0, 1.0, analysis.error_df as f64)
            .map_err(|e| LatticeError::invalid_parameter(e.to_string()))?
            .inverse_cdf(1.0 - alpha / 2.0);
        Ok(t * (2.0 * analysis.error_ms / self.blocks as f64).sqrt())
    }

    pub fn tukey_hsd(&self, alpha: f64) -> Result<ComparisonResult> {
        let analysis = self.analyze();
        tukey_hsd(&analysis.means, analysis.se, analysis.error_df, alpha)
    }

    pub fn dmrt(&self, alpha: f64) -> Result<ComparisonResult> {
        let analysis = self.analyze();
        duncan_mrt(&analysis.means, analysis.se, analysis.error_df, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rcbd() -> Rcbd {
        let data = DMatrix::from_row_slice(
            3,
            4,
            &[
                45.0, 42.0, 36.0, 39.0, //
                42.0, 40.0, 37.0, 38.0, //
                43.0, 38.0, 35.0, 40.0,
            ],
        );
        Rcbd::new(4, 3, data).unwrap()
    }

    #[test]
    fn test_rcbd_anova_and_means() {
        let analysis = sample_rcbd().analyze();
        assert_eq!(analysis.anova.degrees_of_freedom(), vec![2, 3, 6, 11]);
        assert!(analysis.anova.ss_discrepancy().abs() < 1e-9);

        let expected = [43.33, 40.00, 36.00, 39.00];
        for (mean, want) in analysis.means.iter().zip(expected) {
            assert!((mean - want).abs() < 0.01);
        }
        assert!((analysis.error_ms - 11.5 / 6.0).abs() < 1e-9);
        assert!(analysis.cv > 0.0 && analysis.cv < 100.0);
        assert!(analysis.se > 0.0);
    }

    #[test]
    fn test_rcbd_lsd() {
        // t(0.975, 6) = 2.447
        let lsd = sample_rcbd().lsd(0.05).unwrap();
        let expected = 2.447 * (2.0 * 11.5 / 6.0 / 3.0f64).sqrt();
        assert!((lsd - expected).abs() < 1e-2);
        assert!(sample_rcbd().lsd(0.0).is_err());
    }

    #[test]
    fn test_rcbd_comparisons() {
        let rcbd = sample_rcbd();
        let tukey = rcbd.tukey_hsd(0.05).unwrap();
        assert!(tukey.hsd().unwrap() > 0.0);
        assert_eq!(tukey.groups.len(), 4);
        assert_eq!(tukey.comparisons.len(), 6);

        let duncan = rcbd.dmrt(0.05).unwrap();
        let ladder = duncan.ladder().unwrap();
        assert_eq!(ladder.len(), 3);
        assert!(ladder.iter().all(|&cv| cv > 0.0));
        assert_eq!(duncan.groups.len(), 4);
    }

    #[test]
    fn test_rcbd_large_offset_keeps_variation() {
        let base = sample_rcbd().analyze();
        let shifted = Rcbd::new(4, 3, sample_rcbd().data().add_scalar(1e6))
            .unwrap()
            .analyze();
        for (a, b) in base.anova.sums_of_squares().iter().zip(shifted.anova.sums_of_squares()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
        assert!((shifted.error_ms - 11.5 / 6.0).abs() < 1e-6);
        assert!(shifted.se > 0.0);
        let tukey = Rcbd::new(4, 3, sample_rcbd().data().add_scalar(1e6))
            .unwrap()
            .tukey_hsd(0.05)
            .unwrap();
        assert!(tukey.hsd().unwrap() > 0.0);
    }

    #[test]
    fn test_rcbd_shape_mismatch() {
        let err = Rcbd::new(4, 3, DMatrix::from_element(2, 2, 1.0)).unwrap_err();
        assert!(err.is_configuration());
        assert!(Rcbd::new(1, 3, DMatrix::from_element(3, 1, 1.0)).is_err());
    }
}
