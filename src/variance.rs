//! Intra-block analysis of square lattices with recovery of inter-block
//! information.
//!
//! Notation: `r` replications, block size `k`, `k²` treatments. Yield row
//! `rep * k + block` holds the plots of one block, in layout plot order.

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::anova::{mean_square, AnovaTable, SourceOfVariation};
use crate::error::{LatticeError, Result};
use crate::lattice_result::{AdjustedMeansResult, LatticeAnalysis};
use crate::layout::{LatticeType, Layout};

/// Relative size below which a sum of squares is treated as exactly zero.
const SS_SNAP: f64 = 1e-10;

/// Raw totals of the yield matrix (stage 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub grand: f64,
    /// Grand mean, the centre every sum of squares is taken about.
    pub mean: f64,
    /// Uncorrected `sum(y^2)`.
    pub sum_of_squares: f64,
    /// `sum((y - mean)^2)`.
    pub corrected_sum_of_squares: f64,
    pub replications: Vec<f64>,
    /// Indexed by treatment id, ignoring blocks.
    pub treatments: Vec<f64>,
    /// Replication-major, `rep * k + block`.
    pub blocks: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SumsOfSquares {
    pub correction: f64,
    pub replications: f64,
    /// Unadjusted for blocks.
    pub treatments: f64,
    /// Blocks within replications, adjusted for treatments.
    pub blocks: f64,
    /// Intra-block error, by subtraction.
    pub error: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegreesOfFreedom {
    pub replications: usize,
    pub treatments: usize,
    pub blocks: usize,
    pub error: usize,
    pub total: usize,
}

impl DegreesOfFreedom {
    pub fn for_lattice(replications: usize, k: usize) -> Self {
        let total = replications * k * k - 1;
        let reps = replications - 1;
        let treatments = k * k - 1;
        let blocks = replications * (k - 1);
        Self {
            replications: reps,
            treatments,
            blocks,
            error: total - reps - treatments - blocks,
            total,
        }
    }
}

/// Per-block adjustment effects (stage 3), replication-major.
///
/// A positive effect marks a block that yielded less than its treatments
/// predict; treatments sown there are adjusted upwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEffects {
    block_size: usize,
    effects: Vec<f64>,
}

impl BlockEffects {
    pub fn all(&self) -> &[f64] {
        &self.effects
    }

    pub fn for_replication(&self, rep: usize) -> &[f64] {
        &self.effects[rep * self.block_size..(rep + 1) * self.block_size]
    }

    pub fn get(&self, rep: usize, block: usize) -> f64 {
        self.effects[rep * self.block_size + block]
    }

    pub fn sum_within(&self, rep: usize) -> f64 {
        self.for_replication(rep).iter().sum()
    }
}

/// Runs the lattice analysis over one layout and yield matrix.
#[derive(Debug)]
pub struct VarianceEngine<'a> {
    layout: &'a Layout,
    data: &'a DMatrix<f64>,
    r: usize,
    k: usize,
}

impl<'a> VarianceEngine<'a> {
    /// # Errors
    ///
    /// [`LatticeError::InvalidReplications`] unless the layout has 2 or 3
    /// replications, [`LatticeError::DataShape`] unless `data` is
    /// `(r * k) x k`, and [`LatticeError::InvalidParameter`] for non-finite
    /// observations.
    pub fn new(layout: &'a Layout, data: &'a DMatrix<f64>) -> Result<Self> {
        let r = LatticeType::from_replications(layout.n_replications())?.replications();
        let k = layout.block_size();
        check_yield_shape(data, r, k)?;
        Ok(Self { layout, data, r, k })
    }

    fn treatments(&self) -> usize {
        self.k * self.k
    }

    fn plot(&self, rep: usize, block: usize, plot: usize) -> f64 {
        self.data[(rep * self.k + block, plot)]
    }

    /// Stage 1: grand, replication, treatment and block totals.
    pub fn totals(&self) -> Totals {
        let (r, k) = (self.r, self.k);
        let mut replications = vec![0.0; r];
        let mut treatments = vec![0.0; self.treatments()];
        let mut blocks = vec![0.0; r * k];
        let mut sum_of_squares = 0.0;

        for rep in 0..r {
            for block in 0..k {
                for plot in 0..k {
                    let y = self.plot(rep, block, plot);
                    blocks[rep * k + block] += y;
                    treatments[self.layout.treatment_at(rep, block, plot)] += y;
                    sum_of_squares += y * y;
                }
            }
            replications[rep] = blocks[rep * k..(rep + 1) * k].iter().sum();
        }

        let grand: f64 = replications.iter().sum();
        let mean = grand / (r * self.treatments()) as f64;
        let corrected_sum_of_squares: f64 = self.data.iter().map(|y| (y - mean) * (y - mean)).sum();

        Totals {
            grand,
            mean,
            sum_of_squares,
            corrected_sum_of_squares,
            replications,
            treatments,
            blocks,
        }
    }

    /// `C_b = (sum of totals of the treatments in b) - r * B_b`.
    pub fn block_adjustments(&self, totals: &Totals) -> Vec<f64> {
        let r = self.r as f64;
        self.layout
            .blocks()
            .zip(&totals.blocks)
            .map(|(block, &block_total)| {
                let treatment_sum: f64 = block.treatments().iter().map(|&t| totals.treatments[t]).sum();
                treatment_sum - r * block_total
            })
            .collect()
    }

    /// Stages 1-2: sums of squares, the intra-block error by subtraction.
    ///
    /// Totals are taken about the grand mean, so a large common offset in
    /// the yields does not cancel the variation away.
    pub fn sums_of_squares(&self, totals: &Totals, adjustments: &[f64]) -> SumsOfSquares {
        let (r, k) = (self.r as f64, self.k as f64);
        let n = k * k;
        let correction = totals.grand * totals.grand / (r * n);
        let scale = snap_scale(totals.corrected_sum_of_squares, totals.sum_of_squares);
        let snap = |ss: f64| if ss.abs() <= SS_SNAP * scale { 0.0 } else { ss };

        let total = snap(totals.corrected_sum_of_squares);
        let replications = snap(deviation_squares(&totals.replications, n * totals.mean) / n);
        let treatments = snap(deviation_squares(&totals.treatments, r * totals.mean) / r);

        let rep_adjustments: Vec<f64> = adjustments.chunks(self.k).map(|c| c.iter().sum()).collect();
        let blocks = snap(
            squares(adjustments) / (k * r * (r - 1.0)) - squares(&rep_adjustments) / (n * r * (r - 1.0)),
        );
        let error = snap(total - replications - treatments - blocks);

        debug!(total, replications, treatments, blocks, error, "lattice sums of squares");
        SumsOfSquares {
            correction,
            replications,
            treatments,
            blocks,
            error,
            total,
        }
    }

    pub fn degrees_of_freedom(&self) -> DegreesOfFreedom {
        DegreesOfFreedom::for_lattice(self.r, self.k)
    }

    /// Stage 3: `e_b = (C_b - mean C in its replication) / (k (r - 1))`.
    pub fn block_effects(&self, adjustments: &[f64]) -> BlockEffects {
        let divisor = (self.k * (self.r - 1)) as f64;
        let effects = adjustments
            .chunks(self.k)
            .flat_map(|rep| {
                let centre = rep.iter().sum::<f64>() / rep.len() as f64;
                rep.iter().map(move |c| (c - centre) / divisor)
            })
            .collect();
        BlockEffects {
            block_size: self.k,
            effects,
        }
    }

    /// Stage 5: `unadjusted + w * (sum of the effects of the blocks holding t)`.
    pub fn adjusted_means(&self, totals: &Totals, effects: &BlockEffects, weight: f64) -> (Vec<f64>, Vec<f64>) {
        let r = self.r as f64;
        let unadjusted: Vec<f64> = totals.treatments.iter().map(|t| t / r).collect();
        if weight == 0.0 {
            return (unadjusted.clone(), unadjusted);
        }

        let mut contribution = vec![0.0; self.treatments()];
        for (rep_idx, rep) in self.layout.replications().iter().enumerate() {
            for (block_idx, block) in rep.blocks().iter().enumerate() {
                let effect = effects.get(rep_idx, block_idx);
                for &t in block.treatments() {
                    contribution[t] += effect;
                }
            }
        }
        let adjusted = unadjusted
            .iter()
            .zip(&contribution)
            .map(|(mean, c)| mean + weight * c)
            .collect();
        (unadjusted, adjusted)
    }

    /// Stage 6: error mean square inflated for the estimated block effects.
    pub fn effective_error(&self, error_ms: f64, weight: f64) -> f64 {
        let (r, k) = (self.r as f64, self.k as f64);
        error_ms * (1.0 + r * r * weight / ((r - 1.0) * (k + 1.0)))
    }

    /// Stages 1-7 in order.
    pub fn run(&self) -> LatticeAnalysis {
        let totals = self.totals();
        let adjustments = self.block_adjustments(&totals);
        let ss = self.sums_of_squares(&totals, &adjustments);
        let df = self.degrees_of_freedom();

        let block_ms = mean_square(ss.blocks, df.blocks);
        let error_ms = mean_square(ss.error, df.error);
        let effects = self.block_effects(&adjustments);
        let weight = weighting_factor(block_ms, error_ms, self.r);

        let (unadjusted_means, means) = self.adjusted_means(&totals, &effects, weight);
        let adjustments_per_treatment = means.iter().zip(&unadjusted_means).map(|(a, u)| a - u).collect();

        let effective_error_ms = self.effective_error(error_ms, weight);
        let r = self.r as f64;
        let se = (effective_error_ms / r).sqrt();
        let se_difference = (2.0 * effective_error_ms / r).sqrt();
        let efficiency = relative_efficiency(&ss, &df, effective_error_ms);

        let grand_mean = totals.grand / (r * self.treatments() as f64);
        let cv = coefficient_of_variation(error_ms, grand_mean);

        if ss.total == 0.0 {
            warn!("all observations are identical; variance components are zero");
        }
        debug!(block_ms, error_ms, weight, se, efficiency, cv, "lattice adjustment");

        let anova = AnovaTable::from_components(
            &[
                (SourceOfVariation::Replications, df.replications, ss.replications),
                (SourceOfVariation::Treatments, df.treatments, ss.treatments),
                (SourceOfVariation::BlocksWithinReplications, df.blocks, ss.blocks),
            ],
            (df.error, ss.error),
            (df.total, ss.total),
        );

        LatticeAnalysis {
            anova,
            sums_of_squares: ss,
            degrees_of_freedom: df,
            adjusted: AdjustedMeansResult {
                means,
                unadjusted_means,
                adjustments: adjustments_per_treatment,
                se,
                se_difference,
                weight,
            },
            block_effects: effects,
            block_ms,
            error_ms,
            effective_error_ms,
            efficiency,
            cv,
            grand_mean,
        }
    }
}

/// Shape and finiteness check shared by every entry point taking yields.
pub fn check_yield_shape(data: &DMatrix<f64>, replications: usize, k: usize) -> Result<()> {
    let expected_rows = replications * k;
    if data.nrows() != expected_rows || data.ncols() != k {
        return Err(LatticeError::DataShape {
            expected_rows,
            expected_cols: k,
            rows: data.nrows(),
            cols: data.ncols(),
        });
    }
    if let Some(idx) = data.iter().position(|y| !y.is_finite()) {
        return Err(LatticeError::invalid_parameter(format!(
            "observation at row {}, column {} is not finite",
            idx % expected_rows,
            idx / expected_rows
        )));
    }
    Ok(())
}

/// Stage 4: `w = (Eb - Ee) / (Eb * r)` clipped to [0, 1]; zero when `Eb <= 0`.
pub fn weighting_factor(block_ms: f64, error_ms: f64, replications: usize) -> f64 {
    if !(block_ms > 0.0) {
        return 0.0;
    }
    let raw = (block_ms - error_ms) / (block_ms * replications as f64);
    if raw < 0.0 {
        warn!(block_ms, error_ms, "block mean square below intra-block error, weight clipped to 0");
    }
    raw.clamp(0.0, 1.0)
}

/// Stage 7: RCBD error mean square over the effective lattice error, in percent.
pub fn relative_efficiency(ss: &SumsOfSquares, df: &DegreesOfFreedom, effective_error_ms: f64) -> f64 {
    if !(effective_error_ms > 0.0) {
        return 100.0;
    }
    let rcbd_error_ms = (ss.blocks + ss.error) / (df.blocks + df.error) as f64;
    rcbd_error_ms / effective_error_ms * 100.0
}

/// `sqrt(MS error) / grand mean * 100`, zero when either is zero.
pub fn coefficient_of_variation(error_ms: f64, grand_mean: f64) -> f64 {
    if !(error_ms > 0.0) || grand_mean == 0.0 {
        return 0.0;
    }
    error_ms.sqrt() / grand_mean.abs() * 100.0
}

fn squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// `sum((x - expected)^2)` over totals of equally many plots.
pub(crate) fn deviation_squares(totals: &[f64], expected: f64) -> f64 {
    totals.iter().map(|x| (x - expected) * (x - expected)).sum()
}

/// Magnitude a sum of squares is compared with before snapping to zero.
///
/// The corrected total, floored at rounding level of the raw squares so
/// constant yields that are inexact in binary still snap.
pub(crate) fn snap_scale(corrected_sum_of_squares: f64, sum_of_squares: f64) -> f64 {
    corrected_sum_of_squares.max(f64::EPSILON * sum_of_squares.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{generate_simple_lattice, generate_triple_lattice};

    fn sample_data_5x5() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            10,
            5,
            &[
                45.0, 42.0, 36.0, 39.0, 41.0, //
                38.0, 35.0, 40.0, 37.0, 43.0, //
                44.0, 39.0, 38.0, 42.0, 40.0, //
                41.0, 43.0, 37.0, 35.0, 36.0, //
                39.0, 41.0, 42.0, 38.0, 40.0, //
                44.0, 41.0, 37.0, 40.0, 42.0, //
                39.0, 36.0, 41.0, 38.0, 44.0, //
                43.0, 40.0, 39.0, 43.0, 41.0, //
                42.0, 44.0, 38.0, 36.0, 37.0, //
                40.0, 42.0, 43.0, 39.0, 41.0,
            ],
        )
    }

    /// Fixture with strong block differences so the weight is positive.
    fn blocky_data_3x3() -> DMatrix<f64> {
        let layout = generate_triple_lattice(3).unwrap();
        let treatment_effect = [0.0, 1.5, -1.0, 2.0, 0.5, -2.0, 1.0, -0.5, 3.0];
        let block_effect = [6.0, -2.0, -4.0, 3.0, -5.0, 2.0, -1.0, 4.0, -3.0];
        let noise = [0.3, -0.2, 0.1, -0.4, 0.2, 0.0, 0.1, -0.1, 0.3];
        let mut data = DMatrix::zeros(9, 3);
        for rep in 0..3 {
            for block in 0..3 {
                for plot in 0..3 {
                    let t = layout.treatment_at(rep, block, plot);
                    data[(rep * 3 + block, plot)] =
                        50.0 + treatment_effect[t] + block_effect[rep * 3 + block] + noise[(t + rep) % 9];
                }
            }
        }
        data
    }

    #[test]
    fn test_degrees_of_freedom_5x5_simple() {
        let df = DegreesOfFreedom::for_lattice(2, 5);
        assert_eq!(
            [df.replications, df.treatments, df.blocks, df.error, df.total],
            [1, 24, 8, 16, 49]
        );
        let df = DegreesOfFreedom::for_lattice(3, 4);
        assert_eq!([df.blocks, df.error, df.total], [9, 21, 47]);
    }

    #[test]
    fn test_sums_of_squares_fixture() {
        let layout = generate_simple_lattice(5).unwrap();
        let data = sample_data_5x5();
        let engine = VarianceEngine::new(&layout, &data).unwrap();
        let totals = engine.totals();
        assert_eq!(totals.grand, 2001.0);

        let adjustments = engine.block_adjustments(&totals);
        let ss = engine.sums_of_squares(&totals, &adjustments);
        assert!((ss.total - 340.98).abs() < 1e-6);
        assert!((ss.replications - 7.22).abs() < 1e-6);
        assert!((ss.treatments - 190.48).abs() < 1e-6);
        assert!((ss.blocks - 28.96).abs() < 1e-6);
        assert!((ss.error - 114.32).abs() < 1e-6);
        let sum = ss.replications + ss.treatments + ss.blocks + ss.error;
        assert!((sum - ss.total).abs() <= 1e-6 * ss.total);
    }

    #[test]
    fn test_block_effects_sum_to_zero() {
        let layout = generate_simple_lattice(5).unwrap();
        let data = sample_data_5x5();
        let engine = VarianceEngine::new(&layout, &data).unwrap();
        let totals = engine.totals();
        let effects = engine.block_effects(&engine.block_adjustments(&totals));
        assert_eq!(effects.all().len(), 10);
        for rep in 0..2 {
            assert!(effects.sum_within(rep).abs() < 1e-6);
        }
        assert!((effects.get(0, 2) - -1.76).abs() < 1e-9);
    }

    #[test]
    fn test_fixture_weight_is_zero_and_means_unadjusted() {
        let layout = generate_simple_lattice(5).unwrap();
        let data = sample_data_5x5();
        let analysis = VarianceEngine::new(&layout, &data).unwrap().run();
        // block MS 3.62 < error MS 7.145
        assert!((analysis.block_ms - 3.62).abs() < 1e-9);
        assert!((analysis.error_ms - 7.145).abs() < 1e-9);
        assert_eq!(analysis.adjusted.weight, 0.0);
        assert_eq!(analysis.adjusted.means, analysis.adjusted.unadjusted_means);
        assert!(analysis.adjusted.adjustments.iter().all(|&a| a == 0.0));
        assert!((analysis.adjusted.se - (7.145f64 / 2.0).sqrt()).abs() < 1e-9);
        assert!((analysis.efficiency - 83.5549).abs() < 1e-3);
        assert!((analysis.cv - 6.6792).abs() < 1e-3);
    }

    #[test]
    fn test_positive_weight_recovers_block_effects() {
        let layout = generate_triple_lattice(3).unwrap();
        let data = blocky_data_3x3();
        let engine = VarianceEngine::new(&layout, &data).unwrap();
        let analysis = engine.run();
        let adjusted = &analysis.adjusted;

        assert!(analysis.block_ms > analysis.error_ms);
        assert!(adjusted.weight > 0.0 && adjusted.weight <= 1.0);
        assert!(adjusted.weight <= 1.0 / 3.0);
        // adjustments redistribute, they do not shift the grand mean
        let total_adjustment: f64 = adjusted.adjustments.iter().sum();
        assert!(total_adjustment.abs() < 1e-9);
        assert!(adjusted.adjustments.iter().any(|a| a.abs() > 1e-6));
        assert!(analysis.effective_error_ms > analysis.error_ms);
        assert!(analysis.efficiency > 100.0);
        for rep in 0..3 {
            assert!(analysis.block_effects.sum_within(rep).abs() < 1e-9);
        }
    }

    #[test]
    fn test_positive_weight_fixture_values() {
        let layout = generate_triple_lattice(3).unwrap();
        let data = blocky_data_3x3();
        let engine = VarianceEngine::new(&layout, &data).unwrap();
        let totals = engine.totals();
        let adjustments = engine.block_adjustments(&totals);
        let analysis = engine.run();
        let (r, k) = (3.0, 3.0);

        assert!((analysis.block_ms - 39.728703703703).abs() < 1e-6);
        assert!((analysis.error_ms - 0.073444444444).abs() < 1e-6);
        assert!((analysis.weight() - 0.332717116865).abs() < 1e-6);

        // classical lattice adjustment: T_t / r + mu * sum(C_b over blocks holding t) / r
        let mu = (analysis.block_ms - analysis.error_ms) / (k * (r - 1.0) * analysis.block_ms);
        assert!((mu - 0.166358558433).abs() < 1e-6);
        for t in 0..9 {
            let c_sum: f64 = layout
                .blocks()
                .zip(&adjustments)
                .filter(|(block, _)| block.contains(t))
                .map(|(_, c)| c)
                .sum();
            let classical = totals.treatments[t] / r + mu * c_sum / r;
            assert!((analysis.adjusted.means[t] - classical).abs() < 1e-9, "treatment {t}");
        }
        assert!((totals.treatments[0] - 158.2).abs() < 1e-9);
        assert!((analysis.adjusted.means[0] - 50.099322824817).abs() < 1e-6);
        assert!((analysis.adjusted.means[8] - 53.214663963145).abs() < 1e-6);

        let effective = analysis.error_ms * (1.0 + r * k * mu / (k + 1.0));
        assert!((analysis.effective_error_ms - effective).abs() < 1e-12);
        assert!((analysis.effective_error_ms - 0.100935196225).abs() < 1e-6);
        assert!((analysis.adjusted.se - 0.183425912587).abs() < 1e-6);
        assert!((analysis.adjusted.se_difference - (2.0 * effective / r).sqrt()).abs() < 1e-12);
        assert!((analysis.efficiency - 14805.704279100386).abs() < 1e-6);
    }

    #[test]
    fn test_large_offset_keeps_variation() {
        let layout = generate_simple_lattice(3).unwrap();
        let data = DMatrix::from_row_slice(
            6,
            3,
            &[
                12.0, 15.0, 9.0, //
                14.0, 10.0, 16.0, //
                11.0, 13.0, 8.0, //
                13.0, 11.0, 12.0, //
                16.0, 9.0, 14.0, //
                10.0, 15.0, 9.0,
            ],
        );
        let base = VarianceEngine::new(&layout, &data).unwrap().run();
        let shifted_data = data.add_scalar(1e6);
        let shifted = VarianceEngine::new(&layout, &shifted_data).unwrap().run();

        let (a, b) = (base.sums_of_squares, shifted.sums_of_squares);
        for (x, y) in [
            (a.replications, b.replications),
            (a.treatments, b.treatments),
            (a.blocks, b.blocks),
            (a.error, b.error),
            (a.total, b.total),
        ] {
            assert!((x - y).abs() < 1e-6, "{x} vs {y}");
        }
        assert!((b.treatments - 104.444444444444).abs() < 1e-6);
        assert!((b.error - 0.888888888889).abs() < 1e-6);
        assert!(shifted.adjusted.se > 0.0);
        assert!((shifted.adjusted.se - base.adjusted.se).abs() < 1e-6);
        for (x, y) in base.adjusted.means.iter().zip(&shifted.adjusted.means) {
            assert!((y - x - 1e6).abs() < 1e-6);
        }
    }

    #[test]
    fn test_engine_rejects_unsupported_replications() {
        let layout = Layout::new(vec![vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]], 3).unwrap();
        let data = DMatrix::from_element(3, 3, 1.0);
        let err = VarianceEngine::new(&layout, &data).unwrap_err();
        assert_eq!(err, LatticeError::InvalidReplications(1));
        assert!(err.is_configuration());

        let rows = generate_simple_lattice(2).unwrap().to_nested();
        let four = Layout::new(vec![rows[0].clone(), rows[1].clone(), rows[0].clone(), rows[1].clone()], 2).unwrap();
        let data = DMatrix::from_element(8, 2, 1.0);
        assert_eq!(
            VarianceEngine::new(&four, &data).unwrap_err(),
            LatticeError::InvalidReplications(4)
        );
    }

    #[test]
    fn test_degenerate_inexact_constant_data() {
        let layout = generate_simple_lattice(3).unwrap();
        let data = DMatrix::from_element(6, 3, 0.1);
        let analysis = VarianceEngine::new(&layout, &data).unwrap().run();
        let ss = analysis.sums_of_squares;
        assert_eq!([ss.replications, ss.treatments, ss.blocks, ss.error, ss.total], [0.0; 5]);
        assert_eq!(analysis.adjusted.weight, 0.0);
        assert_eq!(analysis.adjusted.se, 0.0);
        assert_eq!(analysis.efficiency, 100.0);
    }

    #[test]
    fn test_degenerate_constant_data() {
        let layout = generate_simple_lattice(4).unwrap();
        let data = DMatrix::from_element(8, 4, 42.5);
        let analysis = VarianceEngine::new(&layout, &data).unwrap().run();
        let ss = analysis.sums_of_squares;
        assert_eq!([ss.treatments, ss.blocks, ss.error, ss.total], [0.0; 4]);
        assert_eq!(analysis.adjusted.weight, 0.0);
        assert_eq!(analysis.adjusted.se, 0.0);
        assert_eq!(analysis.cv, 0.0);
        assert_eq!(analysis.efficiency, 100.0);
        assert!(analysis.adjusted.means.iter().all(|&m| m == 42.5));
    }

    #[test]
    fn test_weighting_factor_clipping() {
        assert_eq!(weighting_factor(3.0, 7.0, 2), 0.0);
        assert_eq!(weighting_factor(0.0, 0.0, 2), 0.0);
        assert!((weighting_factor(10.0, 2.0, 2) - 0.4).abs() < 1e-12);
        assert!((weighting_factor(10.0, 0.0, 3) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let layout = generate_simple_lattice(5).unwrap();
        let data = DMatrix::from_element(9, 5, 1.0);
        let err = VarianceEngine::new(&layout, &data).unwrap_err();
        assert!(matches!(err, LatticeError::DataShape { rows: 9, .. }));

        let mut data = DMatrix::from_element(10, 5, 1.0);
        data[(3, 2)] = f64::NAN;
        assert!(VarianceEngine::new(&layout, &data).is_err());
    }
}
