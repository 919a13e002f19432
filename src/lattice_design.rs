use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::anova::AnovaTable;
use crate::comparison::{compare, ComparisonResult, Procedure};
use crate::error::{LatticeError, Result};
use crate::lattice_result::LatticeAnalysis;
use crate::layout::{block_size_for, generate_layout, LatticeType, Layout};
use crate::simulate::YieldGenerator;
use crate::validate::ensure_concurrence_at_most;
use crate::variance::{check_yield_shape, BlockEffects, VarianceEngine};

/// Options for post-hoc comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub alpha: f64,
    pub procedure: Procedure,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            procedure: Procedure::Tukey,
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(LatticeError::invalid_parameter(format!(
                "alpha {} must lie in (0, 1)",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// A square lattice experiment: k² treatments in blocks of k, with 2 or 3
/// replications, plus its yields once they are known.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeDesign {
    treatments: usize,
    lattice: LatticeType,
    layout: Layout,
    data: Option<DMatrix<f64>>,
}

impl LatticeDesign {
    /// Builds a design on the standard layout.
    ///
    /// # Errors
    ///
    /// Configuration errors, raised before any arithmetic: `treatments` not a
    /// perfect square, `replications` not 2 or 3, a block size the layout
    /// construction does not support, or `data` not shaped
    /// `(replications * k) x k`.
    pub fn new(treatments: usize, replications: usize, data: Option<DMatrix<f64>>) -> Result<Self> {
        let k = block_size_for(treatments)?;
        let lattice = LatticeType::from_replications(replications)?;
        let layout = generate_layout(k, lattice)?;
        if let Some(data) = &data {
            check_yield_shape(data, replications, k)?;
        }
        debug!(treatments, replications, k, "lattice design created");
        Ok(Self {
            treatments,
            lattice,
            layout,
            data,
        })
    }

    /// Builds a design on a caller-supplied layout, e.g. a randomized one.
    ///
    /// The layout must have 2 or 3 replications and no treatment pair may
    /// share more than one block.
    pub fn with_layout(layout: Layout, data: Option<DMatrix<f64>>) -> Result<Self> {
        let lattice = LatticeType::from_replications(layout.n_replications())?;
        ensure_concurrence_at_most(&layout, 1)?;
        if let Some(data) = &data {
            check_yield_shape(data, layout.n_replications(), layout.block_size())?;
        }
        Ok(Self {
            treatments: layout.treatments(),
            lattice,
            layout,
            data,
        })
    }

    /// Standard layout with yields from an injected generator.
    pub fn simulate<G: YieldGenerator + ?Sized>(
        treatments: usize,
        replications: usize,
        generator: &mut G,
    ) -> Result<Self> {
        let design = Self::new(treatments, replications, None)?;
        let data = generator.generate(&design.layout);
        design.with_data(data)
    }

    /// Attaches (or replaces) the yield matrix.
    pub fn with_data(mut self, data: DMatrix<f64>) -> Result<Self> {
        check_yield_shape(&data, self.replications(), self.block_size())?;
        self.data = Some(data);
        Ok(self)
    }

    pub fn treatments(&self) -> usize {
        self.treatments
    }

    pub fn replications(&self) -> usize {
        self.lattice.replications()
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size()
    }

    pub fn blocks_per_rep(&self) -> usize {
        self.layout.block_size()
    }

    pub fn lattice_type(&self) -> LatticeType {
        self.lattice
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn data(&self) -> Option<&DMatrix<f64>> {
        self.data.as_ref()
    }

    fn yields(&self) -> Result<&DMatrix<f64>> {
        self.data
            .as_ref()
            .ok_or_else(|| LatticeError::invalid_parameter("design has no yield data to analyse"))
    }

    /// Runs the full lattice analysis.
    pub fn analyze(&self) -> Result<LatticeAnalysis> {
        let data = self.yields()?;
        let analysis = VarianceEngine::new(&self.layout, data)?.run();
        info!(
            treatments = self.treatments,
            replications = self.replications(),
            weight = analysis.weight(),
            efficiency = analysis.efficiency,
            cv = analysis.cv,
            "lattice analysed"
        );
        Ok(analysis)
    }

    pub fn anova(&self) -> Result<AnovaTable> {
        Ok(self.analyze()?.anova)
    }

    /// Unadjusted treatment means, indexed by treatment id.
    pub fn treatment_means(&self) -> Result<Vec<f64>> {
        Ok(self.analyze()?.adjusted.unadjusted_means)
    }

    pub fn adjusted_means(&self) -> Result<Vec<f64>> {
        Ok(self.analyze()?.adjusted.means)
    }

    pub fn block_effects(&self) -> Result<BlockEffects> {
        Ok(self.analyze()?.block_effects)
    }

    pub fn cv(&self) -> Result<f64> {
        Ok(self.analyze()?.cv)
    }

    pub fn efficiency(&self) -> Result<f64> {
        Ok(self.analyze()?.efficiency)
    }

    /// Ranked comparisons of the adjusted means.
    pub fn compare(&self, options: &AnalysisOptions) -> Result<ComparisonResult> {
        options.validate()?;
        let analysis = self.analyze()?;
        compare(
            analysis.means(),
            analysis.se(),
            analysis.error_df(),
            options.alpha,
            options.procedure,
        )
    }

    pub fn tukey_test(&self, alpha: f64) -> Result<ComparisonResult> {
        self.compare(&AnalysisOptions {
            alpha,
            procedure: Procedure::Tukey,
        })
    }

    pub fn dmrt(&self, alpha: f64) -> Result<ComparisonResult> {
        self.compare(&AnalysisOptions {
            alpha,
            procedure: Procedure::Duncan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::ConstantYield;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            LatticeDesign::new(24, 2, None).unwrap_err(),
            LatticeError::NotPerfectSquare(24)
        );
        assert_eq!(
            LatticeDesign::new(25, 4, None).unwrap_err(),
            LatticeError::InvalidReplications(4)
        );
        assert!(matches!(
            LatticeDesign::new(25, 3, None).unwrap_err(),
            LatticeError::BlockSizeOutOfRange { k: 5, .. }
        ));
        let err = LatticeDesign::new(25, 2, Some(DMatrix::zeros(9, 5))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_analyze_without_data_fails() {
        let design = LatticeDesign::new(16, 3, None).unwrap();
        assert_eq!(design.blocks_per_rep(), 4);
        assert!(design.analyze().is_err());
        assert!(design.anova().is_err());
    }

    #[test]
    fn test_simulated_constant_design() {
        let design = LatticeDesign::simulate(9, 2, &mut ConstantYield(3.0)).unwrap();
        let analysis = design.analyze().unwrap();
        assert_eq!(analysis.cv, 0.0);
        assert_eq!(analysis.means(), &[3.0; 9]);
        let tukey = design.tukey_test(0.05).unwrap();
        assert!(tukey.groups.iter().all(|g| g == "a"));
    }

    #[test]
    fn test_randomized_layout_matches_standard_analysis() {
        let design = LatticeDesign::new(16, 2, None).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let randomized = design.layout().randomized(&mut rng);

        // same plot yields, re-ordered to follow the randomized layout
        let value = |t: usize, rep: usize| 30.0 + (t * 7 % 11) as f64 + rep as f64 * 0.5 + (t % 3) as f64;
        let fill = |layout: &Layout| {
            let mut data = DMatrix::zeros(8, 4);
            for rep in 0..2 {
                for block in 0..4 {
                    for plot in 0..4 {
                        let t = layout.treatment_at(rep, block, plot);
                        data[(rep * 4 + block, plot)] = value(t, rep);
                    }
                }
            }
            data
        };

        let standard = design.clone().with_data(fill(design.layout())).unwrap().analyze().unwrap();
        let shuffled = LatticeDesign::with_layout(randomized.clone(), Some(fill(&randomized)))
            .unwrap()
            .analyze()
            .unwrap();
        for (a, b) in standard.means().iter().zip(shuffled.means()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert!((standard.sums_of_squares.error - shuffled.sums_of_squares.error).abs() < 1e-9);
    }

    #[test]
    fn test_with_layout_rejects_repeated_grouping() {
        let rows = vec![vec![0, 1], vec![2, 3]];
        let layout = Layout::new(vec![rows.clone(), rows], 2).unwrap();
        let err = LatticeDesign::with_layout(layout, None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_options_validate_alpha() {
        assert!(AnalysisOptions::default().validate().is_ok());
        let options = AnalysisOptions {
            alpha: 0.0,
            ..AnalysisOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
