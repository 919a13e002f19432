//! Simple and triple lattice designs for field trials: layout generation and
//! validation, intra-block analysis with recovery of inter-block
//! information, and multiple comparisons of the adjusted means.

pub mod anova;
pub mod comparison;
pub mod concurrence_matrix;
pub mod error;
pub mod lattice_design;
pub mod lattice_result;
pub mod layout;
pub mod rcbd;
pub mod simulate;
pub mod studentized_range;
pub mod validate;
pub mod variance;

pub use comparison::{ComparisonResult, Procedure};
pub use error::{LatticeError, Result};
pub use lattice_design::{AnalysisOptions, LatticeDesign};
pub use lattice_result::{AdjustedMeansResult, LatticeAnalysis};
pub use layout::{LatticeType, Layout};

use nalgebra::DMatrix;

/// Analyses a lattice on its standard layout and compares the adjusted means.
///
/// # Arguments
///
/// * `treatments` - Number of treatments, a perfect square k²
/// * `replications` - 2 for a simple lattice, 3 for a triple lattice
/// * `data` - Yields, one row per block (replication-major), one column per plot
/// * `options` - Significance level and comparison procedure
///
/// # Returns
///
/// The lattice analysis and the comparison of its adjusted means.
///
/// # Errors
///
/// Returns a configuration error when the design or data shape is invalid.
pub fn analyze_lattice(
    treatments: usize,
    replications: usize,
    data: DMatrix<f64>,
    options: &AnalysisOptions,
) -> Result<(LatticeAnalysis, ComparisonResult)> {
    let design = LatticeDesign::new(treatments, replications, Some(data))?;
    let analysis = design.analyze()?;
    let comparison = comparison::compare(
        analysis.means(),
        analysis.se(),
        analysis.error_df(),
        options.alpha,
        options.procedure,
    )?;
    Ok((analysis, comparison))
}
