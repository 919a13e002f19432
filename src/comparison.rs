//! Multiple comparisons of treatment means: Tukey's HSD and Duncan's
//! multiple range test.
//!
//! Group letters follow the usual multiple-range convention. Means are
//! ranked in descending order, and every maximal run of ranked means whose
//! range is not significant gets one letter. Two means share a letter
//! exactly when their comparison is not significant. Sharing is not
//! transitive: `a` may share a letter with `b`, and `b` with `c`, while `a`
//! and `c` differ significantly (groups "a", "ab", "b").

use tracing::debug;

use crate::error::{LatticeError, Result};
use crate::studentized_range::qtukey;

/// Critical-value procedure for ranked comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Procedure {
    /// One studentized-range critical value for every pair.
    #[default]
    Tukey,
    /// Critical values growing with the number of ranks spanned.
    Duncan,
}

/// Critical values produced by a procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum CriticalValues {
    /// Tukey's honestly significant difference.
    Hsd(f64),
    /// Duncan's shortest significant ranges for spans 2..=n, non-decreasing.
    Ladder(Vec<f64>),
}

impl CriticalValues {
    /// Critical value for two means `span - 1` ranks apart.
    pub fn for_span(&self, span: usize) -> f64 {
        match self {
            Self::Hsd(hsd) => *hsd,
            Self::Ladder(ladder) => ladder[span.saturating_sub(2).min(ladder.len() - 1)],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseComparison {
    pub first: usize,
    pub second: usize,
    /// `mean[first] - mean[second]`.
    pub difference: f64,
    /// Critical value for the number of ranks this pair spans.
    pub critical_value: f64,
    /// False whenever the pair lies inside a wider range that is not
    /// significant, even if `difference` exceeds `critical_value`. This is
    /// Duncan's protection rule; under Tukey it reduces to
    /// `difference.abs() > critical_value`.
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub procedure: Procedure,
    pub alpha: f64,
    pub means: Vec<f64>,
    /// Treatment ids ordered by descending mean.
    pub ranking: Vec<usize>,
    /// Group letters, indexed by treatment id.
    pub groups: Vec<String>,
    /// Group indices behind the letters, indexed by treatment id.
    pub group_ids: Vec<Vec<usize>>,
    /// All n(n-1)/2 pairs, `first < second`.
    pub comparisons: Vec<PairwiseComparison>,
    pub critical_values: CriticalValues,
}

impl ComparisonResult {
    pub fn hsd(&self) -> Option<f64> {
        match self.critical_values {
            CriticalValues::Hsd(hsd) => Some(hsd),
            CriticalValues::Ladder(_) => None,
        }
    }

    pub fn ladder(&self) -> Option<&[f64]> {
        match &self.critical_values {
            CriticalValues::Hsd(_) => None,
            CriticalValues::Ladder(ladder) => Some(ladder),
        }
    }

    pub fn comparison(&self, a: usize, b: usize) -> Option<&PairwiseComparison> {
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        self.comparisons
            .iter()
            .find(|c| c.first == first && c.second == second)
    }

    pub fn share_group(&self, a: usize, b: usize) -> bool {
        self.group_ids[a].iter().any(|g| self.group_ids[b].contains(g))
    }
}

/// Tukey HSD = q(1 - alpha; n, error_df) x SE of a mean.
pub fn tukey_hsd(means: &[f64], se: f64, error_df: usize, alpha: f64) -> Result<ComparisonResult> {
    compare(means, se, error_df, alpha, Procedure::Tukey)
}

/// Duncan's test: R_p = q((1 - alpha)^(p - 1); p, error_df) x SE for spans p = 2..=n.
pub fn duncan_mrt(means: &[f64], se: f64, error_df: usize, alpha: f64) -> Result<ComparisonResult> {
    compare(means, se, error_df, alpha, Procedure::Duncan)
}

pub fn compare(
    means: &[f64],
    se: f64,
    error_df: usize,
    alpha: f64,
    procedure: Procedure,
) -> Result<ComparisonResult> {
    check_inputs(means, se, error_df, alpha)?;
    let n = means.len();
    let df = error_df as f64;

    let critical_values = match procedure {
        Procedure::Tukey => CriticalValues::Hsd(qtukey(1.0 - alpha, n, df)? * se),
        Procedure::Duncan => {
            let mut ladder = Vec::with_capacity(n - 1);
            let mut previous = 0.0f64;
            for span in 2..=n {
                let level = (1.0 - alpha).powi(span as i32 - 1);
                let value = (qtukey(level, span, df)? * se).max(previous);
                ladder.push(value);
                previous = value;
            }
            CriticalValues::Ladder(ladder)
        }
    };
    debug!(?procedure, n, se, error_df, alpha, "computed critical values");

    let mut ranking: Vec<usize> = (0..n).collect();
    ranking.sort_by(|&a, &b| means[b].total_cmp(&means[a]).then(a.cmp(&b)));
    let mut rank_of = vec![0usize; n];
    for (rank, &treatment) in ranking.iter().enumerate() {
        rank_of[treatment] = rank;
    }

    // reach[a]: last rank b such that the range of ranks a..=b is not significant
    let reach: Vec<usize> = (0..n)
        .map(|a| {
            (a..n)
                .rev()
                .find(|&b| means[ranking[a]] - means[ranking[b]] <= critical_values.for_span(b - a + 1))
                .unwrap_or(a)
        })
        .collect();
    // cover[a]: furthest rank inside a non-significant range that starts at or before a
    let cover: Vec<usize> = reach
        .iter()
        .scan(0usize, |best, &r| {
            *best = (*best).max(r);
            Some(*best)
        })
        .collect();

    let mut groups = vec![String::new(); n];
    let mut group_ids = vec![Vec::new(); n];
    let mut letter = 0usize;
    for a in 0..n {
        if a > 0 && reach[a] <= cover[a - 1] {
            continue;
        }
        let label = letter_label(letter);
        for &treatment in &ranking[a..=reach[a]] {
            groups[treatment].push_str(&label);
            group_ids[treatment].push(letter);
        }
        letter += 1;
    }

    let mut comparisons = Vec::with_capacity(n * (n - 1) / 2);
    for first in 0..n {
        for second in (first + 1)..n {
            let (hi, lo) = if rank_of[first] < rank_of[second] {
                (rank_of[first], rank_of[second])
            } else {
                (rank_of[second], rank_of[first])
            };
            comparisons.push(PairwiseComparison {
                first,
                second,
                difference: means[first] - means[second],
                critical_value: critical_values.for_span(lo - hi + 1),
                significant: lo > cover[hi],
            });
        }
    }

    Ok(ComparisonResult {
        procedure,
        alpha,
        means: means.to_vec(),
        ranking,
        groups,
        group_ids,
        comparisons,
        critical_values,
    })
}

fn check_inputs(means: &[f64], se: f64, error_df: usize, alpha: f64) -> Result<()> {
    if means.len() < 2 {
        return Err(LatticeError::invalid_parameter(format!(
            "need at least 2 means to compare, got {}",
            means.len()
        )));
    }
    if let Some(bad) = means.iter().position(|m| !m.is_finite()) {
        return Err(LatticeError::invalid_parameter(format!("mean {bad} is not finite")));
    }
    if !(se >= 0.0 && se.is_finite()) {
        return Err(LatticeError::invalid_parameter(format!("standard error {se} must be finite and >= 0")));
    }
    if error_df == 0 {
        return Err(LatticeError::invalid_parameter("error degrees of freedom must be positive"));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(LatticeError::invalid_parameter(format!("alpha {alpha} must lie in (0, 1)")));
    }
    Ok(())
}

/// a, b, ..., z, A, ..., Z, then aa, ab, ...
fn letter_label(index: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let base = LETTERS.len();
    if index < base {
        return (LETTERS[index] as char).to_string();
    }
    let mut label = letter_label(index / base - 1);
    label.push(LETTERS[index % base] as char);
    label
}
