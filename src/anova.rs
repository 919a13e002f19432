//! Analysis-of-variance tables.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Row label of an ANOVA table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOfVariation {
    Replications,
    /// Complete blocks of an RCBD.
    Blocks,
    /// Incomplete blocks within replications, adjusted for treatments.
    BlocksWithinReplications,
    /// Treatments ignoring blocks.
    Treatments,
    Error,
    Total,
}

impl SourceOfVariation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replications => "Replications",
            Self::Blocks => "Blocks",
            Self::BlocksWithinReplications => "Blocks within reps (adj.)",
            Self::Treatments => "Treatments (unadj.)",
            Self::Error => "Intra-block error",
            Self::Total => "Total",
        }
    }
}

impl std::fmt::Display for SourceOfVariation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of an ANOVA table.
#[derive(Debug, Clone, PartialEq)]
pub struct AnovaRow {
    pub source: SourceOfVariation,
    pub df: usize,
    pub ss: f64,
    /// SS / df, zero when df is zero.
    pub ms: f64,
    /// MS / MS(error); `None` for the error and total rows or when MS(error) is zero.
    pub f_value: Option<f64>,
    pub p_value: Option<f64>,
}

/// Ordered ANOVA rows, ending with the error and total rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AnovaTable {
    pub rows: Vec<AnovaRow>,
}

impl AnovaTable {
    /// Builds the table from `(source, df, ss)` effect rows plus the error and total terms.
    pub fn from_components(
        effects: &[(SourceOfVariation, usize, f64)],
        error: (usize, f64),
        total: (usize, f64),
    ) -> Self {
        let (error_df, error_ss) = error;
        let error_ms = mean_square(error_ss, error_df);

        let mut rows: Vec<AnovaRow> = effects
            .iter()
            .map(|&(source, df, ss)| {
                let ms = mean_square(ss, df);
                let (f_value, p_value) = f_test(ms, df, error_ms, error_df);
                AnovaRow {
                    source,
                    df,
                    ss,
                    ms,
                    f_value,
                    p_value,
                }
            })
            .collect();

        rows.push(AnovaRow {
            source: SourceOfVariation::Error,
            df: error_df,
            ss: error_ss,
            ms: error_ms,
            f_value: None,
            p_value: None,
        });
        rows.push(AnovaRow {
            source: SourceOfVariation::Total,
            df: total.0,
            ss: total.1,
            ms: mean_square(total.1, total.0),
            f_value: None,
            p_value: None,
        });
        Self { rows }
    }

    pub fn row(&self, source: SourceOfVariation) -> Option<&AnovaRow> {
        self.rows.iter().find(|row| row.source == source)
    }

    pub fn error(&self) -> Option<&AnovaRow> {
        self.row(SourceOfVariation::Error)
    }

    pub fn total(&self) -> Option<&AnovaRow> {
        self.row(SourceOfVariation::Total)
    }

    pub fn degrees_of_freedom(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.df).collect()
    }

    pub fn sums_of_squares(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.ss).collect()
    }

    /// Component sums of squares (every row but the total) minus the total.
    pub fn ss_discrepancy(&self) -> f64 {
        let components: f64 = self
            .rows
            .iter()
            .filter(|row| row.source != SourceOfVariation::Total)
            .map(|row| row.ss)
            .sum();
        components - self.total().map_or(0.0, |row| row.ss)
    }
}

impl std::fmt::Display for AnovaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<28}{:>5}{:>14}{:>12}{:>10}{:>10}",
            "Source", "df", "SS", "MS", "F", "p"
        )?;
        for row in &self.rows {
            let f_value = row.f_value.map_or(String::from("-"), |v| format!("{v:.3}"));
            let p_value = row.p_value.map_or(String::from("-"), |v| format!("{v:.4}"));
            writeln!(
                f,
                "{:<28}{:>5}{:>14.4}{:>12.4}{:>10}{:>10}",
                row.source.label(),
                row.df,
                row.ss,
                row.ms,
                f_value,
                p_value
            )?;
        }
        Ok(())
    }
}

pub(crate) fn mean_square(ss: f64, df: usize) -> f64 {
    if df == 0 {
        0.0
    } else {
        ss / df as f64
    }
}

/// F ratio and its upper-tail p-value.
pub fn f_test(ms: f64, df: usize, error_ms: f64, error_df: usize) -> (Option<f64>, Option<f64>) {
    if df == 0 || error_df == 0 || error_ms <= 0.0 {
        return (None, None);
    }
    let f = ms / error_ms;
    let p = FisherSnedecor::new(df as f64, error_df as f64)
        .ok()
        .map(|dist| if f <= 0.0 { 1.0 } else { dist.sf(f) });
    (Some(f), p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f_test_critical_value() {
        // F(3, 10) = 3.708 is the 5% critical value
        let (f, p) = f_test(3.708, 3, 1.0, 10);
        assert!((f.unwrap() - 3.708).abs() < 1e-12);
        assert!((p.unwrap() - 0.05).abs() < 1e-3);
    }

    #[test]
    fn test_f_test_zero_error_is_none() {
        assert_eq!(f_test(2.0, 3, 0.0, 10), (None, None));
        assert_eq!(f_test(2.0, 0, 1.0, 10), (None, None));
    }

    #[test]
    fn test_table_layout() {
        let table = AnovaTable::from_components(
            &[(SourceOfVariation::Blocks, 2, 5.0), (SourceOfVariation::Treatments, 3, 82.0)],
            (6, 12.0),
            (11, 99.0),
        );
        assert_eq!(table.degrees_of_freedom(), vec![2, 3, 6, 11]);
        assert_eq!(table.error().unwrap().ms, 2.0);
        assert!((table.row(SourceOfVariation::Treatments).unwrap().f_value.unwrap() - 82.0 / 3.0 / 2.0).abs() < 1e-12);
        assert!(table.ss_discrepancy().abs() < 1e-12);
        assert!(table.to_string().contains("Total"));
    }
}
