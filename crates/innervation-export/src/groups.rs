//! Comparing experimental groups.
//!
//! Each results file stands for one animal and is reduced to the mean of
//! its rows. A group collects those per-file means, and groups are
//! compared with a one-way ANOVA.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::{BatchSummary, ExportError};

/// Significance level used by [`OneWayAnova::report`].
pub const DEFAULT_ALPHA: f64 = 0.05;

/// One named group of per-file means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group label, e.g. `Control`.
    pub name: String,
    /// One mean per results file, in input order.
    pub means: Vec<f64>,
    /// n, mean of means, SD and SEM across files.
    pub summary: BatchSummary,
}

impl GroupSummary {
    /// Summarize the per-file means of one group.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NoValues`] if `means` is empty.
    pub fn new(name: impl Into<String>, means: Vec<f64>) -> Result<Self, ExportError> {
        let summary = BatchSummary::from_values(&means)?;
        Ok(Self {
            name: name.into(),
            means,
            summary,
        })
    }

    /// One-line human-readable form.
    #[must_use]
    pub fn report(&self) -> String {
        format!("{}\t{}", self.name, self.summary.report())
    }
}

/// Result of a one-way analysis of variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneWayAnova {
    /// Between-group mean square over within-group mean square.
    /// Infinite when every group is constant but the means differ.
    pub f_statistic: f64,
    /// Upper tail of the F distribution at `f_statistic`.
    pub p_value: f64,
    /// Number of groups minus one.
    pub df_between: usize,
    /// Total observations minus number of groups.
    pub df_within: usize,
}

impl OneWayAnova {
    /// Run the test over raw samples, one slice per group.
    ///
    /// # Errors
    ///
    /// - [`ExportError::TooFewGroups`] with fewer than two groups.
    /// - [`ExportError::EmptyGroup`] if any group has no values.
    /// - [`ExportError::DegenerateAnova`] when there are no within-group
    ///   degrees of freedom, or no variance at all.
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn from_samples(samples: &[&[f64]]) -> Result<Self, ExportError> {
        if samples.len() < 2 {
            return Err(ExportError::TooFewGroups {
                found: samples.len(),
            });
        }
        if let Some(index) = samples.iter().position(|s| s.is_empty()) {
            return Err(ExportError::EmptyGroup { index });
        }

        let total: usize = samples.iter().map(|s| s.len()).sum();
        let df_between = samples.len() - 1;
        let df_within = total - samples.len();
        if df_within == 0 {
            return Err(ExportError::DegenerateAnova(
                "every group has a single value".to_owned(),
            ));
        }

        let grand_mean = samples.iter().flat_map(|s| s.iter()).sum::<f64>() / total as f64;
        let (ss_between, ss_within) = samples.iter().fold((0.0, 0.0), |(between, within), s| {
            let mean = s.iter().sum::<f64>() / s.len() as f64;
            let spread: f64 = s.iter().map(|v| (v - mean).powi(2)).sum();
            (
                (mean - grand_mean).powi(2).mul_add(s.len() as f64, between),
                within + spread,
            )
        });

        if ss_within == 0.0 {
            if ss_between == 0.0 {
                return Err(ExportError::DegenerateAnova(
                    "all values are identical".to_owned(),
                ));
            }
            return Ok(Self {
                f_statistic: f64::INFINITY,
                p_value: 0.0,
                df_between,
                df_within,
            });
        }

        let f_statistic =
            (ss_between / df_between as f64) / (ss_within / df_within as f64);
        let dist = FisherSnedecor::new(df_between as f64, df_within as f64)
            .map_err(|e| ExportError::DegenerateAnova(e.to_string()))?;
        Ok(Self {
            f_statistic,
            p_value: dist.sf(f_statistic),
            df_between,
            df_within,
        })
    }

    /// Run the test over the per-file means of each group.
    ///
    /// # Errors
    ///
    /// As [`Self::from_samples`].
    pub fn across(groups: &[GroupSummary]) -> Result<Self, ExportError> {
        let samples: Vec<&[f64]> = groups.iter().map(|g| g.means.as_slice()).collect();
        Self::from_samples(&samples)
    }

    /// Whether `p_value` falls below `alpha`.
    #[must_use]
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }

    /// One-line human-readable form.
    #[must_use]
    pub fn report(&self) -> String {
        let verdict = if self.is_significant(DEFAULT_ALPHA) {
            format!("significant (p<{DEFAULT_ALPHA})")
        } else {
            "not significant".to_owned()
        };
        format!(
            "one-way ANOVA: F({}, {})={:.4} p={:.5} {verdict}",
            self.df_between, self.df_within, self.f_statistic, self.p_value,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn two_groups_known_values() {
        let anova = OneWayAnova::from_samples(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]).unwrap();
        assert_eq!((anova.df_between, anova.df_within), (1, 4));
        assert!((anova.f_statistic - 13.5).abs() < 1e-12);
        // F(1, 4) = t(4)^2, so p is the two-sided t tail at sqrt(13.5).
        assert!((anova.p_value - 0.021_311_641_128_756_7).abs() < 1e-8, "p {}", anova.p_value);
        assert!(anova.is_significant(0.05));
    }

    #[test]
    fn three_groups_known_values() {
        let anova = OneWayAnova::from_samples(&[
            &[1.0, 2.0, 3.0],
            &[2.0, 3.0, 4.0],
            &[3.0, 4.0, 5.0],
        ])
        .unwrap();
        assert_eq!((anova.df_between, anova.df_within), (2, 6));
        assert!((anova.f_statistic - 3.0).abs() < 1e-12);
        // For d1 = 2 the tail is (1 + 2F/d2)^(-d2/2) = 2^-3.
        assert!((anova.p_value - 0.125).abs() < 1e-9, "p {}", anova.p_value);
        assert!(!anova.is_significant(0.05));
        assert!(anova.report().contains("not significant"));
    }

    #[test]
    fn equal_group_means_give_zero_f() {
        let anova = OneWayAnova::from_samples(&[&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]]).unwrap();
        assert!(anova.f_statistic.abs() < 1e-12);
        assert!((anova.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_groups_with_different_means_are_infinitely_separated() {
        let anova = OneWayAnova::from_samples(&[&[1.0, 1.0], &[2.0, 2.0]]).unwrap();
        assert!(anova.f_statistic.is_infinite());
        assert!(anova.p_value.abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(matches!(
            OneWayAnova::from_samples(&[&[1.0, 2.0]]),
            Err(ExportError::TooFewGroups { found: 1 })
        ));
        assert!(matches!(
            OneWayAnova::from_samples(&[&[1.0, 2.0], &[]]),
            Err(ExportError::EmptyGroup { index: 1 })
        ));
        assert!(matches!(
            OneWayAnova::from_samples(&[&[1.0], &[2.0]]),
            Err(ExportError::DegenerateAnova(_))
        ));
        assert!(matches!(
            OneWayAnova::from_samples(&[&[4.0, 4.0], &[4.0]]),
            Err(ExportError::DegenerateAnova(_))
        ));
    }

    #[test]
    fn group_summary_averages_file_means() {
        let control = GroupSummary::new("Control", vec![10.0, 20.0, 30.0]).unwrap();
        assert_eq!(control.summary.count, 3);
        assert!((control.summary.mean - 20.0).abs() < 1e-12);
        assert!((control.summary.sem.unwrap() - 10.0 / 3.0f64.sqrt()).abs() < 1e-12);
        assert!(control.report().starts_with("Control\tn=3 mean=20.000000"));
        assert!(matches!(
            GroupSummary::new("Empty", Vec::new()),
            Err(ExportError::NoValues)
        ));
    }

    #[test]
    fn anova_across_group_summaries() {
        let groups = [
            GroupSummary::new("Control", vec![1.0, 2.0, 3.0]).unwrap(),
            GroupSummary::new("CFA", vec![4.0, 5.0, 6.0]).unwrap(),
        ];
        let anova = OneWayAnova::across(&groups).unwrap();
        assert!((anova.f_statistic - 13.5).abs() < 1e-12);
    }
}
