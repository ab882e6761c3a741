//! Discovery thresholds deciding whether a pileup site is a callable variant.

use thiserror::Error;

use crate::genomics::{AlleleClass, AlleleTally};

/// Invalid threshold combination.
#[derive(Debug, Error, PartialEq)]
#[error("invalid threshold {name}: {reason}")]
pub struct ThresholdError {
    /// Name of the offending threshold.
    pub name: &'static str,
    /// Why the value was rejected.
    pub reason: String,
}

/// Named thresholds shared read-only by every discovery task.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdPolicy {
    /// Minimum total depth at a site.
    pub min_depth: u32,
    /// Minimum depth relative to the sample's expected coverage.
    pub min_depth_ratio: f64,
    /// Maximum depth relative to the sample's expected coverage.
    pub max_depth_ratio: f64,
    /// Allele depth ratio at or above which a call is homozygous.
    pub homozygous_ratio: f64,
    /// Lowest allele depth ratio accepted as heterozygous.
    pub heterozygous_ratio: f64,
    /// Second-allele ratio above which the site is considered contaminated.
    pub third_allele_ratio: f64,
    /// Maximum number of distinct indel types at one site.
    pub max_indel_types: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            min_depth: 2,
            min_depth_ratio: 0.2,
            max_depth_ratio: 3.0,
            homozygous_ratio: 0.8,
            heterozygous_ratio: 0.4,
            third_allele_ratio: 0.2,
            max_indel_types: 1,
        }
    }
}

/// Why a site was not called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Depth below the minimum count.
    LowDepth,
    /// Depth ratio outside the configured window.
    DepthRatio,
    /// No allele-class observation at the site.
    NoObservations,
    /// Too many distinct indel lengths.
    AmbiguousIndel,
    /// Leading allele below the heterozygous ratio.
    WeakAllele,
    /// Leading allele inside the ambiguous band between het and hom.
    AmbiguousRatio,
    /// Second allele too frequent.
    ThirdAllele,
}

/// Result of evaluating one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Site is callable.
    Accept {
        /// Called allele class.
        allele: AlleleClass,
        /// Indel length for insertion/deletion calls, zero otherwise.
        indel_length: u32,
    },
    /// Site rejected.
    Reject(RejectReason),
}

impl FilterOutcome {
    /// Whether the site was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterOutcome::Accept { .. })
    }
}

impl ThresholdPolicy {
    /// Check the thresholds for internal consistency.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let ratio = |name: &'static str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ThresholdError {
                    name,
                    reason: format!("{value} is not within [0, 1]"),
                })
            }
        };
        ratio("homozygous_ratio", self.homozygous_ratio)?;
        ratio("heterozygous_ratio", self.heterozygous_ratio)?;
        ratio("third_allele_ratio", self.third_allele_ratio)?;
        if !(self.min_depth_ratio >= 0.0 && self.min_depth_ratio <= self.max_depth_ratio) {
            return Err(ThresholdError {
                name: "min_depth_ratio",
                reason: format!(
                    "{} must be non-negative and not exceed max_depth_ratio {}",
                    self.min_depth_ratio, self.max_depth_ratio
                ),
            });
        }
        Ok(())
    }

    /// Depth-only pre-check applied before any allele classification.
    pub fn admits_depth(&self, depth: u32, coverage: f64) -> Option<RejectReason> {
        if depth < self.min_depth {
            return Some(RejectReason::LowDepth);
        }
        let ratio = f64::from(depth) / coverage;
        if ratio < self.min_depth_ratio || ratio > self.max_depth_ratio {
            return Some(RejectReason::DepthRatio);
        }
        None
    }

    /// Run the full decision sequence for one site.
    pub fn evaluate(&self, tally: &AlleleTally, depth: u32, coverage: f64) -> FilterOutcome {
        if let Some(reason) = self.admits_depth(depth, coverage) {
            return FilterOutcome::Reject(reason);
        }
        if tally.observations() == 0 {
            return FilterOutcome::Reject(RejectReason::NoObservations);
        }
        if tally.indel_type_count() > self.max_indel_types {
            return FilterOutcome::Reject(RejectReason::AmbiguousIndel);
        }

        let ranked = tally.ranked();
        let depth = f64::from(depth);
        let leading = f64::from(tally.count(ranked[0])) / depth;
        if leading < self.heterozygous_ratio {
            return FilterOutcome::Reject(RejectReason::WeakAllele);
        }
        if leading > 1.0 - self.heterozygous_ratio && leading < self.homozygous_ratio {
            return FilterOutcome::Reject(RejectReason::AmbiguousRatio);
        }

        let second = tally.count(ranked[1]);
        if second > 0 && f64::from(second) / depth > self.third_allele_ratio {
            return FilterOutcome::Reject(RejectReason::ThirdAllele);
        }

        let allele = ranked[0];
        // More than one length can only survive when max_indel_types > 1; the first one wins.
        let indel_length = match allele {
            AlleleClass::Insertion => tally.insertion_lengths().first().copied().unwrap_or(0),
            AlleleClass::Deletion => tally.deletion_lengths().first().copied().unwrap_or(0),
            _ => 0,
        };
        FilterOutcome::Accept {
            allele,
            indel_length,
        }
    }
}
