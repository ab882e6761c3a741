//! Multinomial genotype likelihoods from per-allele read depths.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Default factorial cap; deeper sites are rescaled down to this depth.
pub const DEFAULT_MAX_FACTORIAL: u32 = 150;
/// Default combined sequencing and alignment error rate.
pub const DEFAULT_ERROR_RATE: f64 = 0.05;

/// Invalid likelihood-engine parameters.
#[derive(Debug, Error, PartialEq)]
pub enum LikelihoodError {
    /// Error rate outside `(0, 1)`.
    #[error("combined error rate {0} must be within (0, 1)")]
    InvalidErrorRate(f64),
    /// Factorial cap of zero.
    #[error("factorial cap must be > 0")]
    InvalidCap,
}

/// `log10(n!)` for `n` in `0..=cap`.
#[derive(Debug, Clone)]
pub struct FactorialTable {
    log10: Vec<f64>,
}

impl FactorialTable {
    /// Precompute factorials up to and including `cap`.
    pub fn new(cap: u32) -> Result<Self, LikelihoodError> {
        if cap == 0 {
            return Err(LikelihoodError::InvalidCap);
        }
        let mut log10 = Vec::with_capacity(cap as usize + 1);
        let mut acc = 0.0f64;
        log10.push(acc);
        for n in 1..=cap {
            acc += f64::from(n).log10();
            log10.push(acc);
        }
        Ok(Self { log10 })
    }

    /// Largest `n` in the table.
    pub fn cap(&self) -> u32 {
        (self.log10.len() - 1) as u32
    }

    /// `log10(n!)`; `n` must not exceed [`cap`](Self::cap).
    pub fn log10_factorial(&self, n: u32) -> f64 {
        self.log10[n as usize]
    }

    /// `n!` as a float.
    pub fn factorial(&self, n: u32) -> f64 {
        10f64.powf(self.log10_factorial(n))
    }
}

/// Called genotype of one sample at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGenotypeCall {
    /// Allele indices of the call, `first <= second`.
    pub alleles: (usize, usize),
    /// Per-allele depths (after rescaling), reference first.
    pub depths: Vec<u32>,
    /// Rounded `-log10` likelihood per genotype in VCF `G` order.
    pub likelihoods: Vec<i32>,
}

/// Genotype-engine result for one sample at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenotypeCall {
    /// No reads at the site.
    Missing,
    /// A genotype was called.
    Called(SampleGenotypeCall),
}

impl GenotypeCall {
    /// Parse the `./.` or `i/j:AD:GL` text form.
    pub fn parse(field: &str) -> Option<Self> {
        let field = field.trim_end();
        if field.starts_with('.') {
            return Some(GenotypeCall::Missing);
        }
        let mut parts = field.split(':');
        let (gt, ad, gl) = (parts.next()?, parts.next()?, parts.next()?);
        let (a, b) = gt.split_once('/')?;
        Some(GenotypeCall::Called(SampleGenotypeCall {
            alleles: (a.parse().ok()?, b.parse().ok()?),
            depths: parse_list(ad)?,
            likelihoods: parse_list(gl)?,
        }))
    }
}

impl fmt::Display for GenotypeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenotypeCall::Missing => f.write_str("./."),
            GenotypeCall::Called(call) => {
                write!(f, "{}/{}:", call.alleles.0, call.alleles.1)?;
                write_list(f, &call.depths)?;
                f.write_str(":")?;
                write_list(f, &call.likelihoods)
            }
        }
    }
}

fn parse_list<T: FromStr>(list: &str) -> Option<Vec<T>> {
    list.split(',').map(|v| v.parse().ok()).collect()
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            f.write_str(",")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

/// Index of genotype `(i, j)`, `i <= j`, in VCF `G` order.
#[inline]
pub fn genotype_index(i: usize, j: usize) -> usize {
    j * (j + 1) / 2 + i
}

/// Scores every unordered genotype and picks the most likely one.
#[derive(Debug, Clone)]
pub struct GenotypeLikelihoodEngine {
    factorials: FactorialTable,
    error_rate: f64,
}

impl GenotypeLikelihoodEngine {
    /// Create an engine with the given combined error rate and factorial table.
    pub fn new(error_rate: f64, factorials: FactorialTable) -> Result<Self, LikelihoodError> {
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(LikelihoodError::InvalidErrorRate(error_rate));
        }
        Ok(Self {
            factorials,
            error_rate,
        })
    }

    /// Combined error rate.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Call a genotype from per-allele depths (reference first).
    pub fn call(&self, depths: &[u32]) -> GenotypeCall {
        let total: u64 = depths.iter().map(|&d| u64::from(d)).sum();
        if total == 0 {
            return GenotypeCall::Missing;
        }

        let cap = self.factorials.cap();
        let mut counts = depths.to_vec();
        // The total stays at the cap even when flooring drops a read or two.
        let total = if total > u64::from(cap) {
            let portion = f64::from(cap) / total as f64;
            for count in counts.iter_mut() {
                *count = (f64::from(*count) * portion) as u32;
            }
            cap
        } else {
            total as u32
        };

        let log_coefficient = counts.iter().fold(self.factorials.log10_factorial(total), |acc, &c| {
            acc - self.factorials.log10_factorial(c)
        });
        let hom_match = (1.0 - 0.75 * self.error_rate).log10();
        let het_match = (0.5 - self.error_rate / 4.0).log10();
        let mismatch = (self.error_rate / 4.0).log10();

        let k = counts.len();
        let mut likelihoods = vec![0i32; k * (k + 1) / 2];
        let mut best = f64::MAX;
        let mut alleles = (0, 0);
        for i in 0..k {
            for j in i..k {
                let value = if i == j {
                    let matched = f64::from(counts[i]);
                    -(log_coefficient + matched * hom_match + (f64::from(total) - matched) * mismatch)
                } else {
                    let matched = f64::from(counts[i]) + f64::from(counts[j]);
                    -(log_coefficient + matched * het_match + (f64::from(total) - matched) * mismatch)
                };
                if value < best {
                    best = value;
                    alleles = (i, j);
                }
                likelihoods[genotype_index(i, j)] = value.round() as i32;
            }
        }

        GenotypeCall::Called(SampleGenotypeCall {
            alleles,
            depths: counts,
            likelihoods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> GenotypeLikelihoodEngine {
        GenotypeLikelihoodEngine::new(
            DEFAULT_ERROR_RATE,
            FactorialTable::new(DEFAULT_MAX_FACTORIAL).unwrap(),
        )
        .unwrap()
    }

    fn called(call: GenotypeCall) -> SampleGenotypeCall {
        match call {
            GenotypeCall::Called(call) => call,
            GenotypeCall::Missing => panic!("expected a called genotype"),
        }
    }

    #[test]
    fn factorials_match_direct_products() {
        let table = FactorialTable::new(20).unwrap();
        assert_eq!(table.cap(), 20);
        assert!((table.factorial(5) - 120.0).abs() < 1e-9);
        assert!((table.factorial(10) - 3_628_800.0).abs() < 1e-3);
        assert_eq!(table.log10_factorial(0), 0.0);
        assert!(FactorialTable::new(0).is_err());
    }

    #[test]
    fn zero_depth_is_missing() {
        assert_eq!(engine().call(&[0, 0]), GenotypeCall::Missing);
        assert_eq!(engine().call(&[0, 0]).to_string(), "./.");
    }

    #[test]
    fn pure_reference_reads_call_homozygous_reference() {
        let call = called(engine().call(&[10, 0]));
        assert_eq!(call.alleles, (0, 0));
        assert_eq!(call.likelihoods.len(), 3);
        // 0/0 strictly best.
        assert!(call.likelihoods[0] < call.likelihoods[1]);
        assert!(call.likelihoods[0] < call.likelihoods[2]);
    }

    #[test]
    fn mixed_reads_call_heterozygous() {
        let call = called(engine().call(&[7, 3]));
        assert_eq!(call.alleles, (0, 1));
        assert_eq!(call.depths, vec![7, 3]);
    }

    #[test]
    fn three_alleles_use_vcf_genotype_order() {
        let call = called(engine().call(&[0, 0, 9]));
        assert_eq!(call.alleles, (2, 2));
        assert_eq!(call.likelihoods.len(), 6);
        assert_eq!(genotype_index(2, 2), 5);
        assert_eq!(call.likelihoods[5], *call.likelihoods.iter().min().unwrap());
    }

    #[test]
    fn deep_sites_are_rescaled_to_the_cap() {
        let call = called(engine().call(&[900, 300]));
        assert_eq!(call.depths, vec![112, 37]);
        assert_eq!(call.alleles, (0, 1));
    }

    #[test]
    fn ties_keep_first_genotype() {
        // Every heterozygote scores the same; enumeration order picks 0/1.
        let call = called(engine().call(&[2, 2, 2]));
        assert_eq!(call.alleles, (0, 1));
        assert_eq!(
            call.likelihoods[genotype_index(0, 1)],
            call.likelihoods[genotype_index(1, 2)]
        );
    }

    #[test]
    fn text_form_round_trips() {
        let call = engine().call(&[7, 3]);
        let text = call.to_string();
        assert!(text.starts_with("0/1:7,3:"));
        assert_eq!(GenotypeCall::parse(&text), Some(call));
        assert_eq!(GenotypeCall::parse("./."), Some(GenotypeCall::Missing));
        assert_eq!(GenotypeCall::parse("0/1"), None);
    }

    #[test]
    fn rejects_invalid_error_rate() {
        let table = FactorialTable::new(10).unwrap();
        assert!(GenotypeLikelihoodEngine::new(0.0, table.clone()).is_err());
        assert!(GenotypeLikelihoodEngine::new(1.5, table).is_err());
    }
}
