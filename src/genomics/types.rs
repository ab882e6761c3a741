use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of allele classes tracked per site (A, C, G, T, deletion, insertion).
pub const NUM_ALLELE_CLASSES: usize = 6;

/// Allele classes observed in pileup base strings.
///
/// The discriminant doubles as the allele code stored in coded variant records,
/// so the order is part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlleleClass {
    /// Adenine.
    A = 0,
    /// Cytosine.
    C = 1,
    /// Guanine.
    G = 2,
    /// Thymine.
    T = 3,
    /// Deletion relative to the reference.
    Deletion = 4,
    /// Insertion relative to the reference.
    Insertion = 5,
}

impl AlleleClass {
    /// All classes in code order.
    pub const ALL: [AlleleClass; NUM_ALLELE_CLASSES] = [
        AlleleClass::A,
        AlleleClass::C,
        AlleleClass::G,
        AlleleClass::T,
        AlleleClass::Deletion,
        AlleleClass::Insertion,
    ];

    /// Map an ASCII base (either case) to its class.
    pub fn from_base(base: u8) -> Option<Self> {
        match base {
            b'A' | b'a' => Some(AlleleClass::A),
            b'C' | b'c' => Some(AlleleClass::C),
            b'G' | b'g' => Some(AlleleClass::G),
            b'T' | b't' => Some(AlleleClass::T),
            _ => None,
        }
    }

    /// Decode a numeric allele code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Numeric allele code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Index into per-class count arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the class is an insertion or a deletion.
    pub fn is_indel(self) -> bool {
        matches!(self, AlleleClass::Deletion | AlleleClass::Insertion)
    }

    /// Representation used in the VCF `ALT` column.
    pub fn vcf_symbol(self) -> &'static str {
        match self {
            AlleleClass::A => "A",
            AlleleClass::C => "C",
            AlleleClass::G => "G",
            AlleleClass::T => "T",
            AlleleClass::Deletion => "<DEL>",
            AlleleClass::Insertion => "<INS>",
        }
    }
}

impl fmt::Display for AlleleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            AlleleClass::Deletion => "D",
            AlleleClass::Insertion => "I",
            other => other.vcf_symbol(),
        };
        f.write_str(symbol)
    }
}

/// Error raised when an allele token cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid allele token '{0}'")]
pub struct AlleleParseError(pub String);

/// Alternate allele of a library site: class plus indel length (0 for SNPs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SiteAllele {
    /// Allele class.
    pub class: AlleleClass,
    /// Length of the insertion/deletion, zero for substitutions.
    pub indel_length: u32,
}

impl SiteAllele {
    /// Single-base substitution allele.
    pub fn snp(class: AlleleClass) -> Self {
        Self {
            class,
            indel_length: 0,
        }
    }

    /// Insertion or deletion allele of the given length.
    pub fn indel(class: AlleleClass, indel_length: u32) -> Self {
        Self {
            class,
            indel_length,
        }
    }
}

impl FromStr for SiteAllele {
    type Err = AlleleParseError;

    /// Parses `A|C|G|T` or `D<len>|I<len>`.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let err = || AlleleParseError(token.to_string());
        let bytes = token.as_bytes();
        let (&first, rest) = bytes.split_first().ok_or_else(err)?;
        let class = match first.to_ascii_uppercase() {
            b'D' => AlleleClass::Deletion,
            b'I' => AlleleClass::Insertion,
            base => AlleleClass::from_base(base).ok_or_else(err)?,
        };
        if !class.is_indel() {
            return if rest.is_empty() {
                Ok(SiteAllele::snp(class))
            } else {
                Err(err())
            };
        }
        let length: u32 = token[1..].parse().map_err(|_| err())?;
        if length == 0 {
            return Err(err());
        }
        Ok(SiteAllele::indel(class, length))
    }
}

impl fmt::Display for SiteAllele {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_indel() {
            write!(f, "{}{}", self.class, self.indel_length)
        } else {
            write!(f, "{}", self.class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allele_codes_round_trip() {
        for class in AlleleClass::ALL {
            assert_eq!(AlleleClass::from_code(class.code()), Some(class));
        }
        assert_eq!(AlleleClass::from_code(6), None);
    }

    #[test]
    fn site_allele_tokens_parse() {
        assert_eq!("t".parse::<SiteAllele>().unwrap(), SiteAllele::snp(AlleleClass::T));
        assert_eq!(
            "D12".parse::<SiteAllele>().unwrap(),
            SiteAllele::indel(AlleleClass::Deletion, 12)
        );
        assert_eq!("I3".parse::<SiteAllele>().unwrap().to_string(), "I3");
        assert!("I".parse::<SiteAllele>().is_err());
        assert!("I0".parse::<SiteAllele>().is_err());
        assert!("AT".parse::<SiteAllele>().is_err());
        assert!("N".parse::<SiteAllele>().is_err());
        assert!("".parse::<SiteAllele>().is_err());
    }
}
