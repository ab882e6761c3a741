use std::ops::Range;

use thiserror::Error;

use crate::genomics::codec::MAX_BIN_WIDTH;

/// Default number of bases per bin.
pub const DEFAULT_BIN_WIDTH: u32 = 1_000_000;

/// Errors constructing a [`RegionBinner`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BinError {
    /// Region start is not before its end.
    #[error("empty region [{start}, {end})")]
    EmptyRegion {
        /// Inclusive start.
        start: u32,
        /// Exclusive end.
        end: u32,
    },
    /// Bin width is zero or too wide for the record codec.
    #[error("bin width {0} must be within 1..={max}", max = MAX_BIN_WIDTH)]
    InvalidWidth(u32),
}

/// Fixed-width, contiguous, non-overlapping partition of `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionBinner {
    region: Range<u32>,
    width: u32,
    starts: Vec<u32>,
}

impl RegionBinner {
    /// Partition `[start, end)` into bins of `width` bases; the last bin may be shorter.
    pub fn new(start: u32, end: u32, width: u32) -> Result<Self, BinError> {
        if start >= end {
            return Err(BinError::EmptyRegion { start, end });
        }
        if width == 0 || width > MAX_BIN_WIDTH {
            return Err(BinError::InvalidWidth(width));
        }
        let starts = (start..end).step_by(width as usize).collect();
        Ok(Self {
            region: start..end,
            width,
            starts,
        })
    }

    /// The partitioned region.
    pub fn region(&self) -> Range<u32> {
        self.region.clone()
    }

    /// Configured bin width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the partition is empty (never true for a constructed binner).
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Bounds of bin `index`.
    pub fn bin(&self, index: usize) -> Option<Range<u32>> {
        let start = *self.starts.get(index)?;
        let end = self
            .starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.region.end);
        Some(start..end)
    }

    /// Index of the bin containing `position`: the last bin whose start is ≤ `position`.
    pub fn locate(&self, position: u32) -> Option<usize> {
        if !self.region.contains(&position) {
            return None;
        }
        Some(self.starts.partition_point(|&start| start <= position) - 1)
    }

    /// Iterate over all bins in order.
    pub fn iter(&self) -> impl Iterator<Item = Range<u32>> + '_ {
        (0..self.len()).filter_map(move |idx| self.bin(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_cover_region_contiguously() {
        let binner = RegionBinner::new(100, 1_050, 300).unwrap();
        let bins: Vec<_> = binner.iter().collect();
        assert_eq!(bins, vec![100..400, 400..700, 700..1_000, 1_000..1_050]);
    }

    #[test]
    fn locate_boundaries() {
        let binner = RegionBinner::new(100, 1_050, 300).unwrap();
        assert_eq!(binner.locate(99), None);
        assert_eq!(binner.locate(100), Some(0));
        assert_eq!(binner.locate(399), Some(0));
        assert_eq!(binner.locate(400), Some(1));
        assert_eq!(binner.locate(1_049), Some(3));
        assert_eq!(binner.locate(1_050), None);
    }

    #[test]
    fn rejects_bad_construction() {
        assert_eq!(
            RegionBinner::new(10, 10, 5),
            Err(BinError::EmptyRegion { start: 10, end: 10 })
        );
        assert_eq!(RegionBinner::new(0, 10, 0), Err(BinError::InvalidWidth(0)));
        assert!(RegionBinner::new(0, 10, MAX_BIN_WIDTH + 1).is_err());
    }
}
