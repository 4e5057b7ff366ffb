use crate::error::{LoopError, LoopResult};

/// Absolute position of a block in the ever-growing logical sequence.
///
/// Indices are handed out monotonically and never reused, even after the block that
/// held one has been evicted.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BlockIndex(pub u64);

impl BlockIndex {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Which template copy this index belongs to (0 = the original, pre-duplication set).
    pub fn copy(self, template_len: usize) -> u64 {
        if template_len == 0 {
            return 0;
        }
        self.0 / template_len as u64
    }

    /// Position of this index inside its template copy.
    pub fn slot(self, template_len: usize) -> usize {
        if template_len == 0 {
            return 0;
        }
        (self.0 % template_len as u64) as usize
    }

    /// Stable anchor id used by navigation affordances.
    pub fn anchor(self) -> String {
        format!("section--{}", self.0)
    }
}

impl std::fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockRange {
    pub start: BlockIndex,
    pub end: BlockIndex, // exclusive
}

impl BlockRange {
    pub fn new(start: BlockIndex, end: BlockIndex) -> LoopResult<Self> {
        if start.0 > end.0 {
            return Err(LoopError::validation("BlockRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    pub fn empty_at(at: BlockIndex) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    pub fn contains(self, index: BlockIndex) -> bool {
        self.start.0 <= index.0 && index.0 < self.end.0
    }

    pub fn iter(self) -> impl Iterator<Item = BlockIndex> {
        (self.start.0..self.end.0).map(BlockIndex)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    White,
    Black,
}

impl Background {
    pub fn flip(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScrollDirection {
    Forward,
    Reverse,
    Paused,
}

impl ScrollDirection {
    pub fn between(previous: f64, current: f64) -> Self {
        if current > previous {
            Self::Forward
        } else if current < previous {
            Self::Reverse
        } else {
            Self::Paused
        }
    }
}

/// Bumped on every `sequence:reset`; versioned subscriptions captured under an older
/// generation are ignored by the bus.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
    serde::Deserialize,
)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// `Some(v)` when `v` is a usable coordinate (finite).
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// `Some(v)` when `v` is a usable extent (finite and > 0).
pub fn finite_positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_range_contains_boundaries() {
        let r = BlockRange::new(BlockIndex(5), BlockIndex(10)).unwrap();
        assert!(!r.contains(BlockIndex(4)));
        assert!(r.contains(BlockIndex(5)));
        assert!(r.contains(BlockIndex(9)));
        assert!(!r.contains(BlockIndex(10)));
        assert_eq!(r.len(), 5);
        assert_eq!(r.iter().count(), 5);
        assert!(BlockRange::new(BlockIndex(3), BlockIndex(2)).is_err());
    }

    #[test]
    fn copy_and_slot_follow_template_length() {
        assert_eq!(BlockIndex(0).copy(5), 0);
        assert_eq!(BlockIndex(4).copy(5), 0);
        assert_eq!(BlockIndex(5).copy(5), 1);
        assert_eq!(BlockIndex(17).slot(5), 2);
        assert_eq!(BlockIndex(7).copy(0), 0);
    }

    #[test]
    fn direction_from_offsets() {
        assert_eq!(ScrollDirection::between(0.0, 10.0), ScrollDirection::Forward);
        assert_eq!(ScrollDirection::between(10.0, 0.0), ScrollDirection::Reverse);
        assert_eq!(ScrollDirection::between(3.0, 3.0), ScrollDirection::Paused);
    }

    #[test]
    fn geometry_helpers_reject_nan() {
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(-3.0), Some(-3.0));
        assert_eq!(finite_positive(0.0), None);
        assert_eq!(finite_positive(f64::INFINITY), None);
        assert_eq!(finite_positive(12.5), Some(12.5));
    }
}
