//! Priority tiers and per-tier lookup tables
//!
//! A [`Tier`] is the coarse priority bucket of a submitted task. Tiers strictly
//! dominate ordering: any `Emergency` task outranks every `Critical` task no
//! matter what numeric priority either carries.

#![forbid(unsafe_code)]

use std::fmt;
use std::ops::{Index, IndexMut};

/// Coarse priority bucket, ordered ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Background work
    Low = 0,
    /// Standard requests
    Normal = 1,
    /// User-facing requests
    High = 2,
    /// Must run ahead of all regular traffic
    Critical = 3,
    /// Outranks everything else
    Emergency = 4,
}

impl Tier {
    /// Number of tiers
    pub const COUNT: usize = 5;

    /// All tiers, lowest first
    pub const ALL: [Tier; Tier::COUNT] = [
        Tier::Low,
        Tier::Normal,
        Tier::High,
        Tier::Critical,
        Tier::Emergency,
    ];

    /// Stable index for tier-indexed arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Static label, used for log fields and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }

    /// Iterate tiers from `Emergency` down to `Low`
    pub fn highest_first() -> impl Iterator<Item = Tier> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per [`Tier`], indexable by tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierTable<T> {
    values: [T; Tier::COUNT],
}

impl<T> TierTable<T> {
    /// Build a table by calling `f` once per tier, lowest first
    pub fn from_fn(mut f: impl FnMut(Tier) -> T) -> Self {
        Self {
            values: std::array::from_fn(|i| f(Tier::ALL[i])),
        }
    }

    /// Iterate `(tier, value)` pairs, lowest tier first
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &T)> {
        Tier::ALL.into_iter().zip(self.values.iter())
    }

    /// Map every value into a new table
    pub fn map<U>(&self, mut f: impl FnMut(Tier, &T) -> U) -> TierTable<U> {
        TierTable::from_fn(|tier| f(tier, &self.values[tier.index()]))
    }
}

impl<T> Index<Tier> for TierTable<T> {
    type Output = T;

    fn index(&self, tier: Tier) -> &T {
        &self.values[tier.index()]
    }
}

impl<T> IndexMut<Tier> for TierTable<T> {
    fn index_mut(&mut self, tier: Tier) -> &mut T {
        &mut self.values[tier.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Low < Tier::Normal);
        assert!(Tier::Normal < Tier::High);
        assert!(Tier::High < Tier::Critical);
        assert!(Tier::Critical < Tier::Emergency);
    }

    #[test]
    fn test_tier_index_matches_all() {
        for (i, tier) in Tier::ALL.iter().enumerate() {
            assert_eq!(tier.index(), i);
        }
    }

    #[test]
    fn test_highest_first() {
        let order: Vec<_> = Tier::highest_first().collect();
        assert_eq!(order.first(), Some(&Tier::Emergency));
        assert_eq!(order.last(), Some(&Tier::Low));
        assert_eq!(order.len(), Tier::COUNT);
    }

    #[test]
    fn test_display() {
        assert_eq!(Tier::Critical.to_string(), "critical");
        assert_eq!(format!("{}", Tier::Low), "low");
    }

    #[test]
    fn test_tier_table_indexing() {
        let mut table = TierTable::from_fn(|tier| tier.index() * 10);
        assert_eq!(table[Tier::High], 20);

        table[Tier::High] += 1;
        assert_eq!(table[Tier::High], 21);

        let doubled = table.map(|_, v| v * 2);
        assert_eq!(doubled[Tier::Emergency], 80);
        assert_eq!(doubled.iter().count(), Tier::COUNT);
    }
}
