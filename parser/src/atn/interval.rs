use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use crate::token::TokenType;

/// Inclusive range of token types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: TokenType,
    pub stop: TokenType,
}

impl Interval {
    fn len(&self) -> usize {
        (self.stop as i64 - self.start as i64 + 1) as usize
    }
}

impl Debug for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.stop {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.stop)
        }
    }
}

/// A set of token types kept as sorted, disjoint, non-adjacent intervals.
///
/// Deserialized interval lists may come in any order and may overlap; they
/// are normalized on load.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl From<Vec<Interval>> for IntervalSet {
    fn from(mut intervals: Vec<Interval>) -> Self {
        intervals.retain(|iv| iv.start <= iv.stop);
        intervals.sort_by_key(|iv| iv.start);
        let mut r = IntervalSet { intervals };
        r.normalize();
        r
    }
}

impl From<IntervalSet> for Vec<Interval> {
    fn from(set: IntervalSet) -> Self {
        set.intervals
    }
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet { intervals: vec![] }
    }

    /// The set `start..=stop`; empty if `stop < start`.
    pub fn of(start: TokenType, stop: TokenType) -> Self {
        let mut r = Self::new();
        r.add_range(start, stop);
        r
    }

    pub fn single(symbol: TokenType) -> Self {
        Self::of(symbol, symbol)
    }

    pub fn from_symbols(symbols: &[TokenType]) -> Self {
        let mut r = Self::new();
        for &s in symbols {
            r.add(s);
        }
        r
    }

    pub fn add(&mut self, symbol: TokenType) {
        self.add_range(symbol, symbol);
    }

    pub fn add_range(&mut self, start: TokenType, stop: TokenType) {
        if stop < start {
            return;
        }
        let pos = self.intervals.partition_point(|iv| iv.start < start);
        self.intervals.insert(pos, Interval { start, stop });
        self.normalize();
    }

    pub fn add_set(&mut self, other: &IntervalSet) {
        if other.is_empty() {
            return;
        }
        self.intervals.extend_from_slice(&other.intervals);
        self.intervals.sort_by_key(|iv| iv.start);
        self.normalize();
    }

    // merge overlapping or touching intervals; assumes sorted by start
    fn normalize(&mut self) {
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for iv in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if iv.start as i64 <= last.stop as i64 + 1 => {
                    last.stop = last.stop.max(iv.stop);
                }
                _ => merged.push(iv),
            }
        }
        self.intervals = merged;
    }

    pub fn contains(&self, symbol: TokenType) -> bool {
        let pos = self.intervals.partition_point(|iv| iv.stop < symbol);
        pos < self.intervals.len() && self.intervals[pos].start <= symbol
    }

    /// All symbols in `min..=max` which are not in this set.
    pub fn complement(&self, min: TokenType, max: TokenType) -> IntervalSet {
        let mut r = IntervalSet::new();
        let max = max as i64;
        let mut next = min as i64;
        for iv in &self.intervals {
            if (iv.stop as i64) < next {
                continue;
            }
            if iv.start as i64 > max {
                break;
            }
            if iv.start as i64 > next {
                r.intervals.push(Interval {
                    start: next as TokenType,
                    stop: (iv.start as i64 - 1).min(max) as TokenType,
                });
            }
            next = iv.stop as i64 + 1;
        }
        if next <= max {
            r.intervals.push(Interval {
                start: next as TokenType,
                stop: max as TokenType,
            });
        }
        r
    }

    /// Number of symbols in the set.
    pub fn len(&self) -> usize {
        self.intervals.iter().map(|iv| iv.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The only element, if the set has exactly one.
    pub fn single_symbol(&self) -> Option<TokenType> {
        match self.intervals.as_slice() {
            [iv] if iv.start == iv.stop => Some(iv.start),
            _ => None,
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenType> + '_ {
        self.intervals.iter().flat_map(|iv| iv.start..=iv.stop)
    }

    pub fn to_vec(&self) -> Vec<TokenType> {
        self.iter().collect()
    }
}

impl Debug for IntervalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", iv)?;
        }
        write!(f, "}}")
    }
}

impl Display for IntervalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_adjacent() {
        let mut s = IntervalSet::new();
        s.add(3);
        s.add(1);
        s.add(2);
        s.add(7);
        assert_eq!(format!("{:?}", s), "{1..3, 7}");
        assert_eq!(s.len(), 4);
        assert!(s.contains(2));
        assert!(!s.contains(4));
        assert!(s.contains(7));
        assert!(!s.contains(8));
    }

    #[test]
    fn add_set_and_overlaps() {
        let mut a = IntervalSet::of(1, 5);
        a.add_set(&IntervalSet::of(4, 9));
        a.add_set(&IntervalSet::single(-1));
        assert_eq!(a.to_vec(), vec![-1, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(a.intervals().len(), 2);
    }

    #[test]
    fn complement_within_bounds() {
        let s = IntervalSet::from_symbols(&[2, 3, 6]);
        assert_eq!(s.complement(1, 7).to_vec(), vec![1, 4, 5, 7]);
        assert_eq!(IntervalSet::new().complement(1, 3).to_vec(), vec![1, 2, 3]);
        assert!(IntervalSet::of(1, 3).complement(1, 3).is_empty());
        // EOF is outside the user range and never part of a complement
        assert_eq!(IntervalSet::single(-1).complement(1, 2).to_vec(), vec![1, 2]);
    }

    #[test]
    fn unsorted_json_is_normalized() {
        let s: IntervalSet = serde_json::from_str(
            r#"[{"start":2,"stop":2},{"start":1,"stop":1},{"start":6,"stop":4},{"start":2,"stop":3}]"#,
        )
        .unwrap();
        assert_eq!(format!("{:?}", s), "{1..3}");
        assert!(s.contains(1));
        assert!(s.contains(3));
        assert_eq!(s.single_symbol(), None);

        let one: IntervalSet =
            serde_json::from_str(r#"[{"start":5,"stop":5},{"start":5,"stop":5}]"#).unwrap();
        assert_eq!(one.single_symbol(), Some(5));
        assert_eq!(serde_json::to_string(&one).unwrap(), r#"[{"start":5,"stop":5}]"#);
    }

    #[test]
    fn single_symbol() {
        assert_eq!(IntervalSet::single(4).single_symbol(), Some(4));
        assert_eq!(IntervalSet::of(4, 5).single_symbol(), None);
        assert_eq!(IntervalSet::new().single_symbol(), None);
        assert!(IntervalSet::of(5, 4).is_empty());
    }
}
