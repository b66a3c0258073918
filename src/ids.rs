//! ID spaces and the NumberSet allocator
//!
//! Every entity (topic, link, class, context) draws its ID from a
//! [`NumberSet`] of used IDs. Released IDs go back into the pool and the
//! lowest free one is handed out next, so IDs stay dense and reuse is
//! deterministic across runs.
//!
//! # Serialization
//!
//! A set serializes as a comma-separated list of `n` or `n-m` tokens,
//! e.g. `1-3,5,9-12`. The empty set is the empty string. Parsing also
//! accepts the list wrapped in braces (`{1-3,5}`).

use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

pub type FileId = u32;
pub type TopicId = u32;
pub type LinkId = u32;
pub type ClassId = u32;
pub type ContextId = u32;
pub type LanguageId = u32;

/// Inclusive range of IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: u32,
    pub end: u32,
}

impl IdRange {
    fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }
}

/// Ordered set of positive integers stored as disjoint, non-adjacent ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberSet {
    ranges: Vec<IdRange>,
}

impl NumberSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Build a set from arbitrary members (order and duplicates don't matter).
    pub fn from_members<I: IntoIterator<Item = u32>>(members: I) -> Self {
        let mut set = Self::new();
        for n in members {
            set.add(n);
        }
        set
    }

    /// Add `n` to the set.
    ///
    /// Returns false if `n` was already present or is zero.
    pub fn add(&mut self, n: u32) -> bool {
        if n == 0 {
            return false;
        }

        // First range starting after n; the range that could hold n is just before it.
        let idx = self.ranges.partition_point(|r| r.start <= n);

        if idx > 0 {
            let prev = self.ranges[idx - 1];
            if n <= prev.end {
                return false;
            }
            if prev.end + 1 == n {
                self.ranges[idx - 1].end = n;
                if idx < self.ranges.len() && self.ranges[idx].start == n + 1 {
                    self.ranges[idx - 1].end = self.ranges[idx].end;
                    self.ranges.remove(idx);
                }
                return true;
            }
        }

        if idx < self.ranges.len() && self.ranges[idx].start == n + 1 {
            self.ranges[idx].start = n;
        } else {
            self.ranges.insert(idx, IdRange { start: n, end: n });
        }
        true
    }

    /// Remove `n` from the set.
    ///
    /// Returns false if `n` was not present.
    pub fn remove(&mut self, n: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.start <= n);
        if idx == 0 {
            return false;
        }
        let i = idx - 1;
        let range = self.ranges[i];
        if n > range.end {
            return false;
        }

        match (n == range.start, n == range.end) {
            (true, true) => {
                self.ranges.remove(i);
            }
            (true, false) => self.ranges[i].start = n + 1,
            (false, true) => self.ranges[i].end = n - 1,
            (false, false) => {
                self.ranges[i].end = n - 1;
                self.ranges.insert(
                    i + 1,
                    IdRange {
                        start: n + 1,
                        end: range.end,
                    },
                );
            }
        }
        true
    }

    pub fn contains(&self, n: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.start <= n);
        idx > 0 && n <= self.ranges[idx - 1].end
    }

    /// Smallest positive integer not in the set.
    ///
    /// Because ranges are never adjacent, the first gap always sits right
    /// after the first range.
    pub fn lowest_available(&self) -> u32 {
        match self.ranges.first() {
            None => 1,
            Some(first) if first.start > 1 => 1,
            Some(first) => first.end.saturating_add(1),
        }
    }

    /// Claim the lowest available ID.
    ///
    /// Returns `None` only when every `u32` is in use.
    pub fn allocate(&mut self) -> Option<u32> {
        let n = self.lowest_available();
        if self.add(n) {
            Some(n)
        } else {
            None
        }
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.ranges.iter().map(IdRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn ranges(&self) -> &[IdRange] {
        &self.ranges
    }

    /// Iterate members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.start..=r.end)
    }

    fn parse_token(token: &str) -> StoreResult<IdRange> {
        let parse = |s: &str| -> StoreResult<u32> {
            s.trim()
                .parse::<u32>()
                .map_err(|e| StoreError::format("NumberSet", format!("bad number {:?}: {}", s, e)))
        };

        let range = match token.split_once('-') {
            Some((a, b)) => IdRange {
                start: parse(a)?,
                end: parse(b)?,
            },
            None => {
                let n = parse(token)?;
                IdRange { start: n, end: n }
            }
        };

        if range.start == 0 {
            return Err(StoreError::format("NumberSet", "zero is not a valid ID"));
        }
        if range.end < range.start {
            return Err(StoreError::format(
                "NumberSet",
                format!("reversed range {:?}", token),
            ));
        }
        Ok(range)
    }
}

impl fmt::Display for NumberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.start == range.end {
                write!(f, "{}", range.start)?;
            } else {
                write!(f, "{}-{}", range.start, range.end)?;
            }
        }
        Ok(())
    }
}

impl FromStr for NumberSet {
    type Err = StoreError;

    /// Parse the canonical form. Ranges must be sorted and non-adjacent so
    /// that parsing and printing are exact inverses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut body = s.trim();
        if let Some(inner) = body.strip_prefix('{') {
            body = inner
                .strip_suffix('}')
                .ok_or_else(|| StoreError::format("NumberSet", "unbalanced braces"))?
                .trim();
        }

        let mut ranges: Vec<IdRange> = Vec::new();
        if body.is_empty() {
            return Ok(Self { ranges });
        }

        for token in body.split(',') {
            let range = Self::parse_token(token)?;
            if let Some(prev) = ranges.last() {
                if u64::from(range.start) <= u64::from(prev.end) + 1 {
                    return Err(StoreError::format(
                        "NumberSet",
                        format!("range {:?} overlaps or touches its predecessor", token.trim()),
                    ));
                }
            }
            ranges.push(range);
        }

        Ok(Self { ranges })
    }
}
