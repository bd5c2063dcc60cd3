use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed interval of unix epoch seconds. `start == end` is a single
/// timestamp. `Extent::NONE` is the canonical empty interval; every
/// operation that would otherwise produce an inverted range returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Extent {
    pub start: i64,
    pub end: i64,
}

impl Extent {
    pub const NONE: Extent = Extent { start: 0, end: -1 };

    pub fn new(start: i64, end: i64) -> Extent {
        if end < start {
            Extent::NONE
        } else {
            Extent { start, end }
        }
    }

    pub fn single(at: i64) -> Extent {
        Extent { start: at, end: at }
    }

    pub fn is_none(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, ts: i64) -> bool {
        !self.is_none() && ts >= self.start && ts <= self.end
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        !self.is_none()
            && !other.is_none()
            && self.start <= other.end
            && other.start <= self.end
    }

    /// Clip to `bound`. Disjoint inputs yield `Extent::NONE`.
    pub fn crop(&self, bound: &Extent) -> Extent {
        if !self.intersects(bound) {
            return Extent::NONE;
        }
        Extent {
            start: self.start.max(bound.start),
            end: self.end.min(bound.end),
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// An ordered list of extents. Lists read back from storage may arrive
/// unsorted and overlapping; `compress` restores the invariant: ascending
/// by start, non-overlapping, neighbors separated by more than one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentList(Vec<Extent>);

impl ExtentList {
    pub fn new() -> ExtentList {
        ExtentList(Vec::new())
    }

    pub fn push(&mut self, extent: Extent) {
        if !extent.is_none() {
            self.0.push(extent);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Extent> {
        self.0.iter()
    }

    pub fn oldest_start(&self) -> Option<i64> {
        self.0.iter().map(|e| e.start).min()
    }

    pub fn newest_end(&self) -> Option<i64> {
        self.0.iter().map(|e| e.end).max()
    }

    /// Sort ascending by start and merge every entry that overlaps or is
    /// within one `step` of its predecessor. Idempotent.
    pub fn compress(&mut self, step: i64) {
        self.0.retain(|e| !e.is_none());
        if self.0.len() < 2 {
            return;
        }
        self.0.sort_unstable();
        let mut merged: Vec<Extent> = Vec::with_capacity(self.0.len());
        for extent in self.0.drain(..) {
            match merged.last_mut() {
                Some(last) if extent.start <= last.end.saturating_add(step) => {
                    if extent.end > last.end {
                        last.end = extent.end;
                    }
                }
                _ => merged.push(extent),
            }
        }
        self.0 = merged;
    }

    /// Clip every entry to `bound`; entries fully outside are dropped.
    pub fn crop(&mut self, bound: &Extent) {
        let mut cropped: Vec<Extent> = Vec::with_capacity(self.0.len());
        for extent in self.0.drain(..) {
            let clipped = extent.crop(bound);
            if !clipped.is_none() {
                cropped.push(clipped);
            }
        }
        self.0 = cropped;
    }
}

impl From<Vec<Extent>> for ExtentList {
    fn from(extents: Vec<Extent>) -> ExtentList {
        let mut list = ExtentList::new();
        for extent in extents {
            list.push(extent);
        }
        list
    }
}

impl<'a> IntoIterator for &'a ExtentList {
    type Item = &'a Extent;
    type IntoIter = std::slice::Iter<'a, Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
