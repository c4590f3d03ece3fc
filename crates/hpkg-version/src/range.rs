//! Half-open version ranges.

use std::fmt;

use crate::error::{Result, VersionError};
use crate::standard::StandardVersion;
use crate::version::Version;

/// The range `[lo, hi)`. A missing bound is unbounded.
///
/// Ranges are written `a:b` with an upper bound that includes every
/// version prefixed by `b`, so the stored `hi` is `b.successor()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    lo: Option<StandardVersion>,
    hi: Option<StandardVersion>,
}

impl VersionRange {
    /// The range admitting every version.
    pub fn any() -> Self {
        VersionRange { lo: None, hi: None }
    }

    /// Build `lo:hi` where `hi` is inclusive by prefix.
    pub fn new(lo: Option<StandardVersion>, hi: Option<StandardVersion>) -> Result<Self> {
        if let (Some(l), Some(h)) = (&lo, &hi) {
            if l > h && !l.has_prefix(h) {
                return Err(VersionError::EmptyRange {
                    lo: l.to_string(),
                    hi: h.to_string(),
                });
            }
        }
        Ok(VersionRange {
            lo,
            hi: hi.map(|h| h.successor()),
        })
    }

    /// Build `[lo, hi)` from explicit bounds.
    pub fn half_open(lo: Option<StandardVersion>, hi: Option<StandardVersion>) -> Self {
        VersionRange { lo, hi }
    }

    /// The family of versions prefixed by `v` (what `@1.2` means).
    pub fn prefix(v: StandardVersion) -> Self {
        let hi = v.successor();
        VersionRange {
            lo: Some(v),
            hi: Some(hi),
        }
    }

    /// Parse `lo:hi`, `lo:`, `:hi`, `:` or a bare prefix.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let Some((lo, hi)) = input.split_once(':') else {
            return Ok(VersionRange::prefix(StandardVersion::parse(input)?));
        };
        let bound = |s: &str| -> Result<Option<StandardVersion>> {
            if s.is_empty() {
                Ok(None)
            } else {
                StandardVersion::parse(s).map(Some)
            }
        };
        VersionRange::new(bound(lo)?, bound(hi)?)
    }

    pub fn lo(&self) -> Option<&StandardVersion> {
        self.lo.as_ref()
    }

    /// Exclusive upper bound.
    pub fn hi(&self) -> Option<&StandardVersion> {
        self.hi.as_ref()
    }

    pub fn is_any(&self) -> bool {
        self.lo.is_none() && self.hi.is_none()
    }

    /// Whether a standard version lies inside the range.
    pub fn contains_standard(&self, v: &StandardVersion) -> bool {
        self.lo.as_ref().map_or(true, |lo| lo <= v) && self.hi.as_ref().map_or(true, |hi| v < hi)
    }

    /// Whether a concrete version lies inside the range. Git refs are placed
    /// by their resolved anchor; unresolved refs are never inside.
    pub fn contains(&self, v: &Version) -> bool {
        v.effective().is_some_and(|e| self.contains_standard(e))
    }

    fn max_lo<'a>(&'a self, other: &'a Self) -> Option<&'a StandardVersion> {
        match (&self.lo, &other.lo) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.as_ref().or(b.as_ref()),
        }
    }

    fn min_hi<'a>(&'a self, other: &'a Self) -> Option<&'a StandardVersion> {
        match (&self.hi, &other.hi) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.as_ref().or(b.as_ref()),
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        match (self.max_lo(other), self.min_hi(other)) {
            (Some(lo), Some(hi)) => lo < hi,
            _ => true,
        }
    }

    /// Overlapping or directly adjoining.
    pub fn touches(&self, other: &Self) -> bool {
        match (self.max_lo(other), self.min_hi(other)) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        }
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(VersionRange {
            lo: self.max_lo(other).cloned(),
            hi: self.min_hi(other).cloned(),
        })
    }

    /// Smallest range covering both. Only meaningful when they touch.
    pub fn hull(&self, other: &Self) -> Self {
        let lo = match (&self.lo, &other.lo) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            _ => None,
        };
        let hi = match (&self.hi, &other.hi) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            _ => None,
        };
        VersionRange { lo, hi }
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        let lo_ok = match (&self.lo, &other.lo) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => b <= a,
        };
        let hi_ok = match (&self.hi, &other.hi) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        };
        lo_ok && hi_ok
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hi = self.hi.as_ref().map(|h| h.predecessor().unwrap_or_else(|| h.clone()));
        match (&self.lo, &hi) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "{lo}"),
            (lo, hi) => {
                if let Some(lo) = lo {
                    write!(f, "{lo}")?;
                }
                write!(f, ":")?;
                if let Some(hi) = hi {
                    write!(f, "{hi}")?;
                }
                Ok(())
            }
        }
    }
}
