//! Lightweight coordinate reference system tag
//!
//! TerraStat never reprojects; the CRS is carried as metadata and compared
//! when combining inputs that must share a coordinate system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate reference system identifier.
///
/// Holds an EPSG code, a WKT string, or both. Equivalence is checked by
/// EPSG code when available, falling back to exact WKT comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    epsg: Option<u32>,
    wkt: Option<String>,
}

impl Crs {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// WKT representation if known
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether two CRS tags refer to the same coordinate system.
    ///
    /// Comparison is by EPSG code when both sides carry one, otherwise by
    /// exact WKT match. Two tags with no common representation compare
    /// as not equivalent.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.epsg, &self.wkt) {
            (Some(code), _) => write!(f, "EPSG:{code}"),
            (None, Some(wkt)) => write!(f, "{wkt}"),
            (None, None) => write!(f, "unknown CRS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsg_equivalence() {
        let a = Crs::from_epsg(32719);
        let b = Crs::from_epsg(32719);
        let c = Crs::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_wkt_fallback() {
        let a = Crs::from_wkt("PROJCS[\"local\"]");
        let b = Crs::from_wkt("PROJCS[\"local\"]");
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&Crs::wgs84()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Crs::from_epsg(4326).to_string(), "EPSG:4326");
    }
}
