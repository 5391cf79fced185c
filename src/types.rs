//! Core value types: voxel points, tile sizes and tile kinds

use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse a comma-separated list of exactly `N` integers, e.g. `"10,20,30"`.
fn parse_components<const N: usize>(s: &str) -> Result<[i32; N]> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(ImportError::Parse(format!(
            "expected {} comma-separated integers, got {:?}",
            N, s
        )));
    }

    let mut out = [0i32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|e| ImportError::Parse(format!("bad component {:?} in {:?}: {}", part, s, e)))?;
    }
    Ok(out)
}

/// A 2D integer point, used for z ranges and tile sizes on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point2d(pub [i32; 2]);

impl Point2d {
    pub fn new(a: i32, b: i32) -> Self {
        Self([a, b])
    }
}

impl FromStr for Point2d {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        parse_components::<2>(s).map(Self)
    }
}

/// A 3D point in voxel units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point3d(pub [i32; 3]);

impl Point3d {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self([x, y, z])
    }

    pub fn x(&self) -> i32 {
        self.0[0]
    }

    pub fn y(&self) -> i32 {
        self.0[1]
    }

    pub fn z(&self) -> i32 {
        self.0[2]
    }

    /// Component-wise `self + size`, failing if any axis leaves `i32`
    pub fn add_size(&self, size: &Point3d) -> Result<Point3d> {
        let mut end = [0i32; 3];
        for (axis, slot) in end.iter_mut().enumerate() {
            *slot = self.0[axis].checked_add(size.0[axis]).ok_or_else(|| {
                ImportError::Parse(format!(
                    "offset {} plus size {} overflows voxel coordinates",
                    self, size
                ))
            })?;
        }
        Ok(Point3d(end))
    }

    /// True if every component of `self` is <= the matching one of `other`
    pub fn le_all(&self, other: &Point3d) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }
}

impl FromStr for Point3d {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        parse_components::<3>(s).map(Self)
    }
}

/// Formats as `x,y,z`, the offset syntax accepted by `server-add`.
impl fmt::Display for Point3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.0[0], self.0[1], self.0[2])
    }
}

/// An inclusive range of z slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZRange {
    pub min: i32,
    pub max: i32,
}

impl ZRange {
    pub fn new(min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(ImportError::Parse(format!(
                "z range start {} is past its end {}",
                min, max
            )));
        }
        if max.checked_sub(min).is_none() {
            return Err(ImportError::Parse(format!(
                "z range {},{} is too wide",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<i32> {
        self.min..=self.max
    }

    /// Number of slices in the range, both ends included
    pub fn slice_count(&self) -> usize {
        (i64::from(self.max) - i64::from(self.min)) as usize + 1
    }
}

impl FromStr for ZRange {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        let p: Point2d = s.parse()?;
        ZRange::new(p.0[0], p.0[1])
    }
}

impl fmt::Display for ZRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.min, self.max)
    }
}

/// Tile edge lengths in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: i32,
    pub height: i32,
}

impl TileSize {
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(ImportError::Parse(format!(
                "tile size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Square tiles, as used by the Raveler layout
    pub fn square(edge: i32) -> Result<Self> {
        Self::new(edge, edge)
    }
}

impl FromStr for TileSize {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        let p: Point2d = s.parse()?;
        TileSize::new(p.0[0], p.0[1])
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

/// What a tile encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// 8-bit intensity image
    Grayscale,
    /// Per-pixel segment ids (superpixels in Raveler terms)
    Label,
}

impl TileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileKind::Grayscale => "grayscale",
            TileKind::Label => "label",
        }
    }
}

impl fmt::Display for TileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point3d() {
        let p: Point3d = "10, 20,30".parse().unwrap();
        assert_eq!(p, Point3d::new(10, 20, 30));
        assert_eq!(p.to_string(), "10,20,30");

        assert!("1,2".parse::<Point3d>().is_err());
        assert!("1,2,x".parse::<Point3d>().is_err());
        assert!("".parse::<Point3d>().is_err());
    }

    #[test]
    fn test_add_size() {
        let offset = Point3d::new(100, 200, 5);
        let end = offset.add_size(&Point3d::new(50, 50, 10)).unwrap();
        assert_eq!(end, Point3d::new(150, 250, 15));
        assert!(offset.le_all(&end));
        assert!(!end.le_all(&offset));
    }

    #[test]
    fn test_add_size_overflow_is_parse_error() {
        let offset = Point3d::new(2147483000, 0, 0);
        let err = offset.add_size(&Point3d::new(1000, 0, 0)).unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));

        let low = Point3d::new(0, 0, i32::MIN);
        assert!(low.add_size(&Point3d::new(0, 0, -1)).is_err());
    }

    #[test]
    fn test_z_range() {
        let z: ZRange = "0,619".parse().unwrap();
        assert_eq!(z.slice_count(), 620);
        assert_eq!(z.iter().next(), Some(0));
        assert_eq!(z.iter().last(), Some(619));

        assert!("5,4".parse::<ZRange>().is_err());
        let single: ZRange = "7,7".parse().unwrap();
        assert_eq!(single.slice_count(), 1);
    }

    #[test]
    fn test_z_range_too_wide() {
        assert!(ZRange::new(i32::MIN, i32::MAX).is_err());
        assert!(ZRange::new(-2_000_000_000, 2_000_000_000).is_err());

        let wide = ZRange::new(-1_000_000_000, 1_000_000_000).unwrap();
        assert_eq!(wide.slice_count(), 2_000_000_001);
    }

    #[test]
    fn test_tile_size() {
        let t: TileSize = "100,200".parse().unwrap();
        assert_eq!(t.width, 100);
        assert_eq!(t.height, 200);
        assert!("0,100".parse::<TileSize>().is_err());
        assert!("-5,5".parse::<TileSize>().is_err());
    }

    #[test]
    fn test_tile_kind_names() {
        assert_eq!(TileKind::Grayscale.to_string(), "grayscale");
        assert_eq!(TileKind::Label.as_str(), "label");
    }
}
