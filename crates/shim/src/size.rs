use std::cmp::Ordering;
use std::fmt;

/// Relative tolerance used when comparing `width / height` ratios.
pub const ASPECT_RATIO_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// True when `self` covers `other` in both dimensions.
    pub fn covers(&self, other: Size) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Total ordering by area; equal areas are broken by width.
///
/// Only identical sizes compare `Equal`.
pub fn cmp_by_area(a: &Size, b: &Size) -> Ordering {
    a.area()
        .cmp(&b.area())
        .then_with(|| a.width.cmp(&b.width))
        .then_with(|| a.height.cmp(&b.height))
}

pub fn largest_by_area(sizes: &[Size]) -> Option<Size> {
    sizes.iter().copied().max_by(cmp_by_area)
}

pub fn aspect_ratios_match(a: Size, b: Size) -> bool {
    (a.aspect_ratio() - b.aspect_ratio()).abs() < ASPECT_RATIO_TOLERANCE
}

/// Preview frame-rate range in legacy units (frames per second x 1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.min, self.max)
    }
}
