//! Engine-wide constants
//!
//! Tunable defaults live here so the config layer and the geometry passes
//! agree on one value.

/// Normal smoothing
pub mod smoothing {
    /// Largest facet-to-facet angle that still smooths. A vertex normal may
    /// move by at most half of this from its flat value.
    pub const DEFAULT_SMOOTH_ANGLE_DEGREES: f32 = 80.0;

    /// Tolerance used when matching a shape edge against a conditional line.
    pub const CONDITIONAL_MATCH_EPSILON: f32 = 0.01;
}

/// Color handling
pub mod color {
    /// Colors with an alpha byte below this are drawn in the transparent pass.
    pub const DEFAULT_TRANSPARENT_ALPHA_THRESHOLD: u8 = 240;

    /// Light gray used for geometry no instance colors.
    pub const DEFAULT_COLOR: u32 = 0x9BA1_9DFF;

    /// Opaque white, used for texmapped triangles.
    pub const WHITE: u32 = 0xFFFF_FFFF;

    /// Returns the alpha byte of a packed `0xRRGGBBAA` color.
    #[inline]
    pub const fn alpha(color: u32) -> u8 {
        (color & 0xFF) as u8
    }

    /// Unpacks a `0xRRGGBBAA` color into normalized RGBA.
    #[inline]
    pub fn to_rgba(color: u32) -> [f32; 4] {
        [
            ((color >> 24) & 0xFF) as f32 / 255.0,
            ((color >> 16) & 0xFF) as f32 / 255.0,
            ((color >> 8) & 0xFF) as f32 / 255.0,
            (color & 0xFF) as f32 / 255.0,
        ]
    }
}

/// Background work scheduling
pub mod workers {
    /// Number of buckets the conditional-line visibility work is split into.
    pub const CONDITIONAL_BUCKETS: usize = 32;

    /// Polling interval for idle workers. Only guards against missed wakeups.
    pub const IDLE_POLL_MS: u64 = 100;
}

/// Depth offsets
pub mod polygon_offset {
    /// Offset applied to solids so lines drawn on their edges stay visible.
    pub const SOLID_FACTOR: f32 = 1.0;
    pub const SOLID_UNITS: f32 = 1.0;

    /// Offset applied to texture overlays drawn on top of their base polygons.
    pub const TEXMAP_FACTOR: f32 = -1.0;
    pub const TEXMAP_UNITS: f32 = -1.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_extraction() {
        assert_eq!(color::alpha(0xFF00_0080), 0x80);
        assert_eq!(color::alpha(color::WHITE), 0xFF);
    }

    #[test]
    fn test_to_rgba() {
        let rgba = color::to_rgba(0xFF00_00FF);
        assert_eq!(rgba, [1.0, 0.0, 0.0, 1.0]);
    }
}
