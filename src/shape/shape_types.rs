//! Primitive kinds and model sections

use crate::renderer::Primitive;

pub const SHAPE_TYPE_COUNT: usize = 7;
pub const SECTION_COUNT: usize = 8;

/// Primitive kinds a shape group can hold. Strip kinds come last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeType {
    Line,
    Triangle,
    Quad,
    ConditionalLine,
    TriangleStrip,
    QuadStrip,
    TriangleFan,
}

impl ShapeType {
    pub const ALL: [ShapeType; SHAPE_TYPE_COUNT] = [
        ShapeType::Line,
        ShapeType::Triangle,
        ShapeType::Quad,
        ShapeType::ConditionalLine,
        ShapeType::TriangleStrip,
        ShapeType::QuadStrip,
        ShapeType::TriangleFan,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    #[inline]
    pub const fn is_strip(self) -> bool {
        matches!(
            self,
            ShapeType::TriangleStrip | ShapeType::QuadStrip | ShapeType::TriangleFan
        )
    }

    /// Points per primitive for flat kinds, zero for strips
    pub const fn points(self) -> usize {
        match self {
            ShapeType::Line | ShapeType::ConditionalLine => 2,
            ShapeType::Triangle => 3,
            ShapeType::Quad => 4,
            _ => 0,
        }
    }

    pub const fn is_line(self) -> bool {
        matches!(self, ShapeType::Line | ShapeType::ConditionalLine)
    }

    /// Kinds that can carry a texture map
    pub const fn is_texmappable(self) -> bool {
        matches!(
            self,
            ShapeType::Triangle | ShapeType::Quad | ShapeType::TriangleStrip | ShapeType::QuadStrip
        )
    }

    pub const fn primitive(self) -> Primitive {
        match self {
            ShapeType::Line | ShapeType::ConditionalLine => Primitive::Lines,
            ShapeType::Triangle => Primitive::Triangles,
            ShapeType::Quad => Primitive::Quads,
            ShapeType::TriangleStrip => Primitive::TriangleStrip,
            ShapeType::QuadStrip => Primitive::QuadStrip,
            ShapeType::TriangleFan => Primitive::TriangleFan,
        }
    }
}

/// Per-model geometry buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Standard,
    Lines,
    EdgeLines,
    ConditionalLines,
    Stud,
    Bfc,
    StudBfc,
    Transparent,
}

impl Section {
    pub const ALL: [Section; SECTION_COUNT] = [
        Section::Standard,
        Section::Lines,
        Section::EdgeLines,
        Section::ConditionalLines,
        Section::Stud,
        Section::Bfc,
        Section::StudBfc,
        Section::Transparent,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub const fn is_line(self) -> bool {
        matches!(self, Section::Lines | Section::EdgeLines)
    }

    /// Sections drawn in the edge color of a colored instance
    pub const fn uses_edge_color(self) -> bool {
        matches!(self, Section::EdgeLines | Section::ConditionalLines)
    }

    pub const fn is_bfc(self) -> bool {
        matches!(self, Section::Bfc | Section::StudBfc)
    }

    pub const fn is_stud(self) -> bool {
        matches!(self, Section::Stud | Section::StudBfc)
    }

    /// Sections that smoothing folds face normals from
    pub const fn is_smoothable(self) -> bool {
        matches!(self, Section::Standard | Section::Bfc)
    }

    /// Sections whose geometry can move to the transparent bucket
    pub const fn is_transferable(self) -> bool {
        matches!(
            self,
            Section::Standard | Section::Stud | Section::Bfc | Section::StudBfc
        )
    }
}
