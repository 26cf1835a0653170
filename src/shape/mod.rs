//! Shape groups: index lists per primitive kind over shared vertex stores,
//! plus the transparent and texmapped buckets.

pub mod conditional_operations;
pub mod shape_group_data;
pub mod shape_group_operations;
pub mod shape_types;
pub mod texmapped_operations;
pub mod transfer_operations;
pub mod transparent_operations;
pub mod winding_operations;

pub use shape_group_data::{
    ShapeGroupData, ShapeGroupKind, SortedTriangle, TexmappedGroupData, TexturedRange,
    TransferRecords, TransparentSortData,
};
pub use shape_types::{Section, ShapeType, SECTION_COUNT, SHAPE_TYPE_COUNT};
pub use transfer_operations::{TransferKind, TransferTriangle};
