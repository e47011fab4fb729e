//! Small value types shared across the read/write engines: document kind, tile
//! encoding tags, and the geometric primitives used by the query builder.

/// Which of the two parallel schema configurations a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Image2d,
    Image3d,
}

impl DocumentType {
    pub fn axis_count(self) -> usize {
        match self {
            DocumentType::Image2d => 2,
            DocumentType::Image3d => 3,
        }
    }

    pub(crate) fn as_doc_type_str(self) -> &'static str {
        match self {
            DocumentType::Image2d => "Tiles2D",
            DocumentType::Image3d => "Bricks3D",
        }
    }

    pub(crate) fn from_doc_type_str(s: &str) -> Option<Self> {
        match s {
            "Tiles2D" => Some(DocumentType::Image2d),
            "Bricks3D" => Some(DocumentType::Image3d),
            _ => None,
        }
    }
}

/// Opaque-to-the-storage-engine tile/brick encoding tag. Well-known members are
/// recognised by the external codec; any other value passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType(pub u8);

impl DataType {
    pub const ZERO: DataType = DataType(0);
    pub const UNCOMPRESSED: DataType = DataType(1);
    pub const JPEGXR: DataType = DataType(2);
    pub const ZSTD0: DataType = DataType(3);
    pub const ZSTD1: DataType = DataType(4);
    pub const UNCOMPRESSED_BRICK: DataType = DataType(5);

    pub fn has_payload(self) -> bool {
        self != Self::ZERO
    }
}

/// Opaque-to-the-storage-engine pixel type tag; meaningful only to the external codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelType(pub u8);

/// Where a tile/brick's payload bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// No payload; `DataType::ZERO` implies this.
    None,
    /// Payload bytes live in the blob table, referenced by foreign key.
    BlobInDatabase,
}

/// Geometric/pixel extent and encoding info for a 2-D tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBaseInfo {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_type: PixelType,
}

/// Geometric/pixel extent and encoding info for a 3-D brick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrickBaseInfo {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_depth: u32,
    pub pixel_type: PixelType,
}

/// Position and size of a tile in the continuous logical coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalPosition2d {
    pub pos_x: f64,
    pub pos_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Position and size of a brick in the continuous logical coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalPosition3d {
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// Combined tile-info used when adding a 2-D tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInfo2d {
    pub position: LogicalPosition2d,
    pub pyramid_level: i32,
}

/// Combined tile-info used when adding a 3-D brick.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInfo3d {
    pub position: LogicalPosition3d,
    pub pyramid_level: i32,
}

/// Blob-table lookup result for a tile/brick's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBlobInfo {
    pub data_type: DataType,
    pub storage_type: StorageType,
}

/// Axis-aligned rectangle used for 2-D intersection queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned cuboid used for 3-D intersection queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cuboid {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// A plane in 3-D, `n . p = d`, used for the non-indexed plane-intersection predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Normal3d,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Comparison operators available to a tile-info query clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperator {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
        }
    }
}

/// Logical operator joining successive tile-info conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}
