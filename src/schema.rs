//! Schema configuration, DDL creation, and discovery of an existing document.
//!
//! Grounded on the teacher's `ogc_sql.rs` (named SQL-fragment constants composed by a
//! top-level `initialize` function, including the R-Tree virtual-table setup) and on
//! the original engine's `database_constants.{h,cpp}` (default table/column names,
//! the `GENERAL`-table key vocabulary) and `database_discovery.cpp` (the discovery
//! flow: required `DocType`, fallback-or-not table-name lookups, column validation).

use crate::connection::DbConnection;
use crate::dimension::Dimension;
use crate::error::{Error, Result};
use crate::types::DocumentType;
use std::collections::BTreeSet;

pub const GENERAL_TABLE: &str = "GENERAL";
pub const GENERAL_COL_KEY: &str = "Key";
pub const GENERAL_COL_VALUE_STRING: &str = "ValueString";

pub const TILESINFO_TABLE_DEFAULT: &str = "TILESINFO";
pub const TILESDATA_TABLE_DEFAULT: &str = "TILESDATA";
pub const SPATIAL_INDEX_TABLE_DEFAULT: &str = "TILESSPATIALINDEX";
pub const BLOB_TABLE_DEFAULT: &str = "BLOBS";
pub const METADATA_TABLE_DEFAULT: &str = "METADATA";

pub const DIMENSION_COLUMN_PREFIX: &str = "Dim_";
pub const INDEX_FOR_DIMENSION_COLUMN_PREFIX: &str = "IndexForDim_";

/// Keys recognised in the `GENERAL` key/value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralTableItem {
    Version,
    TilesDataTable,
    TilesInfoTable,
    DocType,
    BlobTable,
    SpatialIndexTable,
    MetadataTable,
}

impl GeneralTableItem {
    pub(crate) fn key(self) -> &'static str {
        match self {
            GeneralTableItem::Version => "Version",
            GeneralTableItem::TilesDataTable => "TilesDataTable",
            GeneralTableItem::TilesInfoTable => "TilesInfoTable",
            GeneralTableItem::DocType => "DocType",
            GeneralTableItem::BlobTable => "BlobTable",
            GeneralTableItem::SpatialIndexTable => "SpatialIndexTable",
            GeneralTableItem::MetadataTable => "MetadataTable",
        }
    }
}

/// Immutable description of the concrete table/column names and declared
/// dimensions in effect for an open document. The same struct backs both the
/// 2-D and 3-D document types; axis-dependent behaviour is parameterised by
/// [`DocumentType::axis_count`] rather than duplicated.
#[derive(Debug, Clone)]
pub struct SchemaConfiguration {
    pub document_type: DocumentType,
    pub tiles_info_table: String,
    pub tiles_data_table: String,
    pub metadata_table: String,
    pub spatial_index_table: Option<String>,
    pub blob_table: Option<String>,
    pub dimensions: BTreeSet<Dimension>,
    pub indexed_dimensions: BTreeSet<Dimension>,
}

impl SchemaConfiguration {
    pub fn axis_count(&self) -> usize {
        self.document_type.axis_count()
    }

    pub fn has_spatial_index(&self) -> bool {
        self.spatial_index_table.is_some()
    }

    pub fn has_blob_table(&self) -> bool {
        self.blob_table.is_some()
    }

    /// Column names for tile position/size, one per declared axis, in X,Y[,Z] order.
    pub fn position_columns(&self) -> Vec<&'static str> {
        match self.document_type {
            DocumentType::Image2d => vec!["TileX", "TileY"],
            DocumentType::Image3d => vec!["TileX", "TileY", "TileZ"],
        }
    }

    pub fn size_columns(&self) -> Vec<&'static str> {
        match self.document_type {
            DocumentType::Image2d => vec!["TileW", "TileH"],
            DocumentType::Image3d => vec!["TileW", "TileH", "TileD"],
        }
    }
}

/// Options controlling DDL emitted for a newly-created document.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub filename: String,
    pub document_type: DocumentType,
    pub dimensions: BTreeSet<Dimension>,
    pub indexed_dimensions: BTreeSet<Dimension>,
    pub use_spatial_index: bool,
    pub use_blob_table: bool,
}

impl CreateOptions {
    pub fn new(filename: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            filename: filename.into(),
            document_type,
            dimensions: BTreeSet::new(),
            indexed_dimensions: BTreeSet::new(),
            use_spatial_index: false,
            use_blob_table: false,
        }
    }

    pub fn add_dimension(mut self, d: Dimension) -> Self {
        self.dimensions.insert(d);
        self
    }

    pub fn add_indexed_dimension(mut self, d: Dimension) -> Self {
        self.dimensions.insert(d);
        self.indexed_dimensions.insert(d);
        self
    }

    pub fn use_spatial_index(mut self, value: bool) -> Self {
        self.use_spatial_index = value;
        self
    }

    pub fn use_blob_table(mut self, value: bool) -> Self {
        self.use_blob_table = value;
        self
    }
}

/// Options controlling how an existing document is opened.
#[derive(Debug, Clone)]
pub struct OpenExistingOptions {
    pub filename: String,
    pub read_only: bool,
}

impl OpenExistingOptions {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

/// Emits DDL for a new document and returns its schema configuration.
pub fn create_schema(conn: &DbConnection, options: &CreateOptions) -> Result<SchemaConfiguration> {
    let axis_count = options.document_type.axis_count();
    let position_cols: &[&str] = if axis_count == 2 {
        &["TileX", "TileY"]
    } else {
        &["TileX", "TileY", "TileZ"]
    };
    let size_cols: &[&str] = if axis_count == 2 {
        &["TileW", "TileH"]
    } else {
        &["TileW", "TileH", "TileD"]
    };

    conn.with_scoped_transaction(|| {
        conn.raw().execute_batch(&format!(
            "CREATE TABLE {GENERAL_TABLE} ({GENERAL_COL_KEY} TEXT PRIMARY KEY, {GENERAL_COL_VALUE_STRING} TEXT);"
        ))?;

        conn.raw().execute_batch(&format!(
            "CREATE TABLE {table} (\
                Pk INTEGER PRIMARY KEY AUTOINCREMENT,\
                PixelWidth INTEGER NOT NULL,\
                PixelHeight INTEGER NOT NULL,\
                {pixel_depth}\
                PixelType INTEGER NOT NULL,\
                TileDataType INTEGER NOT NULL,\
                BinDataStorageType INTEGER NOT NULL,\
                BinDataId INTEGER\
            );",
            table = TILESDATA_TABLE_DEFAULT,
            pixel_depth = if axis_count == 3 { "PixelDepth INTEGER NOT NULL," } else { "" },
        ))?;

        let dim_columns: String = options
            .dimensions
            .iter()
            .map(|d| format!(",{} INTEGER NOT NULL", d.column_name()))
            .collect();
        conn.raw().execute_batch(&format!(
            "CREATE TABLE {table} (\
                Pk INTEGER PRIMARY KEY AUTOINCREMENT,\
                {position_decls},\
                {size_decls},\
                PyramidLevel INTEGER NOT NULL,\
                TileDataId INTEGER NOT NULL{dim_columns}\
            );",
            table = TILESINFO_TABLE_DEFAULT,
            position_decls = position_cols
                .iter()
                .map(|c| format!("{c} REAL NOT NULL"))
                .collect::<Vec<_>>()
                .join(","),
            size_decls = size_cols
                .iter()
                .map(|c| format!("{c} REAL NOT NULL"))
                .collect::<Vec<_>>()
                .join(","),
            dim_columns = dim_columns,
        ))?;

        for d in &options.indexed_dimensions {
            conn.raw().execute_batch(&format!(
                "CREATE INDEX {} ON {TILESINFO_TABLE_DEFAULT} ({});",
                d.index_name(),
                d.column_name(),
            ))?;
        }

        conn.raw().execute_batch(&format!(
            "CREATE TABLE {METADATA_TABLE_DEFAULT} (\
                Pk INTEGER PRIMARY KEY AUTOINCREMENT,\
                Name TEXT NOT NULL,\
                AncestorId INTEGER REFERENCES {METADATA_TABLE_DEFAULT}(Pk),\
                TypeDiscriminator INTEGER NOT NULL,\
                ValueDouble REAL,\
                ValueInteger INTEGER,\
                ValueString TEXT,\
                UNIQUE(Name, AncestorId)\
            );"
        ))?;

        if options.use_blob_table {
            conn.raw().execute_batch(&format!(
                "CREATE TABLE {BLOB_TABLE_DEFAULT} (Pk INTEGER PRIMARY KEY AUTOINCREMENT, Data BLOB);"
            ))?;
        }

        if options.use_spatial_index {
            let rtree_cols = if axis_count == 2 {
                "minX,maxX,minY,maxY"
            } else {
                "minX,maxX,minY,maxY,minZ,maxZ"
            };
            conn.raw().execute_batch(&format!(
                "CREATE VIRTUAL TABLE {SPATIAL_INDEX_TABLE_DEFAULT} USING rtree(id,{rtree_cols});"
            ))?;
        }

        let mut insert_general = conn.raw().prepare(&format!(
            "INSERT INTO {GENERAL_TABLE} ({GENERAL_COL_KEY},{GENERAL_COL_VALUE_STRING}) VALUES (?1,?2)"
        ))?;
        insert_general.execute(rusqlite::params![GeneralTableItem::Version.key(), "1"])?;
        insert_general.execute(rusqlite::params![
            GeneralTableItem::TilesDataTable.key(),
            TILESDATA_TABLE_DEFAULT
        ])?;
        insert_general.execute(rusqlite::params![
            GeneralTableItem::TilesInfoTable.key(),
            TILESINFO_TABLE_DEFAULT
        ])?;
        insert_general.execute(rusqlite::params![
            GeneralTableItem::MetadataTable.key(),
            METADATA_TABLE_DEFAULT
        ])?;
        insert_general.execute(rusqlite::params![
            GeneralTableItem::DocType.key(),
            options.document_type.as_doc_type_str()
        ])?;
        if options.use_blob_table {
            insert_general.execute(rusqlite::params![
                GeneralTableItem::BlobTable.key(),
                BLOB_TABLE_DEFAULT
            ])?;
        }
        if options.use_spatial_index {
            insert_general.execute(rusqlite::params![
                GeneralTableItem::SpatialIndexTable.key(),
                SPATIAL_INDEX_TABLE_DEFAULT
            ])?;
        }

        Ok(())
    })?;

    Ok(SchemaConfiguration {
        document_type: options.document_type,
        tiles_info_table: TILESINFO_TABLE_DEFAULT.to_string(),
        tiles_data_table: TILESDATA_TABLE_DEFAULT.to_string(),
        metadata_table: METADATA_TABLE_DEFAULT.to_string(),
        spatial_index_table: options
            .use_spatial_index
            .then(|| SPATIAL_INDEX_TABLE_DEFAULT.to_string()),
        blob_table: options
            .use_blob_table
            .then(|| BLOB_TABLE_DEFAULT.to_string()),
        dimensions: options.dimensions.clone(),
        indexed_dimensions: options.indexed_dimensions.clone(),
    })
}

fn read_general_value(conn: &DbConnection, item: GeneralTableItem) -> Result<Option<String>> {
    conn.raw()
        .query_row(
            &format!(
                "SELECT {GENERAL_COL_VALUE_STRING} FROM {GENERAL_TABLE} WHERE {GENERAL_COL_KEY}=?1"
            ),
            [item.key()],
            |row| row.get(0),
        )
        .optional_compat()
}

/// `rusqlite::Error::QueryReturnedNoRows` means "absent"; translate to `Option::None`
/// rather than an error, matching the discoverer's fallback semantics.
trait OptionalCompat<T> {
    fn optional_compat(self) -> Result<Option<T>>;
}

impl<T> OptionalCompat<T> for rusqlite::Result<T> {
    fn optional_compat(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads the `GENERAL` table of an existing file, determines the document type,
/// validates required columns, and infers declared/indexed dimensions.
pub fn discover_schema(conn: &DbConnection) -> Result<SchemaConfiguration> {
    if !conn.table_exists(GENERAL_TABLE)? {
        return Err(Error::Discovery(format!(
            "general table '{GENERAL_TABLE}' not found"
        )));
    }

    let doc_type_str = read_general_value(conn, GeneralTableItem::DocType)?.ok_or_else(|| {
        Error::Discovery("GENERAL table has no 'DocType' entry".to_string())
    })?;
    let document_type = DocumentType::from_doc_type_str(&doc_type_str).ok_or_else(|| {
        Error::Discovery(format!("unrecognised DocType '{doc_type_str}'"))
    })?;

    let tiles_info_table = read_general_value(conn, GeneralTableItem::TilesInfoTable)?
        .unwrap_or_else(|| TILESINFO_TABLE_DEFAULT.to_string());
    let tiles_data_table = read_general_value(conn, GeneralTableItem::TilesDataTable)?
        .unwrap_or_else(|| TILESDATA_TABLE_DEFAULT.to_string());
    let metadata_table = read_general_value(conn, GeneralTableItem::MetadataTable)?
        .unwrap_or_else(|| METADATA_TABLE_DEFAULT.to_string());

    // Unlike the tiles-info/tiles-data/metadata tables, blob and spatial-index
    // tables have no default fallback: absence of the key means "not configured".
    let blob_table = read_general_value(conn, GeneralTableItem::BlobTable)?;
    let spatial_index_table = read_general_value(conn, GeneralTableItem::SpatialIndexTable)?;

    for (table, required) in [
        (tiles_info_table.as_str(), &["Pk", "PyramidLevel", "TileDataId"][..]),
        (tiles_data_table.as_str(), &["Pk", "PixelWidth", "PixelHeight", "TileDataType"][..]),
        (metadata_table.as_str(), &["Pk", "Name", "AncestorId", "TypeDiscriminator"][..]),
    ] {
        let columns = conn.table_columns(table)?;
        if columns.is_empty() {
            return Err(Error::Discovery(format!("table '{table}' not found")));
        }
        for col in required {
            if !columns.iter().any(|c| c == col) {
                return Err(Error::Discovery(format!(
                    "table '{table}' is missing expected column '{col}'"
                )));
            }
        }
    }

    let info_columns = conn.table_columns(&tiles_info_table)?;
    let mut dimensions = BTreeSet::new();
    for col in &info_columns {
        if let Some(rest) = col.strip_prefix(DIMENSION_COLUMN_PREFIX) {
            let mut chars = rest.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if let Ok(d) = Dimension::new(c) {
                    dimensions.insert(d);
                }
            }
        }
    }

    let info_indices = conn.table_indices(&tiles_info_table)?;
    let mut indexed_dimensions = BTreeSet::new();
    for idx in &info_indices {
        if let Some(rest) = idx.strip_prefix(INDEX_FOR_DIMENSION_COLUMN_PREFIX) {
            let mut chars = rest.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if let Ok(d) = Dimension::new(c) {
                    if dimensions.contains(&d) {
                        indexed_dimensions.insert(d);
                    }
                }
            }
        }
    }

    let spatial_index_table = match spatial_index_table {
        Some(name) if conn.table_exists(&name)? => Some(name),
        _ => None,
    };
    let blob_table = match blob_table {
        Some(name) if conn.table_exists(&name)? => Some(name),
        _ => None,
    };

    Ok(SchemaConfiguration {
        document_type,
        tiles_info_table,
        tiles_data_table,
        metadata_table,
        spatial_index_table,
        blob_table,
        dimensions,
        indexed_dimensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_options() -> CreateOptions {
        CreateOptions::new(":memory:", DocumentType::Image2d)
            .add_indexed_dimension(Dimension::new('C').unwrap())
            .add_dimension(Dimension::new('T').unwrap())
            .use_spatial_index(true)
            .use_blob_table(true)
    }

    #[test]
    fn create_then_discover_round_trips() {
        let conn = DbConnection::open(":memory:").unwrap();
        let created = create_schema(&conn, &sample_options()).unwrap();
        let discovered = discover_schema(&conn).unwrap();
        assert_eq!(discovered.document_type, created.document_type);
        assert_eq!(discovered.dimensions, created.dimensions);
        assert_eq!(discovered.indexed_dimensions, created.indexed_dimensions);
        assert!(discovered.has_spatial_index());
        assert!(discovered.has_blob_table());
    }

    #[test]
    fn discovery_fails_without_doc_type() {
        let conn = DbConnection::open(":memory:").unwrap();
        conn.raw()
            .execute_batch(&format!(
                "CREATE TABLE {GENERAL_TABLE} ({GENERAL_COL_KEY} TEXT PRIMARY KEY, {GENERAL_COL_VALUE_STRING} TEXT);"
            ))
            .unwrap();
        assert!(discover_schema(&conn).is_err());
    }

    #[test]
    fn create_3d_without_spatial_index() {
        let conn = DbConnection::open(":memory:").unwrap();
        let options = CreateOptions::new(":memory:", DocumentType::Image3d)
            .add_dimension(Dimension::new('Z').unwrap());
        let created = create_schema(&conn, &options).unwrap();
        assert!(!created.has_spatial_index());
        assert!(!created.has_blob_table());
        let discovered = discover_schema(&conn).unwrap();
        assert_eq!(discovered.document_type, DocumentType::Image3d);
    }
}
