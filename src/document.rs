//! The `Document` aggregate: owns the connection and schema configuration,
//! vends type-gated reader/writer/metadata handles.
//!
//! Single-threaded per document, matching the non-goal of multi-writer
//! concurrency: reader/writer/metadata handles borrow the document rather than
//! sharing ownership across threads, the way the teacher's `Gpkg`/`GpkgLayer`
//! pair borrows a single `rusqlite::Connection`.

use crate::connection::DbConnection;
use crate::doc2d::{Reader2d, Writer2d};
use crate::doc3d::{Reader3d, Writer3d};
use crate::environment::{DefaultEnvironment, HostingEnvironment};
use crate::error::Result;
use crate::metadata;
use crate::metadata::{ItemFlags, MetadataItem, Value};
use crate::schema::{create_schema, discover_schema, CreateOptions, OpenExistingOptions, SchemaConfiguration};
use crate::types::DocumentType;
use std::sync::Arc;

pub struct Document {
    conn: DbConnection,
    schema: SchemaConfiguration,
    env: Arc<dyn HostingEnvironment>,
}

impl Document {
    pub fn create_new(options: &CreateOptions) -> Result<Self> {
        Self::create_new_with_environment(options, Arc::new(DefaultEnvironment))
    }

    pub fn create_new_with_environment(
        options: &CreateOptions,
        env: Arc<dyn HostingEnvironment>,
    ) -> Result<Self> {
        let conn = DbConnection::open(&options.filename)?;
        let schema = create_schema(&conn, options)?;
        Ok(Self { conn, schema, env })
    }

    pub fn open_existing(options: &OpenExistingOptions) -> Result<Self> {
        Self::open_existing_with_environment(options, Arc::new(DefaultEnvironment))
    }

    pub fn open_existing_with_environment(
        options: &OpenExistingOptions,
        env: Arc<dyn HostingEnvironment>,
    ) -> Result<Self> {
        let conn = if options.read_only {
            DbConnection::open_read_only(&options.filename)?
        } else {
            DbConnection::open(&options.filename)?
        };
        let schema = discover_schema(&conn)?;
        Ok(Self { conn, schema, env })
    }

    pub fn document_type(&self) -> DocumentType {
        self.schema.document_type
    }

    pub fn schema(&self) -> &SchemaConfiguration {
        &self.schema
    }

    /// Returns a 2-D reader, or `None` if this document is not a 2-D document.
    pub fn reader_2d(&self) -> Option<Reader2d<'_>> {
        (self.schema.document_type == DocumentType::Image2d)
            .then(|| Reader2d::new(&self.conn, &self.schema, self.env.as_ref()))
    }

    pub fn writer_2d(&self) -> Option<Writer2d<'_>> {
        (self.schema.document_type == DocumentType::Image2d)
            .then(|| Writer2d::new(&self.conn, &self.schema, self.env.as_ref()))
    }

    pub fn reader_3d(&self) -> Option<Reader3d<'_>> {
        (self.schema.document_type == DocumentType::Image3d)
            .then(|| Reader3d::new(&self.conn, &self.schema, self.env.as_ref()))
    }

    pub fn writer_3d(&self) -> Option<Writer3d<'_>> {
        (self.schema.document_type == DocumentType::Image3d)
            .then(|| Writer3d::new(&self.conn, &self.schema, self.env.as_ref()))
    }

    pub fn metadata(&self) -> MetadataHandle<'_> {
        MetadataHandle { document: self }
    }
}

/// Handle vending the document-metadata operations against this document's
/// metadata table.
pub struct MetadataHandle<'a> {
    document: &'a Document,
}

impl<'a> MetadataHandle<'a> {
    fn table(&self) -> &str {
        &self.document.schema.metadata_table
    }

    pub fn get_item(&self, pk: i64, flags: ItemFlags) -> Result<MetadataItem> {
        metadata::get_item(&self.document.conn, self.table(), pk, flags)
    }

    pub fn get_item_for_path(&self, path: &str, flags: ItemFlags) -> Result<MetadataItem> {
        metadata::get_item_for_path(&self.document.conn, self.table(), path, flags)
    }

    pub fn enumerate_items(
        &self,
        parent: Option<i64>,
        recursive: bool,
        flags: ItemFlags,
        callback: impl FnMut(MetadataItem) -> bool,
    ) -> Result<()> {
        metadata::enumerate_items(&self.document.conn, self.table(), parent, recursive, flags, callback)
    }

    pub fn enumerate_items_for_path(
        &self,
        path: &str,
        recursive: bool,
        flags: ItemFlags,
        callback: impl FnMut(MetadataItem) -> bool,
    ) -> Result<()> {
        metadata::enumerate_items_for_path(&self.document.conn, self.table(), path, recursive, flags, callback)
    }

    pub fn update_or_create_item(
        &self,
        parent: Option<i64>,
        create_if_missing: bool,
        name: &str,
        value: &Value,
    ) -> Result<i64> {
        metadata::update_or_create_item(&self.document.conn, self.table(), parent, create_if_missing, name, value)
    }

    pub fn update_or_create_item_for_path(
        &self,
        path: &str,
        create_path_if_missing: bool,
        create_node_if_missing: bool,
        value: &Value,
    ) -> Result<i64> {
        metadata::update_or_create_item_for_path(
            &self.document.conn,
            self.table(),
            path,
            create_path_if_missing,
            create_node_if_missing,
            value,
        )
    }

    pub fn delete_item(&self, pk: Option<i64>, recursive: bool) -> Result<u64> {
        metadata::delete_item(&self.document.conn, self.table(), pk, recursive)
    }

    pub fn delete_item_for_path(&self, path: &str, recursive: bool) -> Result<u64> {
        metadata::delete_item_for_path(&self.document.conn, self.table(), path, recursive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dimension;
    use crate::error::Error;

    #[test]
    fn wrong_axis_reader_is_none() {
        let options = CreateOptions::new(":memory:", DocumentType::Image2d);
        let doc = Document::create_new(&options).unwrap();
        assert!(doc.reader_2d().is_some());
        assert!(doc.reader_3d().is_none());
        assert!(doc.writer_3d().is_none());
    }

    #[test]
    fn metadata_handle_roundtrip() {
        let options = CreateOptions::new(":memory:", DocumentType::Image2d);
        let doc = Document::create_new(&options).unwrap();
        let meta = doc.metadata();
        let pk = meta
            .update_or_create_item_for_path("a/b", true, true, &Value::Int32(7))
            .unwrap();
        let item = meta.get_item(pk, ItemFlags::all()).unwrap();
        assert_eq!(item.value, Some(Value::Int32(7)));
    }

    #[test]
    fn open_nonexistent_general_table_fails_discovery() {
        let options = OpenExistingOptions::new(":memory:");
        assert!(Document::open_existing(&options).is_err());
    }

    #[test]
    fn dimensions_not_in_schema_are_rejected_at_write() {
        let options = CreateOptions::new(":memory:", DocumentType::Image2d);
        let doc = Document::create_new(&options).unwrap();
        let writer = doc.writer_2d().unwrap();
        let coord = TileCoordinateWithUnknownDim::make();
        let info = crate::types::TileInfo2d {
            position: crate::types::LogicalPosition2d {
                pos_x: 0.0,
                pos_y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            pyramid_level: 0,
        };
        let err = writer
            .add_tile(
                &coord,
                &info,
                1,
                1,
                crate::types::PixelType(0),
                crate::types::DataType::ZERO,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    struct TileCoordinateWithUnknownDim;
    impl TileCoordinateWithUnknownDim {
        fn make() -> crate::dimension::TileCoordinate {
            let mut c = crate::dimension::TileCoordinate::new();
            c.set(Dimension::new('Q').unwrap(), 1);
            c
        }
    }
}
