//! Public 2-D reader/writer surface: a thin, type-safe facade over [`TileEngine`]
//! that speaks in [`TileInfo2d`]/[`Rectangle`] rather than bare axis vectors.

use crate::connection::DbConnection;
use crate::dimension::{Dimension, TileCoordinate};
use crate::engine::{Extent, PixelGeometry, TileEngine, TileInfoRow};
use crate::environment::HostingEnvironment;
use crate::error::Result;
use crate::query::WhereClause;
use crate::schema::SchemaConfiguration;
use crate::types::{DataType, PixelType, Rectangle, TileInfo2d};

pub struct Reader2d<'a> {
    engine: TileEngine<'a>,
}

pub struct Writer2d<'a> {
    engine: TileEngine<'a>,
}

impl<'a> Reader2d<'a> {
    pub fn new(conn: &'a DbConnection, schema: &'a SchemaConfiguration, env: &'a dyn HostingEnvironment) -> Self {
        Self {
            engine: TileEngine::new(conn, schema, env),
        }
    }

    pub fn query(&self, where_clause: &WhereClause, callback: impl FnMut(i64) -> bool) -> Result<()> {
        self.engine.query(where_clause, callback)
    }

    pub fn get_tiles_intersecting_rect(
        &self,
        rect: Rectangle,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        self.engine.get_tiles_intersecting_rect(rect, extra, callback)
    }

    pub fn read_tile_info(
        &self,
        pk: i64,
        with_coordinate: bool,
        with_position: bool,
        with_blob_info: bool,
    ) -> Result<TileInfoRow> {
        self.engine
            .read_tile_info(pk, with_coordinate, with_position, with_blob_info)
    }

    pub fn read_tile_data(&self, pk: i64, sink: impl FnMut(&[u8])) -> Result<()> {
        self.engine.read_tile_data(pk, sink)
    }

    pub fn get_tile_dimensions(&self) -> Vec<Dimension> {
        self.engine.get_tile_dimensions()
    }

    pub fn get_min_max_for_tile_dimension(
        &self,
        dims: &[Dimension],
    ) -> Result<Vec<(Dimension, Option<(i32, i32)>)>> {
        self.engine.get_min_max_for_tile_dimension(dims)
    }

    pub fn get_tiles_bounding_box(&self) -> Result<Option<Rectangle>> {
        self.engine.get_tiles_bounding_box()
    }

    pub fn get_total_tile_count(&self) -> Result<i64> {
        self.engine.get_total_tile_count()
    }

    pub fn get_tile_count_per_layer(&self) -> Result<Vec<(i32, i64)>> {
        self.engine.get_tile_count_per_layer()
    }
}

impl<'a> Writer2d<'a> {
    pub fn new(conn: &'a DbConnection, schema: &'a SchemaConfiguration, env: &'a dyn HostingEnvironment) -> Self {
        Self {
            engine: TileEngine::new(conn, schema, env),
        }
    }

    pub fn add_tile(
        &self,
        coordinate: &TileCoordinate,
        info: &TileInfo2d,
        pixel_width: u32,
        pixel_height: u32,
        pixel_type: PixelType,
        data_type: DataType,
        payload: Option<&[u8]>,
    ) -> Result<i64> {
        let extent = Extent {
            position: vec![info.position.pos_x, info.position.pos_y],
            size: vec![info.position.width, info.position.height],
        };
        let pixels = PixelGeometry {
            pixel_size: vec![pixel_width, pixel_height],
            pixel_type,
        };
        self.engine
            .add_tile(coordinate, &extent, info.pyramid_level, &pixels, data_type, payload)
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.engine.conn.begin_transaction()
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.engine.conn.end_transaction(true)
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.engine.conn.end_transaction(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dimension;
    use crate::environment::DefaultEnvironment;
    use crate::schema::{create_schema, CreateOptions};
    use crate::types::{DocumentType, LogicalPosition2d};

    fn setup(use_spatial_index: bool) -> (DbConnection, SchemaConfiguration) {
        let conn = DbConnection::open(":memory:").unwrap();
        let options = CreateOptions::new(":memory:", DocumentType::Image2d)
            .add_indexed_dimension(Dimension::new('C').unwrap())
            .use_spatial_index(use_spatial_index)
            .use_blob_table(true);
        let schema = create_schema(&conn, &options).unwrap();
        (conn, schema)
    }

    #[test]
    fn add_and_read_tile_round_trips() {
        let (conn, schema) = setup(true);
        let env = DefaultEnvironment;
        let writer = Writer2d::new(&conn, &schema, &env);
        let mut coord = TileCoordinate::new();
        coord.set(Dimension::new('C').unwrap(), 1);
        let info = TileInfo2d {
            position: LogicalPosition2d {
                pos_x: 10.0,
                pos_y: 20.0,
                width: 5.0,
                height: 5.0,
            },
            pyramid_level: 0,
        };
        let pk = writer
            .add_tile(&coord, &info, 5, 5, PixelType(0), DataType::UNCOMPRESSED, Some(b"hello"))
            .unwrap();

        let reader = Reader2d::new(&conn, &schema, &env);
        let row = reader.read_tile_info(pk, true, true, true).unwrap();
        assert_eq!(row.coordinate.unwrap().get(Dimension::new('C').unwrap()), Some(1));
        assert_eq!(row.extent.unwrap().position, vec![10.0, 20.0]);

        let mut captured = Vec::new();
        reader.read_tile_data(pk, |bytes| captured.extend_from_slice(bytes)).unwrap();
        assert_eq!(captured, b"hello");
    }

    #[test]
    fn rect_intersection_matches_checkerboard() {
        let (conn, schema) = setup(true);
        let env = DefaultEnvironment;
        let writer = Writer2d::new(&conn, &schema, &env);
        for x in 0..4 {
            for y in 0..4 {
                let info = TileInfo2d {
                    position: LogicalPosition2d {
                        pos_x: x as f64 * 10.0,
                        pos_y: y as f64 * 10.0,
                        width: 10.0,
                        height: 10.0,
                    },
                    pyramid_level: 0,
                };
                writer
                    .add_tile(
                        &TileCoordinate::new(),
                        &info,
                        10,
                        10,
                        PixelType(0),
                        DataType::ZERO,
                        None,
                    )
                    .unwrap();
            }
        }
        let reader = Reader2d::new(&conn, &schema, &env);
        let mut hits = Vec::new();
        reader
            .get_tiles_intersecting_rect(
                Rectangle {
                    x: 5.0,
                    y: 5.0,
                    width: 20.0,
                    height: 20.0,
                },
                None,
                |pk| {
                    hits.push(pk);
                    true
                },
            )
            .unwrap();
        // The query rectangle [5,25)x[5,25) overlaps tiles at column/row 0,1,2 => 3x3 = 9 tiles.
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn rect_intersection_matches_without_spatial_index() {
        let (conn, schema) = setup(false);
        let env = DefaultEnvironment;
        let writer = Writer2d::new(&conn, &schema, &env);
        for x in 0..4 {
            for y in 0..4 {
                let info = TileInfo2d {
                    position: LogicalPosition2d {
                        pos_x: x as f64 * 10.0,
                        pos_y: y as f64 * 10.0,
                        width: 10.0,
                        height: 10.0,
                    },
                    pyramid_level: 0,
                };
                writer
                    .add_tile(
                        &TileCoordinate::new(),
                        &info,
                        10,
                        10,
                        PixelType(0),
                        DataType::ZERO,
                        None,
                    )
                    .unwrap();
            }
        }
        let reader = Reader2d::new(&conn, &schema, &env);
        let mut hits = Vec::new();
        reader
            .get_tiles_intersecting_rect(
                Rectangle {
                    x: 5.0,
                    y: 5.0,
                    width: 20.0,
                    height: 20.0,
                },
                None,
                |pk| {
                    hits.push(pk);
                    true
                },
            )
            .unwrap();
        // The indexed and linear-scan query paths must agree: same 3x3 = 9 tiles.
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn read_tile_data_without_blob_table_is_silent_noop() {
        let conn = DbConnection::open(":memory:").unwrap();
        let options = CreateOptions::new(":memory:", DocumentType::Image2d);
        let schema = create_schema(&conn, &options).unwrap();
        let env = DefaultEnvironment;
        let writer = Writer2d::new(&conn, &schema, &env);
        let info = TileInfo2d {
            position: LogicalPosition2d {
                pos_x: 0.0,
                pos_y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            pyramid_level: 0,
        };
        let pk = writer
            .add_tile(&TileCoordinate::new(), &info, 1, 1, PixelType(0), DataType::ZERO, None)
            .unwrap();

        let reader = Reader2d::new(&conn, &schema, &env);
        let mut called = false;
        reader.read_tile_data(pk, |_| called = true).unwrap();
        assert!(!called, "a tile with no blob table configured has no payload to read");

        assert!(reader.read_tile_data(999, |_| {}).is_err());
    }

    #[test]
    fn empty_document_has_no_bounding_box_or_minmax() {
        let (conn, schema) = setup(false);
        let env = DefaultEnvironment;
        let reader = Reader2d::new(&conn, &schema, &env);
        assert_eq!(reader.get_tiles_bounding_box().unwrap(), None);
        let dims = reader.get_tile_dimensions();
        let minmax = reader.get_min_max_for_tile_dimension(&dims).unwrap();
        assert!(minmax.iter().all(|(_, r)| r.is_none()));
    }

    #[test]
    fn read_tile_info_missing_is_error() {
        let (conn, schema) = setup(false);
        let env = DefaultEnvironment;
        let reader = Reader2d::new(&conn, &schema, &env);
        assert!(reader.read_tile_info(999, false, false, false).is_err());
    }
}
