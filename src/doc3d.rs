//! Public 3-D reader/writer surface: the brick analogue of [`crate::doc2d`],
//! adding plane-intersection queries that have no 2-D counterpart.

use crate::connection::DbConnection;
use crate::dimension::{Dimension, TileCoordinate};
use crate::engine::{Extent, PixelGeometry, TileEngine, TileInfoRow};
use crate::environment::HostingEnvironment;
use crate::error::Result;
use crate::query::WhereClause;
use crate::schema::SchemaConfiguration;
use crate::types::{Cuboid, DataType, PixelType, Plane, TileInfo3d};

pub struct Reader3d<'a> {
    engine: TileEngine<'a>,
}

pub struct Writer3d<'a> {
    engine: TileEngine<'a>,
}

impl<'a> Reader3d<'a> {
    pub fn new(conn: &'a DbConnection, schema: &'a SchemaConfiguration, env: &'a dyn HostingEnvironment) -> Self {
        Self {
            engine: TileEngine::new(conn, schema, env),
        }
    }

    pub fn query(&self, where_clause: &WhereClause, callback: impl FnMut(i64) -> bool) -> Result<()> {
        self.engine.query(where_clause, callback)
    }

    pub fn get_tiles_intersecting_cuboid(
        &self,
        cuboid: Cuboid,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        self.engine.get_tiles_intersecting_cuboid(cuboid, extra, callback)
    }

    pub fn get_tiles_intersecting_plane(
        &self,
        plane: Plane,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        self.engine.get_tiles_intersecting_plane(plane, extra, callback)
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

    pub fn get_bricks_bounding_box(&self) -> Result<Option<Cuboid>> {
        self.engine.get_bricks_bounding_box()
    }

    pub fn get_total_tile_count(&self) -> Result<i64> {
        self.engine.get_total_tile_count()
    }

    pub fn get_tile_count_per_layer(&self) -> Result<Vec<(i32, i64)>> {
        self.engine.get_tile_count_per_layer()
    }
}

impl<'a> Writer3d<'a> {
    pub fn new(conn: &'a DbConnection, schema: &'a SchemaConfiguration, env: &'a dyn HostingEnvironment) -> Self {
        Self {
            engine: TileEngine::new(conn, schema, env),
        }
    }

    pub fn add_brick(
        &self,
        coordinate: &TileCoordinate,
        info: &TileInfo3d,
        pixel_width: u32,
        pixel_height: u32,
        pixel_depth: u32,
        pixel_type: PixelType,
        data_type: DataType,
        payload: Option<&[u8]>,
    ) -> Result<i64> {
        let extent = Extent {
            position: vec![info.position.pos_x, info.position.pos_y, info.position.pos_z],
            size: vec![info.position.width, info.position.height, info.position.depth],
        };
        let pixels = PixelGeometry {
            pixel_size: vec![pixel_width, pixel_height, pixel_depth],
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
    use crate::types::{DocumentType, LogicalPosition3d, Normal3d};

    fn setup() -> (DbConnection, SchemaConfiguration) {
        setup_with_spatial_index(false)
    }

    fn setup_with_spatial_index(use_spatial_index: bool) -> (DbConnection, SchemaConfiguration) {
        let conn = DbConnection::open(":memory:").unwrap();
        let options = CreateOptions::new(":memory:", DocumentType::Image3d)
            .add_dimension(Dimension::new('Z').unwrap())
            .use_spatial_index(use_spatial_index);
        let schema = create_schema(&conn, &options).unwrap();
        (conn, schema)
    }

    fn add_brick(writer: &Writer3d, x: f64, y: f64, z: f64) -> i64 {
        let info = TileInfo3d {
            position: LogicalPosition3d {
                pos_x: x,
                pos_y: y,
                pos_z: z,
                width: 10.0,
                height: 10.0,
                depth: 10.0,
            },
            pyramid_level: 0,
        };
        writer
            .add_brick(
                &TileCoordinate::new(),
                &info,
                10,
                10,
                10,
                PixelType(0),
                DataType::ZERO,
                None,
            )
            .unwrap()
    }

    #[test]
    fn plane_through_checkerboard_hits_expected_slab() {
        let (conn, schema) = setup();
        let env = DefaultEnvironment;
        let writer = Writer3d::new(&conn, &schema, &env);
        for i in 0..4 {
            add_brick(&writer, i as f64 * 10.0, 0.0, 0.0);
        }
        let reader = Reader3d::new(&conn, &schema, &env);

        // Plane x = 15 (normal along x, distance 15) should intersect bricks at
        // x=10 (covers [10,20)) and x=20 (covers [20,30)), since the plane touches
        // brick x=10's far face exactly and cuts through brick x=20's near face... in
        // practice it cuts through the brick spanning [10,20).
        let plane = Plane {
            normal: Normal3d { x: 1.0, y: 0.0, z: 0.0 },
            distance: 15.0,
        };
        let mut hits = Vec::new();
        reader
            .get_tiles_intersecting_plane(plane, None, |pk| {
                hits.push(pk);
                true
            })
            .unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn cuboid_intersection_basic() {
        let (conn, schema) = setup();
        let env = DefaultEnvironment;
        let writer = Writer3d::new(&conn, &schema, &env);
        let pk = add_brick(&writer, 0.0, 0.0, 0.0);
        let reader = Reader3d::new(&conn, &schema, &env);
        let mut hits = Vec::new();
        reader
            .get_tiles_intersecting_cuboid(
                Cuboid {
                    x: 5.0,
                    y: 5.0,
                    z: 5.0,
                    width: 2.0,
                    height: 2.0,
                    depth: 2.0,
                },
                None,
                |found| {
                    hits.push(found);
                    true
                },
            )
            .unwrap();
        assert_eq!(hits, vec![pk]);
    }

    #[test]
    fn cuboid_and_plane_intersection_agree_with_and_without_spatial_index() {
        for use_spatial_index in [false, true] {
            let (conn, schema) = setup_with_spatial_index(use_spatial_index);
            let env = DefaultEnvironment;
            let writer = Writer3d::new(&conn, &schema, &env);
            let pk = add_brick(&writer, 0.0, 0.0, 0.0);
            let other = add_brick(&writer, 100.0, 100.0, 100.0);
            let reader = Reader3d::new(&conn, &schema, &env);

            let mut cuboid_hits = Vec::new();
            reader
                .get_tiles_intersecting_cuboid(
                    Cuboid {
                        x: 5.0,
                        y: 5.0,
                        z: 5.0,
                        width: 2.0,
                        height: 2.0,
                        depth: 2.0,
                    },
                    None,
                    |found| {
                        cuboid_hits.push(found);
                        true
                    },
                )
                .unwrap();
            assert_eq!(cuboid_hits, vec![pk], "spatial_index={use_spatial_index}");

            let mut plane_hits = Vec::new();
            reader
                .get_tiles_intersecting_plane(
                    Plane {
                        normal: Normal3d { x: 1.0, y: 0.0, z: 0.0 },
                        distance: 5.0,
                    },
                    None,
                    |found| {
                        plane_hits.push(found);
                        true
                    },
                )
                .unwrap();
            assert_eq!(plane_hits, vec![pk], "spatial_index={use_spatial_index}");
            let _ = other;
        }
    }
}
