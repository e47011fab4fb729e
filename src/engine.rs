//! Shared tile/brick read-write engine, parameterised by axis count rather than
//! duplicated per document type, per the unification called for across the two
//! parallel 2-D/3-D schema configurations.
//!
//! Grounded on `libimgdoc2/src/doc/document2DRead.cpp` /
//! `document2DWrite.cpp` (and their 3-D counterparts) for the insert/read/query
//! sequencing, and on `ogc_sql.rs`'s R-Tree insert/delete helpers for the
//! spatial-index bookkeeping that accompanies every tile/brick insert.

use crate::connection::DbConnection;
use crate::dimension::{Dimension, TileCoordinate};
use crate::environment::HostingEnvironment;
use crate::error::{Error, Result};
use crate::query::WhereClause;
use crate::schema::SchemaConfiguration;
use crate::types::{Cuboid, DataType, Plane, PixelType, Rectangle, StorageType, TileBlobInfo};
use rusqlite::{OptionalExtension, ToSql};

/// Position+size fields for either a tile or a brick, expressed per axis so a
/// single engine handles both document types.
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    pub position: Vec<f64>,
    pub size: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelGeometry {
    pub pixel_size: Vec<u32>,
    pub pixel_type: PixelType,
}

/// A fully-populated tile/brick-info row as returned by `read_tile_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInfoRow {
    pub pk: i64,
    pub coordinate: Option<TileCoordinate>,
    pub extent: Option<Extent>,
    pub pyramid_level: Option<i32>,
    pub blob_info: Option<TileBlobInfo>,
}

pub struct TileEngine<'a> {
    pub conn: &'a DbConnection,
    pub schema: &'a SchemaConfiguration,
    pub env: &'a dyn HostingEnvironment,
}

impl<'a> TileEngine<'a> {
    pub fn new(
        conn: &'a DbConnection,
        schema: &'a SchemaConfiguration,
        env: &'a dyn HostingEnvironment,
    ) -> Self {
        Self { conn, schema, env }
    }

    /// Inserts a tile/brick row, its data row, and (if configured) its spatial
    /// index row, inside a scoped transaction.
    pub fn add_tile(
        &self,
        coordinate: &TileCoordinate,
        extent: &Extent,
        pyramid_level: i32,
        pixels: &PixelGeometry,
        data_type: DataType,
        payload: Option<&[u8]>,
    ) -> Result<i64> {
        let axis_count = self.schema.axis_count();
        if extent.position.len() != axis_count || extent.size.len() != axis_count {
            return Err(Error::InvalidArgument(format!(
                "extent has {} axes, schema declares {axis_count}",
                extent.position.len()
            )));
        }
        if pixels.pixel_size.len() != axis_count {
            return Err(Error::InvalidArgument(format!(
                "pixel geometry has {} axes, schema declares {axis_count}",
                pixels.pixel_size.len()
            )));
        }
        for (dim, _) in coordinate.iter() {
            if !self.schema.dimensions.contains(&dim) {
                return Err(Error::InvalidArgument(format!(
                    "dimension '{dim}' is not declared in this document's schema"
                )));
            }
        }

        self.conn.with_scoped_transaction(|| {
            let blob_id = match payload {
                Some(bytes) if data_type.has_payload() => {
                    let table = self.schema.blob_table.as_deref().ok_or_else(|| {
                        Error::InvalidOperation(
                            "this document has no blob table configured".to_string(),
                        )
                    })?;
                    self.conn.raw().execute(
                        &format!("INSERT INTO {table} (Data) VALUES (?1)"),
                        [bytes],
                    )?;
                    Some(self.conn.raw().last_insert_rowid())
                }
                _ => None,
            };
            let storage_type = if blob_id.is_some() {
                StorageType::BlobInDatabase
            } else {
                StorageType::None
            };

            let data_pk = self.insert_data_row(pixels, data_type, storage_type, blob_id)?;
            let info_pk = self.insert_info_row(coordinate, extent, pyramid_level, data_pk)?;

            if self.schema.has_spatial_index() {
                self.insert_spatial_index_row(info_pk, extent)?;
            }

            Ok(info_pk)
        })
    }

    fn insert_data_row(
        &self,
        pixels: &PixelGeometry,
        data_type: DataType,
        storage_type: StorageType,
        blob_id: Option<i64>,
    ) -> Result<i64> {
        let table = &self.schema.tiles_data_table;
        let axis_count = self.schema.axis_count();
        let (sql, params): (String, Vec<Box<dyn ToSql>>) = if axis_count == 3 {
            (
                format!(
                    "INSERT INTO {table} (PixelWidth,PixelHeight,PixelDepth,PixelType,\
                     TileDataType,BinDataStorageType,BinDataId) VALUES (?1,?2,?3,?4,?5,?6,?7)"
                ),
                vec![
                    Box::new(pixels.pixel_size[0]),
                    Box::new(pixels.pixel_size[1]),
                    Box::new(pixels.pixel_size[2]),
                    Box::new(pixels.pixel_type.0),
                    Box::new(data_type.0),
                    Box::new(storage_type as i32),
                    Box::new(blob_id),
                ],
            )
        } else {
            (
                format!(
                    "INSERT INTO {table} (PixelWidth,PixelHeight,PixelType,\
                     TileDataType,BinDataStorageType,BinDataId) VALUES (?1,?2,?3,?4,?5,?6)"
                ),
                vec![
                    Box::new(pixels.pixel_size[0]),
                    Box::new(pixels.pixel_size[1]),
                    Box::new(pixels.pixel_type.0),
                    Box::new(data_type.0),
                    Box::new(storage_type as i32),
                    Box::new(blob_id),
                ],
            )
        };
        self.conn
            .raw()
            .execute(&sql, rusqlite::params_from_iter(params.iter().map(|b| b.as_ref())))?;
        Ok(self.conn.raw().last_insert_rowid())
    }

    fn insert_info_row(
        &self,
        coordinate: &TileCoordinate,
        extent: &Extent,
        pyramid_level: i32,
        data_pk: i64,
    ) -> Result<i64> {
        let table = &self.schema.tiles_info_table;
        let position_cols = self.schema.position_columns();
        let size_cols = self.schema.size_columns();

        let mut columns: Vec<String> = position_cols
            .iter()
            .chain(size_cols.iter())
            .map(|s| s.to_string())
            .collect();
        columns.push("PyramidLevel".to_string());
        columns.push("TileDataId".to_string());

        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        for v in &extent.position {
            values.push(Box::new(*v));
        }
        for v in &extent.size {
            values.push(Box::new(*v));
        }
        values.push(Box::new(pyramid_level));
        values.push(Box::new(data_pk));

        for dim in self.schema.dimensions.iter() {
            columns.push(dim.column_name());
            values.push(Box::new(coordinate.get(*dim).unwrap_or(0)));
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(","),
            placeholders.join(",")
        );
        self.conn
            .raw()
            .execute(&sql, rusqlite::params_from_iter(values.iter().map(|b| b.as_ref())))?;
        Ok(self.conn.raw().last_insert_rowid())
    }

    fn insert_spatial_index_row(&self, pk: i64, extent: &Extent) -> Result<()> {
        let table = self
            .schema
            .spatial_index_table
            .as_deref()
            .expect("checked by caller");
        let axis_count = self.schema.axis_count();
        let (sql, params): (String, Vec<f64>) = if axis_count == 3 {
            (
                format!("INSERT INTO {table} (id,minX,maxX,minY,maxY,minZ,maxZ) VALUES (?1,?2,?3,?4,?5,?6,?7)"),
                vec![
                    extent.position[0],
                    extent.position[0] + extent.size[0],
                    extent.position[1],
                    extent.position[1] + extent.size[1],
                    extent.position[2],
                    extent.position[2] + extent.size[2],
                ],
            )
        } else {
            (
                format!("INSERT INTO {table} (id,minX,maxX,minY,maxY) VALUES (?1,?2,?3,?4,?5)"),
                vec![
                    extent.position[0],
                    extent.position[0] + extent.size[0],
                    extent.position[1],
                    extent.position[1] + extent.size[1],
                ],
            )
        };
        let mut full_params: Vec<Box<dyn ToSql>> = vec![Box::new(pk)];
        full_params.extend(params.into_iter().map(|v| Box::new(v) as Box<dyn ToSql>));
        self.conn
            .raw()
            .execute(&sql, rusqlite::params_from_iter(full_params.iter().map(|b| b.as_ref())))?;
        Ok(())
    }

    /// Runs the composite query built by the caller and invokes `callback` per
    /// matching primary key. Returning `false` stops iteration.
    pub fn query(&self, where_clause: &WhereClause, mut callback: impl FnMut(i64) -> bool) -> Result<()> {
        let table = &self.schema.tiles_info_table;
        let sql = format!("SELECT Pk FROM {table} WHERE {}", where_clause.fragment);
        let mut stmt = self.conn.raw().prepare(&sql)?;
        let binds: Vec<&dyn ToSql> = where_clause.binds.iter().map(|b| b as &dyn ToSql).collect();
        let mut rows = stmt.query(binds.as_slice())?;
        while let Some(row) = rows.next()? {
            let pk: i64 = row.get(0)?;
            if !callback(pk) {
                break;
            }
        }
        Ok(())
    }

    pub fn get_tiles_intersecting_rect(
        &self,
        rect: Rectangle,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        if self.schema.has_spatial_index() {
            let geo = crate::query::rectangle_rtree_clause(rect);
            return self.query_via_spatial_index(geo, extra, callback);
        }
        let geo = crate::query::rectangle_intersection_clause(rect);
        self.query(&and_clauses(geo, extra), callback)
    }

    pub fn get_tiles_intersecting_cuboid(
        &self,
        cuboid: Cuboid,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        if self.schema.has_spatial_index() {
            let geo = crate::query::cuboid_rtree_clause(cuboid);
            return self.query_via_spatial_index(geo, extra, callback);
        }
        let geo = crate::query::cuboid_intersection_clause(cuboid);
        self.query(&and_clauses(geo, extra), callback)
    }

    pub fn get_tiles_intersecting_plane(
        &self,
        plane: Plane,
        extra: Option<&WhereClause>,
        callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        if self.schema.has_spatial_index() {
            let geo = crate::query::plane_rtree_clause(plane);
            return self.query_via_spatial_index(geo, extra, callback);
        }
        let geo = crate::query::plane_intersection_clause(plane);
        self.query(&and_clauses(geo, extra), callback)
    }

    /// Runs a geometric query as an inner join between the R-Tree spatial-index
    /// table and TILESINFO, restricting by `geo` (expressed against the R-Tree's
    /// own min/max columns) and the caller's coordinate/tile-info clause.
    /// Grounded on `documentRead2d.cpp`'s
    /// `GetTilesIntersectingRectQueryAndCoordinateAndInfoQueryClauseWithSpatialIndex`.
    fn query_via_spatial_index(
        &self,
        geo: WhereClause,
        extra: Option<&WhereClause>,
        mut callback: impl FnMut(i64) -> bool,
    ) -> Result<()> {
        let spatial_table = self
            .schema
            .spatial_index_table
            .as_deref()
            .expect("checked by caller");
        let info_table = &self.schema.tiles_info_table;
        let combined = and_clauses(geo, extra);
        let sql = format!(
            "SELECT spatialindex.id FROM {spatial_table} spatialindex \
             INNER JOIN {info_table} info ON spatialindex.id = info.Pk \
             WHERE {}",
            combined.fragment
        );
        let mut stmt = self.conn.raw().prepare(&sql)?;
        let binds: Vec<&dyn ToSql> = combined.binds.iter().map(|b| b as &dyn ToSql).collect();
        let mut rows = stmt.query(binds.as_slice())?;
        while let Some(row) = rows.next()? {
            let pk: i64 = row.get(0)?;
            if !callback(pk) {
                break;
            }
        }
        Ok(())
    }

    pub fn read_tile_info(
        &self,
        pk: i64,
        with_coordinate: bool,
        with_extent: bool,
        with_blob_info: bool,
    ) -> Result<TileInfoRow> {
        let table = &self.schema.tiles_info_table;
        let data_table = &self.schema.tiles_data_table;
        let position_cols = self.schema.position_columns();
        let size_cols = self.schema.size_columns();

        let mut columns = vec!["t.Pk".to_string(), "t.PyramidLevel".to_string()];
        if with_extent {
            for c in position_cols.iter().chain(size_cols.iter()) {
                columns.push(format!("t.{c}"));
            }
        }
        if with_coordinate {
            for dim in self.schema.dimensions.iter() {
                columns.push(format!("t.{}", dim.column_name()));
            }
        }
        if with_blob_info {
            columns.push("d.TileDataType".to_string());
            columns.push("d.BinDataStorageType".to_string());
        }

        let join = if with_blob_info {
            format!("LEFT JOIN {data_table} d ON t.TileDataId = d.Pk")
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT {} FROM {table} t {join} WHERE t.Pk = ?1",
            columns.join(",")
        );

        let mut stmt = self.conn.raw().prepare(&sql)?;
        let mut rows = stmt.query([pk])?;
        let row = rows.next()?.ok_or(Error::NonExistingTile(pk))?;

        let mut idx = 0usize;
        let _pk: i64 = row.get(idx)?;
        idx += 1;
        let pyramid_level: i32 = row.get(idx)?;
        idx += 1;

        let extent = if with_extent {
            let axis_count = self.schema.axis_count();
            let mut position = Vec::with_capacity(axis_count);
            let mut size = Vec::with_capacity(axis_count);
            for _ in 0..axis_count {
                position.push(row.get(idx)?);
                idx += 1;
            }
            for _ in 0..axis_count {
                size.push(row.get(idx)?);
                idx += 1;
            }
            Some(Extent { position, size })
        } else {
            None
        };

        let coordinate = if with_coordinate {
            let mut coord = TileCoordinate::new();
            for dim in self.schema.dimensions.iter() {
                let value: i32 = row.get(idx)?;
                idx += 1;
                coord.set(*dim, value);
            }
            Some(coord)
        } else {
            None
        };

        let blob_info = if with_blob_info {
            let data_type: i64 = row.get(idx)?;
            idx += 1;
            let storage_type: i64 = row.get(idx)?;
            Some(TileBlobInfo {
                data_type: DataType(data_type as u8),
                storage_type: if storage_type == StorageType::BlobInDatabase as i64 {
                    StorageType::BlobInDatabase
                } else {
                    StorageType::None
                },
            })
        } else {
            None
        };

        Ok(TileInfoRow {
            pk,
            coordinate,
            extent,
            pyramid_level: Some(pyramid_level),
            blob_info,
        })
    }

    /// Streams the payload bytes for `pk` into `sink`, or does nothing if the
    /// tile has no payload. Fails with `NonExistingTile` if `pk` is absent.
    pub fn read_tile_data(&self, pk: i64, mut sink: impl FnMut(&[u8])) -> Result<()> {
        let data_table = &self.schema.tiles_data_table;
        let blob_table = match &self.schema.blob_table {
            Some(t) => t,
            None => {
                // No blob table configured: a tile that exists simply has no
                // payload to read, it is not a not-found condition.
                let exists: Option<i64> = self
                    .conn
                    .raw()
                    .query_row(
                        &format!(
                            "SELECT Pk FROM {} WHERE Pk = ?1",
                            self.schema.tiles_info_table
                        ),
                        [pk],
                        |row| row.get(0),
                    )
                    .optional()?;
                return match exists {
                    Some(_) => Ok(()),
                    None => Err(Error::NonExistingTile(pk)),
                };
            }
        };
        let sql = format!(
            "SELECT b.Data FROM {data_table} d LEFT JOIN {blob_table} b ON d.BinDataId = b.Pk \
             WHERE d.Pk = (SELECT TileDataId FROM {info} WHERE Pk = ?1)",
            info = self.schema.tiles_info_table,
        );
        let mut stmt = self.conn.raw().prepare(&sql)?;
        let mut rows = stmt.query([pk])?;
        let row = match rows.next()? {
            Some(r) => r,
            None => return Err(Error::NonExistingTile(pk)),
        };
        let data: Option<Vec<u8>> = row.get(0)?;
        if rows.next()?.is_some() {
            self.env
                .report_fatal_error_and_exit("tile data lookup returned more than one row");
        }
        if let Some(bytes) = data {
            sink(&bytes);
        }
        Ok(())
    }

    pub fn get_tile_dimensions(&self) -> Vec<Dimension> {
        self.schema.dimensions.iter().copied().collect()
    }

    /// Returns `(min, max)` for each requested dimension, or `None` if the
    /// document has no tiles (an empty-table aggregate yields SQL NULL).
    pub fn get_min_max_for_tile_dimension(
        &self,
        dims: &[Dimension],
    ) -> Result<Vec<(Dimension, Option<(i32, i32)>)>> {
        let mut results = Vec::with_capacity(dims.len());
        for dim in dims {
            if !self.schema.dimensions.contains(dim) {
                return Err(Error::InvalidArgument(format!(
                    "'{dim}' is not a declared dimension of this document"
                )));
            }
            let col = dim.column_name();
            let sql = format!(
                "SELECT MIN({col}), MAX({col}) FROM {}",
                self.schema.tiles_info_table
            );
            let (min, max): (Option<i32>, Option<i32>) = self
                .conn
                .raw()
                .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
            results.push((*dim, min.zip(max)));
        }
        Ok(results)
    }

    pub fn get_tiles_bounding_box(&self) -> Result<Option<Rectangle>> {
        self.get_bounding_box().map(|opt| {
            opt.map(|(pos, size)| Rectangle {
                x: pos[0],
                y: pos[1],
                width: size[0],
                height: size[1],
            })
        })
    }

    pub fn get_bricks_bounding_box(&self) -> Result<Option<Cuboid>> {
        self.get_bounding_box().map(|opt| {
            opt.map(|(pos, size)| Cuboid {
                x: pos[0],
                y: pos[1],
                z: pos[2],
                width: size[0],
                height: size[1],
                depth: size[2],
            })
        })
    }

    fn get_bounding_box(&self) -> Result<Option<(Vec<f64>, Vec<f64>)>> {
        let axis_count = self.schema.axis_count();
        let position_cols = self.schema.position_columns();
        let size_cols = self.schema.size_columns();
        let projection: Vec<String> = position_cols
            .iter()
            .zip(size_cols.iter())
            .flat_map(|(p, s)| vec![format!("MIN({p})"), format!("MAX({p}+{s})")])
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            projection.join(","),
            self.schema.tiles_info_table
        );
        let mut stmt = self.conn.raw().prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let row = rows.next()?.expect("aggregate query always returns one row");

        let mut position = Vec::with_capacity(axis_count);
        let mut max = Vec::with_capacity(axis_count);
        for axis in 0..axis_count {
            let lo: Option<f64> = row.get(axis * 2)?;
            let hi: Option<f64> = row.get(axis * 2 + 1)?;
            match (lo, hi) {
                (Some(lo), Some(hi)) => {
                    position.push(lo);
                    max.push(hi);
                }
                _ => return Ok(None),
            }
        }
        let size: Vec<f64> = position.iter().zip(max.iter()).map(|(p, m)| m - p).collect();
        Ok(Some((position, size)))
    }

    pub fn get_total_tile_count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.tiles_info_table);
        Ok(self.conn.raw().query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn get_tile_count_per_layer(&self) -> Result<Vec<(i32, i64)>> {
        let sql = format!(
            "SELECT PyramidLevel, COUNT(*) FROM {} GROUP BY PyramidLevel ORDER BY PyramidLevel",
            self.schema.tiles_info_table
        );
        let mut stmt = self.conn.raw().prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn and_clauses(geo: WhereClause, extra: Option<&WhereClause>) -> WhereClause {
    match extra {
        Some(extra) => {
            let mut binds = geo.binds;
            binds.extend(extra.binds.iter().cloned());
            WhereClause {
                fragment: format!("{} AND {}", geo.fragment, extra.fragment),
                binds,
            }
        }
        None => geo,
    }
}
