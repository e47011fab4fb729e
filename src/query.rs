//! Translates typed query clauses into parameterised SQL fragments.
//!
//! Grounded on `libimgdoc2/src/db/utilities.cpp`: the per-dimension range-clause
//! boundary rules (`ProcessRangeClause`), the left-associative tile-info clause
//! combination, and the exact plane-intersection formula and bind order.

use crate::dimension::Dimension;
use crate::types::{ComparisonOperator, Cuboid, LogicalOperator, Plane, Rectangle};
use std::collections::BTreeMap;

/// A value bound into a prepared statement by the query builder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl rusqlite::types::ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            BindValue::Int32(v) => v.to_sql(),
            BindValue::Int64(v) => v.to_sql(),
            BindValue::Double(v) => v.to_sql(),
        }
    }
}

/// A WHERE fragment plus its ordered bind values, ready to be spliced into a statement.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    pub fragment: String,
    pub binds: Vec<BindValue>,
}

impl WhereClause {
    fn always_true() -> Self {
        Self {
            fragment: "(TRUE)".to_string(),
            binds: Vec::new(),
        }
    }
}

/// One half-open-or-closed range restriction for a single dimension.
/// `start = i32::MIN` means "no lower bound"; `end = i32::MAX` means "no upper bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeClause {
    pub start: i32,
    pub end: i32,
}

impl RangeClause {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Builds the SQL fragment and binds for this range against `column`, or
    /// `None` if the range is a non-sentinel inverted interval (`start > end`),
    /// which is silently skipped rather than treated as an error.
    fn build(self, column: &str) -> Option<(String, Vec<BindValue>)> {
        let unbounded_start = self.start == i32::MIN;
        let unbounded_end = self.end == i32::MAX;
        match (unbounded_start, unbounded_end) {
            (false, false) => {
                if self.start < self.end {
                    Some((
                        format!("({column} > ? AND {column} < ?)"),
                        vec![BindValue::Int32(self.start), BindValue::Int32(self.end)],
                    ))
                } else if self.start == self.end {
                    Some((
                        format!("({column} = ?)"),
                        vec![BindValue::Int32(self.start)],
                    ))
                } else {
                    None
                }
            }
            (true, false) => Some((
                format!("({column} < ?)"),
                vec![BindValue::Int32(self.end)],
            )),
            (false, true) => Some((
                format!("({column} > ?)"),
                vec![BindValue::Int32(self.start)],
            )),
            (true, true) => Some(("(TRUE)".to_string(), Vec::new())),
        }
    }
}

/// An ordered set of range clauses per dimension: OR'd within a dimension, AND'd
/// across dimensions.
#[derive(Debug, Clone, Default)]
pub struct CoordinateQueryClause {
    ranges: BTreeMap<Dimension, Vec<RangeClause>>,
}

impl CoordinateQueryClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_range(&mut self, dimension: Dimension, range: RangeClause) -> &mut Self {
        self.ranges.entry(dimension).or_default().push(range);
        self
    }

    pub fn build(&self) -> WhereClause {
        let mut group_fragments = Vec::new();
        let mut binds = Vec::new();
        for (dimension, ranges) in &self.ranges {
            let column = dimension.column_name();
            let mut or_fragments = Vec::new();
            for range in ranges {
                if let Some((fragment, mut range_binds)) = range.build(&column) {
                    or_fragments.push(fragment);
                    binds.append(&mut range_binds);
                }
            }
            if !or_fragments.is_empty() {
                group_fragments.push(format!("({})", or_fragments.join(" OR ")));
            }
        }
        if group_fragments.is_empty() {
            WhereClause::always_true()
        } else {
            WhereClause {
                fragment: group_fragments.join(" AND "),
                binds,
            }
        }
    }
}

/// One condition in a tile-info query clause (currently: pyramid level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileInfoCondition {
    pub logical_operator: LogicalOperator,
    pub comparison: ComparisonOperator,
    pub value: i32,
}

/// An ordered list of pyramid-level conditions, combined left-associatively. The
/// first condition's logical operator is ignored.
#[derive(Debug, Clone, Default)]
pub struct TileInfoQueryClause {
    conditions: Vec<TileInfoCondition>,
}

impl TileInfoQueryClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_condition(&mut self, condition: TileInfoCondition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn build(&self) -> WhereClause {
        if self.conditions.is_empty() {
            return WhereClause::always_true();
        }
        let mut fragment = String::new();
        let mut binds = Vec::new();
        for (i, cond) in self.conditions.iter().enumerate() {
            if i > 0 {
                fragment.push(' ');
                fragment.push_str(cond.logical_operator.as_sql());
                fragment.push(' ');
            }
            fragment.push_str(&format!("( PyramidLevel {} ?)", cond.comparison.as_sql()));
            binds.push(BindValue::Int32(cond.value));
        }
        WhereClause { fragment, binds }
    }
}

/// Combines a coordinate clause and a tile-info clause with `AND`, treating
/// either as `(TRUE)` if omitted.
pub fn combine_where_clauses(
    coordinate: Option<&CoordinateQueryClause>,
    tile_info: Option<&TileInfoQueryClause>,
) -> WhereClause {
    let coord = coordinate.map(|c| c.build());
    let info = tile_info.map(|c| c.build());
    match (coord, info) {
        (Some(c), Some(i)) => {
            let mut binds = c.binds;
            binds.extend(i.binds);
            WhereClause {
                fragment: format!("{} AND {}", c.fragment, i.fragment),
                binds,
            }
        }
        (Some(c), None) => c,
        (None, Some(i)) => i,
        (None, None) => WhereClause::always_true(),
    }
}

/// Open-half-space rectangle intersection: `pos + size >= qmin AND pos <= qmax` per axis.
pub fn rectangle_intersection_clause(rect: Rectangle) -> WhereClause {
    WhereClause {
        fragment: "(TileX + TileW >= ? AND TileX <= ? AND TileY + TileH >= ? AND TileY <= ?)"
            .to_string(),
        binds: vec![
            BindValue::Double(rect.x),
            BindValue::Double(rect.x + rect.width),
            BindValue::Double(rect.y),
            BindValue::Double(rect.y + rect.height),
        ],
    }
}

/// Open-half-space cuboid intersection, the 3-D analogue of [`rectangle_intersection_clause`].
pub fn cuboid_intersection_clause(cuboid: Cuboid) -> WhereClause {
    WhereClause {
        fragment: "(TileX + TileW >= ? AND TileX <= ? \
                    AND TileY + TileH >= ? AND TileY <= ? \
                    AND TileZ + TileD >= ? AND TileZ <= ?)"
            .to_string(),
        binds: vec![
            BindValue::Double(cuboid.x),
            BindValue::Double(cuboid.x + cuboid.width),
            BindValue::Double(cuboid.y),
            BindValue::Double(cuboid.y + cuboid.height),
            BindValue::Double(cuboid.z),
            BindValue::Double(cuboid.z + cuboid.depth),
        ],
    }
}

/// Rectangle intersection expressed against the spatial index's own `minX`/`maxX`/
/// `minY`/`maxY` columns rather than TILESINFO's position/size columns, for use
/// once the caller has already confirmed a spatial index is configured.
pub fn rectangle_rtree_clause(rect: Rectangle) -> WhereClause {
    WhereClause {
        fragment: "(maxX >= ? AND minX <= ? AND maxY >= ? AND minY <= ?)".to_string(),
        binds: vec![
            BindValue::Double(rect.x),
            BindValue::Double(rect.x + rect.width),
            BindValue::Double(rect.y),
            BindValue::Double(rect.y + rect.height),
        ],
    }
}

/// The 3-D analogue of [`rectangle_rtree_clause`].
pub fn cuboid_rtree_clause(cuboid: Cuboid) -> WhereClause {
    WhereClause {
        fragment: "(maxX >= ? AND minX <= ? AND maxY >= ? AND minY <= ? AND maxZ >= ? AND minZ <= ?)"
            .to_string(),
        binds: vec![
            BindValue::Double(cuboid.x),
            BindValue::Double(cuboid.x + cuboid.width),
            BindValue::Double(cuboid.y),
            BindValue::Double(cuboid.y + cuboid.height),
            BindValue::Double(cuboid.z),
            BindValue::Double(cuboid.z + cuboid.depth),
        ],
    }
}

/// The [`plane_intersection_clause`] formula restated against the spatial
/// index's `min`/`max` columns (`minX = TileX`, `maxX = TileX + TileW`, and so
/// on), so the same exact predicate can be evaluated as the R-Tree join's
/// first-pass filter instead of scanning TILESINFO directly.
pub fn plane_rtree_clause(plane: Plane) -> WhereClause {
    WhereClause {
        fragment: "(2*abs(-?+(minX+maxX)/2*?+(minY+maxY)/2*?+(minZ+maxZ)/2*?)\
                    <=abs(?)*(maxZ-minZ)+abs(?)*(maxY-minY)+abs(?)*(maxX-minX))"
            .to_string(),
        binds: vec![
            BindValue::Double(plane.distance),
            BindValue::Double(plane.normal.x),
            BindValue::Double(plane.normal.y),
            BindValue::Double(plane.normal.z),
            BindValue::Double(plane.normal.z),
            BindValue::Double(plane.normal.y),
            BindValue::Double(plane.normal.x),
        ],
    }
}

/// AABB-vs-plane overlap test for 3-D bricks: the box's projected radius onto the
/// plane normal compared against the signed distance of the box centre from the
/// plane, expressed without branching. Bind order is `d, nx, ny, nz, nz, ny, nx`
/// (the normal components are referenced twice).
pub fn plane_intersection_clause(plane: Plane) -> WhereClause {
    WhereClause {
        fragment: "(2*abs(-?+(TileW/2+TileX)*?+(TileH/2+TileY)*?+(TileD/2+TileZ)*?)\
                    <=abs(?)*TileD+abs(?)*TileH+abs(?)*TileW)"
            .to_string(),
        binds: vec![
            BindValue::Double(plane.distance),
            BindValue::Double(plane.normal.x),
            BindValue::Double(plane.normal.y),
            BindValue::Double(plane.normal.z),
            BindValue::Double(plane.normal.z),
            BindValue::Double(plane.normal.y),
            BindValue::Double(plane.normal.x),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_clause_open_interval() {
        let (frag, binds) = RangeClause::new(1, 5).build("Dim_T").unwrap();
        assert_eq!(frag, "(Dim_T > ? AND Dim_T < ?)");
        assert_eq!(binds, vec![BindValue::Int32(1), BindValue::Int32(5)]);
    }

    #[test]
    fn range_clause_equality() {
        let (frag, binds) = RangeClause::new(3, 3).build("Dim_T").unwrap();
        assert_eq!(frag, "(Dim_T = ?)");
        assert_eq!(binds, vec![BindValue::Int32(3)]);
    }

    #[test]
    fn range_clause_inverted_is_skipped() {
        assert!(RangeClause::new(5, 1).build("Dim_T").is_none());
    }

    #[test]
    fn range_clause_unbounded_both_sides() {
        let (frag, binds) = RangeClause::new(i32::MIN, i32::MAX).build("Dim_T").unwrap();
        assert_eq!(frag, "(TRUE)");
        assert!(binds.is_empty());
    }

    #[test]
    fn range_clause_lower_only() {
        let (frag, binds) = RangeClause::new(2, i32::MAX).build("Dim_C").unwrap();
        assert_eq!(frag, "(Dim_C > ?)");
        assert_eq!(binds, vec![BindValue::Int32(2)]);
    }

    #[test]
    fn range_clause_upper_only() {
        let (frag, binds) = RangeClause::new(i32::MIN, 9).build("Dim_C").unwrap();
        assert_eq!(frag, "(Dim_C < ?)");
        assert_eq!(binds, vec![BindValue::Int32(9)]);
    }

    #[test]
    fn coordinate_clause_empty_is_true() {
        let clause = CoordinateQueryClause::new();
        assert_eq!(clause.build().fragment, "(TRUE)");
    }

    #[test]
    fn coordinate_clause_ors_within_dimension_ands_across() {
        let mut clause = CoordinateQueryClause::new();
        let c = Dimension::new('C').unwrap();
        let t = Dimension::new('T').unwrap();
        clause.add_range(c, RangeClause::new(0, 0));
        clause.add_range(c, RangeClause::new(2, 2));
        clause.add_range(t, RangeClause::new(5, 10));
        let built = clause.build();
        assert_eq!(
            built.fragment,
            "((Dim_C = ?) OR (Dim_C = ?)) AND ((Dim_T > ? AND Dim_T < ?))"
        );
        assert_eq!(built.binds.len(), 4);
    }

    #[test]
    fn tile_info_clause_ignores_first_logical_operator() {
        let mut clause = TileInfoQueryClause::new();
        clause.add_condition(TileInfoCondition {
            logical_operator: LogicalOperator::Or,
            comparison: ComparisonOperator::GreaterThanOrEqual,
            value: 2,
        });
        let built = clause.build();
        assert_eq!(built.fragment, "( PyramidLevel >= ?)");
    }

    #[test]
    fn tile_info_clause_combines_left_associatively() {
        let mut clause = TileInfoQueryClause::new();
        clause.add_condition(TileInfoCondition {
            logical_operator: LogicalOperator::And,
            comparison: ComparisonOperator::GreaterThanOrEqual,
            value: 0,
        });
        clause.add_condition(TileInfoCondition {
            logical_operator: LogicalOperator::And,
            comparison: ComparisonOperator::LessThan,
            value: 4,
        });
        let built = clause.build();
        assert_eq!(
            built.fragment,
            "( PyramidLevel >= ?) AND ( PyramidLevel < ?)"
        );
        assert_eq!(built.binds.len(), 2);
    }

    #[test]
    fn plane_clause_bind_order() {
        use crate::types::Normal3d;
        let plane = Plane {
            normal: Normal3d {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
            distance: 4.0,
        };
        let built = plane_intersection_clause(plane);
        assert_eq!(
            built.binds,
            vec![
                BindValue::Double(4.0),
                BindValue::Double(1.0),
                BindValue::Double(2.0),
                BindValue::Double(3.0),
                BindValue::Double(3.0),
                BindValue::Double(2.0),
                BindValue::Double(1.0),
            ]
        );
    }

    #[test]
    fn combine_both_present() {
        let mut coord = CoordinateQueryClause::new();
        coord.add_range(Dimension::new('C').unwrap(), RangeClause::new(0, 0));
        let mut info = TileInfoQueryClause::new();
        info.add_condition(TileInfoCondition {
            logical_operator: LogicalOperator::And,
            comparison: ComparisonOperator::Equal,
            value: 0,
        });
        let combined = combine_where_clauses(Some(&coord), Some(&info));
        assert!(combined.fragment.contains("AND"));
        assert_eq!(combined.binds.len(), 2);
    }

    #[test]
    fn combine_neither_present_is_true() {
        let combined = combine_where_clauses(None, None);
        assert_eq!(combined.fragment, "(TRUE)");
    }
}
