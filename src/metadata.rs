//! Hierarchical document-metadata engine: path parsing and resolution, item
//! CRUD, recursive enumeration, and cascade delete.
//!
//! Grounded on `documentMetadataReader.cpp`/`documentMetadataWriter.cpp`/
//! `documentMetadataBase.cpp`: the level-keyed recursive-CTE path resolution
//! seeded at the root, the four enumeration SQL template variants selected by
//! `(recursive, include_path)`, and the `WITH RECURSIVE children(id)` cascade delete.

use crate::connection::DbConnection;
use crate::error::{Error, Result};
use rusqlite::{OptionalExtension, ToSql};

/// Which fields a read or enumeration should populate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFlags {
    pub name: bool,
    pub type_and_value: bool,
    pub complete_path: bool,
}

impl ItemFlags {
    pub fn all() -> Self {
        Self {
            name: true,
            type_and_value: true,
            complete_path: true,
        }
    }
}

/// Dynamically-typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int32(i32),
    Double(f64),
    String(String),
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeDiscriminator {
    Null = 0,
    Int32 = 1,
    Double = 2,
    String = 3,
    Json = 4,
}

impl TypeDiscriminator {
    fn from_i64(v: i64) -> Result<Self> {
        match v {
            0 => Ok(Self::Null),
            1 => Ok(Self::Int32),
            2 => Ok(Self::Double),
            3 => Ok(Self::String),
            4 => Ok(Self::Json),
            other => Err(Error::Internal(format!(
                "unrecognised metadata type discriminator {other}"
            ))),
        }
    }
}

/// A metadata item as returned by `get_item`/`enumerate_items`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataItem {
    pub pk: i64,
    pub name: Option<String>,
    pub value: Option<Value>,
    pub path: Option<String>,
}

/// Parses a slash-separated path into non-empty components. An empty string
/// denotes the root and parses to an empty vector. Leading/trailing slashes
/// and empty interior components are rejected.
pub fn parse_path(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(Error::InvalidPath(format!(
            "path must not start or end with '/': '{path}'"
        )));
    }
    let parts: Vec<String> = path.split('/').map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(Error::InvalidPath(format!(
            "path must not contain empty components: '{path}'"
        )));
    }
    Ok(parts)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::InvalidArgument(format!(
            "metadata item name must be non-empty and not contain '/': '{name}'"
        )));
    }
    Ok(())
}

/// Resolves as much of `parts` as possible to a chain of primary keys, starting
/// at the root. The returned vector may be shorter than `parts` if resolution
/// stops early; its length tells the caller how much of the path matched.
pub fn resolve_path(conn: &DbConnection, table: &str, parts: &[String]) -> Result<Vec<i64>> {
    let mut pks = Vec::with_capacity(parts.len());
    let mut parent: Option<i64> = None;
    for part in parts {
        let sql = match parent {
            None => format!(
                "SELECT Pk FROM {table} WHERE AncestorId IS NULL AND Name = ?1"
            ),
            Some(_) => format!("SELECT Pk FROM {table} WHERE AncestorId = ?1 AND Name = ?2"),
        };
        let found: Option<i64> = match parent {
            None => conn
                .raw()
                .query_row(&sql, [part], |row| row.get(0))
                .optional()?,
            Some(p) => conn
                .raw()
                .query_row(&sql, rusqlite::params![p, part], |row| row.get(0))
                .optional()?,
        };
        match found {
            Some(pk) => {
                pks.push(pk);
                parent = Some(pk);
            }
            None => break,
        }
    }
    Ok(pks)
}

fn effective_type_and_binds(
    value: &Value,
) -> (TypeDiscriminator, Option<f64>, Option<i64>, Option<String>) {
    match value {
        Value::Null => (TypeDiscriminator::Null, None, None, None),
        Value::Int32(v) => (TypeDiscriminator::Int32, None, Some(*v as i64), None),
        Value::Double(v) => (TypeDiscriminator::Double, Some(*v), None, None),
        Value::String(v) => (TypeDiscriminator::String, None, None, Some(v.clone())),
        Value::Json(v) => (TypeDiscriminator::Json, None, None, Some(v.clone())),
    }
}

fn row_to_value(discriminator: i64, d: Option<f64>, i: Option<i64>, s: Option<String>) -> Result<Value> {
    Ok(match TypeDiscriminator::from_i64(discriminator)? {
        TypeDiscriminator::Null => Value::Null,
        TypeDiscriminator::Int32 => Value::Int32(i.unwrap_or_default() as i32),
        TypeDiscriminator::Double => Value::Double(d.unwrap_or_default()),
        TypeDiscriminator::String => Value::String(s.unwrap_or_default()),
        TypeDiscriminator::Json => Value::Json(s.unwrap_or_default()),
    })
}

/// Reads a single item by primary key, or `NonExistingItem` if absent.
pub fn get_item(
    conn: &DbConnection,
    table: &str,
    pk: i64,
    flags: ItemFlags,
) -> Result<MetadataItem> {
    let row = conn
        .raw()
        .query_row(
            &format!(
                "SELECT Name, TypeDiscriminator, ValueDouble, ValueInteger, ValueString \
                 FROM {table} WHERE Pk = ?1"
            ),
            [pk],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    let (name, discriminator, d, i, s) = row.ok_or(Error::NonExistingItem(pk))?;

    let value = if flags.type_and_value {
        Some(row_to_value(discriminator, d, i, s)?)
    } else {
        None
    };
    let path = if flags.complete_path {
        Some(complete_path(conn, table, pk)?)
    } else {
        None
    };

    Ok(MetadataItem {
        pk,
        name: flags.name.then_some(name),
        value,
        path,
    })
}

pub fn get_item_for_path(
    conn: &DbConnection,
    table: &str,
    path: &str,
    flags: ItemFlags,
) -> Result<MetadataItem> {
    let parts = parse_path(path)?;
    let pks = resolve_path(conn, table, &parts)?;
    if pks.len() != parts.len() {
        return Err(Error::InvalidPath(format!("path not found: '{path}'")));
    }
    let pk = *pks.last().ok_or_else(|| {
        Error::InvalidPath("path resolves to the root, which has no item".to_string())
    })?;
    get_item(conn, table, pk, flags)
}

fn complete_path(conn: &DbConnection, table: &str, pk: i64) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = Some(pk);
    while let Some(id) = current {
        let (name, parent): (String, Option<i64>) = conn.raw().query_row(
            &format!("SELECT Name, AncestorId FROM {table} WHERE Pk = ?1"),
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        parts.push(name);
        current = parent;
    }
    parts.reverse();
    Ok(parts.join("/"))
}

/// Enumerates the children of `parent` (or root-level items when `None`).
pub fn enumerate_items(
    conn: &DbConnection,
    table: &str,
    parent: Option<i64>,
    recursive: bool,
    flags: ItemFlags,
    mut callback: impl FnMut(MetadataItem) -> bool,
) -> Result<()> {
    let parent_path = if flags.complete_path {
        match parent {
            Some(pk) => complete_path(conn, table, pk)?,
            None => String::new(),
        }
    } else {
        String::new()
    };

    let sql = if recursive {
        format!(
            "WITH RECURSIVE descendants(Pk, Name, AncestorId, TypeDiscriminator, \
                ValueDouble, ValueInteger, ValueString, Rel) AS (\
                SELECT Pk, Name, AncestorId, TypeDiscriminator, ValueDouble, ValueInteger, \
                    ValueString, Name \
                FROM {table} WHERE AncestorId {parent_cmp} \
                UNION ALL \
                SELECT m.Pk, m.Name, m.AncestorId, m.TypeDiscriminator, m.ValueDouble, \
                    m.ValueInteger, m.ValueString, d.Rel || '/' || m.Name \
                FROM {table} m JOIN descendants d ON m.AncestorId = d.Pk\
            ) SELECT Pk, Name, TypeDiscriminator, ValueDouble, ValueInteger, ValueString, Rel \
              FROM descendants",
            parent_cmp = parent_cmp_sql(parent),
        )
    } else {
        format!(
            "SELECT Pk, Name, TypeDiscriminator, ValueDouble, ValueInteger, ValueString, Name \
             FROM {table} WHERE AncestorId {parent_cmp}",
            parent_cmp = parent_cmp_sql(parent),
        )
    };

    let mut stmt = conn.raw().prepare(&sql)?;
    let bind: &[&dyn ToSql] = match &parent {
        Some(p) => &[p],
        None => &[],
    };
    let mut rows = stmt.query(bind)?;

    let mut any_row = false;
    while let Some(row) = rows.next()? {
        any_row = true;
        let pk: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let discriminator: i64 = row.get(2)?;
        let d: Option<f64> = row.get(3)?;
        let i: Option<i64> = row.get(4)?;
        let s: Option<String> = row.get(5)?;
        let rel: String = row.get(6)?;

        let value = if flags.type_and_value {
            Some(row_to_value(discriminator, d, i, s)?)
        } else {
            None
        };
        let path = if flags.complete_path {
            Some(if parent_path.is_empty() {
                rel
            } else {
                format!("{parent_path}/{rel}")
            })
        } else {
            None
        };

        let item = MetadataItem {
            pk,
            name: flags.name.then_some(name),
            value,
            path,
        };
        if !callback(item) {
            return Ok(());
        }
    }

    if !any_row && recursive {
        if let Some(pk) = parent {
            // Zero rows from a recursive enumeration of a non-root parent is only
            // valid if the parent genuinely has no descendants; verify it exists.
            let exists: Option<i64> = conn
                .raw()
                .query_row(&format!("SELECT Pk FROM {table} WHERE Pk = ?1"), [pk], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(Error::NonExistingItem(pk));
            }
        }
    }

    Ok(())
}

pub fn enumerate_items_for_path(
    conn: &DbConnection,
    table: &str,
    path: &str,
    recursive: bool,
    flags: ItemFlags,
    callback: impl FnMut(MetadataItem) -> bool,
) -> Result<()> {
    let parts = parse_path(path)?;
    let parent = if parts.is_empty() {
        None
    } else {
        let pks = resolve_path(conn, table, &parts)?;
        if pks.len() != parts.len() {
            return Err(Error::InvalidPath(format!("path not found: '{path}'")));
        }
        Some(*pks.last().unwrap())
    };
    enumerate_items(conn, table, parent, recursive, flags, callback)
}

fn parent_cmp_sql(parent: Option<i64>) -> &'static str {
    match parent {
        Some(_) => "= ?1",
        None => "IS NULL",
    }
}

/// Creates or updates a single item under `parent`. Returns its primary key.
pub fn update_or_create_item(
    conn: &DbConnection,
    table: &str,
    parent: Option<i64>,
    create_if_missing: bool,
    name: &str,
    value: &Value,
) -> Result<i64> {
    validate_name(name)?;
    if let Some(p) = parent {
        let exists: Option<i64> = conn
            .raw()
            .query_row(&format!("SELECT Pk FROM {table} WHERE Pk = ?1"), [p], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(Error::NonExistingItem(p));
        }
    }

    let (discriminator, d, i, s) = effective_type_and_binds(value);

    if !create_if_missing {
        let updated = conn.raw().execute(
            &format!(
                "UPDATE {table} SET TypeDiscriminator=?1, ValueDouble=?2, ValueInteger=?3, \
                 ValueString=?4 WHERE Name=?5 AND AncestorId {parent_cmp}",
                parent_cmp = match parent {
                    Some(_) => "= ?6",
                    None => "IS NULL",
                }
            ),
            rusqlite::params_from_iter(
                update_params(discriminator, d, i, &s, name, parent)
                    .iter()
                    .map(|b| b.as_ref()),
            ),
        )?;
        if updated == 0 {
            return Err(Error::InvalidOperation(format!(
                "no existing item named '{name}' to update"
            )));
        }
    } else if parent.is_none() {
        // SQLite treats NULL as distinct from itself under a UNIQUE constraint,
        // so `ON CONFLICT(Name, AncestorId)` never fires for root-level items;
        // look the row up explicitly instead of relying on a constraint violation.
        let existing: Option<i64> = conn
            .raw()
            .query_row(
                &format!("SELECT Pk FROM {table} WHERE Name=?1 AND AncestorId IS NULL"),
                [name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(pk) => {
                conn.raw().execute(
                    &format!(
                        "UPDATE {table} SET TypeDiscriminator=?1, ValueDouble=?2, \
                         ValueInteger=?3, ValueString=?4 WHERE Pk=?5"
                    ),
                    rusqlite::params![discriminator as i64, d, i, s, pk],
                )?;
            }
            None => {
                conn.raw().execute(
                    &format!(
                        "INSERT INTO {table} (Name, AncestorId, TypeDiscriminator, ValueDouble, \
                         ValueInteger, ValueString) VALUES (?1, NULL, ?2, ?3, ?4, ?5)"
                    ),
                    rusqlite::params![name, discriminator as i64, d, i, s],
                )?;
            }
        }
    } else {
        let sql = format!(
            "INSERT INTO {table} (Name, AncestorId, TypeDiscriminator, ValueDouble, ValueInteger, ValueString) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(Name, AncestorId) DO UPDATE SET \
                TypeDiscriminator=excluded.TypeDiscriminator, \
                ValueDouble=excluded.ValueDouble, \
                ValueInteger=excluded.ValueInteger, \
                ValueString=excluded.ValueString \
             WHERE {table}.AncestorId = ?2",
        );
        conn.raw().execute(
            &sql,
            rusqlite::params![name, parent, discriminator as i64, d, i, s],
        )?;
    }

    let pk: i64 = conn
        .raw()
        .query_row(
            &format!(
                "SELECT Pk FROM {table} WHERE Name=?1 AND AncestorId {parent_cmp}",
                parent_cmp = match parent {
                    Some(_) => "= ?2",
                    None => "IS NULL",
                }
            ),
            rusqlite::params_from_iter(name_parent_params(name, parent).iter().map(|b| b.as_ref())),
            |row| row.get(0),
        )?;
    Ok(pk)
}

fn update_params<'a>(
    discriminator: TypeDiscriminator,
    d: Option<f64>,
    i: Option<i64>,
    s: &'a Option<String>,
    name: &'a str,
    parent: Option<i64>,
) -> Vec<Box<dyn ToSql + 'a>> {
    let mut v: Vec<Box<dyn ToSql + 'a>> = vec![
        Box::new(discriminator as i64),
        Box::new(d),
        Box::new(i),
        Box::new(s.clone()),
        Box::new(name.to_string()),
    ];
    if let Some(p) = parent {
        v.push(Box::new(p));
    }
    v
}

fn name_parent_params(name: &str, parent: Option<i64>) -> Vec<Box<dyn ToSql>> {
    let mut v: Vec<Box<dyn ToSql>> = vec![Box::new(name.to_string())];
    if let Some(p) = parent {
        v.push(Box::new(p));
    }
    v
}

pub fn update_or_create_item_for_path(
    conn: &DbConnection,
    table: &str,
    path: &str,
    create_path_if_missing: bool,
    create_node_if_missing: bool,
    value: &Value,
) -> Result<i64> {
    let parts = parse_path(path)?;
    if parts.is_empty() {
        return Err(Error::InvalidPath(
            "cannot create or update the implicit root".to_string(),
        ));
    }
    let mut pks = resolve_path(conn, table, &parts)?;

    if pks.len() < parts.len() - 1 {
        if !create_path_if_missing {
            return Err(Error::InvalidPath(format!(
                "intermediate path components missing for '{path}'"
            )));
        }
        for part in &parts[pks.len()..parts.len() - 1] {
            let parent = pks.last().copied();
            let pk = update_or_create_item(conn, table, parent, true, part, &Value::Null)?;
            pks.push(pk);
        }
    }

    let parent = if parts.len() == 1 {
        None
    } else {
        Some(pks[parts.len() - 2])
    };
    let leaf_name = parts.last().unwrap();
    update_or_create_item(conn, table, parent, create_node_if_missing, leaf_name, value)
}

/// Deletes a single item. `recursive = false` deletes only a childless node (a
/// no-op, not an error, if it has children or does not exist). `recursive = true`
/// deletes the node and its entire subtree. Returns the number of deleted rows.
pub fn delete_item(conn: &DbConnection, table: &str, pk: Option<i64>, recursive: bool) -> Result<u64> {
    match (pk, recursive) {
        (None, false) => Ok(0),
        (None, true) => {
            let n = conn
                .raw()
                .execute(&format!("DELETE FROM {table}"), [])?;
            Ok(n as u64)
        }
        (Some(id), false) => {
            let n = conn.raw().execute(
                &format!(
                    "DELETE FROM {table} WHERE Pk = ?1 \
                     AND NOT EXISTS(SELECT 1 FROM {table} c WHERE c.AncestorId = ?1)"
                ),
                [id],
            )?;
            Ok(n as u64)
        }
        (Some(id), true) => {
            let n = conn.raw().execute(
                &format!(
                    "WITH RECURSIVE children(id) AS (\
                        SELECT ?1 \
                        UNION ALL \
                        SELECT m.Pk FROM {table} m JOIN children c ON m.AncestorId = c.id\
                    ) DELETE FROM {table} WHERE Pk IN (SELECT id FROM children)"
                ),
                [id],
            )?;
            Ok(n as u64)
        }
    }
}

pub fn delete_item_for_path(
    conn: &DbConnection,
    table: &str,
    path: &str,
    recursive: bool,
) -> Result<u64> {
    let parts = parse_path(path)?;
    if parts.is_empty() {
        return delete_item(conn, table, None, recursive);
    }
    let pks = resolve_path(conn, table, &parts)?;
    if pks.len() != parts.len() {
        return Err(Error::InvalidPath(format!("path not found: '{path}'")));
    }
    delete_item(conn, table, Some(*pks.last().unwrap()), recursive)
}
