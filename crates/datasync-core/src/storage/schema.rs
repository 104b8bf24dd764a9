//! Per-type index tables
//!
//! Every document type gets its own table holding one row per stored
//! document. Table names are derived from the type identifier and carry a
//! reserved prefix, so managed tables can be told apart from anything else
//! living in the same database.

use rusqlite::{Connection, OptionalExtension};

use super::error::{StoreError, StoreResult};
use crate::key::ObjectKey;

/// Prefix shared by all managed type tables
pub const TABLE_PREFIX: &str = "data_";

/// Derive the table name for a type identifier
///
/// ASCII lowercase letters and digits are kept, every other byte (uppercase
/// letters included) becomes `_xx` with the byte in lowercase hex. The result
/// is a valid bare SQL identifier with no uppercase characters, so the
/// mapping stays injective under SQLite's case-insensitive identifier
/// matching (see [`type_name_from_table`]).
pub fn table_name(type_name: &[u8]) -> String {
    let mut name = String::with_capacity(TABLE_PREFIX.len() + type_name.len());
    name.push_str(TABLE_PREFIX);
    for &byte in type_name {
        if is_kept(byte) {
            name.push(byte as char);
        } else {
            name.push_str(&format!("_{:02x}", byte));
        }
    }
    name
}

/// Recover the type identifier from a managed table name
///
/// Returns `None` for names that were not produced by [`table_name`].
pub fn type_name_from_table(table: &str) -> Option<Vec<u8>> {
    let encoded = table.strip_prefix(TABLE_PREFIX)?.as_bytes();
    let mut type_name = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        match encoded[i] {
            b'_' => {
                let hex = encoded.get(i + 1..i + 3)?;
                if !hex.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)) {
                    return None;
                }
                let byte = u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?;
                if is_kept(byte) {
                    return None;
                }
                type_name.push(byte);
                i += 3;
            }
            byte if is_kept(byte) => {
                type_name.push(byte);
                i += 1;
            }
            _ => return None,
        }
    }
    Some(type_name)
}

fn is_kept(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit()
}

/// Check whether a table exists in the database
///
/// SQLite matches identifiers case-insensitively. A table whose name equals
/// `table` only up to case is not ours and is reported as an error rather
/// than adopted.
pub fn table_exists(conn: &Connection, table: &str, key: &ObjectKey) -> StoreResult<bool> {
    const SQL: &str =
        "SELECT name FROM sqlite_master WHERE type='table' AND name = ? COLLATE NOCASE";
    let existing: Option<String> = conn
        .query_row(SQL, [table], |row| row.get(0))
        .optional()
        .map_err(|e| StoreError::sql(Some(key), SQL, e))?;

    match existing {
        None => Ok(false),
        Some(name) if name == table => Ok(true),
        Some(name) => Err(StoreError::persistence(
            Some(key),
            SQL,
            format!("table '{}' collides with existing table '{}'", table, name),
        )),
    }
}

/// Create the index table for one type
pub fn create_table(conn: &Connection, table: &str, key: &ObjectKey) -> StoreResult<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            Key TEXT NOT NULL,
            Version INTEGER NOT NULL DEFAULT 1,
            File TEXT NOT NULL,
            Checksum BLOB NOT NULL,
            PRIMARY KEY(Key)
        )
        "#
    );
    conn.execute_batch(&sql)
        .map_err(|e| StoreError::sql(Some(key), sql.trim(), e))
}

/// List every managed type table
pub fn managed_tables(conn: &Connection) -> StoreResult<Vec<String>> {
    const SQL: &str = "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name";
    let mut stmt = conn.prepare(SQL).map_err(|e| StoreError::sql(None, SQL, e))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| StoreError::sql(None, SQL, e))?;

    Ok(names
        .into_iter()
        .filter(|name| name.starts_with(TABLE_PREFIX))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_deterministic() {
        assert_eq!(table_name(b"user"), "data_user");
        assert_eq!(table_name(b"User"), table_name(b"User"));
        assert_eq!(table_name(b"User"), "data__55ser");
        assert_eq!(table_name(b"my::type"), "data_my_3a_3atype");
        assert_eq!(table_name(b"a_b"), "data_a_5fb");
        assert_eq!(table_name(b"a b.c"), "data_a_20b_2ec");
    }

    #[test]
    fn test_table_name_has_no_collisions() {
        // `_` is escaped too, so a literal "_3a" can't alias ":"
        assert_ne!(table_name(b"a:"), table_name(b"a_3a"));
        assert_ne!(table_name(b""), table_name(b"_"));
        // SQLite folds identifier case
        assert_ne!(
            table_name(b"User").to_lowercase(),
            table_name(b"user").to_lowercase()
        );
        assert_ne!(
            table_name(b"Ab").to_lowercase(),
            table_name(b"aB").to_lowercase()
        );
        assert!(!table_name(b"MixedCase::Type\xff").chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_type_name_round_trip() {
        for name in [&b"User"[..], b"user", b"my::Type", b"a_b", b"\xff\x00x", b""] {
            let table = table_name(name);
            assert_eq!(type_name_from_table(&table).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_type_name_from_foreign_table() {
        assert_eq!(type_name_from_table("schema_info"), None);
        assert_eq!(type_name_from_table("data_bad-name"), None);
        assert_eq!(type_name_from_table("data_x_4"), None);
        // Uppercase is never produced, neither literally nor in escapes
        assert_eq!(type_name_from_table("data_User"), None);
        assert_eq!(type_name_from_table("data__3A"), None);
        // Kept bytes are never escaped
        assert_eq!(type_name_from_table("data__61"), None);
    }

    #[test]
    fn test_table_exists_rejects_case_folded_match() {
        let conn = Connection::open_in_memory().unwrap();
        let key = ObjectKey::for_type("user");
        conn.execute_batch("CREATE TABLE DATA_USER (x INTEGER)").unwrap();

        let err = table_exists(&conn, &table_name(b"user"), &key).unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert!(err.to_string().contains("DATA_USER"));
    }

    #[test]
    fn test_create_and_list_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let key = ObjectKey::for_type("User");
        let table = table_name(b"User");

        assert!(!table_exists(&conn, &table, &key).unwrap());
        create_table(&conn, &table, &key).unwrap();
        assert!(table_exists(&conn, &table, &key).unwrap());

        conn.execute_batch("CREATE TABLE unrelated (x INTEGER)").unwrap();

        let tables = managed_tables(&conn).unwrap();
        assert_eq!(tables, vec!["data__55ser".to_string()]);
    }

    #[test]
    fn test_version_defaults_to_one() {
        let conn = Connection::open_in_memory().unwrap();
        let table = table_name(b"User");
        create_table(&conn, &table, &ObjectKey::for_type("User")).unwrap();

        conn.execute(
            &format!("INSERT INTO {table} (Key, File, Checksum) VALUES ('a', 'f', 'c')"),
            [],
        )
        .unwrap();
        let version: i64 = conn
            .query_row(&format!("SELECT Version FROM {table} WHERE Key = 'a'"), [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }
}
