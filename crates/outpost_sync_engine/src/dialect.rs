//! Column type mapping from server dialects to local SQLite definitions.

use crate::error::{SyncError, SyncResult};
use outpost_sync_protocol::ColumnDef;

/// Server database types the default mapper understands.
pub const SERVER_DB_TYPES: [&str; 4] = ["MYSQL", "ORADB", "MSSQL", "POSTGRESQL"];

/// Translates server column metadata into local column definitions.
///
/// # Implementors
///
/// - [`DefaultColumnMapper`]
pub trait ColumnMapper: Send + Sync {
    /// Local column definition (type, default, nullability) for a column.
    fn map_column(&self, server_db_type: &str, column: &ColumnDef) -> SyncResult<String>;

    /// Returns true if the column carries binary large objects.
    fn is_blob(&self, server_db_type: &str, column: &ColumnDef) -> bool;

    /// Returns true if the column carries character large objects.
    fn is_clob(&self, server_db_type: &str, column: &ColumnDef) -> bool;

    /// Returns true if the column travels as LOB frames.
    fn is_lob(&self, server_db_type: &str, column: &ColumnDef) -> bool {
        self.is_blob(server_db_type, column) || self.is_clob(server_db_type, column)
    }
}

/// Mapper for MySQL, Oracle, SQL Server and PostgreSQL servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultColumnMapper;

impl DefaultColumnMapper {
    /// Creates the mapper.
    pub fn new() -> Self {
        Self
    }
}

/// Leading word of the upper-cased type name, e.g. `VARCHAR` for
/// `varchar(20) binary`.
fn base_type(column: &ColumnDef) -> String {
    let upper = column.type_name.to_uppercase();
    upper
        .split([' ', '('])
        .next()
        .unwrap_or_default()
        .to_string()
}

fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sized(ty: &str, precision: i64) -> String {
    if precision > 0 {
        format!("{ty}({precision})")
    } else {
        ty.to_string()
    }
}

impl DefaultColumnMapper {
    fn mysql(&self, column: &ColumnDef, ty: &str) -> (String, Option<String>) {
        let p = column.column_size;
        let s = column.decimal_digits;
        let default = column.default_value.as_deref();
        match ty {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" | "YEAR" => {
                (ty.into(), default.map(str::to_string))
            }
            // INTEGER PRIMARY KEY would alias the rowid.
            "INT" | "INTEGER" => ("INT".into(), default.map(str::to_string)),
            "DOUBLE" | "REAL" if s > 0 => (format!("{ty}({p},{s})"), default.map(str::to_string)),
            "DOUBLE" | "REAL" => (ty.into(), default.map(str::to_string)),
            "FLOAT" => (sized("FLOAT", p), default.map(str::to_string)),
            "DECIMAL" | "DEC" | "NUMERIC" => {
                (format!("{ty}({p},{s})"), default.map(str::to_string))
            }
            "BIT" => ("TINYINT(1)".into(), default.map(str::to_string)),
            "DATE" | "DATETIME" | "TIME" | "TIMESTAMP" => (ty.into(), None),
            "VARBINARY" => (format!("{ty}({p})"), None),
            _ if self.is_blob("MYSQL", column) || self.is_clob("MYSQL", column) => {
                (ty.into(), default.map(quoted))
            }
            "CHAR" | "VARCHAR" => (format!("{ty}({p})"), default.map(quoted)),
            _ if ty.contains("SET") || ty.contains("ENUM") => {
                ("VARCHAR(128)".into(), default.map(quoted))
            }
            _ => (format!("{ty}({p})"), default.map(quoted)),
        }
    }

    fn oracle(&self, column: &ColumnDef, ty: &str) -> (String, Option<String>) {
        let p = column.column_size;
        let s = column.decimal_digits;
        let default = column.default_value.clone();
        match ty {
            "NUMBER" | "DECIMAL" | "NUMERIC" if p > 0 => (format!("{ty}({p},{s})"), default),
            "NUMBER" | "DECIMAL" | "NUMERIC" => (ty.into(), default),
            "DATE" | "TIMESTAMP" => (ty.into(), None),
            "VARCHAR2" | "NVARCHAR2" | "VARCHAR" | "NVARCHAR" | "CHAR" | "NCHAR"
            | "CHARACTER" => (sized(ty, p), default),
            _ if self.is_blob("ORADB", column) => ("BLOB".into(), default),
            _ if self.is_clob("ORADB", column) => (ty.into(), default),
            "RAW" => (format!("{ty}({p})"), default),
            "INTEGER" => ("INT".into(), default),
            "INT" | "SMALLINT" | "DOUBLE" | "REAL" => (ty.into(), default),
            _ => (sized(ty, p), default),
        }
    }

    fn mssql(&self, column: &ColumnDef, ty: &str) -> (String, Option<String>) {
        let p = column.column_size;
        let s = column.decimal_digits;
        let default = column.default_value.as_deref().map(strip_mssql_default);
        match ty {
            _ if self.is_blob("MSSQL", column) => ("BLOB".into(), default),
            _ if self.is_clob("MSSQL", column) => (ty.into(), default),
            _ if ty.ends_with("IDENTITY") => (ty.trim_end_matches("IDENTITY").into(), default),
            "BIT" | "TINYINT" | "SMALLINT" | "BIGINT" => (ty.into(), default),
            "INT" | "INTEGER" => ("INT".into(), default),
            "REAL" if s > 0 => (format!("{ty}({p},{s})"), default),
            "REAL" | "SMALLMONEY" => (ty.into(), default),
            "FLOAT" => (sized(ty, p), default),
            "DECIMAL" | "NUMERIC" | "MONEY" => {
                let name = if ty == "MONEY" { "DECIMAL" } else { ty };
                (format!("{name}({p},{s})"), default)
            }
            "DATE" | "DATETIME" | "TIME" | "DATETIME2" => (ty.into(), default),
            "CHAR" | "NCHAR" => (format!("CHAR({p})"), default),
            "VARCHAR" | "NVARCHAR" => (format!("VARCHAR({p})"), default),
            "BINARY" | "VARBINARY" => (format!("{ty}({p})"), None),
            "TIMESTAMP" | "ROWVERSION" => (format!("VARBINARY({p})"), None),
            "UNIQUEIDENTIFIER" => ("VARCHAR(72)".into(), None),
            "SQL_VARIANT" | "TABLE" | "HIERARCHYID" => ("VARBINARY(4000)".into(), None),
            _ => (sized(ty, p), default),
        }
    }

    fn postgres(&self, column: &ColumnDef, ty: &str) -> (String, Option<String>) {
        let p = column.column_size;
        let s = column.decimal_digits;
        let default = column.default_value.clone();
        match ty {
            "BOOLEAN" | "BOOL" | "SMALLINT" | "INT2" | "BIGINT" | "INT8" | "REAL" | "FLOAT4" => {
                (ty.into(), default)
            }
            "INTEGER" | "INT4" => ("INT".into(), default),
            // Sequence defaults only exist on the server.
            "SERIAL" | "BIGSERIAL" => ("INT".into(), None),
            "DOUBLE" | "FLOAT8" => ("DOUBLE PRECISION".into(), default),
            "DECIMAL" | "NUMERIC" => (format!("{ty}({p},{s})"), default),
            "MONEY" => ("DECIMAL".into(), default),
            "BIT" | "BYTEA" => ("VARBINARY".into(), None),
            "DATE" | "TIME" | "TIMESTAMP" => (ty.into(), None),
            _ if ty.starts_with("INTERVAL") => (ty.into(), default),
            "TEXT" | "XML" => ("TEXT".into(), default),
            _ if self.is_blob("POSTGRESQL", column) => ("BLOB".into(), None),
            "CHAR" | "CHARACTER" | "BPCHAR" => (format!("CHAR({p})"), default),
            "VARCHAR" => (format!("{ty}({p})"), default),
            _ if ty.starts_with("ENUM") => ("VARCHAR(128)".into(), default),
            _ => (format!("{ty}({p})"), default),
        }
    }
}

/// Strips `(x)`/`((x))` wrapping and the `N` prefix of unicode literals.
fn strip_mssql_default(value: &str) -> String {
    let mut v = value.trim();
    if v.starts_with("((") && v.ends_with("))") && v.len() >= 4 {
        v = &v[2..v.len() - 2];
    } else if v.starts_with('(') && v.ends_with(')') && v.len() >= 2 {
        v = &v[1..v.len() - 1];
    }
    if v.len() >= 3 && v[..2].eq_ignore_ascii_case("N'") && v.ends_with('\'') {
        v = &v[1..];
    }
    v.to_string()
}

impl ColumnMapper for DefaultColumnMapper {
    fn map_column(&self, server_db_type: &str, column: &ColumnDef) -> SyncResult<String> {
        let ty = base_type(column);
        let (mut def, default) = match server_db_type {
            "MYSQL" => self.mysql(column, &ty),
            "ORADB" => self.oracle(column, &ty),
            "MSSQL" => self.mssql(column, &ty),
            "POSTGRESQL" => self.postgres(column, &ty),
            other => {
                return Err(SyncError::Catalog(format!(
                    "server database type not supported: {other}"
                )))
            }
        };
        if let Some(default) = default {
            def.push_str(" DEFAULT ");
            def.push_str(&default);
        }
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        Ok(def)
    }

    fn is_blob(&self, server_db_type: &str, column: &ColumnDef) -> bool {
        let ty = base_type(column);
        match server_db_type {
            "MYSQL" => matches!(ty.as_str(), "TINYBLOB" | "MEDIUMBLOB" | "BLOB" | "LONGBLOB"),
            "ORADB" => matches!(ty.as_str(), "BLOB" | "BFILE"),
            "MSSQL" => {
                column.data_type.as_deref() == Some("LONGVARBINARY")
                    || ty == "IMAGE"
                    || (ty == "VARBINARY" && column.column_size > 8000)
            }
            "POSTGRESQL" => ty == "OID",
            _ => false,
        }
    }

    fn is_clob(&self, server_db_type: &str, column: &ColumnDef) -> bool {
        let ty = base_type(column);
        match server_db_type {
            "MYSQL" => matches!(ty.as_str(), "TINYTEXT" | "MEDIUMTEXT" | "TEXT" | "LONGTEXT"),
            "ORADB" => matches!(ty.as_str(), "CLOB" | "NCLOB"),
            "MSSQL" => {
                matches!(
                    column.data_type.as_deref(),
                    Some("LONGVARCHAR" | "LONGNVARCHAR" | "SQLXML")
                ) || matches!(ty.as_str(), "TEXT" | "NTEXT" | "XML")
                    || (matches!(ty.as_str(), "VARCHAR" | "NVARCHAR") && column.column_size > 8000)
            }
            _ => false,
        }
    }
}

/// Quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(type_name: &str, size: i64, digits: i64) -> ColumnDef {
        ColumnDef {
            column_name: "c".into(),
            type_name: type_name.into(),
            column_size: size,
            decimal_digits: digits,
            nullable: true,
            ..ColumnDef::default()
        }
    }

    #[test]
    fn integer_never_aliases_rowid() {
        let mapper = DefaultColumnMapper::new();
        for db in SERVER_DB_TYPES {
            let def = mapper.map_column(db, &column("INTEGER", 10, 0)).unwrap();
            assert!(def.starts_with("INT"), "{db}: {def}");
            assert!(!def.starts_with("INTEGER"), "{db}: {def}");
        }
    }

    #[test]
    fn mysql_columns() {
        let mapper = DefaultColumnMapper::new();
        let mut name = column("varchar", 40, 0);
        name.nullable = false;
        name.default_value = Some("n/a".into());
        assert_eq!(
            mapper.map_column("MYSQL", &name).unwrap(),
            "VARCHAR(40) DEFAULT 'n/a' NOT NULL"
        );
        assert_eq!(
            mapper.map_column("MYSQL", &column("decimal", 10, 2)).unwrap(),
            "DECIMAL(10,2)"
        );
        let mut ts = column("TIMESTAMP", 0, 0);
        ts.default_value = Some("CURRENT_TIMESTAMP".into());
        assert_eq!(mapper.map_column("MYSQL", &ts).unwrap(), "TIMESTAMP");
    }

    #[test]
    fn mssql_defaults_lose_parentheses() {
        let mapper = DefaultColumnMapper::new();
        let mut col = column("int", 10, 0);
        col.default_value = Some("((0))".into());
        assert_eq!(mapper.map_column("MSSQL", &col).unwrap(), "INT DEFAULT 0");
        assert_eq!(strip_mssql_default("(N'abc')"), "'abc'");
    }

    #[test]
    fn lob_detection() {
        let mapper = DefaultColumnMapper::new();
        assert!(mapper.is_blob("MYSQL", &column("LONGBLOB", 0, 0)));
        assert!(mapper.is_clob("MYSQL", &column("text", 0, 0)));
        assert!(mapper.is_blob("ORADB", &column("BLOB", 0, 0)));
        assert!(mapper.is_clob("ORADB", &column("NCLOB", 0, 0)));
        assert!(mapper.is_blob("MSSQL", &column("varbinary", 9000, 0)));
        assert!(!mapper.is_blob("MSSQL", &column("varbinary", 100, 0)));
        assert!(mapper.is_clob("MSSQL", &column("nvarchar", 9000, 0)));
        assert!(mapper.is_blob("POSTGRESQL", &column("oid", 0, 0)));
        assert!(!mapper.is_lob("POSTGRESQL", &column("text", 0, 0)));
    }

    #[test]
    fn unknown_dialect_fails() {
        let mapper = DefaultColumnMapper::new();
        assert!(mapper.map_column("DB2", &column("INT", 4, 0)).is_err());
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
