//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! One implementation serves PostgreSQL and the derivatives that speak its
//! wire protocol and catalog (HighGo, KingBase, VastBase). The flavor only
//! changes the backend tag and primary-key index detection.

use crate::batch::UpsertStyle;
use crate::config::DbType;
use crate::core::identifier::NameRules;
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::drivers::{comment_on_column, comment_on_table, name_filter};
use crate::error::Result;
use crate::paging::PagingStyle;

use super::catalog;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["boolean", "bool"]),
    (DataType::Int16, &["smallint", "int2"]),
    (DataType::Byte, &["smallint"]),
    (DataType::Int32, &["integer", "int", "int4", "serial"]),
    (DataType::Int64, &["bigint", "int8", "bigserial"]),
    (DataType::Single, &["real", "float4"]),
    (DataType::Double, &["double precision", "float8"]),
    (DataType::Decimal, &["numeric({0},{1})", "decimal({0},{1})", "money"]),
    (
        DataType::String,
        &[
            "character varying({0})",
            "varchar({0})",
            "text",
            "character({0})",
            "char({0})",
            "bpchar",
            "citext",
            "json",
            "jsonb",
            "xml",
        ],
    ),
    (
        DataType::DateTime,
        &[
            "timestamp without time zone",
            "timestamp",
            "timestamp with time zone",
            "timestamptz",
            "date",
            "time without time zone",
        ],
    ),
    (DataType::Guid, &["uuid"]),
    (DataType::Binary, &["bytea"]),
]);

const RESERVED: &str = "all,analyse,analyze,and,any,array,as,asc,asymmetric,authorization,binary,\
both,case,cast,check,collate,collation,column,concurrently,constraint,create,cross,current_catalog,\
current_date,current_role,current_schema,current_time,current_timestamp,current_user,default,\
deferrable,desc,distinct,do,else,end,except,false,fetch,for,foreign,freeze,from,full,grant,group,\
having,ilike,in,initially,inner,intersect,into,is,isnull,join,lateral,leading,left,like,limit,\
localtime,localtimestamp,natural,not,notnull,null,offset,on,only,or,order,outer,overlaps,placing,\
primary,references,returning,right,select,session_user,similar,some,symmetric,system_user,table,\
tablesample,then,to,trailing,true,union,unique,user,using,variadic,verbose,when,where,window,with";

/// PostgreSQL-family dialect implementation.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    db_type: DbType,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self {
            db_type: DbType::PostgreSql,
        }
    }

    pub fn highgo() -> Self {
        Self {
            db_type: DbType::HighGo,
        }
    }

    pub fn kingbase() -> Self {
        Self {
            db_type: DbType::KingBase,
        }
    }

    pub fn vastbase() -> Self {
        Self {
            db_type: DbType::VastBase,
        }
    }
}

impl SqlFormatter for PostgresDialect {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }

    fn parameter_prefix(&self) -> &'static str {
        ":"
    }

    fn format_bool(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    fn format_binary(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'", hex::encode(bytes))
    }
}

impl SchemaDdl for PostgresDialect {
    fn max_string_length(&self) -> i32 {
        10_485_760
    }

    fn identity_clause(&self) -> &'static str {
        " GENERATED BY DEFAULT AS IDENTITY"
    }

    fn alter_column(&self, table: &Table, column: &Column, names: &NameRules) -> Result<Vec<String>> {
        let table_name = names.table(&table.name);
        let column_name = names.column(&column.name);
        Ok(vec![
            format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                table_name,
                column_name,
                self.field_type(column)?
            ),
            format!(
                "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
                table_name,
                column_name,
                if column.nullable { "DROP" } else { "SET" }
            ),
        ])
    }

    fn table_comment(&self, table: &Table, names: &NameRules) -> String {
        comment_on_table(self, table, names)
    }

    fn column_comment(&self, table: &Table, column: &Column, names: &NameRules) -> String {
        comment_on_column(self, table, column, names)
    }
}

impl CatalogReader for PostgresDialect {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::tables(owner.unwrap_or("public"), &name_filter("c.relname", names))
    }

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::columns(owner.unwrap_or("public"), &name_filter("c.table_name", names))
    }

    fn indexes_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::indexes(owner.unwrap_or("public"), &name_filter("t.relname", names))
    }

    fn databases_sql(&self) -> Option<String> {
        Some(
            "SELECT datname AS database_name FROM pg_catalog.pg_database \
             WHERE NOT datistemplate ORDER BY datname"
                .to_string(),
        )
    }

    fn reserved_words_sql(&self) -> Option<String> {
        Some("SELECT word FROM pg_get_keywords() WHERE catcode IN ('R', 'T')".to_string())
    }

    fn is_identity(&self, flagged: bool, default_value: Option<&str>) -> bool {
        flagged || default_value.is_some_and(|d| d.to_ascii_lowercase().contains("nextval("))
    }

    fn is_primary_index(&self, table: &str, index_name: &str, flagged: bool) -> bool {
        if flagged {
            return true;
        }
        // KingBase reports constraint-backed indexes without indisprimary.
        if self.db_type == DbType::KingBase {
            let name = index_name.to_ascii_lowercase();
            return name == format!("{}_pkey", table.to_ascii_lowercase())
                || name.starts_with("pk_");
        }
        false
    }
}

impl Dialect for PostgresDialect {
    fn paging_style(&self, _version: Option<&str>) -> PagingStyle {
        PagingStyle::OffsetLimit { unbounded: None }
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        Some("SHOW server_version")
    }

    fn default_owner(&self) -> Option<&'static str> {
        Some("public")
    }
}
