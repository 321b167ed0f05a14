//! SQLite SQL dialect (Strategy pattern).
//!
//! SQLite cannot change a column in place and only drops columns from 3.35,
//! so most structural changes go through a table rebuild.

use crate::batch::UpsertStyle;
use crate::config::DbType;
use crate::core::identifier::NameRules;
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::drivers::{name_filter, version_at_least};
use crate::error::Result;
use crate::paging::PagingStyle;

use super::catalog;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["boolean", "bit"]),
    (DataType::Byte, &["tinyint"]),
    (DataType::Int16, &["smallint"]),
    (DataType::Int32, &["int", "mediumint"]),
    (DataType::Int64, &["integer", "bigint"]),
    (DataType::Single, &["float"]),
    (DataType::Double, &["real", "double", "double precision"]),
    (DataType::Decimal, &["decimal({0},{1})", "numeric"]),
    (
        DataType::String,
        &["nvarchar({0})", "text", "varchar({0})", "char({0})", "nchar({0})", "clob"],
    ),
    (DataType::DateTime, &["datetime", "date", "timestamp"]),
    (DataType::Guid, &["uniqueidentifier", "guid"]),
    (DataType::Binary, &["blob", "binary", "varbinary"]),
]);

const RESERVED: &str = "abort,action,add,after,all,alter,always,analyze,and,as,asc,attach,\
autoincrement,before,begin,between,by,cascade,case,cast,check,collate,column,commit,conflict,\
constraint,create,cross,current,current_date,current_time,current_timestamp,database,default,\
deferrable,deferred,delete,desc,detach,distinct,do,drop,each,else,end,escape,except,exclude,\
exclusive,exists,explain,fail,filter,first,following,for,foreign,from,full,generated,glob,group,\
groups,having,if,ignore,immediate,in,index,indexed,initially,inner,insert,instead,intersect,into,\
is,isnull,join,key,last,left,like,limit,match,materialized,natural,no,not,nothing,notnull,null,\
nulls,of,offset,on,or,order,others,outer,over,partition,plan,pragma,preceding,primary,query,\
raise,range,recursive,references,regexp,reindex,release,rename,replace,restrict,returning,right,\
rollback,row,rows,savepoint,select,set,table,temp,temporary,then,ties,to,transaction,trigger,\
unbounded,union,unique,update,using,vacuum,values,view,virtual,when,where,window,with,without";

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl SqlFormatter for SqliteDialect {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }
}

impl SchemaDdl for SqliteDialect {
    fn max_string_length(&self) -> i32 {
        0
    }

    fn field_type(&self, column: &Column) -> Result<String> {
        // Only INTEGER PRIMARY KEY aliases the rowid.
        if column.identity {
            return Ok("integer".to_string());
        }
        self.type_table().render(column, self.max_string_length()).ok_or_else(|| {
            crate::error::DbError::Unsupported(format!(
                "sqlite has no type for {:?} (column {})",
                column.data_type, column.name
            ))
        })
    }

    fn column_definition(&self, column: &Column, names: &NameRules) -> Result<String> {
        if column.identity {
            return Ok(format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                names.column(&column.name)
            ));
        }
        let mut def = format!("{} {}", names.column(&column.name), self.field_type(column)?);
        def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = column.default_value.as_deref().filter(|d| !d.is_empty()) {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        Ok(def)
    }

    fn primary_key_clause(&self, table: &Table, names: &NameRules) -> Option<String> {
        if table.primary_keys().iter().any(|c| c.identity) {
            return None;
        }
        let keys: Vec<String> = table
            .primary_keys()
            .iter()
            .map(|c| names.column(&c.name))
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(format!("PRIMARY KEY ({})", keys.join(", ")))
        }
    }

    fn create_database(&self, _name: &str, _names: &NameRules) -> String {
        String::new()
    }

    fn drop_database(&self, _name: &str, _names: &NameRules) -> String {
        String::new()
    }

    fn can_alter_column(&self) -> bool {
        false
    }

    fn can_drop_column(&self, version: Option<&str>) -> bool {
        version_at_least(version, 3, 35)
    }
}

impl CatalogReader for SqliteDialect {
    fn tables_sql(&self, _owner: Option<&str>, names: &[String]) -> String {
        catalog::tables(&name_filter("m.name", names))
    }

    fn columns_sql(&self, _owner: Option<&str>, names: &[String]) -> String {
        catalog::columns(&name_filter("m.name", names))
    }

    fn indexes_sql(&self, _owner: Option<&str>, names: &[String]) -> String {
        catalog::indexes(&name_filter("m.name", names))
    }

    fn databases_sql(&self) -> Option<String> {
        Some("SELECT name AS database_name FROM pragma_database_list ORDER BY seq".to_string())
    }

    fn is_primary_index(&self, table: &str, index_name: &str, flagged: bool) -> bool {
        flagged
            || index_name
                .to_ascii_lowercase()
                .eq(&format!("pk_{}", table.to_ascii_lowercase()))
    }
}

impl Dialect for SqliteDialect {
    fn paging_style(&self, _version: Option<&str>) -> PagingStyle {
        PagingStyle::OffsetLimit {
            unbounded: Some("-1"),
        }
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        Some("SELECT sqlite_version()")
    }
}
