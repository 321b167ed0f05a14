//! MySQL-protocol SQL dialect (Strategy pattern).
//!
//! Serves MySQL/MariaDB and InterSystems IRIS, which share quoting, literal
//! escaping, `LIMIT a, b` paging and `ON DUPLICATE KEY UPDATE`. IRIS has its
//! own catalog layout and default schema.

use crate::batch::UpsertStyle;
use crate::config::DbType;
use crate::core::identifier::{NameRules, QuoteStyle};
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::drivers::{name_filter, sql_literal};
use crate::error::Result;
use crate::paging::PagingStyle;

use super::catalog;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["tinyint(1)", "bit(1)", "bool", "boolean", "bit"]),
    (DataType::Byte, &["tinyint", "tinyint unsigned"]),
    (DataType::Int16, &["smallint", "smallint unsigned"]),
    (DataType::Int32, &["int", "integer", "mediumint", "int unsigned"]),
    (DataType::Int64, &["bigint", "bigint unsigned"]),
    (DataType::Single, &["float"]),
    (DataType::Double, &["double", "real", "double precision"]),
    (DataType::Decimal, &["decimal({0},{1})", "numeric({0},{1})"]),
    (
        DataType::String,
        &[
            "varchar({0})",
            "longtext",
            "char({0})",
            "text",
            "mediumtext",
            "tinytext",
            "longvarchar",
            "json",
            "enum",
            "set",
        ],
    ),
    (DataType::DateTime, &["datetime", "timestamp", "date", "time", "year"]),
    (DataType::Guid, &["char(36)"]),
    (
        DataType::Binary,
        &["varbinary({0})", "longblob", "blob", "binary({0})", "mediumblob", "tinyblob", "longvarbinary"],
    ),
]);

const RESERVED: &str = "accessible,add,all,alter,analyze,and,as,asc,asensitive,before,between,\
bigint,binary,blob,both,by,call,cascade,case,change,char,character,check,collate,column,condition,\
constraint,continue,convert,create,cross,cube,current_date,current_time,current_timestamp,\
current_user,cursor,database,databases,day_hour,day_microsecond,day_minute,day_second,dec,decimal,\
declare,default,delayed,delete,dense_rank,desc,describe,deterministic,distinct,distinctrow,div,\
double,drop,dual,each,else,elseif,enclosed,escaped,except,exists,exit,explain,false,fetch,float,\
for,force,foreign,from,fulltext,function,generated,get,grant,group,grouping,groups,having,\
high_priority,if,ignore,in,index,infile,inner,inout,insensitive,insert,int,integer,intersect,\
interval,into,is,iterate,join,key,keys,kill,lag,lead,leading,leave,left,like,limit,linear,lines,\
load,localtime,localtimestamp,lock,long,loop,low_priority,match,maxvalue,mod,modifies,natural,not,\
null,numeric,of,on,optimize,option,optionally,or,order,out,outer,over,partition,precision,primary,\
procedure,purge,range,rank,read,reads,real,recursive,references,regexp,release,rename,repeat,\
replace,require,resignal,restrict,return,revoke,right,rlike,row,rows,schema,schemas,select,\
sensitive,separator,set,show,signal,smallint,spatial,specific,sql,ssl,starting,stored,straight_join,\
system,table,terminated,then,to,trailing,trigger,true,undo,union,unique,unlock,unsigned,update,\
usage,use,using,utc_date,utc_time,utc_timestamp,values,varbinary,varchar,varying,virtual,when,\
where,while,window,with,write,xor,year_month,zerofill";

/// MySQL-protocol dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, MariaDB 10.2+ and IRIS.
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    db_type: DbType,
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self {
            db_type: DbType::MySql,
        }
    }

    pub fn iris() -> Self {
        Self {
            db_type: DbType::Iris,
        }
    }

    fn is_iris(&self) -> bool {
        self.db_type == DbType::Iris
    }

    /// Schema predicate: the named owner or the connection's database.
    fn schema(&self, owner: Option<&str>) -> String {
        match owner {
            Some(o) => sql_literal(o),
            None if self.is_iris() => sql_literal("SQLUser"),
            None => "DATABASE()".to_string(),
        }
    }
}

impl SqlFormatter for MysqlDialect {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }

    fn escape_backslash(&self) -> bool {
        true
    }

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("concat({},{})", left, right)
    }
}

impl SchemaDdl for MysqlDialect {
    fn identity_clause(&self) -> &'static str {
        " AUTO_INCREMENT"
    }

    fn alter_column(&self, table: &Table, column: &Column, names: &NameRules) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            names.table(&table.name),
            self.column_definition(column, names)?
        )])
    }

    fn drop_index(&self, table: &Table, index_name: &str, names: &NameRules) -> String {
        format!(
            "DROP INDEX {} ON {}",
            names.quote(index_name),
            names.table(&table.name)
        )
    }

    fn rename_table(&self, from: &str, to: &str, names: &NameRules) -> String {
        format!("RENAME TABLE {} TO {}", names.quote(from), names.quote(to))
    }

    fn table_comment(&self, table: &Table, names: &NameRules) -> String {
        match table.description.as_deref().filter(|d| !d.is_empty()) {
            Some(text) if !self.is_iris() => format!(
                "ALTER TABLE {} COMMENT = {}",
                names.table(&table.name),
                self.quote_literal(text)
            ),
            _ => String::new(),
        }
    }

    /// MySQL restates the whole column definition to change its comment.
    fn column_comment(&self, table: &Table, column: &Column, names: &NameRules) -> String {
        match column.description.as_deref().filter(|d| !d.is_empty()) {
            Some(text) if !self.is_iris() => match self.column_definition(column, names) {
                Ok(def) => format!(
                    "ALTER TABLE {} MODIFY COLUMN {} COMMENT {}",
                    names.table(&table.name),
                    def,
                    self.quote_literal(text)
                ),
                Err(_) => String::new(),
            },
            _ => String::new(),
        }
    }

    fn transactional_ddl(&self) -> bool {
        false
    }
}

impl CatalogReader for MysqlDialect {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::tables(&self.schema(owner), &name_filter("TABLE_NAME", names))
    }

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        let filter = name_filter("TABLE_NAME", names);
        if self.is_iris() {
            catalog::iris_columns(&self.schema(owner), &filter)
        } else {
            catalog::columns(&self.schema(owner), &filter)
        }
    }

    fn indexes_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        let filter = name_filter("TABLE_NAME", names);
        if self.is_iris() {
            catalog::iris_indexes(&self.schema(owner), &filter)
        } else {
            catalog::indexes(&self.schema(owner), &filter)
        }
    }

    fn databases_sql(&self) -> Option<String> {
        Some(
            "SELECT SCHEMA_NAME AS database_name FROM information_schema.SCHEMATA \
             ORDER BY SCHEMA_NAME"
                .to_string(),
        )
    }

    fn reserved_words_sql(&self) -> Option<String> {
        if self.is_iris() {
            None
        } else {
            Some("SELECT WORD AS word FROM information_schema.KEYWORDS WHERE RESERVED = 1".to_string())
        }
    }
}

impl Dialect for MysqlDialect {
    fn paging_style(&self, _version: Option<&str>) -> PagingStyle {
        PagingStyle::MySqlLimit
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnDuplicateKey
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        if self.is_iris() {
            Some("SELECT %SYSTEM.Version_GetNumber()")
        } else {
            Some("SELECT VERSION()")
        }
    }

    fn default_owner(&self) -> Option<&'static str> {
        if self.is_iris() {
            Some("SQLUser")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::ReservedWords;

    fn names() -> NameRules {
        NameRules::new(QuoteStyle::Backtick).with_reserved(ReservedWords::from_list(RESERVED))
    }

    #[test]
    fn test_quote_ident() {
        let names = names();
        assert_eq!(names.column("name"), "name");
        assert_eq!(names.column("key"), "`key`");
        assert_eq!(names.column("table`name"), "`table``name`");
    }

    #[test]
    fn test_string_literals_escape_backslash() {
        let d = MysqlDialect::new();
        let col = Column::new("Path", DataType::String);
        assert_eq!(
            d.format_value(&col, &"C:\\it's".into()).unwrap(),
            "'C:\\\\it''s'"
        );
        assert_eq!(d.string_concat("a", "b"), "concat(a,b)");
        assert_eq!(d.format_parameter_name("id"), "@id");
    }

    #[test]
    fn test_boolean_type_resolution() {
        let d = MysqlDialect::new();
        assert_eq!(d.resolve_type("tinyint(1)").unwrap().data_type, DataType::Boolean);
        assert_eq!(d.resolve_type("tinyint(4)").unwrap().data_type, DataType::Byte);
        assert_eq!(d.resolve_type("int(11)").unwrap().data_type, DataType::Int32);
        assert_eq!(d.resolve_type("bigint unsigned").unwrap().data_type, DataType::Int64);
        assert_eq!(d.resolve_type("varchar(255)").unwrap().length, 255);
    }

    #[test]
    fn test_ddl_statements() {
        let d = MysqlDialect::new();
        let names = names();
        let table = Table::new("Users").with_description("people");
        let col = Column::new("Age", DataType::Int32).not_null();
        assert_eq!(
            d.alter_column(&table, &col, &names).unwrap(),
            vec!["ALTER TABLE Users MODIFY COLUMN Age int NOT NULL".to_string()]
        );
        assert_eq!(d.drop_index(&table, "IX_Age", &names), "DROP INDEX IX_Age ON Users");
        assert_eq!(d.rename_table("Users", "Users_old", &names), "RENAME TABLE Users TO Users_old");
        assert_eq!(d.table_comment(&table, &names), "ALTER TABLE Users COMMENT = 'people'");
        assert!(!d.transactional_ddl());
    }

    #[test]
    fn test_iris_flavor() {
        let iris = MysqlDialect::iris();
        assert_eq!(iris.db_type(), DbType::Iris);
        assert_eq!(iris.default_owner(), Some("SQLUser"));
        assert!(iris.columns_sql(None, &[]).contains("'SQLUser'"));
        assert!(iris.reserved_words_sql().is_none());
        assert!(MysqlDialect::new().tables_sql(None, &[]).contains("DATABASE()"));
    }
}
