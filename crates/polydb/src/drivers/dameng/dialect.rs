//! DaMeng SQL dialect (Strategy pattern).
//!
//! DaMeng follows Oracle conventions: upper-case names by default, `MODIFY`
//! for column changes, `DUP_VAL_ON_INDEX` for duplicate keys, and DDL that
//! commits implicitly.

use chrono::{NaiveDateTime, Timelike};

use crate::batch::UpsertStyle;
use crate::config::{DbType, NameFormat};
use crate::core::format::iso_datetime;
use crate::core::identifier::NameRules;
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{detect_name_format, CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::drivers::{comment_on_column, comment_on_table, name_filter};
use crate::error::Result;
use crate::paging::PagingStyle;

use super::catalog;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["bit"]),
    (DataType::Byte, &["tinyint", "byte"]),
    (DataType::Int16, &["smallint"]),
    (DataType::Int32, &["int", "integer"]),
    (DataType::Int64, &["bigint"]),
    (DataType::Single, &["real", "float"]),
    (DataType::Double, &["double", "double precision"]),
    (
        DataType::Decimal,
        &["decimal({0},{1})", "number({0},{1})", "numeric({0},{1})", "dec({0},{1})"],
    ),
    (
        DataType::String,
        &["varchar({0})", "clob", "varchar2({0})", "char({0})", "text", "nvarchar({0})"],
    ),
    (DataType::DateTime, &["timestamp", "datetime", "date"]),
    (DataType::Guid, &["varchar(36)"]),
    (DataType::Binary, &["blob", "varbinary({0})", "binary({0})", "image"]),
]);

const RESERVED: &str = "abort,absolute,access,action,add,after,all,alter,and,any,array,as,asc,\
assign,audit,authorization,before,begin,between,bigint,binary,bit,blob,body,boolean,both,by,byte,\
call,cascade,case,cast,catch,char,character,check,cluster,column,comment,commit,compile,connect,\
constraint,context,continue,create,cross,current,cursor,date,dec,decimal,declare,default,delete,\
desc,distinct,domain,double,drop,else,elseif,end,escape,except,exception,exec,execute,exists,exit,\
extern,fetch,float,for,foreign,from,full,function,goto,grant,group,having,identity,if,in,index,\
inner,insert,int,integer,intersect,interval,into,is,join,key,left,level,like,limit,list,lock,loop,\
minus,mode,modify,natural,new,next,no,not,null,number,numeric,of,off,offset,on,only,open,option,\
or,order,out,outer,package,partition,primary,prior,privileges,procedure,public,raise,range,read,\
real,references,replace,return,revoke,right,rollback,row,rownum,rows,savepoint,schema,select,\
sequence,set,size,smallint,some,sql,start,synonym,table,then,time,timestamp,tinyint,to,top,\
trigger,true,truncate,type,union,unique,until,update,user,using,values,varchar,view,when,where,\
while,with,work";

/// DaMeng dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct DamengDialect;

impl DamengDialect {
    /// Create a new DaMeng dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl SqlFormatter for DamengDialect {
    fn db_type(&self) -> DbType {
        DbType::DaMeng
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }

    fn parameter_prefix(&self) -> &'static str {
        ":"
    }

    fn format_datetime(&self, value: NaiveDateTime) -> Result<String> {
        Ok(format!(
            "TO_DATE('{}','YYYY-MM-DD HH24:MI:SS')",
            iso_datetime(value.with_nanosecond(0).unwrap_or(value))
        ))
    }
}

impl SchemaDdl for DamengDialect {
    fn max_string_length(&self) -> i32 {
        8188
    }

    fn identity_clause(&self) -> &'static str {
        " IDENTITY(1,1)"
    }

    fn add_column(&self, table: &Table, column: &Column, names: &NameRules) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            names.table(&table.name),
            self.column_definition(column, names)?
        ))
    }

    fn alter_column(&self, table: &Table, column: &Column, names: &NameRules) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY {}",
            names.table(&table.name),
            self.alter_definition(column, names)?
        )])
    }

    fn table_comment(&self, table: &Table, names: &NameRules) -> String {
        comment_on_table(self, table, names)
    }

    fn column_comment(&self, table: &Table, column: &Column, names: &NameRules) -> String {
        comment_on_column(self, table, column, names)
    }

    fn create_database(&self, name: &str, names: &NameRules) -> String {
        format!("CREATE SCHEMA {}", names.quote(name))
    }

    fn drop_database(&self, name: &str, names: &NameRules) -> String {
        format!("DROP SCHEMA {} CASCADE", names.quote(name))
    }

    fn transactional_ddl(&self) -> bool {
        false
    }
}

impl CatalogReader for DamengDialect {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::tables(owner.unwrap_or("SYSDBA"), &name_filter("t.TABLE_NAME", names))
    }

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::columns(owner.unwrap_or("SYSDBA"), &name_filter("c.TABLE_NAME", names))
    }

    fn indexes_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::indexes(owner.unwrap_or("SYSDBA"), &name_filter("i.TABLE_NAME", names))
    }

    fn databases_sql(&self) -> Option<String> {
        Some(
            "SELECT NAME AS database_name FROM SYSOBJECTS WHERE TYPE$ = 'SCH' ORDER BY NAME"
                .to_string(),
        )
    }

    fn is_primary_index(&self, table: &str, index_name: &str, flagged: bool) -> bool {
        let name = index_name.to_ascii_uppercase();
        flagged || name == format!("PK_{}", table.to_ascii_uppercase()) || name.ends_with("_PK")
    }

    fn detect_name_format(&self, names: &[String]) -> NameFormat {
        if names.is_empty() {
            NameFormat::Upper
        } else {
            detect_name_format(names)
        }
    }
}

impl Dialect for DamengDialect {
    fn paging_style(&self, _version: Option<&str>) -> PagingStyle {
        PagingStyle::OffsetLimit {
            unbounded: Some("2147483647"),
        }
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::ExceptionBlock
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        Some("SELECT SVR_VERSION FROM V$INSTANCE")
    }

    fn default_owner(&self) -> Option<&'static str> {
        Some("SYSDBA")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::{QuoteStyle, ReservedWords};
    use crate::core::value::SqlValue;
    use chrono::NaiveDate;

    fn names() -> NameRules {
        NameRules::new(QuoteStyle::DoubleQuote)
            .with_format(NameFormat::Upper)
            .with_reserved(ReservedWords::from_list(RESERVED))
    }

    #[test]
    fn test_format_datetime() {
        let d = DamengDialect::new();
        let col = Column::new("At", DataType::DateTime);
        let dt = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_milli_opt(7, 8, 9, 500)
            .unwrap();
        assert_eq!(
            d.format_value(&col, &SqlValue::DateTime(dt)).unwrap(),
            "TO_DATE('2024-05-06 07:08:09','YYYY-MM-DD HH24:MI:SS')"
        );
        let flag = Column::new("On", DataType::Boolean);
        assert_eq!(d.format_value(&flag, &false.into()).unwrap(), "0");
        assert_eq!(d.format_parameter_name("id"), ":id");
    }

    #[test]
    fn test_modify_column() {
        let d = DamengDialect::new();
        let col = Column::new("Name", DataType::String).length(100).not_null();
        assert_eq!(
            d.alter_column(&Table::new("Users"), &col, &names()).unwrap(),
            vec!["ALTER TABLE USERS MODIFY NAME varchar(100) NOT NULL".to_string()]
        );
        assert!(!d.transactional_ddl());
    }

    #[test]
    fn test_name_format_defaults_to_upper() {
        let d = DamengDialect::new();
        assert_eq!(d.detect_name_format(&[]), NameFormat::Upper);
        assert_eq!(
            d.detect_name_format(&["users".to_string()]),
            NameFormat::Lower
        );
    }

    #[test]
    fn test_primary_key_by_index_name() {
        let d = DamengDialect::new();
        assert!(d.is_primary_index("USERS", "PK_USERS", false));
        assert!(d.is_primary_index("USERS", "USERS_PK", false));
        assert!(!d.is_primary_index("USERS", "IX_USERS_NAME", false));
    }
}
