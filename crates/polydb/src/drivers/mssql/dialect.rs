//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides SQL Server syntax for identifier quoting, literals, DDL and
//! pagination across server generations.

use chrono::NaiveDateTime;

use crate::batch::UpsertStyle;
use crate::config::DbType;
use crate::core::identifier::{NameRules, QuoteStyle};
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::drivers::{name_filter, sql_literal, version_major};
use crate::error::Result;
use crate::paging::PagingStyle;

use super::catalog;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["bit"]),
    (DataType::Byte, &["tinyint"]),
    (DataType::Int16, &["smallint"]),
    (DataType::Int32, &["int"]),
    (DataType::Int64, &["bigint"]),
    (DataType::Single, &["real"]),
    (DataType::Double, &["float"]),
    (
        DataType::Decimal,
        &["decimal({0},{1})", "numeric({0},{1})", "money", "smallmoney"],
    ),
    (
        DataType::String,
        &[
            "nvarchar({0})",
            "nvarchar(max)",
            "nchar({0})",
            "varchar({0})",
            "varchar(max)",
            "char({0})",
            "ntext",
            "text",
            "xml",
            "sysname",
        ],
    ),
    (
        DataType::DateTime,
        &["datetime", "datetime2", "smalldatetime", "date", "datetimeoffset", "time"],
    ),
    (DataType::Guid, &["uniqueidentifier"]),
    (
        DataType::Binary,
        &["varbinary({0})", "varbinary(max)", "binary({0})", "image", "timestamp", "rowversion"],
    ),
]);

const RESERVED: &str = "add,all,alter,and,any,as,asc,authorization,backup,begin,between,break,\
browse,bulk,by,cascade,case,check,checkpoint,close,clustered,coalesce,collate,column,commit,\
compute,constraint,contains,containstable,continue,convert,create,cross,current,current_date,\
current_time,current_timestamp,current_user,cursor,database,dbcc,deallocate,declare,default,\
delete,deny,desc,disk,distinct,distributed,double,drop,dump,else,end,errlvl,escape,except,exec,\
execute,exists,exit,external,fetch,file,fillfactor,for,foreign,freetext,freetexttable,from,full,\
function,goto,grant,group,having,holdlock,identity,identity_insert,identitycol,if,in,index,inner,\
insert,intersect,into,is,join,key,kill,left,like,lineno,load,merge,national,nocheck,nonclustered,\
not,null,nullif,of,off,offsets,on,open,opendatasource,openquery,openrowset,openxml,option,or,\
order,outer,over,percent,pivot,plan,precision,primary,print,proc,procedure,public,raiserror,read,\
readtext,reconfigure,references,replication,restore,restrict,return,revert,revoke,right,rollback,\
rowcount,rowguidcol,rule,save,schema,select,session_user,set,setuser,shutdown,some,statistics,\
system_user,table,tablesample,textsize,then,to,top,tran,transaction,trigger,truncate,try_convert,\
tsequal,union,unique,unpivot,update,updatetext,use,user,values,varying,view,waitfor,when,where,\
while,with,writetext";

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// `sp_addextendedproperty`, or the update form when the property exists.
    fn description_property(&self, table: &str, column: Option<&str>, text: &str) -> String {
        let value = format!("N{}", self.quote_literal(text));
        let target = match column {
            Some(col) => format!(
                "'SCHEMA', 'dbo', 'TABLE', {}, 'COLUMN', {}",
                sql_literal(table),
                sql_literal(col)
            ),
            None => format!("'SCHEMA', 'dbo', 'TABLE', {}", sql_literal(table)),
        };
        let minor = match column {
            Some(col) => format!(
                "COLUMNPROPERTY(OBJECT_ID({}), {}, 'ColumnId')",
                sql_literal(table),
                sql_literal(col)
            ),
            None => "0".to_string(),
        };
        format!(
            "IF EXISTS (SELECT 1 FROM sys.extended_properties WHERE major_id = OBJECT_ID({}) \
             AND minor_id = {} AND name = 'MS_Description') \
             EXEC sp_updateextendedproperty 'MS_Description', {}, {} \
             ELSE EXEC sp_addextendedproperty 'MS_Description', {}, {}",
            sql_literal(table),
            minor,
            value,
            target,
            value,
            target
        )
    }
}

impl SqlFormatter for MssqlDialect {
    fn db_type(&self) -> DbType {
        DbType::SqlServer
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Bracket
    }

    fn format_string(&self, column: &Column, text: &str) -> String {
        // Unicode columns need the N prefix or non-Latin text is mangled.
        let raw = column.raw_type.to_ascii_lowercase();
        if raw.is_empty() || raw.starts_with('n') {
            format!("N{}", self.quote_literal(text))
        } else {
            self.quote_literal(text)
        }
    }

    fn format_datetime(&self, value: NaiveDateTime) -> Result<String> {
        Ok(format!("{{ts'{}'}}", value.format("%Y-%m-%d %H:%M:%S%.3f")))
    }

    fn format_binary(&self, bytes: &[u8]) -> String {
        format!("0x{}", hex::encode_upper(bytes))
    }

    fn null_binary(&self) -> &'static str {
        "0x0"
    }

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("{}+{}", left, right)
    }

    fn escape_like(&self, value: &str) -> String {
        value
            .replace('[', "[[]")
            .replace('%', "[%]")
            .replace('_', "[_]")
    }
}

impl SchemaDdl for MssqlDialect {
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

    fn drop_index(&self, table: &Table, index_name: &str, names: &NameRules) -> String {
        format!(
            "DROP INDEX {} ON {}",
            names.quote(index_name),
            names.table(&table.name)
        )
    }

    fn rename_table(&self, from: &str, to: &str, _names: &NameRules) -> String {
        format!("EXEC sp_rename {}, {}", sql_literal(from), sql_literal(to))
    }

    fn identity_insert(&self, table_name: &str, on: bool, names: &NameRules) -> String {
        format!(
            "SET IDENTITY_INSERT {} {}",
            names.quote(table_name),
            if on { "ON" } else { "OFF" }
        )
    }

    fn table_comment(&self, table: &Table, names: &NameRules) -> String {
        match table.description.as_deref().filter(|d| !d.is_empty()) {
            Some(text) => self.description_property(&names.table_raw(&table.name), None, text),
            None => String::new(),
        }
    }

    fn column_comment(&self, table: &Table, column: &Column, names: &NameRules) -> String {
        match column.description.as_deref().filter(|d| !d.is_empty()) {
            Some(text) => self.description_property(
                &names.table_raw(&table.name),
                Some(&crate::core::identifier::fold_case(&column.name, names.format)),
                text,
            ),
            None => String::new(),
        }
    }
}

impl CatalogReader for MssqlDialect {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::tables(owner.unwrap_or("dbo"), &name_filter("t.name", names))
    }

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::columns(owner.unwrap_or("dbo"), &name_filter("t.name", names))
    }

    fn indexes_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        catalog::indexes(owner.unwrap_or("dbo"), &name_filter("t.name", names))
    }

    fn databases_sql(&self) -> Option<String> {
        Some("SELECT name AS database_name FROM sys.databases ORDER BY name".to_string())
    }
}

impl Dialect for MssqlDialect {
    fn paging_style(&self, version: Option<&str>) -> PagingStyle {
        match version_major(version) {
            Some(major) if major < 9 => PagingStyle::TopNotIn,
            Some(major) if major < 11 => PagingStyle::RankedSubquery,
            _ => PagingStyle::RowWindow,
        }
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::UpdateThenInsert
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        Some("SELECT CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128))")
    }

    fn default_owner(&self) -> Option<&'static str> {
        Some("dbo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::ReservedWords;
    use crate::core::schema::Index;
    use crate::core::value::SqlValue;
    use chrono::NaiveDate;

    fn names() -> NameRules {
        NameRules::new(QuoteStyle::Bracket).with_reserved(ReservedWords::from_list(RESERVED))
    }

    #[test]
    fn test_quote_ident() {
        let names = names();
        assert_eq!(names.column("Name"), "Name");
        assert_eq!(names.column("User"), "[User]");
        assert_eq!(names.column("table]name"), "[table]]name]");
    }

    #[test]
    fn test_format_values() {
        let d = MssqlDialect::new();
        let name = Column::new("Name", DataType::String);
        assert_eq!(d.format_value(&name, &"O'Brien".into()).unwrap(), "N'O''Brien'");

        let ascii = Column::new("Code", DataType::String).raw_type("varchar(10)");
        assert_eq!(d.format_value(&ascii, &"A1".into()).unwrap(), "'A1'");

        let at = Column::new("At", DataType::DateTime);
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 6)
            .unwrap();
        assert_eq!(
            d.format_value(&at, &SqlValue::DateTime(dt)).unwrap(),
            "{ts'2024-01-02 03:04:05.006'}"
        );

        let blob = Column::new("Data", DataType::Binary).not_null();
        assert_eq!(d.format_value(&blob, &vec![0xAB, 0x01].into()).unwrap(), "0xAB01");
        assert_eq!(d.format_value(&blob, &SqlValue::Null).unwrap(), "0x0");

        let flag = Column::new("Active", DataType::Boolean);
        assert_eq!(d.format_value(&flag, &true.into()).unwrap(), "1");
    }

    #[test]
    fn test_like_and_concat() {
        let d = MssqlDialect::new();
        assert_eq!(d.format_like("50%_[x]", "%{0}%", false), "'%50[%][_][[]x]%'");
        assert_eq!(d.format_like("a_b", "{0}%", true), "a[_]b%");
        assert_eq!(d.string_concat("a", "b"), "a+b");
        assert_eq!(d.format_parameter_name("id"), "@id");
    }

    #[test]
    fn test_paging_style_by_version() {
        let d = MssqlDialect::new();
        assert_eq!(d.paging_style(Some("16.0.1000.6")), PagingStyle::RowWindow);
        assert_eq!(d.paging_style(Some("11.00.2100")), PagingStyle::RowWindow);
        assert_eq!(d.paging_style(Some("10.50.1600")), PagingStyle::RankedSubquery);
        assert_eq!(d.paging_style(Some("9.00.1399")), PagingStyle::RankedSubquery);
        assert_eq!(d.paging_style(Some("8.00.194")), PagingStyle::TopNotIn);
        assert_eq!(d.paging_style(None), PagingStyle::RowWindow);
    }

    #[test]
    fn test_create_table() {
        let d = MssqlDialect::new();
        let mut table = Table::new("Users")
            .with_column(Column::new("Id", DataType::Int32).identity().primary_key())
            .with_column(Column::new("Name", DataType::String).length(50).not_null())
            .with_column(Column::new("Bio", DataType::String).length(8000));
        table.fix();
        assert_eq!(
            d.create_table(&table, &names()).unwrap(),
            "CREATE TABLE Users (Id int IDENTITY(1,1) NOT NULL, Name nvarchar(50) NOT NULL, \
             Bio nvarchar(max) NULL, PRIMARY KEY (Id))"
        );
    }

    #[test]
    fn test_alter_statements() {
        let d = MssqlDialect::new();
        let names = names();
        let table = Table::new("Users");
        let col = Column::new("Age", DataType::Int32);
        assert_eq!(
            d.add_column(&table, &col, &names).unwrap(),
            "ALTER TABLE Users ADD Age int NULL"
        );
        assert_eq!(
            d.drop_index(&table, "IX_Users_Age", &names),
            "DROP INDEX IX_Users_Age ON Users"
        );
        assert_eq!(
            d.create_index(&table, &Index::new("IU_Users_Age", ["Age"]).unique(), &names)
                .unwrap(),
            "CREATE UNIQUE INDEX IU_Users_Age ON Users (Age)"
        );
        assert_eq!(
            d.rename_table("Users", "Users_old", &names),
            "EXEC sp_rename 'Users', 'Users_old'"
        );
    }

    #[test]
    fn test_comments() {
        let d = MssqlDialect::new();
        let table = Table::new("Users").with_description("People");
        let sql = d.table_comment(&table, &names());
        assert!(sql.contains("sp_addextendedproperty 'MS_Description', N'People', 'SCHEMA', 'dbo', 'TABLE', 'Users'"));
        assert!(d.table_comment(&Table::new("Users"), &names()).is_empty());
    }

    #[test]
    fn test_catalog_sql_filters() {
        let d = MssqlDialect::new();
        let sql = d.columns_sql(None, &["Users".to_string(), "O'Neil".to_string()]);
        assert!(sql.contains("SCHEMA_NAME(t.schema_id) = 'dbo'"));
        assert!(sql.contains("t.name IN ('Users', 'O''Neil')"));
        assert!(!d.tables_sql(None, &[]).contains(" IN ("));
    }

    #[test]
    fn test_type_resolution() {
        let d = MssqlDialect::new();
        assert_eq!(d.resolve_type("nvarchar").unwrap().data_type, DataType::String);
        assert_eq!(d.resolve_type("uniqueidentifier").unwrap().data_type, DataType::Guid);
        assert_eq!(d.resolve_type("money").unwrap().data_type, DataType::Decimal);
        assert!(d.resolve_type("geography").is_none());
    }
}
