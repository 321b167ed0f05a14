//! InfluxDB driver.
//!
//! InfluxDB is schemaless: measurements appear on first write and cannot be
//! altered, so DDL renders empty and the synchronizer skips it. Writes use
//! line protocol; catalog reads use Flux `schema.*` functions.

use chrono::NaiveDateTime;

use crate::batch::{epoch_nanos, UpsertStyle};
use crate::config::DbType;
use crate::core::identifier::NameRules;
use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::{CatalogReader, Dialect, SchemaDdl, SqlFormatter};
use crate::core::typemap::TypeTable;
use crate::error::Result;
use crate::paging::PagingStyle;

static TYPES: TypeTable = TypeTable::new(&[
    (DataType::Boolean, &["boolean"]),
    (DataType::Int64, &["integer"]),
    (DataType::Int32, &["integer"]),
    (DataType::Int16, &["integer"]),
    (DataType::Byte, &["integer", "unsigned"]),
    (DataType::Double, &["float"]),
    (DataType::Single, &["float"]),
    (DataType::Decimal, &["float"]),
    (DataType::String, &["string", "tag"]),
    (DataType::DateTime, &["timestamp", "time"]),
    (DataType::Guid, &["string"]),
    (DataType::Binary, &["string"]),
]);

const RESERVED: &str = "all,alter,any,as,asc,begin,by,create,continuous,database,databases,\
default,delete,desc,destinations,diagnostics,distinct,drop,duration,end,every,explain,field,for,\
from,grant,grants,group,groups,in,inf,insert,into,key,keys,kill,limit,show,measurement,\
measurements,name,offset,on,order,password,policy,policies,privileges,queries,query,read,\
replication,resample,retention,revoke,select,series,set,shard,shards,slimit,soffset,stats,\
subscription,subscriptions,tag,to,user,users,values,where,with,write";

fn flux_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn flux_filter(column: &str, names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let set: Vec<String> = names.iter().map(|n| flux_string(n)).collect();
    format!(
        " |> filter(fn: (r) => contains(value: r.{}, set: [{}]))",
        column,
        set.join(", ")
    )
}

/// InfluxDB dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct InfluxDialect;

impl InfluxDialect {
    /// Create a new InfluxDB dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl SqlFormatter for InfluxDialect {
    fn db_type(&self) -> DbType {
        DbType::InfluxDb
    }

    fn type_table(&self) -> &TypeTable {
        &TYPES
    }

    fn parameter_prefix(&self) -> &'static str {
        "$"
    }

    fn format_bool(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    fn format_datetime(&self, value: NaiveDateTime) -> Result<String> {
        Ok(epoch_nanos(value)?.to_string())
    }
}

impl SchemaDdl for InfluxDialect {
    fn create_table(&self, _table: &Table, _names: &NameRules) -> Result<String> {
        Ok(String::new())
    }

    fn drop_table(&self, table_name: &str, names: &NameRules) -> String {
        format!("DROP MEASUREMENT {}", names.table(table_name))
    }

    fn add_column(&self, _table: &Table, _column: &Column, _names: &NameRules) -> Result<String> {
        Ok(String::new())
    }

    fn alter_column(&self, _table: &Table, _column: &Column, _names: &NameRules) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn drop_column(&self, _table: &Table, _column_name: &str, _names: &NameRules) -> Result<String> {
        Ok(String::new())
    }

    fn create_index(
        &self,
        _table: &Table,
        _index: &crate::core::schema::Index,
        _names: &NameRules,
    ) -> Result<String> {
        Ok(String::new())
    }

    fn drop_index(&self, _table: &Table, _index_name: &str, _names: &NameRules) -> String {
        String::new()
    }

    fn rename_table(&self, _from: &str, _to: &str, _names: &NameRules) -> String {
        String::new()
    }

    fn can_alter_column(&self) -> bool {
        false
    }

    fn can_drop_column(&self, _version: Option<&str>) -> bool {
        false
    }

    fn transactional_ddl(&self) -> bool {
        false
    }

    fn supports_ddl(&self) -> bool {
        false
    }
}

impl CatalogReader for InfluxDialect {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        format!(
            "import \"influxdata/influxdb/schema\"\n\
             schema.measurements(bucket: {})\
              |> rename(columns: {{_value: \"table_name\"}})\
              |> map(fn: (r) => ({{r with description: \"\"}})){}",
            flux_string(owner.unwrap_or_default()),
            flux_filter("table_name", names)
        )
    }

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String {
        format!(
            "from(bucket: {})\
              |> range(start: 0){}\
              |> keep(columns: [\"_measurement\", \"_field\", \"_value\"])\
              |> group(columns: [\"_measurement\", \"_field\"])\
              |> last()\
              |> map(fn: (r) => ({{table_name: r._measurement, column_name: r._field, \
             data_type: \"float\", nullable: true}}))",
            flux_string(owner.unwrap_or_default()),
            flux_filter("_measurement", names)
        )
    }

    /// Tags are not reported as indexes.
    fn indexes_sql(&self, _owner: Option<&str>, _names: &[String]) -> String {
        String::new()
    }

    fn databases_sql(&self) -> Option<String> {
        Some("buckets() |> rename(columns: {name: \"database_name\"})".to_string())
    }
}

impl Dialect for InfluxDialect {
    fn paging_style(&self, _version: Option<&str>) -> PagingStyle {
        PagingStyle::OffsetLimit { unbounded: None }
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::LineProtocol
    }

    fn reserved_words(&self) -> &'static str {
        RESERVED
    }

    fn version_sql(&self) -> Option<&'static str> {
        None
    }
}
