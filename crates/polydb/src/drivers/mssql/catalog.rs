//! SQL Server catalog queries over `sys.*` views.

use crate::drivers::sql_literal;

pub(super) fn tables(owner: &str, filter: &str) -> String {
    format!(
        "SELECT t.name AS table_name, CAST(p.value AS nvarchar(4000)) AS description \
         FROM sys.tables t \
         LEFT JOIN sys.extended_properties p ON p.major_id = t.object_id \
         AND p.minor_id = 0 AND p.name = 'MS_Description' \
         WHERE SCHEMA_NAME(t.schema_id) = {}{} \
         ORDER BY t.name",
        sql_literal(owner),
        filter
    )
}

pub(super) fn columns(owner: &str, filter: &str) -> String {
    format!(
        "SELECT t.name AS table_name, c.name AS column_name, ty.name AS data_type, \
         CASE WHEN c.max_length = -1 THEN -1 \
         WHEN ty.name IN ('nchar', 'nvarchar') THEN c.max_length / 2 \
         ELSE c.max_length END AS length, \
         c.[precision] AS [precision], c.scale AS scale, \
         c.is_nullable AS nullable, c.is_identity AS [identity], \
         CASE WHEN EXISTS (SELECT 1 FROM sys.index_columns ic \
         JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
         WHERE i.is_primary_key = 1 AND ic.object_id = c.object_id \
         AND ic.column_id = c.column_id) THEN 1 ELSE 0 END AS primary_key, \
         OBJECT_DEFINITION(c.default_object_id) AS default_value, \
         CAST(p.value AS nvarchar(4000)) AS description \
         FROM sys.columns c \
         JOIN sys.tables t ON t.object_id = c.object_id \
         JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
         LEFT JOIN sys.extended_properties p ON p.major_id = c.object_id \
         AND p.minor_id = c.column_id AND p.name = 'MS_Description' \
         WHERE SCHEMA_NAME(t.schema_id) = {}{} \
         ORDER BY t.name, c.column_id",
        sql_literal(owner),
        filter
    )
}

pub(super) fn indexes(owner: &str, filter: &str) -> String {
    format!(
        "SELECT t.name AS table_name, i.name AS index_name, c.name AS column_name, \
         i.is_unique AS is_unique, i.is_primary_key AS is_primary \
         FROM sys.indexes i \
         JOIN sys.tables t ON t.object_id = i.object_id \
         JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
         JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
         WHERE i.name IS NOT NULL AND ic.is_included_column = 0 \
         AND SCHEMA_NAME(t.schema_id) = {}{} \
         ORDER BY t.name, i.name, ic.key_ordinal",
        sql_literal(owner),
        filter
    )
}
