//! `information_schema` catalog queries for MySQL and IRIS.
//!
//! `schema` is an already-rendered SQL expression (a literal or `DATABASE()`).

pub(super) fn tables(schema: &str, filter: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS table_name, TABLE_COMMENT AS description \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE'{} \
         ORDER BY TABLE_NAME",
        schema, filter
    )
}

pub(super) fn columns(schema: &str, filter: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name, \
         COLUMN_TYPE AS data_type, CHARACTER_MAXIMUM_LENGTH AS length, \
         NUMERIC_PRECISION AS `precision`, NUMERIC_SCALE AS scale, \
         CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS nullable, \
         CASE WHEN EXTRA LIKE '%auto_increment%' THEN 1 ELSE 0 END AS identity, \
         CASE WHEN COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS primary_key, \
         COLUMN_DEFAULT AS default_value, COLUMN_COMMENT AS description \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = {}{} \
         ORDER BY TABLE_NAME, ORDINAL_POSITION",
        schema, filter
    )
}

pub(super) fn indexes(schema: &str, filter: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS table_name, INDEX_NAME AS index_name, COLUMN_NAME AS column_name, \
         CASE WHEN NON_UNIQUE = 0 THEN 1 ELSE 0 END AS is_unique, \
         CASE WHEN INDEX_NAME = 'PRIMARY' THEN 1 ELSE 0 END AS is_primary \
         FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = {}{} \
         ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
        schema, filter
    )
}

pub(super) fn iris_columns(schema: &str, filter: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name, \
         DATA_TYPE AS data_type, CHARACTER_MAXIMUM_LENGTH AS length, \
         NUMERIC_PRECISION AS \"precision\", NUMERIC_SCALE AS scale, \
         CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS nullable, \
         CASE WHEN AUTO_INCREMENT = 'YES' OR IS_IDENTITY = 'YES' THEN 1 ELSE 0 END AS \"identity\", \
         CASE WHEN PRIMARY_KEY = 'YES' THEN 1 ELSE 0 END AS primary_key, \
         COLUMN_DEFAULT AS default_value, DESCRIPTION AS description \
         FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = {}{} \
         ORDER BY TABLE_NAME, ORDINAL_POSITION",
        schema, filter
    )
}

pub(super) fn iris_indexes(schema: &str, filter: &str) -> String {
    format!(
        "SELECT TABLE_NAME AS table_name, INDEX_NAME AS index_name, COLUMN_NAME AS column_name, \
         CASE WHEN NON_UNIQUE = 0 THEN 1 ELSE 0 END AS is_unique, \
         CASE WHEN PRIMARY_KEY = 1 THEN 1 ELSE 0 END AS is_primary \
         FROM INFORMATION_SCHEMA.INDEXES \
         WHERE TABLE_SCHEMA = {}{} \
         ORDER BY TABLE_NAME, INDEX_NAME, ORDINAL_POSITION",
        schema, filter
    )
}
