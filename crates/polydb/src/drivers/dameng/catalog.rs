//! DaMeng catalog queries over the `ALL_*` dictionary views and `SYSOBJECTS`.

use crate::drivers::sql_literal;

pub(super) fn tables(owner: &str, filter: &str) -> String {
    format!(
        "SELECT t.TABLE_NAME AS table_name, c.COMMENTS AS description \
         FROM ALL_TABLES t \
         LEFT JOIN ALL_TAB_COMMENTS c ON c.OWNER = t.OWNER AND c.TABLE_NAME = t.TABLE_NAME \
         WHERE t.OWNER = {}{} \
         ORDER BY t.TABLE_NAME",
        sql_literal(owner),
        filter
    )
}

pub(super) fn columns(owner: &str, filter: &str) -> String {
    format!(
        "SELECT c.TABLE_NAME AS table_name, c.COLUMN_NAME AS column_name, \
         c.DATA_TYPE AS data_type, c.DATA_LENGTH AS length, \
         c.DATA_PRECISION AS \"precision\", c.DATA_SCALE AS scale, \
         CASE WHEN c.NULLABLE = 'Y' THEN 1 ELSE 0 END AS nullable, \
         CASE WHEN EXISTS (SELECT 1 FROM SYSCOLUMNS s JOIN SYSOBJECTS o ON o.ID = s.ID \
         WHERE o.NAME = c.TABLE_NAME AND s.NAME = c.COLUMN_NAME AND s.INFO2 & 1 = 1) \
         THEN 1 ELSE 0 END AS \"identity\", \
         0 AS primary_key, c.DATA_DEFAULT AS default_value, m.COMMENTS AS description \
         FROM ALL_TAB_COLUMNS c \
         LEFT JOIN ALL_COL_COMMENTS m ON m.OWNER = c.OWNER \
         AND m.TABLE_NAME = c.TABLE_NAME AND m.COLUMN_NAME = c.COLUMN_NAME \
         WHERE c.OWNER = {}{} \
         ORDER BY c.TABLE_NAME, c.COLUMN_ID",
        sql_literal(owner),
        filter
    )
}

pub(super) fn indexes(owner: &str, filter: &str) -> String {
    format!(
        "SELECT i.TABLE_NAME AS table_name, i.INDEX_NAME AS index_name, \
         ic.COLUMN_NAME AS column_name, \
         CASE WHEN i.UNIQUENESS = 'UNIQUE' THEN 1 ELSE 0 END AS is_unique, \
         CASE WHEN EXISTS (SELECT 1 FROM ALL_CONSTRAINTS k WHERE k.OWNER = i.TABLE_OWNER \
         AND k.CONSTRAINT_TYPE = 'P' AND k.INDEX_NAME = i.INDEX_NAME) \
         THEN 1 ELSE 0 END AS is_primary \
         FROM ALL_INDEXES i \
         JOIN ALL_IND_COLUMNS ic ON ic.INDEX_OWNER = i.OWNER AND ic.INDEX_NAME = i.INDEX_NAME \
         WHERE i.TABLE_OWNER = {}{} \
         ORDER BY i.TABLE_NAME, i.INDEX_NAME, ic.COLUMN_POSITION",
        sql_literal(owner),
        filter
    )
}
