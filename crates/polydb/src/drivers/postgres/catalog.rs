//! PostgreSQL catalog queries over `pg_catalog` and `information_schema`.

use crate::drivers::sql_literal;

pub(super) fn tables(owner: &str, filter: &str) -> String {
    format!(
        "SELECT c.relname AS table_name, obj_description(c.oid, 'pg_class') AS description \
         FROM pg_catalog.pg_class c \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind IN ('r', 'p') AND n.nspname = {}{} \
         ORDER BY c.relname",
        sql_literal(owner),
        filter
    )
}

pub(super) fn columns(owner: &str, filter: &str) -> String {
    format!(
        "SELECT c.table_name AS table_name, c.column_name AS column_name, \
         c.data_type AS data_type, c.character_maximum_length AS length, \
         c.numeric_precision AS precision, c.numeric_scale AS scale, \
         CASE WHEN c.is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
         CASE WHEN c.is_identity = 'YES' THEN 1 ELSE 0 END AS identity, \
         0 AS primary_key, c.column_default AS default_value, \
         col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, \
         c.ordinal_position) AS description \
         FROM information_schema.columns c \
         WHERE c.table_schema = {}{} \
         ORDER BY c.table_name, c.ordinal_position",
        sql_literal(owner),
        filter
    )
}

pub(super) fn indexes(owner: &str, filter: &str) -> String {
    format!(
        "SELECT t.relname AS table_name, i.relname AS index_name, a.attname AS column_name, \
         ix.indisunique AS is_unique, ix.indisprimary AS is_primary \
         FROM pg_catalog.pg_index ix \
         JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
         JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
         JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
         JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
         WHERE n.nspname = {}{} \
         ORDER BY t.relname, i.relname, k.ord",
        sql_literal(owner),
        filter
    )
}
