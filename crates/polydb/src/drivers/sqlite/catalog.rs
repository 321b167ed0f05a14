//! SQLite catalog queries over `sqlite_master` and the pragma functions.

const USER_TABLES: &str = "m.type = 'table' AND m.name NOT LIKE 'sqlite_%'";

pub(super) fn tables(filter: &str) -> String {
    format!(
        "SELECT m.name AS table_name, NULL AS description \
         FROM sqlite_master m WHERE {}{} ORDER BY m.name",
        USER_TABLES, filter
    )
}

pub(super) fn columns(filter: &str) -> String {
    format!(
        "SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type, \
         NULL AS length, NULL AS precision, NULL AS scale, \
         CASE WHEN p.\"notnull\" = 0 AND p.pk = 0 THEN 1 ELSE 0 END AS nullable, \
         CASE WHEN p.pk > 0 AND lower(p.type) = 'integer' \
         AND upper(m.sql) LIKE '%AUTOINCREMENT%' THEN 1 ELSE 0 END AS identity, \
         CASE WHEN p.pk > 0 THEN 1 ELSE 0 END AS primary_key, \
         p.dflt_value AS default_value, NULL AS description \
         FROM sqlite_master m JOIN pragma_table_info(m.name) p \
         WHERE {}{} ORDER BY m.name, p.cid",
        USER_TABLES, filter
    )
}

pub(super) fn indexes(filter: &str) -> String {
    format!(
        "SELECT m.name AS table_name, il.name AS index_name, ii.name AS column_name, \
         il.\"unique\" AS is_unique, \
         CASE WHEN il.origin = 'pk' THEN 1 ELSE 0 END AS is_primary \
         FROM sqlite_master m \
         JOIN pragma_index_list(m.name) il \
         JOIN pragma_index_info(il.name) ii \
         WHERE {}{} ORDER BY m.name, il.name, ii.seqno",
        USER_TABLES, filter
    )
}
