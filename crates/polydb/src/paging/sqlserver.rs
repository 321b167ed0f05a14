//! SQL Server pagination shapes.
//!
//! SQL Server only gained `OFFSET .. FETCH` in 2012. Older servers page with
//! `ROW_NUMBER()` (2005/2008) or with `TOP` plus a key filter (2000).

use super::{missing_key, KeyDirection, PageKey};
use crate::core::sql::SelectBuilder;
use crate::error::{DbError, Result};

fn skip_only() -> DbError {
    DbError::Unsupported(
        "SQL Server pagination cannot skip rows without a maximum row count".to_string(),
    )
}

/// Plain top-N: `SELECT TOP n ...`.
fn top_n(mut builder: SelectBuilder, max: i64) -> SelectBuilder {
    if builder.top.is_some() {
        builder = SelectBuilder::new(format!("({}) t_page", builder));
    }
    builder.top = Some(max);
    builder
}

fn order_or_key(builder: &SelectBuilder, key: Option<&PageKey>) -> Result<String> {
    match (builder.order_by.as_deref(), key) {
        (Some(order), _) if !order.trim().is_empty() => Ok(order.to_string()),
        (_, Some(key)) => Ok(key.order_by()),
        _ => Err(missing_key()),
    }
}

/// `OFFSET a ROWS FETCH NEXT b ROWS ONLY`, ordering by the key when the
/// query has no ORDER BY.
pub(super) fn row_window(
    mut builder: SelectBuilder,
    start: i64,
    max: i64,
    key: Option<PageKey>,
) -> Result<SelectBuilder> {
    if start > 0 && max <= 0 {
        return Err(skip_only());
    }
    if start <= 0 {
        return Ok(top_n(builder, max));
    }
    let order = order_or_key(&builder, key.as_ref())?;
    builder.order_by = Some(order);
    builder.limit = Some(format!(
        "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        start, max
    ));
    Ok(builder)
}

/// `ROW_NUMBER() OVER(ORDER BY key)` in a sub-select filtered by rank.
pub(super) fn ranked(
    mut builder: SelectBuilder,
    start: i64,
    max: i64,
    key: Option<PageKey>,
) -> Result<SelectBuilder> {
    if start > 0 && max <= 0 {
        return Err(skip_only());
    }
    if start <= 0 {
        return Ok(top_n(builder, max));
    }
    let order = order_or_key(&builder, key.as_ref())?;
    // ORDER BY is not allowed inside a derived table without TOP.
    builder.order_by = None;

    let mut outer = SelectBuilder::new(format!(
        "(SELECT *, ROW_NUMBER() OVER(ORDER BY {}) AS rn FROM ({}) t) t2",
        order, builder
    ));
    outer.where_clause = Some(format!("rn BETWEEN {} AND {}", start + 1, start + max));
    Ok(outer)
}

/// `TOP` with a `NOT IN` filter, or `MAX`/`MIN` bracketing when the key
/// carries an explicit direction and is the only order column.
///
/// Queries with GROUP BY always take the `NOT IN` path, which does not page
/// grouped results correctly beyond the first page.
pub(super) fn top_not_in(
    mut builder: SelectBuilder,
    start: i64,
    max: i64,
    key: Option<PageKey>,
) -> Result<SelectBuilder> {
    if start > 0 && max <= 0 {
        return Err(skip_only());
    }
    if start <= 0 {
        return Ok(top_n(builder, max));
    }

    let key = match key {
        Some(key) => key,
        None => builder
            .order_by
            .as_deref()
            .filter(|o| !o.contains(','))
            .and_then(PageKey::parse)
            .ok_or_else(missing_key)?,
    };

    let sole_order = match builder.order_by.as_deref() {
        None => true,
        Some(order) => {
            !order.contains(',')
                && PageKey::parse(order)
                    .map(|o| o.column.eq_ignore_ascii_case(&key.column))
                    .unwrap_or(false)
        }
    };

    if key.direction.is_some() && sole_order && builder.group_by.is_none() {
        return Ok(max_min(builder, start, max, &key));
    }

    let order = order_or_key(&builder, Some(&key))?;
    let inner = SelectBuilder {
        columns: key.column.clone(),
        table: builder.table.clone(),
        where_clause: builder.where_clause.clone(),
        group_by: builder.group_by.clone(),
        having: builder.having.clone(),
        order_by: Some(order.clone()),
        top: Some(start),
        limit: None,
    };
    let filter = format!("{} NOT IN ({})", key.column, inner);
    builder.where_clause = Some(and_where(builder.where_clause.take(), filter));
    builder.order_by = Some(order);
    builder.top = Some(max);
    Ok(builder)
}

fn max_min(mut builder: SelectBuilder, start: i64, max: i64, key: &PageKey) -> SelectBuilder {
    let descending = key.direction == Some(KeyDirection::Desc);
    let (aggregate, cmp, dir) = if descending {
        ("MIN", "<", "DESC")
    } else {
        ("MAX", ">", "ASC")
    };
    let order = format!("{} {}", key.column, dir);
    let inner = SelectBuilder {
        columns: key.column.clone(),
        table: builder.table.clone(),
        where_clause: builder.where_clause.clone(),
        order_by: Some(order.clone()),
        top: Some(start),
        ..SelectBuilder::default()
    };
    let filter = format!(
        "{} {} (SELECT {}({}) FROM ({}) m)",
        key.column, cmp, aggregate, key.column, inner
    );
    builder.where_clause = Some(and_where(builder.where_clause.take(), filter));
    builder.order_by = Some(order);
    builder.top = Some(max);
    builder
}

fn and_where(existing: Option<String>, filter: String) -> String {
    match existing.filter(|w| !w.trim().is_empty()) {
        Some(w) => format!("({}) AND {}", w, filter),
        None => filter,
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DbError;
    use crate::paging::{paginate, PagingStyle};

    #[test]
    fn test_row_window_uses_existing_order() {
        let sql = paginate(
            PagingStyle::RowWindow,
            "SELECT * FROM Users ORDER BY Name",
            20,
            10,
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM Users ORDER BY Name OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_row_window_appends_key_order() {
        let sql = paginate(PagingStyle::RowWindow, "SELECT * FROM Users", 20, 10, Some("Id")).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM Users ORDER BY Id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_first_page_is_top_n() {
        for style in [
            PagingStyle::RowWindow,
            PagingStyle::RankedSubquery,
            PagingStyle::TopNotIn,
        ] {
            let sql = paginate(style, "SELECT Id, Name FROM Users ORDER BY Id", 0, 10, None).unwrap();
            assert_eq!(sql, "SELECT TOP 10 Id, Name FROM Users ORDER BY Id");
        }
    }

    #[test]
    fn test_skip_only_is_unsupported() {
        for style in [
            PagingStyle::RowWindow,
            PagingStyle::RankedSubquery,
            PagingStyle::TopNotIn,
        ] {
            let err = paginate(style, "SELECT * FROM Users", 10, 0, Some("Id")).unwrap_err();
            assert!(matches!(err, DbError::Unsupported(_)));
        }
    }

    #[test]
    fn test_missing_key_is_pagination_error() {
        for style in [
            PagingStyle::RowWindow,
            PagingStyle::RankedSubquery,
            PagingStyle::TopNotIn,
        ] {
            let err = paginate(style, "SELECT * FROM Users", 10, 5, None).unwrap_err();
            match err {
                DbError::Pagination(msg) => assert_eq!(msg, "pagination requires a sortable key"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_ranked_subquery() {
        let sql = paginate(
            PagingStyle::RankedSubquery,
            "SELECT * FROM Users WHERE Age > 3 ORDER BY Id",
            20,
            10,
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER(ORDER BY Id) AS rn FROM \
             (SELECT * FROM Users WHERE Age > 3) t) t2 WHERE rn BETWEEN 21 AND 30"
        );
    }

    #[test]
    fn test_windows_are_contiguous() {
        let page = |n: i64| {
            paginate(PagingStyle::RankedSubquery, "SELECT * FROM T", n * 10, 10, Some("Id")).unwrap()
        };
        assert!(page(0).starts_with("SELECT TOP 10"));
        assert!(page(1).ends_with("rn BETWEEN 11 AND 20"));
        assert!(page(2).ends_with("rn BETWEEN 21 AND 30"));
    }

    #[test]
    fn test_top_not_in() {
        let sql = paginate(
            PagingStyle::TopNotIn,
            "SELECT * FROM Users WHERE Age > 3",
            20,
            10,
            Some("Id"),
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 10 * FROM Users WHERE (Age > 3) AND Id NOT IN \
             (SELECT TOP 20 Id FROM Users WHERE Age > 3 ORDER BY Id) ORDER BY Id"
        );
    }

    #[test]
    fn test_max_min_ascending() {
        let sql = paginate(PagingStyle::TopNotIn, "SELECT * FROM Users", 20, 10, Some("Id asc")).unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 10 * FROM Users WHERE Id > (SELECT MAX(Id) FROM \
             (SELECT TOP 20 Id FROM Users ORDER BY Id ASC) m) ORDER BY Id ASC"
        );
    }

    #[test]
    fn test_max_min_descending() {
        let sql = paginate(PagingStyle::TopNotIn, "SELECT * FROM Users", 20, 10, Some("Id desc")).unwrap();
        assert!(sql.contains("Id < (SELECT MIN(Id) FROM (SELECT TOP 20 Id FROM Users ORDER BY Id DESC) m)"));
        assert!(sql.ends_with("ORDER BY Id DESC"));
    }

    #[test]
    fn test_max_min_needs_sole_order_column() {
        let sql = paginate(
            PagingStyle::TopNotIn,
            "SELECT * FROM Users ORDER BY Name, Id",
            20,
            10,
            Some("Id desc"),
        )
        .unwrap();
        assert!(sql.contains("NOT IN"));
    }

    /// Known boundary: grouped queries fall back from MAX/MIN to NOT IN,
    /// which filters on the key rather than on groups and does not page
    /// grouped results correctly beyond page one.
    #[test]
    fn test_group_by_falls_back_to_not_in_known_boundary() {
        let sql = paginate(
            PagingStyle::TopNotIn,
            "SELECT Dept, COUNT(*) AS n FROM Users GROUP BY Dept",
            10,
            10,
            Some("Dept asc"),
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 10 Dept, COUNT(*) AS n FROM Users WHERE Dept NOT IN \
             (SELECT TOP 10 Dept FROM Users GROUP BY Dept ORDER BY Dept ASC) \
             GROUP BY Dept ORDER BY Dept ASC"
        );
    }

    #[test]
    fn test_unparseable_query_is_wrapped() {
        let sql = paginate(
            PagingStyle::RowWindow,
            "SELECT Id FROM A UNION SELECT Id FROM B ORDER BY Id",
            5,
            5,
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT Id FROM A UNION SELECT Id FROM B) t_page ORDER BY Id \
             OFFSET 5 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }
}
