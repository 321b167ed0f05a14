//! Ordered vendor type tables.
//!
//! Every dialect owns a [`TypeTable`]: an ordered list of
//! `(neutral type, [vendor patterns])` entries. Reading a catalog walks the
//! table top to bottom and the first matching pattern wins; rendering DDL
//! takes the first suitable pattern of the first entry for the neutral type.
//!
//! Patterns use `{0}` / `{1}` placeholders for parameters, e.g.
//! `nvarchar({0})` or `decimal({0},{1})`. Literal arguments (`tinyint(1)`)
//! only match the same literal. A pattern without parentheses matches any
//! parameter list of the same base type.

use super::schema::{Column, DataType};

/// Neutral type plus the parameters extracted from a raw vendor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedType {
    pub data_type: DataType,
    pub length: i32,
    pub precision: i32,
    pub scale: i32,
}

/// Backend-specific ordered type table.
#[derive(Debug, Clone, Copy)]
pub struct TypeTable {
    entries: &'static [(DataType, &'static [&'static str])],
}

/// Default precision used when a decimal column does not declare one.
pub const DEFAULT_DECIMAL_PRECISION: i32 = 18;

struct RawType {
    base: String,
    args: Option<Vec<String>>,
}

fn split_raw(raw: &str) -> RawType {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.find('(') {
        Some(open) => {
            let base = collapse_spaces(&lower[..open]);
            let close = lower[open..].find(')').map(|c| open + c).unwrap_or(lower.len());
            let inner = &lower[open + 1..close];
            let args = inner.split(',').map(|a| a.trim().to_string()).collect();
            RawType {
                base,
                args: Some(args),
            }
        }
        None => RawType {
            base: collapse_spaces(&lower),
            args: None,
        },
    }
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_placeholder(arg: &str) -> bool {
    arg.starts_with('{') && arg.ends_with('}')
}

fn parse_arg(arg: &str) -> i32 {
    if arg.eq_ignore_ascii_case("max") {
        -1
    } else {
        arg.parse().unwrap_or(0)
    }
}

impl TypeTable {
    pub const fn new(entries: &'static [(DataType, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    /// Map a raw vendor type to its neutral type. First match wins.
    pub fn resolve(&self, raw: &str) -> Option<ResolvedType> {
        let raw_type = split_raw(raw);
        for (data_type, patterns) in self.entries {
            for pattern in patterns.iter() {
                if Self::matches(&split_raw(pattern), &raw_type) {
                    return Some(Self::extract(*data_type, &raw_type));
                }
            }
        }
        None
    }

    fn matches(pattern: &RawType, raw: &RawType) -> bool {
        if pattern.base != raw.base {
            return false;
        }
        match (&pattern.args, &raw.args) {
            (None, _) => true,
            (Some(p), Some(r)) => {
                p.len() == r.len()
                    && p.iter()
                        .zip(r)
                        .all(|(pa, ra)| is_placeholder(pa) || pa.eq_ignore_ascii_case(ra))
            }
            (Some(p), None) => p.iter().all(|a| is_placeholder(a)),
        }
    }

    fn extract(data_type: DataType, raw: &RawType) -> ResolvedType {
        let mut resolved = ResolvedType {
            data_type,
            length: 0,
            precision: 0,
            scale: 0,
        };
        let args = match &raw.args {
            Some(args) => args,
            None => return resolved,
        };
        match data_type {
            DataType::String | DataType::Binary => {
                resolved.length = args.first().map(|a| parse_arg(a)).unwrap_or(0);
            }
            _ => {
                resolved.precision = args.first().map(|a| parse_arg(a)).unwrap_or(0);
                resolved.scale = args.get(1).map(|a| parse_arg(a)).unwrap_or(0);
            }
        }
        resolved
    }

    /// Render the vendor type for a column.
    ///
    /// Unbounded string/binary columns, or lengths above `max_length` when it
    /// is positive, use the first parameterless pattern of the entry.
    pub fn render(&self, column: &Column, max_length: i32) -> Option<String> {
        let patterns = self
            .entries
            .iter()
            .find(|(dt, _)| *dt == column.data_type)
            .map(|(_, p)| *p)?;

        let sized = matches!(column.data_type, DataType::String | DataType::Binary);
        let wants_unbounded = sized
            && (column.is_unbounded() || (max_length > 0 && column.length > max_length));

        let pattern = if wants_unbounded {
            patterns
                .iter()
                .find(|p| !p.contains('{'))
                .or_else(|| patterns.first())?
        } else {
            patterns.first()?
        };

        let (first, second) = match column.data_type {
            DataType::String | DataType::Binary => {
                let len = if column.length > 0 { column.length } else { 1 };
                (len, 0)
            }
            DataType::Decimal => {
                let precision = if column.precision > 0 {
                    column.precision
                } else {
                    DEFAULT_DECIMAL_PRECISION
                };
                (precision, column.scale.max(0))
            }
            _ => (column.precision, column.scale),
        };

        Some(
            pattern
                .replace("{0}", &first.to_string())
                .replace("{1}", &second.to_string()),
        )
    }
}
