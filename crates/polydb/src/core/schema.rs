//! Neutral schema model for tables, columns and indexes.
//!
//! These types provide a database-agnostic representation of schema metadata.
//! Catalog readers populate them from vendor system views; callers build them
//! from declared entities. Either way, call [`Table::fix`] once the table is
//! populated so column and index flags agree with each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Vendor-neutral column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    DateTime,
    Guid,
    Binary,
}

impl DataType {
    /// Whether the type is an integer type.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Whether the type is numeric (integer, floating point or decimal).
    pub fn is_numeric(self) -> bool {
        self.is_integer()
            || matches!(self, DataType::Single | DataType::Double | DataType::Decimal)
    }

    /// Storage rank inside a numeric family, used to detect widening.
    fn rank(self) -> u8 {
        match self {
            DataType::Byte => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::Single => 1,
            DataType::Double => 2,
            _ => 0,
        }
    }

    /// Whether values of `self` always fit into `to` without loss.
    pub fn widens_to(self, to: DataType) -> bool {
        if self == to {
            return true;
        }
        if self.is_integer() && to.is_integer() {
            return self.rank() < to.rank();
        }
        if self.is_integer() && to == DataType::Decimal {
            return true;
        }
        matches!((self, to), (DataType::Single, DataType::Double))
    }

    /// Parse a type name as written in schema files (`Int32`, `string`, ...).
    pub fn parse(name: &str) -> Option<DataType> {
        let dt = match name.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => DataType::Boolean,
            "byte" => DataType::Byte,
            "int16" | "short" => DataType::Int16,
            "int32" | "int" => DataType::Int32,
            "int64" | "long" => DataType::Int64,
            "single" | "float" => DataType::Single,
            "double" => DataType::Double,
            "decimal" => DataType::Decimal,
            "string" => DataType::String,
            "datetime" => DataType::DateTime,
            "guid" | "uuid" => DataType::Guid,
            "binary" | "bytes" => DataType::Binary,
            _ => return None,
        };
        Some(dt)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Neutral data type.
    pub data_type: DataType,

    /// Raw vendor type as reported by the catalog (e.g. "nvarchar(50)").
    #[serde(default)]
    pub raw_type: String,

    /// Maximum length for string/binary types (0 or negative for unbounded).
    #[serde(default)]
    pub length: i32,

    /// Numeric precision.
    #[serde(default)]
    pub precision: i32,

    /// Numeric scale.
    #[serde(default)]
    pub scale: i32,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the column is an identity / auto-increment column.
    #[serde(default)]
    pub identity: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    /// Column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Create a nullable column of the given type.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            raw_type: String::new(),
            length: 0,
            precision: 0,
            scale: 0,
            nullable: true,
            identity: false,
            primary_key: false,
            default_value: None,
            description: None,
        }
    }

    pub fn length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    pub fn precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark as identity; identity columns are never nullable.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }

    /// Mark as primary key; key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn raw_type(mut self, raw: impl Into<String>) -> Self {
        self.raw_type = raw.into();
        self
    }

    /// Whether the column's length means "unbounded".
    pub fn is_unbounded(&self) -> bool {
        self.length <= 0
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name (may be empty for declared indexes; a name is generated).
    #[serde(default)]
    pub name: String,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,

    /// Whether the index backs the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl Index {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            primary_key: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the index as the primary key (implies unique).
    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self
    }

    /// Whether both indexes cover the same columns (case-insensitive, ordered).
    pub fn same_columns(&self, other: &Index) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name (logical, before prefix and case folding).
    pub name: String,

    /// Table comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owner / schema name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Free-form properties reported by the catalog.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Column definitions.
    #[serde(default)]
    pub columns: Vec<Column>,

    /// Index definitions, including the primary key index after [`Table::fix`].
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            owner: None,
            properties: BTreeMap::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Find a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key columns in declaration order.
    pub fn primary_keys(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }

    /// The identity column, if any.
    pub fn identity_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.identity)
    }

    /// Resolve column↔index cross references.
    ///
    /// - Index column names take the casing of the matching column; indexes
    ///   that reference unknown columns are dropped.
    /// - Columns covered by a primary key index are flagged as key columns.
    /// - A primary key index is synthesized from flagged key columns.
    /// - Indexes covering identical column lists are collapsed, keeping the
    ///   primary/unique one.
    pub fn fix(&mut self) -> &mut Self {
        let columns = &self.columns;
        self.indexes.retain_mut(|idx| {
            for name in idx.columns.iter_mut() {
                match columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
                    Some(col) => *name = col.name.clone(),
                    None => {
                        tracing::debug!(
                            "Dropping index {} on {}: unknown column",
                            idx.name,
                            name
                        );
                        return false;
                    }
                }
            }
            !idx.columns.is_empty()
        });

        let pk_index_cols: Vec<String> = self
            .indexes
            .iter()
            .filter(|i| i.primary_key)
            .flat_map(|i| i.columns.clone())
            .collect();
        for col in self.columns.iter_mut() {
            if pk_index_cols.iter().any(|n| n.eq_ignore_ascii_case(&col.name)) {
                col.primary_key = true;
            }
            if col.primary_key || col.identity {
                col.nullable = false;
            }
        }

        if !self.indexes.iter().any(|i| i.primary_key) {
            let keys: Vec<String> = self
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect();
            if !keys.is_empty() {
                self.indexes.insert(
                    0,
                    Index {
                        name: format!("PK_{}", self.name),
                        columns: keys,
                        unique: true,
                        primary_key: true,
                    },
                );
            }
        }

        // Primary and unique indexes sort first so they survive deduplication.
        let mut kept: Vec<Index> = Vec::with_capacity(self.indexes.len());
        let mut ordered = std::mem::take(&mut self.indexes);
        ordered.sort_by_key(|i| (!i.primary_key, !i.unique));
        for idx in ordered {
            if !kept.iter().any(|k| k.same_columns(&idx)) {
                kept.push(idx);
            }
        }
        self.indexes = kept;

        let table = self.name.clone();
        for idx in self.indexes.iter_mut() {
            if idx.primary_key {
                idx.unique = true;
            }
            if idx.name.is_empty() {
                let prefix = if idx.unique { "IU" } else { "IX" };
                idx.name = format!("{}_{}_{}", prefix, table, idx.columns.join("_"));
            }
        }
        self
    }
}
