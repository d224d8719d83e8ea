//! Typed list-query builder.
//!
//! Translates raw query-string pairs into a structured query: filter
//! conditions, sort order, field projection, and pagination bounds.
//!
//! Comparison operators are carried structurally in the parameter key
//! (`price[gte]=100`) and mapped to a [`CmpOp`]. Values themselves are
//! never pattern-rewritten, so text that happens to contain `gte`/`lt`
//! tokens cannot be misparsed as an operator.

use crate::error::ServiceError;

/// Query-string keys that control the query itself and are never
/// interpreted as filters.
const RESERVED_KEYS: &[&str] = &["page", "sort", "limit", "fields"];

/// Comparison operator for a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// SQL rendering of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(CmpOp::Gt),
            "gte" => Some(CmpOp::Gte),
            "lt" => Some(CmpOp::Lt),
            "lte" => Some(CmpOp::Lte),
            _ => None,
        }
    }
}

/// A filter value, typed from its textual form: integer first, then
/// float, then boolean, falling back to text.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FilterValue {
    fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return FilterValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return FilterValue::Float(f);
        }
        match raw {
            "true" => FilterValue::Bool(true),
            "false" => FilterValue::Bool(false),
            _ => FilterValue::Text(raw.to_string()),
        }
    }
}

/// A single filter condition against an indexed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CmpOp,
    pub value: FilterValue,
}

/// A sort key: indexed column plus direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// Per-entity whitelist of queryable fields.
///
/// Maps API field names (as they appear in query strings and JSON
/// output) to the indexed column that backs them. Filtering or sorting
/// on a field outside this map is a validation error.
pub struct QuerySchema {
    pub fields: &'static [(&'static str, &'static str)],
    /// Column for the default newest-first sort.
    pub default_sort: &'static str,
}

impl QuerySchema {
    fn column(&self, field: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, col)| *col)
    }
}

/// A parsed list query: conditions, sort order, projection, pagination.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortKey>,
    /// Inclusion list for field projection; `None` means the full
    /// document minus the internal `rev` field.
    pub fields: Option<Vec<String>>,
    /// 1-based page number.
    pub page: usize,
    pub limit: usize,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    /// Parse raw query-string pairs against a schema whitelist.
    ///
    /// Non-numeric or zero `page`/`limit` values silently fall back to
    /// (1, 10) — a preserved quirk of the source system. Unknown filter
    /// or sort fields, and unknown `[op]` suffixes, are rejected.
    pub fn parse(
        pairs: &[(String, String)],
        schema: &QuerySchema,
    ) -> Result<Self, ServiceError> {
        let mut query = ListQuery {
            conditions: Vec::new(),
            sort: Vec::new(),
            fields: None,
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        };

        for (key, value) in pairs {
            match key.as_str() {
                "page" => {
                    query.page = match value.parse::<usize>() {
                        Ok(p) if p >= 1 => p,
                        _ => 1,
                    };
                }
                "limit" => {
                    query.limit = match value.parse::<usize>() {
                        Ok(l) if l >= 1 => l.min(Self::MAX_LIMIT),
                        _ => Self::DEFAULT_LIMIT,
                    };
                }
                "sort" => {
                    for part in value.split(',') {
                        let part = part.trim();
                        if part.is_empty() {
                            continue;
                        }
                        let (field, descending) = match part.strip_prefix('-') {
                            Some(rest) => (rest, true),
                            None => (part, false),
                        };
                        let column = schema.column(field).ok_or_else(|| {
                            ServiceError::Validation(format!(
                                "cannot sort by unknown field '{}'",
                                field
                            ))
                        })?;
                        query.sort.push(SortKey {
                            column: column.to_string(),
                            descending,
                        });
                    }
                }
                "fields" => {
                    let fields: Vec<String> = value
                        .split(',')
                        .map(|f| f.trim().to_string())
                        .filter(|f| !f.is_empty())
                        .collect();
                    if !fields.is_empty() {
                        query.fields = Some(fields);
                    }
                }
                _ => {
                    query.conditions.push(parse_condition(key, value, schema)?);
                }
            }
        }

        // Default: newest first.
        if query.sort.is_empty() {
            query.sort.push(SortKey {
                column: schema.default_sort.to_string(),
                descending: true,
            });
        }

        Ok(query)
    }

    /// Number of leading matches omitted: `(page - 1) * limit`.
    pub fn skip(&self) -> usize {
        (self.page - 1) * self.limit
    }

    /// Total page count for a given match count.
    pub fn pages(&self, total: usize) -> usize {
        total.div_ceil(self.limit)
    }
}

/// Parse one non-reserved pair into a condition.
///
/// `price[gte]=100` → `price >= 100`; a bare key is an equality test.
fn parse_condition(
    key: &str,
    value: &str,
    schema: &QuerySchema,
) -> Result<Condition, ServiceError> {
    debug_assert!(!RESERVED_KEYS.contains(&key));

    let (field, op) = match key.find('[') {
        Some(open) if key.ends_with(']') => {
            let suffix = &key[open + 1..key.len() - 1];
            let op = CmpOp::from_suffix(suffix).ok_or_else(|| {
                ServiceError::Validation(format!("unknown filter operator '{}'", suffix))
            })?;
            (&key[..open], op)
        }
        _ => (key, CmpOp::Eq),
    };

    let column = schema.column(field).ok_or_else(|| {
        ServiceError::Validation(format!("cannot filter on unknown field '{}'", field))
    })?;

    Ok(Condition {
        column: column.to_string(),
        op,
        value: FilterValue::parse(value),
    })
}

/// Apply a field projection to an output document.
///
/// With an inclusion list, only the listed keys survive. Without one,
/// the document is returned whole except for the internal `rev` field.
pub fn project(doc: &mut serde_json::Value, fields: Option<&[String]>) {
    let Some(obj) = doc.as_object_mut() else {
        return;
    };
    match fields {
        Some(keep) => obj.retain(|key, _| keep.iter().any(|f| f == key)),
        None => {
            obj.remove("rev");
        }
    }
}
