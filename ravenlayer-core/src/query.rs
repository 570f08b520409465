//! Query options, RQL assembly and the filter expression AST.
//!
//! Every query path in this layer, whether it goes through a
//! [`CollectionService`](crate::collection::CollectionService) or one of the free functions in
//! [`functions`](crate::functions), is described by a [`QueryOptions`] value and turned into
//! a single [`RawQuery`] of the shape:
//!
//! ```text
//! from @all_docs where @metadata.'@collection' = '<name>' [AND (<where>)] [ORDER BY <field> [DESC]] LIMIT <skip>, <take>
//! ```
//!
//! with `$name` placeholders bound from [`QueryOptions::parameters`].
//!
//! # Building options
//!
//! ```ignore
//! use ravenlayer::query::QueryOptions;
//!
//! let options = QueryOptions::builder()
//!     .skip(50)
//!     .take(25)
//!     .order_by_desc("age")
//!     .build()
//!     .with_field_equals("isActive", true);
//! ```
//!
//! The helpers that set a WHERE clause (`with_field_equals`, `with_range`, `with_search`)
//! consume the options and return a new value; nothing is mutated behind the caller's back.
//!
//! # Filter expressions
//!
//! [`Expr`] is the parsed form of a WHERE fragment. Backends that evaluate queries
//! themselves (rather than forwarding the text to a server) parse the fragment into an
//! [`Expr`] and walk it with a [`QueryVisitor`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt::Write};

use crate::error::DocumentStoreError;

/// Page size used when a query does not ask for one.
pub const DEFAULT_TAKE: usize = 25;

/// Largest page size a single query may request.
pub const MAX_TAKE: usize = 1024;

/// Named query parameters, bound to `$name` placeholders.
pub type Parameters = BTreeMap<String, Value>;

/// Clamps a requested page size: `0` becomes [`DEFAULT_TAKE`], anything above
/// [`MAX_TAKE`] becomes [`MAX_TAKE`].
pub fn normalize_take(take: usize) -> usize {
    match take {
        0 => DEFAULT_TAKE,
        take => take.min(MAX_TAKE),
    }
}

/// Request shape shared by every query path: pagination, ordering, a raw WHERE fragment
/// and its parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Number of results to skip.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skip: usize,
    /// Page size; `0` means "use the default".
    #[serde(default, skip_serializing_if = "is_zero")]
    pub take: usize,
    /// Field to order by, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_by: String,
    /// Orders descending instead of ascending.
    #[serde(default, skip_serializing_if = "is_false")]
    pub order_desc: bool,
    /// Raw query-language fragment ANDed onto the collection filter. It is inserted
    /// unescaped, so values should be passed through `$name` placeholders.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub where_clause: String,
    /// Values for the placeholders used in `where_clause`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: Parameters,
    /// Accepted for compatibility; the reported total is always the page length.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_total: bool,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl QueryOptions {
    /// Creates empty options: first page, default page size, no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for fluent construction.
    pub fn builder() -> QueryOptionsBuilder {
        QueryOptionsBuilder::new()
    }

    /// Options selecting a whole collection in one page: skip 0, take [`MAX_TAKE`].
    pub fn all() -> Self {
        Self {
            take: MAX_TAKE,
            ..Self::default()
        }
    }

    /// Returns these options with `take` clamped by [`normalize_take`].
    pub fn normalized(mut self) -> Self {
        self.take = normalize_take(self.take);
        self
    }

    /// Returns these options with the WHERE fragment replaced.
    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = clause.into();
        self
    }

    /// Returns these options with one more bound parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Filters on `<field> = $value`.
    pub fn with_field_equals(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_where(format!("{field} = $value"))
            .with_parameter("value", value)
    }

    /// Filters on `<field> >= $minValue AND <field> <= $maxValue` (inclusive at both ends).
    pub fn with_range(
        self,
        field: &str,
        min_value: impl Into<Value>,
        max_value: impl Into<Value>,
    ) -> Self {
        self.with_where(format!("{field} >= $minValue AND {field} <= $maxValue"))
            .with_parameter("minValue", min_value)
            .with_parameter("maxValue", max_value)
    }

    /// Full-text search of `term` in any of `fields`.
    ///
    /// Each field gets its own `search(<field>, $searchTermN)` predicate bound to the same
    /// term and the predicates are ORed together. With no fields the options are returned
    /// unchanged, which makes the query select the whole collection.
    pub fn with_search<S: AsRef<str>>(mut self, term: &str, fields: &[S]) -> Self {
        if fields.is_empty() {
            return self;
        }

        let mut predicates = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let name = format!("searchTerm{i}");
            predicates.push(format!("search({}, ${name})", field.as_ref()));
            self.parameters.insert(name, Value::from(term));
        }

        self.with_where(format!("({})", predicates.join(" OR ")))
    }
}

/// Builder for [`QueryOptions`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptionsBuilder {
    options: QueryOptions,
}

impl QueryOptionsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of results to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = skip;
        self
    }

    /// Sets the page size.
    pub fn take(mut self, take: usize) -> Self {
        self.options.take = take;
        self
    }

    /// Orders ascending by `field`.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.options.order_by = field.into();
        self.options.order_desc = false;
        self
    }

    /// Orders descending by `field`.
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.options.order_by = field.into();
        self.options.order_desc = true;
        self
    }

    /// Sets the raw WHERE fragment.
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.options.where_clause = clause.into();
        self
    }

    /// Binds a parameter.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.parameters.insert(name.into(), value.into());
        self
    }

    /// Sets the `include_total` flag.
    pub fn include_total(mut self, include_total: bool) -> Self {
        self.options.include_total = include_total;
        self
    }

    /// Builds and returns the final options.
    pub fn build(self) -> QueryOptions {
        self.options
    }
}

/// A query in the store's textual dialect, together with its named parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    /// The query text.
    pub text: String,
    /// Values for the `$name` placeholders in `text`.
    pub parameters: Parameters,
}

impl RawQuery {
    /// Creates a query from text with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Parameters::new(),
        }
    }

    /// Assembles the collection query described by `options`.
    ///
    /// `options` should already be [normalized](QueryOptions::normalized); the page size is
    /// written as given.
    pub fn for_collection(collection: &str, options: &QueryOptions) -> Self {
        let mut text = format!("from @all_docs where @metadata.'@collection' = '{collection}'");

        // Writing into a String cannot fail.
        if !options.where_clause.is_empty() {
            let _ = write!(text, " AND ({})", options.where_clause);
        }

        if !options.order_by.is_empty() {
            let _ = write!(text, " ORDER BY {}", options.order_by);
            if options.order_desc {
                text.push_str(" DESC");
            }
        }

        if options.skip > 0 || options.take > 0 {
            let take = if options.take == 0 { DEFAULT_TAKE } else { options.take };
            let _ = write!(text, " LIMIT {}, {}", options.skip, take);
        }

        Self {
            text,
            parameters: options.parameters.clone(),
        }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Full-text match of the value's terms against the field.
    Search,
    /// Field equals any of the values in an array.
    AnyOf,
}

/// A parsed filter expression.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare, dot-separated for nested values.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Value,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Value>) -> Self {
        Expr::Field {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
