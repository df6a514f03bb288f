//! Renderable SQL fragments.
//!
//! A fragment is a piece of SQL text with `?` placeholders and the positional
//! arguments those placeholders stand for.

use error::FragmentError;

use crate::placeholder;
use crate::value::Value;

/// Anything that renders to `(sql, args)`.
pub trait SqlFragment: Send + Sync {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError>;
}

/// Absent fragments render as empty SQL and are skipped by composers.
impl<T: SqlFragment> SqlFragment for Option<T> {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        match self {
            Some(fragment) => fragment.to_sql(),
            None => Ok((String::new(), Vec::new())),
        }
    }
}

impl<T: SqlFragment + ?Sized> SqlFragment for &T {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        (**self).to_sql()
    }
}

impl<T: SqlFragment + ?Sized> SqlFragment for Box<T> {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        (**self).to_sql()
    }
}

/// Raw SQL with arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    sql: String,
    args: Vec<Value>,
}

impl Expr {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, V>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl SqlFragment for Expr {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        let expected = placeholder::count(&self.sql);
        if expected != self.args.len() {
            return Err(FragmentError::ArgumentMismatch {
                expected,
                actual: self.args.len(),
            });
        }
        Ok((self.sql.clone(), self.args.clone()))
    }
}

/// `column = ?`, or `column IS NULL` for a null value.
#[derive(Debug, Clone, PartialEq)]
pub struct Equals {
    column: String,
    value: Value,
}

impl Equals {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl SqlFragment for Equals {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        if self.column.is_empty() {
            return Err(FragmentError::Empty("column"));
        }
        if self.value.is_null() {
            return Ok((format!("{} IS NULL", self.column), Vec::new()));
        }
        Ok((format!("{} = ?", self.column), vec![self.value.clone()]))
    }
}

/// Conjunction of fragments. Empty parts are dropped.
#[derive(Default)]
pub struct And(Vec<Box<dyn SqlFragment>>);

impl And {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, fragment: impl SqlFragment + 'static) -> Self {
        self.0.push(Box::new(fragment));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SqlFragment for And {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        let mut parts = Vec::with_capacity(self.0.len());
        let mut args = Vec::new();

        for fragment in &self.0 {
            let (sql, more) = fragment.to_sql()?;
            if sql.is_empty() {
                continue;
            }
            parts.push(sql);
            args.extend(more);
        }

        let sql = match parts.len() {
            0 => String::new(),
            1 => parts.remove(0),
            _ => format!("({})", parts.join(" AND ")),
        };
        Ok((sql, args))
    }
}
