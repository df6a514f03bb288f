//! Minimal SELECT composer for repository fragments.

use error::FragmentError;

use crate::fragment::SqlFragment;
use crate::placeholder;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// `SELECT ... FROM ... [JOIN ...] [WHERE ...] [ORDER BY ...] [LIMIT] [OFFSET]`.
///
/// Joins take the `(clause, args)` pair produced by `PostgresRepo::join`, or
/// the bare string from `PostgresRepo::join_on`.
#[derive(Default)]
pub struct Select {
    columns: Vec<String>,
    from: Option<String>,
    joins: Vec<(JoinKind, String, Vec<Value>)>,
    wheres: Vec<Box<dyn SqlFragment>>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(table.into());
        self
    }

    pub fn join(mut self, clause: (String, Vec<Value>)) -> Self {
        self.joins.push((JoinKind::Inner, clause.0, clause.1));
        self
    }

    pub fn left_join(mut self, clause: (String, Vec<Value>)) -> Self {
        self.joins.push((JoinKind::Left, clause.0, clause.1));
        self
    }

    pub fn join_on(self, clause: impl Into<String>) -> Self {
        self.join((clause.into(), Vec::new()))
    }

    pub fn left_join_on(self, clause: impl Into<String>) -> Self {
        self.left_join((clause.into(), Vec::new()))
    }

    /// Add a condition. Conditions are combined with `AND`; ones that render
    /// empty are skipped.
    pub fn where_(mut self, condition: impl SqlFragment + 'static) -> Self {
        self.wheres.push(Box::new(condition));
        self
    }

    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render with `$n` placeholders, ready for the executor.
    pub fn build(&self) -> Result<(String, Vec<Value>), FragmentError> {
        let (sql, args) = self.to_sql()?;
        Ok((placeholder::dollar(&sql), args))
    }
}

impl SqlFragment for Select {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        if self.columns.is_empty() {
            return Err(FragmentError::Empty("select column list"));
        }

        let mut sql = format!("SELECT {}", self.columns.join(", "));
        let mut args = Vec::new();

        if let Some(from) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }

        for (kind, clause, more) in &self.joins {
            sql.push(' ');
            sql.push_str(kind.keyword());
            sql.push(' ');
            sql.push_str(clause);
            args.extend(more.iter().cloned());
        }

        let mut conditions = Vec::new();
        for fragment in &self.wheres {
            let (cond, more) = fragment.to_sql()?;
            if cond.is_empty() {
                continue;
            }
            conditions.push(cond);
            args.extend(more);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, args))
    }
}
