//! Table and column name composition.
//!
//! A qualified column is `prefix.name`; the table is referenced in SQL as
//! `table prefix` so that the prefix acts as its alias.

use error::RepoError;

use crate::fragment::SqlFragment;
use crate::pool::ConnectionPool;
use crate::repository::PostgresRepo;
use crate::value::Value;

/// Strip a leading `prefix.` from `name`, splitting on the first dot.
///
/// Only the first segment is removed: `schema.table.column` becomes
/// `table.column`, not `column`. A name without a dot is returned as is.
pub fn unqualify(name: &str) -> &str {
    match name.split_once('.') {
        Some((_, column)) => column,
        None => name,
    }
}

impl<P: ConnectionPool> PostgresRepo<P> {
    /// `prefix.name`, using `prefix` when given and the stored prefix
    /// otherwise. An empty prefix yields `name` unchanged.
    pub fn column(&self, name: &str, prefix: Option<&str>) -> String {
        let prefix = prefix.unwrap_or(self.prefix.as_str());
        if prefix.is_empty() {
            return name.to_string();
        }
        format!("{}.{}", prefix, name)
    }

    pub fn column_without_prefix<'a>(&self, name: &'a str) -> &'a str {
        unqualify(name)
    }

    /// Every stored column, qualified with the stored prefix.
    ///
    /// With an empty stored prefix the names come back bare (`id`, not
    /// `.id`), same as [`PostgresRepo::column`].
    ///
    /// `specific` does not filter the result: the full stored list is always
    /// returned. Callers that need a subset qualify it with
    /// [`PostgresRepo::column`].
    pub fn columns(&self, specific: &[&str]) -> Vec<String> {
        let _ = specific;
        self.columns.iter().map(|c| self.column(c, None)).collect()
    }

    /// `specific` with prefixes stripped, or every stored column when
    /// `specific` is empty.
    pub fn columns_without_prefix(&self, specific: &[&str]) -> Vec<String> {
        if specific.is_empty() {
            return self
                .columns(&[])
                .iter()
                .map(|c| unqualify(c).to_string())
                .collect();
        }
        specific.iter().map(|c| unqualify(c).to_string()).collect()
    }

    /// Whether the unqualified form of `column` is a stored column.
    /// Matching is case-sensitive. Only the first qualifier is stripped (see
    /// [`unqualify`]), so `s.u.id` is looked up as `u.id` and does not match.
    pub fn column_exists(&self, column: &str) -> bool {
        let column = unqualify(column);
        self.columns.iter().any(|c| c == column)
    }

    /// `table prefix`, using `prefix` when given and the stored prefix
    /// otherwise.
    pub fn table_name(&self, prefix: Option<&str>) -> String {
        format!("{} {}", self.table, prefix.unwrap_or(self.prefix.as_str()))
    }

    pub fn table_name_without_prefix(&self) -> &str {
        &self.table
    }

    /// `table prefix on <on>`. An absent or empty prefix falls back to the
    /// stored one.
    pub fn join_on(&self, prefix: Option<&str>, on: &str) -> String {
        let prefix = prefix.filter(|p| !p.is_empty());
        format!("{} on {}", self.table_name(prefix), on)
    }

    /// Join target `table prefix on <local> = <foreign>`, extended with
    /// ` AND <clause>` for every additional clause that renders non-empty.
    ///
    /// Returns the clause text with `?` placeholders and the arguments of the
    /// additional clauses in order. A clause that fails to render fails the
    /// whole join.
    pub fn join(
        &self,
        foreign_column: &str,
        local_column: &str,
        additional: &[&dyn SqlFragment],
    ) -> error::Result<(String, Vec<Value>)> {
        let mut stmt = format!(
            "{} on {} = {}",
            self.table_name(None),
            local_column,
            foreign_column
        );
        let mut args = Vec::new();

        for clause in additional {
            let (sql, more) = clause.to_sql().map_err(|source| {
                tracing::error!("{}.Join fragment render error: {}", self.name, source);
                RepoError::Fragment {
                    repo: self.name.to_string(),
                    source,
                }
            })?;
            if sql.is_empty() {
                continue;
            }
            stmt.push_str(" AND ");
            stmt.push_str(&sql);
            args.extend(more);
        }

        Ok((stmt, args))
    }
}
