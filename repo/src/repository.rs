//! Repository definition.

use std::sync::Arc;

use sqlx::PgPool;

use crate::fts::{self, Language, TsVector};
use crate::pool::ConnectionPool;

/// A table-backed repository over a reader and a writer pool.
///
/// The repository is immutable once built; the `with_*` methods return a
/// reconfigured copy. Cloning is cheap when the pool handles are.
#[derive(Debug, Clone)]
pub struct PostgresRepo<P: ConnectionPool = PgPool> {
    pub(crate) name: Arc<str>,
    pub(crate) reader: P,
    pub(crate) writer: P,
    pub(crate) table: String,
    pub(crate) prefix: String,
    pub(crate) columns: Vec<String>,
}

fn dedup<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for column in columns {
        let column = column.into();
        if !out.contains(&column) {
            out.push(column);
        }
    }
    out
}

impl<P: ConnectionPool> PostgresRepo<P> {
    /// Create a repository. Duplicate column names are dropped, keeping the
    /// first occurrence.
    pub fn new<I, S>(
        reader: P,
        writer: P,
        name: impl Into<String>,
        table: impl Into<String>,
        prefix: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name: String = name.into();
        Self {
            name: name.into(),
            reader,
            writer,
            table: table.into(),
            prefix: prefix.into(),
            columns: dedup(columns),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reader(&self) -> &P {
        &self.reader
    }

    pub fn writer(&self) -> &P {
        &self.writer
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Stored column names, unqualified.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        self.name = name.into();
        self
    }

    pub fn with_reader(mut self, reader: P) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_writer(mut self, writer: P) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = dedup(columns);
        self
    }

    pub fn ts_vector_from_column<I, S>(&self, lang: Language, columns: I) -> Option<TsVector>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fts::ts_vector_from_column(lang, columns)
    }

    pub fn ts_vector_from_data<I, S>(&self, lang: Language, values: I) -> Option<TsVector>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fts::ts_vector_from_data(lang, values)
    }

    /// See [`fts::ts_vector_from_data_literal`]: values are spliced into the
    /// statement text, not bound.
    pub fn ts_vector_from_data_literal<I, S>(&self, lang: Language, values: I) -> Option<TsVector>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fts::ts_vector_from_data_literal(lang, values)
    }
}
