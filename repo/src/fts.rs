//! Full-text search expressions.
//!
//! Builders return `None` when given nothing to index; callers treat that as
//! "omit this condition". Rendering happens when the fragment is combined
//! into a larger query.

use std::fmt;

use error::FragmentError;

use crate::fragment::SqlFragment;
use crate::value::Value;

/// Text search configuration passed to `to_tsvector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Russian,
    English,
    /// Any other configuration name installed on the server.
    Other(String),
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Russian => "russian",
            Language::English => "english",
            Language::Other(name) => name,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Columns(Vec<String>),
    Params(Vec<String>),
    Literals(Vec<String>),
}

/// Lazily rendered `to_tsvector(...)` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TsVector {
    lang: Language,
    source: Source,
}

impl TsVector {
    pub fn language(&self) -> &Language {
        &self.lang
    }
}

impl SqlFragment for TsVector {
    fn to_sql(&self) -> Result<(String, Vec<Value>), FragmentError> {
        let (body, args) = match &self.source {
            Source::Columns(columns) => (columns.join(" || ' ' || "), Vec::new()),
            Source::Params(values) => (
                vec!["?"; values.len()].join(" || ' ' || "),
                values.iter().map(Value::from).collect(),
            ),
            Source::Literals(values) => {
                let escaped: Vec<String> = values.iter().map(|v| v.replace('\'', "''")).collect();
                (format!("'{}'", escaped.join("' || ' ' || '")), Vec::new())
            }
        };

        Ok((
            format!(
                "to_tsvector('{}', lower({}))",
                self.lang.as_str().replace('\'', "''"),
                body
            ),
            args,
        ))
    }
}

/// `to_tsvector('<lang>', lower(col1 || ' ' || col2 ...))` over column
/// identifiers, or `None` when no columns are given.
pub fn ts_vector_from_column<I, S>(lang: Language, columns: I) -> Option<TsVector>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    if columns.is_empty() {
        return None;
    }
    Some(TsVector {
        lang,
        source: Source::Columns(columns),
    })
}

/// `to_tsvector` over text values bound as parameters, or `None` when no
/// values are given.
pub fn ts_vector_from_data<I, S>(lang: Language, values: I) -> Option<TsVector>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return None;
    }
    Some(TsVector {
        lang,
        source: Source::Params(values),
    })
}

/// `to_tsvector` over text values spliced into the SQL as one quoted
/// literal: `lower('a' || ' ' || 'b')`.
///
/// Values are not bound. Single quotes are doubled, which is only a complete
/// escape with `standard_conforming_strings = on` (the pool default). Use
/// this only where the statement text itself must carry the data, and
/// sanitize values before they get here.
pub fn ts_vector_from_data_literal<I, S>(lang: Language, values: I) -> Option<TsVector>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return None;
    }
    Some(TsVector {
        lang,
        source: Source::Literals(values),
    })
}
