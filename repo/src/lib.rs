//! Generic PostgreSQL repository.
//!
//! [`PostgresRepo`] ties a table (name, alias prefix, column set) to a reader
//! and a writer pool. It provides:
//!
//! - name composition for building SQL by hand (`column`, `table_name`,
//!   `join`, ...),
//! - four execution patterns (`read_row`, `read_rows`, `write_data`,
//!   `write_data_and_read_row[s]`) with repository-tagged errors,
//! - [`QueryResults`] handles that own their connection and return it on
//!   `close` or drop,
//! - SQL fragments and full-text expressions to compose with [`Select`].

mod executor;
pub mod fragment;
pub mod fts;
mod names;
pub mod placeholder;
pub mod pool;
mod repository;
mod results;
mod select;
pub mod value;

pub use error::{FragmentError, Operation, RepoError};
pub use fragment::{And, Equals, Expr, SqlFragment};
pub use fts::{Language, TsVector};
pub use names::unqualify;
pub use pool::{ConnectionPool, Lease, PgPooledConnection, PooledConnection, Record};
pub use repository::PostgresRepo;
pub use results::{QueryResults, Row, Rows};
pub use select::Select;
pub use value::Value;
