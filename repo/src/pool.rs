//! Pooled connection seam.
//!
//! The executor only needs acquire/query/execute/release from the pool. The
//! traits here describe that contract; `sqlx::PgPool` implements it for real
//! use and tests plug in counting fakes.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::mpsc;

use crate::results::Rows;
use crate::value::{bind_all, Value};

/// Rows buffered between the statement and the reader of a [`Rows`] cursor.
const ROW_BUFFER: usize = 64;

/// A pool connections can be acquired from.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Connection: PooledConnection;

    /// Obtain exclusive use of one connection.
    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;
}

/// One connection acquired from a [`ConnectionPool`].
#[async_trait]
pub trait PooledConnection: Send {
    type Row: Send + Sync;

    /// Run a statement returning zero or more rows.
    ///
    /// The cursor may keep using the connection while it is read, so
    /// implementations are free to refuse further statements on it.
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Rows<Self::Row>, sqlx::Error>;

    /// Run a statement returning at most one row.
    async fn query_row(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Self::Row>, sqlx::Error>;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, sqlx::Error>;

    /// Give the connection back to its pool.
    fn release(&mut self);
}

/// Row access needed for aggregate scanning.
pub trait Record {
    fn get_i64(&self, index: usize) -> Result<i64, sqlx::Error>;
}

/// Scoped acquisition guard.
///
/// Releases the wrapped connection exactly once: on [`Lease::release`] or,
/// failing that, on drop. Dropping an in-flight executor future therefore
/// still returns the connection.
pub struct Lease<C: PooledConnection> {
    conn: C,
    released: bool,
}

impl<C: PooledConnection> Lease<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            released: false,
        }
    }

    /// Release the connection. Later calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.conn.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<C: PooledConnection> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: PooledConnection> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: PooledConnection> Drop for Lease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A connection acquired from a [`PgPool`].
pub struct PgPooledConnection(Option<PoolConnection<Postgres>>);

impl PgPooledConnection {
    fn inner(&mut self) -> Result<&mut PoolConnection<Postgres>, sqlx::Error> {
        self.0.as_mut().ok_or(sqlx::Error::PoolClosed)
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PgPooledConnection;

    async fn acquire(&self) -> Result<PgPooledConnection, sqlx::Error> {
        let conn = sqlx::Pool::acquire(self).await?;
        Ok(PgPooledConnection(Some(conn)))
    }
}

#[async_trait]
impl PooledConnection for PgPooledConnection {
    type Row = PgRow;

    /// Streams rows from a background task that owns the connection.
    ///
    /// The task stops as soon as the receiving [`Rows`] is closed or dropped
    /// and then returns the connection to the pool. This handle is left
    /// empty, so later statements on it fail with `PoolClosed`.
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Rows<PgRow>, sqlx::Error> {
        let mut conn = self.0.take().ok_or(sqlx::Error::PoolClosed)?;
        let sql = sql.to_owned();
        let args = args.to_vec();
        let (tx, rx) = mpsc::channel(ROW_BUFFER);

        tokio::spawn(async move {
            let mut stream = bind_all(sqlx::query(&sql), &args).fetch(&mut *conn);
            loop {
                let item = tokio::select! {
                    _ = tx.closed() => break,
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    break;
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            drop(stream);
            drop(conn);
        });

        Rows::from_channel(rx).await
    }

    async fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Option<PgRow>, sqlx::Error> {
        let conn = self.inner()?;
        bind_all(sqlx::query(sql), args)
            .fetch_optional(&mut **conn)
            .await
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, sqlx::Error> {
        let conn = self.inner()?;
        let done = bind_all(sqlx::query(sql), args).execute(&mut **conn).await?;
        Ok(done.rows_affected())
    }

    fn release(&mut self) {
        // Dropping a PoolConnection returns it to the pool.
        drop(self.0.take());
    }
}

impl Record for PgRow {
    fn get_i64(&self, index: usize) -> Result<i64, sqlx::Error> {
        self.try_get::<i64, _>(index)
    }
}
