//! Query execution.
//!
//! Row-returning calls hand back a [`QueryResults`] that owns the acquired
//! connection. Every other path releases the connection before returning.
//! Dropping an in-flight call releases it as well.

use error::{Operation, RepoError, Result};

use crate::pool::{ConnectionPool, Lease, PooledConnection, Record};
use crate::repository::PostgresRepo;
use crate::results::{QueryResults, Row};
use crate::value::Value;

type Results<P> = QueryResults<<P as ConnectionPool>::Connection>;

impl<P: ConnectionPool> PostgresRepo<P> {
    /// Query the reader pool for a single row. The row is not decoded until
    /// it is scanned; statement errors surface at that point.
    pub async fn read_row(&self, sql: &str, args: &[Value]) -> Result<Results<P>> {
        self.query_row_on(&self.reader, Operation::ReadRow, sql, args)
            .await
    }

    /// Query the reader pool for zero or more rows.
    pub async fn read_rows(&self, sql: &str, args: &[Value]) -> Result<Results<P>> {
        self.query_rows_on(&self.reader, Operation::ReadRows, sql, args)
            .await
    }

    /// Execute a statement on the writer pool, returning the number of
    /// affected rows.
    pub async fn write_data(&self, sql: &str, args: &[Value]) -> Result<u64> {
        let op = Operation::WriteData;
        let mut lease = self.acquire(&self.writer, op).await?;

        tracing::debug!(repo = %self.name, %op, "execute");
        let result = lease.execute(sql, args).await;
        lease.release();

        result.map_err(|e| self.query_error(op, e))
    }

    /// Like [`PostgresRepo::read_row`], on the writer pool. Meant for
    /// statements with a `RETURNING` clause.
    pub async fn write_data_and_read_row(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Results<P>> {
        self.query_row_on(&self.writer, Operation::WriteDataAndReadRow, sql, args)
            .await
    }

    /// Like [`PostgresRepo::read_rows`], on the writer pool.
    pub async fn write_data_and_read_rows(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Results<P>> {
        self.query_rows_on(&self.writer, Operation::WriteDataAndReadRows, sql, args)
            .await
    }

    pub fn read_rows_error(&self, source: sqlx::Error) -> RepoError {
        self.scan_row_error(source)
    }

    pub fn scan_row_error(&self, source: sqlx::Error) -> RepoError {
        RepoError::Scan {
            repo: self.name.to_string(),
            source,
        }
    }

    pub fn scan_rows_error(&self, source: sqlx::Error) -> RepoError {
        RepoError::RowsScan {
            repo: self.name.to_string(),
            source,
        }
    }

    /// Decode the first column of `row` as a count, e.g. for `COUNT(*)`.
    pub fn scan_count_row<R: Record>(&self, row: &mut Row<R>) -> Result<i64> {
        row.scan(|r| r.get_i64(0)).map_err(|e| self.scan_row_error(e))
    }

    async fn acquire(&self, pool: &P, op: Operation) -> Result<Lease<P::Connection>> {
        match pool.acquire().await {
            Ok(conn) => Ok(Lease::new(conn)),
            Err(source) => {
                tracing::error!("{}.{} Acquire error: {}", self.name, op, source);
                Err(RepoError::Acquire {
                    repo: self.name.to_string(),
                    op,
                    source,
                })
            }
        }
    }

    fn query_error(&self, op: Operation, source: sqlx::Error) -> RepoError {
        tracing::error!("{}.{} Query error: {}", self.name, op, source);
        RepoError::Query {
            repo: self.name.to_string(),
            op,
            source,
        }
    }

    async fn query_row_on(
        &self,
        pool: &P,
        op: Operation,
        sql: &str,
        args: &[Value],
    ) -> Result<Results<P>> {
        let mut lease = self.acquire(pool, op).await?;

        tracing::debug!(repo = %self.name, %op, "query row");
        let outcome = lease.query_row(sql, args).await;

        Ok(QueryResults::with_row(
            self.name.clone(),
            lease,
            Row::new(outcome),
        ))
    }

    async fn query_rows_on(
        &self,
        pool: &P,
        op: Operation,
        sql: &str,
        args: &[Value],
    ) -> Result<Results<P>> {
        let mut lease = self.acquire(pool, op).await?;

        tracing::debug!(repo = %self.name, %op, "query rows");
        match lease.query(sql, args).await {
            Ok(rows) => Ok(QueryResults::with_rows(
                self.name.clone(),
                lease,
                rows,
            )),
            Err(e) => {
                lease.release();
                Err(self.query_error(op, e))
            }
        }
    }
}
