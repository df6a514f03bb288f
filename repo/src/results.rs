//! Result handles returned by the executor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use error::RepoError;
use tokio::sync::mpsc;

use crate::pool::{Lease, PooledConnection, Record};

/// Single-row cursor. The statement outcome is kept as-is and surfaces only
/// when the row is scanned.
#[derive(Debug)]
pub struct Row<R> {
    outcome: Option<Result<Option<R>, sqlx::Error>>,
}

impl<R> Row<R> {
    pub(crate) fn new(outcome: Result<Option<R>, sqlx::Error>) -> Self {
        Self {
            outcome: Some(outcome),
        }
    }

    /// Decode the row with `f`.
    ///
    /// A statement failure or an empty result is reported here; the latter
    /// as `sqlx::Error::RowNotFound`. The row is consumed by the first scan,
    /// so a second scan also reports `RowNotFound`.
    pub fn scan<T, F>(&mut self, f: F) -> Result<T, sqlx::Error>
    where
        F: FnOnce(&R) -> Result<T, sqlx::Error>,
    {
        match self.outcome.take() {
            Some(Ok(Some(row))) => f(&row),
            Some(Ok(None)) | None => Err(sqlx::Error::RowNotFound),
            Some(Err(e)) => Err(e),
        }
    }
}

/// Item sent by a row producer.
pub type RowItem<R> = Result<R, sqlx::Error>;

/// Multi-row cursor, consumed front to back.
///
/// Rows either come from memory or are streamed from a producer over a
/// bounded channel. Closing or dropping the cursor closes the channel, which
/// tells the producer to stop.
#[derive(Debug)]
pub struct Rows<R> {
    buffered: VecDeque<R>,
    rx: Option<mpsc::Receiver<RowItem<R>>>,
    closed: bool,
}

impl<R> Rows<R> {
    /// Cursor over rows already in memory.
    pub fn from_rows(rows: Vec<R>) -> Self {
        Self {
            buffered: rows.into(),
            rx: None,
            closed: false,
        }
    }

    /// Cursor over rows streamed into `rx`.
    ///
    /// Waits for the first item so a failing statement is reported here
    /// rather than on the first read. On failure the producer is awaited
    /// until it hangs up, so whatever it held has been dropped by the time
    /// the error is returned.
    pub async fn from_channel(mut rx: mpsc::Receiver<RowItem<R>>) -> Result<Self, sqlx::Error> {
        match rx.recv().await {
            Some(Ok(row)) => Ok(Self {
                buffered: VecDeque::from([row]),
                rx: Some(rx),
                closed: false,
            }),
            Some(Err(e)) => {
                rx.close();
                while rx.recv().await.is_some() {}
                Err(e)
            }
            None => Ok(Self::from_rows(Vec::new())),
        }
    }

    /// Next row, or `None` once the cursor is exhausted or closed.
    pub async fn try_next(&mut self) -> Result<Option<R>, sqlx::Error> {
        if let Some(row) = self.buffered.pop_front() {
            return Ok(Some(row));
        }

        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        match rx.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.rx = None;
                Err(e)
            }
            None => {
                self.rx = None;
                Ok(None)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop reading. Unread rows are discarded and the producer is told to
    /// stop.
    pub fn close(&mut self) {
        self.buffered.clear();
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        self.closed = true;
    }
}

#[derive(Debug)]
enum Cursor<R> {
    Row(Row<R>),
    Rows(Rows<R>),
}

/// Handle over one acquired connection and the cursor produced on it.
///
/// Exactly one of [`QueryResults::row`] and [`QueryResults::rows`] is
/// populated, depending on the executor call that created the handle.
/// [`QueryResults::close`] closes the cursor and releases the connection; it
/// is idempotent and also runs on drop.
pub struct QueryResults<C: PooledConnection> {
    repo: Arc<str>,
    cursor: Cursor<C::Row>,
    lease: Lease<C>,
}

impl<C: PooledConnection> QueryResults<C> {
    pub(crate) fn with_row(repo: Arc<str>, lease: Lease<C>, row: Row<C::Row>) -> Self {
        Self {
            repo,
            cursor: Cursor::Row(row),
            lease,
        }
    }

    pub(crate) fn with_rows(repo: Arc<str>, lease: Lease<C>, rows: Rows<C::Row>) -> Self {
        Self {
            repo,
            cursor: Cursor::Rows(rows),
            lease,
        }
    }

    pub fn row(&mut self) -> Option<&mut Row<C::Row>> {
        match &mut self.cursor {
            Cursor::Row(row) => Some(row),
            Cursor::Rows(_) => None,
        }
    }

    pub fn rows(&mut self) -> Option<&mut Rows<C::Row>> {
        match &mut self.cursor {
            Cursor::Rows(rows) => Some(rows),
            Cursor::Row(_) => None,
        }
    }

    /// Scan the single row (or the next row of a multi-row cursor) with
    /// `f`, tagging failures with the repository name.
    pub async fn scan_row<T, F>(&mut self, f: F) -> Result<T, RepoError>
    where
        F: FnOnce(&C::Row) -> Result<T, sqlx::Error>,
    {
        let result = match &mut self.cursor {
            Cursor::Row(row) => row.scan(f),
            Cursor::Rows(rows) => match rows.try_next().await {
                Ok(Some(row)) => f(&row),
                Ok(None) => Err(sqlx::Error::RowNotFound),
                Err(e) => Err(e),
            },
        };
        result.map_err(|source| RepoError::Scan {
            repo: self.repo.to_string(),
            source,
        })
    }

    /// Scan every remaining row with `f`. Stops at the first failure.
    pub async fn scan_rows<T, F>(&mut self, mut f: F) -> Result<Vec<T>, RepoError>
    where
        F: FnMut(&C::Row) -> Result<T, sqlx::Error>,
    {
        let result = match &mut self.cursor {
            Cursor::Rows(rows) => {
                let mut out = Vec::new();
                loop {
                    match rows.try_next().await {
                        Ok(Some(row)) => match f(&row) {
                            Ok(value) => out.push(value),
                            Err(e) => break Err(e),
                        },
                        Ok(None) => break Ok(out),
                        Err(e) => break Err(e),
                    }
                }
            }
            Cursor::Row(row) => match row.scan(&mut f) {
                Ok(value) => Ok(vec![value]),
                Err(sqlx::Error::RowNotFound) => Ok(Vec::new()),
                Err(e) => Err(e),
            },
        };
        result.map_err(|source| RepoError::RowsScan {
            repo: self.repo.to_string(),
            source,
        })
    }

    /// Decode the single row into `T`.
    pub async fn fetch_one<T>(&mut self) -> Result<T, RepoError>
    where
        C::Row: sqlx::Row,
        T: for<'r> sqlx::FromRow<'r, C::Row>,
    {
        self.scan_row(|row| T::from_row(row)).await
    }

    /// Decode the single row into `T`, mapping an empty result to `None`.
    pub async fn fetch_optional<T>(&mut self) -> Result<Option<T>, RepoError>
    where
        C::Row: sqlx::Row,
        T: for<'r> sqlx::FromRow<'r, C::Row>,
    {
        match self.fetch_one().await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decode every remaining row into `T`.
    pub async fn fetch_all<T>(&mut self) -> Result<Vec<T>, RepoError>
    where
        C::Row: sqlx::Row,
        T: for<'r> sqlx::FromRow<'r, C::Row>,
    {
        self.scan_rows(|row| T::from_row(row)).await
    }

    /// Decode the first column of the single row as a count.
    pub async fn scan_count(&mut self) -> Result<i64, RepoError>
    where
        C::Row: Record,
    {
        self.scan_row(|row| row.get_i64(0)).await
    }

    pub fn is_closed(&self) -> bool {
        self.lease.is_released()
    }

    /// Close the cursor, then release the connection.
    pub fn close(&mut self) {
        if self.lease.is_released() {
            return;
        }
        if let Cursor::Rows(rows) = &mut self.cursor {
            rows.close();
        }
        self.lease.release();
    }
}

impl<C: PooledConnection> fmt::Debug for QueryResults<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResults")
            .field("repo", &self.repo)
            .field("closed", &self.lease.is_released())
            .finish_non_exhaustive()
    }
}

impl<C: PooledConnection> Drop for QueryResults<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_scan_outcomes() {
        let mut row = Row::new(Ok(Some(5i64)));
        assert_eq!(row.scan(|v| Ok(*v)).unwrap(), 5);
        assert!(matches!(
            row.scan(|v: &i64| Ok(*v)),
            Err(sqlx::Error::RowNotFound)
        ));

        let mut empty: Row<i64> = Row::new(Ok(None));
        assert!(matches!(
            empty.scan(|v| Ok(*v)),
            Err(sqlx::Error::RowNotFound)
        ));

        let mut failed: Row<i64> = Row::new(Err(sqlx::Error::PoolClosed));
        assert!(matches!(
            failed.scan(|v| Ok(*v)),
            Err(sqlx::Error::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn test_rows_from_memory() {
        let mut rows = Rows::from_rows(vec![1, 2, 3]);
        assert_eq!(rows.try_next().await.unwrap(), Some(1));
        rows.close();
        assert!(rows.is_closed());
        assert_eq!(rows.try_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rows_from_channel() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for i in 1..=3 {
                if tx.send(Ok(i)).await.is_err() {
                    break;
                }
            }
        });

        let mut rows = Rows::from_channel(rx).await.unwrap();
        let mut seen = Vec::new();
        while let Some(row) = rows.try_next().await.unwrap() {
            seen.push(row);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rows_from_channel_reports_first_error() {
        let (tx, rx) = mpsc::channel::<RowItem<i64>>(1);
        tx.send(Err(sqlx::Error::PoolTimedOut)).await.unwrap();
        drop(tx);

        assert!(matches!(
            Rows::from_channel(rx).await,
            Err(sqlx::Error::PoolTimedOut)
        ));
    }

    #[tokio::test]
    async fn test_rows_error_mid_stream() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(1i64)).await.unwrap();
        tx.send(Err(sqlx::Error::RowNotFound)).await.unwrap();
        drop(tx);

        let mut rows = Rows::from_channel(rx).await.unwrap();
        assert_eq!(rows.try_next().await.unwrap(), Some(1));
        assert!(rows.try_next().await.is_err());
        assert_eq!(rows.try_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_stops_producer() {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            let mut sent = 0;
            for i in 0..1000 {
                if tx.send(Ok(i)).await.is_err() {
                    break;
                }
                sent += 1;
            }
            sent
        });

        let mut rows = Rows::from_channel(rx).await.unwrap();
        assert_eq!(rows.try_next().await.unwrap(), Some(0));
        rows.close();

        let sent = producer.await.unwrap();
        assert!(sent < 1000, "producer kept going: {sent}");
    }
}
