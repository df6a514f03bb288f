//! Executor tests against a counting fake pool.
//!
//! These verify that every acquired connection is released exactly once,
//! whatever path the call takes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use repo::{ConnectionPool, PooledConnection, PostgresRepo, Record, RepoError, Rows, Value};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
struct FakeRow(Vec<i64>);

impl Record for FakeRow {
    fn get_i64(&self, index: usize) -> Result<i64, sqlx::Error> {
        self.0
            .get(index)
            .copied()
            .ok_or(sqlx::Error::ColumnIndexOutOfBounds {
                index,
                len: self.0.len(),
            })
    }
}

#[derive(Default)]
struct State {
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_acquire: AtomicBool,
    fail_query: AtomicBool,
    hang: AtomicBool,
    rows: Mutex<Vec<FakeRow>>,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
}

#[derive(Clone, Default)]
struct FakePool {
    state: Arc<State>,
}

impl FakePool {
    fn with_rows(rows: Vec<FakeRow>) -> Self {
        let pool = Self::default();
        *pool.state.rows.lock().unwrap() = rows;
        pool
    }

    fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    fn fail_acquire(&self) {
        self.state.fail_acquire.store(true, Ordering::SeqCst);
    }

    fn fail_query(&self) {
        self.state.fail_query.store(true, Ordering::SeqCst);
    }

    fn hang(&self) {
        self.state.hang.store(true, Ordering::SeqCst);
    }

    fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.statements.lock().unwrap().clone()
    }
}

struct FakeConn {
    state: Arc<State>,
}

impl FakeConn {
    async fn run(&self, sql: &str, args: &[Value]) -> Result<Vec<FakeRow>, sqlx::Error> {
        if self.state.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_query.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("syntax error at or near \"SELEC\"".into()));
        }
        self.state
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec()));
        Ok(self.state.rows.lock().unwrap().clone())
    }
}

#[async_trait]
impl ConnectionPool for FakePool {
    type Connection = FakeConn;

    async fn acquire(&self) -> Result<FakeConn, sqlx::Error> {
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConn {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl PooledConnection for FakeConn {
    type Row = FakeRow;

    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Rows<FakeRow>, sqlx::Error> {
        Ok(Rows::from_rows(self.run(sql, args).await?))
    }

    async fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Option<FakeRow>, sqlx::Error> {
        Ok(self.run(sql, args).await?.into_iter().next())
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, sqlx::Error> {
        Ok(self.run(sql, args).await?.len() as u64)
    }

    fn release(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn users(reader: &FakePool, writer: &FakePool) -> PostgresRepo<FakePool> {
    PostgresRepo::new(
        reader.clone(),
        writer.clone(),
        "users",
        "users",
        "u",
        ["id", "name"],
    )
}

#[tokio::test]
async fn test_read_rows_uses_reader_and_releases_on_close() {
    let reader = FakePool::with_rows(vec![FakeRow(vec![1]), FakeRow(vec![2])]);
    let writer = FakePool::default();
    let repo = users(&reader, &writer);

    let mut results = repo
        .read_rows("SELECT u.id FROM users u WHERE u.id > $1", &[Value::from(0i64)])
        .await
        .unwrap();

    assert!(results.row().is_none());
    let ids = results.scan_rows(|row| row.get_i64(0)).await.unwrap();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(reader.released(), 0);

    results.close();
    results.close();
    assert!(results.is_closed());
    drop(results);

    assert_eq!(reader.acquired(), 1);
    assert_eq!(reader.released(), 1);
    assert_eq!(writer.acquired(), 0);
    assert_eq!(
        reader.statements(),
        vec![(
            "SELECT u.id FROM users u WHERE u.id > $1".to_string(),
            vec![Value::BigInt(0)]
        )]
    );
}

#[tokio::test]
async fn test_read_rows_query_failure_releases_connection() {
    let reader = FakePool::default();
    reader.fail_query();
    let repo = users(&reader, &FakePool::default());

    let err = match repo.read_rows("SELEC 1", &[]).await {
        Ok(_) => panic!("query should fail"),
        Err(e) => e,
    };

    assert!(matches!(err, RepoError::Query { .. }));
    assert_eq!(err.repo(), "users");
    assert!(err.to_string().starts_with("users.readRows Query error:"), "{err}");
    assert_eq!(reader.acquired(), 1);
    assert_eq!(reader.released(), 1);
}

#[tokio::test]
async fn test_acquire_failure_holds_nothing() {
    let reader = FakePool::default();
    reader.fail_acquire();
    let repo = users(&reader, &FakePool::default());

    let err = match repo.read_row("SELECT 1", &[]).await {
        Ok(_) => panic!("acquire should fail"),
        Err(e) => e,
    };

    assert!(matches!(
        err,
        RepoError::Acquire {
            source: sqlx::Error::PoolTimedOut,
            ..
        }
    ));
    assert!(err.to_string().starts_with("users.ReadRow Acquire error:"));
    assert_eq!(reader.acquired(), 0);
    assert_eq!(reader.released(), 0);
}

#[tokio::test]
async fn test_write_data_releases_on_success_and_failure() {
    let writer = FakePool::with_rows(vec![FakeRow(vec![1])]);
    let reader = FakePool::default();
    let repo = users(&reader, &writer);

    let affected = repo
        .write_data("UPDATE users SET name = $1", &[Value::from("bob")])
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(writer.acquired(), 1);
    assert_eq!(writer.released(), 1);

    writer.fail_query();
    let err = repo
        .write_data("UPDATE users SET name = $1", &[Value::from("bob")])
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("users.writeData Query error:"));
    assert_eq!(writer.acquired(), 2);
    assert_eq!(writer.released(), 2);
    assert_eq!(reader.acquired(), 0);
}

#[tokio::test]
async fn test_write_data_acquire_failure() {
    let writer = FakePool::default();
    writer.fail_acquire();
    let repo = users(&FakePool::default(), &writer);

    let err = repo.write_data("DELETE FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, RepoError::Acquire { .. }));
    assert_eq!(writer.released(), 0);
}

#[tokio::test]
async fn test_read_row_defers_statement_errors_to_scan() {
    let reader = FakePool::default();
    reader.fail_query();
    let repo = users(&reader, &FakePool::default());

    let mut results = repo.read_row("SELEC 1", &[]).await.unwrap();
    assert!(results.rows().is_none());

    let err = results.scan_row(|row| row.get_i64(0)).await.unwrap_err();
    assert!(matches!(err, RepoError::Scan { .. }));
    assert!(err.to_string().starts_with("users row scan error:"));

    drop(results);
    assert_eq!(reader.released(), 1);
}

#[tokio::test]
async fn test_read_row_empty_is_not_found() {
    let reader = FakePool::default();
    let repo = users(&reader, &FakePool::default());

    let mut results = repo
        .read_row("SELECT u.id FROM users u WHERE u.id = $1", &[Value::from(7i64)])
        .await
        .unwrap();
    let err = results.scan_count().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_scan_count_row() {
    let reader = FakePool::with_rows(vec![FakeRow(vec![42])]);
    let repo = users(&reader, &FakePool::default());

    let mut results = repo.read_row("SELECT count(*) FROM users u", &[]).await.unwrap();
    let row = results.row().expect("single-row handle");
    assert_eq!(repo.scan_count_row(row).unwrap(), 42);

    results.close();
    assert_eq!(reader.released(), 1);
}

#[tokio::test]
async fn test_write_and_read_use_writer_pool() {
    let reader = FakePool::default();
    let writer = FakePool::with_rows(vec![FakeRow(vec![10]), FakeRow(vec![11])]);
    let repo = users(&reader, &writer);

    let mut one = repo
        .write_data_and_read_row("INSERT INTO users (name) VALUES ($1) RETURNING id", &[Value::from("a")])
        .await
        .unwrap();
    assert_eq!(one.scan_row(|row| row.get_i64(0)).await.unwrap(), 10);
    one.close();

    let mut many = repo
        .write_data_and_read_rows("UPDATE users SET name = name RETURNING id", &[])
        .await
        .unwrap();
    let rows = many.rows().expect("multi-row handle");
    assert_eq!(rows.try_next().await.unwrap(), Some(FakeRow(vec![10])));
    assert_eq!(rows.try_next().await.unwrap(), Some(FakeRow(vec![11])));
    assert_eq!(rows.try_next().await.unwrap(), None);
    drop(many);

    assert_eq!(writer.acquired(), 2);
    assert_eq!(writer.released(), 2);
    assert_eq!(reader.acquired(), 0);
}

#[tokio::test]
async fn test_write_and_read_rows_failure_releases() {
    let writer = FakePool::default();
    writer.fail_query();
    let repo = users(&FakePool::default(), &writer);

    let err = match repo.write_data_and_read_rows("UPDATE x RETURNING id", &[]).await {
        Ok(_) => panic!("query should fail"),
        Err(e) => e,
    };
    assert!(err.to_string().starts_with("users.WriteDataAndReadRows Query error:"));
    assert_eq!(writer.acquired(), 1);
    assert_eq!(writer.released(), 1);
}

#[tokio::test]
async fn test_cancelled_call_releases_connection() {
    let reader = FakePool::default();
    reader.hang();
    let repo = users(&reader, &FakePool::default());

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        repo.read_rows("SELECT pg_sleep(60)", &[]),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(reader.acquired(), 1);
    assert_eq!(reader.released(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_pool() {
    let reader = FakePool::with_rows(vec![FakeRow(vec![1])]);
    let repo = Arc::new(users(&reader, &FakePool::default()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let mut results = repo.read_rows("SELECT 1", &[]).await?;
            results.scan_rows(|row| row.get_i64(0)).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), vec![1]);
    }

    assert_eq!(reader.acquired(), 16);
    assert_eq!(reader.released(), 16);
}

/// Connection whose rows are produced lazily, one channel slot at a time.
struct StreamingConn {
    total: usize,
    produced: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl PooledConnection for StreamingConn {
    type Row = FakeRow;

    async fn query(&mut self, _sql: &str, _args: &[Value]) -> Result<Rows<FakeRow>, sqlx::Error> {
        let (tx, rx) = mpsc::channel(1);
        let total = self.total;
        let produced = Arc::clone(&self.produced);
        tokio::spawn(async move {
            for i in 0..total {
                if tx.send(Ok(FakeRow(vec![i as i64]))).await.is_err() {
                    break;
                }
                produced.fetch_add(1, Ordering::SeqCst);
            }
        });
        Rows::from_channel(rx).await
    }

    async fn query_row(&mut self, _sql: &str, _args: &[Value]) -> Result<Option<FakeRow>, sqlx::Error> {
        Ok(None)
    }

    async fn execute(&mut self, _sql: &str, _args: &[Value]) -> Result<u64, sqlx::Error> {
        Ok(0)
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct StreamingPool {
    produced: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl ConnectionPool for StreamingPool {
    type Connection = StreamingConn;

    async fn acquire(&self) -> Result<StreamingConn, sqlx::Error> {
        Ok(StreamingConn {
            total: 100_000,
            produced: Arc::clone(&self.produced),
            released: Arc::clone(&self.released),
        })
    }
}

#[tokio::test]
async fn test_read_rows_streams_and_stops_on_close() {
    let pool = StreamingPool::default();
    let repo = PostgresRepo::new(pool.clone(), pool.clone(), "events", "events", "e", ["id"]);

    let mut results = repo.read_rows("SELECT e.id FROM events e", &[]).await.unwrap();
    assert_eq!(results.scan_row(|row| row.get_i64(0)).await.unwrap(), 0);
    assert_eq!(results.scan_row(|row| row.get_i64(0)).await.unwrap(), 1);
    results.close();

    // Give the producer a chance to observe the closed channel.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let produced = pool.produced.load(Ordering::SeqCst);
    assert!(produced < 100, "rows kept flowing after close: {produced}");
    assert_eq!(pool.released.load(Ordering::SeqCst), 1);
}
