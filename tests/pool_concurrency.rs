//! Connection pool behavior under concurrent load.

use mountstore::storage::{ConnectionFactory, ConnectionPool};
use mountstore::{Error, ErrorKind, PoolConfig, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Hands out numbered sessions and tracks how many are open at once.
#[derive(Default)]
struct CountingFactory {
    created: AtomicUsize,
    open: Arc<AtomicUsize>,
    fail: AtomicBool,
}

struct Session {
    open: Arc<AtomicUsize>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionFactory for CountingFactory {
    type Connection = Session;

    fn backend(&self) -> &'static str {
        "counting"
    }

    fn create_connection(&self) -> Result<Session> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Connection {
                backend: "counting".to_string(),
                cause: "refused".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            open: Arc::clone(&self.open),
        })
    }
}

#[test]
fn test_outstanding_connections_never_exceed_capacity() {
    let pool = Arc::new(ConnectionPool::new(CountingFactory::default(), PoolConfig::new(3)));
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..20 {
                    let _conn = pool.acquire().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(pool.factory().created.load(Ordering::SeqCst) <= 3);
    let status = pool.status();
    assert_eq!(status.outstanding, 0);
    assert!(status.idle <= 3);
}

#[test]
fn test_exhausted_pool_times_out_with_connection_error() {
    let config = PoolConfig::new(1).with_acquire_timeout(Duration::from_millis(50));
    let pool = ConnectionPool::new(CountingFactory::default(), config);
    let held = pool.acquire().unwrap();

    let err = pool.acquire().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);

    drop(held);
    assert!(pool.acquire().is_ok());
    assert_eq!(pool.factory().created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_waiter_is_woken_by_release() {
    let config = PoolConfig::new(1).with_acquire_timeout(Duration::from_secs(5));
    let pool = Arc::new(ConnectionPool::new(CountingFactory::default(), config));
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().map(|_| ()))
    };
    thread::sleep(Duration::from_millis(20));
    drop(held);

    assert!(waiter.join().unwrap().is_ok());
    assert_eq!(pool.factory().created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_creation_frees_the_slot() {
    let pool = ConnectionPool::new(CountingFactory::default(), PoolConfig::new(1));
    pool.factory().fail.store(true, Ordering::SeqCst);
    assert_eq!(pool.acquire().err().unwrap().kind(), ErrorKind::Connection);

    pool.factory().fail.store(false, Ordering::SeqCst);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_close_drops_idle_sessions_and_rejects_acquire() {
    let pool = ConnectionPool::new(CountingFactory::default(), PoolConfig::new(2));
    drop(pool.acquire().unwrap());
    assert_eq!(pool.factory().open.load(Ordering::SeqCst), 1);

    pool.close();
    assert_eq!(pool.factory().open.load(Ordering::SeqCst), 0);
    assert!(pool.status().closed);
    assert_eq!(pool.acquire().err().unwrap().kind(), ErrorKind::Connection);
}
