use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::schema::run_migrations;
use crate::Result;

/// A small connection pool bounded between a configured min and max size
/// (default min=1, max=5).
///
/// Backed by `rusqlite` rather than the Postgres DSN `relay_config::DatabaseConfig`
/// names for the external deployment contract. The pool abstraction (bounded
/// set of connections, round-robin checkout) is kept so swapping the driver
/// later doesn't change call sites.
pub struct Pool {
    conns: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl Pool {
    /// Opens `max` connections against the same file, running migrations once.
    pub fn open(path: &Path, min: usize, max: usize) -> Result<Self> {
        let max = max.max(min).max(1);
        let mut conns = Vec::with_capacity(max);
        for i in 0..max {
            let conn = Connection::open(path)?;
            if i == 0 {
                run_migrations(&conn)?;
            }
            conns.push(Arc::new(Mutex::new(conn)));
        }
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    /// A single shared in-memory connection, used by tests and the
    /// in-memory reference configuration.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conns: vec![Arc::new(Mutex::new(conn))],
            next: AtomicUsize::new(0),
        })
    }

    /// Checks out a connection guard, round-robin across the pool.
    pub fn get(&self) -> MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns[idx].lock().expect("db connection mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_runs_migrations() {
        let pool = Pool::open_in_memory().unwrap();
        let conn = pool.get();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='chat_sessions'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn file_pool_round_robins_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let pool = Pool::open(&path, 1, 3).unwrap();
        let first = Arc::as_ptr(&pool.conns[0]);
        let _g1 = pool.get();
        drop(_g1);
        let _g2 = pool.get();
        drop(_g2);
        let _g3 = pool.get();
        // after three checkouts on a 3-connection pool we should be back at 0
        let _g4 = pool.get();
        assert_eq!(Arc::as_ptr(&pool.conns[0]), first);
    }
}
