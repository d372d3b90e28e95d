//! Bounded connection pool with FIFO handout.
//!
//! Connections are opened up front and recycled through a queue. A caller
//! acquires a connection for the duration of one logical operation; the
//! guard returns it on every exit path, including panics and early `?`
//! returns. Acquisition blocks up to a timeout, then fails with
//! `PoolExhausted`.

use crate::{DatabaseErrorKind, Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Shared pool state.
#[derive(Debug)]
struct PoolShared {
    connections: Mutex<VecDeque<Connection>>,
    available: Condvar,
    acquire_timeout: Duration,
}

/// Acquires the pool mutex, recovering from poison.
///
/// A panic while holding the queue lock leaves the queue itself intact, so
/// recovery is safe; the event is logged and counted.
fn lock_queue(shared: &PoolShared) -> MutexGuard<'_, VecDeque<Connection>> {
    match shared.connections.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("connection pool mutex was poisoned, recovering");
            metrics::counter!("pool_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies the standard connection pragmas: WAL journaling, NORMAL
/// synchronous, a 5 second busy timeout, and foreign keys.
fn configure_connection(conn: &Connection) {
    // journal_mode returns a row; ignore it rather than treat it as failure
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");
}

/// A fixed-size pool of SQLite connections over one database.
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    size: usize,
}

impl ConnectionPool {
    /// Opens `size` connections to the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if any connection fails to open.
    pub fn open(path: &Path, size: usize, acquire_timeout: Duration) -> Result<Self> {
        let mut connections = VecDeque::with_capacity(size);
        for _ in 0..size.max(1) {
            let conn = Connection::open(path).map_err(super::translate_error)?;
            configure_connection(&conn);
            connections.push_back(conn);
        }
        Ok(Self::from_connections(connections, acquire_timeout))
    }

    /// Opens a pool over a process-private in-memory database.
    ///
    /// All pooled connections share one in-memory database through SQLite's
    /// shared-cache URI mode. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if any connection fails to open.
    pub fn open_in_memory(size: usize, acquire_timeout: Duration) -> Result<Self> {
        let uri = format!("file:engram-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let mut connections = VecDeque::with_capacity(size);
        for _ in 0..size.max(1) {
            let conn =
                Connection::open_with_flags(&uri, flags).map_err(super::translate_error)?;
            configure_connection(&conn);
            connections.push_back(conn);
        }
        Ok(Self::from_connections(connections, acquire_timeout))
    }

    fn from_connections(connections: VecDeque<Connection>, acquire_timeout: Duration) -> Self {
        let size = connections.len();
        Self {
            shared: Arc::new(PoolShared {
                connections: Mutex::new(connections),
                available: Condvar::new(),
                acquire_timeout,
            }),
            size,
        }
    }

    /// Returns the pool size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Acquires a connection, blocking up to the configured timeout.
    ///
    /// Handout is FIFO: the connection idle longest is handed out first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError{kind: PoolExhausted}` if no connection becomes
    /// available within the timeout.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.shared.acquire_timeout;
        let mut queue = lock_queue(&self.shared);

        loop {
            if let Some(conn) = queue.pop_front() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    shared: Arc::clone(&self.shared),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                metrics::counter!("pool_exhausted_total").increment(1);
                return Err(Error::Database {
                    kind: DatabaseErrorKind::PoolExhausted,
                    message: format!(
                        "no connection available within {:?}",
                        self.shared.acquire_timeout
                    ),
                });
            }

            let (guard, _timeout) = match self.shared.available.wait_timeout(queue, deadline - now)
            {
                Ok(result) => result,
                Err(poisoned) => {
                    tracing::warn!("connection pool condvar wait recovered from poison");
                    poisoned.into_inner()
                },
            };
            queue = guard;
        }
    }
}

/// A connection checked out from the pool.
///
/// Dereferences to [`rusqlite::Connection`]; returning to the pool happens
/// on drop.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<Connection>,
    shared: Arc<PoolShared>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    // Invariant: `conn` is only None after drop
    #[allow(clippy::unwrap_used)]
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().unwrap()
    }
}

impl DerefMut for PooledConnection {
    #[allow(clippy::unwrap_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut queue = lock_queue(&self.shared);
            queue.push_back(conn);
            drop(queue);
            self.shared.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn small_pool() -> ConnectionPool {
        ConnectionPool::open_in_memory(2, Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn test_acquire_and_release() {
        let pool = small_pool();
        {
            let conn = pool.acquire().unwrap();
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
            assert_eq!(one, 1);
        }
        // Released on drop; both connections can be taken again
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
    }

    #[test]
    fn test_exhaustion_times_out() {
        let pool = small_pool();
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();

        let err = pool.acquire().unwrap_err();
        assert!(matches!(
            err,
            Error::Database {
                kind: DatabaseErrorKind::PoolExhausted,
                ..
            }
        ));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let pool = Arc::new(ConnectionPool::open_in_memory(1, Duration::from_secs(2)).unwrap());
        let held = pool.acquire().unwrap();

        let pool_clone = Arc::clone(&pool);
        let handle = thread::spawn(move || pool_clone.acquire().map(|_| ()));

        thread::sleep(Duration::from_millis(50));
        drop(held);

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_shared_in_memory_database() {
        let pool = small_pool();
        {
            let conn = pool.acquire().unwrap();
            conn.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
            conn.execute("INSERT INTO t (x) VALUES (42)", []).unwrap();
        }
        // A different pooled connection sees the same data
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);
        let x: i64 = b.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 42);
    }
}
