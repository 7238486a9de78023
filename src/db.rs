//! Relational store binding. Spec leaves the DB abstract (`query`/row
//! iterator, pool `lease`/`release`); bound here to `rusqlite` pooled with
//! `r2d2`/`r2d2_sqlite`, mirroring the original's `SqlConnPool` (fixed-size
//! pool, blocking acquire) and `SqlConnRAII` (scope-based release) but with
//! parameterized statements instead of string-interpolated SQL.

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

use crate::error::Result;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Builds the pool and ensures the schema exists. `path` is typically a
/// file path from `--db-name`; an in-memory DB (`:memory:`) is also valid
/// and is what the test suite uses.
pub fn build_pool(path: &str, pool_size: u32) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder()
        .max_size(pool_size)
        .build(manager)?;

    pool.get()?.execute_batch(
        "CREATE TABLE IF NOT EXISTS user (
            username TEXT PRIMARY KEY,
            password TEXT NOT NULL
        )",
    )?;
    Ok(pool)
}

/// `GetFreeConnCount`-style pool introspection, exposed for logging only.
pub fn idle_connections(pool: &Pool) -> u32 {
    pool.state().idle_connections
}

/// Outcome of a login attempt: username present and password matches. An
/// empty username or password is rejected outright without a query,
/// mirroring `UserVerify`'s `if (name.empty() || pwd.empty()) return false;`
/// (`examples/original_source/code/http/httprequest.cpp`).
pub fn login(conn: &PooledConn, username: &str, password: &str) -> Result<bool> {
    if username.is_empty() || password.is_empty() {
        return Ok(false);
    }
    let stored: Option<String> = conn
        .query_row(
            "SELECT password FROM user WHERE username = ?1 LIMIT 1",
            [username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.as_deref() == Some(password))
}

/// Outcome of a registration attempt: `true` if the username was free and
/// the row was inserted, `false` if it was already taken or the username or
/// password was empty (same `UserVerify` guard as `login`).
pub fn register(conn: &PooledConn, username: &str, password: &str) -> Result<bool> {
    if username.is_empty() || password.is_empty() {
        return Ok(false);
    }
    let exists: Option<String> = conn
        .query_row(
            "SELECT username FROM user WHERE username = ?1 LIMIT 1",
            [username],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO user (username, password) VALUES (?1, ?2)",
        [username, password],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_login_round_trips() {
        let pool = build_pool(":memory:", 4).unwrap();
        let conn = pool.get().unwrap();

        assert!(register(&conn, "alice", "secret").unwrap());
        assert!(!register(&conn, "alice", "other").unwrap());

        assert!(login(&conn, "alice", "secret").unwrap());
        assert!(!login(&conn, "alice", "wrong").unwrap());
        assert!(!login(&conn, "nobody", "anything").unwrap());
    }

    #[test]
    fn empty_credentials_are_rejected_without_touching_the_table() {
        let pool = build_pool(":memory:", 4).unwrap();
        let conn = pool.get().unwrap();

        assert!(!register(&conn, "", "secret").unwrap());
        assert!(!register(&conn, "alice", "").unwrap());
        assert!(!login(&conn, "", "").unwrap());

        // no row was ever inserted for the blank username above.
        assert!(register(&conn, "", "anything").unwrap() == false);
    }
}
