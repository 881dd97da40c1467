//! Integration tests for the connection pool over SQLite.
//!
//! Tests verify that:
//! - Concurrent borrowers never hold more than `max_active` connections
//! - Overdue connections are reclaimed and their old handles invalidated
//! - Credential changes close every pooled connection
//! - A manual-commit lease does not leak its mode to the next borrower

mod common;

use common::TestDb;
use rand::Rng;
use sqlmapper::datasource::PoolSettings;
use sqlmapper::driver::{Connection, PreparedCommand};
use sqlmapper::error::MapperError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_borrowers_respect_max_active() {
    let db = TestDb::new();
    let pool = db.pool(PoolSettings {
        max_active: 2,
        max_idle: 2,
        time_to_wait: Duration::from_millis(20),
        ..PoolSettings::default()
    });
    let holding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let pool = pool.clone();
            let holding = holding.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    let mut conn = pool.acquire().unwrap();
                    let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    conn.query(&PreparedCommand::new("SELECT count(*) FROM users"))
                        .unwrap();
                    let pause = rand::thread_rng().gen_range(1..10);
                    thread::sleep(Duration::from_millis(pause));
                    holding.fetch_sub(1, Ordering::SeqCst);
                    conn.close().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    let status = pool.status();
    assert_eq!(status.active_connections, 0);
    assert_eq!(status.request_count, 18);
    assert!(status.idle_connections <= 2);
}

#[test]
fn test_overdue_connection_is_reclaimed() {
    let db = TestDb::new();
    let pool = db.pool(PoolSettings {
        max_active: 1,
        max_idle: 1,
        max_checkout_time: Duration::from_millis(30),
        time_to_wait: Duration::from_millis(10),
        ..PoolSettings::default()
    });

    let mut first = pool.acquire().unwrap();
    first.set_auto_commit(false).unwrap();
    first
        .execute(&PreparedCommand::new("DELETE FROM users"))
        .unwrap();
    thread::sleep(Duration::from_millis(60));

    let mut second = pool.acquire().unwrap();
    assert!(!first.is_valid());
    assert_eq!(first.id(), second.id());
    let err = first
        .query(&PreparedCommand::new("SELECT 1"))
        .unwrap_err();
    assert!(matches!(err, MapperError::Connection { .. }));

    // The overdue borrower's transaction was rolled back.
    let rs = second
        .query(&PreparedCommand::new("SELECT count(*) FROM users"))
        .unwrap();
    assert_eq!(rs.row(0).and_then(|r| r.get_at(0).cloned()), Some(sqlmapper::Value::Int(3)));
    assert_eq!(pool.status().claimed_overdue_connection_count, 1);
}

#[test]
fn test_credential_change_closes_connections() {
    let db = TestDb::new();
    let pool = db.pool(PoolSettings::default());
    let active = pool.acquire().unwrap();
    drop(pool.acquire().unwrap());
    assert_eq!(pool.status().idle_connections, 1);

    pool.set_username(Some("auditor".to_string()));
    assert!(!active.is_valid());
    assert_eq!(pool.status().idle_connections, 0);
    assert_eq!(pool.status().active_connections, 0);
}

#[test]
fn test_manual_commit_lease_not_inherited() {
    let db = TestDb::new();
    let pool = db.pool(PoolSettings {
        max_active: 1,
        max_idle: 1,
        ..PoolSettings::default()
    });

    let mut first = pool.acquire().unwrap();
    first.set_auto_commit(false).unwrap();
    first
        .execute(&PreparedCommand::new("DELETE FROM users WHERE user_name = 'cy'"))
        .unwrap();
    first.commit().unwrap();
    drop(first);
    assert_eq!(db.count_users(), 2);

    let mut second = pool.acquire().unwrap();
    assert!(second.auto_commit().unwrap());
    second
        .execute(&PreparedCommand::new(
            "INSERT INTO users (user_name, age) VALUES ('dee', 19)",
        ))
        .unwrap();
    drop(second);

    assert_eq!(db.count_users(), 3);
}
