// ABOUTME: Concurrent creation tests for the scope store
// ABOUTME: Many threads racing on one unseen id must agree on a single scope row

use rusqlite::Connection;
use scopebot_core::{Platform, ScopeStore};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;

fn count(db: &std::path::Path, sql: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn test_racing_place_creation_yields_one_scope() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scopes.db");
    let store = Arc::new(ScopeStore::open(&db).unwrap());
    let platform = Platform::new("discord").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let platform = platform.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .get_or_create_place_scope(&platform, "new-channel", "new-guild")
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = results[0];
    assert!(results.iter().all(|r| *r == first));

    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM platform_discord_channels"),
        1
    );
    // The sentinel plus the one real guild
    assert_eq!(count(&db, "SELECT COUNT(*) FROM platform_discord_guilds"), 2);
    // No orphaned scope rows from losing creators
    assert_eq!(count(&db, "SELECT COUNT(*) FROM scopes"), 3);
}

#[test]
fn test_racing_channels_share_new_guild() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scopes.db");
    let store = Arc::new(ScopeStore::open(&db).unwrap());
    let platform = Platform::new("discord").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let platform = platform.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .get_or_create_place_scope(&platform, &format!("c{}", i), "shared")
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let guild = results[0].guild;
    assert!(results.iter().all(|r| r.guild == guild && !r.guild_is_sentinel));
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM platform_discord_channels"),
        THREADS as i64
    );
    assert_eq!(count(&db, "SELECT COUNT(*) FROM platform_discord_guilds"), 2);
}

#[test]
fn test_racing_person_creation_yields_one_scope() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scopes.db");
    let store = Arc::new(ScopeStore::open(&db).unwrap());
    let platform = Platform::new("twitch").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let platform = platform.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get_or_create_person_scope(&platform, "viewer").unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(count(&db, "SELECT COUNT(*) FROM platform_twitch_users"), 1);
}

#[test]
fn test_separate_store_handles_agree() {
    // Two stores over one file behave like two processes
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scopes.db");
    let a = ScopeStore::open(&db).unwrap();
    let b = ScopeStore::open(&db).unwrap();
    let platform = Platform::new("discord").unwrap();

    let from_a = a.get_or_create_place_scope(&platform, "c1", "g1").unwrap();
    let from_b = b.get_or_create_place_scope(&platform, "c1", "g1").unwrap();
    assert_eq!(from_a, from_b);
    assert_eq!(a.sentinel_scope(&platform).unwrap(), b.sentinel_scope(&platform).unwrap());
}
