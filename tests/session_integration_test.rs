//! End-to-end coverage of `Session`/`Environment`/`Transaction` against a
//! real SQLite connection: statement rendering, binding, result mapping,
//! client-side pagination, the first-level cache, and commit/rollback.

use sqlweave::registry::mapped_statement::{Command, KeyGeneratorKind, MappedStatement};
use sqlweave::registry::Registry;
use sqlweave::session::RowBounds;
use sqlweave::sql::parser;
use sqlweave::udbc::sqlite::pool::SqliteDriver;
use sqlweave::TableRow;
use std::sync::Once;

#[derive(Debug, Clone, PartialEq, TableRow)]
struct User {
    id: i64,
    name: String,
}

#[derive(serde::Serialize)]
struct NoParams;

#[derive(serde::Serialize)]
struct InsertArgs<'a> {
    name: &'a str,
}

#[derive(serde::Serialize)]
struct IdArg {
    id: i64,
}

static INIT: Once = Once::new();

/// Registers the schema-creation and CRUD statements this file's tests
/// share, and a `SqliteDriver` under a name unique to this test binary.
/// Safe to call repeatedly: guarded by `Once`, and every statement lives
/// in the process-wide registry so a second call would otherwise collide.
fn setup() {
    INIT.call_once(|| {
        let registry = Registry::global();

        registry
            .register_statement(MappedStatement::new(
                "user.createTable",
                Command::Update,
                parser::parse("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)"),
            ))
            .unwrap();

        let mut insert = MappedStatement::new(
            "user.insert",
            Command::Insert,
            parser::parse("INSERT INTO users (name) VALUES (#{name})"),
        );
        insert.key_generator = KeyGeneratorKind::After;
        insert.key_properties.push("id".to_string());
        registry.register_statement(insert).unwrap();

        registry
            .register_statement(MappedStatement::new(
                "user.findById",
                Command::Select,
                parser::parse("SELECT id, name FROM users WHERE id = #{id}"),
            ))
            .unwrap();

        registry
            .register_statement(MappedStatement::new(
                "user.findAll",
                Command::Select,
                parser::parse("SELECT id, name FROM users ORDER BY id"),
            ))
            .unwrap();

        let driver = SqliteDriver::new("sqlite::memory:")
            .name("session-integration")
            .build()
            .unwrap();
        sqlweave::environment::global().register_driver(driver).unwrap();
    });
}

/// A fresh SQLite `:memory:` connection is opened per `Transaction::begin`
/// and never persists outside it, so every test below does its writes and
/// reads inside one open transaction.
fn open_session() -> sqlweave::session::Session {
    sqlweave::environment::global()
        .session_factory("session-integration")
        .expect("driver registered in setup()")
        .open_session()
}

#[tokio::test]
async fn insert_then_find_round_trips_through_one_transaction() {
    setup();
    let mut session = open_session();
    session.begin().await.unwrap();

    let _: u64 = session.execute_mapped("user.createTable", &NoParams).await.unwrap();
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "ada" }).await.unwrap();
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "grace" }).await.unwrap();

    let found: Option<User> = session.select_one("user.findById", &IdArg { id: 1 }).await.unwrap();
    assert_eq!(found, Some(User { id: 1, name: "ada".to_string() }));

    let missing: Option<User> = session.select_one("user.findById", &IdArg { id: 99 }).await.unwrap();
    assert_eq!(missing, None);

    let all: Vec<User> = session.select_list("user.findAll", &NoParams, None).await.unwrap();
    assert_eq!(all, vec![
        User { id: 1, name: "ada".to_string() },
        User { id: 2, name: "grace".to_string() },
    ]);

    session.commit().await.unwrap();
}

#[tokio::test]
async fn row_bounds_paginate_client_side() {
    setup();
    let mut session = open_session();
    session.begin().await.unwrap();

    let _: u64 = session.execute_mapped("user.createTable", &NoParams).await.unwrap();
    for name in ["a", "b", "c", "d"] {
        let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name }).await.unwrap();
    }

    let page: Vec<User> = session
        .select_list("user.findAll", &NoParams, Some(RowBounds::new(1, 2)))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);

    session.commit().await.unwrap();
}

#[tokio::test]
async fn repeated_select_within_a_session_hits_the_first_level_cache() {
    setup();
    let mut session = open_session();
    session.begin().await.unwrap();

    let _: u64 = session.execute_mapped("user.createTable", &NoParams).await.unwrap();
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "ada" }).await.unwrap();

    let first: Option<User> = session.select_one("user.findById", &IdArg { id: 1 }).await.unwrap();
    let second: Option<User> = session.select_one("user.findById", &IdArg { id: 1 }).await.unwrap();
    assert_eq!(first, second);

    // An update against the same session flushes the first-level cache,
    // so the next select observes the change rather than a stale entry.
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "grace" }).await.unwrap();
    let all: Vec<User> = session.select_list("user.findAll", &NoParams, None).await.unwrap();
    assert_eq!(all.len(), 2);

    session.commit().await.unwrap();
}

#[tokio::test]
async fn select_map_keys_rows_by_the_named_property() {
    setup();
    let mut session = open_session();
    session.begin().await.unwrap();

    let _: u64 = session.execute_mapped("user.createTable", &NoParams).await.unwrap();
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "ada" }).await.unwrap();
    let _: u64 = session.execute_mapped("user.insert", &InsertArgs { name: "grace" }).await.unwrap();

    let by_id: std::collections::HashMap<i64, User> =
        session.select_map("user.findAll", &NoParams, "id", None).await.unwrap();
    assert_eq!(by_id.len(), 2);
    assert_eq!(by_id.get(&1).map(|u| u.name.as_str()), Some("ada"));

    session.commit().await.unwrap();
}
