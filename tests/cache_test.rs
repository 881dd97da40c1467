//! Integration tests for the two cache levels.
//!
//! Tests verify that:
//! - Cache keys are deterministic and sensitive to every component
//! - Second-level entries become visible to other sessions only on commit
//! - A rolled back session leaves the shared cache untouched
//! - Writes in a namespace clear its shared cache on commit

mod common;

use common::{ExecutionCounter, TestDb, User};
use sqlmapper::cache::{CacheBuilder, Eviction};
use sqlmapper::config::Settings;
use sqlmapper::executor::Executor;
use sqlmapper::mapping::{CommandKind, ResultType, RowBounds};
use sqlmapper::reflection::{Param, ParamMap, ParameterType};
use sqlmapper::session::{Configuration, SqlSessionFactory};
use std::sync::Arc;

fn register(configuration: &mut Configuration) {
    configuration
        .add_cache(
            CacheBuilder::new("users")
                .eviction(Eviction::Fifo)
                .size(16)
                .logging(true)
                .build(),
        )
        .unwrap();
    let source = configuration
        .raw_sql_source(
            "SELECT id, user_name, age FROM users WHERE age >= #{minAge} ORDER BY id",
            ParameterType::Map,
        )
        .unwrap();
    let statement = configuration
        .statement_builder("users.olderThan", CommandKind::Select, source)
        .result_type(ResultType::entity::<User>())
        .build();
    configuration.add_statement(statement).unwrap();

    let source = configuration
        .raw_sql_source("UPDATE users SET age = age + 1", ParameterType::Unknown)
        .unwrap();
    let statement = configuration
        .statement_builder("users.birthday", CommandKind::Update, source)
        .build();
    configuration.add_statement(statement).unwrap();
}

fn factory(db: &TestDb) -> (SqlSessionFactory, Arc<ExecutionCounter>) {
    let (mut configuration, counter) = db.configuration(Settings::default());
    register(&mut configuration);
    (SqlSessionFactory::new(configuration), counter)
}

fn min_age(age: i64) -> Param {
    Param::Map(ParamMap::new().with("minAge", Param::scalar(age)))
}

#[test]
fn test_cache_key_determinism() {
    let db = TestDb::new();
    let (factory, _) = factory(&db);
    let configuration = factory.configuration().clone();
    let statement = configuration.get_statement("users.olderThan").unwrap();
    let environment = configuration.environment();
    let executor = configuration.new_executor(environment.transaction_factory.new_transaction(
        environment.data_source.clone(),
        None,
        false,
    ));

    let key = |param: &Param, bounds: RowBounds| {
        let bound_sql = statement.bound_sql(param).unwrap();
        executor
            .create_cache_key(&statement, param, bounds, &bound_sql)
            .unwrap()
    };
    let a = key(&min_age(30), RowBounds::default());
    let b = key(&min_age(30), RowBounds::default());
    assert_eq!(a, b);
    assert_ne!(a, key(&min_age(31), RowBounds::default()));
    assert_ne!(a, key(&min_age(30), RowBounds { offset: 1, limit: 10 }));
}

#[test]
fn test_commit_publishes_to_other_sessions() {
    let db = TestDb::new();
    let (factory, counter) = factory(&db);
    let cache = factory.configuration().cache("users").unwrap().clone();

    let mut a = factory.open_session_with(true, None);
    let mut b = factory.open_session_with(true, None);

    let first: Vec<User> = a.select_list("users.olderThan", &min_age(30)).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(counter.count(), 1);

    // Pending in A's buffer only.
    assert_eq!(cache.size(), 0);
    let _: Vec<User> = b.select_list("users.olderThan", &min_age(30)).unwrap();
    assert_eq!(counter.count(), 2);

    a.commit().unwrap();
    assert_eq!(cache.size(), 1);

    let mut c = factory.open_session_with(true, None);
    let cached: Vec<User> = c.select_list("users.olderThan", &min_age(30)).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(counter.count(), 2);
}

#[test]
fn test_rollback_leaves_shared_cache_unchanged() {
    let db = TestDb::new();
    let (factory, counter) = factory(&db);
    let cache = factory.configuration().cache("users").unwrap().clone();

    let mut a = factory.open_session();
    let _: Vec<User> = a.select_list("users.olderThan", &min_age(30)).unwrap();
    a.rollback_force().unwrap();
    assert_eq!(cache.size(), 0);

    let mut b = factory.open_session_with(true, None);
    let _: Vec<User> = b.select_list("users.olderThan", &min_age(30)).unwrap();
    assert_eq!(counter.count(), 2);
}

#[test]
fn test_write_clears_namespace_cache_on_commit() {
    let db = TestDb::new();
    let (factory, counter) = factory(&db);
    let cache = factory.configuration().cache("users").unwrap().clone();

    let mut reader = factory.open_session_with(true, None);
    let _: Vec<User> = reader.select_list("users.olderThan", &min_age(40)).unwrap();
    reader.commit().unwrap();
    reader.close().unwrap();
    assert_eq!(cache.size(), 1);

    let mut writer = factory.open_session();
    writer.update("users.birthday", &mut Param::Null).unwrap();
    // Not yet committed: the shared entry survives.
    assert_eq!(cache.size(), 1);
    writer.commit().unwrap();
    writer.close().unwrap();
    assert_eq!(cache.size(), 0);

    let mut reader = factory.open_session_with(true, None);
    let older: Vec<User> = reader.select_list("users.olderThan", &min_age(40)).unwrap();
    assert_eq!(older.iter().map(|u| u.age).collect::<Vec<_>>(), vec![43]);
    // read, update, read again
    assert_eq!(counter.count(), 3);
}

#[test]
fn test_close_commits_pending_entries() {
    let db = TestDb::new();
    let (factory, _) = factory(&db);
    let cache = factory.configuration().cache("users").unwrap().clone();
    {
        let mut session = factory.open_session_with(true, None);
        let _: Vec<User> = session.select_list("users.olderThan", &min_age(20)).unwrap();
    }
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_cache_disabled_skips_shared_cache() {
    let db = TestDb::new();
    let settings = Settings {
        cache_enabled: false,
        ..Settings::default()
    };
    let (mut configuration, counter) = db.configuration(settings);
    register(&mut configuration);
    let factory = SqlSessionFactory::new(configuration);
    let cache = factory.configuration().cache("users").unwrap().clone();

    for _ in 0..2 {
        let mut session = factory.open_session_with(true, None);
        let _: Vec<User> = session.select_list("users.olderThan", &min_age(20)).unwrap();
        session.commit().unwrap();
    }
    assert_eq!(cache.size(), 0);
    assert_eq!(counter.count(), 2);
}
