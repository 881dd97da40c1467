//! Integration tests for mapper dispatch and interceptors.
//!
//! Tests verify that:
//! - A hand-written mapper routes method calls to registered statements
//! - Positional arguments resolve by name and by `paramN` alias
//! - Interceptors can rewrite commands and replace execution

mod common;

use common::{TestDb, User};
use sqlmapper::binding::MethodResult;
use sqlmapper::config::Settings;
use sqlmapper::driver::ResultSet;
use sqlmapper::error::{MapperError, MapperResult};
use sqlmapper::mapping::{CommandKind, FromResult, ResultType};
use sqlmapper::plugin::{Execution, Interceptor, Invocation};
use sqlmapper::reflection::{Param, ParamMap, ParameterType};
use sqlmapper::session::{Configuration, SqlSession, SqlSessionFactory};
use sqlmapper::Value;
use std::sync::Arc;

/// Typed facade over the `users` namespace.
struct UserMapper<'s> {
    session: &'s mut SqlSession,
}

impl UserMapper<'_> {
    const NAMESPACE: &'static str = "users";
    const METHODS: [&'static str; 3] = ["findByAge", "findByNameAndAge", "retire"];

    fn find_by_age(&mut self, age: i64) -> MapperResult<Vec<User>> {
        let mut param = Param::scalar(age);
        self.rows("findByAge", &mut param)
    }

    fn find_by_name_and_age(&mut self, name: &str, age: i64) -> MapperResult<Vec<User>> {
        let mut param = Param::Map(ParamMap::named([
            ("name", Param::scalar(name)),
            ("age", Param::scalar(age)),
        ]));
        self.rows("findByNameAndAge", &mut param)
    }

    fn retire(&mut self, age: i64) -> MapperResult<u64> {
        let mut param = Param::scalar(age);
        match self.session.invoke(Self::NAMESPACE, "retire", &mut param)? {
            MethodResult::Affected(count) => Ok(count),
            MethodResult::Rows(_) => Err(MapperError::usage("retire returned rows")),
        }
    }

    fn rows(&mut self, method: &str, param: &mut Param) -> MapperResult<Vec<User>> {
        self.session
            .invoke(Self::NAMESPACE, method, param)?
            .into_rows()?
            .into_iter()
            .map(User::from_result)
            .collect()
    }
}

fn register(configuration: &mut Configuration) {
    let statements = [
        (
            "users.findByAge",
            CommandKind::Select,
            "SELECT id, user_name, age FROM users WHERE age > #{age} ORDER BY id",
        ),
        (
            "users.findByNameAndAge",
            CommandKind::Select,
            "SELECT id, user_name, age FROM users WHERE user_name = #{param1} AND age = #{age}",
        ),
        (
            "users.retire",
            CommandKind::Delete,
            "DELETE FROM users WHERE age > #{age}",
        ),
    ];
    for (id, command, sql) in statements {
        let source = configuration.raw_sql_source(sql, ParameterType::Unknown).unwrap();
        let mut builder = configuration.statement_builder(id, command, source);
        if command == CommandKind::Select {
            builder = builder.result_type(ResultType::entity::<User>());
        }
        configuration.add_statement(builder.build()).unwrap();
    }
    configuration
        .add_mapper(UserMapper::NAMESPACE, UserMapper::METHODS)
        .unwrap();
}

#[test]
fn test_mapper_dispatch() {
    let db = TestDb::new();
    let (mut configuration, _) = db.configuration(Settings::default());
    register(&mut configuration);
    let factory = SqlSessionFactory::new(configuration);
    let mut session = factory.open_session();
    let mut mapper = UserMapper {
        session: &mut session,
    };

    let older = mapper.find_by_age(30).unwrap();
    assert_eq!(older.len(), 2);

    let bob = mapper.find_by_name_and_age("bob", 42).unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].id, Some(2));

    assert_eq!(mapper.retire(40).unwrap(), 1);
    assert_eq!(mapper.find_by_age(30).unwrap().len(), 1);
    session.commit().unwrap();
    assert_eq!(db.count_users(), 2);
}

#[test]
fn test_unknown_mapper_method() {
    let db = TestDb::new();
    let (mut configuration, _) = db.configuration(Settings::default());
    register(&mut configuration);
    let factory = SqlSessionFactory::new(configuration);
    let mut session = factory.open_session();

    let err = session
        .invoke("users", "vanish", &mut Param::Null)
        .unwrap_err();
    assert!(err.to_string().contains("users.vanish"));
    let err = session
        .invoke("orders", "find", &mut Param::Null)
        .unwrap_err();
    assert!(err.to_string().contains("not known"));
}

/// Caps every select at one row by rewriting its SQL.
#[derive(Debug)]
struct LimitOne;

impl Interceptor for LimitOne {
    fn on_prepare(&self, mut invocation: Invocation<'_, ()>) -> MapperResult<()> {
        if invocation.command().sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            invocation.command_mut().sql.push_str(" LIMIT 1");
        }
        invocation.proceed()
    }
}

/// Answers one statement without touching the database.
#[derive(Debug)]
struct Canned;

impl Interceptor for Canned {
    fn on_execute(&self, invocation: Invocation<'_, Execution>) -> MapperResult<Execution> {
        if invocation.statement_id() == "users.findByAge" {
            let rows = ResultSet::new(
                vec![
                    sqlmapper::driver::ColumnInfo::new("id", None),
                    sqlmapper::driver::ColumnInfo::new("user_name", None),
                ],
                vec![vec![Value::Int(99), Value::from("canned")]],
            );
            return Ok(Execution::Query(rows));
        }
        invocation.proceed()
    }
}

#[test]
fn test_interceptors_rewrite_and_replace() {
    let db = TestDb::new();
    let (mut configuration, counter) = db.configuration(Settings::default());
    configuration.add_interceptor(Arc::new(LimitOne));
    configuration.add_interceptor(Arc::new(Canned));
    register(&mut configuration);
    let factory = SqlSessionFactory::new(configuration);
    let mut session = factory.open_session();

    let canned: Vec<User> = session.select_list("users.findByAge", &Param::scalar(0i64)).unwrap();
    assert_eq!(canned.len(), 1);
    assert_eq!(canned[0].user_name.as_deref(), Some("canned"));

    let mut param = Param::Map(ParamMap::named([
        ("name", Param::scalar("ann")),
        ("age", Param::scalar(31i64)),
    ]));
    let ann: Vec<User> = session.select_list("users.findByNameAndAge", &param).unwrap();
    assert_eq!(ann.len(), 1);

    // The counter sits outermost, so it sees both executions.
    assert_eq!(counter.count(), 2);
    assert!(session.update("users.retire", &mut param).is_ok());
}
