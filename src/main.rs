//! sqlmapper - run one parameterized statement through a pooled session.

use clap::Parser;
use sqlmapper::config::{Config, DataSourceConfig};
use sqlmapper::datasource::{PooledDataSource, UnpooledDataSource};
use sqlmapper::driver::SqliteDriver;
use sqlmapper::mapping::{CommandKind, ResultObject, ResultType};
use sqlmapper::reflection::{Param, ParamMap, ParameterType};
use sqlmapper::session::{Configuration, Environment, SqlSessionFactory};
use sqlmapper::value::Value;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const STATEMENT_ID: &str = "cli.run";

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Integers, then floats, then `null`, otherwise text.
fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else {
        Value::from(raw)
    }
}

fn run(config: &Config) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let data_source_config = DataSourceConfig::parse(&config.database)?;
    let driver = Arc::new(SqliteDriver::new()?);
    let unpooled = UnpooledDataSource::new(driver, data_source_config.url.clone())
        .with_credentials(data_source_config.credentials.clone());
    let pool = Arc::new(PooledDataSource::new(
        unpooled,
        data_source_config.pool_options.to_settings(),
    ));

    let mut configuration =
        Configuration::new(Environment::new(&config.environment, pool.clone()))
            .with_settings(config.settings());
    let command = if config.update {
        CommandKind::Update
    } else {
        CommandKind::Select
    };
    let source = configuration.raw_sql_source(&config.sql, ParameterType::Map)?;
    let statement = configuration
        .statement_builder(STATEMENT_ID, command, source)
        .result_type(ResultType::Map)
        .build();
    configuration.add_statement(statement)?;

    let mut params = ParamMap::new();
    for (name, raw) in config.parse_params()? {
        params.insert(name, parse_value(&raw));
    }
    let mut param = Param::Map(params);

    let factory = SqlSessionFactory::new(configuration);
    let mut session = factory.open_session();
    let output = if config.update {
        let affected = session.update(STATEMENT_ID, &mut param)?;
        session.commit()?;
        serde_json::json!({ "rows_affected": affected })
    } else {
        let rows: Vec<ResultObject> = session.select_list(STATEMENT_ID, &param)?;
        serde_json::Value::Array(rows.iter().map(ResultObject::to_json).collect())
    };
    session.close()?;

    info!(pool = ?pool.status(), "Finished");
    Ok(output)
}

fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    match run(&config) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!(error = %e, "Failed to render output");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Statement failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
