use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use stratum_pg::{PgConfig, PgSchemaConnection};

pub const TEST_LEDGER_TABLE: &str = "_stratum_migrations_test";

pub fn config() -> PgConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    PgConfig::from_env().with_ledger_table(TEST_LEDGER_TABLE)
}

pub async fn get_pg_pool() -> PgPool {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config().database_url)
        .await
        .expect("Failed to create Postgres pool")
}

pub async fn connect() -> PgSchemaConnection {
    PgSchemaConnection::from_pool(&get_pg_pool().await, &config())
        .await
        .expect("Failed to connect to postgres")
}
