use anyhow::Context as _;
use serde_json::json;
use std::time::{Duration, Instant};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{GenericImage, ImageExt};
use toolbridge_adapters::postgres::{
    DescribeTableArgs, ListTablesArgs, Postgres, PostgresCall, PostgresConfig, QueryArgs,
};
use toolbridge_core::AdapterError;
use toolbridge_core::tools::{NoArgs, ToolSet};

async fn wait_pg_ready(database_url: &str, timeout: Duration) -> anyhow::Result<sqlx::PgPool> {
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            anyhow::bail!("timed out waiting for Postgres");
        }
        if let Ok(pool) = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
        {
            return Ok(pool);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[tokio::test]
#[ignore = "requires Docker (testcontainers)"]
async fn read_only_tools_against_real_postgres() -> anyhow::Result<()> {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .start()
        .await
        .context("start postgres container")?;
    let host = container.get_host().await?.to_string();
    let port = container.get_host_port_ipv4(5432).await?;
    let database_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let setup = wait_pg_ready(&database_url, Duration::from_secs(30)).await?;
    for stmt in [
        "CREATE TABLE customers (id serial PRIMARY KEY, name text NOT NULL, tier text)",
        "INSERT INTO customers (name, tier) VALUES ('Acme', 'gold'), ('Globex', NULL), ('Initech', 'silver')",
        "CREATE SEQUENCE invoice_numbers",
    ] {
        sqlx::query(stmt).execute(&setup).await?;
    }
    setup.close().await;

    let pg = Postgres::new(&PostgresConfig {
        database_url,
        max_connections: 2,
        max_rows: 2,
        statement_timeout_ms: 5_000,
    })?;

    let env = pg
        .invoke(PostgresCall::Query(QueryArgs {
            sql: "SELECT id, name, tier FROM customers ORDER BY id;".into(),
        }))
        .await?;
    let data = env.data.context("query data")?;
    assert_eq!(data["rowCount"], 2);
    assert_eq!(data["truncated"], true);
    assert_eq!(data["rows"][0], json!({"id": 1, "name": "Acme", "tier": "gold"}));
    assert_eq!(data["rows"][1]["tier"], json!(null));

    let env = pg
        .invoke(PostgresCall::Query(QueryArgs {
            sql: "SELECT 1 AS n -- first row only".into(),
        }))
        .await?;
    assert_eq!(env.data.context("commented query")?["rows"], json!([{"n": 1}]));

    let env = pg.invoke(PostgresCall::ListSchemas(NoArgs {})).await?;
    let schemas = env.data.context("schemas")?;
    assert!(
        schemas
            .as_array()
            .is_some_and(|s| s.contains(&json!({"schema_name": "public"})))
    );

    let env = pg
        .invoke(PostgresCall::ListTables(ListTablesArgs { schema: None }))
        .await?;
    assert_eq!(
        env.data.context("tables")?,
        json!([{"table_name": "customers", "table_type": "BASE TABLE"}])
    );

    let env = pg
        .invoke(PostgresCall::DescribeTable(DescribeTableArgs {
            table: "customers".into(),
            schema: None,
        }))
        .await?;
    let columns = env.data.context("columns")?["columns"].clone();
    assert_eq!(columns[0]["column_name"], "id");
    assert_eq!(columns[1]["is_nullable"], "NO");
    assert_eq!(columns[2]["is_nullable"], "YES");

    // Writes are refused by the read-only transaction.
    let err = pg
        .invoke(PostgresCall::Query(QueryArgs {
            sql: "SELECT nextval('invoice_numbers')".into(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Database(_)));
    assert!(err.to_string().contains("read-only transaction"));

    let err = pg
        .invoke(PostgresCall::DescribeTable(DescribeTableArgs {
            table: "missing".into(),
            schema: None,
        }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("public.missing not found"));

    // Failed statements released their connections.
    for _ in 0..4 {
        pg.invoke(PostgresCall::Query(QueryArgs {
            sql: "SELECT 1 AS one".into(),
        }))
        .await?;
    }

    pg.shutdown().await;
    Ok(())
}
