//! MySQL integration tests using testcontainers.
//!
//! Require Docker; run with `cargo test -- --ignored`.

#![cfg(feature = "mysql")]

use schemasync_core::discovery::{self, DiscoveryStrategy};
use schemasync_core::{
    ColumnPlan, ColumnSpec, ConnectionConfig, DatabaseDriver, FilterRule, ReconcileOptions,
    ReconcilePlan, Reconciler, ServerCredentials, TableSpec, create_driver,
};
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

async fn wait_for_mysql_ready(url: &str, max_attempts: u32) -> MySqlPool {
    for _ in 0..max_attempts {
        if let Ok(pool) = MySqlPool::connect(url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                return pool;
            }
            pool.close().await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("MySQL failed to become ready after {} attempts", max_attempts);
}

async fn seed(pool: &MySqlPool) {
    for statement in [
        "CREATE DATABASE shop_a",
        "CREATE DATABASE shop_b",
        "CREATE TABLE shop_a.TEST_A_CHATING_PROCESS (id INT PRIMARY KEY)",
        "CREATE TABLE shop_a.TEST_A_CHATING_PROCESS_BACKUP (id INT PRIMARY KEY)",
        "CREATE TABLE shop_b.TEST_B_CHATING_PROCESS (id INT PRIMARY KEY, session_id VARCHAR(64))",
    ] {
        sqlx::query(statement).execute(pool).await.unwrap();
    }
}

fn plan() -> ReconcilePlan {
    ReconcilePlan {
        tables: vec![
            TableSpec::new(
                "t_session",
                "CREATE TABLE t_session (id BIGINT PRIMARY KEY, started_at DATETIME NULL)",
            )
            .with_comment("chat sessions"),
        ],
        batch: None,
        columns: Some(ColumnPlan {
            filter: FilterRule::new(r"^TEST_.*_CHATING_PROCESS", &[r".*_BACKUP$"]).unwrap(),
            columns: vec![
                ColumnSpec::new("session_id", "VARCHAR(64) DEFAULT NULL")
                    .with_comment("owning session"),
            ],
        }),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_container_mysql_reconcile_is_idempotent() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let admin_url = format!("mysql://root@127.0.0.1:{}", port);
    let pool = wait_for_mysql_ready(&format!("{}/test", admin_url), 60).await;
    seed(&pool).await;

    let credentials = ServerCredentials::from_url(&admin_url).unwrap();
    let driver: Arc<dyn DatabaseDriver> = create_driver(&credentials, &ConnectionConfig::default())
        .await
        .unwrap()
        .into();
    assert!(driver.ping().await);

    let discovered = discovery::resolve_with_fallback(driver.as_ref(), &DiscoveryStrategy::All, None)
        .await
        .unwrap();
    assert_eq!(discovered.databases, vec!["shop_a", "shop_b"]);

    let reconciler = Reconciler::new(driver.clone(), plan(), ReconcileOptions::default());
    let first = reconciler.run(&discovered).await;
    assert!(!first.has_failures(), "{}", first.render_text());
    assert_eq!(first.totals.tables.created, 2);
    assert_eq!(first.totals.columns.created, 1);
    assert_eq!(first.totals.columns.existing, 1);
    assert_eq!(first.totals.tables_excluded, 1);
    let shop_a = first.database("shop_a").unwrap();
    assert_eq!(shop_a.excluded[0].name, "TEST_A_CHATING_PROCESS_BACKUP");

    let second = reconciler.run(&discovered).await;
    assert_eq!(second.totals.tables.created, 0);
    assert_eq!(second.totals.tables.existing, 2);
    assert_eq!(second.totals.columns.created, 0);
    assert_eq!(second.totals.columns.existing, 2);

    let row = sqlx::query(
        "SELECT CAST(COLUMN_COMMENT AS CHAR) AS comment, CAST(COLUMN_TYPE AS CHAR) AS type \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = 'shop_a' AND TABLE_NAME = 'TEST_A_CHATING_PROCESS' AND COLUMN_NAME = 'session_id'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("comment"), "owning session");
    assert_eq!(row.get::<String, _>("type"), "varchar(64)");

    let backup_columns: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = 'shop_a' AND TABLE_NAME = 'TEST_A_CHATING_PROCESS_BACKUP'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(backup_columns, 1);

    pool.close().await;
    driver.close().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_container_mysql_reference_table_discovery() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let admin_url = format!("mysql://root@127.0.0.1:{}", port);
    let pool = wait_for_mysql_ready(&format!("{}/test", admin_url), 60).await;
    seed(&pool).await;

    let credentials = ServerCredentials::from_url(&admin_url).unwrap();
    let driver = create_driver(&credentials, &ConnectionConfig::default())
        .await
        .unwrap();

    let found = discovery::resolve(
        driver.as_ref(),
        &DiscoveryStrategy::ReferenceTable {
            table: "TEST_B_CHATING_PROCESS".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(found, vec!["shop_b"]);

    let missing = discovery::resolve_with_fallback(
        driver.as_ref(),
        &DiscoveryStrategy::ReferenceTable {
            table: "no_such_table".into(),
        },
        Some(&DiscoveryStrategy::All),
    )
    .await
    .unwrap();
    assert!(missing.used_fallback);
    assert_eq!(missing.databases, vec!["shop_a", "shop_b"]);

    pool.close().await;
    driver.close().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_container_mysql_unknown_database_is_classified() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let admin_url = format!("mysql://root@127.0.0.1:{}", port);
    let pool = wait_for_mysql_ready(&format!("{}/test", admin_url), 60).await;
    pool.close().await;

    let credentials = ServerCredentials::from_url(&admin_url).unwrap();
    let driver = create_driver(&credentials, &ConnectionConfig::default())
        .await
        .unwrap();

    let err = driver.open("does_not_exist").await.err().unwrap();
    assert_eq!(err.category(), "connection:database-not-found");

    driver.close().await;
}
