//! End-to-end runs between SQLite database files.

use std::path::Path;

use dbmigrate::{Config, Orchestrator, RunStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};
use tempfile::TempDir;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE "user" (
        id INTEGER PRIMARY KEY,
        username VARCHAR(80) NOT NULL,
        is_admin BOOLEAN NOT NULL,
        created_at DATETIME,
        avatar BLOB
    )"#,
    r#"CREATE TABLE chapter (
        id INTEGER PRIMARY KEY,
        title VARCHAR(120) NOT NULL,
        user_id INTEGER NOT NULL REFERENCES "user"(id)
    )"#,
    r#"CREATE TABLE question (
        id INTEGER PRIMARY KEY,
        body TEXT NOT NULL,
        score REAL,
        chapter_id INTEGER NOT NULL REFERENCES chapter(id),
        parent_id INTEGER REFERENCES question(id)
    )"#,
];

async fn open(path: &Path) -> SqliteConnection {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap()
}

async fn create_schema(path: &Path) -> SqliteConnection {
    let mut conn = open(path).await;
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&mut conn).await.unwrap();
    }
    conn
}

async fn seed_source(path: &Path) {
    let mut conn = create_schema(path).await;
    let inserts = [
        r#"INSERT INTO "user" VALUES (1, 'ada', 1, '2024-03-01 10:15:00', X'CAFE')"#,
        r#"INSERT INTO "user" VALUES (2, 'bob', 0, NULL, NULL)"#,
        "INSERT INTO chapter VALUES (1, 'Basics', 1)",
        "INSERT INTO chapter VALUES (2, 'Advanced', 2)",
        "INSERT INTO question VALUES (1, 'What is a row?', 2.5, 1, NULL)",
        "INSERT INTO question VALUES (2, 'Follow-up', NULL, 1, 1)",
        "INSERT INTO question VALUES (3, 'Joins', 4.0, 2, NULL)",
    ];
    for sql in inserts {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

fn config(dir: &TempDir, extra: &str) -> Config {
    let yaml = format!(
        "source:\n  type: sqlite\n  path: {}\ntarget:\n  type: sqlite\n  path: {}\n{}",
        dir.path().join("source.db").display(),
        dir.path().join("target.db").display(),
        extra
    );
    Config::from_yaml(&yaml).unwrap()
}

async fn setup() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    seed_source(&dir.path().join("source.db")).await;
    create_schema(&dir.path().join("target.db"))
        .await
        .close()
        .await
        .unwrap();
    dir
}

#[tokio::test]
async fn test_full_copy_between_files() {
    let dir = setup().await;

    let orchestrator = Orchestrator::new(config(&dir, "migration:\n  batch_size: 2\n"))
        .await
        .unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.plan.as_ref().unwrap().tables,
        vec!["user", "chapter", "question"]
    );
    assert_eq!(report.rows_transferred, 7);

    let mut target = open(&dir.path().join("target.db")).await;

    let users = sqlx::query(r#"SELECT id, username, is_admin, created_at, avatar FROM "user" ORDER BY id"#)
        .fetch_all(&mut target)
        .await
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].get::<String, _>("username"), "ada");
    assert_eq!(users[0].get::<i64, _>("is_admin"), 1);
    assert_eq!(
        users[0].get::<String, _>("created_at"),
        "2024-03-01 10:15:00"
    );
    assert_eq!(users[0].get::<Vec<u8>, _>("avatar"), vec![0xCA, 0xFE]);
    assert_eq!(users[1].get::<Option<String>, _>("created_at"), None);
    assert_eq!(users[1].get::<Option<Vec<u8>>, _>("avatar"), None);

    let questions = sqlx::query("SELECT id, score, parent_id FROM question ORDER BY id")
        .fetch_all(&mut target)
        .await
        .unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[0].get::<Option<f64>, _>("score"), Some(2.5));
    assert_eq!(questions[1].get::<Option<f64>, _>("score"), None);
    assert_eq!(questions[1].get::<Option<i64>, _>("parent_id"), Some(1));
}

#[tokio::test]
async fn test_rerun_replaces_destination_rows() {
    let dir = setup().await;

    for _ in 0..2 {
        let report = Orchestrator::new(config(&dir, ""))
            .await
            .unwrap()
            .run()
            .await;
        assert!(report.is_success(), "{:?}", report.status);
    }

    let mut target = open(&dir.path().join("target.db")).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM question")
        .fetch_one(&mut target)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_validate_after_run() {
    let dir = setup().await;
    let report = Orchestrator::new(config(&dir, ""))
        .await
        .unwrap()
        .run()
        .await;
    assert!(report.is_success());

    let orchestrator = Orchestrator::new(config(&dir, "")).await.unwrap();
    let validation = orchestrator.validate().await.unwrap();
    orchestrator.close().await;

    assert_eq!(validation.len(), 3);
    assert!(validation.iter().all(|v| v.matches));
}

#[tokio::test]
async fn test_missing_destination_table_fails_that_table() {
    let dir = setup().await;
    let mut target = open(&dir.path().join("target.db")).await;
    sqlx::query("DROP TABLE question")
        .execute(&mut target)
        .await
        .unwrap();
    target.close().await.unwrap();

    let report = Orchestrator::new(config(&dir, "migration:\n  clear_target: false\n"))
        .await
        .unwrap()
        .run()
        .await;

    match &report.status {
        RunStatus::Aborted { table, .. } => assert_eq!(table.as_deref(), Some("question")),
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].is_success());
    assert!(report.results[1].is_success());
    assert!(!report.results[2].is_success());
}

#[tokio::test]
async fn test_stored_values_copied_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let ddl = "CREATE TABLE event (
        id INTEGER PRIMARY KEY,
        created_at DATETIME,
        flag BOOLEAN,
        token UUID
    )";

    let mut source = open(&dir.path().join("source.db")).await;
    sqlx::query(ddl).execute(&mut source).await.unwrap();
    for sql in [
        "INSERT INTO event VALUES (1, '2024-03-01 10:15:00.000000', 2, 'ABCDEFAB-1234-5678-9ABC-DEF012345678')",
        "INSERT INTO event VALUES (2, '2024-03-01T10:15:00Z', 1, NULL)",
        "INSERT INTO event VALUES (3, '2024-03-01T10:15:00', 0, NULL)",
    ] {
        sqlx::query(sql).execute(&mut source).await.unwrap();
    }
    source.close().await.unwrap();

    let mut target = open(&dir.path().join("target.db")).await;
    sqlx::query(ddl).execute(&mut target).await.unwrap();
    target.close().await.unwrap();

    let report = Orchestrator::new(config(&dir, ""))
        .await
        .unwrap()
        .run()
        .await;
    assert!(report.is_success(), "{:?}", report.status);

    let mut target = open(&dir.path().join("target.db")).await;
    let rows = sqlx::query("SELECT created_at, flag, token FROM event ORDER BY id")
        .fetch_all(&mut target)
        .await
        .unwrap();

    let copied: Vec<(String, i64, Option<String>)> = rows
        .iter()
        .map(|r| {
            (
                r.get::<String, _>("created_at"),
                r.get::<i64, _>("flag"),
                r.get::<Option<String>, _>("token"),
            )
        })
        .collect();
    assert_eq!(
        copied,
        vec![
            (
                "2024-03-01 10:15:00.000000".to_string(),
                2,
                Some("ABCDEFAB-1234-5678-9ABC-DEF012345678".to_string())
            ),
            ("2024-03-01T10:15:00Z".to_string(), 1, None),
            ("2024-03-01T10:15:00".to_string(), 0, None),
        ]
    );
}
