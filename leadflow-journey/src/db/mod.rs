//! Database access for leadflow-journey
//!
//! SQLite mirror of the four lead sources plus the `settings` table. All
//! timestamps are stored as TEXT and parsed leniently on read.

pub mod compliance;
pub mod contacts;
pub mod forms;
pub mod meetings;
pub mod settings;

use leadflow_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the database file and make sure all tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema.
///
/// One connection only: every pooled connection to `sqlite::memory:` would
/// otherwise see its own empty database.
pub async fn init_in_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all leadflow tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            nome TEXT,
            email TEXT,
            telefone TEXT,
            telefone_normalizado TEXT,
            cpf TEXT,
            cpf_normalizado TEXT,
            origem TEXT,
            created_at TEXT,
            updated_at TEXT,
            cpf_status TEXT,
            cpf_label TEXT,
            cpf_checked_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_submissions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            form_id TEXT,
            contact_name TEXT,
            contact_email TEXT,
            contact_phone TEXT,
            contact_cpf TEXT,
            status TEXT,
            passed TEXT,
            total_score REAL,
            answers TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compliance_checks (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            cpf TEXT,
            cpf_encrypted TEXT,
            person_name TEXT,
            person_phone TEXT,
            status TEXT,
            aprovado TEXT,
            risk_score REAL,
            lawsuits TEXT,
            consulted_at TEXT,
            payload TEXT,
            processed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            contact_name TEXT,
            contact_phone TEXT,
            contact_cpf TEXT,
            status TEXT,
            compareceu TEXT,
            data TEXT,
            hora TEXT,
            local TEXT,
            tipo TEXT,
            link TEXT,
            consultor_nome TEXT,
            consultor_email TEXT,
            resultado_reuniao TEXT,
            motivo_recusa TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts (telefone_normalizado)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_cpf ON contacts (cpf_normalizado)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_checks_pending ON compliance_checks (processed_at, status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (settings, contacts, form_submissions, compliance_checks, meetings)");

    Ok(())
}

/// Store a timestamp the way every table here expects it
pub(crate) fn ts(value: &chrono::DateTime<chrono::Utc>) -> String {
    value.to_rfc3339()
}
