// Migration Runner
//
// Each migration is applied in its own transaction and records its version in
// `schema_version` as its last statement.

use crate::error::map_sqlx_error;
use sqlx::SqlitePool;
use strata_core::error::Result;
use tracing::info;

/// (version, description, script) in apply order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "catalog schema",
    include_str!("../migrations/001_catalog.sql"),
)];

async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;
    if tracked == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded schema version
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let from = current_version(pool).await?;
    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|(version, _, _)| *version > from)
        .collect();

    if pending.is_empty() {
        info!(version = from, "Schema up to date");
        return Ok(());
    }

    for (version, description, script) in pending {
        info!(version = version, "Applying migration: {}", description);
        apply_migration(pool, script).await?;
    }
    info!(from = from, to = current_version(pool).await?, "Migrations applied");
    Ok(())
}

/// Statements of a script with `--` comment lines removed
fn statements(script: &str) -> impl Iterator<Item = String> + '_ {
    script
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
}

async fn apply_migration(pool: &SqlitePool, script: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    for statement in statements(script) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    tx.commit().await.map_err(map_sqlx_error)
}
