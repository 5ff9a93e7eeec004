//! Database configuration module for `SalesBoard`.
//!
//! Handles `SQLite` connection setup and table creation. Tables are generated
//! from the entity definitions with `Schema::create_table_from_entity`, so the
//! schema always matches the Rust models and no hand-written SQL is needed.

use crate::entities::{Agent, CategoryTarget, Sale, SystemState, TargetHistory, Team};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Default database location when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/sales_board.sqlite?mode=rwc";

/// Opens a connection to `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(path) = sqlite_file_path(database_url) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let db = Database::connect(database_url).await?;
    info!("Connected to database");
    Ok(db)
}

/// File path part of a `sqlite://` URL, if it names a file.
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty() && !path.starts_with(":memory:")).then_some(path)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every table the board uses, skipping ones that already exist.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Team).await?;
    create_table(db, &schema, Agent).await?;
    create_table(db, &schema, Sale).await?;
    create_table(db, &schema, CategoryTarget).await?;
    create_table(db, &schema, TargetHistory).await?;
    create_table(db, &schema, SystemState).await?;

    Ok(())
}
