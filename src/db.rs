use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema,
};
use tracing::info;

use crate::config::AppConfig;
use crate::entities::{contract, order, provider_mp_credentials, quotation, service};

pub type DbPool = DatabaseConnection;

/// Establishes a database connection pool from application configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("database connection established");
    Ok(db)
}

/// Creates any missing tables for the crate's entities.
///
/// The unique key on `contracts.order_id` is part of the entity definition and
/// is created here as well; reconciliation correctness depends on it.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut stmts = vec![
        schema.create_table_from_entity(service::Entity),
        schema.create_table_from_entity(quotation::Entity),
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(contract::Entity),
        schema.create_table_from_entity(provider_mp_credentials::Entity),
    ];

    for stmt in &mut stmts {
        stmt.if_not_exists();
        db.execute(backend.build(&*stmt)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // SQLite caps decimal precision at 16; the money columns must stay within
    // that or schema creation aborts on sqlite-backed deployments.
    #[tokio::test]
    async fn schema_creation_succeeds_on_sqlite() {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        create_schema(&db).await.expect("create schema");
        // Idempotent on a second run.
        create_schema(&db).await.expect("create schema twice");
    }
}
