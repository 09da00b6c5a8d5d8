use crate::config::AppConfig;
use crate::entities;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using application configuration.
pub async fn connect(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("database connection established");
    Ok(db)
}

/// Creates all storefront tables if they do not exist.
///
/// Schema is derived directly from the entity definitions, so tests against
/// in-memory SQLite and development bootstraps share one source of truth.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    async fn create<E: EntityTrait>(
        db: &DatabaseConnection,
        schema: &Schema,
        entity: E,
    ) -> Result<(), DbErr> {
        let backend = db.get_database_backend();
        let mut stmt = schema.create_table_from_entity(entity);
        stmt.if_not_exists();
        db.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    create(db, &schema, entities::category::Entity).await?;
    create(db, &schema, entities::product::Entity).await?;
    create(db, &schema, entities::product_variant::Entity).await?;
    create(db, &schema, entities::offer::Entity).await?;
    create(db, &schema, entities::cart::Entity).await?;
    create(db, &schema, entities::cart_item::Entity).await?;
    create(db, &schema, entities::coupon::Entity).await?;
    create(db, &schema, entities::order::Entity).await?;
    create(db, &schema, entities::order_item::Entity).await?;
    create(db, &schema, entities::order_address::Entity).await?;
    create(db, &schema, entities::payment::Entity).await?;
    create(db, &schema, entities::wallet::Entity).await?;
    create(db, &schema, entities::wallet_transaction::Entity).await?;
    create(db, &schema, entities::return_request::Entity).await?;

    info!("database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The SQLite backend rejects decimal precision above 16, so every money
    // column must stay within that bound for this to succeed.
    #[tokio::test]
    async fn schema_builds_on_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&db).await.unwrap();
        // if_not_exists keeps a second run harmless
        create_schema(&db).await.unwrap();
    }
}
