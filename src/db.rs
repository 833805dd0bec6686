use crate::config::AppConfig;
use crate::entities::{coupon_usage, inventory_level};
use crate::errors::ServiceError;
use sea_orm::{
    sea_query::Index, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    debug!("connecting to database");
    Ok(Database::connect(opt).await?)
}

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection_from_app_config(
    config: &AppConfig,
) -> Result<DbPool, ServiceError> {
    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(config.db_connect_timeout_secs))
        .sqlx_logging(!config.is_production());

    info!(
        max_connections = config.db_max_connections,
        "connecting to database"
    );
    Ok(Database::connect(opt).await?)
}

/// Creates any missing tables and indexes from the entity definitions.
/// Used on SQLite/development runs and by the test harness; production
/// schemas are managed by external migrations.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    use crate::entities::{
        CommissionRecord, CommissionRule, Coupon, CouponUsage, EscrowLedger, InventoryLevel,
        Order, OrderItem, OutboxEvent, Product, ProductVariant, Vendor,
    };

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create_table {
        ($entity:expr) => {{
            let mut stmt = schema.create_table_from_entity($entity);
            stmt.if_not_exists();
            db.execute(backend.build(&stmt)).await?;
        }};
    }

    create_table!(Vendor);
    create_table!(Product);
    create_table!(ProductVariant);
    create_table!(InventoryLevel);
    create_table!(Order);
    create_table!(OrderItem);
    create_table!(EscrowLedger);
    create_table!(CommissionRule);
    create_table!(CommissionRecord);
    create_table!(Coupon);
    create_table!(CouponUsage);
    create_table!(OutboxEvent);

    // Constraints the entity derive cannot express. The coupon-usage
    // uniqueness is load-bearing: it closes the double-redemption race.
    let coupon_usage_unique = Index::create()
        .name("ux_coupon_usages_coupon_user")
        .table(CouponUsage)
        .col(coupon_usage::Column::CouponId)
        .col(coupon_usage::Column::UserId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&coupon_usage_unique)).await?;

    let inventory_unique = Index::create()
        .name("ux_inventory_levels_product_variant")
        .table(InventoryLevel)
        .col(inventory_level::Column::ProductId)
        .col(inventory_level::Column::VariantId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&inventory_unique)).await?;

    debug!("schema ensured");
    Ok(())
}
