use crate::{
    entities::{inventory_level, InventoryLevel, InventoryLevelModel},
    errors::ServiceError,
    gateways::InventoryProvider,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Database-backed inventory levels. Checkout decrements stock through
/// [`InventoryService::decrement_on`] so the decrement joins the order
/// transaction; quotes and cart checks read through the
/// [`InventoryProvider`] trait.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn available(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<i32, ServiceError> {
        Self::available_on(&*self.db, product_id, variant_id).await
    }

    /// Available quantity on any connection (pool or open transaction).
    /// A missing level row reads as zero stock.
    pub async fn available_on<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<i32, ServiceError> {
        let level = Self::find_level(conn, product_id, variant_id).await?;
        Ok(level.map(|l| l.available).unwrap_or(0))
    }

    /// Atomically takes `quantity` units. The guard `available >=
    /// quantity` rides on the UPDATE itself, so two concurrent checkouts
    /// can never both take the last unit; zero affected rows means the
    /// stock moved under us.
    #[instrument(skip(conn))]
    pub async fn decrement_on<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let mut update = InventoryLevel::update_many()
            .col_expr(
                inventory_level::Column::Available,
                Expr::col(inventory_level::Column::Available).sub(quantity),
            )
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .filter(inventory_level::Column::Available.gte(quantity));
        update = match variant_id {
            Some(v) => update.filter(inventory_level::Column::VariantId.eq(v)),
            None => update.filter(inventory_level::Column::VariantId.is_null()),
        };

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "product {} has fewer than {} units available",
                product_id, quantity
            )));
        }
        Ok(())
    }

    /// Upsert the level row for a (product, variant) pair.
    pub async fn set_available(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<InventoryLevelModel, ServiceError> {
        match Self::find_level(&*self.db, product_id, variant_id).await? {
            Some(existing) => {
                let mut active: inventory_level::ActiveModel = existing.into();
                active.available = Set(quantity);
                active.updated_at = Set(Utc::now());
                Ok(active.update(&*self.db).await?)
            }
            None => {
                let level = inventory_level::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id),
                    variant_id: Set(variant_id),
                    available: Set(quantity),
                    updated_at: Set(Utc::now()),
                };
                Ok(level.insert(&*self.db).await?)
            }
        }
    }

    async fn find_level<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<InventoryLevelModel>, ServiceError> {
        let mut query =
            InventoryLevel::find().filter(inventory_level::Column::ProductId.eq(product_id));
        query = match variant_id {
            Some(v) => query.filter(inventory_level::Column::VariantId.eq(v)),
            None => query.filter(inventory_level::Column::VariantId.is_null()),
        };
        Ok(query.one(conn).await?)
    }
}

#[async_trait]
impl InventoryProvider for InventoryService {
    async fn available_quantity(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<i32, ServiceError> {
        self.available(product_id, variant_id).await
    }
}
