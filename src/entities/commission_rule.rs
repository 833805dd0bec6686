use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform fee rule. Resolution priority is Store > Category > Global;
/// within a tier the most recently created active rule wins.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commission_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub scope: CommissionScope,
    #[sea_orm(nullable)]
    pub store_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub category: Option<String>,
    /// Fraction of the transaction amount (0.05 = 5%)
    #[sea_orm(column_type = "Decimal(Some((10, 6)))")]
    pub percentage: Decimal,
    /// Flat fee added on top of the percentage cut, minor units
    pub fixed_amount: i64,
    #[sea_orm(nullable)]
    pub starts_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CommissionScope {
    #[sea_orm(string_value = "global")]
    Global,
    #[sea_orm(string_value = "category")]
    Category,
    #[sea_orm(string_value = "store")]
    Store,
}
