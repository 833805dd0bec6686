use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Escrow ledger row, 1:1 with an order. Funds collected from the buyer
/// are held here until released to the sellers or refunded.
///
/// Invariant on every mutation: `amount_released + amount_refunded <=
/// amount_held`. Status is terminal once it leaves `Held`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "escrow_ledgers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    /// Users credited on release (the vendor's owner)
    #[sea_orm(column_type = "Json")]
    pub seller_ids: Json,
    pub amount_held: i64,
    pub amount_released: i64,
    pub amount_refunded: i64,
    pub status: EscrowStatus,
    #[sea_orm(nullable)]
    pub dispute_id: Option<Uuid>,
    /// Reason supplied with the terminal release/refund call
    #[sea_orm(nullable)]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    #[sea_orm(string_value = "held")]
    Held,
    #[sea_orm(string_value = "released")]
    Released,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}
