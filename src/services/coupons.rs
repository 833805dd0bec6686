use crate::{
    entities::{
        coupon::{self, DiscountType},
        coupon_usage, Coupon, CouponModel, CouponUsage,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Successful redemption: the discount computed and the coupon it came
/// from.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedCoupon {
    pub discount_amount: i64,
    pub coupon: CouponModel,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 3, max = 40))]
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub max_discount: Option<i64>,
    pub min_order_amount: Option<i64>,
    pub store_id: Option<Uuid>,
    /// 0 = unlimited
    #[serde(default)]
    pub usage_limit: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Coupon engine. `validate` is read-only; `apply` records the
/// redemption. The one-redemption-per-user rule is closed by the
/// (coupon_id, user_id) uniqueness constraint, not by application
/// locking: a constraint violation on the usage insert surfaces as
/// `CouponAlreadyUsed`.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Checks a code against window, store scope, usage limit and
    /// minimum order amount. Returns the coupon so callers can quote
    /// the discount without redeeming.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_amount: i64,
        store_id: Option<Uuid>,
    ) -> Result<CouponModel, ServiceError> {
        let coupon = Self::find_by_code(&*self.db, code).await?;
        Self::check(&coupon, order_amount, store_id, Utc::now())?;
        Ok(coupon)
    }

    /// Redeems a code for a user: inserts the usage row and increments
    /// `used_count` in one transaction.
    #[instrument(skip(self))]
    pub async fn apply(
        &self,
        user_id: Uuid,
        code: &str,
        order_amount: i64,
    ) -> Result<AppliedCoupon, ServiceError> {
        let txn = self.db.begin().await?;
        let applied = Self::apply_on(&txn, user_id, code, order_amount).await?;
        txn.commit().await?;
        Ok(applied)
    }

    /// Redemption on the caller's connection, so checkout can make the
    /// coupon usage atomic with the orders it discounts.
    pub async fn apply_on<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        code: &str,
        order_amount: i64,
    ) -> Result<AppliedCoupon, ServiceError> {
        let coupon = Self::find_by_code(conn, code).await?;
        Self::check(&coupon, order_amount, None, Utc::now())?;

        let existing = CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .one(conn)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon '{}' already used by this user",
                coupon.code
            )));
        }

        let usage = coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        };
        if let Err(err) = usage.insert(conn).await {
            // Two concurrent redemptions race past the pre-check; the
            // constraint decides the loser.
            return match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServiceError::Conflict(format!(
                    "Coupon '{}' already used by this user",
                    coupon.code
                ))),
                _ => Err(err.into()),
            };
        }

        Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon.id))
            .exec(conn)
            .await?;

        let discount_amount = Self::discount_for(&coupon, order_amount);
        info!(code = %coupon.code, %user_id, discount_amount, "applied coupon");
        Ok(AppliedCoupon {
            discount_amount,
            coupon,
        })
    }

    /// Discount a coupon yields on an order amount. Percentage floors
    /// and honors `max_discount`; fixed can never exceed the amount.
    pub fn discount_for(coupon: &CouponModel, order_amount: i64) -> i64 {
        if order_amount <= 0 {
            return 0;
        }
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                let raw = (Decimal::from(order_amount) * coupon.value / Decimal::from(100))
                    .floor()
                    .to_i64()
                    .unwrap_or(0);
                match coupon.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            DiscountType::Fixed => coupon.value.to_i64().unwrap_or(0),
        };
        discount.clamp(0, order_amount)
    }

    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        input.validate()?;
        if input.value <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "coupon value must be positive".into(),
            ));
        }

        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.trim().to_uppercase()),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            max_discount: Set(input.max_discount),
            min_order_amount: Set(input.min_order_amount),
            store_id: Set(input.store_id),
            usage_limit: Set(input.usage_limit.max(0)),
            used_count: Set(0),
            starts_at: Set(input.starts_at),
            expires_at: Set(input.expires_at),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        match coupon.insert(&*self.db).await {
            Ok(model) => Ok(model),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServiceError::Conflict(
                    "a coupon with this code already exists".into(),
                )),
                _ => Err(err.into()),
            },
        }
    }

    async fn find_by_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<CouponModel, ServiceError> {
        Coupon::find()
            .filter(coupon::Column::Code.eq(code.trim().to_uppercase()))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon '{}' not found", code)))
    }

    fn check(
        coupon: &CouponModel,
        order_amount: i64,
        store_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if !coupon.is_active {
            return Err(ServiceError::Validation(format!(
                "Coupon '{}' is not active",
                coupon.code
            )));
        }
        if let (Some(scope), Some(supplied)) = (coupon.store_id, store_id) {
            if scope != supplied {
                return Err(ServiceError::Validation(format!(
                    "Coupon '{}' is not valid for this store",
                    coupon.code
                )));
            }
        }
        if let Some(starts_at) = coupon.starts_at {
            if now < starts_at {
                return Err(ServiceError::Validation(format!(
                    "Coupon '{}' is not yet valid",
                    coupon.code
                )));
            }
        }
        if let Some(expires_at) = coupon.expires_at {
            if now > expires_at {
                return Err(ServiceError::Validation(format!(
                    "Coupon '{}' has expired",
                    coupon.code
                )));
            }
        }
        if coupon.usage_limit > 0 && coupon.used_count >= coupon.usage_limit {
            return Err(ServiceError::Validation(format!(
                "Coupon '{}' has been fully redeemed",
                coupon.code
            )));
        }
        if let Some(min) = coupon.min_order_amount {
            if order_amount < min {
                return Err(ServiceError::Validation(format!(
                    "Order amount is below the minimum of {} for coupon '{}'",
                    min, coupon.code
                )));
            }
        }
        Ok(())
    }
}
