use crate::{
    entities::{
        commission_rule::{self, CommissionScope},
        CommissionRule, CommissionRuleModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Result of resolving the platform commission for a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionBreakdown {
    pub commission_amount: i64,
    pub net_amount: i64,
    pub rule_applied: Option<CommissionRuleModel>,
}

/// `floor(amount * percentage) + fixed`, clamped to `[0, amount]` so
/// the platform can never take more than the transaction itself.
pub fn compute_commission(amount: i64, percentage: Decimal, fixed_amount: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let cut = (Decimal::from(amount) * percentage)
        .floor()
        .to_i64()
        .unwrap_or(0);
    (cut + fixed_amount).clamp(0, amount)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleInput {
    pub scope: CommissionScope,
    pub store_id: Option<Uuid>,
    pub category: Option<String>,
    /// Fraction of the amount (0.05 = 5%)
    pub percentage: Decimal,
    #[serde(default)]
    pub fixed_amount: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Commission resolver. Rule lookup walks Store > Category > Global;
/// within a tier the newest active rule inside its date window wins.
/// The computation itself is pure ([`compute_commission`]); persisting
/// the audit record is the caller's job.
#[derive(Clone)]
pub struct CommissionService {
    db: Arc<DatabaseConnection>,
}

impl CommissionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn resolve(
        &self,
        store_id: Option<Uuid>,
        category: Option<&str>,
        amount: i64,
    ) -> Result<CommissionBreakdown, ServiceError> {
        Self::resolve_on(&*self.db, store_id, category, amount).await
    }

    /// Resolve on any connection so checkout can run it inside its
    /// transaction.
    pub async fn resolve_on<C: ConnectionTrait>(
        conn: &C,
        store_id: Option<Uuid>,
        category: Option<&str>,
        amount: i64,
    ) -> Result<CommissionBreakdown, ServiceError> {
        let now = Utc::now();

        let mut rule = None;
        if let Some(store_id) = store_id {
            rule = Self::find_rule(conn, CommissionScope::Store, now, |q| {
                q.filter(commission_rule::Column::StoreId.eq(store_id))
            })
            .await?;
        }
        if rule.is_none() {
            if let Some(category) = category {
                rule = Self::find_rule(conn, CommissionScope::Category, now, |q| {
                    q.filter(commission_rule::Column::Category.eq(category))
                })
                .await?;
            }
        }
        if rule.is_none() {
            rule = Self::find_rule(conn, CommissionScope::Global, now, |q| q).await?;
        }

        let commission_amount = match &rule {
            Some(rule) => compute_commission(amount, rule.percentage, rule.fixed_amount),
            None => 0,
        };

        Ok(CommissionBreakdown {
            commission_amount,
            net_amount: amount - commission_amount,
            rule_applied: rule,
        })
    }

    async fn find_rule<C: ConnectionTrait>(
        conn: &C,
        scope: CommissionScope,
        now: DateTime<Utc>,
        narrow: impl FnOnce(sea_orm::Select<CommissionRule>) -> sea_orm::Select<CommissionRule>,
    ) -> Result<Option<CommissionRuleModel>, ServiceError> {
        let query = CommissionRule::find()
            .filter(commission_rule::Column::Scope.eq(scope))
            .filter(commission_rule::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(commission_rule::Column::StartsAt.is_null())
                    .add(commission_rule::Column::StartsAt.lte(now)),
            )
            .filter(
                Condition::any()
                    .add(commission_rule::Column::EndsAt.is_null())
                    .add(commission_rule::Column::EndsAt.gte(now)),
            )
            .order_by_desc(commission_rule::Column::CreatedAt);

        Ok(narrow(query).one(conn).await?)
    }

    pub async fn create_rule(
        &self,
        input: CreateRuleInput,
    ) -> Result<CommissionRuleModel, ServiceError> {
        input.validate()?;
        if input.percentage < Decimal::ZERO || input.percentage > Decimal::ONE {
            return Err(ServiceError::Validation(
                "percentage must be a fraction between 0 and 1".into(),
            ));
        }
        match input.scope {
            CommissionScope::Store if input.store_id.is_none() => {
                return Err(ServiceError::Validation(
                    "store-scoped rules require a store_id".into(),
                ));
            }
            CommissionScope::Category if input.category.is_none() => {
                return Err(ServiceError::Validation(
                    "category-scoped rules require a category".into(),
                ));
            }
            _ => {}
        }

        let rule = commission_rule::ActiveModel {
            id: Set(Uuid::new_v4()),
            scope: Set(input.scope),
            store_id: Set(input.store_id),
            category: Set(input.category),
            percentage: Set(input.percentage),
            fixed_amount: Set(input.fixed_amount),
            starts_at: Set(input.starts_at),
            ends_at: Set(input.ends_at),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        };
        Ok(rule.insert(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn commission_is_floor_of_percentage_plus_fixed() {
        // 5% of 10_099 = 504.95, floors to 504; plus 100 fixed
        assert_eq!(compute_commission(10_099, dec!(0.05), 100), 604);
    }

    #[test]
    fn commission_never_exceeds_amount() {
        assert_eq!(compute_commission(100, dec!(0.50), 1_000), 100);
        assert_eq!(compute_commission(100, dec!(2.0), 0), 100);
    }

    #[test]
    fn commission_never_negative() {
        assert_eq!(compute_commission(100, dec!(0.0), -50), 0);
        assert_eq!(compute_commission(0, dec!(0.10), 50), 0);
        assert_eq!(compute_commission(-500, dec!(0.10), 0), 0);
    }

    #[test]
    fn zero_rule_zero_commission() {
        assert_eq!(compute_commission(10_000, Decimal::ZERO, 0), 0);
    }
}
