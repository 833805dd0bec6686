use crate::{
    config::AppConfig,
    entities::{
        commission_record,
        order::{self, OrderStatus, PaymentStatus},
        order_item, vendor, Order, Product, ProductVariant, Vendor, VendorModel,
    },
    errors::ServiceError,
    events::{outbox, Event},
    gateways::{InitializePayment, PaymentGateway, PaymentInitiation, WalletLedger},
    services::{
        cart::{self, Cart, CartService, VendorGroup},
        commission::CommissionService,
        coupons::CouponService,
        escrow::EscrowService,
        inventory::InventoryService,
    },
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Address snapshot captured onto each order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Synchronous debit against the platform wallet
    Wallet,
    /// Hosted authorization through the external payment gateway
    Gateway,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: Address,
    #[validate]
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    /// Required for gateway payments
    #[validate(email)]
    pub payer_email: Option<String>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

/// Per-order slice of the checkout result (the produced interface the
/// web layer renders).
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub order_number: String,
    pub subtotal: i64,
    pub shipping: i64,
    pub tax: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub orders: Vec<OrderSummary>,
    pub payment: Option<PaymentInitiation>,
}

/// Checkout orchestrator. Turns the user's cart into one order per
/// vendor group inside a single storage transaction: order rows, item
/// snapshots, inventory decrements, commission records, escrow holds
/// and outbox events all commit or none do.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    cart: Arc<CartService>,
    wallet: Arc<dyn WalletLedger>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cart: Arc<CartService>,
        wallet: Arc<dyn WalletLedger>,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            cart,
            wallet,
            gateway,
            config,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        request.validate()?;
        let payer_email = match request.payment_method {
            PaymentMethod::Gateway => request
                .payer_email
                .clone()
                .ok_or_else(|| {
                    ServiceError::Validation("payer_email is required for gateway payments".into())
                })?,
            PaymentMethod::Wallet => request.payer_email.clone().unwrap_or_default(),
        };

        let cart = self.cart.get_cart(user_id);
        if cart.is_empty() {
            return Err(ServiceError::Validation("Cart is empty".into()));
        }

        // Everything is re-checked against live data before any
        // mutation; all failures are reported at once.
        let vendors = self.validate_for_checkout(&cart).await?;

        let pricing = &self.config.checkout;
        let (order_status, payment_status) = match request.payment_method {
            PaymentMethod::Wallet => (OrderStatus::Confirmed, PaymentStatus::Paid),
            PaymentMethod::Gateway => (OrderStatus::Pending, PaymentStatus::Pending),
        };
        let payment_reference = match request.payment_method {
            PaymentMethod::Gateway => Some(format!("PAY-{}", Uuid::new_v4().simple())),
            PaymentMethod::Wallet => None,
        };

        let shipping_json = serde_json::to_value(&request.shipping_address)
            .map_err(|e| ServiceError::Other(anyhow::Error::from(e)))?;
        let billing_json = match &request.billing_address {
            Some(addr) => Some(
                serde_json::to_value(addr)
                    .map_err(|e| ServiceError::Other(anyhow::Error::from(e)))?,
            ),
            None => None,
        };

        let txn = self.db.begin().await?;

        // Coupon redemption joins the checkout transaction; if any
        // vendor group fails below, the usage row rolls back with it.
        let discount_total = match &request.coupon_code {
            Some(code) => {
                CouponService::apply_on(&txn, user_id, code, cart.totals.subtotal)
                    .await?
                    .discount_amount
            }
            None => 0,
        };
        let shares = prorate_discount(discount_total, &cart.vendor_groups);

        let mut summaries = Vec::with_capacity(cart.vendor_groups.len());
        let mut order_ids = Vec::with_capacity(cart.vendor_groups.len());

        for (group, share) in cart.vendor_groups.iter().zip(shares) {
            let vendor = vendors
                .get(&group.vendor_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Vendor {} not found", group.vendor_id))
                })?;

            let shipping = cart::shipping_fee(group.subtotal, pricing);
            let tax = cart::tax_amount(group.subtotal, pricing);
            let gross = group.subtotal + shipping + tax;
            let discount = share.min(gross);
            let total = gross - discount;
            if total < 0 {
                return Err(ServiceError::InvariantViolation(format!(
                    "order total for vendor {} would be negative",
                    group.vendor_id
                )));
            }

            let order_id = Uuid::new_v4();
            let order_number = self.generate_order_number(&txn).await?;

            order::ActiveModel {
                id: Set(order_id),
                order_number: Set(order_number.clone()),
                user_id: Set(user_id),
                vendor_id: Set(group.vendor_id),
                status: Set(order_status),
                subtotal: Set(group.subtotal),
                shipping: Set(shipping),
                tax: Set(tax),
                discount: Set(discount),
                total: Set(total),
                currency: Set(pricing.currency.clone()),
                payment_status: Set(payment_status),
                payment_method: Set(match request.payment_method {
                    PaymentMethod::Wallet => "wallet".to_string(),
                    PaymentMethod::Gateway => "gateway".to_string(),
                }),
                payment_reference: Set(payment_reference.clone()),
                shipping_address: Set(shipping_json.clone()),
                billing_address: Set(billing_json.clone()),
                notes: Set(request.notes.clone()),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await?;

            for item in cart.items.iter().filter(|i| i.vendor_id == group.vendor_id) {
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    variant_id: Set(item.variant_id),
                    name: Set(item.name.clone()),
                    unit_price: Set(item.unit_price),
                    quantity: Set(item.quantity),
                    line_total: Set(item.line_total),
                    created_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;

                InventoryService::decrement_on(&txn, item.product_id, item.variant_id, item.quantity)
                    .await?;
            }

            let commission =
                CommissionService::resolve_on(&txn, Some(group.vendor_id), None, group.subtotal)
                    .await?;
            commission_record::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                rule_id: Set(commission.rule_applied.as_ref().map(|r| r.id)),
                amount: Set(commission.commission_amount),
                net_amount: Set(commission.net_amount),
                created_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await?;

            EscrowService::create_held_on(&txn, order_id, user_id, &[vendor.owner_user_id], total)
                .await?;

            outbox::enqueue(
                &txn,
                "order",
                Some(order_id),
                &Event::OrderCreated {
                    order_id,
                    user_id,
                    vendor_id: group.vendor_id,
                    order_number: order_number.clone(),
                    total,
                },
            )
            .await?;

            order_ids.push(order_id);
            summaries.push(OrderSummary {
                order_id,
                vendor_id: group.vendor_id,
                order_number,
                subtotal: group.subtotal,
                shipping,
                tax,
                discount,
                total,
            });
        }

        let grand_total: i64 = summaries.iter().map(|s| s.total).sum();

        outbox::enqueue(
            &txn,
            "checkout",
            None,
            &Event::CheckoutCompleted {
                user_id,
                order_ids: order_ids.clone(),
                payment_reference: payment_reference.clone(),
                grand_total,
            },
        )
        .await?;

        // The wallet debit rides inside the transaction window: a
        // failed debit rolls everything back, a failed commit is
        // compensated with a credit. A fully-discounted checkout owes
        // nothing.
        let wallet_charge = request.payment_method == PaymentMethod::Wallet && grand_total > 0;
        if wallet_charge {
            self.wallet.debit(user_id, grand_total).await?;
        }
        if let Err(commit_err) = txn.commit().await {
            if wallet_charge {
                if let Err(credit_err) = self.wallet.credit(user_id, grand_total).await {
                    error!(
                        %user_id,
                        amount = grand_total,
                        "failed to compensate wallet debit after commit failure: {}",
                        credit_err
                    );
                }
            }
            return Err(commit_err.into());
        }

        // The checkout's work is durable from here on; the cart must
        // not be able to produce it again.
        self.cart.clear(user_id);
        info!(%user_id, orders = summaries.len(), grand_total, "checkout committed");

        let payment = match request.payment_method {
            PaymentMethod::Wallet => None,
            PaymentMethod::Gateway => {
                let reference = payment_reference.unwrap_or_default();
                let initiation = self
                    .gateway
                    .initialize_payment(InitializePayment {
                        amount: grand_total,
                        payer_email,
                        reference: reference.clone(),
                        callback_url: self.config.gateway.callback_url.clone(),
                        metadata: serde_json::json!({ "order_ids": order_ids.clone() }),
                    })
                    .await;

                match initiation {
                    Ok(init) => {
                        if init.reference != reference {
                            Order::update_many()
                                .set(order::ActiveModel {
                                    payment_reference: Set(Some(init.reference.clone())),
                                    updated_at: Set(Utc::now()),
                                    ..Default::default()
                                })
                                .filter(order::Column::Id.is_in(order_ids.clone()))
                                .exec(&*self.db)
                                .await?;
                        }
                        Some(init)
                    }
                    Err(e) => {
                        // Orders and escrow stay put for later manual
                        // verification; only the initialization failed.
                        warn!(%user_id, "payment initialization failed: {}", e);
                        return Err(ServiceError::ExternalService(format!(
                            "payment initialization failed: {}",
                            e
                        )));
                    }
                }
            }
        };

        Ok(CheckoutOutcome {
            orders: summaries,
            payment,
        })
    }

    /// Re-checks every cart line against the live catalog and stock,
    /// and every vendor group against the vendor registry. Returns the
    /// vendor map on success; all accumulated reasons otherwise.
    async fn validate_for_checkout(
        &self,
        cart_snapshot: &Cart,
    ) -> Result<HashMap<Uuid, VendorModel>, ServiceError> {
        let mut reasons = Vec::new();

        for item in &cart_snapshot.items {
            let product = Product::find_by_id(item.product_id).one(&*self.db).await?;
            let product = match product {
                Some(p) => p,
                None => {
                    reasons.push(format!("'{}' no longer exists", item.name));
                    continue;
                }
            };
            if !product.is_active {
                reasons.push(format!("'{}' is no longer available", product.name));
                continue;
            }

            let live_price = match item.variant_id {
                Some(variant_id) => match ProductVariant::find_by_id(variant_id)
                    .one(&*self.db)
                    .await?
                {
                    Some(v) => v.price,
                    None => {
                        reasons.push(format!("variant of '{}' no longer exists", product.name));
                        continue;
                    }
                },
                None => product.price,
            };
            if live_price != item.unit_price {
                reasons.push(format!(
                    "price of '{}' changed from {} to {}",
                    product.name, item.unit_price, live_price
                ));
            }

            let available =
                InventoryService::available_on(&*self.db, item.product_id, item.variant_id).await?;
            if available < item.quantity {
                reasons.push(format!(
                    "'{}': requested {}, only {} available",
                    product.name, item.quantity, available
                ));
            }
        }

        let vendor_ids: Vec<Uuid> = cart_snapshot
            .vendor_groups
            .iter()
            .map(|g| g.vendor_id)
            .collect();
        let vendors: HashMap<Uuid, VendorModel> = Vendor::find()
            .filter(vendor::Column::Id.is_in(vendor_ids.clone()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();
        for vendor_id in vendor_ids {
            match vendors.get(&vendor_id) {
                Some(v) if v.is_active => {}
                Some(v) => reasons.push(format!("vendor '{}' is not accepting orders", v.name)),
                None => reasons.push(format!("vendor {} no longer exists", vendor_id)),
            }
        }

        if reasons.is_empty() {
            Ok(vendors)
        } else {
            Err(ServiceError::CartValidationFailed(reasons))
        }
    }

    /// Timestamp-plus-suffix order numbers, re-rolled while a collision
    /// exists.
    async fn generate_order_number<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        let retries = self.config.checkout.order_number_retries.max(1);
        for _ in 0..retries {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(4)
                .map(char::from)
                .collect::<String>()
                .to_uppercase();
            let candidate = format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix);

            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(&candidate))
                .one(conn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Conflict(
            "could not allocate a unique order number".into(),
        ))
    }
}

/// Splits a cart-level discount across vendor groups by subtotal share.
/// Flooring remainders are assigned to the largest group (first among
/// ties), so shares always sum exactly to `discount`.
pub fn prorate_discount(discount: i64, groups: &[VendorGroup]) -> Vec<i64> {
    if discount <= 0 || groups.is_empty() {
        return vec![0; groups.len()];
    }
    let total: i64 = groups.iter().map(|g| g.subtotal).sum();
    if total <= 0 {
        return vec![0; groups.len()];
    }

    let mut shares: Vec<i64> = groups
        .iter()
        .map(|g| (i128::from(discount) * i128::from(g.subtotal) / i128::from(total)) as i64)
        .collect();

    let remainder = discount - shares.iter().sum::<i64>();
    if remainder > 0 {
        let idx = groups
            .iter()
            .enumerate()
            .max_by_key(|(i, g)| (g.subtotal, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        shares[idx] += remainder;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(subtotal: i64) -> VendorGroup {
        VendorGroup {
            vendor_id: Uuid::new_v4(),
            subtotal,
            item_count: 1,
            shipping: 0,
        }
    }

    #[test]
    fn prorated_shares_sum_to_discount() {
        let groups = vec![group(3_333), group(3_333), group(3_334)];
        let shares = prorate_discount(1_000, &groups);
        assert_eq!(shares.iter().sum::<i64>(), 1_000);
    }

    #[test]
    fn single_group_takes_whole_discount() {
        let groups = vec![group(10_000)];
        assert_eq!(prorate_discount(1_000, &groups), vec![1_000]);
    }

    #[test]
    fn remainder_lands_on_largest_group() {
        let groups = vec![group(1_000), group(2_000)];
        // exact thirds: 333 / 666, remainder 1 goes to the larger group
        let shares = prorate_discount(1_000, &groups);
        assert_eq!(shares, vec![333, 667]);
    }

    #[test]
    fn shares_are_proportional() {
        let groups = vec![group(7_500), group(2_500)];
        let shares = prorate_discount(1_000, &groups);
        assert_eq!(shares, vec![750, 250]);
    }

    #[test]
    fn zero_discount_yields_zero_shares() {
        let groups = vec![group(100), group(200)];
        assert_eq!(prorate_discount(0, &groups), vec![0, 0]);
    }

    #[test]
    fn tie_on_subtotal_prefers_first_group() {
        let groups = vec![group(1_000), group(1_000), group(1_000)];
        let shares = prorate_discount(100, &groups);
        assert_eq!(shares.iter().sum::<i64>(), 100);
        assert_eq!(shares, vec![34, 33, 33]);
    }
}
