use crate::{
    cache::CartCache,
    config::CheckoutConfig,
    entities::{product_variant, Product, ProductVariant},
    errors::ServiceError,
    gateways::InventoryProvider,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// One line in a cart. `line_total` is always `unit_price * quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

/// Derived money view of a cart, minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: i64,
    pub shipping: i64,
    pub tax: i64,
    pub total: i64,
}

/// Per-vendor slice of the cart; each group becomes one order at
/// checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorGroup {
    pub vendor_id: Uuid,
    pub subtotal: i64,
    pub item_count: usize,
    pub shipping: i64,
}

/// A user's cart. Totals and vendor groups are re-derived on every
/// mutation, never stored authoritatively anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
    pub vendor_groups: Vec<VendorGroup>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            totals: CartTotals::default(),
            vendor_groups: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_line(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|i| i.product_id == product_id && i.variant_id == variant_id)
    }

    /// Re-derives line totals, vendor groups (first-seen vendor order),
    /// shipping, tax and the grand total.
    pub fn recalculate(&mut self, pricing: &CheckoutConfig) {
        for item in &mut self.items {
            item.line_total = item.unit_price * i64::from(item.quantity);
        }

        let mut groups: Vec<VendorGroup> = Vec::new();
        for item in &self.items {
            match groups.iter_mut().find(|g| g.vendor_id == item.vendor_id) {
                Some(group) => {
                    group.subtotal += item.line_total;
                    group.item_count += 1;
                }
                None => groups.push(VendorGroup {
                    vendor_id: item.vendor_id,
                    subtotal: item.line_total,
                    item_count: 1,
                    shipping: 0,
                }),
            }
        }
        for group in &mut groups {
            group.shipping = shipping_fee(group.subtotal, pricing);
        }

        let subtotal: i64 = self.items.iter().map(|i| i.line_total).sum();
        let shipping: i64 = groups.iter().map(|g| g.shipping).sum();
        let tax = tax_amount(subtotal, pricing);

        self.totals = CartTotals {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        };
        self.vendor_groups = groups;
    }
}

/// Flat per-vendor shipping fee, waived at or above the free-shipping
/// threshold.
pub fn shipping_fee(group_subtotal: i64, pricing: &CheckoutConfig) -> i64 {
    if group_subtotal <= 0 || group_subtotal >= pricing.free_shipping_threshold {
        0
    } else {
        pricing.shipping_flat_fee
    }
}

/// Tax on a subtotal at the configured basis-point rate, floored.
pub fn tax_amount(subtotal: i64, pricing: &CheckoutConfig) -> i64 {
    if subtotal <= 0 {
        return 0;
    }
    ((i128::from(subtotal) * i128::from(pricing.tax_rate_bps)) / 10_000) as i64
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Cart store. Carts live in the injected TTL cache; the database is
/// only consulted for live product/price/stock data.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    cache: Arc<CartCache>,
    inventory: Arc<dyn InventoryProvider>,
    pricing: CheckoutConfig,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<CartCache>,
        inventory: Arc<dyn InventoryProvider>,
        pricing: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            cache,
            inventory,
            pricing,
        }
    }

    /// Adds an item, merging into an existing (product, variant) line.
    /// Stock is checked against the requested cumulative quantity before
    /// the cart is touched; on failure the cart is unchanged.
    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, input: AddItemInput) -> Result<Cart, ServiceError> {
        input.validate()?;

        let product = Product::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_active {
            return Err(ServiceError::Validation(format!(
                "Product '{}' is not available",
                product.name
            )));
        }

        let unit_price = match input.variant_id {
            Some(variant_id) => {
                let variant = ProductVariant::find_by_id(variant_id)
                    .filter(product_variant::Column::ProductId.eq(product.id))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Variant {} not found for product {}",
                            variant_id, product.id
                        ))
                    })?;
                variant.price
            }
            None => product.price,
        };

        let already_in_cart = self
            .cache
            .get(user_id)
            .and_then(|c| {
                c.find_line(input.product_id, input.variant_id)
                    .map(|l| l.quantity)
            })
            .unwrap_or(0);
        let wanted = already_in_cart + input.quantity;

        let available = self
            .inventory
            .available_quantity(input.product_id, input.variant_id)
            .await?;
        if available < wanted {
            return Err(ServiceError::InsufficientStock(format!(
                "'{}': requested {}, only {} available",
                product.name, wanted, available
            )));
        }

        let pricing = self.pricing.clone();
        let cart = self.cache.upsert_with(user_id, |cart| {
            match cart
                .items
                .iter_mut()
                .find(|i| i.product_id == input.product_id && i.variant_id == input.variant_id)
            {
                Some(line) => line.quantity += input.quantity,
                None => cart.items.push(CartItem {
                    id: Uuid::new_v4(),
                    product_id: input.product_id,
                    variant_id: input.variant_id,
                    vendor_id: product.vendor_id,
                    name: product.name.clone(),
                    unit_price,
                    quantity: input.quantity,
                    line_total: 0,
                }),
            }
            cart.recalculate(&pricing);
            Ok(cart.clone())
        })?;

        info!(%user_id, product_id = %input.product_id, quantity = input.quantity, "added item to cart");
        Ok(cart)
    }

    /// Sets a line's quantity. Zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, item_id).await;
        }

        let cart = self
            .cache
            .get(user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {} not found", user_id)))?;
        let line = cart
            .items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity > line.quantity {
            let available = self
                .inventory
                .available_quantity(line.product_id, line.variant_id)
                .await?;
            if available < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}': requested {}, only {} available",
                    line.name, quantity, available
                )));
            }
        }

        let pricing = self.pricing.clone();
        self.cache.update_with(user_id, |cart| {
            let line = cart
                .items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;
            line.quantity = quantity;
            cart.recalculate(&pricing);
            Ok(cart.clone())
        })
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Cart, ServiceError> {
        let pricing = self.pricing.clone();
        self.cache.update_with(user_id, |cart| {
            let before = cart.items.len();
            cart.items.retain(|i| i.id != item_id);
            if cart.items.len() == before {
                return Err(ServiceError::NotFound(format!(
                    "Cart item {} not found",
                    item_id
                )));
            }
            cart.recalculate(&pricing);
            Ok(cart.clone())
        })
    }

    /// The user's live cart; an absent or expired entry reads as an
    /// empty cart.
    pub fn get_cart(&self, user_id: Uuid) -> Cart {
        self.cache.get(user_id).unwrap_or_else(|| Cart::new(user_id))
    }

    pub fn clear(&self, user_id: Uuid) {
        self.cache.remove(user_id);
        info!(%user_id, "cleared cart");
    }
}
