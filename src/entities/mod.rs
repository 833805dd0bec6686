pub mod commission_record;
pub mod commission_rule;
pub mod coupon;
pub mod coupon_usage;
pub mod escrow_ledger;
pub mod inventory_level;
pub mod order;
pub mod order_item;
pub mod outbox_event;
pub mod product;
pub mod product_variant;
pub mod vendor;

pub use commission_record::{Entity as CommissionRecord, Model as CommissionRecordModel};
pub use commission_rule::{Entity as CommissionRule, Model as CommissionRuleModel};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use escrow_ledger::{Entity as EscrowLedger, Model as EscrowLedgerModel};
pub use inventory_level::{Entity as InventoryLevel, Model as InventoryLevelModel};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use outbox_event::{Entity as OutboxEvent, Model as OutboxEventModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use vendor::{Entity as Vendor, Model as VendorModel};
