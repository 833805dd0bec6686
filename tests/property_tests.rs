//! Property tests for the pure money math: commission bounds, discount
//! pro-rating and per-order conservation.

use marketplace_checkout::{
    config::CheckoutConfig,
    services::{
        cart::{shipping_fee, tax_amount, VendorGroup},
        checkout::prorate_discount,
        commission::compute_commission,
    },
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn pricing() -> CheckoutConfig {
    CheckoutConfig::default()
}

fn groups_from(subtotals: Vec<i64>) -> Vec<VendorGroup> {
    subtotals
        .into_iter()
        .map(|subtotal| VendorGroup {
            vendor_id: Uuid::new_v4(),
            subtotal,
            item_count: 1,
            shipping: 0,
        })
        .collect()
}

proptest! {
    /// 0 <= commission <= amount for every rule shape.
    #[test]
    fn commission_is_bounded(
        amount in 0i64..1_000_000_000_000,
        pct_ten_thousandths in 0i64..=10_000,
        fixed in -1_000_000i64..1_000_000_000,
    ) {
        let percentage = Decimal::new(pct_ten_thousandths, 4);
        let commission = compute_commission(amount, percentage, fixed);
        prop_assert!(commission >= 0);
        prop_assert!(commission <= amount);
    }

    /// Pro-rated shares are non-negative and sum exactly to the
    /// discount whenever the cart has a positive subtotal.
    #[test]
    fn prorated_shares_conserve_the_discount(
        discount in 0i64..1_000_000_000,
        subtotals in prop::collection::vec(1i64..1_000_000_000, 1..6),
    ) {
        let groups = groups_from(subtotals);
        let shares = prorate_discount(discount, &groups);
        prop_assert_eq!(shares.len(), groups.len());
        prop_assert!(shares.iter().all(|s| *s >= 0));
        prop_assert_eq!(shares.iter().sum::<i64>(), discount);
    }

    /// For every vendor order: subtotal + shipping + tax - discount ==
    /// total and total >= 0, for any cart shape and any discount.
    #[test]
    fn per_order_money_is_conserved(
        discount in 0i64..100_000_000,
        subtotals in prop::collection::vec(1i64..100_000_000, 1..6),
    ) {
        let cfg = pricing();
        let groups = groups_from(subtotals);
        let shares = prorate_discount(discount, &groups);

        for (group, share) in groups.iter().zip(shares) {
            let shipping = shipping_fee(group.subtotal, &cfg);
            let tax = tax_amount(group.subtotal, &cfg);
            let gross = group.subtotal + shipping + tax;
            let order_discount = share.min(gross);
            let total = gross - order_discount;

            prop_assert_eq!(group.subtotal + shipping + tax - order_discount, total);
            prop_assert!(total >= 0);
        }
    }

    /// Tax is monotone and never exceeds the configured rate ceiling.
    #[test]
    fn tax_stays_within_rate(subtotal in 0i64..1_000_000_000_000) {
        let cfg = pricing();
        let tax = tax_amount(subtotal, &cfg);
        prop_assert!(tax >= 0);
        // bps math: tax <= subtotal * rate / 10_000 exactly, so tax can
        // never exceed the subtotal for rates below 100%
        prop_assert!(tax <= subtotal);
    }

    /// Shipping is either the flat fee or waived, never anything else.
    #[test]
    fn shipping_is_flat_or_waived(subtotal in 0i64..1_000_000_000) {
        let cfg = pricing();
        let fee = shipping_fee(subtotal, &cfg);
        prop_assert!(fee == 0 || fee == cfg.shipping_flat_fee);
    }
}
