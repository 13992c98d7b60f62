//! Balance ledger: available/locked accounting with pre-trade fund locking
//! and atomic settlement on fill (spec §4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::LedgerError;
use crate::model::Side;

/// Available and locked amounts for one (user, asset) pair. Both
/// components are always non-negative at any observable point between
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AssetBalance {
    pub available: Decimal,
    pub locked: Decimal,
}

/// Map user_id -> asset -> balance, owned exclusively by the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    balances: HashMap<String, HashMap<String, AssetBalance>>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, user_id: &str, asset: &str) -> &mut AssetBalance {
        self.balances
            .entry(user_id.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_default()
    }

    /// Required lock amount for one side of a prospective order.
    fn required(side: Side, base: &str, quote: &str, price: Decimal, quantity: Decimal) -> (String, Decimal) {
        match side {
            Side::Buy => (quote.to_string(), quantity.mul(price)),
            Side::Sell => (base.to_string(), quantity),
        }
    }

    /// Reserve the funds a new order requires. Fails without mutation if
    /// the asset entry is absent or underfunded.
    pub fn lock(
        &mut self,
        user_id: &str,
        side: Side,
        base: &str,
        quote: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), LedgerError> {
        let (asset, required) = Self::required(side, base, quote, price, quantity);

        let available = self
            .balances
            .get(user_id)
            .and_then(|assets| assets.get(&asset))
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO);

        if available < required {
            return Err(LedgerError::InsufficientFunds {
                user_id: user_id.to_string(),
                asset,
                required: required.to_string(),
            });
        }

        let balance = self.entry(user_id, &asset);
        balance.available = balance.available.sub(required);
        balance.locked = balance.locked.add(required);
        Ok(())
    }

    /// Inverse of [`lock`] — the caller must pass the same arguments that
    /// a prior successful `lock` used.
    pub fn unlock(
        &mut self,
        user_id: &str,
        side: Side,
        base: &str,
        quote: &str,
        price: Decimal,
        quantity: Decimal,
    ) {
        let (asset, required) = Self::required(side, base, quote, price, quantity);
        let balance = self.entry(user_id, &asset);
        balance.locked = balance.locked.sub(required);
        balance.available = balance.available.add(required);
    }

    /// Apply one fill's settlement between taker and maker. `side` is the
    /// taker's side.
    pub fn settle_fill(
        &mut self,
        taker_user: &str,
        maker_user: &str,
        side: Side,
        base: &str,
        quote: &str,
        fill_qty: Decimal,
        fill_price: Decimal,
    ) {
        let value = fill_qty.mul(fill_price);

        match side {
            Side::Buy => {
                let taker_quote = self.entry(taker_user, quote);
                taker_quote.locked = taker_quote.locked.sub(value);
                let taker_base = self.entry(taker_user, base);
                taker_base.available = taker_base.available.add(fill_qty);

                let maker_quote = self.entry(maker_user, quote);
                maker_quote.available = maker_quote.available.add(value);
                let maker_base = self.entry(maker_user, base);
                maker_base.locked = maker_base.locked.sub(fill_qty);
            }
            Side::Sell => {
                let taker_base = self.entry(taker_user, base);
                taker_base.locked = taker_base.locked.sub(fill_qty);
                let taker_quote = self.entry(taker_user, quote);
                taker_quote.available = taker_quote.available.add(value);

                let maker_quote = self.entry(maker_user, quote);
                maker_quote.locked = maker_quote.locked.sub(value);
                let maker_base = self.entry(maker_user, base);
                maker_base.available = maker_base.available.add(fill_qty);
            }
        }
    }

    /// On-ramp: credit `amount` of `asset` to `user_id`, creating the entry
    /// if absent.
    pub fn credit(&mut self, user_id: &str, asset: &str, amount: Decimal) {
        let balance = self.entry(user_id, asset);
        balance.available = balance.available.add(amount);
    }

    /// Off-ramp: debit `amount` of `asset` from `user_id`'s available
    /// balance. Fails without mutation if underfunded.
    pub fn debit(&mut self, user_id: &str, asset: &str, amount: Decimal) -> Result<(), LedgerError> {
        let available = self
            .balances
            .get(user_id)
            .and_then(|assets| assets.get(asset))
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO);

        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id: user_id.to_string(),
                asset: asset.to_string(),
                required: amount.to_string(),
            });
        }

        let balance = self.entry(user_id, asset);
        balance.available = balance.available.sub(amount);
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> HashMap<String, AssetBalance> {
        self.balances.get(user_id).cloned().unwrap_or_default()
    }

    /// Every user's balance map, for snapshotting (spec §6 snapshot file
    /// format: `balances: [[user_id, balance_map], …]`).
    pub fn all(&self) -> Vec<(String, HashMap<String, AssetBalance>)> {
        self.balances
            .iter()
            .map(|(user_id, assets)| (user_id.clone(), assets.clone()))
            .collect()
    }

    /// Re-insert one user's balance map verbatim, used when restoring
    /// from a snapshot.
    pub fn restore_user(&mut self, user_id: String, assets: HashMap<String, AssetBalance>) {
        self.balances.insert(user_id, assets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::parse(s).unwrap()
    }

    #[test]
    fn lock_then_unlock_is_identity() {
        let mut ledger = BalanceLedger::new();
        ledger.credit("u1", "INR", d("10000"));

        ledger
            .lock("u1", Side::Buy, "TATA", "INR", d("100"), d("10"))
            .unwrap();
        ledger.unlock("u1", Side::Buy, "TATA", "INR", d("100"), d("10"));

        let balance = ledger.get("u1").get("INR").copied().unwrap();
        assert_eq!(balance.available, d("10000"));
        assert_eq!(balance.locked, Decimal::ZERO);
    }

    #[test]
    fn lock_fails_without_mutation_when_underfunded() {
        let mut ledger = BalanceLedger::new();
        ledger.credit("u1", "INR", d("100"));

        let err = ledger
            .lock("u1", Side::Buy, "TATA", "INR", d("100"), d("10"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let balance = ledger.get("u1").get("INR").copied().unwrap();
        assert_eq!(balance.available, d("100"));
        assert_eq!(balance.locked, Decimal::ZERO);
    }

    #[test]
    fn settle_fill_conserves_assets_across_taker_and_maker() {
        let mut ledger = BalanceLedger::new();
        ledger.credit("buyer", "INR", d("10000"));
        ledger.credit("seller", "TATA", d("100"));

        ledger
            .lock("seller", Side::Sell, "TATA", "INR", d("100"), d("10"))
            .unwrap();
        ledger
            .lock("buyer", Side::Buy, "TATA", "INR", d("100"), d("10"))
            .unwrap();

        ledger.settle_fill("buyer", "seller", Side::Buy, "TATA", "INR", d("10"), d("100"));

        let buyer = ledger.get("buyer");
        let seller = ledger.get("seller");

        assert_eq!(buyer.get("INR").copied().unwrap().available, d("9000"));
        assert_eq!(buyer.get("TATA").copied().unwrap_or_default().available, d("10"));
        assert_eq!(seller.get("INR").copied().unwrap_or_default().available, d("11000"));
        assert_eq!(seller.get("TATA").copied().unwrap().available, d("90"));

        let total_inr = buyer.get("INR").copied().unwrap_or_default().available.add(
            buyer.get("INR").copied().unwrap_or_default().locked,
        ).add(seller.get("INR").copied().unwrap_or_default().available)
            .add(seller.get("INR").copied().unwrap_or_default().locked);
        assert_eq!(total_inr, d("20000"));
    }

    #[test]
    fn debit_fails_without_mutation_when_underfunded() {
        let mut ledger = BalanceLedger::new();
        ledger.credit("u1", "INR", d("50"));
        assert!(ledger.debit("u1", "INR", d("100")).is_err());
        assert_eq!(ledger.get("u1").get("INR").copied().unwrap().available, d("50"));
    }
}
