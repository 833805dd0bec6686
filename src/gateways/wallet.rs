use super::WalletLedger;
use crate::errors::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// In-process wallet ledger. Balance mutations run under the key's
/// shard lock, so concurrent debits cannot both spend the same funds.
#[derive(Debug, Default)]
pub struct InMemoryWalletLedger {
    balances: DashMap<Uuid, i64>,
}

impl InMemoryWalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helper for tests and demos.
    pub fn with_balance(user_id: Uuid, amount: i64) -> Self {
        let ledger = Self::new();
        ledger.balances.insert(user_id, amount);
        ledger
    }

    pub fn balance(&self, user_id: Uuid) -> i64 {
        self.balances.get(&user_id).map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl WalletLedger for InMemoryWalletLedger {
    async fn debit(&self, user_id: Uuid, amount: i64) -> Result<(), ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "debit amount must be positive".into(),
            ));
        }
        let mut balance = self.balances.entry(user_id).or_insert(0);
        if *balance < amount {
            return Err(ServiceError::InsufficientFunds(format!(
                "wallet balance {} cannot cover {}",
                *balance, amount
            )));
        }
        *balance -= amount;
        info!(%user_id, amount, remaining = *balance, "wallet debited");
        Ok(())
    }

    async fn credit(&self, user_id: Uuid, amount: i64) -> Result<(), ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "credit amount must be positive".into(),
            ));
        }
        let mut balance = self.balances.entry(user_id).or_insert(0);
        *balance += amount;
        info!(%user_id, amount, balance = *balance, "wallet credited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_within_balance_succeeds() {
        let user = Uuid::new_v4();
        let wallet = InMemoryWalletLedger::with_balance(user, 1_000);
        wallet.debit(user, 400).await.unwrap();
        assert_eq!(wallet.balance(user), 600);
    }

    #[tokio::test]
    async fn overdraft_is_rejected() {
        let user = Uuid::new_v4();
        let wallet = InMemoryWalletLedger::with_balance(user, 100);
        let err = wallet.debit(user, 101).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds(_)));
        assert_eq!(wallet.balance(user), 100);
    }

    #[tokio::test]
    async fn credit_then_debit_round_trips() {
        let user = Uuid::new_v4();
        let wallet = InMemoryWalletLedger::new();
        wallet.credit(user, 2_500).await.unwrap();
        wallet.debit(user, 2_500).await.unwrap();
        assert_eq!(wallet.balance(user), 0);
    }
}
