//! Balance ledger: minute reservations and compare-and-swap debits

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::ports::{StoreError, UserStore};
use crate::domain::User;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not enough minutes: need {required}, have {available:.1}")]
    Insufficient { required: i64, available: f64 },

    #[error("Balance update kept conflicting after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Minute balance operations over the user store.
///
/// Debits use compare-and-swap on the raw stored value so two workers
/// settling at once cannot both apply against the same starting balance.
pub struct BalanceLedger {
    users: Arc<dyn UserStore>,
    max_retries: u32,
}

impl BalanceLedger {
    pub fn new(users: Arc<dyn UserStore>, max_retries: u32) -> Self {
        Self { users, max_retries }
    }

    /// Whole minutes a file of `duration_secs` costs, at least one
    pub fn required_minutes(duration_secs: u32) -> i64 {
        i64::from(duration_secs.div_ceil(60)).max(1)
    }

    /// Check that `user` can afford `required` minutes without touching
    /// the store
    pub fn check_affordable(user: &User, required: i64) -> Result<(), LedgerError> {
        let available = user.balance_minutes();
        if available < required as f64 {
            return Err(LedgerError::Insufficient {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Subtract `minutes` from the user's balance, clamping at zero
    pub async fn debit(&self, user_id: i64, minutes: i64) -> Result<f64, LedgerError> {
        self.adjust(user_id, -(minutes as f64)).await
    }

    /// Give minutes back, for refunds
    pub async fn credit(&self, user_id: i64, minutes: i64) -> Result<f64, LedgerError> {
        self.adjust(user_id, minutes as f64).await
    }

    /// Apply a signed adjustment, clamping the result at zero.
    ///
    /// Reads the current balance, conditions the write on the raw value read,
    /// and retries with a growing pause when another writer won the race.
    async fn adjust(&self, user_id: i64, delta: f64) -> Result<f64, LedgerError> {
        for attempt in 0..self.max_retries {
            let user = self
                .users
                .get_user(user_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;

            let new_balance = ((user.balance_minutes() + delta).trunc()).max(0.0);

            match self
                .users
                .update_balance_if(user_id, &user.balance, new_balance)
                .await
            {
                Ok(()) => {
                    debug!(user_id, delta, new_balance, "balance adjusted");
                    return Ok(new_balance);
                }
                Err(StoreError::ConditionFailed { .. }) => {
                    warn!(user_id, attempt, "balance update conflicted, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt + 1))).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Conflict {
            attempts: self.max_retries,
        })
    }
}
