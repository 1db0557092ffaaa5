//! Bounded pool of shared device credentials.
//!
//! Exclusivity is structural: a leased [`Account`] value is moved out of
//! the free list into the [`AccountLease`] guard, so the same account
//! cannot back two concurrent runs no matter what the callers do. The
//! guard returns it on drop, which covers error and panic paths too.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::EngineError;

/// A device credential. Immutable once constructed; the secret never
/// appears in Debug output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    name: String,
    secret: String,
}

impl Account {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Fixed set of accounts handed out one at a time.
///
/// The semaphore carries one permit per account; holding a permit
/// guarantees the free list is non-empty, so acquisition never spins.
/// Waiters are served in FIFO order by the tokio semaphore.
pub struct AccountPool {
    semaphore: Arc<Semaphore>,
    free: Arc<Mutex<VecDeque<Account>>>,
    total: usize,
}

impl AccountPool {
    pub fn new(accounts: Vec<Account>) -> Self {
        let total = accounts.len();
        Self {
            semaphore: Arc::new(Semaphore::new(total)),
            free: Arc::new(Mutex::new(accounts.into())),
            total,
        }
    }

    /// Total number of accounts in the pool.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of accounts currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until an account is free and lease it.
    pub async fn lease(&self) -> Result<AccountLease, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        self.take_free(permit)
    }

    /// Lease an account without waiting.
    pub fn try_lease(&self) -> Result<AccountLease, EngineError> {
        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| EngineError::PoolExhausted)?;
        self.take_free(permit)
    }

    fn take_free(&self, permit: OwnedSemaphorePermit) -> Result<AccountLease, EngineError> {
        match lock_free_list(&self.free).pop_front() {
            Some(account) => Ok(AccountLease {
                account: Some(account),
                free: Arc::clone(&self.free),
                _permit: permit,
            }),
            // A permit without a free account cannot happen unless the
            // list was tampered with from outside this module.
            None => Err(EngineError::PoolClosed),
        }
    }
}

/// RAII guard for a leased account. Derefs to [`Account`]; the account
/// goes back on the free list when the guard drops.
#[derive(Debug)]
pub struct AccountLease {
    account: Option<Account>,
    free: Arc<Mutex<VecDeque<Account>>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for AccountLease {
    type Target = Account;

    fn deref(&self) -> &Account {
        // `account` is only `None` after drop; unreachable while borrowed.
        match &self.account {
            Some(account) => account,
            None => unreachable!("account lease used after release"),
        }
    }
}

impl Drop for AccountLease {
    fn drop(&mut self) {
        if let Some(account) = self.account.take() {
            lock_free_list(&self.free).push_back(account);
        }
        // The permit is released after the account is back, so a woken
        // waiter always finds the list non-empty.
    }
}

/// Lock the free list, recovering from poisoning: the protected data is
/// a plain queue and stays valid even if a holder panicked.
fn lock_free_list(free: &Mutex<VecDeque<Account>>) -> MutexGuard<'_, VecDeque<Account>> {
    free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
