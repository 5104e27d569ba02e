use std::sync::{Arc, Mutex};

use crate::address::Address;
use crate::ledger::{Amount, Ledger, LedgerError, LedgerEvent, LedgerResult};
use crate::reserve::{Reserve, Vault};

/// Cloneable handle that serializes every call on one ledger.
///
/// Each operation holds the lock across its checks, its commit and any
/// reserve hand-off, so no two operations interleave.
pub struct SharedLedger<R = Vault> {
    inner: Arc<Mutex<Ledger<R>>>,
}

impl<R> Clone for SharedLedger<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Reserve> SharedLedger<R> {
    pub fn new(ledger: Ledger<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Runs `f` with exclusive access to the ledger.
    pub fn with<T>(&self, f: impl FnOnce(&mut Ledger<R>) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        f(&mut guard)
    }

    fn read<T>(&self, f: impl FnOnce(&Ledger<R>) -> T) -> LedgerResult<T> {
        self.with(|ledger| Ok(f(ledger)))
    }

    pub fn transfer(&self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        self.with(|ledger| ledger.transfer(caller, to, amount))
    }

    pub fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.with(|ledger| ledger.transfer_from(caller, from, to, amount))
    }

    pub fn approve(&self, caller: Address, spender: Address, amount: Amount) -> LedgerResult<()> {
        self.with(|ledger| ledger.approve(caller, spender, amount))
    }

    pub fn mint(&self, caller: Address, recipient: Address, backing: Amount) -> LedgerResult<()> {
        self.with(|ledger| ledger.mint(caller, recipient, backing))
    }

    pub fn burn(&self, caller: Address, from: Address, amount: Amount) -> LedgerResult<()> {
        self.with(|ledger| ledger.burn(caller, from, amount))
    }

    pub fn name(&self) -> LedgerResult<String> {
        self.read(|ledger| ledger.name().to_owned())
    }

    pub fn symbol(&self) -> LedgerResult<String> {
        self.read(|ledger| ledger.symbol().to_owned())
    }

    pub fn decimals(&self) -> LedgerResult<u8> {
        self.read(|ledger| ledger.decimals())
    }

    pub fn supply_ceiling(&self) -> LedgerResult<Amount> {
        self.read(|ledger| ledger.supply_ceiling())
    }

    pub fn state_root(&self) -> LedgerResult<[u8; 32]> {
        self.read(|ledger| ledger.state_root())
    }

    pub fn balance_of(&self, account: &Address) -> LedgerResult<Amount> {
        self.read(|ledger| ledger.balance_of(account))
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> LedgerResult<Amount> {
        self.read(|ledger| ledger.allowance(owner, spender))
    }

    pub fn total_supply(&self) -> LedgerResult<Amount> {
        self.read(|ledger| ledger.total_supply())
    }

    pub fn events(&self) -> LedgerResult<Vec<LedgerEvent>> {
        self.read(|ledger| ledger.events().to_vec())
    }
}
