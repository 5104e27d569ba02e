//! Single-asset token ledger.
//!
//! [`Ledger`] owns balances, delegated allowances and the aggregate supply.
//! Every mutating operation runs its precondition checks against the current
//! state, stages the resulting values, and only then commits them together
//! with exactly one [`LedgerEvent`]. A failed check leaves the ledger untouched.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::reserve::{Reserve, Vault};

pub mod error;
pub mod event;
mod journal;
pub mod shared;
pub mod snapshot;

pub use error::{LedgerError, LedgerResult, Operation, Param, SnapshotError};
pub use event::LedgerEvent;
pub use shared::SharedLedger;
pub use snapshot::{AllowanceEntry, LedgerSnapshot};

use journal::{AllowanceKey, Staged};

pub type Amount = u128;

/// Fractional precision of one unit.
pub const DECIMALS: u8 = 18;

#[derive(Clone, Debug)]
pub struct Ledger<R = Vault> {
    name: String,
    symbol: String,
    supply_ceiling: Amount,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<AllowanceKey, Amount>,
    events: Vec<LedgerEvent>,
    reserve: R,
}

fn rejected(err: LedgerError) -> LedgerError {
    tracing::warn!(%err, "operation rejected");
    err
}

impl<R> Ledger<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Zero means unbounded.
    pub fn supply_ceiling(&self) -> Amount {
        self.supply_ceiling
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn reserve(&self) -> &R {
        &self.reserve
    }

    /// Access to the backing custodian for operations outside the ledger's
    /// own state, such as crediting external holdings.
    pub fn reserve_mut(&mut self) -> &mut R {
        &mut self.reserve
    }

    fn require_balance(&self, op: Operation, account: &Address, amount: Amount) -> LedgerResult<Amount> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                op,
                account: *account,
                available,
                requested: amount,
            });
        }
        Ok(available)
    }

    /// Owners act on their own balance without an allowance.
    fn authorize(&self, op: Operation, caller: &Address, owner: &Address, amount: Amount) -> LedgerResult<()> {
        if caller == owner {
            return Ok(());
        }
        let approved = self.allowance(owner, caller);
        if approved < amount {
            return Err(LedgerError::InsufficientAllowance {
                op,
                owner: *owner,
                spender: *caller,
                approved,
                requested: amount,
            });
        }
        Ok(())
    }

    fn stage_movement(&self, op: Operation, from: Address, to: Address, amount: Amount) -> LedgerResult<Staged> {
        let debited = self.balance_of(&from) - amount;
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { op })?;
        Ok(Staged {
            balances: vec![(from, debited), (to, credited)],
            allowance: None,
            total_supply: self.total_supply,
            event: LedgerEvent::Transfer { from, to, amount },
        })
    }

    fn stage_transfer(&self, caller: Address, to: Address, amount: Amount) -> LedgerResult<Staged> {
        let op = Operation::Transfer;
        if to.is_null() {
            return Err(LedgerError::validation(op, Param::To));
        }
        if to == caller {
            return Err(LedgerError::InvalidRecipient { op });
        }
        if amount == 0 {
            return Err(LedgerError::validation(op, Param::Amount));
        }
        self.require_balance(op, &caller, amount)?;
        self.stage_movement(op, caller, to, amount)
    }

    fn stage_transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<Staged> {
        let op = Operation::TransferFrom;
        if from.is_null() {
            return Err(LedgerError::validation(op, Param::From));
        }
        if to.is_null() {
            return Err(LedgerError::validation(op, Param::To));
        }
        if to == from {
            return Err(LedgerError::InvalidRecipient { op });
        }
        if amount == 0 {
            return Err(LedgerError::validation(op, Param::Amount));
        }
        self.require_balance(op, &from, amount)?;
        self.authorize(op, &caller, &from, amount)?;
        self.stage_movement(op, from, to, amount)
    }

    fn stage_approve(&self, caller: Address, spender: Address, amount: Amount) -> LedgerResult<Staged> {
        let op = Operation::Approve;
        let current = self.allowance(&caller, &spender);
        if amount > 0 && current > 0 {
            return Err(LedgerError::AllowanceResetRequired {
                op,
                spender,
                current,
            });
        }
        if spender.is_null() {
            return Err(LedgerError::validation(op, Param::Spender));
        }
        self.require_balance(op, &caller, amount)?;
        Ok(Staged {
            balances: Vec::new(),
            allowance: Some(((caller, spender), amount)),
            total_supply: self.total_supply,
            event: LedgerEvent::Approval {
                owner: caller,
                spender,
                amount,
            },
        })
    }

    fn stage_mint(&self, recipient: Address, amount: Amount) -> LedgerResult<Staged> {
        let op = Operation::Mint;
        if amount == 0 {
            return Err(LedgerError::validation(op, Param::Value));
        }
        if recipient.is_null() {
            return Err(LedgerError::validation(op, Param::Recipient));
        }
        let supply = self.total_supply.checked_add(amount);
        if self.supply_ceiling != 0 && supply.map_or(true, |s| s > self.supply_ceiling) {
            return Err(LedgerError::SupplyCeilingExceeded {
                op,
                ceiling: self.supply_ceiling,
                requested: amount,
            });
        }
        let supply = supply.ok_or(LedgerError::Overflow { op })?;
        let credited = self
            .balance_of(&recipient)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { op })?;
        Ok(Staged {
            balances: vec![(recipient, credited)],
            allowance: None,
            total_supply: supply,
            event: LedgerEvent::Transfer {
                from: Address::NULL,
                to: recipient,
                amount,
            },
        })
    }

    fn stage_burn(&self, caller: Address, from: Address, amount: Amount) -> LedgerResult<Staged> {
        let op = Operation::Burn;
        if from.is_null() {
            return Err(LedgerError::validation(op, Param::From));
        }
        if amount == 0 {
            return Err(LedgerError::validation(op, Param::Amount));
        }
        let available = self.require_balance(op, &from, amount)?;
        self.authorize(op, &caller, &from, amount)?;
        let supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow { op })?;
        Ok(Staged {
            balances: vec![(from, available - amount)],
            allowance: None,
            total_supply: supply,
            event: LedgerEvent::Burn {
                from,
                commanded_by: caller,
                amount,
            },
        })
    }
}

impl<R: Reserve> Ledger<R> {
    /// Creates an empty ledger. Fails without side effects when `name` or
    /// `symbol` is empty.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        supply_ceiling: Amount,
        reserve: R,
    ) -> LedgerResult<Self> {
        let name = name.into();
        let symbol = symbol.into();
        if name.is_empty() {
            return Err(rejected(LedgerError::validation(Operation::Construct, Param::Name)));
        }
        if symbol.is_empty() {
            return Err(rejected(LedgerError::validation(Operation::Construct, Param::Symbol)));
        }
        tracing::debug!(%name, %symbol, ceiling = %supply_ceiling, "ledger created");
        Ok(Self {
            name,
            symbol,
            supply_ceiling,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
            reserve,
        })
    }

    /// Moves `amount` from the caller to `to`.
    pub fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        let staged = self.stage_transfer(caller, to, amount).map_err(rejected)?;
        self.commit(staged);
        Ok(())
    }

    /// Moves `amount` out of `from` on the caller's instruction.
    ///
    /// A caller other than `from` needs an allowance of at least `amount`.
    /// The allowance is a per-call ceiling and is left as is afterwards.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        let staged = self
            .stage_transfer_from(caller, from, to, amount)
            .map_err(rejected)?;
        self.commit(staged);
        Ok(())
    }

    /// Sets `allowance[caller][spender] = amount`.
    ///
    /// A non-zero allowance has to be reset to zero before it can take a new
    /// non-zero value. The amount is bounded by the caller's balance at the
    /// time of approval only.
    pub fn approve(&mut self, caller: Address, spender: Address, amount: Amount) -> LedgerResult<()> {
        let staged = self.stage_approve(caller, spender, amount).map_err(rejected)?;
        self.commit(staged);
        Ok(())
    }

    /// Issues `backing` units to `recipient` against the same amount of
    /// backing asset collected from the caller.
    pub fn mint(&mut self, caller: Address, recipient: Address, backing: Amount) -> LedgerResult<()> {
        let staged = self.stage_mint(recipient, backing).map_err(rejected)?;
        self.reserve.collect(&caller, backing).map_err(|source| {
            rejected(LedgerError::Reserve {
                op: Operation::Mint,
                source,
            })
        })?;
        self.commit(staged);
        Ok(())
    }

    /// Retires `amount` units held by `from` and releases the backing to it.
    ///
    /// The burn is committed and recorded before the release is requested. A
    /// failed release rolls the burn back and is reported as
    /// [`LedgerError::ReleaseFailed`].
    pub fn burn(&mut self, caller: Address, from: Address, amount: Amount) -> LedgerResult<()> {
        let staged = self.stage_burn(caller, from, amount).map_err(rejected)?;
        let undo = self.commit(staged);
        if let Err(source) = self.reserve.release(&from, amount) {
            self.rollback(undo);
            tracing::warn!(%from, amount = %amount, %source, "backing release failed, burn rolled back");
            return Err(LedgerError::ReleaseFailed { source });
        }
        Ok(())
    }
}
