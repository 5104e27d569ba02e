use crate::address::Address;
use crate::ledger::{Amount, Ledger, LedgerEvent};

pub(crate) type AllowanceKey = (Address, Address);

/// Effects of an operation whose preconditions all passed, not yet applied.
#[derive(Debug)]
pub(crate) struct Staged {
    pub balances: Vec<(Address, Amount)>,
    pub allowance: Option<(AllowanceKey, Amount)>,
    pub total_supply: Amount,
    pub event: LedgerEvent,
}

/// Values overwritten by a commit; `None` means the entry was absent.
#[derive(Debug)]
pub(crate) struct Undo {
    balances: Vec<(Address, Option<Amount>)>,
    allowance: Option<(AllowanceKey, Option<Amount>)>,
    total_supply: Amount,
    events_len: usize,
}

impl<R> Ledger<R> {
    /// Applies staged effects. Infallible: every check ran during staging.
    pub(crate) fn commit(&mut self, staged: Staged) -> Undo {
        let mut undo = Undo {
            balances: Vec::with_capacity(staged.balances.len()),
            allowance: None,
            total_supply: self.total_supply,
            events_len: self.events.len(),
        };
        for (account, amount) in staged.balances {
            undo.balances.push((account, self.balances.insert(account, amount)));
        }
        if let Some((key, amount)) = staged.allowance {
            undo.allowance = Some((key, self.allowances.insert(key, amount)));
        }
        self.total_supply = staged.total_supply;
        tracing::debug!(event = ?staged.event, supply = %self.total_supply, "committed");
        self.events.push(staged.event);
        undo
    }

    pub(crate) fn rollback(&mut self, undo: Undo) {
        for (account, previous) in undo.balances.into_iter().rev() {
            match previous {
                Some(amount) => self.balances.insert(account, amount),
                None => self.balances.remove(&account),
            };
        }
        if let Some((key, previous)) = undo.allowance {
            match previous {
                Some(amount) => self.allowances.insert(key, amount),
                None => self.allowances.remove(&key),
            };
        }
        self.total_supply = undo.total_supply;
        self.events.truncate(undo.events_len);
    }
}
