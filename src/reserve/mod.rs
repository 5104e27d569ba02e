use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::Amount;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    #[error("insufficient backing held by {account}: have {available}, need {requested}")]
    InsufficientBacking {
        account: Address,
        available: Amount,
        requested: Amount,
    },
    #[error("custody shortfall: holding {held}, asked to release {requested}")]
    CustodyShortfall { held: Amount, requested: Amount },
    #[error("backing arithmetic overflow")]
    Overflow,
    #[error("backing transfer refused: {0}")]
    Refused(String),
}

/// Custodian of the external backing asset.
///
/// The ledger calls [`Reserve::collect`] when a caller supplies backing for
/// issuance and [`Reserve::release`] when units are redeemed. Implementations
/// never get a handle to the ledger, so a release cannot re-enter it.
pub trait Reserve {
    fn collect(&mut self, from: &Address, amount: Amount) -> Result<(), ReserveError>;

    fn release(&mut self, to: &Address, amount: Amount) -> Result<(), ReserveError>;

    /// Amount of backing currently in custody.
    fn held(&self) -> Amount;
}

/// In-memory backing asset: external holdings per account plus the custody pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Vault {
    holdings: BTreeMap<Address, Amount>,
    custody: Amount,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits external backing to an account (genesis allocation, faucet).
    pub fn fund(&mut self, account: &Address, amount: Amount) -> Result<(), ReserveError> {
        let entry = self.holdings.entry(*account).or_default();
        *entry = entry.checked_add(amount).ok_or(ReserveError::Overflow)?;
        Ok(())
    }

    pub fn holdings_of(&self, account: &Address) -> Amount {
        self.holdings.get(account).copied().unwrap_or(0)
    }
}

impl Reserve for Vault {
    fn collect(&mut self, from: &Address, amount: Amount) -> Result<(), ReserveError> {
        let available = self.holdings_of(from);
        if available < amount {
            return Err(ReserveError::InsufficientBacking {
                account: *from,
                available,
                requested: amount,
            });
        }
        let custody = self
            .custody
            .checked_add(amount)
            .ok_or(ReserveError::Overflow)?;
        self.holdings.insert(*from, available - amount);
        self.custody = custody;
        Ok(())
    }

    fn release(&mut self, to: &Address, amount: Amount) -> Result<(), ReserveError> {
        if self.custody < amount {
            return Err(ReserveError::CustodyShortfall {
                held: self.custody,
                requested: amount,
            });
        }
        let credited = self
            .holdings_of(to)
            .checked_add(amount)
            .ok_or(ReserveError::Overflow)?;
        self.custody -= amount;
        self.holdings.insert(*to, credited);
        Ok(())
    }

    fn held(&self) -> Amount {
        self.custody
    }
}
