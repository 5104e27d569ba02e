use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::Amount;

/// Notification appended to the ledger's log by each committed operation.
///
/// Issuance is recorded as a `Transfer` whose `from` is [`Address::NULL`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Amount,
    },
    Burn {
        from: Address,
        commanded_by: Address,
        amount: Amount,
    },
}
