use std::fmt;

use crate::address::Address;
use crate::ledger::Amount;
use crate::reserve::ReserveError;

/// Ledger entry point an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Construct,
    Transfer,
    TransferFrom,
    Approve,
    Mint,
    Burn,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Construct => "constructor",
            Operation::Transfer => "transfer",
            Operation::TransferFrom => "transferFrom",
            Operation::Approve => "approve",
            Operation::Mint => "mint",
            Operation::Burn => "burn",
        })
    }
}

/// Parameter named by a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Name,
    Symbol,
    To,
    From,
    Spender,
    Recipient,
    Amount,
    Value,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Param::Name => "name",
            Param::Symbol => "symbol",
            Param::To => "to",
            Param::From => "from",
            Param::Spender => "spender",
            Param::Recipient => "recipient",
            Param::Amount => "amount",
            Param::Value => "value",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("empty {0}")]
    EmptyMetadata(Param),
    #[error("unsupported precision {0}")]
    Decimals(u8),
    #[error("total supply {recorded} does not match balance sum {summed}")]
    SupplyMismatch { recorded: Amount, summed: Amount },
    #[error("total supply {supply} exceeds ceiling {ceiling}")]
    AboveCeiling { supply: Amount, ceiling: Amount },
    #[error("null account holds a balance")]
    NullBalance,
    #[error("allowance entry names the null account: {owner} -> {spender}")]
    NullAllowance { owner: Address, spender: Address },
    #[error("duplicate allowance entry: {owner} -> {spender}")]
    DuplicateAllowance { owner: Address, spender: Address },
    #[error("balance sum overflows")]
    Overflow,
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    RootMismatch { recorded: String, computed: String },
}

/// Every variant aborts the operation with no state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{op} - missing or zero parameter: {param}")]
    Validation { op: Operation, param: Param },

    #[error("{op} - invalid recipient")]
    InvalidRecipient { op: Operation },

    #[error("{op} - insufficient balance: {account}")]
    InsufficientBalance {
        op: Operation,
        account: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("{op} - insufficient allowance: {spender}")]
    InsufficientAllowance {
        op: Operation,
        owner: Address,
        spender: Address,
        approved: Amount,
        requested: Amount,
    },

    #[error("{op} - allowance must be reset to zero before changing: {spender}")]
    AllowanceResetRequired {
        op: Operation,
        spender: Address,
        current: Amount,
    },

    #[error("{op} - supply ceiling exceeded: {ceiling}")]
    SupplyCeilingExceeded {
        op: Operation,
        ceiling: Amount,
        requested: Amount,
    },

    #[error("{op} - arithmetic overflow")]
    Overflow { op: Operation },

    #[error("{op} - backing collection failed: {source}")]
    Reserve { op: Operation, source: ReserveError },

    #[error("burn - backing release failed, burn rolled back: {source}")]
    ReleaseFailed { source: ReserveError },

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl LedgerError {
    pub(crate) fn validation(op: Operation, param: Param) -> Self {
        LedgerError::Validation { op, param }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_follow_operation_reason_parameter() {
        let err = LedgerError::validation(Operation::Mint, Param::Value);
        assert_eq!(err.to_string(), "mint - missing or zero parameter: value");

        let err = LedgerError::InvalidRecipient {
            op: Operation::TransferFrom,
        };
        assert_eq!(err.to_string(), "transferFrom - invalid recipient");

        let err = LedgerError::validation(Operation::Construct, Param::Symbol);
        assert_eq!(err.to_string(), "constructor - missing or zero parameter: symbol");
    }
}
