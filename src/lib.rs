//! Single-asset fungible token ledger backed 1:1 by an external asset.
//!
//! * [`ledger`] — the state machine: balances, allowances, supply, and the
//!   five mutating operations (transfer, transfer-from, approve, mint, burn).
//! * [`reserve`] — custody of the backing asset exchanged on mint and burn.
//! * [`address`] — fixed-width account identifiers.
//! * [`config`] — genesis parameters and runtime settings.
//! * [`state`] — JSON persistence of ledger snapshots for the `peg` binary.

pub mod address;
pub mod config;
pub mod ledger;
pub mod reserve;
pub mod state;

pub use address::Address;
pub use ledger::{Amount, Ledger, LedgerError, LedgerEvent, LedgerResult, SharedLedger, DECIMALS};
pub use reserve::{Reserve, ReserveError, Vault};
