use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::ledger::{Amount, Ledger, LedgerEvent, Param, SnapshotError, DECIMALS};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
}

/// Serializable image of a ledger, including its reserve and event log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot<R> {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub supply_ceiling: Amount,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub allowances: Vec<AllowanceEntry>,
    pub events: Vec<LedgerEvent>,
    pub reserve: R,
    pub state_root: [u8; 32],
}

impl<R> Ledger<R> {
    /// Merkle root over metadata, supply and every non-zero balance and
    /// allowance. Zero entries are skipped so absent and zero hash alike.
    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(
            &self.name,
            &self.symbol,
            self.supply_ceiling,
            self.total_supply,
            self.balances.iter().map(|(account, amount)| (*account, *amount)),
            self.allowances
                .iter()
                .map(|((owner, spender), amount)| (*owner, *spender, *amount)),
        )
    }

    pub fn snapshot(&self) -> LedgerSnapshot<R>
    where
        R: Clone,
    {
        LedgerSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: DECIMALS,
            supply_ceiling: self.supply_ceiling,
            total_supply: self.total_supply,
            balances: self.balances.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            events: self.events.clone(),
            reserve: self.reserve.clone(),
            state_root: self.state_root(),
        }
    }

    /// Rebuilds a ledger, re-checking the supply invariants, the allowance
    /// keys and the root.
    pub fn restore(snapshot: LedgerSnapshot<R>) -> Result<Self, SnapshotError> {
        if snapshot.name.is_empty() {
            return Err(SnapshotError::EmptyMetadata(Param::Name));
        }
        if snapshot.symbol.is_empty() {
            return Err(SnapshotError::EmptyMetadata(Param::Symbol));
        }
        if snapshot.decimals != DECIMALS {
            return Err(SnapshotError::Decimals(snapshot.decimals));
        }
        if snapshot.balances.get(&Address::NULL).copied().unwrap_or(0) > 0 {
            return Err(SnapshotError::NullBalance);
        }
        let summed = snapshot
            .balances
            .values()
            .try_fold(0 as Amount, |acc, amount| acc.checked_add(*amount))
            .ok_or(SnapshotError::Overflow)?;
        if summed != snapshot.total_supply {
            return Err(SnapshotError::SupplyMismatch {
                recorded: snapshot.total_supply,
                summed,
            });
        }
        if snapshot.supply_ceiling != 0 && snapshot.total_supply > snapshot.supply_ceiling {
            return Err(SnapshotError::AboveCeiling {
                supply: snapshot.total_supply,
                ceiling: snapshot.supply_ceiling,
            });
        }

        let mut allowances = BTreeMap::new();
        for entry in snapshot.allowances {
            let (owner, spender) = (entry.owner, entry.spender);
            if owner.is_null() || spender.is_null() {
                return Err(SnapshotError::NullAllowance { owner, spender });
            }
            if allowances.insert((owner, spender), entry.amount).is_some() {
                return Err(SnapshotError::DuplicateAllowance { owner, spender });
            }
        }

        let ledger = Ledger {
            name: snapshot.name,
            symbol: snapshot.symbol,
            supply_ceiling: snapshot.supply_ceiling,
            total_supply: snapshot.total_supply,
            balances: snapshot.balances,
            allowances,
            events: snapshot.events,
            reserve: snapshot.reserve,
        };
        let computed = ledger.state_root();
        if computed != snapshot.state_root {
            return Err(SnapshotError::RootMismatch {
                recorded: hex::encode(snapshot.state_root),
                computed: hex::encode(computed),
            });
        }
        Ok(ledger)
    }
}

fn compute_state_root(
    name: &str,
    symbol: &str,
    supply_ceiling: Amount,
    total_supply: Amount,
    balances: impl Iterator<Item = (Address, Amount)>,
    allowances: impl Iterator<Item = (Address, Address, Amount)>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();

    let mut hasher = Sha256::new();
    hasher.update(b"meta");
    hasher.update((name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update((symbol.len() as u64).to_le_bytes());
    hasher.update(symbol.as_bytes());
    hasher.update([DECIMALS]);
    hasher.update(supply_ceiling.to_le_bytes());
    hasher.update(total_supply.to_le_bytes());
    leaves.push(hasher.finalize().into());

    for (account, amount) in balances.filter(|(_, amount)| *amount > 0) {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (owner, spender, amount) in allowances.filter(|(_, _, amount)| *amount > 0) {
        let mut hasher = Sha256::new();
        hasher.update(b"allow");
        hasher.update(owner.as_bytes());
        hasher.update(spender.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserve::Vault;

    fn sample() -> Ledger {
        let alice = Address::derive("alice");
        let mut vault = Vault::new();
        vault.fund(&alice, 100).unwrap();
        let mut ledger = Ledger::new("Token", "TKN", 1_000, vault).unwrap();
        ledger.mint(alice, alice, 100).unwrap();
        ledger.transfer(alice, Address::derive("bob"), 25).unwrap();
        ledger.approve(alice, Address::derive("carol"), 10).unwrap();
        ledger
    }

    #[test]
    fn state_root_is_deterministic() {
        let ledger = sample();
        assert_eq!(ledger.state_root(), ledger.state_root());
        assert_eq!(ledger.state_root(), sample().state_root());
    }

    #[test]
    fn state_root_ignores_zero_entries() {
        let mut ledger = sample();
        let before = ledger.state_root();
        let alice = Address::derive("alice");
        let carol = Address::derive("carol");
        ledger.approve(alice, carol, 0).unwrap();
        assert_ne!(ledger.state_root(), before);

        let mut fresh = sample();
        fresh.allowances.remove(&(alice, carol));
        assert_eq!(fresh.state_root(), ledger.state_root());
    }

    #[test]
    fn snapshot_survives_json() {
        let ledger = sample();
        let snapshot = ledger.snapshot();
        let json = serde_json::to_vec(&snapshot).unwrap();
        let decoded: LedgerSnapshot<Vault> = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = Ledger::restore(decoded).unwrap();
        assert_eq!(restored.state_root(), ledger.state_root());
        assert_eq!(restored.events(), ledger.events());
        assert_eq!(restored.allowance(&Address::derive("alice"), &Address::derive("carol")), 10);
        assert_eq!(restored.reserve(), ledger.reserve());
    }

    #[test]
    fn restore_rejects_supply_mismatch() {
        let mut snapshot = sample().snapshot();
        snapshot.total_supply += 1;
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::SupplyMismatch {
                recorded: 101,
                summed: 100,
            }
        );
    }

    #[test]
    fn restore_rejects_tampered_balances() {
        let mut snapshot = sample().snapshot();
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        *snapshot.balances.get_mut(&alice).unwrap() -= 5;
        *snapshot.balances.get_mut(&bob).unwrap() += 5;
        assert!(matches!(
            Ledger::restore(snapshot),
            Err(SnapshotError::RootMismatch { .. })
        ));
    }

    /// Re-seals a hand-edited snapshot so only the structural checks can
    /// reject it.
    fn resealed(mut snapshot: LedgerSnapshot<Vault>) -> LedgerSnapshot<Vault> {
        let allowances = snapshot
            .allowances
            .iter()
            .map(|e| (e.owner, e.spender, e.amount));
        snapshot.state_root = compute_state_root(
            &snapshot.name,
            &snapshot.symbol,
            snapshot.supply_ceiling,
            snapshot.total_supply,
            snapshot.balances.iter().map(|(a, v)| (*a, *v)),
            allowances,
        );
        snapshot
    }

    #[test]
    fn restore_rejects_null_allowance_keys() {
        let alice = Address::derive("alice");
        let mut snapshot = sample().snapshot();
        snapshot.allowances.push(AllowanceEntry {
            owner: alice,
            spender: Address::NULL,
            amount: 10,
        });
        assert_eq!(
            Ledger::restore(resealed(snapshot)).unwrap_err(),
            SnapshotError::NullAllowance {
                owner: alice,
                spender: Address::NULL,
            }
        );

        let mut snapshot = sample().snapshot();
        snapshot.allowances.push(AllowanceEntry {
            owner: Address::NULL,
            spender: alice,
            amount: 1,
        });
        assert!(matches!(
            Ledger::restore(resealed(snapshot)),
            Err(SnapshotError::NullAllowance { .. })
        ));
    }

    #[test]
    fn restore_rejects_duplicate_allowances() {
        let alice = Address::derive("alice");
        let carol = Address::derive("carol");
        let mut snapshot = sample().snapshot();
        snapshot.allowances.push(AllowanceEntry {
            owner: alice,
            spender: carol,
            amount: 75,
        });
        assert_eq!(
            Ledger::restore(resealed(snapshot)).unwrap_err(),
            SnapshotError::DuplicateAllowance {
                owner: alice,
                spender: carol,
            }
        );
    }

    #[test]
    fn restore_rejects_null_balance_and_ceiling_breach() {
        let mut snapshot = sample().snapshot();
        snapshot.balances.insert(Address::NULL, 1);
        snapshot.total_supply += 1;
        assert_eq!(Ledger::restore(snapshot).unwrap_err(), SnapshotError::NullBalance);

        let mut snapshot = sample().snapshot();
        snapshot.supply_ceiling = 50;
        assert_eq!(
            Ledger::restore(snapshot).unwrap_err(),
            SnapshotError::AboveCeiling {
                supply: 100,
                ceiling: 50,
            }
        );
    }
}
