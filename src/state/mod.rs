use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::ledger::{Ledger, LedgerSnapshot, SnapshotError};
use crate::reserve::Vault;

pub type StateFile = LedgerSnapshot<Vault>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no ledger state at {} (run `peg init` first)", .0.display())]
    Missing(PathBuf),
    #[error("ledger state already exists at {} (use --force to overwrite)", .0.display())]
    Exists(PathBuf),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed state {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
    move |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Loads and verifies the ledger stored at `path`.
pub fn load(path: &Path) -> Result<Ledger<Vault>, StateError> {
    if !path.exists() {
        return Err(StateError::Missing(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(io_err(path))?;
    let snapshot: StateFile = serde_json::from_slice(&bytes).map_err(|source| StateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let ledger = Ledger::restore(snapshot)?;
    tracing::debug!(path = %path.display(), events = ledger.events().len(), "state loaded");
    Ok(ledger)
}

/// Writes the ledger next to `path` and renames it into place, so a reader
/// sees either the old or the new state.
pub fn save(path: &Path, ledger: &Ledger<Vault>) -> Result<(), StateError> {
    let json = serde_json::to_vec_pretty(&ledger.snapshot()).map_err(|source| StateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    f.write_all(&json).map_err(io_err(&tmp))?;
    f.sync_all().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    tracing::debug!(path = %path.display(), root = %hex::encode(ledger.state_root()), "state saved");
    Ok(())
}

/// Saves a freshly created ledger, refusing to clobber existing state unless
/// `force` is set.
pub fn create(path: &Path, ledger: &Ledger<Vault>, force: bool) -> Result<(), StateError> {
    if path.exists() && !force {
        return Err(StateError::Exists(path.to_path_buf()));
    }
    save(path, ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn ledger() -> Ledger<Vault> {
        let alice = Address::derive("alice");
        let mut vault = Vault::new();
        vault.fund(&alice, 40).unwrap();
        let mut ledger = Ledger::new("Token", "TKN", 0, vault).unwrap();
        ledger.mint(alice, alice, 40).unwrap();
        ledger.approve(alice, Address::derive("bob"), 15).unwrap();
        ledger
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let original = ledger();
        create(&path, &original, false).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.state_root(), original.state_root());
        assert_eq!(loaded.events(), original.events());
        assert_eq!(loaded.reserve(), original.reserve());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        create(&path, &ledger(), false).unwrap();
        assert!(matches!(create(&path, &ledger(), false), Err(StateError::Exists(_))));
        create(&path, &ledger(), true).unwrap();
    }

    #[test]
    fn load_reports_missing_and_tampered_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert!(matches!(load(&path), Err(StateError::Missing(_))));

        save(&path, &ledger()).unwrap();
        let mut snapshot: StateFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        snapshot.total_supply = 1;
        fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();
        assert!(matches!(
            load(&path),
            Err(StateError::Snapshot(SnapshotError::SupplyMismatch { .. }))
        ));
    }
}
