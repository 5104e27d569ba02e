use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::{Amount, Ledger, LedgerError};
use crate::reserve::{ReserveError, Vault};

pub const DEFAULT_STATE_PATH: &str = "peg-state.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("genesis backing: {0}")]
    Reserve(#[from] ReserveError),
}

/// Parameters a ledger is created from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genesis {
    pub name: String,
    pub symbol: String,
    /// Zero means unbounded.
    #[serde(default)]
    pub supply_ceiling: Amount,
    /// Initial external backing holdings per account.
    #[serde(default)]
    pub backing: BTreeMap<Address, Amount>,
}

impl Genesis {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build(&self) -> Result<Ledger<Vault>, ConfigError> {
        let mut vault = Vault::new();
        for (account, amount) in &self.backing {
            vault.fund(account, *amount)?;
        }
        let ledger = Ledger::new(self.name.clone(), self.symbol.clone(), self.supply_ceiling, vault)?;
        tracing::info!(
            name = %self.name,
            symbol = %self.symbol,
            ceiling = %self.supply_ceiling,
            funded = self.backing.len(),
            "genesis applied"
        );
        Ok(ledger)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    state_path: PathBuf,
}

impl Settings {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Reads `PEG_STATE`, falling back to [`DEFAULT_STATE_PATH`].
    pub fn from_env() -> Self {
        match std::env::var("PEG_STATE") {
            Ok(path) => Self::new(path),
            Err(e) => {
                tracing::warn!("PEG_STATE not set ({e}), using {DEFAULT_STATE_PATH}");
                Self::new(DEFAULT_STATE_PATH)
            }
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserve::Reserve;
    use std::io::Write;

    #[test]
    fn genesis_defaults_and_build() {
        let alice = Address::derive("alice");
        let json = format!(r#"{{"name":"Wrapped","symbol":"WRP","backing":{{"{alice}":250}}}}"#);
        let genesis: Genesis = serde_json::from_str(&json).unwrap();
        assert_eq!(genesis.supply_ceiling, 0);

        let ledger = genesis.build().unwrap();
        assert_eq!(ledger.name(), "Wrapped");
        assert_eq!(ledger.reserve().holdings_of(&alice), 250);
        assert_eq!(ledger.reserve().held(), 0);
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn genesis_with_empty_symbol_fails() {
        let genesis = Genesis {
            name: "Wrapped".into(),
            symbol: String::new(),
            supply_ceiling: 0,
            backing: BTreeMap::new(),
        };
        assert!(matches!(
            genesis.build(),
            Err(ConfigError::Ledger(LedgerError::Validation { .. }))
        ));
    }

    #[test]
    fn settings_fall_back_to_default_state_path() {
        std::env::remove_var("PEG_STATE");
        let settings = Settings::from_env();
        assert_eq!(settings.state_path(), Path::new(DEFAULT_STATE_PATH));

        std::env::set_var("PEG_STATE", "custom-state.json");
        let settings = Settings::from_env();
        std::env::remove_var("PEG_STATE");
        assert_eq!(settings.state_path(), Path::new("custom-state.json"));
    }

    #[test]
    fn genesis_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let err = Genesis::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = file.path().with_extension("missing");
        assert!(matches!(Genesis::load(&missing), Err(ConfigError::Io { .. })));
    }
}
