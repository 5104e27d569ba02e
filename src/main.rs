use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use peg_ledger::{
    config::{ConfigError, Genesis, Settings},
    ledger::{Amount, Ledger, LedgerError, LedgerEvent},
    reserve::{Reserve, ReserveError, Vault},
    state::{self, StateError},
    Address,
};

#[derive(Parser)]
#[command(name = "peg", version, about = "Backed token ledger over a JSON state file")]
struct Cli {
    /// Ledger state file [default: $PEG_STATE or peg-state.json]
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new ledger from a genesis JSON file
    Init {
        #[arg(long)]
        genesis: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Credit external backing holdings to an account
    Fund {
        #[arg(value_parser = parse_account)]
        account: Address,
        amount: Amount,
    },
    /// Issue units against backing supplied by the caller
    Mint {
        #[arg(long, value_parser = parse_account)]
        caller: Address,
        #[arg(long, value_parser = parse_account)]
        to: Address,
        amount: Amount,
    },
    Transfer {
        #[arg(long, value_parser = parse_account)]
        caller: Address,
        #[arg(long, value_parser = parse_account)]
        to: Address,
        amount: Amount,
    },
    /// Move units out of another account under an allowance
    TransferFrom {
        #[arg(long, value_parser = parse_account)]
        caller: Address,
        #[arg(long, value_parser = parse_account)]
        from: Address,
        #[arg(long, value_parser = parse_account)]
        to: Address,
        amount: Amount,
    },
    Approve {
        #[arg(long, value_parser = parse_account)]
        caller: Address,
        #[arg(long, value_parser = parse_account)]
        spender: Address,
        amount: Amount,
    },
    /// Redeem units for backing
    Burn {
        #[arg(long, value_parser = parse_account)]
        caller: Address,
        #[arg(long, value_parser = parse_account)]
        from: Address,
        amount: Amount,
    },
    Balance {
        #[arg(value_parser = parse_account)]
        account: Address,
    },
    Allowance {
        #[arg(value_parser = parse_account)]
        owner: Address,
        #[arg(value_parser = parse_account)]
        spender: Address,
    },
    /// Token metadata, supply and state root
    Info,
    /// Print the event log
    Events {
        #[arg(long)]
        json: bool,
    },
    /// Re-check invariants and backing coverage
    Verify,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Reserve(#[from] ReserveError),
    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reserve holds {held} but supply is {supply}")]
    Unbacked { held: Amount, supply: Amount },
}

/// Hex address, `null`, or any other label hashed into an address.
fn parse_account(s: &str) -> Result<Address, String> {
    if s == "null" {
        return Ok(Address::NULL);
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        return s.parse().map_err(|e| format!("{e}"));
    }
    Ok(s.parse().unwrap_or_else(|_| Address::derive(s)))
}

fn describe(event: &LedgerEvent) -> String {
    match event {
        LedgerEvent::Transfer { from, to, amount } if from.is_null() => {
            format!("Mint     {to} +{amount}")
        }
        LedgerEvent::Transfer { from, to, amount } => {
            format!("Transfer {from} → {to} {amount}")
        }
        LedgerEvent::Approval {
            owner,
            spender,
            amount,
        } => format!("Approval {owner} → {spender} {amount}"),
        LedgerEvent::Burn {
            from,
            commanded_by,
            amount,
        } => format!("Burn     {from} -{amount} (by {commanded_by})"),
    }
}

/// Loads the state, applies one operation, and saves it back.
fn mutate(
    path: &Path,
    op: impl FnOnce(&mut Ledger<Vault>) -> Result<(), CliError>,
) -> Result<Ledger<Vault>, CliError> {
    let mut ledger = state::load(path)?;
    op(&mut ledger)?;
    state::save(path, &ledger)?;
    Ok(ledger)
}

fn print_last(ledger: &Ledger<Vault>) {
    if let Some(event) = ledger.events().last() {
        println!("{}", describe(event));
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = match cli.state {
        Some(path) => Settings::new(path),
        None => Settings::from_env(),
    };
    let path = settings.state_path();

    match cli.command {
        Command::Init { genesis, force } => {
            let ledger = Genesis::load(&genesis)?.build()?;
            state::create(path, &ledger, force)?;
            println!(
                "ledger {} ({}) initialised → {}",
                ledger.name(),
                ledger.symbol(),
                path.display()
            );
        }
        Command::Fund { account, amount } => {
            let ledger = mutate(path, |l| Ok(l.reserve_mut().fund(&account, amount)?))?;
            println!(
                "backing {account} → {}",
                ledger.reserve().holdings_of(&account)
            );
        }
        Command::Mint { caller, to, amount } => {
            let ledger = mutate(path, |l| Ok(l.mint(caller, to, amount)?))?;
            print_last(&ledger);
        }
        Command::Transfer { caller, to, amount } => {
            let ledger = mutate(path, |l| Ok(l.transfer(caller, to, amount)?))?;
            print_last(&ledger);
        }
        Command::TransferFrom {
            caller,
            from,
            to,
            amount,
        } => {
            let ledger = mutate(path, |l| Ok(l.transfer_from(caller, from, to, amount)?))?;
            print_last(&ledger);
        }
        Command::Approve {
            caller,
            spender,
            amount,
        } => {
            let ledger = mutate(path, |l| Ok(l.approve(caller, spender, amount)?))?;
            print_last(&ledger);
        }
        Command::Burn {
            caller,
            from,
            amount,
        } => {
            let ledger = mutate(path, |l| Ok(l.burn(caller, from, amount)?))?;
            print_last(&ledger);
        }
        Command::Balance { account } => {
            let ledger = state::load(path)?;
            println!("{} {}", ledger.balance_of(&account), ledger.symbol());
        }
        Command::Allowance { owner, spender } => {
            let ledger = state::load(path)?;
            println!("{}", ledger.allowance(&owner, &spender));
        }
        Command::Info => {
            let ledger = state::load(path)?;
            let ceiling = match ledger.supply_ceiling() {
                0 => "unbounded".to_string(),
                c => c.to_string(),
            };
            println!("name:      {}", ledger.name());
            println!("symbol:    {}", ledger.symbol());
            println!("decimals:  {}", ledger.decimals());
            println!("supply:    {}", ledger.total_supply());
            println!("ceiling:   {ceiling}");
            println!("backing:   {}", ledger.reserve().held());
            println!("events:    {}", ledger.events().len());
            println!("root:      {}", hex::encode(ledger.state_root()));
        }
        Command::Events { json } => {
            let ledger = state::load(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(ledger.events())?);
            } else {
                for (i, event) in ledger.events().iter().enumerate() {
                    println!("{i:>5}  {}", describe(event));
                }
            }
        }
        Command::Verify => {
            let ledger = state::load(path)?;
            let (held, supply) = (ledger.reserve().held(), ledger.total_supply());
            if held != supply {
                return Err(CliError::Unbacked { held, supply });
            }
            println!("ok root={}", hex::encode(ledger.state_root()));
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_arguments() {
        assert_eq!(parse_account("null").unwrap(), Address::NULL);
        assert_eq!(parse_account("alice").unwrap(), Address::derive("alice"));
        let hex = "0x00000000000000000000000000000000000000aa";
        assert_eq!(parse_account(hex).unwrap().to_string(), hex);
        assert!(parse_account("0x1234").is_err());
    }

    #[test]
    fn cli_parses_delegated_transfer() {
        let cli = Cli::try_parse_from([
            "peg", "--state", "s.json", "transfer-from", "--caller", "carol", "--from", "alice",
            "--to", "dave", "10",
        ])
        .unwrap();
        assert_eq!(cli.state.as_deref(), Some(Path::new("s.json")));
        match cli.command {
            Command::TransferFrom {
                caller,
                from,
                to,
                amount,
            } => {
                assert_eq!(caller, Address::derive("carol"));
                assert_eq!(from, Address::derive("alice"));
                assert_eq!(to, Address::derive("dave"));
                assert_eq!(amount, 10);
            }
            _ => panic!("expected transfer-from"),
        }
    }

    #[test]
    fn end_to_end_over_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let genesis_path = dir.path().join("genesis.json");
        let alice = Address::derive("alice");
        std::fs::write(
            &genesis_path,
            format!(r#"{{"name":"Token","symbol":"TKN","supply_ceiling":1000,"backing":{{"{alice}":500}}}}"#),
        )
        .unwrap();

        let state = state_path.to_str().unwrap();
        let genesis = genesis_path.to_str().unwrap();
        let exec = |args: &[&str]| {
            let mut argv = vec!["peg", "--state", state];
            argv.extend_from_slice(args);
            run(Cli::try_parse_from(argv).unwrap())
        };

        exec(&["init", "--genesis", genesis]).unwrap();
        exec(&["mint", "--caller", "alice", "--to", "alice", "200"]).unwrap();
        exec(&["transfer", "--caller", "alice", "--to", "bob", "50"]).unwrap();
        exec(&["burn", "--caller", "alice", "--from", "alice", "25"]).unwrap();
        exec(&["verify"]).unwrap();
        assert!(matches!(
            exec(&["transfer", "--caller", "alice", "--to", "alice", "1"]),
            Err(CliError::Ledger(LedgerError::InvalidRecipient { .. }))
        ));
        assert!(matches!(
            exec(&["init", "--genesis", genesis]),
            Err(CliError::State(StateError::Exists(_)))
        ));

        let ledger = state::load(&state_path).unwrap();
        assert_eq!(ledger.balance_of(&alice), 125);
        assert_eq!(ledger.balance_of(&Address::derive("bob")), 50);
        assert_eq!(ledger.total_supply(), 175);
        assert_eq!(ledger.reserve().holdings_of(&alice), 325);
        assert_eq!(ledger.events().len(), 3);
    }
}
