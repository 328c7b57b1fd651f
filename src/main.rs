//! Squads quickstart CLI
//!
//! Runs the multisig workflow against an in-process ledger or a ledger server.

use clap::{Parser, Subcommand};
use squads_quickstart::cli::{self, CliResult, DEFAULT_SERVER_ADDR};
use squads_quickstart::crypto::{Keypair, Pubkey};
use squads_quickstart::ledger::{Commitment, LAMPORTS_PER_SOL};
use squads_quickstart::workflow::{Endpoint, QuickstartParams, WorkflowConfig, ENDPOINT_ENV};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "squads")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(
    about = "Approval-gated multisig transactions on a simulated ledger",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a ledger server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8899")]
        port: u16,

        /// Slot duration in milliseconds
        #[arg(long, default_value = "400")]
        slot_ms: u64,
    },

    /// Create a 2-of-2 multisig, propose a vault transfer, approve and execute it
    Quickstart {
        /// Ledger endpoint: "local" or host:port
        #[arg(short, long, env = ENDPOINT_ENV, default_value = "local")]
        endpoint: Endpoint,

        /// SOL the proposal transfers out of the vault
        #[arg(short, long, default_value = "0.1")]
        amount: f64,

        /// SOL moved into the vault before proposing
        #[arg(short, long, default_value = "0.5")]
        fund: f64,

        /// Creator secret key (hex); a fresh one is generated if unset
        #[arg(long)]
        secret: Option<String>,

        /// Commitment each step waits for
        #[arg(long, default_value = "confirmed")]
        commitment: Commitment,

        /// Seconds to wait for each confirmation
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Submit without preflight simulation
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Read registry accounts
    Inspect {
        /// Ledger server address (host:port)
        #[arg(short, long, env = ENDPOINT_ENV, default_value = DEFAULT_SERVER_ADDR, global = true)]
        endpoint: Endpoint,

        #[command(subcommand)]
        action: InspectCommands,
    },

    /// Generate a new keypair
    Keygen,
}

#[derive(Subcommand)]
enum InspectCommands {
    /// Show a multisig and its members
    Multisig {
        #[arg(short, long)]
        address: Pubkey,
    },

    /// Show a proposal and its votes
    Proposal {
        #[arg(short, long)]
        multisig: Pubkey,

        /// Transaction index
        #[arg(short, long)]
        index: u64,
    },

    /// Show the lamport balance of an address
    Balance {
        #[arg(short, long)]
        address: Pubkey,
    },

    /// Show the registry settings
    Config,
}

fn to_lamports(sol: f64) -> Result<u64, String> {
    if !sol.is_finite() || sol < 0.0 {
        return Err(format!("invalid SOL amount: {}", sol));
    }
    Ok((sol * LAMPORTS_PER_SOL as f64).round() as u64)
}

fn main() -> CliResult<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => cli::cmd_keygen(),
        command => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(command))
        }
    }
}

async fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Keygen => cli::cmd_keygen(),

        Commands::Serve { port, slot_ms } => cli::cmd_serve(port, slot_ms).await,

        Commands::Quickstart {
            endpoint,
            amount,
            fund,
            secret,
            commitment,
            timeout,
            skip_preflight,
        } => {
            let creator = secret
                .as_deref()
                .map(Keypair::from_secret_hex)
                .transpose()?;
            let transfer_lamports = to_lamports(amount)?;
            let params = QuickstartParams {
                transfer_lamports,
                vault_funding: to_lamports(fund)?,
                memo: Some(format!("Transfer {} SOL to creator", amount)),
                ..QuickstartParams::default()
            };
            let config = WorkflowConfig {
                endpoint,
                commitment,
                confirm_timeout: Duration::from_secs(timeout),
                skip_preflight,
                ..WorkflowConfig::default()
            };
            cli::cmd_quickstart(config, params, creator).await
        }

        Commands::Inspect { endpoint, action } => match action {
            InspectCommands::Multisig { address } => {
                cli::cmd_inspect_multisig(&endpoint, &address).await
            }
            InspectCommands::Proposal { multisig, index } => {
                cli::cmd_inspect_proposal(&endpoint, &multisig, index).await
            }
            InspectCommands::Balance { address } => cli::cmd_balance(&endpoint, &address).await,
            InspectCommands::Config => cli::cmd_program_config(&endpoint).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_defaults_to_the_local_server() {
        let cli = Cli::try_parse_from(["squads", "inspect", "config"]).unwrap();
        let Commands::Inspect { endpoint, .. } = cli.command else {
            panic!("expected inspect");
        };
        if std::env::var(ENDPOINT_ENV).is_err() {
            assert_eq!(endpoint, Endpoint::Remote(DEFAULT_SERVER_ADDR.to_string()));
        }
    }

    #[test]
    fn test_keygen_runs_without_a_runtime() {
        let cli = Cli::try_parse_from(["squads", "keygen"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen));
    }

    #[test]
    fn test_sol_amounts() {
        assert_eq!(to_lamports(0.1), Ok(LAMPORTS_PER_SOL / 10));
        assert!(to_lamports(-1.0).is_err());
        assert!(to_lamports(f64::NAN).is_err());
    }
}
