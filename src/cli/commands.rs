//! CLI commands for the multisig workflow
//!
//! Implements all command handlers for the CLI interface.

use crate::crypto::{Hash, Keypair, Pubkey, Signature};
use crate::ledger::{
    Account, ClientError, LedgerClient, LedgerConfig, SendOptions, SignatureStatus,
    SimulatedLedger, Transaction, LAMPORTS_PER_SOL,
};
use crate::multisig::accounts::{fetch_multisig, fetch_program_config, fetch_proposal};
use crate::multisig::pda::get_vault_pda;
use crate::multisig::{Multisig, Permissions, ProposalStatus};
use crate::network::{LedgerServer, RemoteLedger};
use crate::workflow::{
    run_quickstart, Endpoint, QuickstartParams, QuickstartReport, Workflow, WorkflowConfig,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Timeout of a single call to a remote ledger
const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where `squads serve` listens by default
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8899";

/// The ledger a command talks to
pub enum LedgerConnection {
    Local(SimulatedLedger),
    Remote(RemoteLedger),
}

impl LedgerConnection {
    pub fn open(endpoint: &Endpoint) -> Self {
        match endpoint {
            Endpoint::Local => {
                LedgerConnection::Local(SimulatedLedger::new(LedgerConfig::default()))
            }
            Endpoint::Remote(addr) => {
                LedgerConnection::Remote(RemoteLedger::new(addr.clone(), REMOTE_CALL_TIMEOUT))
            }
        }
    }
}

/// Connection for read-only commands, which need a ledger that outlives them
fn open_server(endpoint: &Endpoint) -> CliResult<RemoteLedger> {
    match endpoint {
        Endpoint::Remote(addr) => Ok(RemoteLedger::new(addr.clone(), REMOTE_CALL_TIMEOUT)),
        Endpoint::Local => Err(format!(
            "a local ledger starts empty; point --endpoint at a running `squads serve` \
             (e.g. {})",
            DEFAULT_SERVER_ADDR
        )
        .into()),
    }
}

impl LedgerClient for LedgerConnection {
    async fn request_airdrop(
        &self,
        to: &Pubkey,
        lamports: u64,
    ) -> Result<Signature, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.request_airdrop(to, lamports).await,
            LedgerConnection::Remote(ledger) => ledger.request_airdrop(to, lamports).await,
        }
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.get_latest_blockhash().await,
            LedgerConnection::Remote(ledger) => ledger.get_latest_blockhash().await,
        }
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.send_transaction(tx, options).await,
            LedgerConnection::Remote(ledger) => ledger.send_transaction(tx, options).await,
        }
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.get_signature_status(signature).await,
            LedgerConnection::Remote(ledger) => ledger.get_signature_status(signature).await,
        }
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.get_account(address).await,
            LedgerConnection::Remote(ledger) => ledger.get_account(address).await,
        }
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        match self {
            LedgerConnection::Local(ledger) => ledger.get_slot().await,
            LedgerConnection::Remote(ledger) => ledger.get_slot().await,
        }
    }
}

fn sol(lamports: u64) -> String {
    format!("{:.4} SOL", lamports as f64 / LAMPORTS_PER_SOL as f64)
}

fn format_timestamp(unix: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix.to_string())
}

fn permission_names(permissions: Permissions) -> String {
    let names: Vec<&str> = permissions.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(" | ")
    }
}

/// Run a ledger server until Ctrl+C
pub async fn cmd_serve(port: u16, slot_ms: u64) -> CliResult<()> {
    let config = LedgerConfig {
        slot_duration: Duration::from_millis(slot_ms.max(1)),
        ..LedgerConfig::default()
    };
    let ledger = Arc::new(SimulatedLedger::new(config));
    let server = LedgerServer::bind(&format!("0.0.0.0:{}", port), ledger.clone()).await?;

    println!("🌐 Ledger server listening on {}", server.local_addr()?);
    println!("   ├─ Slot time: {}ms", slot_ms);
    println!("   ├─ Faucet: {}", ledger.faucet());
    println!("   └─ Treasury: {}", ledger.treasury());
    println!("\n   Run the workflow against it with:");
    println!("   squads quickstart --endpoint 127.0.0.1:{}", port);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n📴 Shutting down ledger server...");
        }
    }
    Ok(())
}

/// Run the full quickstart scenario and print what happened
pub async fn cmd_quickstart(
    config: WorkflowConfig,
    params: QuickstartParams,
    creator: Option<Keypair>,
) -> CliResult<()> {
    let connection = LedgerConnection::open(&config.endpoint);
    let creator = creator.unwrap_or_else(Keypair::generate);

    println!("🚀 Running multisig quickstart against {}", config.endpoint);
    println!("   Creator: {}", creator.pubkey());

    let workflow = Workflow::new(connection, creator, config);
    match run_quickstart(&workflow, &params).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            println!("❌ {}", err);
            if let Some(multisig) = err.context().multisig {
                println!("   Multisig: {}", multisig);
            }
            if let Some(signature) = err.unconfirmed_signature() {
                println!("   ⚠️  Outcome unknown; check signature {}", signature);
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &QuickstartReport) {
    println!("\n✅ Airdrop confirmed: {}", report.airdrop_signature);
    println!("🔐 Multisig created: {}", report.multisig);
    println!("   ├─ Signature: {}", report.create_signature);
    println!("   ├─ Vault: {}", report.vault);
    println!("   └─ Second member: {}", report.second_member);
    println!(
        "📝 Transfer proposed: index {} → {}",
        report.transaction_index, report.destination
    );
    for vote in &report.votes {
        match &vote.tally {
            Some(tally) => println!(
                "🗳️  {} voted {}: {} ({} approvals)",
                vote.voter, vote.decision, tally.status, tally.approvals
            ),
            None => println!(
                "🗳️  {} voted {}: {} (proposal not read back)",
                vote.voter, vote.decision, vote.signature
            ),
        }
    }
    println!("⚡ Transaction executed: {}", report.execute_signature);
    println!("   Final status: {}", report.final_status);
    println!(
        "\n💰 Vault: {} → {}",
        sol(report.vault_balance_before),
        sol(report.vault_balance_after)
    );
    println!(
        "💰 Destination: {} → {}",
        sol(report.destination_balance_before),
        sol(report.destination_balance_after)
    );
}

/// Show a multisig account
pub async fn cmd_inspect_multisig(endpoint: &Endpoint, address: &Pubkey) -> CliResult<()> {
    let connection = open_server(endpoint)?;
    let multisig = fetch_multisig(&connection, address).await?;
    let vault = get_vault_pda(address, 0);
    let vault_balance = connection.get_balance(&vault).await?;

    println!("🔐 Multisig {}", address);
    println!(
        "   ├─ Threshold: {} of {} voters",
        multisig.threshold,
        Multisig::num_voters(&multisig.members)
    );
    println!("   ├─ Time lock: {}s", multisig.time_lock);
    println!("   ├─ Transaction index: {}", multisig.transaction_index);
    println!("   ├─ Create key: {}", multisig.create_key);
    if let Some(authority) = &multisig.config_authority {
        println!("   ├─ Config authority: {}", authority);
    }
    println!("   ├─ Vault 0: {} ({})", vault, sol(vault_balance));
    println!("   └─ Members:");
    for member in &multisig.members {
        println!(
            "      └─ {} [{}]",
            member.key,
            permission_names(member.permissions)
        );
    }
    Ok(())
}

/// Show a proposal and its votes
pub async fn cmd_inspect_proposal(
    endpoint: &Endpoint,
    multisig: &Pubkey,
    transaction_index: u64,
) -> CliResult<()> {
    let connection = open_server(endpoint)?;
    let proposal = fetch_proposal(&connection, multisig, transaction_index).await?;

    let symbol = match proposal.status {
        ProposalStatus::Executed { .. } => "✅",
        ProposalStatus::Approved { .. } => "👍",
        ProposalStatus::Rejected { .. } => "❌",
        ProposalStatus::Active { .. } | ProposalStatus::Draft { .. } => "⏳",
    };
    println!("{} Proposal #{} of {}", symbol, transaction_index, multisig);
    println!(
        "   ├─ Status: {} since {}{}",
        proposal.status,
        format_timestamp(proposal.status.timestamp()),
        if proposal.status.is_terminal() { " (final)" } else { "" }
    );
    println!(
        "   ├─ Approvals: {}, rejections: {}",
        proposal.approvals(),
        proposal.rejections()
    );
    println!("   └─ Votes:");
    for (voter, vote) in &proposal.votes {
        println!("      └─ {} {}", voter, vote);
    }
    Ok(())
}

/// Show the lamport balance of an address
pub async fn cmd_balance(endpoint: &Endpoint, address: &Pubkey) -> CliResult<()> {
    let connection = open_server(endpoint)?;
    let lamports = connection.get_balance(address).await?;
    println!("💰 Balance for {}", address);
    println!("   {} lamports ({})", lamports, sol(lamports));
    Ok(())
}

/// Show the registry settings
pub async fn cmd_program_config(endpoint: &Endpoint) -> CliResult<()> {
    let connection = open_server(endpoint)?;
    let config = fetch_program_config(&connection).await?;
    println!("⚙️  Program config");
    println!("   ├─ Authority: {}", config.authority);
    println!("   ├─ Treasury: {}", config.treasury);
    println!(
        "   └─ Creation fee: {} lamports",
        config.multisig_creation_fee
    );
    Ok(())
}

/// Generate a new identity
pub fn cmd_keygen() -> CliResult<()> {
    let keypair = Keypair::generate();
    println!("🔐 New keypair generated!");
    println!("   📍 Public key: {}", keypair.pubkey());
    println!("   🔑 Secret key: {}", keypair.secret_hex());
    println!("\n   ⚠️  Pass the secret key with --secret to use it as the creator.");
    Ok(())
}
