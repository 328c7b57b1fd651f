//! In-process ledger
//!
//! `SimulatedLedger` runs a `Bank` behind the `LedgerClient` interface.
//! Slots advance with wall-clock time, so a landed transaction moves from
//! processed to confirmed to finalized as slots are built on top of it.
//! Tests can stop slot production, move the clock forward, or drop the next
//! request or response to exercise the workflow's failure handling.

use crate::crypto::{Hash, Keypair, Pubkey, Signature};
use crate::ledger::account::{Account, Rent, LAMPORTS_PER_SOL};
use crate::ledger::bank::{Bank, DEFAULT_BLOCKHASH_VALIDITY_SLOTS, DEFAULT_LAMPORTS_PER_SIGNATURE};
use crate::ledger::client::{ClientError, Commitment, LedgerClient, SendOptions, SignatureStatus};
use crate::ledger::runtime::Clock;
use crate::ledger::system::{self, SystemProgram};
use crate::ledger::transaction::{Message, Transaction};
use crate::multisig::pda::get_program_config_pda;
use crate::multisig::{self, AccountState, MultisigProgram, ProgramConfig};
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Lamports held by the faucet at genesis
const FAUCET_LAMPORTS: u64 = 1_000_000_000 * LAMPORTS_PER_SOL;

/// Simulated ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Wall-clock length of a slot
    pub slot_duration: Duration,
    /// Slots on top of a transaction before it counts as confirmed
    pub confirmation_depth: u64,
    /// Slots on top of a transaction before it counts as finalized
    pub finalization_depth: u64,
    pub lamports_per_signature: u64,
    /// Largest single airdrop the faucet will send
    pub max_airdrop_lamports: u64,
    pub blockhash_validity_slots: u64,
    /// Fee charged by the multisig program for every multisig created
    pub multisig_creation_fee: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            slot_duration: Duration::from_millis(400),
            confirmation_depth: 1,
            finalization_depth: 32,
            lamports_per_signature: DEFAULT_LAMPORTS_PER_SIGNATURE,
            max_airdrop_lamports: 5 * LAMPORTS_PER_SOL,
            blockhash_validity_slots: DEFAULT_BLOCKHASH_VALIDITY_SLOTS,
            multisig_creation_fee: 0,
        }
    }
}

/// A one-shot failure injected into the next client call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request never reaches the ledger
    DropRequest,
    /// The request is handled but the reply is lost
    DropResponse,
}

#[derive(Debug, Default)]
struct ClockControl {
    /// Slot the ledger stopped at, while halted
    halted_at: Option<u64>,
    /// Slots skipped over while halted
    paused_slots: u64,
    /// Seconds added to the ledger's unix time
    time_offset: i64,
}

/// In-process ledger implementing `LedgerClient`
pub struct SimulatedLedger {
    config: LedgerConfig,
    bank: RwLock<Bank>,
    faucet: Keypair,
    treasury: Pubkey,
    genesis: Instant,
    genesis_unix: i64,
    clock: Mutex<ClockControl>,
    faults: Mutex<VecDeque<Fault>>,
    airdrop_nonce: AtomicU64,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedLedger {
    /// Create a ledger with the system and multisig programs deployed
    pub fn new(config: LedgerConfig) -> Self {
        let rent = Rent::default();
        let mut bank = Bank::new(
            rent,
            config.lamports_per_signature,
            config.blockhash_validity_slots,
        );
        bank.add_program(Arc::new(SystemProgram));
        bank.add_program(Arc::new(MultisigProgram));

        let faucet = Keypair::generate();
        bank.set_account(faucet.pubkey(), Account::system(FAUCET_LAMPORTS));

        let treasury = Keypair::generate().pubkey();
        let program_config = ProgramConfig {
            authority: faucet.pubkey(),
            multisig_creation_fee: config.multisig_creation_fee,
            treasury,
        };
        let data = program_config.to_account_data();
        bank.set_account(
            get_program_config_pda(),
            Account::new(rent.minimum_balance(data.len()), data, multisig::ID),
        );

        info!(
            "Simulated ledger started: slot {}ms, treasury {}",
            config.slot_duration.as_millis(),
            treasury
        );

        Self {
            config,
            bank: RwLock::new(bank),
            faucet,
            treasury,
            genesis: Instant::now(),
            genesis_unix: chrono::Utc::now().timestamp(),
            clock: Mutex::new(ClockControl::default()),
            faults: Mutex::new(VecDeque::new()),
            airdrop_nonce: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Receiver of multisig creation fees
    pub fn treasury(&self) -> Pubkey {
        self.treasury
    }

    pub fn faucet(&self) -> Pubkey {
        self.faucet.pubkey()
    }

    fn wall_clock_slot(&self) -> u64 {
        let slot_ms = self.config.slot_duration.as_millis().max(1);
        (self.genesis.elapsed().as_millis() / slot_ms) as u64
    }

    pub fn current_slot(&self) -> u64 {
        let control = locked(&self.clock);
        match control.halted_at {
            Some(slot) => slot,
            None => self.wall_clock_slot().saturating_sub(control.paused_slots),
        }
    }

    pub fn clock(&self) -> Clock {
        let offset = locked(&self.clock).time_offset;
        Clock {
            slot: self.current_slot(),
            unix_timestamp: self.genesis_unix + self.genesis.elapsed().as_secs() as i64 + offset,
        }
    }

    /// Stop producing slots; landed transactions stop gaining confirmations
    pub fn halt(&self) {
        let slot = self.current_slot();
        let mut control = locked(&self.clock);
        if control.halted_at.is_none() {
            control.halted_at = Some(slot);
            info!("Ledger halted at slot {}", slot);
        }
    }

    /// Resume slot production from where it stopped
    pub fn resume(&self) {
        let wall = self.wall_clock_slot();
        let mut control = locked(&self.clock);
        if let Some(slot) = control.halted_at.take() {
            control.paused_slots = wall.saturating_sub(slot);
            info!("Ledger resumed at slot {}", slot);
        }
    }

    /// Move the ledger's unix time forward
    pub fn warp_clock(&self, seconds: i64) {
        locked(&self.clock).time_offset += seconds;
    }

    /// Fail the next client call
    pub fn inject_fault(&self, fault: Fault) {
        locked(&self.faults).push_back(fault);
    }

    fn next_fault(&self) -> Option<Fault> {
        locked(&self.faults).pop_front()
    }

    /// Apply any pending fault around one client call
    async fn with_faults<T, F>(&self, method: &str, call: F) -> Result<T, ClientError>
    where
        F: std::future::Future<Output = Result<T, ClientError>>,
    {
        match self.next_fault() {
            Some(Fault::DropRequest) => {
                debug!("Dropping {} request", method);
                Err(ClientError::Network(format!("{} request dropped", method)))
            }
            Some(Fault::DropResponse) => {
                let _ = call.await;
                debug!("Dropping {} response", method);
                Err(ClientError::Network(format!("{} response dropped", method)))
            }
            None => call.await,
        }
    }

    async fn airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, ClientError> {
        if lamports > self.config.max_airdrop_lamports {
            return Err(ClientError::Airdrop(format!(
                "requested {} lamports, faucet limit is {}",
                lamports, self.config.max_airdrop_lamports
            )));
        }

        let clock = self.clock();
        let mut bank = self.bank.write().await;
        let blockhash = bank.latest_blockhash(clock.slot);
        // Self-transfer of a running nonce keeps identical airdrops in one slot distinct
        let nonce = self.airdrop_nonce.fetch_add(1, Ordering::Relaxed);
        let faucet = self.faucet.pubkey();
        let message = Message::new(
            faucet,
            blockhash,
            vec![
                system::transfer(&faucet, to, lamports),
                system::transfer(&faucet, &faucet, nonce),
            ],
        );
        let tx = Transaction::new(message, &[&self.faucet])?;
        bank.process_transaction(&tx, clock)
            .map_err(|e| ClientError::Airdrop(e.to_string()))?;

        info!("Airdropped {} lamports to {}", lamports, to);
        Ok(tx.signature())
    }

    async fn send(&self, tx: &Transaction, options: SendOptions) -> Result<Signature, ClientError> {
        let signature = tx.signature();
        let clock = self.clock();
        let mut bank = self.bank.write().await;

        if !options.skip_preflight {
            let (result, logs) = bank.simulate_transaction(tx, clock);
            if let Err(err) = result {
                for line in logs {
                    debug!("  {}", line);
                }
                debug!("Preflight failed for {}: {}", signature, err);
                return Err(ClientError::Transaction(err));
            }
        }

        let landed_before = bank.processed(&signature).is_some();
        match bank.process_transaction(tx, clock) {
            Ok(()) => {
                debug!("Transaction {} landed in slot {}", signature, clock.slot);
                Ok(signature)
            }
            // Landed but failed: reported through the signature status
            Err(err) if !landed_before && bank.processed(&signature).is_some() => {
                debug!("Transaction {} failed on ledger: {}", signature, err);
                Ok(signature)
            }
            Err(err) => Err(ClientError::Transaction(err)),
        }
    }

    async fn status(&self, signature: &Signature) -> Option<SignatureStatus> {
        let current = self.current_slot();
        let bank = self.bank.read().await;
        let processed = bank.processed(signature)?;
        let depth = current.saturating_sub(processed.slot);

        let (confirmation_status, confirmations) = if depth >= self.config.finalization_depth {
            (Commitment::Finalized, None)
        } else if depth >= self.config.confirmation_depth {
            (Commitment::Confirmed, Some(depth))
        } else {
            (Commitment::Processed, Some(depth))
        };

        Some(SignatureStatus {
            slot: processed.slot,
            confirmations,
            confirmation_status,
            err: processed.result.clone().err(),
        })
    }
}

impl LedgerClient for SimulatedLedger {
    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, ClientError> {
        self.with_faults("requestAirdrop", self.airdrop(to, lamports))
            .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ClientError> {
        self.with_faults("getLatestBlockhash", async {
            let slot = self.current_slot();
            Ok(self.bank.write().await.latest_blockhash(slot))
        })
        .await
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClientError> {
        self.with_faults("sendTransaction", self.send(tx, options))
            .await
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        self.with_faults("getSignatureStatus", async { Ok(self.status(signature).await) })
            .await
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError> {
        self.with_faults("getAccount", async {
            Ok(self.bank.read().await.get_account(address).cloned())
        })
        .await
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        self.with_faults("getSlot", async { Ok(self.current_slot()) })
            .await
    }
}
