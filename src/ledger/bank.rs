//! Account store and transaction processor
//!
//! The bank owns all account state. Transactions are sanitized (signatures,
//! blockhash, duplicate check, fee) and then executed atomically: if any
//! instruction fails, every account change except the fee is rolled back.

use crate::crypto::{hashv, Hash, Pubkey, Signature};
use crate::ledger::account::{Account, Rent};
use crate::ledger::runtime::{Clock, InvokeContext, Program};
use crate::ledger::transaction::{Transaction, TransactionError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Default fee charged per required signature
pub const DEFAULT_LAMPORTS_PER_SIGNATURE: u64 = 5000;

/// Default number of slots a blockhash stays usable
pub const DEFAULT_BLOCKHASH_VALIDITY_SLOTS: u64 = 150;

/// Record of a transaction that landed on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTransaction {
    /// Slot the transaction landed in
    pub slot: u64,
    /// Blockhash the transaction was signed over
    pub blockhash: Hash,
    /// Execution result; failed transactions still land and pay their fee
    pub result: Result<(), TransactionError>,
    pub fee: u64,
    pub logs: Vec<String>,
}

/// The ledger state machine
#[derive(Clone)]
pub struct Bank {
    accounts: HashMap<Pubkey, Account>,
    programs: Vec<Arc<dyn Program>>,
    processed: HashMap<Signature, ProcessedTransaction>,
    /// Issued blockhashes and the slot they were issued at
    blockhashes: HashMap<Hash, u64>,
    rent: Rent,
    lamports_per_signature: u64,
    blockhash_validity_slots: u64,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new(
            Rent::default(),
            DEFAULT_LAMPORTS_PER_SIGNATURE,
            DEFAULT_BLOCKHASH_VALIDITY_SLOTS,
        )
    }
}

impl Bank {
    pub fn new(rent: Rent, lamports_per_signature: u64, blockhash_validity_slots: u64) -> Self {
        Self {
            accounts: HashMap::new(),
            programs: Vec::new(),
            processed: HashMap::new(),
            blockhashes: HashMap::new(),
            rent,
            lamports_per_signature,
            blockhash_validity_slots,
        }
    }

    /// Register a program
    pub fn add_program(&mut self, program: Arc<dyn Program>) {
        log::debug!("Loaded program {} at {}", program.name(), program.id());
        self.programs.retain(|p| p.id() != program.id());
        self.programs.push(program);
    }

    pub fn rent(&self) -> Rent {
        self.rent
    }

    pub fn lamports_per_signature(&self) -> u64 {
        self.lamports_per_signature
    }

    pub fn set_account(&mut self, key: Pubkey, account: Account) {
        self.accounts.insert(key, account);
    }

    pub fn get_account(&self, key: &Pubkey) -> Option<&Account> {
        self.accounts.get(key)
    }

    pub fn balance(&self, key: &Pubkey) -> u64 {
        self.accounts.get(key).map(|a| a.lamports).unwrap_or(0)
    }

    /// Issue the blockhash for a slot
    pub fn latest_blockhash(&mut self, slot: u64) -> Hash {
        let hash = Hash::new(hashv(&[b"blockhash", &slot.to_le_bytes()]));
        self.blockhashes.entry(hash).or_insert(slot);

        // Forget blockhashes that can never be used again, and the
        // transactions signed over them, which can no longer be replayed
        let validity = self.blockhash_validity_slots;
        self.blockhashes
            .retain(|_, issued| slot.saturating_sub(*issued) <= validity);
        let live = &self.blockhashes;
        self.processed
            .retain(|_, landed| live.contains_key(&landed.blockhash));
        hash
    }

    fn is_blockhash_valid(&self, hash: &Hash, slot: u64) -> bool {
        self.blockhashes
            .get(hash)
            .map_or(false, |issued| slot.saturating_sub(*issued) <= self.blockhash_validity_slots)
    }

    /// Landed transaction by signature
    pub fn processed(&self, signature: &Signature) -> Option<&ProcessedTransaction> {
        self.processed.get(signature)
    }

    /// Sanitize, charge and execute a transaction
    ///
    /// Returns `Err` both for transactions rejected before landing and for
    /// transactions that landed but failed; use [`Bank::processed`] to tell
    /// the two apart.
    pub fn process_transaction(
        &mut self,
        tx: &Transaction,
        clock: Clock,
    ) -> Result<(), TransactionError> {
        let signature = tx.signature();
        if tx.message.instructions.is_empty() {
            return Err(TransactionError::EmptyTransaction);
        }
        if self.processed.contains_key(&signature) {
            return Err(TransactionError::AlreadyProcessed);
        }
        tx.verify()?;
        if !self.is_blockhash_valid(&tx.message.recent_blockhash, clock.slot) {
            return Err(TransactionError::BlockhashNotFound);
        }

        let payer = tx.message.payer;
        let fee = self.lamports_per_signature * tx.signatures.len() as u64;
        match self.accounts.get_mut(&payer) {
            Some(account) if account.lamports >= fee => account.lamports -= fee,
            _ => return Err(TransactionError::InsufficientFundsForFee(payer)),
        }

        let snapshot = self.accounts.clone();
        let signers: HashSet<Pubkey> = tx.message.signer_keys().into_iter().collect();
        let mut logs = Vec::new();
        let mut result = Ok(());

        for (index, instruction) in tx.message.instructions.iter().enumerate() {
            let mut ctx = InvokeContext::new(
                &mut self.accounts,
                &self.programs,
                &mut logs,
                signers.clone(),
                clock,
                self.rent,
            );
            if let Err(error) = ctx.process_instruction(instruction) {
                result = Err(TransactionError::InstructionError {
                    index: index as u8,
                    error,
                });
                break;
            }
        }

        if result.is_err() {
            self.accounts = snapshot;
        }

        log::debug!(
            "Transaction {} landed in slot {}: {:?}",
            signature,
            clock.slot,
            result
        );
        self.processed.insert(
            signature,
            ProcessedTransaction {
                slot: clock.slot,
                blockhash: tx.message.recent_blockhash,
                result: result.clone(),
                fee,
                logs,
            },
        );

        result
    }

    /// Run a transaction against a scratch copy of the bank
    pub fn simulate_transaction(
        &self,
        tx: &Transaction,
        clock: Clock,
    ) -> (Result<(), TransactionError>, Vec<String>) {
        let mut scratch = self.clone();
        let result = scratch.process_transaction(tx, clock);
        let logs = scratch
            .processed
            .get(&tx.signature())
            .map(|p| p.logs.clone())
            .unwrap_or_default();
        (result, logs)
    }
}
