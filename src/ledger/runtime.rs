//! Program execution runtime
//!
//! Programs are plugged into the bank behind the `Program` trait. While an
//! instruction runs, the program sees the ledger through an `InvokeContext`,
//! which enforces signer and ownership rules and lets programs call each other.

use crate::crypto::Pubkey;
use crate::ledger::account::{Account, Rent};
use crate::ledger::instruction::{Instruction, InstructionError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Maximum nesting of cross-program invocations
pub const MAX_INVOKE_DEPTH: usize = 4;

/// An on-ledger program
pub trait Program: Send + Sync {
    /// Address the program is deployed at
    fn id(&self) -> Pubkey;

    /// Short name used in transaction logs
    fn name(&self) -> &'static str;

    /// Process a single instruction addressed to this program
    fn process(
        &self,
        ctx: &mut InvokeContext<'_>,
        instruction: &Instruction,
    ) -> Result<(), InstructionError>;
}

/// Ledger time as seen by programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    pub slot: u64,
    pub unix_timestamp: i64,
}

/// Execution context for one top-level instruction
pub struct InvokeContext<'a> {
    accounts: &'a mut HashMap<Pubkey, Account>,
    programs: &'a [Arc<dyn Program>],
    logs: &'a mut Vec<String>,
    signers: HashSet<Pubkey>,
    program_id: Pubkey,
    depth: usize,
    clock: Clock,
    rent: Rent,
}

impl<'a> InvokeContext<'a> {
    pub fn new(
        accounts: &'a mut HashMap<Pubkey, Account>,
        programs: &'a [Arc<dyn Program>],
        logs: &'a mut Vec<String>,
        signers: HashSet<Pubkey>,
        clock: Clock,
        rent: Rent,
    ) -> Self {
        Self {
            accounts,
            programs,
            logs,
            signers,
            program_id: Pubkey::default(),
            depth: 0,
            clock,
            rent,
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn rent(&self) -> Rent {
        self.rent
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(format!("Program log: {}", message.into()));
    }

    pub fn is_signer(&self, key: &Pubkey) -> bool {
        self.signers.contains(key)
    }

    pub fn require_signer(&self, key: &Pubkey) -> Result<(), InstructionError> {
        if self.is_signer(key) {
            Ok(())
        } else {
            Err(InstructionError::MissingRequiredSignature(*key))
        }
    }

    pub fn get_account(&self, key: &Pubkey) -> Option<&Account> {
        self.accounts.get(key)
    }

    pub fn lamports(&self, key: &Pubkey) -> u64 {
        self.accounts.get(key).map(|a| a.lamports).unwrap_or(0)
    }

    /// Replace the data of an account owned by the executing program
    pub fn set_data(&mut self, key: &Pubkey, data: Vec<u8>) -> Result<(), InstructionError> {
        let program_id = self.program_id;
        let account = self
            .accounts
            .get_mut(key)
            .ok_or(InstructionError::UninitializedAccount(*key))?;
        if account.owner != program_id {
            return Err(InstructionError::InvalidAccountOwner(*key));
        }
        account.data = data;
        Ok(())
    }

    /// Move lamports out of an account owned by the executing program
    pub fn debit(&mut self, key: &Pubkey, lamports: u64) -> Result<(), InstructionError> {
        let program_id = self.program_id;
        let account = self
            .accounts
            .get_mut(key)
            .ok_or(InstructionError::InsufficientFunds {
                account: *key,
                have: 0,
                need: lamports,
            })?;
        if account.owner != program_id {
            return Err(InstructionError::ExternalAccountLamportSpend(*key));
        }
        if account.lamports < lamports {
            return Err(InstructionError::InsufficientFunds {
                account: *key,
                have: account.lamports,
                need: lamports,
            });
        }
        account.lamports -= lamports;
        Ok(())
    }

    /// Add lamports to any account, creating a system account if needed
    pub fn credit(&mut self, key: &Pubkey, lamports: u64) {
        let account = self
            .accounts
            .entry(*key)
            .or_insert_with(|| Account::system(0));
        account.lamports = account.lamports.saturating_add(lamports);
    }

    /// Allocate a fresh account; only the system program may call this
    pub fn allocate(
        &mut self,
        key: &Pubkey,
        space: usize,
        owner: Pubkey,
    ) -> Result<(), InstructionError> {
        if self.program_id != crate::ledger::system::ID {
            return Err(InstructionError::UnsupportedProgramId(self.program_id));
        }
        let account = self
            .accounts
            .entry(*key)
            .or_insert_with(|| Account::system(0));
        if !account.data.is_empty() || account.owner != crate::ledger::system::ID {
            return Err(InstructionError::AccountAlreadyInUse(*key));
        }
        account.data = vec![0u8; space];
        account.owner = owner;
        Ok(())
    }

    /// Run the top-level instruction
    pub fn process_instruction(
        &mut self,
        instruction: &Instruction,
    ) -> Result<(), InstructionError> {
        self.invoke_signed(instruction, &[])
    }

    /// Invoke another program, granting signer status to the given
    /// program-derived addresses for the duration of the call
    pub fn invoke_signed(
        &mut self,
        instruction: &Instruction,
        pda_signers: &[Pubkey],
    ) -> Result<(), InstructionError> {
        if self.depth >= MAX_INVOKE_DEPTH {
            return Err(InstructionError::CallDepth);
        }

        let program = self
            .programs
            .iter()
            .find(|p| p.id() == instruction.program_id)
            .cloned()
            .ok_or(InstructionError::UnsupportedProgramId(instruction.program_id))?;

        let added: Vec<Pubkey> = pda_signers
            .iter()
            .filter(|key| key.is_off_curve() && self.signers.insert(**key))
            .copied()
            .collect();
        let caller = self.program_id;
        self.program_id = program.id();
        self.depth += 1;
        self.logs
            .push(format!("Program {} invoke [{}]", program.name(), self.depth));

        let result = program.process(self, instruction);

        match &result {
            Ok(()) => self.logs.push(format!("Program {} success", program.name())),
            Err(e) => self
                .logs
                .push(format!("Program {} failed: {}", program.name(), e)),
        }
        self.depth -= 1;
        self.program_id = caller;
        for key in added {
            self.signers.remove(&key);
        }

        result
    }
}
