//! Built-in system program
//!
//! Owns plain wallet accounts. Supports lamport transfers and account
//! creation on behalf of other programs.

use crate::crypto::Pubkey;
use crate::ledger::instruction::{AccountMeta, Instruction, InstructionError};
use crate::ledger::runtime::{InvokeContext, Program};
use serde::{Deserialize, Serialize};

/// System program id (all zero bytes)
pub const ID: Pubkey = Pubkey::new_from_array([0u8; crate::crypto::PUBKEY_BYTES]);

/// Instructions understood by the system program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemInstruction {
    /// Accounts: [from (signer, writable), to (writable)]
    Transfer { lamports: u64 },
    /// Accounts: [payer (signer, writable), new account (signer, writable)]
    CreateAccount {
        lamports: u64,
        space: u64,
        owner: Pubkey,
    },
}

/// Build a lamport transfer
pub fn transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let data = serde_json::to_vec(&SystemInstruction::Transfer { lamports }).unwrap_or_default();
    Instruction::new(
        ID,
        vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    )
}

/// Build an account creation funded by `payer`
pub fn create_account(
    payer: &Pubkey,
    new_account: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Instruction {
    let data = serde_json::to_vec(&SystemInstruction::CreateAccount {
        lamports,
        space,
        owner: *owner,
    })
    .unwrap_or_default();
    Instruction::new(
        ID,
        vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*new_account, true),
        ],
        data,
    )
}

/// The system program
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProgram;

impl Program for SystemProgram {
    fn id(&self) -> Pubkey {
        ID
    }

    fn name(&self) -> &'static str {
        "system"
    }

    fn process(
        &self,
        ctx: &mut InvokeContext<'_>,
        instruction: &Instruction,
    ) -> Result<(), InstructionError> {
        let parsed: SystemInstruction = serde_json::from_slice(&instruction.data)
            .map_err(|e| InstructionError::InvalidInstructionData(e.to_string()))?;

        match parsed {
            SystemInstruction::Transfer { lamports } => {
                let from = instruction.account_key(0)?;
                let to = instruction.account_key(1)?;
                ctx.require_signer(&from)?;
                if ctx.get_account(&from).map_or(false, |a| !a.data.is_empty()) {
                    return Err(InstructionError::InvalidAccountData(from));
                }
                ctx.debit(&from, lamports)?;
                ctx.credit(&to, lamports);
                Ok(())
            }
            SystemInstruction::CreateAccount {
                lamports,
                space,
                owner,
            } => {
                let payer = instruction.account_key(0)?;
                let new_account = instruction.account_key(1)?;
                ctx.require_signer(&payer)?;
                ctx.require_signer(&new_account)?;
                ctx.allocate(&new_account, space as usize, owner)?;
                ctx.debit(&payer, lamports)?;
                ctx.credit(&new_account, lamports);
                if !ctx.rent().is_exempt(ctx.lamports(&new_account), space as usize) {
                    return Err(InstructionError::InsufficientFundsForRent(new_account));
                }
                Ok(())
            }
        }
    }
}
