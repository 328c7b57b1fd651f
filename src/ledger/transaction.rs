//! Signed ledger transactions
//!
//! A transaction wraps a `Message` (fee payer, recent blockhash and
//! instructions) with one signature per required signer. Signer order is the
//! payer first, then every account flagged as a signer in instruction order.

use crate::crypto::{Hash, Keypair, Pubkey, Signature};
use crate::ledger::instruction::{Instruction, InstructionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionError {
    #[error("Blockhash not found or expired")]
    BlockhashNotFound,
    #[error("Transaction already processed")]
    AlreadyProcessed,
    #[error("Fee payer {0} has insufficient funds for fee")]
    InsufficientFundsForFee(Pubkey),
    #[error("Transaction is missing a signature for {0}")]
    MissingSignature(Pubkey),
    #[error("Transaction signature verification failed")]
    SignatureFailure,
    #[error("Transaction has no instructions")]
    EmptyTransaction,
    #[error("Error processing instruction {index}: {error}")]
    InstructionError {
        index: u8,
        error: InstructionError,
    },
}

impl TransactionError {
    /// The instruction error, if this failure happened inside a program
    pub fn instruction_error(&self) -> Option<&InstructionError> {
        match self {
            TransactionError::InstructionError { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// The signed portion of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Account paying the transaction fee
    pub payer: Pubkey,
    pub recent_blockhash: Hash,
    pub instructions: Vec<Instruction>,
}

impl Message {
    pub fn new(payer: Pubkey, recent_blockhash: Hash, instructions: Vec<Instruction>) -> Self {
        Self {
            payer,
            recent_blockhash,
            instructions,
        }
    }

    /// Keys that must sign, payer first, without duplicates
    pub fn signer_keys(&self) -> Vec<Pubkey> {
        let mut keys = vec![self.payer];
        for instruction in &self.instructions {
            for meta in &instruction.accounts {
                if meta.is_signer && !keys.contains(&meta.pubkey) {
                    keys.push(meta.pubkey);
                }
            }
        }
        keys
    }

    /// Canonical bytes covered by signatures
    pub fn serialize(&self) -> Vec<u8> {
        // Serializing plain data structs to a Vec cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// A signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub message: Message,
    pub signatures: Vec<Signature>,
}

impl Transaction {
    /// Sign a message with the given key pairs
    ///
    /// Every key in `signer_keys()` must be covered; extra key pairs are ignored.
    pub fn new(message: Message, signers: &[&Keypair]) -> Result<Self, TransactionError> {
        let bytes = message.serialize();
        let signatures = message
            .signer_keys()
            .iter()
            .map(|key| {
                signers
                    .iter()
                    .find(|kp| kp.pubkey() == *key)
                    .map(|kp| kp.sign(&bytes))
                    .ok_or(TransactionError::MissingSignature(*key))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            message,
            signatures,
        })
    }

    /// The transaction id: the fee payer's signature
    pub fn signature(&self) -> Signature {
        self.signatures.first().copied().unwrap_or_default()
    }

    /// Check every required signature
    pub fn verify(&self) -> Result<(), TransactionError> {
        let keys = self.message.signer_keys();
        if keys.len() != self.signatures.len() {
            let missing = keys
                .get(self.signatures.len())
                .copied()
                .unwrap_or(self.message.payer);
            return Err(TransactionError::MissingSignature(missing));
        }

        let bytes = self.message.serialize();
        for (key, signature) in keys.iter().zip(&self.signatures) {
            if !signature.verify(key, &bytes) {
                return Err(TransactionError::SignatureFailure);
            }
        }
        Ok(())
    }
}
