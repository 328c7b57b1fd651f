//! Instructions of the multisig program and builders for them
//!
//! Account order for each instruction is documented on its variant. Builders
//! derive every program address from the arguments, so callers only supply
//! the keys they own.

use crate::crypto::Pubkey;
use crate::ledger::{system, AccountMeta, Instruction};
use crate::multisig::pda::{
    get_multisig_pda, get_program_config_pda, get_proposal_pda, get_transaction_pda,
};
use crate::multisig::program::ID;
use crate::multisig::state::{Member, VaultTransactionMessage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigCreateArgsV2 {
    pub config_authority: Option<Pubkey>,
    pub threshold: u16,
    pub members: Vec<Member>,
    pub time_lock: u32,
    pub rent_collector: Option<Pubkey>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransactionCreateArgs {
    /// Must be the multisig's current transaction index plus one
    pub transaction_index: u64,
    pub vault_index: u8,
    pub ephemeral_signers: u8,
    pub transaction_message: VaultTransactionMessage,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCreateArgs {
    pub transaction_index: u64,
    pub draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVoteArgs {
    pub memo: Option<String>,
}

/// Instructions understood by the multisig program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultisigInstruction {
    /// Accounts: [program_config, treasury (w), multisig (w), create_key (s),
    /// creator (s, w), system_program]
    MultisigCreateV2(MultisigCreateArgsV2),
    /// Accounts: [multisig (w), transaction (w), creator (s), rent_payer (s, w),
    /// system_program]
    VaultTransactionCreate(VaultTransactionCreateArgs),
    /// Accounts: [multisig, proposal (w), creator (s), rent_payer (s, w),
    /// system_program]
    ProposalCreate(ProposalCreateArgs),
    /// Accounts: [multisig, member (s), proposal (w)]
    ProposalActivate,
    /// Accounts: [multisig, member (s), proposal (w)]
    ProposalApprove(ProposalVoteArgs),
    /// Accounts: [multisig, member (s), proposal (w)]
    ProposalReject(ProposalVoteArgs),
    /// Accounts: [multisig, proposal (w), transaction, member (s),
    /// ...accounts referenced by the stored instructions]
    VaultTransactionExecute,
}

impl MultisigInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            MultisigInstruction::MultisigCreateV2(_) => "MultisigCreateV2",
            MultisigInstruction::VaultTransactionCreate(_) => "VaultTransactionCreate",
            MultisigInstruction::ProposalCreate(_) => "ProposalCreate",
            MultisigInstruction::ProposalActivate => "ProposalActivate",
            MultisigInstruction::ProposalApprove(_) => "ProposalApprove",
            MultisigInstruction::ProposalReject(_) => "ProposalReject",
            MultisigInstruction::VaultTransactionExecute => "VaultTransactionExecute",
        }
    }

    fn into_instruction(self, accounts: Vec<AccountMeta>) -> Instruction {
        let data = serde_json::to_vec(&self).unwrap_or_default();
        Instruction::new(ID, accounts, data)
    }
}

/// Create a multisig seeded by `create_key`
pub fn multisig_create_v2(
    treasury: &Pubkey,
    create_key: &Pubkey,
    creator: &Pubkey,
    args: MultisigCreateArgsV2,
) -> Instruction {
    MultisigInstruction::MultisigCreateV2(args).into_instruction(vec![
        AccountMeta::new_readonly(get_program_config_pda(), false),
        AccountMeta::new(*treasury, false),
        AccountMeta::new(get_multisig_pda(create_key), false),
        AccountMeta::new_readonly(*create_key, true),
        AccountMeta::new(*creator, true),
        AccountMeta::new_readonly(system::ID, false),
    ])
}

/// Store a new vault transaction at `args.transaction_index`
pub fn vault_transaction_create(
    multisig: &Pubkey,
    creator: &Pubkey,
    rent_payer: &Pubkey,
    args: VaultTransactionCreateArgs,
) -> Instruction {
    let transaction = get_transaction_pda(multisig, args.transaction_index);
    MultisigInstruction::VaultTransactionCreate(args).into_instruction(vec![
        AccountMeta::new(*multisig, false),
        AccountMeta::new(transaction, false),
        AccountMeta::new_readonly(*creator, true),
        AccountMeta::new(*rent_payer, true),
        AccountMeta::new_readonly(system::ID, false),
    ])
}

pub fn proposal_create(
    multisig: &Pubkey,
    creator: &Pubkey,
    rent_payer: &Pubkey,
    transaction_index: u64,
    draft: bool,
) -> Instruction {
    MultisigInstruction::ProposalCreate(ProposalCreateArgs {
        transaction_index,
        draft,
    })
    .into_instruction(vec![
        AccountMeta::new_readonly(*multisig, false),
        AccountMeta::new(get_proposal_pda(multisig, transaction_index), false),
        AccountMeta::new_readonly(*creator, true),
        AccountMeta::new(*rent_payer, true),
        AccountMeta::new_readonly(system::ID, false),
    ])
}

fn vote_accounts(multisig: &Pubkey, member: &Pubkey, transaction_index: u64) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new_readonly(*multisig, false),
        AccountMeta::new(*member, true),
        AccountMeta::new(get_proposal_pda(multisig, transaction_index), false),
    ]
}

pub fn proposal_activate(
    multisig: &Pubkey,
    member: &Pubkey,
    transaction_index: u64,
) -> Instruction {
    MultisigInstruction::ProposalActivate
        .into_instruction(vote_accounts(multisig, member, transaction_index))
}

pub fn proposal_approve(
    multisig: &Pubkey,
    member: &Pubkey,
    transaction_index: u64,
    memo: Option<String>,
) -> Instruction {
    MultisigInstruction::ProposalApprove(ProposalVoteArgs { memo })
        .into_instruction(vote_accounts(multisig, member, transaction_index))
}

pub fn proposal_reject(
    multisig: &Pubkey,
    member: &Pubkey,
    transaction_index: u64,
    memo: Option<String>,
) -> Instruction {
    MultisigInstruction::ProposalReject(ProposalVoteArgs { memo })
        .into_instruction(vote_accounts(multisig, member, transaction_index))
}

/// Execute an approved vault transaction
///
/// `message` is the stored transaction message; its accounts are appended so
/// the ledger can see every account the execution touches. Vault and
/// ephemeral signers are passed as non-signers, the program signs for them.
pub fn vault_transaction_execute(
    multisig: &Pubkey,
    member: &Pubkey,
    transaction_index: u64,
    message: &VaultTransactionMessage,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(*multisig, false),
        AccountMeta::new(get_proposal_pda(multisig, transaction_index), false),
        AccountMeta::new_readonly(get_transaction_pda(multisig, transaction_index), false),
        AccountMeta::new_readonly(*member, true),
    ];
    for ix in &message.instructions {
        accounts.push(AccountMeta::new_readonly(ix.program_id, false));
        for meta in &ix.accounts {
            if !accounts.iter().any(|a| a.pubkey == meta.pubkey) {
                accounts.push(AccountMeta {
                    pubkey: meta.pubkey,
                    is_signer: false,
                    is_writable: meta.is_writable,
                });
            }
        }
    }
    MultisigInstruction::VaultTransactionExecute.into_instruction(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multisig::pda::get_vault_pda;

    #[test]
    fn test_execute_lists_inner_accounts_without_signer_flags() {
        let multisig = get_multisig_pda(&Pubkey::new_unique());
        let vault = get_vault_pda(&multisig, 0);
        let destination = Pubkey::new_unique();
        let message = VaultTransactionMessage {
            instructions: vec![system::transfer(&vault, &destination, 10)],
        };
        let member = Pubkey::new_unique();

        let ix = vault_transaction_execute(&multisig, &member, 1, &message);
        let signers: Vec<Pubkey> = ix
            .accounts
            .iter()
            .filter(|a| a.is_signer)
            .map(|a| a.pubkey)
            .collect();
        assert_eq!(signers, vec![member]);
        assert!(ix.accounts.iter().any(|a| a.pubkey == vault));
        assert!(ix.accounts.iter().any(|a| a.pubkey == destination));
    }

    #[test]
    fn test_instruction_data_decodes() {
        let ix = proposal_create(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            4,
            true,
        );
        let decoded: MultisigInstruction = serde_json::from_slice(&ix.data).unwrap();
        assert_eq!(
            decoded,
            MultisigInstruction::ProposalCreate(ProposalCreateArgs {
                transaction_index: 4,
                draft: true
            })
        );
        assert_eq!(ix.program_id, ID);
    }
}
