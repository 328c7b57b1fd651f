//! The quickstart scenario
//!
//! Airdrop to a fresh creator, create a 2-of-2 multisig with a vote-only
//! second member, fund the vault, propose a transfer out of it, approve it
//! with both members and execute it.

use crate::crypto::{Keypair, Pubkey, Signature};
use crate::ledger::{LedgerClient, LAMPORTS_PER_SOL};
use crate::multisig::pda::get_vault_pda;
use crate::multisig::{Member, Permissions, ProposalStatus, Vote};
use crate::workflow::error::WorkflowError;
use crate::workflow::orchestrator::{CreateMultisigOptions, VoteReceipt, Workflow};
use log::info;

/// Inputs of the quickstart run
#[derive(Debug, Clone)]
pub struct QuickstartParams {
    /// Lamports airdropped to the creator
    pub airdrop_lamports: u64,
    /// Lamports moved from the creator into the vault before proposing
    pub vault_funding: u64,
    /// Lamports the proposed transaction sends out of the vault
    pub transfer_lamports: u64,
    /// Receiver of the transfer; the creator if unset
    pub destination: Option<Pubkey>,
    pub memo: Option<String>,
}

impl Default for QuickstartParams {
    fn default() -> Self {
        Self {
            airdrop_lamports: 2 * LAMPORTS_PER_SOL,
            vault_funding: LAMPORTS_PER_SOL / 2,
            transfer_lamports: LAMPORTS_PER_SOL / 10,
            destination: None,
            memo: Some("Transfer 0.1 SOL to creator".to_string()),
        }
    }
}

/// What the quickstart run produced
#[derive(Debug, Clone)]
pub struct QuickstartReport {
    pub creator: Pubkey,
    pub second_member: Pubkey,
    pub multisig: Pubkey,
    pub vault: Pubkey,
    pub destination: Pubkey,
    pub transaction_index: u64,
    pub airdrop_signature: Signature,
    pub create_signature: Signature,
    pub votes: Vec<VoteReceipt>,
    pub execute_signature: Signature,
    pub final_status: ProposalStatus,
    pub vault_balance_before: u64,
    pub vault_balance_after: u64,
    pub destination_balance_before: u64,
    pub destination_balance_after: u64,
}

/// Run the whole scenario with a fresh creator as fee payer
pub async fn run_quickstart<C: LedgerClient>(
    workflow: &Workflow<C>,
    params: &QuickstartParams,
) -> Result<QuickstartReport, WorkflowError> {
    let creator = workflow.payer();
    let second_member = Keypair::generate();
    let destination = params.destination.unwrap_or_else(|| creator.pubkey());

    let airdrop_signature = workflow
        .airdrop(&creator.pubkey(), params.airdrop_lamports)
        .await?;

    let created = workflow
        .create_multisig_with(
            vec![
                Member::new(creator.pubkey(), Permissions::all()),
                Member::new(second_member.pubkey(), Permissions::VOTE),
            ],
            2,
            CreateMultisigOptions::default(),
        )
        .await?;
    let multisig = created.multisig;
    let vault = get_vault_pda(&multisig, 0);

    if params.vault_funding > 0 {
        workflow
            .fund_vault(&multisig, 0, params.vault_funding)
            .await?;
    }

    let vault_balance_before = workflow.balance(&vault).await?;
    let destination_balance_before = workflow.balance(&destination).await?;

    let transaction_index = workflow
        .propose_transfer(
            &multisig,
            0,
            params.transfer_lamports,
            &destination,
            params.memo.clone(),
        )
        .await?;

    let mut votes = Vec::with_capacity(2);
    for voter in [creator, &second_member] {
        votes.push(
            workflow
                .cast_vote(&multisig, transaction_index, voter, Vote::Approve)
                .await?,
        );
    }

    let execute_signature = workflow
        .execute_transaction(&multisig, transaction_index, creator)
        .await?;

    let final_status = workflow.proposal(&multisig, transaction_index).await?.status;
    let vault_balance_after = workflow.balance(&vault).await?;
    let destination_balance_after = workflow.balance(&destination).await?;
    info!(
        "Quickstart finished: vault {} -> {} lamports",
        vault_balance_before, vault_balance_after
    );

    Ok(QuickstartReport {
        creator: creator.pubkey(),
        second_member: second_member.pubkey(),
        multisig,
        vault,
        destination,
        transaction_index,
        airdrop_signature,
        create_signature: created.signature,
        votes,
        execute_signature,
        final_status,
        vault_balance_before,
        vault_balance_after,
        destination_balance_before,
        destination_balance_after,
    })
}
