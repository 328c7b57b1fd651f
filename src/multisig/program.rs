//! The multisig program
//!
//! Enforces membership, permissions, thresholds and transaction ordering.
//! Every state change the workflow relies on is decided here, inside the
//! ledger, never by the client.

use crate::crypto::Pubkey;
use crate::ledger::{system, Instruction, InstructionError, InvokeContext, Program};
use crate::multisig::error::MultisigError;
use crate::multisig::instructions::{
    MultisigCreateArgsV2, MultisigInstruction, ProposalCreateArgs, VaultTransactionCreateArgs,
};
use crate::multisig::pda::{
    get_ephemeral_signer_pda, get_multisig_pda, get_program_config_pda, get_proposal_pda,
    get_transaction_pda, get_vault_pda,
};
use crate::multisig::state::{
    AccountState, Multisig, Permissions, ProgramConfig, Proposal, ProposalStatus,
    VaultTransaction, Vote,
};

/// Program id, `SQDS4ep65T869zMMBKyuUq6aD6EgTu8psMjkvj52pCf` as a 32-byte base58 key
pub const ID: Pubkey = Pubkey::program_id([
    6, 129, 196, 206, 71, 226, 35, 104, 184, 177, 85, 94, 200, 135, 175, 9, 46, 252, 126, 251,
    182, 108, 163, 245, 47, 191, 104, 212, 172, 156, 183, 168,
]);

/// Bytes reserved in a proposal per member for its vote
const VOTE_SPACE: usize = 64;

macro_rules! require {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

/// The multisig program
#[derive(Debug, Default, Clone, Copy)]
pub struct MultisigProgram;

impl Program for MultisigProgram {
    fn id(&self) -> Pubkey {
        ID
    }

    fn name(&self) -> &'static str {
        "squads_multisig"
    }

    fn process(
        &self,
        ctx: &mut InvokeContext<'_>,
        instruction: &Instruction,
    ) -> Result<(), InstructionError> {
        let parsed: MultisigInstruction = serde_json::from_slice(&instruction.data)
            .map_err(|e| InstructionError::InvalidInstructionData(e.to_string()))?;
        ctx.log(format!("Instruction: {}", parsed.name()));

        match parsed {
            MultisigInstruction::MultisigCreateV2(args) => {
                multisig_create_v2(ctx, instruction, args)
            }
            MultisigInstruction::VaultTransactionCreate(args) => {
                vault_transaction_create(ctx, instruction, args)
            }
            MultisigInstruction::ProposalCreate(args) => proposal_create(ctx, instruction, args),
            MultisigInstruction::ProposalActivate => proposal_activate(ctx, instruction),
            MultisigInstruction::ProposalApprove(args) => {
                proposal_vote(ctx, instruction, Vote::Approve, args.memo)
            }
            MultisigInstruction::ProposalReject(args) => {
                proposal_vote(ctx, instruction, Vote::Reject, args.memo)
            }
            MultisigInstruction::VaultTransactionExecute => {
                vault_transaction_execute(ctx, instruction)
            }
        }
    }
}

/// Read program state, reporting `missing` if the account was never created
fn load<T: AccountState>(
    ctx: &InvokeContext<'_>,
    key: &Pubkey,
    missing: MultisigError,
) -> Result<T, InstructionError> {
    match ctx.get_account(key) {
        Some(account) if account.owner == ID => Ok(T::try_from_account_data(&account.data)?),
        Some(account) if !account.data.is_empty() => Err(MultisigError::InvalidAccount.into()),
        _ => Err(missing.into()),
    }
}

fn store<T: AccountState>(
    ctx: &mut InvokeContext<'_>,
    key: &Pubkey,
    state: &T,
) -> Result<(), InstructionError> {
    ctx.set_data(key, state.to_account_data())
}

/// Create a program-owned account at a derived address, rent paid by `payer`
fn create_pda_account(
    ctx: &mut InvokeContext<'_>,
    payer: &Pubkey,
    address: &Pubkey,
    data: Vec<u8>,
    extra_space: usize,
) -> Result<(), InstructionError> {
    let space = data.len() + extra_space;
    let lamports = ctx.rent().minimum_balance(space);
    ctx.invoke_signed(
        &system::create_account(payer, address, lamports, space as u64, &ID),
        &[*address],
    )?;
    ctx.set_data(address, data)
}

fn multisig_create_v2(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
    args: MultisigCreateArgsV2,
) -> Result<(), InstructionError> {
    let program_config_key = ix.account_key(0)?;
    let treasury = ix.account_key(1)?;
    let multisig_key = ix.account_key(2)?;
    let create_key = ix.account_key(3)?;
    let creator = ix.account_key(4)?;

    require!(
        program_config_key == get_program_config_pda(),
        MultisigError::InvalidAccount
    );
    let config: ProgramConfig = load(ctx, &program_config_key, MultisigError::InvalidAccount)?;
    require!(treasury == config.treasury, MultisigError::InvalidAccount);
    require!(
        multisig_key == get_multisig_pda(&create_key),
        MultisigError::InvalidAccount
    );
    ctx.require_signer(&create_key)?;
    ctx.require_signer(&creator)?;

    let mut multisig = Multisig {
        create_key,
        config_authority: args.config_authority,
        threshold: args.threshold,
        time_lock: args.time_lock,
        transaction_index: 0,
        stale_transaction_index: 0,
        rent_collector: args.rent_collector,
        members: args.members,
    };
    multisig.validate()?;

    create_pda_account(ctx, &creator, &multisig_key, multisig.to_account_data(), 0)?;

    if config.multisig_creation_fee > 0 {
        ctx.invoke_signed(
            &system::transfer(&creator, &treasury, config.multisig_creation_fee),
            &[],
        )?;
    }

    ctx.log(format!(
        "Created {} multisig {}",
        multisig.description(),
        multisig_key
    ));
    if let Some(memo) = args.memo {
        ctx.log(format!("Memo: {}", memo));
    }
    Ok(())
}

fn vault_transaction_create(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
    args: VaultTransactionCreateArgs,
) -> Result<(), InstructionError> {
    let multisig_key = ix.account_key(0)?;
    let transaction_key = ix.account_key(1)?;
    let creator = ix.account_key(2)?;
    let rent_payer = ix.account_key(3)?;

    let mut multisig: Multisig = load(ctx, &multisig_key, MultisigError::InvalidAccount)?;
    ctx.require_signer(&creator)?;
    ctx.require_signer(&rent_payer)?;
    require!(multisig.is_member(&creator).is_some(), MultisigError::NotAMember);
    require!(
        multisig.member_has_permission(&creator, Permissions::INITIATE),
        MultisigError::Unauthorized
    );

    let next_index = multisig
        .transaction_index
        .checked_add(1)
        .ok_or(MultisigError::Overflow)?;
    require!(
        args.transaction_index >= next_index,
        MultisigError::DuplicateTransactionIndex
    );
    require!(
        args.transaction_index == next_index,
        MultisigError::InvalidTransactionIndex
    );
    require!(
        transaction_key == get_transaction_pda(&multisig_key, next_index),
        MultisigError::InvalidAccount
    );

    // The stored instructions may only require signers the program can provide
    let vault = get_vault_pda(&multisig_key, args.vault_index);
    let ephemeral: Vec<Pubkey> = (0..args.ephemeral_signers)
        .map(|i| get_ephemeral_signer_pda(&transaction_key, i))
        .collect();
    let needs_unknown_signer = args
        .transaction_message
        .instructions
        .iter()
        .flat_map(|i| i.accounts.iter())
        .any(|meta| meta.is_signer && meta.pubkey != vault && !ephemeral.contains(&meta.pubkey));
    require!(!needs_unknown_signer, MultisigError::InvalidEphemeralSigners);

    let transaction = VaultTransaction {
        multisig: multisig_key,
        creator,
        index: next_index,
        vault_index: args.vault_index,
        ephemeral_signer_count: args.ephemeral_signers,
        message: args.transaction_message,
        memo: args.memo,
    };
    create_pda_account(
        ctx,
        &rent_payer,
        &transaction_key,
        transaction.to_account_data(),
        0,
    )?;

    multisig.transaction_index = next_index;
    store(ctx, &multisig_key, &multisig)?;

    ctx.log(format!("Created vault transaction {}", next_index));
    if let Some(memo) = &transaction.memo {
        ctx.log(format!("Memo: {}", memo));
    }
    Ok(())
}

fn proposal_create(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
    args: ProposalCreateArgs,
) -> Result<(), InstructionError> {
    let multisig_key = ix.account_key(0)?;
    let proposal_key = ix.account_key(1)?;
    let creator = ix.account_key(2)?;
    let rent_payer = ix.account_key(3)?;

    let multisig: Multisig = load(ctx, &multisig_key, MultisigError::InvalidAccount)?;
    ctx.require_signer(&creator)?;
    ctx.require_signer(&rent_payer)?;
    require!(multisig.is_member(&creator).is_some(), MultisigError::NotAMember);
    require!(
        multisig.member_has_permission(&creator, Permissions::INITIATE)
            || multisig.member_has_permission(&creator, Permissions::VOTE),
        MultisigError::Unauthorized
    );

    let index = args.transaction_index;
    require!(
        index >= 1 && index <= multisig.transaction_index,
        MultisigError::TransactionNotFound
    );
    let transaction_key = get_transaction_pda(&multisig_key, index);
    require!(
        ctx.get_account(&transaction_key)
            .map_or(false, |a| a.owner == ID),
        MultisigError::TransactionNotFound
    );
    require!(
        proposal_key == get_proposal_pda(&multisig_key, index),
        MultisigError::InvalidAccount
    );
    require!(
        ctx.get_account(&proposal_key).map_or(true, |a| a.owner != ID),
        MultisigError::ProposalAlreadyExists
    );

    let timestamp = ctx.clock().unix_timestamp;
    let status = if args.draft {
        ProposalStatus::Draft { timestamp }
    } else {
        ProposalStatus::Active { timestamp }
    };
    let proposal = Proposal::new(multisig_key, index, status);
    create_pda_account(
        ctx,
        &rent_payer,
        &proposal_key,
        proposal.to_account_data(),
        multisig.members.len() * VOTE_SPACE,
    )?;

    ctx.log(format!("Created {} proposal for transaction {}", status, index));
    Ok(())
}

/// Shared checks for instructions taking `[multisig, member, proposal]`
fn load_for_member(
    ctx: &InvokeContext<'_>,
    ix: &Instruction,
) -> Result<(Pubkey, Multisig, Pubkey, Pubkey, Proposal), InstructionError> {
    let multisig_key = ix.account_key(0)?;
    let member = ix.account_key(1)?;
    let proposal_key = ix.account_key(2)?;

    let multisig: Multisig = load(ctx, &multisig_key, MultisigError::InvalidAccount)?;
    ctx.require_signer(&member)?;
    let proposal: Proposal = load(ctx, &proposal_key, MultisigError::ProposalNotFound)?;
    require!(
        proposal.multisig == multisig_key
            && proposal_key == get_proposal_pda(&multisig_key, proposal.transaction_index),
        MultisigError::InvalidAccount
    );
    Ok((multisig_key, multisig, member, proposal_key, proposal))
}

fn proposal_activate(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
) -> Result<(), InstructionError> {
    let (_, multisig, member, proposal_key, mut proposal) = load_for_member(ctx, ix)?;
    require!(multisig.is_member(&member).is_some(), MultisigError::NotAMember);
    require!(
        multisig.member_has_permission(&member, Permissions::INITIATE),
        MultisigError::Unauthorized
    );
    require!(
        matches!(proposal.status, ProposalStatus::Draft { .. }),
        MultisigError::ProposalNotDraft
    );

    proposal.status = ProposalStatus::Active {
        timestamp: ctx.clock().unix_timestamp,
    };
    store(ctx, &proposal_key, &proposal)
}

fn proposal_vote(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
    vote: Vote,
    memo: Option<String>,
) -> Result<(), InstructionError> {
    let (_, multisig, member, proposal_key, mut proposal) = load_for_member(ctx, ix)?;
    require!(
        multisig.member_has_permission(&member, Permissions::VOTE),
        MultisigError::UnauthorizedVoter
    );

    proposal.record_vote(
        member,
        vote,
        usize::from(multisig.threshold),
        multisig.cutoff(),
        ctx.clock().unix_timestamp,
    )?;
    store(ctx, &proposal_key, &proposal)?;

    ctx.log(format!(
        "{} voted {} on transaction {}: {}/{} approvals, status {}",
        member,
        vote,
        proposal.transaction_index,
        proposal.approvals(),
        multisig.threshold,
        proposal.status
    ));
    if let Some(memo) = memo {
        ctx.log(format!("Memo: {}", memo));
    }
    Ok(())
}

fn vault_transaction_execute(
    ctx: &mut InvokeContext<'_>,
    ix: &Instruction,
) -> Result<(), InstructionError> {
    let multisig_key = ix.account_key(0)?;
    let proposal_key = ix.account_key(1)?;
    let transaction_key = ix.account_key(2)?;
    let member = ix.account_key(3)?;

    let multisig: Multisig = load(ctx, &multisig_key, MultisigError::InvalidAccount)?;
    require!(ctx.is_signer(&member), MultisigError::InsufficientSignatures);
    require!(multisig.is_member(&member).is_some(), MultisigError::NotAMember);
    require!(
        multisig.member_has_permission(&member, Permissions::EXECUTE),
        MultisigError::Unauthorized
    );

    let mut proposal: Proposal = load(ctx, &proposal_key, MultisigError::ProposalNotFound)?;
    let transaction: VaultTransaction =
        load(ctx, &transaction_key, MultisigError::TransactionNotFound)?;
    let index = proposal.transaction_index;
    require!(
        proposal.multisig == multisig_key
            && transaction.multisig == multisig_key
            && transaction.index == index
            && proposal_key == get_proposal_pda(&multisig_key, index)
            && transaction_key == get_transaction_pda(&multisig_key, index),
        MultisigError::InvalidAccount
    );

    let now = ctx.clock().unix_timestamp;
    match proposal.status {
        ProposalStatus::Approved { timestamp } => {
            require!(
                now.saturating_sub(timestamp) >= i64::from(multisig.time_lock),
                MultisigError::TimeLockNotReleased
            );
        }
        ProposalStatus::Executed { .. } => return Err(MultisigError::AlreadyExecuted.into()),
        _ => return Err(MultisigError::ProposalNotApproved.into()),
    }

    proposal.status = ProposalStatus::Executed { timestamp: now };
    store(ctx, &proposal_key, &proposal)?;

    let mut signers = vec![get_vault_pda(&multisig_key, transaction.vault_index)];
    signers.extend(
        (0..transaction.ephemeral_signer_count)
            .map(|i| get_ephemeral_signer_pda(&transaction_key, i)),
    );
    for inner in &transaction.message.instructions {
        ctx.invoke_signed(inner, &signers)?;
    }

    ctx.log(format!("Executed vault transaction {}", index));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::{Account, Bank, Clock, Message, Transaction, TransactionError};
    use crate::multisig::instructions;
    use crate::multisig::state::{Member, VaultTransactionMessage};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        bank: Bank,
        slot: u64,
        now: i64,
        treasury: Pubkey,
    }

    impl Harness {
        fn new() -> Self {
            let mut bank = Bank::default();
            bank.add_program(Arc::new(system::SystemProgram));
            bank.add_program(Arc::new(MultisigProgram));
            let treasury = Pubkey::new_unique();
            let config = ProgramConfig {
                authority: Pubkey::new_unique(),
                multisig_creation_fee: 0,
                treasury,
            };
            bank.set_account(
                get_program_config_pda(),
                Account::new(1_000_000_000, config.to_account_data(), ID),
            );
            Self {
                bank,
                slot: 1,
                now: NOW,
                treasury,
            }
        }

        fn fund(&mut self, key: &Pubkey, lamports: u64) {
            self.bank.set_account(*key, Account::system(lamports));
        }

        fn send(
            &mut self,
            payer: &Keypair,
            signers: &[&Keypair],
            ixs: Vec<Instruction>,
        ) -> Result<(), TransactionError> {
            self.slot += 1;
            let blockhash = self.bank.latest_blockhash(self.slot);
            let tx = Transaction::new(Message::new(payer.pubkey(), blockhash, ixs), signers)?;
            self.bank.process_transaction(
                &tx,
                Clock {
                    slot: self.slot,
                    unix_timestamp: self.now,
                },
            )
        }

        fn proposal(&self, multisig: &Pubkey, index: u64) -> Proposal {
            let account = self.bank.get_account(&get_proposal_pda(multisig, index)).unwrap();
            Proposal::try_from_account_data(&account.data).unwrap()
        }

        fn multisig(&self, key: &Pubkey) -> Multisig {
            Multisig::try_from_account_data(&self.bank.get_account(key).unwrap().data).unwrap()
        }
    }

    fn registry_error(result: Result<(), TransactionError>) -> Option<MultisigError> {
        result
            .err()
            .and_then(|e| MultisigError::from_transaction_error(&e))
    }

    /// Creator with every permission plus `voters` vote-only members
    fn setup(
        h: &mut Harness,
        voters: usize,
        threshold: u16,
        time_lock: u32,
    ) -> (Keypair, Vec<Keypair>, Pubkey) {
        let creator = Keypair::generate();
        h.fund(&creator.pubkey(), 10_000_000_000);
        let others: Vec<Keypair> = (0..voters).map(|_| Keypair::generate()).collect();
        for voter in &others {
            h.fund(&voter.pubkey(), 1_000_000_000);
        }

        let mut members = vec![Member::new(creator.pubkey(), Permissions::all())];
        members.extend(others.iter().map(|k| Member::new(k.pubkey(), Permissions::VOTE)));

        let create_key = Keypair::generate();
        let ix = instructions::multisig_create_v2(
            &h.treasury,
            &create_key.pubkey(),
            &creator.pubkey(),
            MultisigCreateArgsV2 {
                config_authority: None,
                threshold,
                members,
                time_lock,
                rent_collector: None,
                memo: None,
            },
        );
        h.send(&creator, &[&creator, &create_key], vec![ix]).unwrap();
        (creator, others, get_multisig_pda(&create_key.pubkey()))
    }

    fn propose(
        h: &mut Harness,
        creator: &Keypair,
        multisig: &Pubkey,
        index: u64,
        lamports: u64,
    ) -> Result<(), TransactionError> {
        let vault = get_vault_pda(multisig, 0);
        let message = VaultTransactionMessage {
            instructions: vec![system::transfer(&vault, &creator.pubkey(), lamports)],
        };
        let create = instructions::vault_transaction_create(
            multisig,
            &creator.pubkey(),
            &creator.pubkey(),
            VaultTransactionCreateArgs {
                transaction_index: index,
                vault_index: 0,
                ephemeral_signers: 0,
                transaction_message: message,
                memo: None,
            },
        );
        let proposal = instructions::proposal_create(
            multisig,
            &creator.pubkey(),
            &creator.pubkey(),
            index,
            false,
        );
        h.send(creator, &[creator], vec![create, proposal])
    }

    fn execute(
        h: &mut Harness,
        member: &Keypair,
        multisig: &Pubkey,
        index: u64,
    ) -> Result<(), TransactionError> {
        let account = h.bank.get_account(&get_transaction_pda(multisig, index)).cloned();
        let message = account
            .map(|a| VaultTransaction::try_from_account_data(&a.data).unwrap().message)
            .unwrap_or(VaultTransactionMessage { instructions: vec![] });
        let ix =
            instructions::vault_transaction_execute(multisig, &member.pubkey(), index, &message);
        h.send(member, &[member], vec![ix])
    }

    fn approve(
        h: &mut Harness,
        voter: &Keypair,
        multisig: &Pubkey,
        index: u64,
    ) -> Result<(), TransactionError> {
        let ix = instructions::proposal_approve(multisig, &voter.pubkey(), index, None);
        h.send(voter, &[voter], vec![ix])
    }

    #[test]
    fn test_create_multisig_stores_sorted_config() {
        let mut h = Harness::new();
        let (_, _, multisig) = setup(&mut h, 2, 2, 0);
        let state = h.multisig(&multisig);
        assert_eq!(state.threshold, 2);
        assert_eq!(state.transaction_index, 0);
        assert!(state.members.windows(2).all(|w| w[0].key < w[1].key));
        assert!(h.bank.get_account(&multisig).unwrap().owner == ID);
    }

    #[test]
    fn test_create_rejects_threshold_above_voters() {
        let mut h = Harness::new();
        let creator = Keypair::generate();
        h.fund(&creator.pubkey(), 10_000_000_000);
        let create_key = Keypair::generate();
        let ix = instructions::multisig_create_v2(
            &h.treasury,
            &create_key.pubkey(),
            &creator.pubkey(),
            MultisigCreateArgsV2 {
                config_authority: None,
                threshold: 3,
                members: vec![
                    Member::new(creator.pubkey(), Permissions::all()),
                    Member::new(Keypair::generate().pubkey(), Permissions::VOTE),
                ],
                time_lock: 0,
                rent_collector: None,
                memo: None,
            },
        );
        let result = h.send(&creator, &[&creator, &create_key], vec![ix]);
        assert_eq!(registry_error(result), Some(MultisigError::InvalidThreshold));
        assert!(h
            .bank
            .get_account(&get_multisig_pda(&create_key.pubkey()))
            .is_none());
    }

    #[test]
    fn test_transaction_index_ordering() {
        let mut h = Harness::new();
        let (creator, _, multisig) = setup(&mut h, 1, 2, 0);

        propose(&mut h, &creator, &multisig, 1, 1).unwrap();
        assert_eq!(
            registry_error(propose(&mut h, &creator, &multisig, 1, 1)),
            Some(MultisigError::DuplicateTransactionIndex)
        );
        assert_eq!(
            registry_error(propose(&mut h, &creator, &multisig, 3, 1)),
            Some(MultisigError::InvalidTransactionIndex)
        );
        propose(&mut h, &creator, &multisig, 2, 1).unwrap();
        assert_eq!(h.multisig(&multisig).transaction_index, 2);
    }

    #[test]
    fn test_vote_only_member_cannot_propose() {
        let mut h = Harness::new();
        let (_, voters, multisig) = setup(&mut h, 1, 1, 0);
        assert_eq!(
            registry_error(propose(&mut h, &voters[0], &multisig, 1, 1)),
            Some(MultisigError::Unauthorized)
        );
    }

    #[test]
    fn test_full_flow_and_double_execute() {
        let mut h = Harness::new();
        let (creator, voters, multisig) = setup(&mut h, 1, 2, 0);
        let vault = get_vault_pda(&multisig, 0);
        h.fund(&vault, 5_000_000);
        propose(&mut h, &creator, &multisig, 1, 1_000_000).unwrap();

        assert_eq!(
            registry_error(execute(&mut h, &creator, &multisig, 1)),
            Some(MultisigError::ProposalNotApproved)
        );

        approve(&mut h, &creator, &multisig, 1).unwrap();
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Active { .. }));
        approve(&mut h, &voters[0], &multisig, 1).unwrap();
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Approved { .. }));

        let before = h.bank.balance(&creator.pubkey());
        execute(&mut h, &creator, &multisig, 1).unwrap();
        assert_eq!(h.bank.balance(&vault), 4_000_000);
        assert_eq!(h.bank.balance(&creator.pubkey()), before + 1_000_000 - 5000);
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Executed { .. }));

        assert_eq!(
            registry_error(execute(&mut h, &creator, &multisig, 1)),
            Some(MultisigError::AlreadyExecuted)
        );
        assert_eq!(h.bank.balance(&vault), 4_000_000);
    }

    #[test]
    fn test_execute_needs_the_member_signature() {
        let mut h = Harness::new();
        let (creator, voters, multisig) = setup(&mut h, 1, 1, 0);
        let vault = get_vault_pda(&multisig, 0);
        h.fund(&vault, 5_000_000);
        propose(&mut h, &creator, &multisig, 1, 1_000).unwrap();
        approve(&mut h, &voters[0], &multisig, 1).unwrap();

        // Name the executing member without their signature; the voter pays
        let account = h.bank.get_account(&get_transaction_pda(&multisig, 1)).unwrap();
        let message = VaultTransaction::try_from_account_data(&account.data).unwrap().message;
        let mut ix =
            instructions::vault_transaction_execute(&multisig, &creator.pubkey(), 1, &message);
        ix.accounts[3].is_signer = false;
        let payer = &voters[0];
        assert_eq!(
            registry_error(h.send(payer, &[payer], vec![ix])),
            Some(MultisigError::InsufficientSignatures)
        );
        assert_eq!(h.bank.balance(&vault), 5_000_000);
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Approved { .. }));
    }

    #[test]
    fn test_vote_permission_checks() {
        let mut h = Harness::new();
        let (creator, voters, multisig) = setup(&mut h, 1, 2, 0);
        propose(&mut h, &creator, &multisig, 1, 1).unwrap();

        let outsider = Keypair::generate();
        h.fund(&outsider.pubkey(), 1_000_000);
        assert_eq!(
            registry_error(approve(&mut h, &outsider, &multisig, 1)),
            Some(MultisigError::UnauthorizedVoter)
        );

        approve(&mut h, &voters[0], &multisig, 1).unwrap();
        assert_eq!(
            registry_error(approve(&mut h, &voters[0], &multisig, 1)),
            Some(MultisigError::DuplicateVote)
        );
        assert_eq!(h.proposal(&multisig, 1).approvals(), 1);

        // Vote-only members cannot execute
        assert_eq!(
            registry_error(execute(&mut h, &voters[0], &multisig, 1)),
            Some(MultisigError::Unauthorized)
        );
    }

    #[test]
    fn test_rejection_reaches_cutoff() {
        let mut h = Harness::new();
        let (creator, voters, multisig) = setup(&mut h, 2, 2, 0);
        propose(&mut h, &creator, &multisig, 1, 1).unwrap();

        // 3 voters, threshold 2: two rejections make approval impossible
        for voter in &voters {
            let ix =
                instructions::proposal_reject(&multisig, &voter.pubkey(), 1, Some("no".into()));
            h.send(voter, &[voter], vec![ix]).unwrap();
        }
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Rejected { .. }));
        assert_eq!(
            registry_error(approve(&mut h, &creator, &multisig, 1)),
            Some(MultisigError::ProposalNotActive)
        );
    }

    #[test]
    fn test_time_lock_delays_execution() {
        let mut h = Harness::new();
        let (creator, voters, multisig) = setup(&mut h, 1, 1, 60);
        h.fund(&get_vault_pda(&multisig, 0), 5_000_000);
        propose(&mut h, &creator, &multisig, 1, 10).unwrap();
        approve(&mut h, &voters[0], &multisig, 1).unwrap();

        assert_eq!(
            registry_error(execute(&mut h, &creator, &multisig, 1)),
            Some(MultisigError::TimeLockNotReleased)
        );
        h.now += 60;
        execute(&mut h, &creator, &multisig, 1).unwrap();
    }

    #[test]
    fn test_draft_proposal_needs_activation() {
        let mut h = Harness::new();
        let (creator, _, multisig) = setup(&mut h, 1, 1, 0);
        let vault = get_vault_pda(&multisig, 0);
        let create = instructions::vault_transaction_create(
            &multisig,
            &creator.pubkey(),
            &creator.pubkey(),
            VaultTransactionCreateArgs {
                transaction_index: 1,
                vault_index: 0,
                ephemeral_signers: 0,
                transaction_message: VaultTransactionMessage {
                    instructions: vec![system::transfer(&vault, &creator.pubkey(), 1)],
                },
                memo: Some("draft".into()),
            },
        );
        let draft =
            instructions::proposal_create(&multisig, &creator.pubkey(), &creator.pubkey(), 1, true);
        h.send(&creator, &[&creator], vec![create, draft]).unwrap();

        assert_eq!(
            registry_error(approve(&mut h, &creator, &multisig, 1)),
            Some(MultisigError::ProposalNotActive)
        );
        let activate = instructions::proposal_activate(&multisig, &creator.pubkey(), 1);
        h.send(&creator, &[&creator], vec![activate.clone()]).unwrap();
        assert!(matches!(h.proposal(&multisig, 1).status, ProposalStatus::Active { .. }));
        assert_eq!(
            registry_error(h.send(&creator, &[&creator], vec![activate])),
            Some(MultisigError::ProposalNotDraft)
        );

        let again = instructions::proposal_create(
            &multisig,
            &creator.pubkey(),
            &creator.pubkey(),
            1,
            false,
        );
        assert_eq!(
            registry_error(h.send(&creator, &[&creator], vec![again])),
            Some(MultisigError::ProposalAlreadyExists)
        );
    }

    #[test]
    fn test_message_needing_foreign_signer_rejected() {
        let mut h = Harness::new();
        let (creator, _, multisig) = setup(&mut h, 1, 1, 0);
        let stranger = Pubkey::new_unique();
        let ix = instructions::vault_transaction_create(
            &multisig,
            &creator.pubkey(),
            &creator.pubkey(),
            VaultTransactionCreateArgs {
                transaction_index: 1,
                vault_index: 0,
                ephemeral_signers: 0,
                transaction_message: VaultTransactionMessage {
                    instructions: vec![system::transfer(&stranger, &creator.pubkey(), 1)],
                },
                memo: None,
            },
        );
        assert_eq!(
            registry_error(h.send(&creator, &[&creator], vec![ix])),
            Some(MultisigError::InvalidEphemeralSigners)
        );
    }

    #[test]
    fn test_creation_fee_goes_to_treasury() {
        let mut h = Harness::new();
        let config = ProgramConfig {
            authority: Pubkey::new_unique(),
            multisig_creation_fee: 100_000,
            treasury: h.treasury,
        };
        h.bank.set_account(
            get_program_config_pda(),
            Account::new(1_000_000_000, config.to_account_data(), ID),
        );
        setup(&mut h, 1, 1, 0);
        assert_eq!(h.bank.balance(&h.treasury), 100_000);
    }
}
