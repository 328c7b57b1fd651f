//! Workflow orchestrator
//!
//! Sequences multisig operations against a `LedgerClient`: each step builds
//! one transaction, submits it, and waits for the configured commitment
//! before returning. The registry decides whether a step is allowed; the
//! orchestrator only reports what it decided.

use crate::crypto::{Hash, Keypair, Pubkey, Signature};
use crate::ledger::{
    system, ClientError, Instruction, LedgerClient, Message, SendOptions, Transaction,
    TransactionError,
};
use crate::multisig::accounts::{
    fetch_multisig, fetch_program_config, fetch_proposal, fetch_vault_transaction,
};
use crate::multisig::instructions::{self, MultisigCreateArgsV2, VaultTransactionCreateArgs};
use crate::multisig::pda::{get_multisig_pda, get_vault_pda};
use crate::multisig::{
    FetchError, Member, Multisig, ProgramConfig, Proposal, ProposalStatus, VaultTransaction,
    VaultTransactionMessage, Vote,
};
use crate::workflow::config::WorkflowConfig;
use crate::workflow::confirm::{confirm_transaction, with_retry, Confirmation};
use crate::workflow::error::{Step, StepContext, WorkflowError};
use log::{debug, info, warn};
use std::future::Future;
use tokio::time::Instant;

/// Optional settings for a new multisig
#[derive(Debug, Clone, Default)]
pub struct CreateMultisigOptions {
    /// Seed key for the multisig address; a fresh one is generated if unset
    pub create_key: Option<Keypair>,
    pub config_authority: Option<Pubkey>,
    /// Seconds between approval and execution
    pub time_lock: u32,
    pub rent_collector: Option<Pubkey>,
    pub memo: Option<String>,
}

/// A freshly created multisig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMultisig {
    pub multisig: Pubkey,
    pub create_key: Pubkey,
    pub signature: Signature,
}

/// Proposal state observed right after a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub status: ProposalStatus,
    pub approvals: usize,
    pub rejections: usize,
}

/// Outcome of one vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub signature: Signature,
    pub transaction_index: u64,
    pub voter: Pubkey,
    pub decision: Vote,
    /// `None` if the vote landed but the proposal could not be read back
    pub tally: Option<VoteTally>,
}

impl VoteReceipt {
    pub fn status(&self) -> Option<ProposalStatus> {
        self.tally.map(|tally| tally.status)
    }
}

/// How one submission ended
enum Submitted {
    Sent(Signature),
    /// The ledger already holds this exact transaction from an earlier call
    Duplicate,
}

/// Drives the multisig workflow; `payer` signs and pays for every transaction
pub struct Workflow<C: LedgerClient> {
    client: C,
    config: WorkflowConfig,
    payer: Keypair,
}

impl<C: LedgerClient> Workflow<C> {
    pub fn new(client: C, payer: Keypair, config: WorkflowConfig) -> Self {
        Self {
            client,
            config,
            payer,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Fee payer and creator of everything this workflow submits
    pub fn payer(&self) -> &Keypair {
        &self.payer
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit a signed transaction once
    ///
    /// A network failure leaves it unknown whether the ledger saw the
    /// transaction, so the signature is looked up before the same signed
    /// bytes are sent again, and once more before giving up. Resending is
    /// safe: the ledger refuses a signature it already processed.
    async fn submit(
        &self,
        context: &StepContext,
        tx: &Transaction,
    ) -> Result<Submitted, WorkflowError> {
        let signature = tx.signature();
        let options = SendOptions {
            skip_preflight: self.config.skip_preflight,
        };
        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            let err = match self.client.send_transaction(tx, options).await {
                Ok(signature) => return Ok(Submitted::Sent(signature)),
                Err(err) => err,
            };
            match err {
                ClientError::Transaction(TransactionError::AlreadyProcessed) if attempt == 0 => {
                    return Ok(Submitted::Duplicate)
                }
                // An earlier attempt got through after all
                ClientError::Transaction(TransactionError::AlreadyProcessed) => {
                    return Ok(Submitted::Sent(signature))
                }
                err if err.is_transient() => {
                    if self.has_landed(&signature).await {
                        info!("{}: {} landed despite a network error", context, signature);
                        return Ok(Submitted::Sent(signature));
                    }
                    if attempt >= policy.max_retries {
                        warn!("{}: giving up on {}: {}", context, signature, err);
                        return Err(WorkflowError::NetworkFailure {
                            context: context.clone(),
                            error: err,
                            signature: Some(signature),
                        });
                    }
                    let delay = policy.backoff(attempt);
                    attempt += 1;
                    warn!(
                        "{}: send failed ({}), retry {}/{} in {:?}",
                        context, err, attempt, policy.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                err => return Err(WorkflowError::from_client(context.clone(), err)),
            }
        }
    }

    /// Whether the ledger has seen `signature`; an unreachable ledger counts as no
    async fn has_landed(&self, signature: &Signature) -> bool {
        let client = &self.client;
        let status = with_retry(&self.config.retry, "getSignatureStatus", move || {
            client.get_signature_status(signature)
        })
        .await;
        matches!(status, Ok(Some(_)))
    }

    async fn latest_blockhash(&self, context: &StepContext) -> Result<Hash, WorkflowError> {
        let client = &self.client;
        with_retry(&self.config.retry, "getLatestBlockhash", move || {
            client.get_latest_blockhash()
        })
        .await
        .map_err(|e| WorkflowError::from_client(context.clone(), e))
    }

    /// Wait until the ledger hands out a blockhash other than `used`
    async fn next_blockhash(
        &self,
        context: &StepContext,
        used: Hash,
    ) -> Result<Hash, WorkflowError> {
        let deadline = Instant::now() + self.config.confirm_timeout;
        loop {
            let blockhash = self.latest_blockhash(context).await?;
            if blockhash != used {
                return Ok(blockhash);
            }
            if Instant::now() >= deadline {
                return Err(WorkflowError::from_transaction(
                    context.clone(),
                    TransactionError::AlreadyProcessed,
                ));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Build, sign, submit and confirm one transaction
    ///
    /// Repeating a step within one slot signs the same bytes as before,
    /// which the ledger would refuse as a replay. The transaction is then
    /// rebuilt over the next blockhash so the registry judges it afresh.
    async fn send_and_confirm(
        &self,
        context: StepContext,
        instructions: Vec<Instruction>,
        signers: &[&Keypair],
    ) -> Result<Signature, WorkflowError> {
        let mut keypairs = vec![&self.payer];
        keypairs.extend_from_slice(signers);
        let mut blockhash = self.latest_blockhash(&context).await?;
        let mut rebuilt = false;

        loop {
            let message = Message::new(self.payer.pubkey(), blockhash, instructions.clone());
            let tx = Transaction::new(message, &keypairs)
                .map_err(|e| WorkflowError::from_transaction(context.clone(), e))?;

            match self.submit(&context, &tx).await? {
                Submitted::Sent(signature) => {
                    debug!("{}: submitted {}", context, signature);
                    return self.confirm(context, signature).await;
                }
                Submitted::Duplicate if !rebuilt => {
                    debug!(
                        "{}: {} already on the ledger, waiting for a new blockhash",
                        context,
                        tx.signature()
                    );
                    blockhash = self.next_blockhash(&context, blockhash).await?;
                    rebuilt = true;
                }
                Submitted::Duplicate => {
                    return Err(WorkflowError::from_transaction(
                        context,
                        TransactionError::AlreadyProcessed,
                    ))
                }
            }
        }
    }

    async fn confirm(
        &self,
        context: StepContext,
        signature: Signature,
    ) -> Result<Signature, WorkflowError> {
        let outcome = confirm_transaction(
            &self.client,
            &signature,
            self.config.commitment,
            self.config.confirm_timeout,
            self.config.poll_interval,
            &self.config.retry,
        )
        .await
        .map_err(|e| WorkflowError::from_client(context.clone(), e))?;

        match outcome {
            Confirmation::Confirmed(status) => {
                debug!("{}: {} confirmed in slot {}", context, signature, status.slot);
                Ok(signature)
            }
            Confirmation::Failed(err) => Err(WorkflowError::from_transaction(context, err)),
            Confirmation::TimedOut => {
                warn!("{}: {} not confirmed in time", context, signature);
                Err(WorkflowError::ConfirmationTimeout {
                    context,
                    signature,
                    timeout: self.config.confirm_timeout,
                })
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read program state, retrying network failures
    async fn read<T, F, Fut>(&self, context: StepContext, fetch: F) -> Result<T, WorkflowError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 0;
        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(FetchError::Client(err))
                    if err.is_transient() && attempt < policy.max_retries =>
                {
                    let delay = policy.backoff(attempt);
                    attempt += 1;
                    warn!("{}: read failed ({}), retry in {:?}", context, err, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(WorkflowError::from_fetch(context, err)),
            }
        }
    }

    pub async fn program_config(&self) -> Result<ProgramConfig, WorkflowError> {
        let client = &self.client;
        self.read(StepContext::new(Step::ReadAccount), move || {
            fetch_program_config(client)
        })
        .await
    }

    /// Fresh read of a multisig account
    pub async fn multisig(&self, multisig: &Pubkey) -> Result<Multisig, WorkflowError> {
        let client = &self.client;
        let context = StepContext::new(Step::ReadAccount).multisig(*multisig);
        self.read(context, move || fetch_multisig(client, multisig))
            .await
    }

    pub async fn proposal(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
    ) -> Result<Proposal, WorkflowError> {
        let client = &self.client;
        let context = StepContext::new(Step::ReadAccount)
            .multisig(*multisig)
            .transaction(transaction_index);
        self.read(context, move || {
            fetch_proposal(client, multisig, transaction_index)
        })
        .await
    }

    pub async fn vault_transaction(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
    ) -> Result<VaultTransaction, WorkflowError> {
        let client = &self.client;
        let context = StepContext::new(Step::ReadAccount)
            .multisig(*multisig)
            .transaction(transaction_index);
        self.read(context, move || {
            fetch_vault_transaction(client, multisig, transaction_index)
        })
        .await
    }

    pub async fn balance(&self, address: &Pubkey) -> Result<u64, WorkflowError> {
        let client = &self.client;
        with_retry(&self.config.retry, "getBalance", move || client.get_balance(address))
            .await
            .map_err(|e| WorkflowError::from_client(StepContext::new(Step::ReadAccount), e))
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Request lamports from the ledger faucet and wait for them to land
    ///
    /// Not retried: a lost response gives no signature to check first.
    pub async fn airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, WorkflowError> {
        let context = StepContext::new(Step::Airdrop);
        let signature = self
            .client
            .request_airdrop(to, lamports)
            .await
            .map_err(|e| WorkflowError::from_client(context.clone(), e))?;
        let signature = self.confirm(context, signature).await?;
        info!("Airdropped {} lamports to {}: {}", lamports, to, signature);
        Ok(signature)
    }

    /// Move lamports from the payer into a multisig vault
    pub async fn fund_vault(
        &self,
        multisig: &Pubkey,
        vault_index: u8,
        lamports: u64,
    ) -> Result<Signature, WorkflowError> {
        let vault = get_vault_pda(multisig, vault_index);
        let context = StepContext::new(Step::FundVault).multisig(*multisig);
        let signature = self
            .send_and_confirm(
                context,
                vec![system::transfer(&self.payer.pubkey(), &vault, lamports)],
                &[],
            )
            .await?;
        info!("Funded vault {} with {} lamports: {}", vault, lamports, signature);
        Ok(signature)
    }

    /// Create a multisig with the payer as creator
    pub async fn create_multisig(
        &self,
        members: Vec<Member>,
        threshold: u16,
    ) -> Result<Pubkey, WorkflowError> {
        self.create_multisig_with(members, threshold, CreateMultisigOptions::default())
            .await
            .map(|created| created.multisig)
    }

    pub async fn create_multisig_with(
        &self,
        members: Vec<Member>,
        threshold: u16,
        options: CreateMultisigOptions,
    ) -> Result<CreatedMultisig, WorkflowError> {
        let create_key = options.create_key.unwrap_or_else(Keypair::generate);
        let multisig = get_multisig_pda(&create_key.pubkey());
        let program_config = self.program_config().await?;
        debug!("Program config treasury: {}", program_config.treasury);

        let ix = instructions::multisig_create_v2(
            &program_config.treasury,
            &create_key.pubkey(),
            &self.payer.pubkey(),
            MultisigCreateArgsV2 {
                config_authority: options.config_authority,
                threshold,
                members,
                time_lock: options.time_lock,
                rent_collector: options.rent_collector,
                memo: options.memo,
            },
        );
        let context = StepContext::new(Step::CreateMultisig).multisig(multisig);
        let signature = self.send_and_confirm(context, vec![ix], &[&create_key]).await?;

        info!("Multisig created: {} ({})", multisig, signature);
        Ok(CreatedMultisig {
            multisig,
            create_key: create_key.pubkey(),
            signature,
        })
    }

    /// Propose a lamport transfer out of a vault; returns the transaction index
    pub async fn propose_transfer(
        &self,
        multisig: &Pubkey,
        vault_index: u8,
        lamports: u64,
        destination: &Pubkey,
        memo: Option<String>,
    ) -> Result<u64, WorkflowError> {
        let vault = get_vault_pda(multisig, vault_index);
        let message = VaultTransactionMessage {
            instructions: vec![system::transfer(&vault, destination, lamports)],
        };
        self.propose(multisig, vault_index, message, 0, memo).await
    }

    /// Store a vault transaction and open an active proposal for it
    ///
    /// The index is derived from a fresh read of the multisig. If another
    /// client claimed it first the registry refuses the transaction with
    /// `DuplicateTransactionIndex`, which is returned as is.
    pub async fn propose(
        &self,
        multisig: &Pubkey,
        vault_index: u8,
        message: VaultTransactionMessage,
        ephemeral_signers: u8,
        memo: Option<String>,
    ) -> Result<u64, WorkflowError> {
        let current = self.multisig(multisig).await?.transaction_index;
        let index = current + 1;

        let create = instructions::vault_transaction_create(
            multisig,
            &self.payer.pubkey(),
            &self.payer.pubkey(),
            VaultTransactionCreateArgs {
                transaction_index: index,
                vault_index,
                ephemeral_signers,
                transaction_message: message,
                memo,
            },
        );
        let context = StepContext::new(Step::CreateTransaction)
            .multisig(*multisig)
            .transaction(index);
        let signature = self.send_and_confirm(context, vec![create], &[]).await?;
        info!("Transaction created: {} (index {})", signature, index);

        let signature = self.create_proposal(multisig, index, false).await?;
        info!("Transaction proposal created: {}", signature);
        Ok(index)
    }

    /// Open a proposal for an existing vault transaction
    pub async fn create_proposal(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
        draft: bool,
    ) -> Result<Signature, WorkflowError> {
        let ix = instructions::proposal_create(
            multisig,
            &self.payer.pubkey(),
            &self.payer.pubkey(),
            transaction_index,
            draft,
        );
        let context = StepContext::new(Step::CreateProposal)
            .multisig(*multisig)
            .transaction(transaction_index);
        self.send_and_confirm(context, vec![ix], &[]).await
    }

    /// Move a draft proposal to Active
    pub async fn activate_proposal(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
        member: &Keypair,
    ) -> Result<Signature, WorkflowError> {
        let ix = instructions::proposal_activate(multisig, &member.pubkey(), transaction_index);
        let context = StepContext::new(Step::ActivateProposal)
            .multisig(*multisig)
            .transaction(transaction_index);
        self.send_and_confirm(context, vec![ix], &[member]).await
    }

    /// Record one member's vote
    ///
    /// The registry moves the proposal to Approved or Rejected when a side
    /// has enough votes; the receipt reports the tally it observed after.
    pub async fn cast_vote(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
        voter: &Keypair,
        decision: Vote,
    ) -> Result<VoteReceipt, WorkflowError> {
        let ix = match decision {
            Vote::Approve => {
                instructions::proposal_approve(multisig, &voter.pubkey(), transaction_index, None)
            }
            Vote::Reject => {
                instructions::proposal_reject(multisig, &voter.pubkey(), transaction_index, None)
            }
        };
        let context = StepContext::new(Step::Vote)
            .multisig(*multisig)
            .transaction(transaction_index);
        let signature = self.send_and_confirm(context, vec![ix], &[voter]).await?;

        // The vote stands even if the proposal cannot be read back
        let tally = match self.proposal(multisig, transaction_index).await {
            Ok(proposal) => {
                info!(
                    "{} voted {} on transaction {}: {} ({} approvals)",
                    voter.pubkey(),
                    decision,
                    transaction_index,
                    proposal.status,
                    proposal.approvals()
                );
                Some(VoteTally {
                    status: proposal.status,
                    approvals: proposal.approvals(),
                    rejections: proposal.rejections(),
                })
            }
            Err(err) => {
                warn!("Vote {} landed, reading the proposal failed: {}", signature, err);
                None
            }
        };
        Ok(VoteReceipt {
            signature,
            transaction_index,
            voter: voter.pubkey(),
            decision,
            tally,
        })
    }

    /// Execute an approved vault transaction
    ///
    /// `executor` must be a member with Execute permission; it signs the
    /// transaction alongside the payer.
    pub async fn execute_transaction(
        &self,
        multisig: &Pubkey,
        transaction_index: u64,
        executor: &Keypair,
    ) -> Result<Signature, WorkflowError> {
        let transaction = self.vault_transaction(multisig, transaction_index).await?;
        let ix = instructions::vault_transaction_execute(
            multisig,
            &executor.pubkey(),
            transaction_index,
            &transaction.message,
        );
        let context = StepContext::new(Step::Execute)
            .multisig(*multisig)
            .transaction(transaction_index);
        let signature = self.send_and_confirm(context, vec![ix], &[executor]).await?;
        info!("Transaction executed: {}", signature);
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{
        Account, Fault, LedgerConfig, SignatureStatus, SimulatedLedger, LAMPORTS_PER_SOL,
    };
    use crate::multisig::{MultisigError, Permissions};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type TestWorkflow = Workflow<Arc<SimulatedLedger>>;

    fn fast_config() -> WorkflowConfig {
        WorkflowConfig {
            poll_interval: Duration::from_millis(5),
            confirm_timeout: Duration::from_secs(5),
            retry: crate::workflow::RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
            ..WorkflowConfig::default()
        }
    }

    fn fast_ledger() -> Arc<SimulatedLedger> {
        Arc::new(SimulatedLedger::new(LedgerConfig {
            slot_duration: Duration::from_millis(10),
            ..LedgerConfig::default()
        }))
    }

    async fn funded_workflow() -> (TestWorkflow, Arc<SimulatedLedger>) {
        let ledger = fast_ledger();
        let workflow = Workflow::new(ledger.clone(), Keypair::generate(), fast_config());
        let payer = workflow.payer().pubkey();
        workflow.airdrop(&payer, 5 * LAMPORTS_PER_SOL).await.unwrap();
        (workflow, ledger)
    }

    /// Payer with every permission plus `voters` vote-only members
    async fn create(
        workflow: &TestWorkflow,
        voters: usize,
        threshold: u16,
    ) -> (Pubkey, Vec<Keypair>) {
        let others: Vec<Keypair> = (0..voters).map(|_| Keypair::generate()).collect();
        let mut members = vec![Member::new(workflow.payer().pubkey(), Permissions::all())];
        members.extend(others.iter().map(|k| Member::new(k.pubkey(), Permissions::VOTE)));
        let multisig = workflow.create_multisig(members, threshold).await.unwrap();
        workflow
            .fund_vault(&multisig, 0, LAMPORTS_PER_SOL / 10)
            .await
            .unwrap();
        (multisig, others)
    }

    #[tokio::test]
    async fn test_create_multisig_keeps_requested_threshold() {
        let (workflow, _) = funded_workflow().await;
        for (voters, threshold) in [(0, 1), (1, 1), (1, 2), (2, 2), (2, 3)] {
            let (multisig, _) = create(&workflow, voters, threshold).await;
            let state = workflow.multisig(&multisig).await.unwrap();
            assert_eq!(state.threshold, threshold);
            assert_eq!(state.transaction_index, 0);
            assert_eq!(state.members.len(), voters + 1);
        }
    }

    #[tokio::test]
    async fn test_create_multisig_rejects_threshold_above_voters() {
        let (workflow, _) = funded_workflow().await;
        let members = vec![
            Member::new(workflow.payer().pubkey(), Permissions::all()),
            Member::new(Keypair::generate().pubkey(), Permissions::INITIATE),
        ];
        let err = workflow.create_multisig(members, 2).await.unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::InvalidThreshold));
        assert_eq!(err.context().step, Step::CreateMultisig);
    }

    #[tokio::test]
    async fn test_create_multisig_without_funds() {
        let workflow = Workflow::new(fast_ledger(), Keypair::generate(), fast_config());
        let members = vec![Member::new(workflow.payer().pubkey(), Permissions::all())];
        let err = workflow.create_multisig(members, 1).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InsufficientFunds { account, .. } if account == workflow.payer().pubkey()
        ));
    }

    #[tokio::test]
    async fn test_transaction_index_increases_by_one_per_proposal() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, _) = create(&workflow, 1, 2).await;
        let destination = Pubkey::new_unique();

        for expected in 1..=3 {
            let index = workflow
                .propose_transfer(&multisig, 0, 1000, &destination, None)
                .await
                .unwrap();
            assert_eq!(index, expected);
            let proposal = workflow.proposal(&multisig, index).await.unwrap();
            assert!(matches!(proposal.status, ProposalStatus::Active { .. }));
        }
        assert_eq!(workflow.multisig(&multisig).await.unwrap().transaction_index, 3);
    }

    #[tokio::test]
    async fn test_approved_exactly_at_threshold() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, voters) = create(&workflow, 3, 3).await;
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        // Vote in reverse member order; only the third approval settles it
        let mut statuses = Vec::new();
        for voter in voters.iter().rev() {
            let receipt = workflow
                .cast_vote(&multisig, index, voter, Vote::Approve)
                .await
                .unwrap();
            statuses.push(receipt.status().unwrap());
        }
        assert!(matches!(statuses[0], ProposalStatus::Active { .. }));
        assert!(matches!(statuses[1], ProposalStatus::Active { .. }));
        assert!(matches!(statuses[2], ProposalStatus::Approved { .. }));
    }

    #[tokio::test]
    async fn test_execute_requires_approval_and_runs_once() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, voters) = create(&workflow, 1, 2).await;
        let destination = Pubkey::new_unique();
        let vault = get_vault_pda(&multisig, 0);
        let index = workflow
            .propose_transfer(&multisig, 0, 250_000, &destination, Some("pay".into()))
            .await
            .unwrap();

        workflow
            .cast_vote(&multisig, index, workflow.payer(), Vote::Approve)
            .await
            .unwrap();
        let err = workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::ProposalNotApproved));
        assert_eq!(err.context().transaction_index, Some(index));

        workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap();
        let vault_before = workflow.balance(&vault).await.unwrap();
        workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap();
        assert_eq!(workflow.balance(&vault).await.unwrap(), vault_before - 250_000);
        assert_eq!(workflow.balance(&destination).await.unwrap(), 250_000);

        let err = workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::AlreadyExecuted));
        assert_eq!(workflow.balance(&destination).await.unwrap(), 250_000);
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected_without_counting() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, voters) = create(&workflow, 2, 3).await;
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap();
        let err = workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::DuplicateVote));
        assert_eq!(workflow.proposal(&multisig, index).await.unwrap().approvals(), 1);
    }

    #[tokio::test]
    async fn test_outsider_cannot_vote() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, _) = create(&workflow, 1, 2).await;
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        let err = workflow
            .cast_vote(&multisig, index, &Keypair::generate(), Vote::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::UnauthorizedVoter));
    }

    #[tokio::test]
    async fn test_rejection_closes_proposal() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, voters) = create(&workflow, 1, 2).await;
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        let receipt = workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Reject)
            .await
            .unwrap();
        let tally = receipt.tally.unwrap();
        assert!(matches!(tally.status, ProposalStatus::Rejected { .. }));
        assert_eq!(tally.rejections, 1);

        let err = workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::ProposalNotApproved));
    }

    #[tokio::test]
    async fn test_draft_proposal_flow() {
        let (workflow, _) = funded_workflow().await;
        let (multisig, voters) = create(&workflow, 1, 1).await;
        let vault = get_vault_pda(&multisig, 0);
        let message = VaultTransactionMessage {
            instructions: vec![system::transfer(&vault, &Pubkey::new_unique(), 1)],
        };

        // Store the transaction alone, then open a draft proposal for it
        let index = workflow.multisig(&multisig).await.unwrap().transaction_index + 1;
        let create = instructions::vault_transaction_create(
            &multisig,
            &workflow.payer().pubkey(),
            &workflow.payer().pubkey(),
            VaultTransactionCreateArgs {
                transaction_index: index,
                vault_index: 0,
                ephemeral_signers: 0,
                transaction_message: message,
                memo: None,
            },
        );
        workflow
            .send_and_confirm(StepContext::new(Step::CreateTransaction), vec![create], &[])
            .await
            .unwrap();
        workflow.create_proposal(&multisig, index, true).await.unwrap();

        let err = workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::ProposalNotActive));

        workflow
            .activate_proposal(&multisig, index, workflow.payer())
            .await
            .unwrap();
        let receipt = workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap();
        assert!(matches!(receipt.status(), Some(ProposalStatus::Approved { .. })));
    }

    #[tokio::test]
    async fn test_time_lock_blocks_early_execution() {
        let (workflow, ledger) = funded_workflow().await;
        let members = vec![Member::new(workflow.payer().pubkey(), Permissions::all())];
        let created = workflow
            .create_multisig_with(
                members,
                1,
                CreateMultisigOptions {
                    time_lock: 3600,
                    ..CreateMultisigOptions::default()
                },
            )
            .await
            .unwrap();
        let multisig = created.multisig;
        workflow.fund_vault(&multisig, 0, 1_000_000).await.unwrap();
        let index = workflow
            .propose_transfer(&multisig, 0, 10, &Pubkey::new_unique(), None)
            .await
            .unwrap();
        workflow
            .cast_vote(&multisig, index, workflow.payer(), Vote::Approve)
            .await
            .unwrap();

        let err = workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::TimeLockNotReleased));

        ledger.warp_clock(3600);
        workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_not_a_rejection() {
        let (_, ledger) = funded_workflow().await;
        let workflow = Workflow::new(
            ledger.clone(),
            Keypair::generate(),
            WorkflowConfig {
                confirm_timeout: Duration::from_millis(100),
                ..fast_config()
            },
        );
        ledger.halt();
        let err = workflow
            .airdrop(&workflow.payer().pubkey(), LAMPORTS_PER_SOL)
            .await
            .unwrap_err();
        let WorkflowError::ConfirmationTimeout { signature, .. } = err else {
            panic!("expected a timeout, got {:?}", err);
        };

        // The transaction did land; it just had not been confirmed yet
        ledger.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = ledger.get_signature_status(&signature).await.unwrap().unwrap();
        assert!(status.err.is_none());
        assert!(status.satisfies(crate::ledger::Commitment::Confirmed));
    }

    /// Unreliable link to a simulated ledger
    struct LossyLink {
        ledger: Arc<SimulatedLedger>,
        /// Faults applied to the next `send_transaction` calls, last first
        send_faults: Mutex<Vec<Fault>>,
        /// Number of upcoming signature status lookups that fail
        status_outages: AtomicU32,
        /// Number of upcoming account reads that fail
        account_outages: AtomicU32,
    }

    impl LossyLink {
        fn new(ledger: Arc<SimulatedLedger>) -> Self {
            Self {
                ledger,
                send_faults: Mutex::new(Vec::new()),
                status_outages: AtomicU32::new(0),
                account_outages: AtomicU32::new(0),
            }
        }

        fn fail_sends(&self, fault: Fault, times: usize) {
            self.send_faults.lock().unwrap().extend(std::iter::repeat(fault).take(times));
        }
    }

    fn take_outage(counter: &AtomicU32) -> Result<(), ClientError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(ClientError::Network("link down".into())),
            Err(_) => Ok(()),
        }
    }

    impl LedgerClient for LossyLink {
        async fn request_airdrop(
            &self,
            to: &Pubkey,
            lamports: u64,
        ) -> Result<Signature, ClientError> {
            self.ledger.request_airdrop(to, lamports).await
        }

        async fn get_latest_blockhash(&self) -> Result<Hash, ClientError> {
            self.ledger.get_latest_blockhash().await
        }

        async fn send_transaction(
            &self,
            tx: &Transaction,
            options: SendOptions,
        ) -> Result<Signature, ClientError> {
            let fault = self.send_faults.lock().unwrap().pop();
            if let Some(fault) = fault {
                self.ledger.inject_fault(fault);
            }
            self.ledger.send_transaction(tx, options).await
        }

        async fn get_signature_status(
            &self,
            signature: &Signature,
        ) -> Result<Option<SignatureStatus>, ClientError> {
            take_outage(&self.status_outages)?;
            self.ledger.get_signature_status(signature).await
        }

        async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError> {
            take_outage(&self.account_outages)?;
            self.ledger.get_account(address).await
        }

        async fn get_slot(&self) -> Result<u64, ClientError> {
            self.ledger.get_slot().await
        }
    }

    async fn lossy_workflow() -> (Workflow<LossyLink>, Pubkey) {
        let workflow = Workflow::new(
            LossyLink::new(fast_ledger()),
            Keypair::generate(),
            fast_config(),
        );
        let payer = workflow.payer().pubkey();
        workflow.airdrop(&payer, LAMPORTS_PER_SOL).await.unwrap();
        let multisig = workflow
            .create_multisig(vec![Member::new(payer, Permissions::all())], 1)
            .await
            .unwrap();
        (workflow, multisig)
    }

    #[tokio::test]
    async fn test_lost_send_is_checked_before_resending() {
        for fault in [Fault::DropRequest, Fault::DropResponse] {
            let (workflow, multisig) = lossy_workflow().await;
            let payer = workflow.payer().pubkey();
            let balance = workflow.balance(&payer).await.unwrap();

            workflow.client().fail_sends(fault, 1);
            workflow.fund_vault(&multisig, 0, 100_000).await.unwrap();

            // Exactly one transfer and one fee, whichever half was lost
            let vault = get_vault_pda(&multisig, 0);
            assert_eq!(workflow.balance(&vault).await.unwrap(), 100_000);
            assert_eq!(
                workflow.balance(&payer).await.unwrap(),
                balance - 100_000 - 5000
            );
        }
    }

    #[tokio::test]
    async fn test_landed_send_found_after_last_retry() {
        let (workflow, multisig) = lossy_workflow().await;
        let link = workflow.client();
        let lookups_per_check = fast_config().retry.max_retries + 1;

        // Every response is lost and only the final status check gets through
        link.fail_sends(Fault::DropResponse, 4);
        link.status_outages.store(3 * lookups_per_check, Ordering::SeqCst);
        workflow.fund_vault(&multisig, 0, 100_000).await.unwrap();

        let vault = get_vault_pda(&multisig, 0);
        assert_eq!(workflow.balance(&vault).await.unwrap(), 100_000);
    }

    #[tokio::test]
    async fn test_unsent_transaction_reports_its_signature() {
        let (workflow, multisig) = lossy_workflow().await;
        workflow.client().fail_sends(Fault::DropRequest, 4);

        let err = workflow.fund_vault(&multisig, 0, 100_000).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NetworkFailure { .. }));
        let signature = err.unconfirmed_signature().unwrap();
        assert!(workflow
            .client()
            .get_signature_status(&signature)
            .await
            .unwrap()
            .is_none());
        let vault = get_vault_pda(&multisig, 0);
        assert_eq!(workflow.balance(&vault).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vote_stands_when_read_back_fails() {
        let (workflow, multisig) = lossy_workflow().await;
        workflow.fund_vault(&multisig, 0, 100_000).await.unwrap();
        let index = workflow
            .propose_transfer(&multisig, 0, 10, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        let link = workflow.client();
        link.account_outages
            .store(fast_config().retry.max_retries + 1, Ordering::SeqCst);
        let receipt = workflow
            .cast_vote(&multisig, index, workflow.payer(), Vote::Approve)
            .await
            .unwrap();
        assert_eq!(receipt.tally, None);

        let status = link.get_signature_status(&receipt.signature).await.unwrap();
        assert!(status.unwrap().err.is_none());
        let proposal = workflow.proposal(&multisig, index).await.unwrap();
        assert!(matches!(proposal.status, ProposalStatus::Approved { .. }));
    }

    fn processed_config() -> WorkflowConfig {
        WorkflowConfig {
            commitment: crate::ledger::Commitment::Processed,
            ..fast_config()
        }
    }

    #[tokio::test]
    async fn test_repeated_step_in_one_slot_reaches_the_registry() {
        let ledger = fast_ledger();
        let workflow = Workflow::new(ledger.clone(), Keypair::generate(), processed_config());
        let payer = workflow.payer().pubkey();
        workflow.airdrop(&payer, LAMPORTS_PER_SOL).await.unwrap();
        let (multisig, voters) = create(&workflow, 2, 3).await;
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &Pubkey::new_unique(), None)
            .await
            .unwrap();

        // A halted ledger keeps handing out the same blockhash
        ledger.halt();
        workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap();
        let resumer = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            resumer.resume();
        });
        let err = workflow
            .cast_vote(&multisig, index, &voters[0], Vote::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::DuplicateVote));
        assert_eq!(workflow.proposal(&multisig, index).await.unwrap().approvals(), 1);
    }

    #[tokio::test]
    async fn test_repeated_execute_in_one_slot_is_already_executed() {
        let ledger = fast_ledger();
        let workflow = Workflow::new(ledger.clone(), Keypair::generate(), processed_config());
        let payer = workflow.payer().pubkey();
        workflow.airdrop(&payer, LAMPORTS_PER_SOL).await.unwrap();
        let (multisig, _) = create(&workflow, 0, 1).await;
        let destination = Pubkey::new_unique();
        let index = workflow
            .propose_transfer(&multisig, 0, 1000, &destination, None)
            .await
            .unwrap();
        workflow
            .cast_vote(&multisig, index, workflow.payer(), Vote::Approve)
            .await
            .unwrap();

        ledger.halt();
        workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap();
        let resumer = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            resumer.resume();
        });
        let err = workflow
            .execute_transaction(&multisig, index, workflow.payer())
            .await
            .unwrap_err();
        assert_eq!(err.registry_error(), Some(MultisigError::AlreadyExecuted));
        assert_eq!(workflow.balance(&destination).await.unwrap(), 1000);
    }
}
