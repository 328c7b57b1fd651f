//! On-ledger state of the multisig program
//!
//! Account data is an 8-byte discriminator followed by the JSON encoding of
//! the state struct.

use crate::crypto::{sha256, Pubkey};
use crate::ledger::Instruction;
use crate::multisig::error::MultisigError;
use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum time lock: 3 months in seconds
pub const MAX_TIME_LOCK: u32 = 3 * 30 * 24 * 60 * 60;

/// Encoding shared by every account the program owns
pub trait AccountState: Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn discriminator() -> [u8; 8] {
        let hash = sha256(format!("account:{}", Self::NAME).as_bytes());
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&hash[..8]);
        discriminator
    }

    fn to_account_data(&self) -> Vec<u8> {
        let mut data = Self::discriminator().to_vec();
        data.extend(serde_json::to_vec(self).unwrap_or_default());
        data
    }

    fn try_from_account_data(data: &[u8]) -> Result<Self, MultisigError> {
        if data.len() < 8 || data[..8] != Self::discriminator() {
            return Err(MultisigError::InvalidAccountData);
        }
        serde_json::from_slice(&data[8..]).map_err(|_| MultisigError::InvalidAccountData)
    }
}

bitflags! {
    /// What a member may do
    ///
    /// `INITIATE` covers proposing transactions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Permissions: u8 {
        const INITIATE = 1 << 0;
        const VOTE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

/// A multisig member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub key: Pubkey,
    pub permissions: Permissions,
}

impl Member {
    pub fn new(key: Pubkey, permissions: Permissions) -> Self {
        Self { key, permissions }
    }
}

/// Global program settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Key allowed to change the settings
    pub authority: Pubkey,
    /// Lamports charged for every multisig created
    pub multisig_creation_fee: u64,
    /// Receives creation fees
    pub treasury: Pubkey,
}

impl AccountState for ProgramConfig {
    const NAME: &'static str = "ProgramConfig";
}

/// A multisig account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multisig {
    /// Key used to seed the multisig address
    pub create_key: Pubkey,
    /// Key that may change the configuration directly; `None` means
    /// configuration changes go through member votes
    pub config_authority: Option<Pubkey>,
    /// Approvals required to pass a proposal
    pub threshold: u16,
    /// Seconds between approval and execution
    pub time_lock: u32,
    /// Index of the last transaction created; 0 means none yet
    pub transaction_index: u64,
    /// Transactions up to this index are stale
    pub stale_transaction_index: u64,
    /// Where rent of closed accounts goes, if reclamation is enabled
    pub rent_collector: Option<Pubkey>,
    /// Members sorted by key
    pub members: Vec<Member>,
}

impl AccountState for Multisig {
    const NAME: &'static str = "Multisig";
}

impl Multisig {
    pub fn num_voters(members: &[Member]) -> usize {
        members
            .iter()
            .filter(|m| m.permissions.contains(Permissions::VOTE))
            .count()
    }

    pub fn num_proposers(members: &[Member]) -> usize {
        members
            .iter()
            .filter(|m| m.permissions.contains(Permissions::INITIATE))
            .count()
    }

    pub fn num_executors(members: &[Member]) -> usize {
        members
            .iter()
            .filter(|m| m.permissions.contains(Permissions::EXECUTE))
            .count()
    }

    /// Returns the position of `key` in `members`, if it is a member
    pub fn is_member(&self, key: &Pubkey) -> Option<usize> {
        self.members.binary_search_by_key(key, |m| m.key).ok()
    }

    pub fn member_has_permission(&self, key: &Pubkey, permission: Permissions) -> bool {
        match self.is_member(key) {
            Some(index) => self.members[index].permissions.contains(permission),
            None => false,
        }
    }

    /// Rejections needed to make approval impossible
    ///
    /// For example: 7 voters, threshold 3, cutoff 5.
    pub fn cutoff(&self) -> usize {
        (Self::num_voters(&self.members) + 1).saturating_sub(usize::from(self.threshold))
    }

    /// Sort members and check every configuration invariant
    pub fn validate(&mut self) -> Result<(), MultisigError> {
        if self.members.is_empty() {
            return Err(MultisigError::EmptyMembers);
        }
        if self.members.len() > usize::from(u16::MAX) {
            return Err(MultisigError::TooManyMembers);
        }

        self.members.sort_by_key(|m| m.key);
        if self.members.windows(2).any(|w| w[0].key == w[1].key) {
            return Err(MultisigError::DuplicateMember);
        }
        if self
            .members
            .iter()
            .any(|m| m.permissions.bits() & !Permissions::all().bits() != 0)
        {
            return Err(MultisigError::UnknownPermission);
        }

        if Self::num_proposers(&self.members) == 0 {
            return Err(MultisigError::NoProposers);
        }
        if Self::num_executors(&self.members) == 0 {
            return Err(MultisigError::NoExecutors);
        }
        let voters = Self::num_voters(&self.members);
        if voters == 0 {
            return Err(MultisigError::NoVoters);
        }
        if self.threshold == 0 || usize::from(self.threshold) > voters {
            return Err(MultisigError::InvalidThreshold);
        }
        if self.time_lock > MAX_TIME_LOCK {
            return Err(MultisigError::TimeLockExceedsMaxAllowed);
        }

        Ok(())
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, Self::num_voters(&self.members))
    }
}

/// Instructions stored in a vault transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransactionMessage {
    pub instructions: Vec<Instruction>,
}

/// A proposed set of instructions to run from a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub multisig: Pubkey,
    /// Member that created the transaction
    pub creator: Pubkey,
    /// Index of this transaction within the multisig
    pub index: u64,
    /// Vault the instructions run from
    pub vault_index: u8,
    /// Number of extra program-derived signers the instructions need
    pub ephemeral_signer_count: u8,
    pub message: VaultTransactionMessage,
    pub memo: Option<String>,
}

impl AccountState for VaultTransaction {
    const NAME: &'static str = "VaultTransaction";
}

/// A member's decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Approve,
    Reject,
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Approve => f.write_str("approve"),
            Vote::Reject => f.write_str("reject"),
        }
    }
}

/// Proposal lifecycle; every state records the ledger time it was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Draft { timestamp: i64 },
    Active { timestamp: i64 },
    Rejected { timestamp: i64 },
    Approved { timestamp: i64 },
    Executed { timestamp: i64 },
}

impl ProposalStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ProposalStatus::Draft { .. } => "Draft",
            ProposalStatus::Active { .. } => "Active",
            ProposalStatus::Rejected { .. } => "Rejected",
            ProposalStatus::Approved { .. } => "Approved",
            ProposalStatus::Executed { .. } => "Executed",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match *self {
            ProposalStatus::Draft { timestamp }
            | ProposalStatus::Active { timestamp }
            | ProposalStatus::Rejected { timestamp }
            | ProposalStatus::Approved { timestamp }
            | ProposalStatus::Executed { timestamp } => timestamp,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected { .. } | ProposalStatus::Executed { .. }
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Voting record for one vault transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub multisig: Pubkey,
    pub transaction_index: u64,
    pub status: ProposalStatus,
    pub votes: BTreeMap<Pubkey, Vote>,
}

impl AccountState for Proposal {
    const NAME: &'static str = "Proposal";
}

impl Proposal {
    pub fn new(multisig: Pubkey, transaction_index: u64, status: ProposalStatus) -> Self {
        Self {
            multisig,
            transaction_index,
            status,
            votes: BTreeMap::new(),
        }
    }

    pub fn approvals(&self) -> usize {
        self.votes.values().filter(|v| **v == Vote::Approve).count()
    }

    pub fn rejections(&self) -> usize {
        self.votes.values().filter(|v| **v == Vote::Reject).count()
    }

    pub fn has_voted(&self, member: &Pubkey) -> bool {
        self.votes.contains_key(member)
    }

    /// Record a vote and settle the proposal once a side has enough votes
    pub fn record_vote(
        &mut self,
        member: Pubkey,
        vote: Vote,
        threshold: usize,
        cutoff: usize,
        now: i64,
    ) -> Result<(), MultisigError> {
        if !matches!(self.status, ProposalStatus::Active { .. }) {
            return Err(MultisigError::ProposalNotActive);
        }
        if self.has_voted(&member) {
            return Err(MultisigError::DuplicateVote);
        }

        self.votes.insert(member, vote);

        if self.approvals() >= threshold {
            self.status = ProposalStatus::Approved { timestamp: now };
        } else if self.rejections() >= cutoff {
            self.status = ProposalStatus::Rejected { timestamp: now };
        }
        Ok(())
    }
}
