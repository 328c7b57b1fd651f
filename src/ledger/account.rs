//! Ledger accounts and rent
//!
//! Every address on the ledger maps to an `Account` holding lamports, an
//! owning program and opaque data. Accounts that carry data must hold at least
//! the rent-exempt minimum for their size.

use crate::crypto::Pubkey;
use serde::{Deserialize, Serialize};

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Per-account bookkeeping bytes counted towards rent
pub const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

/// Default rent rate (lamports per byte-year)
pub const DEFAULT_LAMPORTS_PER_BYTE_YEAR: u64 = 3480;

/// Years of rent an account must hold up front to be exempt
pub const DEFAULT_EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// A ledger account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Balance in lamports
    pub lamports: u64,
    /// Account data, interpreted by the owning program
    pub data: Vec<u8>,
    /// Program allowed to modify `data` and debit `lamports`
    pub owner: Pubkey,
}

impl Account {
    pub fn new(lamports: u64, data: Vec<u8>, owner: Pubkey) -> Self {
        Self {
            lamports,
            data,
            owner,
        }
    }

    /// Plain wallet account owned by the system program
    pub fn system(lamports: u64) -> Self {
        Self::new(lamports, Vec::new(), crate::ledger::system::ID)
    }
}

/// Rent schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rent {
    pub lamports_per_byte_year: u64,
    pub exemption_threshold_years: u64,
}

impl Default for Rent {
    fn default() -> Self {
        Self {
            lamports_per_byte_year: DEFAULT_LAMPORTS_PER_BYTE_YEAR,
            exemption_threshold_years: DEFAULT_EXEMPTION_THRESHOLD_YEARS,
        }
    }
}

impl Rent {
    /// Minimum balance for an account holding `data_len` bytes
    pub fn minimum_balance(&self, data_len: usize) -> u64 {
        (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
            * self.lamports_per_byte_year
            * self.exemption_threshold_years
    }

    pub fn is_exempt(&self, lamports: u64, data_len: usize) -> bool {
        lamports >= self.minimum_balance(data_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_balance() {
        let rent = Rent::default();
        // Empty accounts still pay for the storage overhead
        assert_eq!(rent.minimum_balance(0), 890_880);
        assert_eq!(rent.minimum_balance(100), 228 * 3480 * 2);
        assert!(rent.is_exempt(890_880, 0));
        assert!(!rent.is_exempt(890_879, 0));
    }
}
