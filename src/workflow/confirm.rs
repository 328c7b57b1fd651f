//! Retries and confirmation polling

use crate::crypto::Signature;
use crate::ledger::{ClientError, Commitment, LedgerClient, SignatureStatus, TransactionError};
use crate::workflow::config::RetryPolicy;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Final state of a submitted transaction as far as the client can tell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Landed successfully and reached the requested commitment
    Confirmed(SignatureStatus),
    /// Landed but failed; the fee was still charged
    Failed(TransactionError),
    /// Not observed at the requested commitment before the deadline
    TimedOut,
}

/// Run `op`, retrying network failures with exponential backoff
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    what, err, attempt, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

fn classify(status: Option<SignatureStatus>, commitment: Commitment) -> Option<Confirmation> {
    let status = status?;
    if let Some(err) = status.err {
        return Some(Confirmation::Failed(err));
    }
    if status.satisfies(commitment) {
        return Some(Confirmation::Confirmed(status));
    }
    None
}

/// Poll a signature until it reaches `commitment`, fails, or `timeout` passes
///
/// Network errors while polling count as "not seen yet". When the deadline
/// passes the status is queried once more, with retries, before reporting
/// a timeout.
pub async fn confirm_transaction<C: LedgerClient>(
    client: &C,
    signature: &Signature,
    commitment: Commitment,
    timeout: Duration,
    poll_interval: Duration,
    retry: &RetryPolicy,
) -> Result<Confirmation, ClientError> {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        match client.get_signature_status(signature).await {
            Ok(status) => {
                if let Some(outcome) = classify(status, commitment) {
                    return Ok(outcome);
                }
            }
            Err(err) => debug!("Status poll for {} failed: {}", signature, err),
        }
        tokio::time::sleep(poll_interval).await;
    }

    let status = with_retry(retry, "getSignatureStatus", || {
        client.get_signature_status(signature)
    })
    .await?;
    Ok(classify(status, commitment).unwrap_or(Confirmation::TimedOut))
}
