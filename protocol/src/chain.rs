//! # Chain access
//!
//! Everything above the ledger speaks to a chain through [`ChainClient`]:
//! fetch an account snapshot, submit a signed transaction, wait for the
//! verdict. The trait keeps contract and CLI code indifferent to whether
//! the other end is a real node or the in-process [`LocalChain`] used by
//! demos and tests.
//!
//! Submission verdicts are two-layered on purpose. `submit` answers with
//! a [`SubmitStatus`] inside an `Ok` receipt whenever the chain itself
//! produced the verdict, acceptance or rejection alike; `Err` is reserved
//! for the cases where no verdict exists, such as transport failure or
//! asking about a hash the chain has never seen. [`submit_with_backoff`]
//! builds the standard retry loop on top: resubmit the identical bundle
//! with capped exponential delays until it is accepted or attempts run
//! out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SUBMIT_BACKOFF_INITIAL, SUBMIT_BACKOFF_MAX, SUBMIT_MAX_ATTEMPTS};
use crate::ledger::{
    AccountId, AccountSnapshot, Ledger, LedgerView, Receipt, SignedTransaction, TokenId, TxId,
};

// ---------------------------------------------------------------------------
// Errors and verdicts
// ---------------------------------------------------------------------------

/// Failure to obtain a verdict from the chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No transaction with this id has been submitted here.
    #[error("unknown transaction {hash}")]
    UnknownTransaction { hash: TxId },

    /// Every submission attempt was turned away.
    #[error("submission gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The transaction did not land within the wait window.
    #[error("transaction {hash} not included after {waited:?}")]
    InclusionTimeout { hash: TxId, waited: Duration },
}

/// The chain's answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Accepted; inclusion is pending.
    Pending,
    /// Turned away at validation, with the chain's reason.
    Rejected { reason: String },
}

/// What `submit` hands back once the chain has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Id of the submitted transaction.
    pub hash: TxId,
    /// The chain's verdict on this submission.
    pub status: SubmitStatus,
    /// Client-side correlation id, fresh per submission.
    pub submission_id: Uuid,
}

impl SubmitReceipt {
    /// True when the submission was accepted.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, SubmitStatus::Pending)
    }
}

/// Terminal verdict for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InclusionStatus {
    /// Applied, with the ledger's receipt.
    Included { receipt: Receipt },
    /// Definitively failed validation.
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Async access to a Tandem chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Snapshot of one `(account, token)` entry as the chain sees it.
    async fn fetch_account_state(
        &self,
        account: &AccountId,
        token_id: &TokenId,
    ) -> AccountSnapshot;

    /// Submit a signed transaction. Validation verdicts come back in the
    /// receipt's status; `Err` means no verdict could be obtained.
    async fn submit(&self, signed: &SignedTransaction) -> Result<SubmitReceipt, ChainError>;

    /// Wait until the chain has a terminal verdict for `hash`.
    ///
    /// Implementations may give up and return
    /// [`ChainError::InclusionTimeout`] after their wait window.
    async fn wait_for_inclusion(&self, hash: &TxId) -> Result<InclusionStatus, ChainError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn fetch_account_state(
        &self,
        account: &AccountId,
        token_id: &TokenId,
    ) -> AccountSnapshot {
        (**self).fetch_account_state(account, token_id).await
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<SubmitReceipt, ChainError> {
        (**self).submit(signed).await
    }

    async fn wait_for_inclusion(&self, hash: &TxId) -> Result<InclusionStatus, ChainError> {
        (**self).wait_for_inclusion(hash).await
    }
}

// ---------------------------------------------------------------------------
// In-process chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum InclusionRecord {
    Included(Receipt),
    Failed(String),
}

/// A full chain in one process: a [`Ledger`] behind a lock, applying
/// each submission the moment it arrives.
///
/// Inclusion is instant, but `submit` still answers
/// [`SubmitStatus::Pending`] so callers exercise the same
/// submit-then-wait path they would against a node. Handles are cheap
/// clones sharing the same ledger.
#[derive(Debug, Clone, Default)]
pub struct LocalChain {
    ledger: Arc<RwLock<Ledger>>,
    verdicts: Arc<RwLock<HashMap<TxId, InclusionRecord>>>,
}

impl LocalChain {
    /// An empty chain at height zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain with the given accounts pre-funded in native motes.
    pub fn with_funded_accounts(accounts: &[(AccountId, u64)]) -> Self {
        let chain = Self::new();
        {
            let mut ledger = chain.ledger.write();
            for (account, motes) in accounts {
                ledger.fund(*account, TokenId::NATIVE, *motes);
            }
        }
        debug!(count = accounts.len(), "seeded local chain accounts");
        chain
    }

    /// Register `owner` as a token owner, returning the derived id.
    pub fn register_token(&self, owner: AccountId) -> TokenId {
        self.ledger.write().register_token(owner)
    }

    /// Credit an entry outside any transaction. Test and demo plumbing.
    pub fn fund(&self, account: AccountId, token_id: TokenId, amount: u64) {
        self.ledger.write().fund(account, token_id, amount);
    }

    /// Balance of one entry in motes.
    pub fn balance(&self, account: &AccountId, token_id: &TokenId) -> u64 {
        self.ledger.read().balance(account, token_id)
    }

    /// Sequence number of an account's native entry.
    pub fn account_nonce(&self, account: &AccountId) -> u64 {
        self.ledger.read().account_nonce(account)
    }

    /// Number of transactions applied so far.
    pub fn height(&self) -> u64 {
        self.ledger.read().height()
    }

    /// Merkle root over the current ledger contents.
    pub fn state_root(&self) -> [u8; 32] {
        self.ledger.read().state_root()
    }
}

impl LedgerView for LocalChain {
    fn fetch_account_state(&self, account: &AccountId, token_id: &TokenId) -> AccountSnapshot {
        self.ledger.read().fetch_account_state(account, token_id)
    }
}

#[async_trait]
impl ChainClient for LocalChain {
    async fn fetch_account_state(
        &self,
        account: &AccountId,
        token_id: &TokenId,
    ) -> AccountSnapshot {
        LedgerView::fetch_account_state(self, account, token_id)
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<SubmitReceipt, ChainError> {
        let hash = signed.transaction.id();
        let submission_id = Uuid::new_v4();

        // An included transaction stays included; a resubmission must
        // not downgrade its verdict to the nonce failure it would now
        // hit.
        if matches!(
            self.verdicts.read().get(&hash),
            Some(InclusionRecord::Included(_))
        ) {
            debug!(%hash, %submission_id, "resubmission of included transaction, no-op");
            return Ok(SubmitReceipt {
                hash,
                status: SubmitStatus::Pending,
                submission_id,
            });
        }

        let outcome = self.ledger.write().apply_transaction(signed);
        match outcome {
            Ok(receipt) => {
                info!(%hash, %submission_id, height = receipt.height, "transaction included");
                self.verdicts
                    .write()
                    .insert(hash, InclusionRecord::Included(receipt));
                Ok(SubmitReceipt {
                    hash,
                    status: SubmitStatus::Pending,
                    submission_id,
                })
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(%hash, %submission_id, %reason, "transaction rejected");
                self.verdicts
                    .write()
                    .insert(hash, InclusionRecord::Failed(reason.clone()));
                Ok(SubmitReceipt {
                    hash,
                    status: SubmitStatus::Rejected { reason },
                    submission_id,
                })
            }
        }
    }

    async fn wait_for_inclusion(&self, hash: &TxId) -> Result<InclusionStatus, ChainError> {
        match self.verdicts.read().get(hash) {
            Some(InclusionRecord::Included(receipt)) => Ok(InclusionStatus::Included {
                receipt: receipt.clone(),
            }),
            Some(InclusionRecord::Failed(reason)) => Ok(InclusionStatus::Failed {
                reason: reason.clone(),
            }),
            None => Err(ChainError::UnknownTransaction { hash: *hash }),
        }
    }
}

// ---------------------------------------------------------------------------
// Retrying submission
// ---------------------------------------------------------------------------

/// Submit with capped exponential backoff on rejection.
///
/// Every attempt resubmits the identical signed bundle; the helper
/// never re-signs, renumbers, or otherwise alters it. Rejections are
/// treated as possibly transient (a pending nonce about to clear, a
/// precondition about to settle) until the attempt budget runs out.
pub async fn submit_with_backoff<C>(
    client: &C,
    signed: &SignedTransaction,
) -> Result<SubmitReceipt, ChainError>
where
    C: ChainClient + ?Sized,
{
    let hash = signed.transaction.id();
    let mut delay = SUBMIT_BACKOFF_INITIAL;
    let mut last_error = String::new();

    for attempt in 1..=SUBMIT_MAX_ATTEMPTS {
        let receipt = client.submit(signed).await?;
        match receipt.status {
            SubmitStatus::Pending => {
                debug!(%hash, attempt, "submission accepted");
                return Ok(receipt);
            }
            SubmitStatus::Rejected { ref reason } => {
                warn!(%hash, attempt, %reason, "submission rejected, backing off");
                last_error = reason.clone();
            }
        }
        if attempt < SUBMIT_MAX_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(SUBMIT_BACKOFF_MAX);
        }
    }

    Err(ChainError::RetriesExhausted {
        attempts: SUBMIT_MAX_ATTEMPTS,
        last_error,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
