//! Broadcast tracking: poll the node until the transaction reaches a terminal
//! execution state or the time budget runs out.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::node::{ExecutionState, NodeClient, NodeState, TransactionData};

/// Time budget and spacing for execution-state queries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(2),
        }
    }
}

/// Where a transaction is in its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Built,
    DryRun,
    Broadcast,
    Polling,
    Succeeded,
    Failed,
    Unverified,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::DryRun
                | LifecycleState::Succeeded
                | LifecycleState::Failed
                | LifecycleState::Unverified
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Built => "built",
            LifecycleState::DryRun => "dry_run",
            LifecycleState::Broadcast => "broadcast",
            LifecycleState::Polling => "polling",
            LifecycleState::Succeeded => "succeeded",
            LifecycleState::Failed => "failed",
            LifecycleState::Unverified => "unverified",
        })
    }
}

/// Terminal classification of a broadcast transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TransactionOutcome {
    pub tx_hash: String,
    /// A terminal state was observed.
    pub verified: bool,
    pub succeeded: bool,
    pub state: Option<ExecutionState>,
    pub result_payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_comment: Option<String>,
}

impl TransactionOutcome {
    fn terminal(tx_hash: &str, state: ExecutionState, tx: TransactionData) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            verified: true,
            succeeded: state == ExecutionState::Halt,
            state: Some(state),
            result_payload: tx.result,
            debug_comment: tx.debug_comment,
        }
    }

    fn unverified(tx_hash: &str) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            verified: false,
            succeeded: false,
            state: None,
            result_payload: String::new(),
            debug_comment: None,
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        match (self.verified, self.succeeded) {
            (true, true) => LifecycleState::Succeeded,
            (true, false) => LifecycleState::Failed,
            (false, _) => LifecycleState::Unverified,
        }
    }
}

/// Poll `node` for `tx_hash` until Halt, Break/Fault, or the policy timeout.
///
/// Query errors and unrecognized states are logged and polling continues.
/// Each query is cut off at whatever is left of the budget. Never fails: running out of budget yields an unverified outcome.
pub async fn wait_for_tx<N>(node: &N, tx_hash: &str, policy: &PollPolicy) -> TransactionOutcome
where
    N: NodeClient + ?Sized,
{
    let start = Instant::now();
    info!(
        tx_hash,
        timeout_secs = policy.timeout.as_secs(),
        "waiting for transaction execution state"
    );

    while start.elapsed() < policy.timeout {
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        match timeout(remaining, node.get_transaction(tx_hash)).await {
            Ok(Ok(tx)) => {
                debug!(tx_hash, state = %tx.state, "getTransaction");
                match tx.state {
                    NodeState::Known(ExecutionState::Running) => {}
                    NodeState::Known(ExecutionState::Halt) => {
                        info!(tx_hash, "transaction succeeded");
                        return TransactionOutcome::terminal(tx_hash, ExecutionState::Halt, tx);
                    }
                    NodeState::Known(state) => {
                        warn!(
                            tx_hash,
                            state = state.name(),
                            result = %tx.result,
                            debug_comment = tx.debug_comment.as_deref().unwrap_or_default(),
                            "transaction failed"
                        );
                        return TransactionOutcome::terminal(tx_hash, state, tx);
                    }
                    // TODO: decide whether an unknown state should end polling once the
                    // node's full state list is documented.
                    NodeState::Unknown(ref raw) => {
                        warn!(tx_hash, state = %raw, "unknown execution state, still polling");
                    }
                }
            }
            Ok(Err(err)) => {
                warn!(tx_hash, error = %err, "error while checking transaction status (will retry)");
            }
            Err(_) => {
                warn!(tx_hash, "status query outlived the polling budget");
                continue;
            }
        }
        sleep(policy.interval).await;
    }

    warn!(
        tx_hash,
        "unable to verify transaction execution state in time; check it manually"
    );
    TransactionOutcome::unverified(tx_hash)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::NodeError;

    /// Accepts every query and never answers.
    #[derive(Default)]
    struct StalledNode {
        queries: AtomicUsize,
    }

    #[async_trait]
    impl NodeClient for StalledNode {
        async fn send_transaction(&self, _tx_hex: &str) -> Result<String, NodeError> {
            Ok("hash".into())
        }

        async fn get_transaction(&self, _tx_hash: &str) -> Result<TransactionData, NodeError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_query_cannot_outlast_the_budget() {
        let node = StalledNode::default();
        let started = Instant::now();

        let outcome = wait_for_tx(&node, "hash", &PollPolicy::default()).await;

        assert_eq!(outcome.lifecycle_state(), LifecycleState::Unverified);
        assert_eq!(node.queries.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[test]
    fn only_observed_states_are_verified() {
        let halt = TransactionOutcome::terminal(
            "h",
            ExecutionState::Halt,
            TransactionData::new(NodeState::Known(ExecutionState::Halt)),
        );
        assert_eq!(halt.lifecycle_state(), LifecycleState::Succeeded);
        assert!(LifecycleState::Unverified.is_terminal());
        assert!(!LifecycleState::Polling.is_terminal());
        assert_eq!(TransactionOutcome::unverified("h").lifecycle_state().to_string(), "unverified");
    }
}
