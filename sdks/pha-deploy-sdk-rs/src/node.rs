//! Ledger node access.
//!
//! [`NodeClient`] is the seam the lifecycle talks to; [`RpcNodeClient`] is the
//! JSON-RPC 2.0 implementation used by the CLI.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::NodeError;

/// Tracing target for raw node traffic, enabled by `--rpc-log`.
pub const RPC_LOG_TARGET: &str = "pha_deploy::rpc";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution state codes reported by the node.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, Serialize)]
pub enum ExecutionState {
    Running = 0,
    Break = 1,
    Fault = 2,
    Halt = 3,
}

impl ExecutionState {
    pub fn name(self) -> &'static str {
        match self {
            ExecutionState::Running => "Running",
            ExecutionState::Break => "Break",
            ExecutionState::Fault => "Fault",
            ExecutionState::Halt => "Halt",
        }
    }

    /// Break and Fault both mean the chain rejected the transaction.
    pub fn is_failure(self) -> bool {
        matches!(self, ExecutionState::Break | ExecutionState::Fault)
    }
}

/// State as reported by the node; unrecognized values are kept verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeState {
    Known(ExecutionState),
    Unknown(String),
}

impl NodeState {
    /// Accepts a state name (case-insensitive) or its numeric code.
    pub fn from_json(raw: &Value) -> Self {
        let known = match raw {
            Value::String(s) => {
                let s = s.trim();
                [
                    ExecutionState::Running,
                    ExecutionState::Break,
                    ExecutionState::Fault,
                    ExecutionState::Halt,
                ]
                .into_iter()
                .find(|st| st.name().eq_ignore_ascii_case(s))
                .or_else(|| s.parse::<u64>().ok().and_then(ExecutionState::from_u64))
            }
            Value::Number(n) => n.as_u64().and_then(ExecutionState::from_u64),
            _ => None,
        };
        match (known, raw) {
            (Some(state), _) => NodeState::Known(state),
            (None, Value::String(s)) => NodeState::Unknown(s.clone()),
            (None, other) => NodeState::Unknown(other.to_string()),
        }
    }

    pub fn known(&self) -> Option<ExecutionState> {
        match self {
            NodeState::Known(s) => Some(*s),
            NodeState::Unknown(_) => None,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Known(s) => f.write_str(s.name()),
            NodeState::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for NodeState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Transaction status as returned by `getTransaction`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionData {
    pub state: NodeState,
    pub result: String,
    pub debug_comment: Option<String>,
}

impl TransactionData {
    pub fn new(state: NodeState) -> Self {
        Self {
            state,
            result: String::new(),
            debug_comment: None,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn with_debug_comment(mut self, comment: impl Into<String>) -> Self {
        self.debug_comment = Some(comment.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionWire {
    #[serde(default)]
    state: Value,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    debug_comment: Option<String>,
}

impl From<TransactionWire> for TransactionData {
    fn from(w: TransactionWire) -> Self {
        Self {
            state: NodeState::from_json(&w.state),
            result: w.result.unwrap_or_default(),
            debug_comment: w.debug_comment.filter(|c| !c.is_empty()),
        }
    }
}

/// Node operations used by the transaction lifecycle.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Broadcast a signed transaction; returns its hash.
    async fn send_transaction(&self, tx_hex: &str) -> Result<String, NodeError>;

    /// Query the execution status of a broadcast transaction.
    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionData, NodeError>;
}

#[async_trait]
impl<T: NodeClient + ?Sized> NodeClient for &T {
    async fn send_transaction(&self, tx_hex: &str) -> Result<String, NodeError> {
        (**self).send_transaction(tx_hex).await
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionData, NodeError> {
        (**self).get_transaction(tx_hash).await
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC 2.0 client for a Phantasma node.
#[derive(Debug)]
pub struct RpcNodeClient {
    http: reqwest::Client,
    url: String,
    nexus: String,
    next_id: AtomicU64,
}

impl RpcNodeClient {
    pub fn new(url: impl Into<String>, nexus: impl Into<String>) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.into(),
            nexus: nexus.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn nexus(&self) -> &str {
        &self.nexus
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(target: RPC_LOG_TARGET, nexus = %self.nexus, method, id, "request");

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(target: RPC_LOG_TARGET, method, id, status = status.as_u16(), body = %text, "response");

        if !status.is_success() {
            return Err(NodeError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RpcResponse =
            serde_json::from_str(&text).map_err(|e| NodeError::Decode(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(NodeError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = parsed
            .result
            .ok_or_else(|| NodeError::Decode(format!("{method}: response has no result")))?;
        serde_json::from_value(result).map_err(|e| NodeError::Decode(format!("{method}: {e}")))
    }
}

#[async_trait]
impl NodeClient for RpcNodeClient {
    async fn send_transaction(&self, tx_hex: &str) -> Result<String, NodeError> {
        let hash: String = self.call("sendCarbonTransaction", json!([tx_hex])).await?;
        if hash.trim().is_empty() {
            return Err(NodeError::Decode(
                "sendCarbonTransaction returned an empty hash".into(),
            ));
        }
        Ok(hash)
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionData, NodeError> {
        let wire: TransactionWire = self.call("getTransaction", json!([tx_hash])).await?;
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_parse_from_names_and_codes() {
        assert_eq!(
            NodeState::from_json(&json!("Halt")),
            NodeState::Known(ExecutionState::Halt)
        );
        assert_eq!(
            NodeState::from_json(&json!("running")),
            NodeState::Known(ExecutionState::Running)
        );
        assert_eq!(
            NodeState::from_json(&json!(2)),
            NodeState::Known(ExecutionState::Fault)
        );
        assert_eq!(
            NodeState::from_json(&json!("1")),
            NodeState::Known(ExecutionState::Break)
        );
    }

    #[test]
    fn unknown_states_are_preserved() {
        assert_eq!(
            NodeState::from_json(&json!("Pending")),
            NodeState::Unknown("Pending".into())
        );
        assert_eq!(NodeState::from_json(&json!(9)), NodeState::Unknown("9".into()));
        assert_eq!(NodeState::from_json(&Value::Null).known(), None);
    }

    #[test]
    fn wire_transaction_maps_fields() {
        let wire: TransactionWire = serde_json::from_value(json!({
            "hash": "ABC",
            "state": "Fault",
            "result": "",
            "debugComment": "out of gas",
        }))
        .unwrap();
        let tx = TransactionData::from(wire);
        assert_eq!(tx.state.known(), Some(ExecutionState::Fault));
        assert_eq!(tx.debug_comment.as_deref(), Some("out of gas"));
        assert!(tx.state.known().unwrap().is_failure());
    }
}
