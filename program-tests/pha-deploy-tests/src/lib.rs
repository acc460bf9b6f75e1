use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use pha_deploy_sdk::config::{resolve, Config, ConfigFile, Overrides};
use pha_deploy_sdk::keys::wif_from_seed;
use pha_deploy_sdk::node::{ExecutionState, NodeClient, NodeState, TransactionData};
use pha_deploy_sdk::NodeError;
use tempfile::TempDir;

pub const TX_HASH: &str = "A1B2C3D4E5F60718293A4B5C6D7E8F90A1B2C3D4E5F60718293A4B5C6D7E8F90";

/// Token schemas used across tests: series metadata with the reserved `mode`
/// slot, a ROM with the reserved `_i`/`rom` slots.
pub const SCHEMAS_JSON: &str = r#"{
    "seriesMetadata": [
        {"name": "mode", "type": "Int8"},
        {"name": "name", "type": "String"},
        {"name": "maxMint", "type": "Int32"}
    ],
    "rom": [
        {"name": "_i", "type": "Int256"},
        {"name": "rom", "type": "Bytes"},
        {"name": "name", "type": "String"},
        {"name": "imageURL", "type": "String"},
        {"name": "royalties", "type": "Int32"}
    ],
    "ram": []
}"#;

/// Deterministic signing secret.
pub fn test_wif() -> String {
    wif_from_seed([0x11; 32]).expect("valid seed")
}

/// A complete config file covering every action.
pub fn full_config_toml() -> String {
    format!(
        r#"
rpc = "http://localhost:7077/rpc"
nexus = "testnet"
wif = "{wif}"
symbol = "SWD"
carbon_token_id = 7
carbon_token_series_id = 3
token_type = "nft"
token_schemas = '''{schemas}'''
create_token_max_data = 100000000
create_token_series_max_data = 100000000
mint_token_max_data = 100000000
gas_fee_base = 10000
gas_fee_create_token_base = 10000000000
gas_fee_create_token_symbol = 10000000000
gas_fee_create_token_series = 2500000000
gas_fee_multiplier = 1000

[token_metadata]
name = "Sword Collection"
icon = "data:image/png;base64,iVBORw0KGgo="
url = "https://example.org/swords"
description = "Swords"

[series_metadata]
name = "Series one"
maxMint = 100

[nft_metadata]
name = "Sword #1"
imageURL = "https://example.org/swords/1.png"
royalties = 5
"#,
        wif = test_wif(),
        schemas = SCHEMAS_JSON,
    )
}

/// Write `text` to a fresh temp dir; keep the dir alive for the file's life.
pub fn write_config(text: &str) -> anyhow::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, text)?;
    Ok((dir, path))
}

/// Resolve [`full_config_toml`] with `overrides` on top.
pub fn full_config(overrides: &Overrides) -> anyhow::Result<Config> {
    let file: ConfigFile = full_config_toml().parse()?;
    Ok(resolve(overrides, &file)?)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

enum Step {
    State(TransactionData),
    Error(String),
}

/// Scripted node. Queries replay the script in order; the last step repeats
/// once the script is exhausted.
pub struct SimulatedNode {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    broadcast_error: Option<String>,
    broadcasts: Mutex<Vec<String>>,
    queries: Mutex<usize>,
}

impl Default for SimulatedNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNode {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            broadcast_error: None,
            broadcasts: Mutex::new(Vec::new()),
            queries: Mutex::new(0),
        }
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn then_state(self, state: NodeState) -> Self {
        self.push(Step::State(TransactionData::new(state)))
    }

    pub fn then_running(self) -> Self {
        self.then_state(NodeState::Known(ExecutionState::Running))
    }

    pub fn then_halt(self, result: &str) -> Self {
        self.push(Step::State(
            TransactionData::new(NodeState::Known(ExecutionState::Halt)).with_result(result),
        ))
    }

    pub fn then_fault(self, comment: &str) -> Self {
        self.push(Step::State(
            TransactionData::new(NodeState::Known(ExecutionState::Fault))
                .with_debug_comment(comment),
        ))
    }

    pub fn then_error(self, message: &str) -> Self {
        self.push(Step::Error(message.to_string()))
    }

    pub fn failing_broadcast(mut self, message: &str) -> Self {
        self.broadcast_error = Some(message.to_string());
        self
    }

    pub fn queries(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }
}

fn replay(step: &Step) -> Result<TransactionData, NodeError> {
    match step {
        Step::State(tx) => Ok(tx.clone()),
        Step::Error(message) => Err(NodeError::Decode(message.clone())),
    }
}

#[async_trait]
impl NodeClient for SimulatedNode {
    async fn send_transaction(&self, tx_hex: &str) -> Result<String, NodeError> {
        if let Some(message) = &self.broadcast_error {
            return Err(NodeError::Rpc {
                code: -32000,
                message: message.clone(),
            });
        }
        self.broadcasts.lock().unwrap().push(tx_hex.to_string());
        Ok(TX_HASH.to_string())
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionData, NodeError> {
        assert_eq!(tx_hash, TX_HASH, "queried an unknown hash");
        *self.queries.lock().unwrap() += 1;

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = next {
            *last = Some(step);
        }
        match last.as_ref() {
            Some(step) => replay(step),
            None => Ok(TransactionData::new(NodeState::Known(ExecutionState::Running))),
        }
    }
}
