//! pha-deploy – Rust SDK
//!
//! This crate provides:
//! - Layered configuration resolution (CLI overrides > TOML file > defaults)
//! - Metadata normalization and typed field picks, checked against token schemas
//! - Action selection and per-action mandatory-field enforcement
//! - Transaction building/signing behind [`TxBuilder`] and node access behind [`NodeClient`]
//! - Broadcast tracking with a bounded polling policy
//!
//! The signing secret is never rendered; displays show the derived owner address.

pub mod action;
pub mod builder;
pub mod config;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod metadata;
pub mod node;
pub mod schema;

pub use action::{prepare, Action, ActionRequest, Deployer, Report};
pub use builder::{ActionReceipt, LocalTxBuilder, SignedTx, TxBuilder};
pub use config::{resolve, Config, ConfigFile, Field, Overrides, TokenType};
pub use error::{ConfigError, DeployError, DispatchError, NodeError, ValidationError};
pub use keys::{OwnerAddress, Secret};
pub use lifecycle::{wait_for_tx, LifecycleState, PollPolicy, TransactionOutcome};
pub use metadata::{parse_field_collection, MetadataField, MetadataFields, MetadataValue};
pub use node::{ExecutionState, NodeClient, NodeState, RpcNodeClient, TransactionData};
pub use schema::{StructSchema, TokenSchemas, VmType};
