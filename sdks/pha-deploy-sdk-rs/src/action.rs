//! Action selection, per-action mandatory fields, and execution.

use std::fmt;

use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::builder::{ActionReceipt, TxBuilder};
use crate::config::{Config, Field, TokenType};
use crate::error::{ConfigError, DeployError, DispatchError};
use crate::keys::{OwnerAddress, Secret};
use crate::lifecycle::{wait_for_tx, LifecycleState, PollPolicy, TransactionOutcome};
use crate::metadata::MetadataFields;
use crate::node::NodeClient;
use crate::schema::{StructSchema, TokenSchemas};

/// The three mutually exclusive operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateToken,
    CreateSeries,
    MintNft,
}

impl Action {
    pub fn flag(self) -> &'static str {
        match self {
            Action::CreateToken => "--create-token",
            Action::CreateSeries => "--create-series",
            Action::MintNft => "--mint-nft",
        }
    }

    /// Pick the requested action. No selector is `Ok(None)`.
    pub fn select(
        create_token: bool,
        create_series: bool,
        mint_nft: bool,
    ) -> Result<Option<Action>, DispatchError> {
        let chosen: Vec<Action> = [
            (create_token, Action::CreateToken),
            (create_series, Action::CreateSeries),
            (mint_nft, Action::MintNft),
        ]
        .into_iter()
        .filter_map(|(on, action)| on.then_some(action))
        .collect();

        match chosen.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(DispatchError::ConflictingActions {
                actions: many.iter().map(|a| a.flag()).collect(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::CreateToken => "create-token",
            Action::CreateSeries => "create-series",
            Action::MintNft => "mint-nft",
        })
    }
}

fn as_text<S: Serializer>(n: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(n)
}

fn opt_as_text<S: Serializer>(n: &Option<BigUint>, serializer: S) -> Result<S::Ok, S::Error> {
    match n {
        Some(n) => serializer.collect_str(n),
        None => serializer.serialize_none(),
    }
}

/// Node endpoint and signer shared by every request.
#[derive(Clone, Debug, Serialize)]
pub struct Target {
    pub rpc: String,
    pub nexus: String,
    #[serde(skip)]
    pub wif: Secret,
    pub owner: OwnerAddress,
}

/// Token metadata with the four fields every token must carry.
#[derive(Clone, Debug, Serialize)]
pub struct TokenMetadata {
    pub name: String,
    pub icon: String,
    pub url: String,
    pub description: String,
    pub fields: MetadataFields,
}

impl TokenMetadata {
    pub fn from_fields(fields: MetadataFields) -> Result<Self, DeployError> {
        let take = |key: &str| -> Result<String, DeployError> {
            Ok(fields.pick_string(true, key)?.unwrap_or_default())
        };
        Ok(Self {
            name: take("name")?,
            icon: take("icon")?,
            url: take("url")?,
            description: take("description")?,
            fields,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "token_type", rename_all = "lowercase")]
pub enum TokenKind {
    Fungible {
        #[serde(serialize_with = "as_text")]
        max_supply: BigUint,
        decimals: u8,
    },
    Nft {
        #[serde(serialize_with = "opt_as_text")]
        max_supply: Option<BigUint>,
        schemas: TokenSchemas,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateTokenFees {
    #[serde(serialize_with = "as_text")]
    pub base: BigUint,
    #[serde(serialize_with = "as_text")]
    pub create_token_base: BigUint,
    #[serde(serialize_with = "as_text")]
    pub create_token_symbol: BigUint,
    #[serde(serialize_with = "as_text")]
    pub multiplier: BigUint,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateSeriesFees {
    #[serde(serialize_with = "as_text")]
    pub base: BigUint,
    #[serde(serialize_with = "as_text")]
    pub create_token_series: BigUint,
    #[serde(serialize_with = "as_text")]
    pub multiplier: BigUint,
}

#[derive(Clone, Debug, Serialize)]
pub struct MintNftFees {
    #[serde(serialize_with = "as_text")]
    pub base: BigUint,
    #[serde(serialize_with = "as_text")]
    pub multiplier: BigUint,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateTokenRequest {
    #[serde(flatten)]
    pub target: Target,
    pub symbol: String,
    pub kind: TokenKind,
    pub metadata: TokenMetadata,
    pub fees: CreateTokenFees,
    #[serde(serialize_with = "as_text")]
    pub max_data: BigUint,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateSeriesRequest {
    #[serde(flatten)]
    pub target: Target,
    #[serde(serialize_with = "as_text")]
    pub carbon_token_id: BigUint,
    /// Freshly generated off-chain id for the new series.
    #[serde(serialize_with = "as_text")]
    pub phantasma_series_id: BigUint,
    pub schema: StructSchema,
    pub metadata: MetadataFields,
    pub fees: CreateSeriesFees,
    #[serde(serialize_with = "as_text")]
    pub max_data: BigUint,
}

#[derive(Clone, Debug, Serialize)]
pub struct MintNftRequest {
    #[serde(flatten)]
    pub target: Target,
    #[serde(serialize_with = "as_text")]
    pub carbon_token_id: BigUint,
    pub carbon_token_series_id: u64,
    /// Freshly generated off-chain id for the new NFT.
    #[serde(serialize_with = "as_text")]
    pub phantasma_nft_id: BigUint,
    pub rom_schema: StructSchema,
    pub metadata: MetadataFields,
    pub fees: MintNftFees,
    #[serde(serialize_with = "as_text")]
    pub max_data: BigUint,
}

/// Everything one action needs, validated. Serializes without the secret.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    CreateToken(CreateTokenRequest),
    CreateSeries(CreateSeriesRequest),
    MintNft(MintNftRequest),
}

impl ActionRequest {
    pub fn action(&self) -> Action {
        match self {
            ActionRequest::CreateToken(_) => Action::CreateToken,
            ActionRequest::CreateSeries(_) => Action::CreateSeries,
            ActionRequest::MintNft(_) => Action::MintNft,
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            ActionRequest::CreateToken(r) => &r.target,
            ActionRequest::CreateSeries(r) => &r.target,
            ActionRequest::MintNft(r) => &r.target,
        }
    }
}

/// Fresh random id for a new series or NFT.
pub fn random_phantasma_id() -> BigUint {
    BigUint::from_bytes_le(&rand::random::<[u8; 32]>())
}

fn need<T: Clone>(value: &Option<T>, field: Field) -> Result<T, ConfigError> {
    value
        .clone()
        .ok_or(ConfigError::Missing { field: field.key() })
}

fn need_schema(schema: &Option<StructSchema>, field: &'static str) -> Result<StructSchema, ConfigError> {
    schema.clone().ok_or(ConfigError::Missing { field })
}

fn target(config: &Config) -> Result<Target, DeployError> {
    if config.rpc.trim().is_empty() {
        return Err(ConfigError::Missing { field: Field::Rpc.key() }.into());
    }
    let nexus = need(&config.nexus, Field::Nexus)?;
    let wif = need(&config.wif, Field::Wif)?;
    let owner = wif.owner()?;
    Ok(Target {
        rpc: config.rpc.clone(),
        nexus,
        wif,
        owner,
    })
}

/// Check the action's mandatory fields, in order, and assemble its request.
pub fn prepare(action: Action, config: &Config) -> Result<ActionRequest, DeployError> {
    let request = match action {
        Action::CreateToken => {
            let target = target(config)?;
            let symbol = need(&config.symbol, Field::Symbol)?;
            let fees = CreateTokenFees {
                base: need(&config.gas.base, Field::GasFeeBase)?,
                create_token_base: need(&config.gas.create_token_base, Field::GasFeeCreateTokenBase)?,
                create_token_symbol: need(
                    &config.gas.create_token_symbol,
                    Field::GasFeeCreateTokenSymbol,
                )?,
                multiplier: need(&config.gas.multiplier, Field::GasFeeMultiplier)?,
            };
            let max_data = need(&config.limits.create_token, Field::CreateTokenMaxData)?;
            let fields = need(&config.token_metadata, Field::TokenMetadata)?;
            let kind = match config.token_type {
                TokenType::Fungible => TokenKind::Fungible {
                    max_supply: need(&config.token_max_supply, Field::TokenMaxSupply)?,
                    decimals: need(&config.fungible_decimals, Field::FungibleDecimals)?,
                },
                TokenType::Nft => TokenKind::Nft {
                    max_supply: config.token_max_supply.clone(),
                    schemas: need(&config.token_schemas, Field::TokenSchemas)?,
                },
            };
            ActionRequest::CreateToken(CreateTokenRequest {
                target,
                symbol,
                kind,
                metadata: TokenMetadata::from_fields(fields)?,
                fees,
                max_data,
            })
        }
        Action::CreateSeries => {
            let target = target(config)?;
            let carbon_token_id = need(&config.carbon_token_id, Field::CarbonTokenId)?;
            let schemas = need(&config.token_schemas, Field::TokenSchemas)?;
            let metadata = need(&config.series_metadata, Field::SeriesMetadata)?;
            let fees = CreateSeriesFees {
                base: need(&config.gas.base, Field::GasFeeBase)?,
                create_token_series: need(
                    &config.gas.create_token_series,
                    Field::GasFeeCreateTokenSeries,
                )?,
                multiplier: need(&config.gas.multiplier, Field::GasFeeMultiplier)?,
            };
            let max_data = need(&config.limits.create_token_series, Field::CreateTokenSeriesMaxData)?;
            let schema = need_schema(&schemas.series_metadata, "token_schemas.seriesMetadata")?;
            let metadata = schema.conform(&metadata)?;
            ActionRequest::CreateSeries(CreateSeriesRequest {
                target,
                carbon_token_id,
                phantasma_series_id: random_phantasma_id(),
                schema,
                metadata,
                fees,
                max_data,
            })
        }
        Action::MintNft => {
            let target = target(config)?;
            let carbon_token_id = need(&config.carbon_token_id, Field::CarbonTokenId)?;
            let carbon_token_series_id =
                need(&config.carbon_token_series_id, Field::CarbonTokenSeriesId)?;
            let schemas = need(&config.token_schemas, Field::TokenSchemas)?;
            let metadata = need(&config.nft_metadata, Field::NftMetadata)?;
            let fees = MintNftFees {
                base: need(&config.gas.base, Field::GasFeeBase)?,
                multiplier: need(&config.gas.multiplier, Field::GasFeeMultiplier)?,
            };
            let max_data = need(&config.limits.mint_token, Field::MintTokenMaxData)?;
            let rom_schema = need_schema(&schemas.rom, "token_schemas.rom")?;
            let metadata = rom_schema.conform(&metadata)?;
            ActionRequest::MintNft(MintNftRequest {
                target,
                carbon_token_id,
                carbon_token_series_id,
                phantasma_nft_id: random_phantasma_id(),
                rom_schema,
                metadata,
                fees,
                max_data,
            })
        }
    };
    Ok(request)
}

/// Final result of one invocation.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report {
    /// Built and signed, never transmitted.
    DryRun {
        action: Action,
        tx_hex: String,
        decoded: Value,
    },
    Completed {
        action: Action,
        state: LifecycleState,
        outcome: TransactionOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        receipt: Option<ActionReceipt>,
    },
}

impl Report {
    pub fn state(&self) -> LifecycleState {
        match self {
            Report::DryRun { .. } => LifecycleState::DryRun,
            Report::Completed { state, .. } => *state,
        }
    }
}

/// Drives one request through the builder and the node.
pub struct Deployer<B, N> {
    builder: B,
    node: N,
    policy: PollPolicy,
    settings_log: bool,
}

impl<B: TxBuilder, N: NodeClient> Deployer<B, N> {
    pub fn new(builder: B, node: N) -> Self {
        Self {
            builder,
            node,
            policy: PollPolicy::default(),
            settings_log: false,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Log the redacted request before building.
    pub fn with_settings_log(mut self, enabled: bool) -> Self {
        self.settings_log = enabled;
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Build and sign `request`; unless `dry_run`, broadcast it and wait for
    /// a terminal state.
    pub async fn execute(&self, request: &ActionRequest, dry_run: bool) -> Result<Report, DeployError> {
        let action = request.action();
        if self.settings_log {
            match serde_json::to_string_pretty(request) {
                Ok(settings) => info!(%action, "request settings:\n{settings}"),
                Err(err) => warn!(%action, error = %err, "could not render request settings"),
            }
        }

        let tx = self
            .builder
            .build_and_sign(request)
            .map_err(DeployError::Builder)?;
        info!(%action, state = %LifecycleState::Built, bytes = tx.hex.len() / 2, "transaction signed");

        if dry_run {
            let decoded = self.builder.describe(&tx).map_err(DeployError::Builder)?;
            info!(%action, "[dry-run] prepared transaction, not sent");
            return Ok(Report::DryRun {
                action,
                tx_hex: tx.hex,
                decoded,
            });
        }

        info!(%action, rpc = %request.target().rpc, "broadcasting transaction");
        let tx_hash = self.node.send_transaction(&tx.hex).await?;
        info!(%action, %tx_hash, state = %LifecycleState::Broadcast, "transaction broadcast");

        let outcome = wait_for_tx(&self.node, &tx_hash, &self.policy).await;
        let receipt = if outcome.succeeded {
            match self.builder.parse_result(request, &outcome.result_payload) {
                Ok(receipt) => {
                    info!(%action, %receipt, "deployed");
                    Some(receipt)
                }
                Err(err) => {
                    warn!(%action, error = %format!("{err:#}"), "could not parse transaction result");
                    None
                }
            }
        } else {
            warn!(%action, %tx_hash, state = %outcome.lifecycle_state(), "action did not complete");
            None
        };

        Ok(Report::Completed {
            action,
            state: outcome.lifecycle_state(),
            outcome,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_requires_at_most_one_action() {
        assert_eq!(Action::select(false, false, false), Ok(None));
        assert_eq!(
            Action::select(false, true, false),
            Ok(Some(Action::CreateSeries))
        );
        let err = Action::select(true, false, true).unwrap_err();
        assert_eq!(
            err,
            DispatchError::ConflictingActions {
                actions: vec!["--create-token", "--mint-nft"]
            }
        );
    }

    #[test]
    fn phantasma_ids_are_fresh() {
        assert_ne!(random_phantasma_id(), random_phantasma_id());
    }
}
