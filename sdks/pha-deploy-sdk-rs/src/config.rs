//! Configuration resolution.
//!
//! Every field is resolved independently from two layers: an explicit CLI
//! override wins over the TOML config file, which wins over the built-in
//! default. The file is loaded once into an immutable [`ConfigFile`] and passed
//! to [`resolve`] explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;
use crate::keys::{OwnerAddress, Secret};
use crate::metadata::{parse_field_collection, MetadataFields, MAX_SAFE_INTEGER};
use crate::schema::TokenSchemas;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Node endpoint used when neither source names one.
pub const DEFAULT_RPC: &str = "https://testnet.phantasma.info/rpc";

/// Logical configuration fields, each with a CLI flag and a config-file key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Field {
    Rpc,
    Nexus,
    Wif,
    Symbol,
    CarbonTokenId,
    CarbonTokenSeriesId,
    TokenType,
    TokenMaxSupply,
    FungibleDecimals,
    TokenSchemas,
    TokenMetadata,
    SeriesMetadata,
    NftMetadata,
    CreateTokenMaxData,
    CreateTokenSeriesMaxData,
    MintTokenMaxData,
    GasFeeBase,
    GasFeeCreateTokenBase,
    GasFeeCreateTokenSymbol,
    GasFeeCreateTokenSeries,
    GasFeeMultiplier,
    DryRun,
    RpcLog,
    SettingsLog,
}

impl Field {
    /// Config-file key (snake_case); also the name used in error messages.
    pub fn key(self) -> &'static str {
        match self {
            Field::Rpc => "rpc",
            Field::Nexus => "nexus",
            Field::Wif => "wif",
            Field::Symbol => "symbol",
            Field::CarbonTokenId => "carbon_token_id",
            Field::CarbonTokenSeriesId => "carbon_token_series_id",
            Field::TokenType => "token_type",
            Field::TokenMaxSupply => "token_max_supply",
            Field::FungibleDecimals => "fungible_decimals",
            Field::TokenSchemas => "token_schemas",
            Field::TokenMetadata => "token_metadata",
            Field::SeriesMetadata => "series_metadata",
            Field::NftMetadata => "nft_metadata",
            Field::CreateTokenMaxData => "create_token_max_data",
            Field::CreateTokenSeriesMaxData => "create_token_series_max_data",
            Field::MintTokenMaxData => "mint_token_max_data",
            Field::GasFeeBase => "gas_fee_base",
            Field::GasFeeCreateTokenBase => "gas_fee_create_token_base",
            Field::GasFeeCreateTokenSymbol => "gas_fee_create_token_symbol",
            Field::GasFeeCreateTokenSeries => "gas_fee_create_token_series",
            Field::GasFeeMultiplier => "gas_fee_multiplier",
            Field::DryRun => "dry_run",
            Field::RpcLog => "rpc_log",
            Field::SettingsLog => "settings_log",
        }
    }

    /// Alternative config-file keys accepted for the field.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::TokenMaxSupply => &["fungible_max_supply"],
            _ => &[],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Values supplied explicitly on the command line, as raw text.
#[derive(Clone, Debug, Default)]
pub struct Overrides(BTreeMap<Field, String>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.0.insert(field, value.into());
        self
    }

    /// Set `field` only when `value` is present.
    pub fn set_opt(&mut self, field: Field, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(v) = value {
            self.set(field, v);
        }
        self
    }

    /// Set a boolean flag; an unset flag falls through to the file layer.
    pub fn set_flag(&mut self, field: Field, present: bool) -> &mut Self {
        if present {
            self.set(field, "true");
        }
        self
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }
}

/// Parsed contents of the TOML config file.
#[derive(Clone, Debug, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    table: toml::Table,
}

impl ConfigFile {
    /// No file layer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the file at `path`, or [`DEFAULT_CONFIG_PATH`] when `None`.
    ///
    /// A missing default file is an empty layer; a missing explicit file and
    /// any parse failure are errors.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::read(default)
                } else {
                    debug!(path = DEFAULT_CONFIG_PATH, "no config file found");
                    Ok(Self::empty())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse(&text, path)?;
        file.path = Some(path.to_path_buf());
        debug!(path = %path.display(), keys = file.table.len(), "loaded config file");
        Ok(file)
    }

    /// Parse TOML text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let table = text
            .parse::<toml::Table>()
            .map_err(|source| ConfigError::ParseFile {
                path: origin.to_path_buf(),
                source,
            })?;
        Ok(Self { path: None, table })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn get(&self, field: Field) -> Option<&toml::Value> {
        std::iter::once(field.key())
            .chain(field.aliases().iter().copied())
            .find_map(|k| self.table.get(k))
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Path::new("<inline>"))
    }
}

/// Asset class discriminant.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Fungible,
    #[default]
    Nft,
}

impl TokenType {
    pub fn is_fungible(self) -> bool {
        self == TokenType::Fungible
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenType::Fungible => "fungible",
            TokenType::Nft => "nft",
        })
    }
}

impl FromStr for TokenType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fungible" => Ok(TokenType::Fungible),
            "nft" => Ok(TokenType::Nft),
            _ => Err(ConfigError::InvalidTokenType {
                value: s.to_string(),
            }),
        }
    }
}

/// Gas fee parameters, carried opaquely to the transaction builder.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GasFees {
    pub base: Option<BigUint>,
    pub create_token_base: Option<BigUint>,
    pub create_token_symbol: Option<BigUint>,
    pub create_token_series: Option<BigUint>,
    pub multiplier: Option<BigUint>,
}

/// Per-action maximum payload sizes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PayloadLimits {
    pub create_token: Option<BigUint>,
    pub create_token_series: Option<BigUint>,
    pub mint_token: Option<BigUint>,
}

/// Fully resolved operator inputs for one invocation.
#[derive(Clone, Debug)]
pub struct Config {
    pub rpc: String,
    pub nexus: Option<String>,
    pub wif: Option<Secret>,
    pub symbol: Option<String>,
    pub carbon_token_id: Option<BigUint>,
    pub carbon_token_series_id: Option<u64>,
    pub token_type: TokenType,
    pub token_max_supply: Option<BigUint>,
    pub fungible_decimals: Option<u8>,
    pub token_schemas: Option<TokenSchemas>,
    pub token_metadata: Option<MetadataFields>,
    pub series_metadata: Option<MetadataFields>,
    pub nft_metadata: Option<MetadataFields>,
    pub limits: PayloadLimits,
    pub gas: GasFees,
    pub dry_run: bool,
    pub rpc_log: bool,
    pub settings_log: bool,
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Owner address derived from the configured secret.
    pub fn owner(&self) -> Option<OwnerAddress> {
        self.wif.as_ref().and_then(|s| s.owner().ok())
    }

    /// Secret-free view for display.
    pub fn redacted(&self) -> ConfigView<'_> {
        ConfigView {
            rpc: &self.rpc,
            nexus: self.nexus.as_deref(),
            owner: self.owner(),
            symbol: self.symbol.as_deref(),
            carbon_token_id: text(&self.carbon_token_id),
            carbon_token_series_id: self.carbon_token_series_id,
            token_type: self.token_type,
            token_max_supply: text(&self.token_max_supply),
            fungible_decimals: self.fungible_decimals,
            token_schemas: self.token_schemas.as_ref(),
            token_metadata: self.token_metadata.as_ref(),
            series_metadata: self.series_metadata.as_ref(),
            nft_metadata: self.nft_metadata.as_ref(),
            create_token_max_data: text(&self.limits.create_token),
            create_token_series_max_data: text(&self.limits.create_token_series),
            mint_token_max_data: text(&self.limits.mint_token),
            gas_fee_base: text(&self.gas.base),
            gas_fee_create_token_base: text(&self.gas.create_token_base),
            gas_fee_create_token_symbol: text(&self.gas.create_token_symbol),
            gas_fee_create_token_series: text(&self.gas.create_token_series),
            gas_fee_multiplier: text(&self.gas.multiplier),
            dry_run: self.dry_run,
            config_path: self.config_path.as_deref(),
        }
    }
}

fn text(value: &Option<BigUint>) -> Option<String> {
    value.as_ref().map(BigUint::to_string)
}

/// Display form of a [`Config`]: the secret is replaced by the owner address.
#[derive(Debug, Serialize)]
pub struct ConfigView<'a> {
    pub rpc: &'a str,
    pub nexus: Option<&'a str>,
    pub owner: Option<OwnerAddress>,
    pub symbol: Option<&'a str>,
    pub carbon_token_id: Option<String>,
    pub carbon_token_series_id: Option<u64>,
    pub token_type: TokenType,
    pub token_max_supply: Option<String>,
    pub fungible_decimals: Option<u8>,
    pub token_schemas: Option<&'a TokenSchemas>,
    pub token_metadata: Option<&'a MetadataFields>,
    pub series_metadata: Option<&'a MetadataFields>,
    pub nft_metadata: Option<&'a MetadataFields>,
    pub create_token_max_data: Option<String>,
    pub create_token_series_max_data: Option<String>,
    pub mint_token_max_data: Option<String>,
    pub gas_fee_base: Option<String>,
    pub gas_fee_create_token_base: Option<String>,
    pub gas_fee_create_token_symbol: Option<String>,
    pub gas_fee_create_token_series: Option<String>,
    pub gas_fee_multiplier: Option<String>,
    pub dry_run: bool,
    pub config_path: Option<&'a Path>,
}

/// Resolve a [`Config`] from CLI overrides and the config file.
pub fn resolve(overrides: &Overrides, file: &ConfigFile) -> Result<Config, ConfigError> {
    let src = Sources { overrides, file };

    let token_type = match src.string(Field::TokenType)? {
        Some(raw) => raw.parse()?,
        None => TokenType::default(),
    };

    let wif = src.string(Field::Wif)?.map(Secret::new);
    if let Some(secret) = &wif {
        secret.owner()?;
    }

    let config = Config {
        rpc: src
            .string(Field::Rpc)?
            .unwrap_or_else(|| DEFAULT_RPC.to_string()),
        nexus: src.string(Field::Nexus)?,
        wif,
        symbol: src.string(Field::Symbol)?,
        carbon_token_id: src.big_uint(Field::CarbonTokenId)?,
        carbon_token_series_id: src.safe_u64(Field::CarbonTokenSeriesId)?,
        token_type,
        token_max_supply: src.big_uint(Field::TokenMaxSupply)?,
        fungible_decimals: src.decimals(Field::FungibleDecimals)?,
        token_schemas: src.schemas(Field::TokenSchemas)?,
        token_metadata: src.metadata(Field::TokenMetadata)?,
        series_metadata: src.metadata(Field::SeriesMetadata)?,
        nft_metadata: src.metadata(Field::NftMetadata)?,
        limits: PayloadLimits {
            create_token: src.big_uint(Field::CreateTokenMaxData)?,
            create_token_series: src.big_uint(Field::CreateTokenSeriesMaxData)?,
            mint_token: src.big_uint(Field::MintTokenMaxData)?,
        },
        gas: GasFees {
            base: src.big_uint(Field::GasFeeBase)?,
            create_token_base: src.big_uint(Field::GasFeeCreateTokenBase)?,
            create_token_symbol: src.big_uint(Field::GasFeeCreateTokenSymbol)?,
            create_token_series: src.big_uint(Field::GasFeeCreateTokenSeries)?,
            multiplier: src.big_uint(Field::GasFeeMultiplier)?,
        },
        dry_run: src.flag(Field::DryRun)?,
        rpc_log: src.flag(Field::RpcLog)?,
        settings_log: src.flag(Field::SettingsLog)?,
        config_path: file.path().map(Path::to_path_buf),
    };

    match config.token_type {
        TokenType::Fungible => {
            require(&config.token_max_supply, Field::TokenMaxSupply)?;
            require(&config.fungible_decimals, Field::FungibleDecimals)?;
        }
        TokenType::Nft => {
            require(&config.token_schemas, Field::TokenSchemas)?;
        }
    }

    Ok(config)
}

/// Fail with [`ConfigError::Missing`] when `value` is absent.
pub fn require<T>(value: &Option<T>, field: Field) -> Result<&T, ConfigError> {
    value
        .as_ref()
        .ok_or(ConfigError::Missing { field: field.key() })
}

/// A raw value from one of the two layers.
#[derive(Clone, Copy)]
enum Raw<'a> {
    Cli(&'a str),
    File(&'a toml::Value),
}

impl<'a> Raw<'a> {
    /// Text form: any CLI value, or a file string.
    fn text(&self) -> Option<&'a str> {
        match *self {
            Raw::Cli(s) => Some(s),
            Raw::File(toml::Value::String(s)) => Some(s.as_str()),
            Raw::File(_) => None,
        }
    }
}

struct Sources<'a> {
    overrides: &'a Overrides,
    file: &'a ConfigFile,
}

impl<'a> Sources<'a> {
    fn raw(&self, field: Field) -> Option<Raw<'a>> {
        if let Some(v) = self.overrides.get(field) {
            debug!(field = field.key(), source = "cli", "resolved field");
            return Some(Raw::Cli(v));
        }
        let v = self.file.get(field)?;
        debug!(field = field.key(), source = "file", "resolved field");
        Some(Raw::File(v))
    }

    fn string(&self, field: Field) -> Result<Option<String>, ConfigError> {
        let Some(raw) = self.raw(field) else {
            return Ok(None);
        };
        let text = raw
            .text()
            .ok_or(ConfigError::InvalidString { field: field.key() })?;
        Ok(non_empty(text).map(str::to_string))
    }

    fn big_uint(&self, field: Field) -> Result<Option<BigUint>, ConfigError> {
        let invalid = |value: String| ConfigError::InvalidInteger {
            field: field.key(),
            value,
        };
        let Some(raw) = self.raw(field) else {
            return Ok(None);
        };
        if let Raw::File(toml::Value::Integer(n)) = raw {
            return u64::try_from(*n)
                .map(|n| Some(BigUint::from(n)))
                .map_err(|_| invalid(n.to_string()));
        }
        match raw.text().map(non_empty) {
            Some(None) => Ok(None),
            Some(Some(t)) if t.bytes().all(|b| b.is_ascii_digit()) => t
                .parse::<BigUint>()
                .map(Some)
                .map_err(|_| invalid(t.to_string())),
            Some(Some(t)) => Err(invalid(t.to_string())),
            None => Err(invalid(display_raw(&raw))),
        }
    }

    fn safe_u64(&self, field: Field) -> Result<Option<u64>, ConfigError> {
        self.bounded(field, MAX_SAFE_INTEGER)
    }

    fn decimals(&self, field: Field) -> Result<Option<u8>, ConfigError> {
        Ok(self
            .bounded(field, u8::MAX.into())?
            .and_then(|n| u8::try_from(n).ok()))
    }

    fn bounded(&self, field: Field, max: u64) -> Result<Option<u64>, ConfigError> {
        let Some(n) = self.big_uint(field)? else {
            return Ok(None);
        };
        match n.to_u64() {
            Some(v) if v <= max => Ok(Some(v)),
            _ => Err(ConfigError::OutOfRange {
                field: field.key(),
                value: n.to_string(),
                max,
            }),
        }
    }

    fn flag(&self, field: Field) -> Result<bool, ConfigError> {
        let Some(raw) = self.raw(field) else {
            return Ok(false);
        };
        if let Raw::File(toml::Value::Boolean(b)) = raw {
            return Ok(*b);
        }
        let Some(text) = raw.text() else {
            return Err(ConfigError::InvalidBool {
                field: field.key(),
                value: display_raw(&raw),
            });
        };
        match text.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "no" => Ok(false),
            "true" | "1" | "yes" => Ok(true),
            _ => Err(ConfigError::InvalidBool {
                field: field.key(),
                value: text.to_string(),
            }),
        }
    }

    /// JSON-bearing value: JSON text from either layer, or a native TOML
    /// table/array from the file.
    fn json(&self, field: Field) -> Result<Option<Value>, ConfigError> {
        let invalid = |source: serde_json::Error| ConfigError::InvalidJson {
            field: field.key(),
            source,
        };
        let Some(raw) = self.raw(field) else {
            return Ok(None);
        };
        if let Some(text) = raw.text() {
            return match non_empty(text) {
                None => Ok(None),
                Some(t) => serde_json::from_str(t).map(Some).map_err(invalid),
            };
        }
        match raw {
            Raw::File(v @ (toml::Value::Table(_) | toml::Value::Array(_))) => {
                serde_json::to_value(v).map(Some).map_err(invalid)
            }
            other => Err(invalid(serde::de::Error::custom(format!(
                "expected JSON text or a table, got {}",
                display_raw(&other)
            )))),
        }
    }

    fn metadata(&self, field: Field) -> Result<Option<MetadataFields>, ConfigError> {
        let Some(raw) = self.json(field)? else {
            return Ok(None);
        };
        parse_field_collection(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Metadata {
                field: field.key(),
                source,
            })
    }

    fn schemas(&self, field: Field) -> Result<Option<TokenSchemas>, ConfigError> {
        let Some(raw) = self.json(field)? else {
            return Ok(None);
        };
        TokenSchemas::from_json(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Metadata {
                field: field.key(),
                source,
            })
    }
}

fn display_raw(raw: &Raw<'_>) -> String {
    match raw {
        Raw::Cli(s) => (*s).to_string(),
        Raw::File(v) => v.to_string(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}
