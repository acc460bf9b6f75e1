//! Transaction construction and signing.
//!
//! [`TxBuilder`] is the seam between validated requests and the wire. The
//! [`LocalTxBuilder`] writes a borsh envelope signed with the operator's
//! ed25519 key; fee parameters travel through it untouched.

use std::fmt;

use anyhow::{anyhow, bail, Context};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use num_bigint::{BigInt, BigUint};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::action::{ActionRequest, TokenKind};
use crate::metadata::{bigint_to_wire, MetadataField, MetadataFields, MetadataValue};
use crate::schema::{StructSchema, TokenSchemas};

/// Hex-encoded signed transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedTx {
    pub hex: String,
}

/// Action-specific result parsed from a successful transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionReceipt {
    Token {
        carbon_token_id: u64,
    },
    Series {
        carbon_series_id: u32,
        #[serde(serialize_with = "as_text")]
        phantasma_series_id: BigUint,
    },
    Nft {
        #[serde(serialize_with = "as_text")]
        phantasma_nft_id: BigUint,
        carbon_nft_addresses: Vec<String>,
    },
}

impl fmt::Display for ActionReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReceipt::Token { carbon_token_id } => {
                write!(f, "carbon token id {carbon_token_id}")
            }
            ActionReceipt::Series {
                carbon_series_id,
                phantasma_series_id,
            } => write!(
                f,
                "carbon series id {carbon_series_id} (phantasma id {phantasma_series_id})"
            ),
            ActionReceipt::Nft {
                phantasma_nft_id,
                carbon_nft_addresses,
            } => write!(
                f,
                "NFT with phantasma id {phantasma_nft_id} and carbon address {}",
                carbon_nft_addresses.first().map(String::as_str).unwrap_or("<none>")
            ),
        }
    }
}

fn as_text<S: Serializer>(n: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(n)
}

/// Builds, signs, and inspects transactions for an [`ActionRequest`].
pub trait TxBuilder {
    fn build_and_sign(&self, request: &ActionRequest) -> anyhow::Result<SignedTx>;

    /// Decode a signed transaction into a human-readable form.
    fn describe(&self, tx: &SignedTx) -> anyhow::Result<Value>;

    /// Interpret the result payload of a successful transaction.
    fn parse_result(&self, request: &ActionRequest, payload: &str) -> anyhow::Result<ActionReceipt>;
}

impl<T: TxBuilder + ?Sized> TxBuilder for &T {
    fn build_and_sign(&self, request: &ActionRequest) -> anyhow::Result<SignedTx> {
        (**self).build_and_sign(request)
    }

    fn describe(&self, tx: &SignedTx) -> anyhow::Result<Value> {
        (**self).describe(tx)
    }

    fn parse_result(&self, request: &ActionRequest, payload: &str) -> anyhow::Result<ActionReceipt> {
        (**self).parse_result(request, payload)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
enum WireValue {
    Text(String),
    Integer(i64),
    BigInteger { negative: bool, magnitude: Vec<u8> },
    Bytes {
        #[serde(serialize_with = "hex_bytes")]
        hex: Vec<u8>,
    },
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
struct WireField {
    name: String,
    value: WireValue,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
struct WireFee {
    name: String,
    #[serde(serialize_with = "le_text")]
    value: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Payload {
    CreateToken {
        symbol: String,
        #[serde(serialize_with = "le_text")]
        max_supply: Vec<u8>,
        is_nft: bool,
        decimals: u8,
        metadata: Vec<WireField>,
        schemas: Option<TokenSchemas>,
    },
    CreateSeries {
        #[serde(serialize_with = "le_text")]
        token_id: Vec<u8>,
        #[serde(serialize_with = "le_text")]
        phantasma_series_id: Vec<u8>,
        schema: StructSchema,
        metadata: Vec<WireField>,
    },
    MintNft {
        #[serde(serialize_with = "le_text")]
        token_id: Vec<u8>,
        series_id: u32,
        #[serde(serialize_with = "le_text")]
        phantasma_nft_id: Vec<u8>,
        rom: Vec<WireField>,
    },
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Eq, PartialEq, Serialize)]
struct Envelope {
    nexus: String,
    #[serde(serialize_with = "hex_bytes")]
    signer: [u8; 32],
    payload: Payload,
    fees: Vec<WireFee>,
    #[serde(serialize_with = "le_text")]
    max_data: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SignedEnvelope {
    message: Vec<u8>,
    signature: [u8; 64],
}

fn hex_bytes<S: Serializer, B: AsRef<[u8]>>(bytes: &B, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn le_text<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&BigUint::from_bytes_le(bytes))
}

fn wire_fields(fields: &MetadataFields) -> Vec<WireField> {
    fields
        .iter()
        .map(|f| WireField {
            name: f.name.clone(),
            value: match &f.value {
                MetadataValue::Text(s) => WireValue::Text(s.clone()),
                MetadataValue::Integer(n) => WireValue::Integer(*n),
                MetadataValue::BigInteger(n) => {
                    let (negative, magnitude) = bigint_to_wire(n);
                    WireValue::BigInteger { negative, magnitude }
                }
                MetadataValue::Bytes(b) => WireValue::Bytes { hex: b.clone() },
            },
        })
        .collect()
}

fn fee(name: &str, value: &BigUint) -> WireFee {
    WireFee {
        name: name.to_string(),
        value: value.to_bytes_le(),
    }
}

/// Lays `metadata` out in schema order, filling reserved slots the operator
/// left out: `_i` takes the off-chain id, `mode` is 0 and `rom` is empty.
fn with_reserved_slots(schema: &StructSchema, metadata: &MetadataFields, id: &BigUint) -> MetadataFields {
    let mut out = Vec::with_capacity(schema.fields.len());
    for slot in &schema.fields {
        let name = slot.name.as_str();
        let value = match (metadata.get(name), name) {
            (Some(value), _) => value.clone(),
            (None, "_i") => MetadataValue::from(BigInt::from(id.clone())),
            (None, "mode") => MetadataValue::Integer(0),
            (None, "rom") => MetadataValue::Bytes(Vec::new()),
            (None, _) => continue,
        };
        out.push(MetadataField::new(name, value));
    }
    out.extend(
        metadata
            .iter()
            .filter(|f| !schema.fields.iter().any(|slot| slot.name == f.name))
            .cloned(),
    );
    MetadataFields::new(out)
}

/// Builds borsh envelopes signed with the request's ed25519 key.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTxBuilder;

impl LocalTxBuilder {
    pub fn new() -> Self {
        Self
    }

    fn envelope(&self, request: &ActionRequest, signer: [u8; 32]) -> anyhow::Result<Envelope> {
        let nexus = request.target().nexus.clone();
        let envelope = match request {
            ActionRequest::CreateToken(r) => {
                let (max_supply, is_nft, decimals, schemas) = match &r.kind {
                    TokenKind::Fungible {
                        max_supply,
                        decimals,
                    } => (max_supply.to_bytes_le(), false, *decimals, None),
                    TokenKind::Nft {
                        max_supply,
                        schemas,
                    } => (
                        max_supply.clone().unwrap_or_default().to_bytes_le(),
                        true,
                        0,
                        Some(schemas.clone()),
                    ),
                };
                Envelope {
                    nexus,
                    signer,
                    payload: Payload::CreateToken {
                        symbol: r.symbol.clone(),
                        max_supply,
                        is_nft,
                        decimals,
                        metadata: wire_fields(&r.metadata.fields),
                        schemas,
                    },
                    fees: vec![
                        fee("gas_fee_base", &r.fees.base),
                        fee("gas_fee_create_token_base", &r.fees.create_token_base),
                        fee("gas_fee_create_token_symbol", &r.fees.create_token_symbol),
                        fee("gas_fee_multiplier", &r.fees.multiplier),
                    ],
                    max_data: r.max_data.to_bytes_le(),
                }
            }
            ActionRequest::CreateSeries(r) => {
                let metadata = with_reserved_slots(&r.schema, &r.metadata, &r.phantasma_series_id);
                Envelope {
                    nexus,
                    signer,
                    payload: Payload::CreateSeries {
                        token_id: r.carbon_token_id.to_bytes_le(),
                        phantasma_series_id: r.phantasma_series_id.to_bytes_le(),
                        schema: r.schema.clone(),
                        metadata: wire_fields(&metadata),
                    },
                    fees: vec![
                        fee("gas_fee_base", &r.fees.base),
                        fee("gas_fee_create_token_series", &r.fees.create_token_series),
                        fee("gas_fee_multiplier", &r.fees.multiplier),
                    ],
                    max_data: r.max_data.to_bytes_le(),
                }
            }
            ActionRequest::MintNft(r) => {
                let series_id = u32::try_from(r.carbon_token_series_id).with_context(|| {
                    format!(
                        "carbon_token_series_id {} does not fit a 32-bit series id",
                        r.carbon_token_series_id
                    )
                })?;
                let rom = with_reserved_slots(&r.rom_schema, &r.metadata, &r.phantasma_nft_id);
                Envelope {
                    nexus,
                    signer,
                    payload: Payload::MintNft {
                        token_id: r.carbon_token_id.to_bytes_le(),
                        series_id,
                        phantasma_nft_id: r.phantasma_nft_id.to_bytes_le(),
                        rom: wire_fields(&rom),
                    },
                    fees: vec![
                        fee("gas_fee_base", &r.fees.base),
                        fee("gas_fee_multiplier", &r.fees.multiplier),
                    ],
                    max_data: r.max_data.to_bytes_le(),
                }
            }
        };
        Ok(envelope)
    }
}

impl TxBuilder for LocalTxBuilder {
    fn build_and_sign(&self, request: &ActionRequest) -> anyhow::Result<SignedTx> {
        let key = request.target().wif.signing_key()?;
        let envelope = self.envelope(request, key.verifying_key().to_bytes())?;
        let message = borsh::to_vec(&envelope).context("encode transaction envelope")?;
        let signature = key.sign(&message).to_bytes();
        let bytes = borsh::to_vec(&SignedEnvelope { message, signature })
            .context("encode signed transaction")?;
        Ok(SignedTx {
            hex: hex::encode(bytes),
        })
    }

    fn describe(&self, tx: &SignedTx) -> anyhow::Result<Value> {
        let bytes = hex::decode(&tx.hex).context("signed transaction is not hex")?;
        let signed = SignedEnvelope::try_from_slice(&bytes).context("decode signed transaction")?;
        let envelope =
            Envelope::try_from_slice(&signed.message).context("decode transaction envelope")?;

        let key = VerifyingKey::from_bytes(&envelope.signer).context("invalid signer key")?;
        let signature_valid = key
            .verify(&signed.message, &Signature::from_bytes(&signed.signature))
            .is_ok();

        let mut value = serde_json::to_value(&envelope)?;
        if let Value::Object(map) = &mut value {
            map.insert("signature".into(), hex::encode(signed.signature).into());
            map.insert("signature_valid".into(), signature_valid.into());
        }
        Ok(value)
    }

    fn parse_result(&self, request: &ActionRequest, payload: &str) -> anyhow::Result<ActionReceipt> {
        let payload = payload.trim();
        let bytes = hex::decode(payload.strip_prefix("0x").unwrap_or(payload))
            .with_context(|| format!("result payload '{payload}' is not hex"))?;

        match request {
            ActionRequest::CreateToken(_) => {
                let raw: [u8; 8] = bytes
                    .get(..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| anyhow!("token result must be at least 8 bytes, got {}", bytes.len()))?;
                Ok(ActionReceipt::Token {
                    carbon_token_id: u64::from_le_bytes(raw),
                })
            }
            ActionRequest::CreateSeries(r) => {
                let raw: [u8; 4] = bytes
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| anyhow!("series result must be at least 4 bytes, got {}", bytes.len()))?;
                Ok(ActionReceipt::Series {
                    carbon_series_id: u32::from_le_bytes(raw),
                    phantasma_series_id: r.phantasma_series_id.clone(),
                })
            }
            ActionRequest::MintNft(r) => {
                let addresses = Vec::<[u8; 32]>::try_from_slice(&bytes)
                    .context("decode minted NFT addresses")?;
                if addresses.is_empty() {
                    bail!("mint result carries no NFT address");
                }
                Ok(ActionReceipt::Nft {
                    phantasma_nft_id: r.phantasma_nft_id.clone(),
                    carbon_nft_addresses: addresses.iter().map(hex::encode).collect(),
                })
            }
        }
    }
}
