use pha_deploy_sdk::action::{prepare, Action, ActionRequest, TokenKind};
use pha_deploy_sdk::config::{Config, Field, Overrides};
use pha_deploy_sdk::metadata::{MetadataFields, MetadataValue};
use pha_deploy_sdk::{ConfigError, DeployError, ValidationError};
use pha_deploy_tests::full_config;

fn missing_field(err: DeployError) -> &'static str {
    match err {
        DeployError::Config(ConfigError::Missing { field }) => field,
        other => panic!("expected a missing field, got {other}"),
    }
}

/// Clear fields one at a time, last to first, and check each is reported as
/// soon as it is the first gap in the action's order.
fn assert_mandatory_order(action: Action, order: &[Field], clear: fn(&mut Config, Field)) {
    let mut cfg = full_config(&Overrides::new()).unwrap();
    prepare(action, &cfg).unwrap();
    for field in order.iter().rev() {
        clear(&mut cfg, *field);
        let err = prepare(action, &cfg).unwrap_err();
        assert_eq!(missing_field(err), field.key(), "{action}");
    }
}

fn clear(cfg: &mut Config, field: Field) {
    match field {
        Field::Rpc => cfg.rpc.clear(),
        Field::Nexus => cfg.nexus = None,
        Field::Wif => cfg.wif = None,
        Field::Symbol => cfg.symbol = None,
        Field::CarbonTokenId => cfg.carbon_token_id = None,
        Field::CarbonTokenSeriesId => cfg.carbon_token_series_id = None,
        Field::TokenMaxSupply => cfg.token_max_supply = None,
        Field::FungibleDecimals => cfg.fungible_decimals = None,
        Field::TokenSchemas => cfg.token_schemas = None,
        Field::TokenMetadata => cfg.token_metadata = None,
        Field::SeriesMetadata => cfg.series_metadata = None,
        Field::NftMetadata => cfg.nft_metadata = None,
        Field::CreateTokenMaxData => cfg.limits.create_token = None,
        Field::CreateTokenSeriesMaxData => cfg.limits.create_token_series = None,
        Field::MintTokenMaxData => cfg.limits.mint_token = None,
        Field::GasFeeBase => cfg.gas.base = None,
        Field::GasFeeCreateTokenBase => cfg.gas.create_token_base = None,
        Field::GasFeeCreateTokenSymbol => cfg.gas.create_token_symbol = None,
        Field::GasFeeCreateTokenSeries => cfg.gas.create_token_series = None,
        Field::GasFeeMultiplier => cfg.gas.multiplier = None,
        other => panic!("{other} is not a mandatory field"),
    }
}

#[test]
fn create_token_mandatory_order() {
    assert_mandatory_order(
        Action::CreateToken,
        &[
            Field::Rpc,
            Field::Nexus,
            Field::Wif,
            Field::Symbol,
            Field::GasFeeBase,
            Field::GasFeeCreateTokenBase,
            Field::GasFeeCreateTokenSymbol,
            Field::GasFeeMultiplier,
            Field::CreateTokenMaxData,
            Field::TokenMetadata,
            Field::TokenSchemas,
        ],
        clear,
    );
}

#[test]
fn create_series_mandatory_order() {
    assert_mandatory_order(
        Action::CreateSeries,
        &[
            Field::Rpc,
            Field::Nexus,
            Field::Wif,
            Field::CarbonTokenId,
            Field::TokenSchemas,
            Field::SeriesMetadata,
            Field::GasFeeBase,
            Field::GasFeeCreateTokenSeries,
            Field::GasFeeMultiplier,
            Field::CreateTokenSeriesMaxData,
        ],
        clear,
    );
}

#[test]
fn mint_nft_mandatory_order() {
    assert_mandatory_order(
        Action::MintNft,
        &[
            Field::Rpc,
            Field::Nexus,
            Field::Wif,
            Field::CarbonTokenId,
            Field::CarbonTokenSeriesId,
            Field::TokenSchemas,
            Field::NftMetadata,
            Field::GasFeeBase,
            Field::GasFeeMultiplier,
            Field::MintTokenMaxData,
        ],
        clear,
    );
}

#[test]
fn fungible_token_needs_supply_then_decimals() {
    let mut overrides = Overrides::new();
    overrides
        .set(Field::TokenType, "fungible")
        .set(Field::TokenMaxSupply, "21000000")
        .set(Field::FungibleDecimals, "8");
    let mut cfg = full_config(&overrides).unwrap();

    let ActionRequest::CreateToken(req) = prepare(Action::CreateToken, &cfg).unwrap() else {
        panic!("wrong request kind");
    };
    assert!(matches!(req.kind, TokenKind::Fungible { decimals: 8, .. }));

    cfg.fungible_decimals = None;
    assert_eq!(
        missing_field(prepare(Action::CreateToken, &cfg).unwrap_err()),
        "fungible_decimals"
    );
    cfg.token_max_supply = None;
    assert_eq!(
        missing_field(prepare(Action::CreateToken, &cfg).unwrap_err()),
        "token_max_supply"
    );
}

#[test]
fn token_metadata_requires_the_four_display_fields() {
    let mut cfg = full_config(&Overrides::new()).unwrap();
    let without_url: MetadataFields = cfg
        .token_metadata
        .as_ref()
        .unwrap()
        .iter()
        .filter(|f| f.name != "url")
        .cloned()
        .collect();
    cfg.token_metadata = Some(without_url);

    let err = prepare(Action::CreateToken, &cfg).unwrap_err();
    assert!(matches!(
        err,
        DeployError::Validation(ValidationError::Missing { ref field }) if field == "url"
    ));
}

#[test]
fn series_metadata_is_conformed_to_the_schema() {
    let cfg = full_config(&Overrides::new()).unwrap();
    let ActionRequest::CreateSeries(req) = prepare(Action::CreateSeries, &cfg).unwrap() else {
        panic!("wrong request kind");
    };
    let names: Vec<_> = req.metadata.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["name", "maxMint"]);
    assert_eq!(req.metadata.get("maxMint"), Some(&MetadataValue::Integer(100)));
}

#[test]
fn nft_metadata_outside_the_rom_schema_is_rejected() {
    let mut overrides = Overrides::new();
    overrides.set(
        Field::NftMetadata,
        r#"{"name": "Sword", "imageURL": "x", "royalties": 5, "color": "red"}"#,
    );
    let cfg = full_config(&overrides).unwrap();
    let err = prepare(Action::MintNft, &cfg).unwrap_err();
    assert!(
        matches!(err, DeployError::Validation(ValidationError::BadEntry { .. })),
        "{err}"
    );
}

#[test]
fn int32_overflow_in_rom_is_rejected() {
    let mut overrides = Overrides::new();
    overrides.set(
        Field::NftMetadata,
        r#"{"name": "Sword", "imageURL": "x", "royalties": 2147483648}"#,
    );
    let cfg = full_config(&overrides).unwrap();
    let err = prepare(Action::MintNft, &cfg).unwrap_err();
    assert!(
        matches!(err, DeployError::Validation(ValidationError::BadNumber { .. })),
        "{err}"
    );
}

#[test]
fn missing_rom_layout_is_reported() {
    let mut overrides = Overrides::new();
    overrides.set(Field::TokenSchemas, r#"{"seriesMetadata": []}"#);
    let cfg = full_config(&overrides).unwrap();
    assert_eq!(
        missing_field(prepare(Action::MintNft, &cfg).unwrap_err()),
        "token_schemas.rom"
    );
}

#[test]
fn request_rendering_hides_the_secret() {
    let cfg = full_config(&Overrides::new()).unwrap();
    let request = prepare(Action::MintNft, &cfg).unwrap();
    let wif = cfg.wif.as_ref().unwrap().expose().to_string();

    let rendered = serde_json::to_value(&request).unwrap();
    assert_eq!(rendered["action"], "mint_nft");
    assert_eq!(rendered["owner"], request.target().owner.to_string());
    assert!(!rendered.to_string().contains(&wif));
    assert!(!format!("{request:?}").contains(&wif));
}
