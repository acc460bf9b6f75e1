use std::path::PathBuf;

use anyhow::Context as _;
use clap::{CommandFactory, Parser};
use pha_deploy_sdk::config::{resolve, ConfigFile, Field, Overrides, DEFAULT_CONFIG_PATH};
use pha_deploy_sdk::node::RPC_LOG_TARGET;
use pha_deploy_sdk::{prepare, Action, Deployer, LocalTxBuilder, RpcNodeClient};
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type LogHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser, Debug)]
#[command(
    name = "pha-deploy",
    version,
    about = "Phantasma Carbon token deployment CLI",
    long_about = "Create tokens and series and mint NFTs on a Phantasma node.\nValues come from flags, then the config file, then defaults.\nThe final report is printed to stdout as JSON; logs/status go to stderr."
)]
struct Cli {
    /// Config file path (default: config.toml, skipped when absent)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Create a fungible or NFT token
    #[arg(long, help_heading = "Actions")]
    create_token: bool,

    /// Create a series under an NFT token
    #[arg(long, help_heading = "Actions")]
    create_series: bool,

    /// Mint an NFT into a series
    #[arg(long, help_heading = "Actions")]
    mint_nft: bool,

    /// RPC endpoint URL
    #[arg(long)]
    rpc: Option<String>,

    /// Network name (e.g. mainnet, testnet)
    #[arg(long)]
    nexus: Option<String>,

    /// WIF-encoded signing key
    #[arg(long, env = "PHA_DEPLOY_WIF", hide_env_values = true)]
    wif: Option<String>,

    /// Token symbol
    #[arg(long)]
    symbol: Option<String>,

    #[arg(long)]
    carbon_token_id: Option<String>,

    #[arg(long)]
    carbon_token_series_id: Option<String>,

    /// Token type: fungible or nft
    #[arg(long)]
    token_type: Option<String>,

    /// Maximum supply (required for fungible tokens)
    #[arg(long, alias = "fungible-max-supply")]
    token_max_supply: Option<String>,

    /// Decimal places, 0..=255 (required for fungible tokens)
    #[arg(long)]
    fungible_decimals: Option<String>,

    /// JSON with seriesMetadata, rom and ram struct layouts
    #[arg(long, value_name = "JSON")]
    token_schemas: Option<String>,

    /// JSON object or [{name, value}] array; needs name, icon, url, description
    #[arg(long, value_name = "JSON")]
    token_metadata: Option<String>,

    #[arg(long, value_name = "JSON")]
    series_metadata: Option<String>,

    #[arg(long, value_name = "JSON")]
    nft_metadata: Option<String>,

    #[arg(long, help_heading = "Limits")]
    create_token_max_data: Option<String>,

    #[arg(long, help_heading = "Limits")]
    create_token_series_max_data: Option<String>,

    #[arg(long, help_heading = "Limits")]
    mint_token_max_data: Option<String>,

    #[arg(long, help_heading = "Fees")]
    gas_fee_base: Option<String>,

    #[arg(long, help_heading = "Fees")]
    gas_fee_create_token_base: Option<String>,

    #[arg(long, help_heading = "Fees")]
    gas_fee_create_token_symbol: Option<String>,

    #[arg(long, help_heading = "Fees")]
    gas_fee_create_token_series: Option<String>,

    #[arg(long, help_heading = "Fees")]
    gas_fee_multiplier: Option<String>,

    /// Build and sign but do not broadcast
    #[arg(long)]
    dry_run: bool,

    /// Log raw node requests and responses
    #[arg(long)]
    rpc_log: bool,

    /// Log the resolved settings (secret redacted)
    #[arg(long)]
    settings_log: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let mut o = Overrides::new();
        o.set_opt(Field::Rpc, self.rpc.as_deref())
            .set_opt(Field::Nexus, self.nexus.as_deref())
            .set_opt(Field::Wif, self.wif.as_deref())
            .set_opt(Field::Symbol, self.symbol.as_deref())
            .set_opt(Field::CarbonTokenId, self.carbon_token_id.as_deref())
            .set_opt(Field::CarbonTokenSeriesId, self.carbon_token_series_id.as_deref())
            .set_opt(Field::TokenType, self.token_type.as_deref())
            .set_opt(Field::TokenMaxSupply, self.token_max_supply.as_deref())
            .set_opt(Field::FungibleDecimals, self.fungible_decimals.as_deref())
            .set_opt(Field::TokenSchemas, self.token_schemas.as_deref())
            .set_opt(Field::TokenMetadata, self.token_metadata.as_deref())
            .set_opt(Field::SeriesMetadata, self.series_metadata.as_deref())
            .set_opt(Field::NftMetadata, self.nft_metadata.as_deref())
            .set_opt(Field::CreateTokenMaxData, self.create_token_max_data.as_deref())
            .set_opt(
                Field::CreateTokenSeriesMaxData,
                self.create_token_series_max_data.as_deref(),
            )
            .set_opt(Field::MintTokenMaxData, self.mint_token_max_data.as_deref())
            .set_opt(Field::GasFeeBase, self.gas_fee_base.as_deref())
            .set_opt(Field::GasFeeCreateTokenBase, self.gas_fee_create_token_base.as_deref())
            .set_opt(
                Field::GasFeeCreateTokenSymbol,
                self.gas_fee_create_token_symbol.as_deref(),
            )
            .set_opt(
                Field::GasFeeCreateTokenSeries,
                self.gas_fee_create_token_series.as_deref(),
            )
            .set_opt(Field::GasFeeMultiplier, self.gas_fee_multiplier.as_deref())
            .set_flag(Field::DryRun, self.dry_run)
            .set_flag(Field::RpcLog, self.rpc_log)
            .set_flag(Field::SettingsLog, self.settings_log);
        o
    }
}

fn init_tracing() -> LogHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

fn enable_rpc_log(log: &LogHandle) -> anyhow::Result<()> {
    let directive: Directive = format!("{RPC_LOG_TARGET}=debug").parse()?;
    log.modify(|filter| {
        let current = std::mem::replace(filter, EnvFilter::new(""));
        *filter = current.add_directive(directive);
    })
    .context("enable rpc log")
}

async fn run(cli: Cli, log: &LogHandle) -> anyhow::Result<()> {
    let action = match Action::select(cli.create_token, cli.create_series, cli.mint_nft) {
        Ok(Some(action)) => action,
        Ok(None) => {
            println!("{}", Cli::command().render_help());
            return Ok(());
        }
        Err(err) => {
            eprintln!("{}", Cli::command().render_usage());
            return Err(err.into());
        }
    };

    let file = ConfigFile::load(cli.config.as_deref())?;
    let config = resolve(&cli.overrides(), &file)?;
    if config.rpc_log {
        enable_rpc_log(log)?;
    }
    if config.settings_log {
        let source = config
            .config_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("{DEFAULT_CONFIG_PATH} (not found)"));
        let settings = serde_json::to_string_pretty(&config.redacted())?;
        info!(%action, config = %source, "resolved settings:\n{settings}");
    }

    let request = prepare(action, &config)?;
    let target = request.target();
    info!(%action, owner = %target.owner, nexus = %target.nexus, "prepared request");

    let node = RpcNodeClient::new(&target.rpc, &target.nexus)?;
    let deployer =
        Deployer::new(LocalTxBuilder::new(), node).with_settings_log(config.settings_log);
    let report = deployer.execute(&request, config.dry_run).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let log = init_tracing();
    run(cli, &log).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pha_deploy_sdk::DispatchError;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pha-deploy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    #[serial]
    fn flags_become_overrides() {
        std::env::remove_var("PHA_DEPLOY_WIF");
        let cli = parse(&[
            "--create-token",
            "--symbol",
            "SWD",
            "--fungible-max-supply",
            "1000",
            "--dry-run",
            "-c",
            "deploy.toml",
        ]);
        assert!(cli.create_token);
        assert_eq!(cli.config, Some(PathBuf::from("deploy.toml")));

        let o = cli.overrides();
        assert_eq!(o.get(Field::Symbol), Some("SWD"));
        assert_eq!(o.get(Field::TokenMaxSupply), Some("1000"));
        assert_eq!(o.get(Field::DryRun), Some("true"));
        assert_eq!(o.get(Field::RpcLog), None);
        assert_eq!(o.get(Field::Wif), None);
    }

    #[test]
    #[serial]
    fn wif_is_read_from_the_environment() {
        std::env::set_var("PHA_DEPLOY_WIF", "from-env");
        let cli = parse(&["--mint-nft"]);
        std::env::remove_var("PHA_DEPLOY_WIF");
        assert_eq!(cli.overrides().get(Field::Wif), Some("from-env"));
    }

    #[test]
    #[serial]
    fn explicit_wif_flag_beats_the_environment() {
        std::env::set_var("PHA_DEPLOY_WIF", "from-env");
        let cli = parse(&["--wif", "from-flag"]);
        std::env::remove_var("PHA_DEPLOY_WIF");
        assert_eq!(cli.wif.as_deref(), Some("from-flag"));
    }

    fn detached_log() -> LogHandle {
        let (_layer, handle): (_, LogHandle) = reload::Layer::new(EnvFilter::new("info"));
        handle
    }

    #[tokio::test]
    #[serial]
    async fn no_action_prints_help_before_reading_config() {
        std::env::remove_var("PHA_DEPLOY_WIF");
        let cli = parse(&["--config", "/nonexistent/pha-deploy.toml", "--symbol", "SWD"]);
        run(cli, &detached_log()).await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn several_actions_fail_before_reading_config() {
        std::env::remove_var("PHA_DEPLOY_WIF");
        let cli = parse(&[
            "--create-token",
            "--mint-nft",
            "--config",
            "/nonexistent/pha-deploy.toml",
        ]);
        let err = run(cli, &detached_log()).await.unwrap_err();
        match err.downcast_ref::<DispatchError>() {
            Some(DispatchError::ConflictingActions { actions }) => {
                assert_eq!(actions.len(), 2, "{err}");
            }
            None => panic!("expected conflicting actions, got {err:#}"),
        }
    }

    #[test]
    fn help_lists_actions_and_env_source() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("PHA_DEPLOY_WIF"));
        assert!(help.contains("--create-series"));
    }
}
