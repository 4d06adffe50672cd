//! steth-rewards CLI: chain, subgraph, verify.

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use clap::{Args, Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use steth_rewards::chain::{parse_block_spec, Cache, FetchConfig, RpcClient, SubgraphClient};
use steth_rewards::lido::{DEFAULT_CHAIN_STEP, DEFAULT_SUBGRAPH_PAGE};
use steth_rewards::verify::{ledger_hash, read_bundle, verify_ledger_hash, write_bundle};
use steth_rewards::{
    rewards_from_chain, rewards_from_subgraph, BackSpec, FromSpec, LedgerBundle, LedgerSource,
    NetworkConfig, RewardLedger, RewardQuery, RewardsError,
};
use time::OffsetDateTime;
use tracing::info;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Chain(args) => run_chain(args),
        Command::Subgraph(args) => run_subgraph(args),
        Command::Verify(args) => run_verify(args),
    }
}

#[derive(Parser)]
#[command(name = "steth-rewards")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "stETH reward ledger from chain logs or the Lido subgraph")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the ledger from eth_getLogs and historical eth_call.
    Chain(ChainArgs),
    /// Build the ledger from the Lido subgraph.
    Subgraph(SubgraphArgs),
    /// Verify a saved ledger against its .sha256 file.
    Verify(VerifyArgs),
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long)]
    account: Address,
    #[arg(long, env = "STETH_REWARDS_RPC_URL")]
    rpc_url: String,
    /// Block number, tag, `@unix_secs` or RFC 3339 time.
    #[arg(long, conflicts_with_all = ["back_blocks", "back_days", "back_seconds"])]
    from: Option<String>,
    #[arg(long, default_value = "latest")]
    to: String,
    #[arg(long)]
    back_blocks: Option<u64>,
    #[arg(long)]
    back_days: Option<u64>,
    #[arg(long)]
    back_seconds: Option<u64>,
    /// Blocks per log request (chain) or entities per page (subgraph).
    #[arg(long)]
    step: Option<u64>,
    #[arg(long)]
    include_zero_rebases: bool,
    /// Keep transfers as well as rebases.
    #[arg(long)]
    include_only_rebases: bool,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long, default_value = "./ledgers")]
    out_dir: PathBuf,
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
}

#[derive(Args)]
struct ChainArgs {
    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Args)]
struct SubgraphArgs {
    #[command(flatten)]
    range: RangeArgs,
    /// Overrides the configured subgraph URL for the connected network.
    #[arg(long)]
    subgraph_url: Option<String>,
    #[arg(long, env = "STETH_REWARDS_SUBGRAPH_API_KEY")]
    api_key: Option<String>,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long)]
    ledger: PathBuf,
    /// Defaults to `<account>.sha256` next to the ledger.
    #[arg(long)]
    hash: Option<PathBuf>,
}

fn build_query(args: &RangeArgs, default_step: u64) -> CliResult<RewardQuery> {
    let from = match &args.from {
        Some(s) => FromSpec::Block(parse_block_spec(s)?),
        None => FromSpec::Back(BackSpec {
            blocks: args.back_blocks,
            days: args.back_days,
            seconds: args.back_seconds,
        }),
    };
    Ok(RewardQuery {
        account: args.account,
        from,
        to: parse_block_spec(&args.to)?,
        step: args.step.unwrap_or(default_step),
        include_zero_rebases: args.include_zero_rebases,
        include_only_rebases: args.include_only_rebases,
    })
}

async fn with_timeout<T>(
    secs: Option<u64>,
    fut: impl Future<Output = Result<T, RewardsError>>,
) -> CliResult<T> {
    match secs {
        Some(s) => Ok(tokio::time::timeout(Duration::from_secs(s), fut).await??),
        None => Ok(fut.await?),
    }
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("blocks.sqlite")
}

fn write_outputs(
    out_dir: &Path,
    chain_id: u64,
    source: LedgerSource,
    query: RewardQuery,
    ledger: RewardLedger,
) -> CliResult<()> {
    std::fs::create_dir_all(out_dir)?;
    let stem = format!("{:#x}", query.account);
    let ledger_path = out_dir.join(format!("{stem}.ledger.json"));
    let hash_path = out_dir.join(format!("{stem}.sha256"));
    let hash = ledger_hash(&ledger)?;
    let records = ledger.rewards.len();
    let bundle = LedgerBundle::new(chain_id, source, query, ledger);
    write_bundle(&ledger_path, &bundle)?;
    std::fs::write(&hash_path, format!("{hash}\n"))?;
    info!(?ledger_path, ?hash_path, records, "ledger written");
    println!("{hash}");
    Ok(())
}

fn run_chain(args: ChainArgs) -> CliResult<()> {
    let args = args.range;
    let query = build_query(&args, DEFAULT_CHAIN_STEP)?;
    let rt = tokio::runtime::Runtime::new()?;
    let (chain_id, ledger) = rt.block_on(async {
        let provider = ProviderBuilder::new().connect(&args.rpc_url).await?;
        let chain_id = provider.get_chain_id().await?;
        let deployment = NetworkConfig::load().deployment(chain_id)?;
        info!(chain_id, steth = %deployment.steth, "connected");
        let client = RpcClient::new(provider, deployment.steth)
            .with_cache(Cache::open(cache_path(&args.cache_dir))?);
        let now = OffsetDateTime::now_utc();
        let ledger = with_timeout(
            args.timeout_secs,
            rewards_from_chain(&client, &deployment, &query, now),
        )
        .await?;
        CliResult::Ok((chain_id, ledger))
    })?;
    write_outputs(&args.out_dir, chain_id, LedgerSource::Chain, query, ledger)
}

fn run_subgraph(args: SubgraphArgs) -> CliResult<()> {
    let query = build_query(&args.range, DEFAULT_SUBGRAPH_PAGE)?;
    let range = &args.range;
    let rt = tokio::runtime::Runtime::new()?;
    let (chain_id, ledger) = rt.block_on(async {
        let provider = ProviderBuilder::new().connect(&range.rpc_url).await?;
        let chain_id = provider.get_chain_id().await?;
        let deployment = NetworkConfig::load().deployment(chain_id)?;
        let url = args
            .subgraph_url
            .clone()
            .or_else(|| deployment.subgraph_url.clone())
            .ok_or_else(|| {
                RewardsError::NotSupported(format!(
                    "no subgraph URL configured for chain {chain_id}; pass --subgraph-url"
                ))
            })?;
        let mut config = FetchConfig::new(url);
        config.api_key.clone_from(&args.api_key);
        if let Some(secs) = range.timeout_secs {
            config.timeout_secs = secs;
        }
        let subgraph = SubgraphClient::new(config)?;
        let blocks = RpcClient::new(provider, deployment.steth)
            .with_cache(Cache::open(cache_path(&range.cache_dir))?);
        let now = OffsetDateTime::now_utc();
        let ledger = with_timeout(
            range.timeout_secs,
            rewards_from_subgraph(&subgraph, &blocks, &deployment, &query, now),
        )
        .await?;
        info!(requests = subgraph.request_count(), "subgraph complete");
        CliResult::Ok((chain_id, ledger))
    })?;
    write_outputs(&range.out_dir, chain_id, LedgerSource::Subgraph, query, ledger)
}

fn run_verify(args: VerifyArgs) -> CliResult<()> {
    let bundle = read_bundle(&args.ledger)?;
    let hash_path = args.hash.unwrap_or_else(|| {
        args.ledger
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{:#x}.sha256", bundle.query.account))
    });
    let expected = std::fs::read_to_string(&hash_path)?;
    let result = verify_ledger_hash(&bundle.ledger, &expected)?;
    if result.matches {
        println!("OK\t{}", result.ledger_hash);
    } else {
        eprintln!(
            "MISMATCH\tcomputed={}\texpected={:?}",
            result.ledger_hash, result.expected_hash
        );
        std::process::exit(1);
    }
    Ok(())
}
