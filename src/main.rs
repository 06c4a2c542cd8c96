use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fiso_rewards::config::{Config, ConfigOverrides};
use fiso_rewards::engine::Engine;
use fiso_rewards::output::csv::{pools_to_csv, rewards_to_csv, totals_to_csv};
use fiso_rewards::output::json::render_json;
use fiso_rewards::output::table::{
    render_campaign_table, render_pools_table, render_rewards_table, render_snapshot_table,
    render_totals_table,
};
use fiso_rewards::server::run_server;
use fiso_rewards::types::{ApprovedPool, CampaignDraft};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "fiso-rewards",
    about = "Fair Initial Stake-pool Offering reward accounting"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long = "indexer-url")]
    indexer_url: Option<String>,
    #[arg(long = "project-id", env = "BLOCKFROST_PROJECT_ID", hide_env_values = true)]
    project_id: Option<String>,
    /// SQLite database path, or `:memory:` for a throwaway in-memory store.
    #[arg(long)]
    db: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Tokens earned so far by a stake account in a campaign.
    Rewards {
        fiso_id: i64,
        account: String,
        #[arg(long)]
        epoch: Option<u64>,
    },
    /// Total approved-pool stake per finalized campaign epoch.
    Totals {
        fiso_id: i64,
        #[arg(long)]
        epoch: Option<u64>,
    },
    /// Metadata and live statistics for pools, by bech32 or hex id.
    Pools {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Current delegation of a stake account.
    Account { address: String },
    /// Latest epoch reported by the indexer.
    Epoch,
    Campaign {
        #[command(subcommand)]
        action: CampaignCommand,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Subcommand)]
enum CampaignCommand {
    Create {
        slug: String,
        #[arg(long)]
        tokens: f64,
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
    },
    Show { fiso_id: i64 },
    /// Replaces the approved pool set; each pool as `POOL_ID:START:END`.
    Pools {
        fiso_id: i64,
        #[arg(long = "pool")]
        pools: Vec<String>,
    },
    Epochs {
        fiso_id: i64,
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        indexer_url: cli.indexer_url.clone(),
        project_id: cli.project_id.clone(),
        db_path: cli.db.clone(),
    });

    if let Commands::Config { init, show } = &cli.command {
        return handle_config_command(*init, *show, &config, &config_path);
    }

    let engine = Engine::from_config(&config)?;
    match &cli.command {
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, engine, addr).await?;
        }
        Commands::Rewards {
            fiso_id,
            account,
            epoch,
        } => {
            let info = engine.rewards.reward_info(*fiso_id, account, *epoch).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_rewards_table(&info)),
                OutputFormat::Json => println!("{}", render_json(&info)?),
                OutputFormat::Csv => print!("{}", rewards_to_csv(&info)?),
            }
        }
        Commands::Totals { fiso_id, epoch } => {
            let totals = engine.epoch_totals(*fiso_id, *epoch).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_totals_table(&totals)),
                OutputFormat::Json => println!("{}", render_json(&totals)?),
                OutputFormat::Csv => print!("{}", totals_to_csv(&totals)?),
            }
        }
        Commands::Pools { ids } => {
            let bundle = engine.pools.pool_info(ids.as_slice()).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_pools_table(&bundle)),
                OutputFormat::Json => println!("{}", render_json(&bundle)?),
                OutputFormat::Csv => print!("{}", pools_to_csv(&bundle)?),
            }
        }
        Commands::Account { address } => {
            let snapshot = engine.account_snapshot(address).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_snapshot_table(&snapshot)),
                OutputFormat::Json | OutputFormat::Csv => {
                    warn_json_fallback(cli.output, "account");
                    println!("{}", render_json(&snapshot)?);
                }
            }
        }
        Commands::Epoch => {
            let epoch = engine.latest_epoch().await?;
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(&epoch)?),
                OutputFormat::Table | OutputFormat::Csv => println!("{epoch}"),
            }
        }
        Commands::Campaign { action } => {
            let details = match action {
                CampaignCommand::Create {
                    slug,
                    tokens,
                    ticker,
                    start,
                    end,
                } => {
                    let campaign = engine.campaigns.create_campaign(&CampaignDraft {
                        project_slug: slug.clone(),
                        token_amount: *tokens,
                        token_ticker: ticker.clone(),
                        start_epoch: *start,
                        end_epoch: *end,
                    })?;
                    engine.campaigns.get_campaign(campaign.id)?
                }
                CampaignCommand::Show { fiso_id } => engine.campaigns.get_campaign(*fiso_id)?,
                CampaignCommand::Pools { fiso_id, pools } => {
                    let pools = pools
                        .iter()
                        .map(|raw| parse_approved_pool(raw))
                        .collect::<Result<Vec<_>>>()?;
                    engine.campaigns.set_approved_pools(*fiso_id, &pools)?
                }
                CampaignCommand::Epochs {
                    fiso_id,
                    start,
                    end,
                } => engine
                    .campaigns
                    .update_campaign_epochs(*fiso_id, *start, *end)?,
            };
            match cli.output {
                OutputFormat::Table => println!("{}", render_campaign_table(&details)),
                OutputFormat::Json | OutputFormat::Csv => {
                    warn_json_fallback(cli.output, "campaign");
                    println!("{}", render_json(&details)?);
                }
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn warn_json_fallback(format: OutputFormat, command: &str) {
    if matches!(format, OutputFormat::Csv) {
        warn!("CSV output for {command} not implemented, using JSON");
    }
}

fn parse_approved_pool(raw: &str) -> Result<ApprovedPool> {
    let mut parts = raw.trim().rsplitn(3, ':');
    let (Some(end), Some(start), Some(pool_id)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("expected POOL_ID:START:END, got {raw:?}"));
    };
    Ok(ApprovedPool {
        pool_id: pool_id.to_string(),
        start_epoch: start
            .parse()
            .with_context(|| format!("invalid start epoch in {raw:?}"))?,
        end_epoch: end
            .parse()
            .with_context(|| format!("invalid end epoch in {raw:?}"))?,
    })
}
