//! XRPL Sniper - automatic buys on new ledger liquidity
//!
//! # WARNING
//! - This bot trades with real funds. Only use funds you can afford to lose.
//! - Matching is permissive: a config with only a currency code will buy
//!   any issuer's asset with that code.
//! - Testnet success does NOT equal mainnet success.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use xrpl_sniper::cli::commands;
use xrpl_sniper::config::Config;
use xrpl_sniper::engine::SniperEngine;
use xrpl_sniper::store::{ConfigDraft, DefaultTradeSettings, OwnerId};

/// XRPL Sniper - ledger liquidity sniper
#[derive(Parser)]
#[command(name = "snipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Owner identity to act as
    #[arg(long, env = "SNIPER_OWNER", default_value = "0")]
    owner: OwnerId,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring the ledger and sniping
    Run,

    /// Show current configuration (secrets masked)
    Config,

    /// Wallet management
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Sniper config management
    Sniper {
        #[command(subcommand)]
        action: SniperAction,
    },

    /// Buy an issued asset with XRP
    Buy {
        /// Currency code
        currency: String,

        /// Issuer address
        issuer: String,

        /// XRP to spend (default: your default buy amount)
        #[arg(long)]
        amount: Option<f64>,
    },

    /// Sell a percentage of an issued-asset holding
    Sell {
        /// Currency code
        currency: String,

        /// Issuer address
        issuer: String,

        /// Percentage of the balance to sell
        #[arg(default_value = "100")]
        percentage: f64,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Buy and sell presets
    Presets {
        #[command(subcommand)]
        kind: PresetKind,
    },

    /// Defaults for manual trades
    Defaults {
        #[command(subcommand)]
        action: DefaultsAction,
    },

    /// Delay order submission to reduce front-running
    Mev {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Show XRP and issued-asset balances
    Positions,
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new wallet (funded from the faucet when configured)
    Generate,

    /// Import a wallet from its seed
    Import {
        /// Family seed (s...)
        seed: String,
    },

    /// Show the wallet address
    Show,

    /// Send XRP to another account
    Send {
        /// Destination address
        destination: String,

        /// Amount in XRP
        amount: f64,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SniperAction {
    /// List sniper configs
    List,

    /// Show one config
    Show { id: String },

    /// Create a config (starts disabled)
    Create {
        /// Unique name
        #[arg(long)]
        name: String,

        /// Match on currency code (case-insensitive)
        #[arg(long)]
        currency: Option<String>,

        /// Match on issuer address
        #[arg(long)]
        issuer: Option<String>,

        /// Match on the account creating the offer
        #[arg(long)]
        dev_wallet: Option<String>,

        /// XRP to spend per snipe
        #[arg(long)]
        amount: Option<f64>,

        /// Slippage as a fraction (0.05 = 5%)
        #[arg(long)]
        slippage: Option<f64>,

        /// Transaction fee in XRP
        #[arg(long)]
        max_fee: Option<f64>,

        /// Tip in XRP (recorded only)
        #[arg(long)]
        tip: Option<f64>,
    },

    /// Enable a config
    Enable { id: String },

    /// Disable a config
    Disable { id: String },

    /// Delete a config
    Delete { id: String },
}

#[derive(Subcommand)]
enum PresetKind {
    /// Buy amounts in XRP
    Buy {
        #[command(subcommand)]
        op: BuyPresetOp,
    },

    /// Sell percentages
    Sell {
        #[command(subcommand)]
        op: SellPresetOp,
    },
}

#[derive(Subcommand)]
enum BuyPresetOp {
    Add { amount: f64 },
    Remove { amount: f64 },
    List,
}

#[derive(Subcommand)]
enum SellPresetOp {
    Add { percentage: u8 },
    Remove { percentage: u8 },
    List,
}

#[derive(Subcommand)]
enum DefaultsAction {
    Show,

    Set {
        /// XRP to spend per manual buy
        #[arg(long)]
        amount: Option<f64>,

        /// Slippage as a fraction
        #[arg(long)]
        slippage: Option<f64>,

        /// Transaction fee in XRP
        #[arg(long)]
        max_fee: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("xrpl_sniper=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Config = cli.command {
        return commands::show_config(&config);
    }

    // Only `run` stays up long enough for a started monitor to matter
    let keeps_running = matches!(cli.command, Commands::Run);
    let engine = match SniperEngine::from_config(config) {
        Ok(engine) => engine.with_auto_start(keeps_running),
        Err(e) => {
            error!("Failed to start: {}", e.user_message());
            std::process::exit(1);
        }
    };

    let result = execute(&engine, cli.owner, cli.command).await;

    if let Err(e) = result {
        let message = match e.downcast_ref::<xrpl_sniper::Error>() {
            Some(err) => err.user_message(),
            None => e.to_string(),
        };
        error!("Command failed: {}", message);
        std::process::exit(1);
    }

    Ok(())
}

async fn execute(engine: &SniperEngine, owner: OwnerId, command: Commands) -> Result<()> {
    match command {
        Commands::Run => commands::run(engine).await,
        Commands::Config => commands::show_config(engine.config()),
        Commands::Wallet { action } => match action {
            WalletAction::Generate => commands::wallet_generate(engine, owner).await,
            WalletAction::Import { seed } => commands::wallet_import(engine, owner, &seed).await,
            WalletAction::Show => commands::wallet_show(engine, owner).await,
            WalletAction::Send {
                destination,
                amount,
                force,
            } => commands::wallet_send(engine, owner, &destination, amount, force).await,
        },
        Commands::Sniper { action } => match action {
            SniperAction::List => commands::sniper_list(engine, owner).await,
            SniperAction::Show { id } => commands::sniper_show(engine, owner, &id).await,
            SniperAction::Create {
                name,
                currency,
                issuer,
                dev_wallet,
                amount,
                slippage,
                max_fee,
                tip,
            } => {
                let draft = ConfigDraft {
                    name: Some(name),
                    target_currency: currency,
                    target_issuer: issuer,
                    dev_wallet_address: dev_wallet,
                    buy_amount: amount,
                    slippage,
                    max_fee,
                    tip,
                };
                commands::sniper_create(engine, owner, draft).await
            }
            SniperAction::Enable { id } => {
                commands::sniper_set_enabled(engine, owner, &id, true).await
            }
            SniperAction::Disable { id } => {
                commands::sniper_set_enabled(engine, owner, &id, false).await
            }
            SniperAction::Delete { id } => commands::sniper_delete(engine, owner, &id).await,
        },
        Commands::Buy {
            currency,
            issuer,
            amount,
        } => commands::buy(engine, owner, &currency, &issuer, amount).await,
        Commands::Sell {
            currency,
            issuer,
            percentage,
            force,
        } => commands::sell(engine, owner, &currency, &issuer, percentage, force).await,
        Commands::Presets { kind } => match kind {
            PresetKind::Buy { op } => match op {
                BuyPresetOp::Add { amount } => {
                    commands::buy_presets(engine, owner, Some(amount), None).await
                }
                BuyPresetOp::Remove { amount } => {
                    commands::buy_presets(engine, owner, None, Some(amount)).await
                }
                BuyPresetOp::List => commands::buy_presets(engine, owner, None, None).await,
            },
            PresetKind::Sell { op } => match op {
                SellPresetOp::Add { percentage } => {
                    commands::sell_presets(engine, owner, Some(percentage), None).await
                }
                SellPresetOp::Remove { percentage } => {
                    commands::sell_presets(engine, owner, None, Some(percentage)).await
                }
                SellPresetOp::List => commands::sell_presets(engine, owner, None, None).await,
            },
        },
        Commands::Defaults { action } => match action {
            DefaultsAction::Show => commands::defaults_show(engine, owner).await,
            DefaultsAction::Set {
                amount,
                slippage,
                max_fee,
            } => {
                let settings = DefaultTradeSettings {
                    buy_amount: amount,
                    slippage,
                    max_fee,
                };
                commands::defaults_set(engine, owner, settings).await
            }
        },
        Commands::Mev { state } => commands::mev(engine, owner, matches!(state, Toggle::On)).await,
        Commands::Positions => commands::positions(engine, owner).await,
    }
}
