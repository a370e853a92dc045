//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::SniperEngine;
use crate::store::{ConfigDraft, DefaultTradeSettings, OwnerId, SniperConfig};
use crate::trading::{Confidence, OrderReceipt};

/// Enabled configs only fire while a `run` process is watching the ledger
const ARM_NOTE: &str = "Enabled configs snipe only while `snipe run` is active.";

/// Run the monitor until Ctrl+C
pub async fn run(engine: &SniperEngine) -> Result<()> {
    let state = engine.running_state().await;
    if !state.has_enabled_configs {
        warn!("No sniper config is enabled - monitoring without buying");
    }

    engine.start_sniper().await;
    info!("Sniper running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    engine.stop_sniper().await;

    let state = engine.running_state().await;
    info!(
        "Stopped at ledger {} (monitor {})",
        state.last_ledger_index, state.monitor_state
    );
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

// Wallet

pub async fn wallet_generate(engine: &SniperEngine, owner: OwnerId) -> Result<()> {
    if engine.wallet(owner).await.is_some() && !confirm("Replace the existing wallet?")? {
        return Ok(());
    }
    let wallet = engine.generate_wallet(owner).await?;
    println!("New wallet: {}", wallet.address);
    println!("Seed: {}", wallet.seed);
    println!("Store the seed somewhere safe. It is shown only once.");
    Ok(())
}

pub async fn wallet_import(engine: &SniperEngine, owner: OwnerId, seed: &str) -> Result<()> {
    let wallet = engine.import_wallet(owner, seed).await?;
    println!("Imported wallet: {}", wallet.address);
    Ok(())
}

pub async fn wallet_show(engine: &SniperEngine, owner: OwnerId) -> Result<()> {
    match engine.wallet(owner).await {
        Some(wallet) => println!("Wallet: {}", wallet.address),
        None => println!("No wallet configured. Run `snipe wallet generate` or `snipe wallet import`."),
    }
    Ok(())
}

pub async fn wallet_send(
    engine: &SniperEngine,
    owner: OwnerId,
    destination: &str,
    amount: f64,
    force: bool,
) -> Result<()> {
    if !force && !confirm(&format!("Send {} XRP to {}?", amount, destination))? {
        info!("Transfer cancelled by user");
        return Ok(());
    }
    let outcome = engine.transfer(owner, destination, amount).await?;
    println!("Transfer confirmed: {}", outcome.hash.unwrap_or_default());
    Ok(())
}

pub async fn positions(engine: &SniperEngine, owner: OwnerId) -> Result<()> {
    let account = engine.positions(owner).await?;

    println!("\n=== POSITIONS: {} ===\n", account.address);
    println!("XRP: {}", account.xrp_balance);
    if account.lines.is_empty() {
        println!("No issued-asset holdings.");
    }
    for line in &account.lines {
        println!("{:>20} {}.{}", line.balance, line.currency, line.issuer);
    }
    Ok(())
}

// Sniper configs

fn print_config(config: &SniperConfig) {
    println!(
        "[{}] {} ({})",
        if config.enabled { "on " } else { "off" },
        config.name,
        config.config_id
    );
    if let Some(code) = &config.target_currency {
        println!("    currency:   {}", code);
    }
    if let Some(issuer) = &config.target_issuer {
        println!("    issuer:     {}", issuer);
    }
    if let Some(dev) = &config.dev_wallet_address {
        println!("    dev wallet: {}", dev);
    }
    println!(
        "    buy: {} XRP, slippage: {}%",
        config.buy_amount,
        config.slippage * 100.0
    );
    if let Some(fee) = config.max_fee {
        println!("    max fee: {} XRP", fee);
    }
    if let Some(tip) = config.tip {
        println!("    tip: {} XRP (not applied)", tip);
    }
}

pub async fn sniper_list(engine: &SniperEngine, owner: OwnerId) -> Result<()> {
    let configs = engine.sniper_configs(owner).await;
    if configs.is_empty() {
        println!("No sniper configs.");
    }
    for config in &configs {
        print_config(config);
    }

    let state = engine.running_state().await;
    if !state.has_enabled_configs {
        println!("\nNo config is enabled.");
    } else if !state.is_running {
        println!("\n{}", ARM_NOTE);
    }
    Ok(())
}

pub async fn sniper_show(engine: &SniperEngine, owner: OwnerId, config_id: &str) -> Result<()> {
    print_config(&engine.sniper_config(owner, config_id).await?);
    Ok(())
}

pub async fn sniper_create(engine: &SniperEngine, owner: OwnerId, draft: ConfigDraft) -> Result<()> {
    let config = engine.create_sniper_config(owner, draft).await?;
    println!("Created (disabled):");
    print_config(&config);
    println!("\nEnable it with `snipe sniper enable {}`", config.config_id);
    Ok(())
}

pub async fn sniper_set_enabled(
    engine: &SniperEngine,
    owner: OwnerId,
    config_id: &str,
    enabled: bool,
) -> Result<()> {
    let config = engine
        .update_sniper_config_status(owner, config_id, enabled)
        .await?;
    println!(
        "{} {}",
        config.name,
        if config.enabled { "enabled" } else { "disabled" }
    );
    if config.enabled && !engine.running_state().await.is_running {
        println!("{}", ARM_NOTE);
    }
    Ok(())
}

pub async fn sniper_delete(engine: &SniperEngine, owner: OwnerId, config_id: &str) -> Result<()> {
    let config = engine.delete_sniper_config(owner, config_id).await?;
    println!("Deleted {}", config.name);
    Ok(())
}

// Trading

fn print_receipt(action: &str, receipt: &OrderReceipt) {
    println!("\n{} confirmed ({})", action, receipt.result_code);
    if let Some(hash) = &receipt.hash {
        println!("Hash: {}", hash);
    }
    println!("Offered: {}, asked: {}", receipt.amount_in, receipt.amount_out);
    if receipt.confidence == Confidence::Fallback {
        println!("Note: the book was empty, so the price was a rough nominal estimate.");
    }
}

pub async fn buy(
    engine: &SniperEngine,
    owner: OwnerId,
    currency: &str,
    issuer: &str,
    amount: Option<f64>,
) -> Result<()> {
    let receipt = engine.manual_buy(owner, currency, issuer, amount).await?;
    print_receipt("Buy", &receipt);
    Ok(())
}

pub async fn sell(
    engine: &SniperEngine,
    owner: OwnerId,
    currency: &str,
    issuer: &str,
    percentage: f64,
    force: bool,
) -> Result<()> {
    if !(percentage > 0.0 && percentage <= 100.0) {
        anyhow::bail!("Percentage must be between 0 and 100");
    }

    if !force
        && !confirm(&format!(
            "Sell {}% of {}.{}? This cannot be undone.",
            percentage, currency, issuer
        ))?
    {
        info!("Sell cancelled by user");
        return Ok(());
    }

    let receipt = engine.sell(owner, currency, issuer, percentage).await?;
    print_receipt("Sell", &receipt);
    Ok(())
}

// Presets and settings

pub async fn buy_presets(
    engine: &SniperEngine,
    owner: OwnerId,
    add: Option<f64>,
    remove: Option<f64>,
) -> Result<()> {
    if let Some(amount) = add {
        if !engine.add_buy_preset(owner, amount).await? {
            println!("{} XRP is already a preset", amount);
        }
    }
    if let Some(amount) = remove {
        if !engine.remove_buy_preset(owner, amount).await? {
            println!("{} XRP is not a preset", amount);
        }
    }
    let presets = engine.buy_presets(owner).await;
    println!("Buy presets (XRP): {:?}", presets);
    Ok(())
}

pub async fn sell_presets(
    engine: &SniperEngine,
    owner: OwnerId,
    add: Option<u8>,
    remove: Option<u8>,
) -> Result<()> {
    if let Some(pct) = add {
        if !engine.add_sell_preset(owner, pct).await? {
            println!("{}% is already a preset", pct);
        }
    }
    if let Some(pct) = remove {
        if !engine.remove_sell_preset(owner, pct).await? {
            println!("{}% is not a preset", pct);
        }
    }
    let presets = engine.sell_presets(owner).await;
    println!("Sell presets (%): {:?}", presets);
    Ok(())
}

pub async fn defaults_show(engine: &SniperEngine, owner: OwnerId) -> Result<()> {
    let defaults = engine.default_trade_settings(owner).await;
    let trading = &engine.config().trading;
    println!(
        "Buy amount: {} XRP",
        defaults.buy_amount.unwrap_or(trading.default_buy_amount)
    );
    println!(
        "Slippage: {}%",
        defaults.slippage.unwrap_or(trading.default_slippage) * 100.0
    );
    match defaults.max_fee {
        Some(fee) => println!("Max fee: {} XRP", fee),
        None => println!("Max fee: network default"),
    }
    println!(
        "MEV protection: {}",
        if engine.mev_protection(owner).await { "on" } else { "off" }
    );
    Ok(())
}

pub async fn defaults_set(
    engine: &SniperEngine,
    owner: OwnerId,
    settings: DefaultTradeSettings,
) -> Result<()> {
    let current = engine.default_trade_settings(owner).await;
    let merged = DefaultTradeSettings {
        buy_amount: settings.buy_amount.or(current.buy_amount),
        slippage: settings.slippage.or(current.slippage),
        max_fee: settings.max_fee.or(current.max_fee),
    };
    engine.set_default_trade_settings(owner, merged).await?;
    defaults_show(engine, owner).await
}

pub async fn mev(engine: &SniperEngine, owner: OwnerId, enabled: bool) -> Result<()> {
    engine.set_mev_protection(owner, enabled).await?;
    println!("MEV protection {}", if enabled { "on" } else { "off" });
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
