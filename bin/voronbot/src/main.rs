use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, EventSink, ExchangeClient, LogNotifier, Notifier, TradingMode};
use engine::{BotConfig, Dispatcher, Engine, OkxClient, RetryingExchange, SqliteStore};
use paper::PaperClient;
use telegram_ctrl::{start_bot, BotDeps, TelegramNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment")?;
    let bot_cfg = BotConfig::load(&cfg.bot_config_path).context("invalid bot config")?;
    info!(mode = %cfg.trading_mode, symbol = %cfg.symbol, "VoronBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .context("failed to open database")?;
    let sink: Arc<dyn EventSink> = Arc::new(store);

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let okx = OkxClient::new(
        cfg.okx_api_key.clone(),
        cfg.okx_secret.clone(),
        cfg.okx_passphrase.clone(),
        cfg.okx_demo,
    )?;
    let okx: Arc<dyn ExchangeClient> =
        Arc::new(RetryingExchange::new(Arc::new(okx), bot_cfg.retry.clone()));
    let exchange: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(demo = cfg.okx_demo, "Live trading mode, using OkxClient");
            okx
        }
        TradingMode::Paper => {
            info!(
                balance = cfg.paper_balance_usd,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode, using PaperClient with OKX market data"
            );
            Arc::new(
                PaperClient::new(cfg.paper_balance_usd, cfg.paper_slippage_bps).with_market_data(okx),
            )
        }
    };

    // ── Notifications ─────────────────────────────────────────────────────────
    let bot = cfg.telegram_token.clone().map(teloxide::Bot::new);
    let notifier: Arc<dyn Notifier> = match &bot {
        Some(bot) => Arc::new(TelegramNotifier::new(
            bot.clone(),
            &cfg.telegram_chat_ids,
            bot_cfg.retry.clone(),
        )),
        None => {
            info!("TELEGRAM_TOKEN not set, alerts go to the log");
            Arc::new(LogNotifier)
        }
    };

    // ── Dispatcher and scheduler ──────────────────────────────────────────────
    let stale_after = chrono::Duration::seconds(bot_cfg.schedule.stale_after_secs);
    let mut dispatcher = Dispatcher::new(
        cfg.symbol.clone(),
        cfg.trading_mode,
        bot_cfg,
        exchange,
        notifier.clone(),
        sink,
    );
    dispatcher.restore().await;
    let (engine, handle) = Engine::new(dispatcher);

    // ── Telegram commands ─────────────────────────────────────────────────────
    if let Some(bot) = bot {
        let deps = BotDeps {
            status: handle.subscribe(),
            allowed_user_ids: Arc::new(cfg.telegram_chat_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }

    // ── Status API ────────────────────────────────────────────────────────────
    let api_state = api::AppState {
        status: handle.subscribe(),
        stale_after,
    };
    let port = cfg.port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            error!(error = %e, port, "Status API stopped");
        }
    });

    let scheduler = tokio::spawn(engine.run());
    notifier
        .notify(&format!("🚀 VoronBot started ({} {})", cfg.symbol, cfg.trading_mode))
        .await;

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received. Finishing the running cycle.");
    handle.shutdown();
    scheduler.await.context("scheduler task panicked")?;
    Ok(())
}
