use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info};
use watchlist_bot::handlers::AppContext;
use watchlist_bot::stock::{self, HttpStockSource};
use watchlist_bot::{config, db, notifier, telegram};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.default_database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());

    if cfg.stock.enabled {
        let source = HttpStockSource::from_config(&cfg.stock)?;
        let worker_pool = pool.clone();
        let sink = bot.clone();
        let stock_cfg = cfg.stock.clone();
        tokio::spawn(async move {
            loop {
                let checked_at = chrono::Local::now().format("%H:%M:%S").to_string();
                info!(%checked_at, "running stock check");
                let result = notifier::run_stock_check(
                    &worker_pool,
                    &source,
                    &sink,
                    &checked_at,
                    stock_cfg.sync_catalog,
                )
                .await;
                if let Err(err) = result {
                    error!(?err, "stock check failed");
                    notifier::report_failure(&sink, stock_cfg.error_chat_id, &err).await;
                }
                let wait = stock::next_check_delay(
                    chrono::Local::now().time(),
                    stock_cfg.interval_minutes,
                    stock_cfg.offset_seconds,
                );
                tokio::time::sleep(wait.max(Duration::from_secs(1))).await;
            }
        });
    }

    let ctx = Arc::new(AppContext::new(pool.clone(), cfg.telegram.admin_id));

    info!(admin_id = cfg.telegram.admin_id, "starting telegram bot");
    Dispatcher::builder(bot, telegram::schema())
        .dependencies(dptree::deps![ctx, telegram::Storage::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    pool.close().await;
    Ok(())
}
