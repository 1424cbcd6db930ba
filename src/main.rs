use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};

use shadow_quant::app_config;
use shadow_quant::app_config::env::{env_f64, env_is_true};
use shadow_quant::app_config::settings::get_config;
use shadow_quant::job::task_scheduler::TaskScheduler;
use shadow_quant::trading::inference::{OpenRouterProvider, SignalProvider};
use shadow_quant::trading::market::{HttpTickerSource, MarketDataSource};
use shadow_quant::trading::model::shadow_store::{MemoryShadowStore, MysqlShadowStore, ShadowStore};
use shadow_quant::trading::order::{OrderExecutor, PaperExecutor};
use shadow_quant::trading::risk::{AccountSnapshot, RiskEngine};
use shadow_quant::trading::services::notify::{EmailNotifier, LogNotifier, Notifier};
use shadow_quant::trading::shadow::{ShadowRunner, ShadowSimulator};
use shadow_quant::trading::task::{run_decision_cycle, CycleDeps};

#[derive(Parser, Debug)]
#[command(about = "LLM trading decision pipeline with a shadow paper-trading ledger")]
struct Args {
    /// 只跑一个决策周期后退出
    #[arg(long)]
    once: bool,
}

async fn run_all_instruments(
    deps: &CycleDeps,
    source: &dyn MarketDataSource,
    instruments: &[String],
    cycle: u64,
) {
    for inst_id in instruments {
        let snapshot = match source.fetch_snapshot(inst_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("fetch snapshot failed for {}: {}", inst_id, e);
                continue;
            }
        };
        // 执行协作方未接入账户查询时，用配置的纸面权益
        let account = AccountSnapshot {
            equity: env_f64("REAL_ACCOUNT_EQUITY", 1_000.0),
            open_exposure_usd: 0.0,
            trend: snapshot.trend,
        };
        if let Err(e) = run_decision_cycle(deps, snapshot, account, cycle).await {
            error!("cycle {} error for {}: {}", cycle, inst_id, e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _log_guards = app_config::log::setup_logging()?;
    let args = Args::parse();
    let cfg = get_config();

    // 配置了 DB_HOST 才连库，否则纸面模式走内存存储
    let store: Arc<dyn ShadowStore> = if env::var("DB_HOST").is_ok() {
        app_config::db::init_db().await;
        Arc::new(MysqlShadowStore)
    } else {
        warn!("DB_HOST not set, running with in-memory shadow store");
        Arc::new(MemoryShadowStore::new())
    };

    let notifier: Arc<dyn Notifier> = if env_is_true("IS_SEND_EMAIL", false) {
        Arc::new(EmailNotifier)
    } else {
        Arc::new(LogNotifier)
    };

    let provider: Arc<dyn SignalProvider> = Arc::new(OpenRouterProvider::from_config(cfg));
    let executor: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor);
    let source: Arc<dyn MarketDataSource> = Arc::new(HttpTickerSource::new());

    let shadow = ShadowRunner::new(
        ShadowSimulator::new(cfg.shadow.clone()),
        RiskEngine::new(cfg.risk.clone()),
        Arc::clone(&provider),
        store,
        Arc::clone(&notifier),
    );

    let deps = Arc::new(CycleDeps {
        risk: RiskEngine::new(cfg.risk.clone()),
        provider,
        executor,
        notifier,
        shadow: shadow.clone(),
    });

    let instruments = Arc::new(cfg.instruments.clone());
    info!(
        "starting decision loop: instruments={:?} interval={}s model={}",
        instruments, cfg.cycle_interval_seconds, cfg.analyst_model
    );

    if args.once {
        run_all_instruments(deps.as_ref(), source.as_ref(), instruments.as_slice(), 1).await;
        shadow.shutdown().await;
        return Ok(());
    }

    let cycle_counter = Arc::new(AtomicU64::new(0));
    let mut scheduler = TaskScheduler::new();
    {
        let deps = Arc::clone(&deps);
        let source = Arc::clone(&source);
        let instruments = Arc::clone(&instruments);
        let cycle_counter = Arc::clone(&cycle_counter);
        scheduler.add_periodic_task(
            "decision_cycle".to_string(),
            cfg.cycle_interval_seconds * 1000,
            move || {
                let deps = Arc::clone(&deps);
                let source = Arc::clone(&source);
                let instruments = Arc::clone(&instruments);
                let cycle = cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    run_all_instruments(deps.as_ref(), source.as_ref(), instruments.as_slice(), cycle)
                        .await;
                }
            },
        );
    }

    // 捕捉Ctrl+C信号以平滑关闭
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await;
    shadow.shutdown().await;

    Ok(())
}
