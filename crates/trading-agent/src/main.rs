use std::collections::HashMap;

use agent_core::{AutonomyMode, PriceMap, RandomSource, SeededRandom, UserState};
use analytics::{leaderboard_rows, Viewer, Window};
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use trading_agent::{
    agents_table, AgentMetrics, EngineConfig, SessionRegistry, SessionState, SessionStore,
    StateManager,
};

/// Quotes used when no PRICE_FILE is configured.
fn demo_prices() -> PriceMap {
    HashMap::from([
        ("bitcoin".to_string(), dec!(64250)),
        ("ethereum".to_string(), dec!(3120.5)),
        ("solana".to_string(), dec!(148.2)),
        ("matic-network".to_string(), dec!(0.72)),
    ])
}

fn load_prices(config: &EngineConfig) -> Result<PriceMap> {
    let Some(path) = &config.price_file else {
        return Ok(demo_prices());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read price file {path}"))?;
    let prices: HashMap<String, Decimal> = serde_json::from_str(&raw)
        .with_context(|| format!("price file {path} must be a JSON object of asset -> price"))?;
    Ok(prices)
}

/// Three agents in one cohort with different requested autonomy levels.
fn seed_user(config: &EngineConfig) -> UserState {
    let now = Utc::now();
    let mut user = UserState::new(now, config.starting_cash_usdc);
    user.create_agent("Momentum", "", now, config.starting_cash_usdc);
    user.create_agent("Scout", "", now, config.starting_cash_usdc);

    let modes = [AutonomyMode::AutoPlus, AutonomyMode::Auto, AutonomyMode::Assist];
    for (agent, mode) in user.agents.iter_mut().zip(modes) {
        agent.mode = mode;
        agent.safety.max_daily_loss_usdc = config.default_max_daily_loss_usdc;
        agent.safety.max_drawdown_pct = config.default_max_drawdown_pct;
        agent.safety.peak_value = Some(config.starting_cash_usdc);
    }
    user
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting agent autonomy engine");

    // 2. Load configuration
    let config = EngineConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  User: {}", config.user_id);
    tracing::info!("  Watchlist: {}", config.watchlist.join(", "));
    tracing::info!("  Starting cash: ${}", config.starting_cash_usdc);
    tracing::info!(
        "  Safety defaults: max daily loss ${}, max drawdown {:.1}%",
        config.default_max_daily_loss_usdc,
        config.default_max_drawdown_pct
    );
    tracing::info!("  Cycles per agent: {}", config.cycles);
    tracing::info!("  Safety check each cycle: {}", config.safety_check_each_cycle);

    // 3. Storage
    let store = StateManager::connect(&config.database_url).await?;
    store.init_tables().await?;

    let state = match store.load_session(&config.user_id, Utc::now()).await? {
        Some(state) => state,
        None => {
            tracing::info!("No stored session for {}, seeding demo agents", config.user_id);
            SessionState::new(seed_user(&config))
        }
    };

    // 4. Inputs
    let prices = load_prices(&config)?;
    tracing::info!("Loaded {} price quotes", prices.len());
    let mut rng: Box<dyn RandomSource + Send> = match config.rng_seed {
        Some(seed) => Box::new(SeededRandom::from_seed(seed)),
        None => Box::new(SeededRandom::from_entropy()),
    };

    let registry = SessionRegistry::new();
    let session = registry.get_or_insert_with(&config.user_id, || state);

    // 5. Run cycles
    let agent_ids: Vec<String> = session
        .with_state(|s| s.user.agents.iter().map(|a| a.id.clone()).collect())
        .await;
    for cycle in 1..=config.cycles {
        for agent_id in &agent_ids {
            let reason = format!("demo cycle {cycle}");
            let report = session
                .run_cycle(agent_id, &reason, &prices, rng.as_mut(), &config, Utc::now())
                .await?;
            tracing::info!(
                "Cycle {} for {}: {:?} ({})",
                cycle,
                agent_id,
                report.decision.status,
                report.decision.reason
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    // 6. Summaries
    let now = Utc::now();
    let snapshot = session.snapshot().await;
    for agent_id in &agent_ids {
        AgentMetrics::compute(&snapshot.user, agent_id, &prices, now)?.log_metrics(agent_id);
    }
    let table = agents_table(&snapshot.user, &prices, now)?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    let board = leaderboard_rows(
        &snapshot.user.agents,
        &prices,
        Window::Weekly,
        Viewer::Admin,
        now.date_naive(),
    );
    println!("{}", serde_json::to_string_pretty(&board)?);

    // 7. Persist
    store.save_session(&config.user_id, &snapshot).await?;
    tracing::info!("Done");
    Ok(())
}
