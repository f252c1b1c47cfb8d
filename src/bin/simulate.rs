use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Duration, Local, NaiveDateTime};
use clap::Parser;
use ghost_squad::accounts::ensure_player;
use ghost_squad::constants::CONTAINMENT_UNIT_MARKER;
use ghost_squad::rankings::{build_board, render_lines};
use ghost_squad::rng::Rng;
use ghost_squad::session::{
    CaptureDriver, CaptureResolution, DriverEvent, HuntSession, ScanOutcome,
};
use ghost_squad::store::{DocumentStore, MemoryStore};
use ghost_squad::types::AuthUser;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_LOCATION: &str = "Praça da Sé";
const DEMO_EVENT_ID: &str = "demo-halloween";

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays a scripted hunt against an in-memory store")]
struct Cli {
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long, default_value_t = 7)]
    captures: u32,
    #[arg(long, default_value = DEMO_LOCATION)]
    location: String,
    #[arg(long, default_value = "Egon")]
    player: String,
    /// Persist the store to this file instead of keeping it in memory.
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    /// Hold each capture on the real capture timers instead of a virtual clock.
    #[arg(long)]
    realtime: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
struct HuntSummary {
    seed: u32,
    location: String,
    captures: u32,
    deposits: u32,
    #[serde(rename = "depositedGhosts")]
    deposited_ghosts: usize,
    points: u64,
    #[serde(rename = "ecto1Unlocked")]
    ecto1_unlocked: bool,
    #[serde(rename = "virtualDurationMs")]
    virtual_duration_ms: u64,
    notices: Vec<String>,
    leaderboard: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = match &cli.data {
        Some(path) => MemoryStore::with_file(path.clone()),
        None => MemoryStore::new(),
    };
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let now = Local::now().naive_local();
    seed_demo_content(store.as_ref(), now).await?;

    let seed = cli.seed.unwrap_or_else(rand::random::<u32>);
    let summary = run_hunt(&cli, store, seed, now).await?;

    for line in &summary.leaderboard {
        println!("{line}");
    }
    println!("{}", serde_json::to_string(&summary)?);

    if let Some(path) = cli.summary_out.as_ref() {
        write_summary(path, &summary)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}

/// Demo content lives under fixed keys, so reseeding a persisted store
/// refreshes it in place.
async fn seed_demo_content(store: &dyn DocumentStore, now: NaiveDateTime) -> anyhow::Result<()> {
    store
        .set(
            &format!("locations/{DEMO_LOCATION}"),
            json!({
                "name": DEMO_LOCATION,
                "lat": -23.5505,
                "lon": -46.6333,
                "huntingRadius": 15,
                "active": true
            }),
        )
        .await?;

    let start = now - Duration::hours(1);
    let end = now + Duration::hours(2);
    store
        .set(
            &format!("events/{DEMO_EVENT_ID}"),
            json!({
                "id": DEMO_EVENT_ID,
                "name": "Noite das Bruxas",
                "startDate": start.format("%Y-%m-%d").to_string(),
                "startTime": start.format("%H:%M").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
                "endTime": end.format("%H:%M").to_string()
            }),
        )
        .await?;

    let ghosts = [
        ("demo-geleia", json!({ "name": "Geleia", "type": "fraco", "status": "ativo",
            "points": 10, "behavior": "orbit", "modelUrl": "models/geleia.glb" })),
        ("demo-bibliotecaria", json!({ "name": "Bibliotecária", "type": "medio",
            "status": "ativo", "points": 25, "behavior": "stationary",
            "modelUrl": "models/bibliotecaria.glb" })),
        ("demo-marshmallow", json!({ "name": "Marshmallow", "type": "forte",
            "status": "ativo", "points": 50, "scale": 2.5,
            "modelUrl": "models/marshmallow.glb", "eventId": DEMO_EVENT_ID })),
        ("demo-zuul", json!({ "name": "Zuul", "type": "forte", "status": "inativo",
            "points": 100, "modelUrl": "models/zuul.glb" })),
    ];
    for (id, mut ghost) in ghosts {
        ghost["id"] = json!(id);
        store.set(&format!("ghosts/{id}"), ghost).await?;
    }
    Ok(())
}

/// Walks to each spawn, holds the beam for the full duration (virtual clock
/// or the real capture timers) and deposits whenever the inventory fills up.
async fn run_hunt(
    cli: &Cli,
    store: Arc<dyn DocumentStore>,
    seed: u32,
    now: NaiveDateTime,
) -> anyhow::Result<HuntSummary> {
    let user = AuthUser {
        uid: format!("sim-{seed}"),
        display_name: Some(cli.player.clone()),
        email: None,
        is_anonymous: false,
    };
    let stats = ensure_player(store.as_ref(), &user).await?;
    let mut driver = CaptureDriver::new(HuntSession::new(
        store.clone(),
        &user.uid,
        &stats.display_name,
        Rng::new(seed),
    ));
    let session = driver.session_mut();
    session.restore(stats);
    if !session.select_location(&cli.location).await {
        bail!("unknown hunting location: {}", cli.location);
    }

    let mut summary = HuntSummary {
        seed,
        location: cli.location.clone(),
        ..HuntSummary::default()
    };
    summary
        .notices
        .extend(session.init_game(now).await.iter().map(ToString::to_string));
    if !session.is_initialized() {
        bail!("no active ghosts to hunt");
    }

    let mut clock_ms = 0u64;
    while summary.captures < cli.captures {
        if driver.session().state().is_inventory_full() {
            deposit(driver.session_mut(), &mut summary).await;
        }
        let session = driver.session_mut();
        let Some(ghost) = session.state().current_ghost().cloned() else {
            warn!("no ghost spawned, stopping");
            break;
        };

        session.on_gps_update(ghost.lat, ghost.lon);
        if session.on_ar_hit(true).is_none() {
            warn!(ghost = %ghost.name, "ghost could not be placed");
            break;
        }
        let resolution = if cli.realtime {
            hold_on_timers(&mut driver).await
        } else {
            hold_on_clock(driver.session_mut(), &mut clock_ms, ghost.capture_duration_ms).await
        };
        let Some(resolution) = resolution else {
            warn!(ghost = %ghost.name, "capture refused");
            break;
        };
        summary
            .notices
            .extend(resolution.notices.iter().map(ToString::to_string));
        summary.captures += 1;
    }

    let mut session = driver.into_session();
    if !session.state().inventory().is_empty() {
        deposit(&mut session, &mut summary).await;
    }

    let stats = session.state().user_stats();
    summary.points = stats.points;
    summary.ecto1_unlocked = stats.ecto1_unlocked;
    summary.virtual_duration_ms = clock_ms;

    let board = build_board(store.as_ref(), None).await?;
    summary.leaderboard = render_lines(&board.entries, Some(session.uid()));
    Ok(summary)
}

async fn hold_on_clock(
    session: &mut HuntSession,
    clock_ms: &mut u64,
    duration_ms: u64,
) -> Option<CaptureResolution> {
    if session.start_capture(*clock_ms).is_empty() {
        return None;
    }
    *clock_ms += duration_ms;
    Some(session.finish_capture(*clock_ms).await)
}

async fn hold_on_timers(driver: &mut CaptureDriver) -> Option<CaptureResolution> {
    if driver.start_capture().is_empty() {
        return None;
    }
    while let Some(event) = driver.next_event().await {
        match event {
            DriverEvent::Progress(progress) => debug!(progress, "capturing"),
            DriverEvent::Resolved(resolution) => return Some(resolution),
        }
    }
    None
}

async fn deposit(session: &mut HuntSession, summary: &mut HuntSummary) {
    let outcome = session.on_scan(CONTAINMENT_UNIT_MARKER).await;
    if let ScanOutcome::Deposited { count, .. } = &outcome {
        summary.deposits += 1;
        summary.deposited_ghosts += count;
    }
    summary.notices.push(outcome.notice().to_string());
}

fn write_summary(path: &Path, summary: &HuntSummary) -> anyhow::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)?;
    Ok(())
}
