use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_delivery::MemoryTransport;
use beacon_engage::ScrollSample;
use beacon_protocol::{VideoId, VideoKind};
use beacon_tracker::{TrackerConfig, VisitTracker};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "beacond")]
#[command(about = "beacon tracker demo daemon")]
struct Cli {
    /// Sessions endpoint of a running backend, e.g.
    /// `http://127.0.0.1:8788/sessions`. Without it the visit runs against
    /// an in-process store and the resulting record is printed.
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long, default_value = "/games/outbreak")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .init();

    let cli = Cli::parse();

    // Tightened windows so the scripted visit replays in a few seconds.
    let config = TrackerConfig {
        load_settle: Duration::from_millis(300),
        heartbeat_every: Duration::from_secs(2),
        ..TrackerConfig::default()
    };

    let memory = Arc::new(MemoryTransport::default());
    let builder = VisitTracker::builder().config(config);
    let tracker = match &cli.endpoint {
        Some(endpoint) => builder.endpoint(endpoint.clone()).build(),
        None => builder.transport(memory.clone()).build(),
    };

    tracker.start(&cli.path).await;
    let Some(session_id) = tracker.current_session() else {
        anyhow::bail!("session resolution failed; is the backend reachable?");
    };
    info!(session_id = %session_id, path = %cli.path, "visit started");

    tracker.mark_load_event();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Scroll down to 73% of the page over about a second.
    for step in 1..=20u32 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker
            .on_scroll(ScrollSample {
                scroll_top: f64::from(step) * 73.0,
                scroll_height: 2800.0,
                viewport_height: 800.0,
            })
            .await;
    }
    info!("scrolled to 73%");

    let trailer = VideoId::from_string("trailer-outbreak");
    tracker
        .on_video_play(&trailer, "Outbreak trailer", VideoKind::Native)
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    tracker.on_video_ended(&trailer, 42).await;
    info!(video_id = %trailer, "trailer watched");

    if tracker
        .report_booking_click("BOOK FAR CRY VR", "https://bookeo.com/farcry")
        .await
    {
        info!("booking intent recorded");
    }

    tracker.departure().await;
    tracker.shutdown();
    info!("visitor left");

    if cli.endpoint.is_none() {
        if let Some(record) = memory.record(&session_id) {
            let rendered = serde_json::to_string_pretty(&record)?;
            println!("{rendered}");
        }
    }

    Ok(())
}
