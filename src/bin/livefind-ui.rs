//! LiveFind desktop search window.
//!
//! Opens the engine on the default data directory (or `LIVEFIND_DATA_DIR`)
//! and shows the egui search window. Caches are saved when the window
//! closes.

use std::sync::Arc;

use eframe::egui;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livefind::config::{default_data_dir, LOG_FILE};
use livefind::ui::LiveFindApp;
use livefind::{AppConfig, SearchEngine};

fn main() -> eframe::Result<()> {
    let config = AppConfig::load_or_default(&default_data_dir());
    let log_dir = config.layout().logs_dir();

    let file_layer = std::fs::create_dir_all(&log_dir).ok().map(|()| {
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE));
        (
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
            guard,
        )
    });
    let (file_layer, _guard) = match file_layer {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("livefind={},livefind_ui={}", config.log_level, config.log_level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!("LiveFind UI starting");

    let engine = match SearchEngine::open(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Failed to open search engine: {}", e);
            eprintln!("Failed to open search engine: {}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 640.0])
            .with_min_inner_size([640.0, 360.0]),
        ..Default::default()
    };

    let app_engine = Arc::clone(&engine);
    let result = eframe::run_native(
        "LiveFind",
        options,
        Box::new(move |cc| Ok(Box::new(LiveFindApp::new(cc, app_engine, config)))),
    );

    if let Err(e) = engine.shutdown() {
        error!("Shutdown failed: {}", e);
    }
    info!("LiveFind UI stopped");

    result
}
