//! Main search window.
//!
//! Implements eframe::App with search-as-you-type against the engine, a
//! folder indexing panel and a statistics side panel.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use eframe::egui;

use crate::config::AppConfig;
use crate::engine::{EngineStatistics, SearchEngine};
use crate::indexer::{IndexReport, ProgressTracker, SizeCategory};
use crate::search::SearchHit;
use crate::ui::actions;
use crate::ui::results::{format_eta, format_size, ResultsView, RowAction};
use crate::Result;

/// Debounce duration for live search.
const SEARCH_DEBOUNCE_MS: u64 = 150;

/// How often the statistics panel refreshes.
const STATS_REFRESH: Duration = Duration::from_secs(5);

/// Selector values offered by the file type filter.
const FILE_TYPES: &[&str] = &[
    "all", "txt", "pdf", "docx", "doc", "xlsx", "xls", "pptx", "ppt", "tif", "zip",
];

struct SearchResponse {
    results: Vec<SearchHit>,
    elapsed: Duration,
}

pub struct LiveFindApp {
    engine: Arc<SearchEngine>,
    config: AppConfig,
    /// Current search query text.
    query: String,
    file_type: String,
    results: Vec<SearchHit>,
    selected_index: usize,
    /// Keyboard moved the selection this frame
    scroll_to_selected: bool,
    search_pending: bool,
    last_query_change: Option<Instant>,
    pending_results: Option<Receiver<SearchResponse>>,
    status: String,
    folder: String,
    progress: Arc<ProgressTracker>,
    indexing: Option<JoinHandle<Result<IndexReport>>>,
    stats: Option<EngineStatistics>,
    pending_stats: Option<Receiver<EngineStatistics>>,
    last_stats_refresh: Option<Instant>,
    first_frame: bool,
}

impl LiveFindApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, engine: Arc<SearchEngine>, config: AppConfig) -> Self {
        let folder = config
            .last_folder
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            engine,
            config,
            query: String::new(),
            file_type: "all".to_string(),
            results: Vec::new(),
            selected_index: 0,
            scroll_to_selected: false,
            search_pending: false,
            last_query_change: None,
            pending_results: None,
            status: "Ready".to_string(),
            folder,
            progress: Arc::new(ProgressTracker::new()),
            indexing: None,
            stats: None,
            pending_stats: None,
            last_stats_refresh: None,
            first_frame: true,
        }
    }

    /// Trigger a search with debouncing.
    fn trigger_search(&mut self) {
        self.search_pending = true;
        self.last_query_change = Some(Instant::now());
    }

    fn execute_search(&mut self, ctx: &egui::Context) {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            self.results.clear();
            self.pending_results = None;
            self.status = "Ready".to_string();
            return;
        }

        self.status = "Searching...".to_string();

        let (tx, rx) = mpsc::channel();
        self.pending_results = Some(rx);

        let engine = Arc::clone(&self.engine);
        let file_type = self.file_type.clone();
        let max_results = self.config.max_results;
        let ctx = ctx.clone();

        std::thread::spawn(move || {
            let start = Instant::now();
            let results = engine.unified_search(&query, max_results, &file_type);
            let _ = tx.send(SearchResponse {
                results,
                elapsed: start.elapsed(),
            });
            ctx.request_repaint();
        });
    }

    /// Check for and process pending search results.
    fn check_pending_results(&mut self) {
        let Some(rx) = &self.pending_results else {
            return;
        };
        if let Ok(response) = rx.try_recv() {
            self.status = format!(
                "{} results in {:.1}ms",
                response.results.len(),
                response.elapsed.as_secs_f64() * 1000.0
            );
            self.results = response.results;
            self.selected_index = 0;
            self.pending_results = None;
        }
    }

    fn selected_path(&self) -> Option<PathBuf> {
        self.results
            .get(self.selected_index)
            .map(|hit| PathBuf::from(&hit.file_path))
    }

    fn open_selected(&mut self) {
        if let Some(path) = self.selected_path() {
            if let Err(e) = actions::open_file(&path) {
                tracing::error!("Failed to open file: {}", e);
                self.status = format!("Failed to open: {}", e);
            }
        }
    }

    /// Handle keyboard navigation.
    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let (down, up, enter, copy, reveal) = ctx.input(|i| {
            let shortcut = i.modifiers.ctrl && i.modifiers.shift;
            (
                i.key_pressed(egui::Key::ArrowDown),
                i.key_pressed(egui::Key::ArrowUp),
                i.key_pressed(egui::Key::Enter),
                shortcut && i.key_pressed(egui::Key::C),
                shortcut && i.key_pressed(egui::Key::E),
            )
        });

        if down && !self.results.is_empty() {
            self.selected_index = (self.selected_index + 1).min(self.results.len() - 1);
            self.scroll_to_selected = true;
        }
        if up {
            self.selected_index = self.selected_index.saturating_sub(1);
            self.scroll_to_selected = true;
        }
        if enter {
            self.open_selected();
        }

        if copy {
            if let Some(path) = self.selected_path() {
                self.status = match actions::copy_to_clipboard(&path) {
                    Ok(()) => "Path copied to clipboard".to_string(),
                    Err(e) => {
                        tracing::error!("Failed to copy path: {}", e);
                        format!("Failed to copy: {}", e)
                    }
                };
            }
        }

        if reveal {
            if let Some(path) = self.selected_path() {
                if let Err(e) = actions::reveal_in_explorer(&path) {
                    tracing::error!("Failed to reveal file: {}", e);
                    self.status = format!("Failed to reveal: {}", e);
                }
            }
        }
    }

    fn start_indexing(&mut self) {
        let folder = PathBuf::from(self.folder.trim());
        if !folder.is_dir() {
            self.status = format!("Not a folder: {}", folder.display());
            return;
        }
        if self.indexing.is_some() {
            return;
        }

        self.config.last_folder = Some(folder.clone());
        if let Err(e) = self.config.save() {
            tracing::warn!("Failed to remember folder: {}", e);
        }

        let engine = Arc::clone(&self.engine);
        let progress = Arc::clone(&self.progress);
        self.status = format!("Indexing {}", folder.display());
        self.indexing = Some(std::thread::spawn(move || {
            engine.index_directory(&folder, &progress)
        }));
    }

    fn check_indexing(&mut self) {
        if !self.indexing.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.indexing.take() else {
            return;
        };

        self.status = match handle.join() {
            Ok(Ok(report)) => format!(
                "Indexed {}/{} files in {:.1}s{}",
                report.success_count,
                report.total_files,
                report.elapsed_secs,
                if report.cancelled { " (cancelled)" } else { "" }
            ),
            Ok(Err(e)) => format!("Indexing failed: {}", e),
            Err(_) => "Indexing thread panicked".to_string(),
        };
        self.last_stats_refresh = None;
        if !self.query.trim().is_empty() {
            self.trigger_search();
        }
    }

    fn refresh_stats(&mut self, ctx: &egui::Context) {
        if let Some(rx) = &self.pending_stats {
            if let Ok(stats) = rx.try_recv() {
                self.stats = Some(stats);
                self.pending_stats = None;
            }
            return;
        }

        if self.last_stats_refresh.is_some_and(|t| t.elapsed() < STATS_REFRESH) {
            return;
        }
        self.last_stats_refresh = Some(Instant::now());

        let (tx, rx) = mpsc::channel();
        self.pending_stats = Some(rx);
        let engine = Arc::clone(&self.engine);
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(engine.statistics());
            ctx.request_repaint();
        });
    }

    fn clear_cache(&mut self) {
        self.status = match self.engine.clear_cache() {
            Ok(()) => "Cache cleared".to_string(),
            Err(e) => format!("Failed to clear cache: {}", e),
        };
        self.last_stats_refresh = None;
    }

    fn indexing_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Folder:");
            ui.add(
                egui::TextEdit::singleline(&mut self.folder)
                    .desired_width(ui.available_width() - 140.0)
                    .hint_text("Folder to index"),
            );
            let running = self.indexing.is_some();
            if ui.add_enabled(!running, egui::Button::new("Index")).clicked() {
                self.start_indexing();
            }
            if ui.add_enabled(running, egui::Button::new("Cancel")).clicked() {
                self.engine.cancel_indexing();
            }
        });

        if self.indexing.is_some() {
            let info = self.progress.snapshot();
            ui.add(
                egui::ProgressBar::new((info.percent / 100.0) as f32)
                    .show_percentage()
                    .text(format!(
                        "{}/{} files, {:.1}/s, {} left",
                        info.processed_files,
                        info.total_files,
                        info.files_per_second,
                        format_eta(info.estimated_remaining_secs)
                    )),
            );
            ui.horizontal(|ui| {
                for category in SizeCategory::ALL {
                    ui.weak(format!(
                        "{}: {}/{}",
                        category,
                        info.category_progress.get(category),
                        info.category_totals.get(category)
                    ));
                }
            });
            if !info.current_file.is_empty() {
                ui.weak(file_label(&info.current_file));
            }
        }
    }

    fn stats_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Statistics");
        ui.separator();

        match &self.stats {
            Some(stats) => {
                let c = &stats.counters;
                egui::Grid::new("stats_grid").num_columns(2).show(ui, |ui| {
                    let mut line = |label: &str, value: String| {
                        ui.label(label);
                        ui.monospace(value);
                        ui.end_row();
                    };
                    line("Indexed files", stats.store.total_files.to_string());
                    line("Shards", format!("{}/{}", stats.store.valid_shards, stats.store.shard_count));
                    line("Storage", format_size(stats.store.storage_bytes));
                    line("Immediate", stats.cache.immediate_entries.to_string());
                    line("Hot", stats.cache.hot_entries.to_string());
                    line("Pending jobs", stats.pending_jobs.to_string());
                    line("Searches", c.search_count.to_string());
                    line("Avg time", format!("{:.1}ms", c.avg_search_secs * 1000.0));
                    line("Errors", c.error_count.to_string());
                });

                if !stats.store.type_distribution.is_empty() {
                    ui.separator();
                    for (file_type, count) in &stats.store.type_distribution {
                        ui.weak(format!("{} {}", file_type, count));
                    }
                }
            }
            None => {
                ui.spinner();
            }
        }

        ui.separator();
        if ui.button("Clear cache").clicked() {
            self.clear_cache();
        }
    }
}

fn file_label(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

impl eframe::App for LiveFindApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_pending_results();
        self.check_indexing();
        self.refresh_stats(ctx);
        self.scroll_to_selected = false;
        self.handle_keyboard(ctx);

        if self.search_pending {
            if let Some(last_change) = self.last_query_change {
                if last_change.elapsed() >= Duration::from_millis(SEARCH_DEBOUNCE_MS) {
                    self.search_pending = false;
                    self.execute_search(ctx);
                } else {
                    ctx.request_repaint_after(Duration::from_millis(10));
                }
            }
        }

        if self.indexing.is_some() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        egui::TopBottomPanel::top("search_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.label("Search:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.query)
                        .desired_width(ui.available_width() - 110.0)
                        .hint_text("Type to search document contents..."),
                );

                if self.first_frame {
                    response.request_focus();
                    self.first_frame = false;
                }
                if response.changed() {
                    self.trigger_search();
                }

                let before = self.file_type.clone();
                egui::ComboBox::from_id_salt("file_type")
                    .selected_text(&self.file_type)
                    .width(80.0)
                    .show_ui(ui, |ui| {
                        for ty in FILE_TYPES {
                            ui.selectable_value(&mut self.file_type, ty.to_string(), *ty);
                        }
                    });
                if self.file_type != before {
                    self.trigger_search();
                }
            });
            ui.add_space(2.0);
            self.indexing_panel(ui);
            ui.add_space(4.0);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak("Enter:open  Ctrl+Shift+E:reveal  Ctrl+Shift+C:copy");
                });
            });
        });

        egui::SidePanel::right("stats_panel")
            .default_width(220.0)
            .show(ctx, |ui| self.stats_panel(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            let action = ResultsView::show(ui, &self.results, self.selected_index, self.scroll_to_selected);
            match action {
                Some(RowAction::Select(index)) => self.selected_index = index,
                Some(RowAction::Open(index)) => {
                    self.selected_index = index;
                    self.open_selected();
                }
                None => {}
            }
        });
    }
}
