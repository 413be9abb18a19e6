//! Search results table.
//!
//! Rows are virtualised by `egui_extras::TableBuilder`, so large result
//! sets only lay out the visible rows.

use std::path::Path;

use eframe::egui::{self, Sense};
use egui_extras::{Column, TableBuilder};

use crate::search::SearchHit;

const ROW_HEIGHT: f32 = 22.0;

/// What the user did with a row this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Select(usize),
    Open(usize),
}

pub struct ResultsView;

impl ResultsView {
    /// Display the results table with name, folder, layer and size.
    pub fn show(
        ui: &mut egui::Ui,
        results: &[SearchHit],
        selected: usize,
        scroll_to_selected: bool,
    ) -> Option<RowAction> {
        if results.is_empty() {
            ui.centered_and_justified(|ui| {
                ui.label("No results. Start typing to search.");
            });
            return None;
        }

        let mut action = None;

        let mut table = TableBuilder::new(ui)
            .striped(true)
            .sense(Sense::click())
            .column(Column::initial(220.0).at_least(120.0).clip(true))
            .column(Column::remainder().at_least(160.0).clip(true))
            .column(Column::initial(110.0))
            .column(Column::initial(80.0));
        if scroll_to_selected {
            table = table.scroll_to_row(selected, None);
        }

        table
            .header(ROW_HEIGHT, |mut header| {
                header.col(|ui| {
                    ui.strong("Name");
                });
                header.col(|ui| {
                    ui.strong("Folder");
                });
                header.col(|ui| {
                    ui.strong("Layer");
                });
                header.col(|ui| {
                    ui.strong("Size");
                });
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, results.len(), |mut row| {
                    let i = row.index();
                    let hit = &results[i];
                    row.set_selected(i == selected);

                    row.col(|ui| {
                        ui.label(&hit.file_name);
                    });
                    row.col(|ui| {
                        ui.weak(folder_of(&hit.file_path));
                    });
                    row.col(|ui| {
                        ui.weak(hit.layer.to_string());
                    });
                    row.col(|ui| {
                        ui.weak(format_size(hit.size));
                    });

                    let response = row.response();
                    if response.double_clicked() {
                        action = Some(RowAction::Open(i));
                    } else if response.clicked() {
                        action = Some(RowAction::Select(i));
                    }
                    response.on_hover_text(&hit.preview);
                });
            });

        action
    }
}

/// Parent directory of a path, as displayed in the Folder column.
pub fn folder_of(file_path: &str) -> String {
    Path::new(file_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Format file size in human-readable format.
///
/// Examples: "1.2 MB", "340 KB", "4.5 GB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a duration in seconds as `1h 02m`, `3m 05s` or `12s`.
pub fn format_eta(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "---".to_string();
    }
    let secs = secs.round() as u64;
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {:02}s", m, s),
        (h, m, _) => format!("{}h {:02}m", h, m),
    }
}
