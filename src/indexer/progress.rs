//! Indexing progress shared between workers and the UI.

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// Light files are indexed first, heavy ones last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    /// Under 10 MiB
    Light,
    /// 10 MiB to 100 MiB
    Medium,
    /// 100 MiB and above
    Heavy,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 3] = [SizeCategory::Light, SizeCategory::Medium, SizeCategory::Heavy];

    pub fn from_size(bytes: u64) -> Self {
        const MIB: u64 = 1024 * 1024;
        if bytes < 10 * MIB {
            SizeCategory::Light
        } else if bytes < 100 * MIB {
            SizeCategory::Medium
        } else {
            SizeCategory::Heavy
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeCategory::Light => "light",
            SizeCategory::Medium => "medium",
            SizeCategory::Heavy => "heavy",
        })
    }
}

/// A count per size category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub light: usize,
    pub medium: usize,
    pub heavy: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: SizeCategory) -> usize {
        match category {
            SizeCategory::Light => self.light,
            SizeCategory::Medium => self.medium,
            SizeCategory::Heavy => self.heavy,
        }
    }

    pub fn increment(&mut self, category: SizeCategory) {
        match category {
            SizeCategory::Light => self.light += 1,
            SizeCategory::Medium => self.medium += 1,
            SizeCategory::Heavy => self.heavy += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.light + self.medium + self.heavy
    }
}

/// Point-in-time view of indexing progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub total_files: usize,
    pub processed_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub current_file: String,
    pub percent: f64,
    pub files_per_second: f64,
    pub estimated_remaining_secs: f64,
    pub category_progress: CategoryCounts,
    pub category_totals: CategoryCounts,
    pub elapsed_secs: f64,
}

struct State {
    total: usize,
    processed: usize,
    successful: usize,
    failed: usize,
    current_file: String,
    started: Instant,
    progress: CategoryCounts,
    totals: CategoryCounts,
    speed: f64,
    remaining_secs: f64,
}

impl State {
    fn new() -> Self {
        Self {
            total: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            current_file: String::new(),
            started: Instant::now(),
            progress: CategoryCounts::default(),
            totals: CategoryCounts::default(),
            speed: 0.0,
            remaining_secs: 0.0,
        }
    }
}

/// Thread-safe progress counter.
pub struct ProgressTracker {
    state: Mutex<State>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = State::new();
        }
    }

    pub fn set_total(&self, total: usize, breakdown: CategoryCounts) {
        if let Ok(mut state) = self.state.lock() {
            state.total = total;
            state.totals = breakdown;
        }
    }

    /// Record one processed file and refresh speed and remaining time.
    pub fn update(&self, current_file: &str, category: SizeCategory, success: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if success {
            state.successful += 1;
        } else {
            state.failed += 1;
        }
        state.processed += 1;
        if !current_file.is_empty() {
            state.current_file = current_file.to_string();
        }
        state.progress.increment(category);

        let elapsed = state.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            state.speed = state.processed as f64 / elapsed;
            if state.speed > 0.0 {
                let remaining = state.total.saturating_sub(state.processed);
                state.remaining_secs = remaining as f64 / state.speed;
            }
        }
    }

    pub fn snapshot(&self) -> ProgressInfo {
        let Ok(state) = self.state.lock() else {
            return ProgressInfo::default();
        };

        let percent = if state.total > 0 {
            state.processed as f64 / state.total as f64 * 100.0
        } else {
            0.0
        };

        ProgressInfo {
            total_files: state.total,
            processed_files: state.processed,
            successful_files: state.successful,
            failed_files: state.failed,
            current_file: state.current_file.clone(),
            percent,
            files_per_second: state.speed,
            estimated_remaining_secs: state.remaining_secs,
            category_progress: state.progress,
            category_totals: state.totals,
            elapsed_secs: state.started.elapsed().as_secs_f64(),
        }
    }
}
