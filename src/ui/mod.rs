//! Desktop search window for LiveFind.
//!
//! Provides the egui search window with live search, keyboard navigation,
//! file actions and folder indexing.

pub mod actions;
pub mod app;
pub mod results;

pub use app::LiveFindApp;
