/// State management module
///
/// This module handles all application state, including:
/// - Key-value persistence backends (store.rs)
/// - The persisted list of uploaded image URLs (registry.rs)
/// - Shared data structures (data.rs)
/// - The screen's upload state machine (flow.rs)

pub mod data;
pub mod flow;
pub mod registry;
pub mod store;
