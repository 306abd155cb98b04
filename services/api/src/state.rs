//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the controller and
//! the configuration it was built from.

use crate::config::Config;
use atc_core::AtcController;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AtcController>,
    pub config: Arc<Config>,
}
