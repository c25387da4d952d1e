//! Shared crate-wide constants.

use std::time::Duration;

/// Id of the base-layer view every main window is created with.
pub const PRIMARY_VIEW_ID: &str = "main-view";

/// Height of the launcher header strip (search bar) in logical pixels.
pub const HEADER_HEIGHT: u32 = 50;

/// Padding between the window edge and overlay content.
pub const APP_PADDING: u32 = 8;

/// Extra padding of the translucent backdrop drawn behind overlay views.
pub const OVERLAY_BACKGROUND_PADDING: u32 = 8;

/// Height of the synthetic control bar in a detached window.
pub const CONTROL_BAR_HEIGHT: u32 = 32;

/// How far past the leftmost display edge a parked window is moved.
///
/// Parking keeps the surface compositing (no suspend) while making it
/// unreachable to the user.
pub const PARK_OFFSET: i32 = 8000;

/// Origin a hidden view is moved to inside its window.
pub const HIDDEN_VIEW_ORIGIN: i32 = -10_000;

pub const URL_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
pub const FILE_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Message channel the control bar listens on for its initial state.
pub const CONTROL_BAR_INIT_CHANNEL: &str = "detached-window:init";

/// Prefix for control-bar view ids; the detached window id follows.
pub const CONTROL_BAR_ID_PREFIX: &str = "detached-chrome";

/// Title used when neither a descriptor nor a category label is available.
pub const FALLBACK_DETACHED_TITLE: &str = "Detached Window";

/// Capacity of the push-event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
