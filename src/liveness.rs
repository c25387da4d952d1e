//! Revalidation of handles captured before a suspension point.
//!
//! Build a [`Checkpoint`] from the windows and views an operation depends
//! on, then call [`Checkpoint::revalidate`] after every `.await`.

use crate::backend::WindowId;
use crate::error::{Result, WmError};
use crate::view::{ViewId, ViewRegistry, ViewTicket};
use crate::window::WindowController;

#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    windows: Vec<WindowId>,
    views: Vec<(ViewId, ViewTicket)>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, id: WindowId) -> Self {
        self.windows.push(id);
        self
    }

    pub fn view(mut self, id: ViewId, ticket: ViewTicket) -> Self {
        self.views.push((id, ticket));
        self
    }

    /// Anything that vanished since the checkpoint was built is reported as
    /// `InvalidReference`, never `NotFound`.
    pub fn revalidate(&self, windows: &WindowController, views: &ViewRegistry) -> Result<()> {
        for id in &self.windows {
            windows.ensure_alive(*id).map_err(stale)?;
        }
        for (id, ticket) in &self.views {
            views.check_ticket(id, *ticket).map_err(stale)?;
        }
        Ok(())
    }
}

fn stale(err: WmError) -> WmError {
    match err {
        WmError::NotFound(subject) => WmError::InvalidReference(subject),
        other => other,
    }
}
