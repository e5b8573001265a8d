//! Widget handles and their state machine

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::widget::{InitPhase, Widget};

/// Lifecycle state of one discovered widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetState {
    Discovered,
    Initializing,
    Ready,
    /// Initialization failed; laid out like `Ready` but inert
    Failed,
    Disposed,
}

impl WidgetState {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: WidgetState) -> bool {
        use WidgetState::*;
        let allowed = matches!(
            (self, next),
            (Discovered, Initializing) | (Initializing, Ready) | (Initializing, Failed)
        ) || (next == Disposed && *self != Disposed);
        debug!(from = ?self, to = ?next, allowed, "WidgetState::can_transition_to: called");
        allowed
    }

    /// Shown in the panel
    pub fn is_laid_out(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for WidgetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// The manager's record of one constructed widget
#[derive(Clone)]
pub struct WidgetHandle {
    /// Position in discovery order
    pub id: usize,
    pub name: String,
    pub rank: u32,
    pub phase: InitPhase,
    pub state: WidgetState,
    pub last_error: Option<String>,
    pub widget: Arc<dyn Widget>,
}

impl WidgetHandle {
    pub fn new(id: usize, rank: u32, widget: Arc<dyn Widget>) -> Self {
        Self {
            id,
            name: widget.name().to_string(),
            rank,
            phase: widget.phase(),
            state: WidgetState::Discovered,
            last_error: None,
            widget,
        }
    }
}

impl std::fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}
