//! Supervisory system state and its transition rules
//!
//! ```text
//!            ┌──────────► NORMAL ◄──────┐
//! INIT ──► RUNNING                      │ (external input)
//!   │        └──────────► DEGRADED ◄────┘
//!   │           │            │
//!   └───────────┴─────┬──────┘
//!                     ▼
//!                   ERROR   (terminal for this process)
//! ```
//!
//! The state value itself lives in a single cell owned by the supervisor;
//! this module only knows which moves are legal.

use crate::errors::TransitionError;

/// Process-wide operating state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SystemState {
    /// One-time setup is in progress
    Init = 0,
    /// Workers are running; reporting mode not chosen yet
    Running = 1,
    /// Steady operation, point estimates are trusted
    Normal = 2,
    /// Steady operation, point estimates widened into bands
    Degraded = 3,
    /// Fault; producers are stopped and nothing leaves this state
    Error = 4,
}

impl SystemState {
    /// All states in declaration order
    pub const ALL: [SystemState; 5] = [
        SystemState::Init,
        SystemState::Running,
        SystemState::Normal,
        SystemState::Degraded,
        SystemState::Error,
    ];

    /// Human readable name, used in log lines
    pub const fn name(&self) -> &'static str {
        match self {
            SystemState::Init => "INIT",
            SystemState::Running => "RUNNING",
            SystemState::Normal => "NORMAL",
            SystemState::Degraded => "DEGRADED",
            SystemState::Error => "ERROR",
        }
    }

    /// Operating states in which the monitor reports readings
    pub const fn is_reporting(&self) -> bool {
        matches!(self, SystemState::Normal | SystemState::Degraded)
    }

    /// Whether the supervisor may move from `self` to `next`
    pub const fn can_transition_to(&self, next: SystemState) -> bool {
        use SystemState::*;
        match (*self, next) {
            (Init, Running) => true,
            (Running, Normal) | (Running, Degraded) => true,
            (Normal, Degraded) | (Degraded, Normal) => true,
            (Error, _) => false,
            (_, Error) => true,
            _ => false,
        }
    }

    /// Checked transition
    pub fn transition(self, next: SystemState) -> Result<SystemState, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        SystemState::Init
    }
}

impl core::fmt::Display for SystemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
