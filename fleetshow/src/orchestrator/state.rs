//! Nested-shell orchestration states.

use std::fmt;

use super::profile::ShellLevel;

/// Stage of an orchestration run on the management node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestrationState {
    /// Connected, nothing read yet.
    BasePrompt,
    /// At the node's restricted administrative CLI.
    RestrictedShell,
    /// Inside the general-purpose sub-shell; artifacts are staged here.
    SubShell,
    /// The tool is running remotely.
    Invoking,
    /// Listing and collecting result artifacts.
    HarvestingLogs,
    /// Back at the restricted shell, session closed.
    Exited,
}

impl OrchestrationState {
    /// The single state that legally follows this one.
    pub fn next(self) -> Option<OrchestrationState> {
        use OrchestrationState::*;
        match self {
            BasePrompt => Some(RestrictedShell),
            RestrictedShell => Some(SubShell),
            SubShell => Some(Invoking),
            Invoking => Some(HarvestingLogs),
            HarvestingLogs => Some(Exited),
            Exited => None,
        }
    }

    pub fn can_transition_to(self, target: OrchestrationState) -> bool {
        self.next() == Some(target)
    }

    /// Shell level whose prompt marks this state as reached.
    pub fn shell_level(self) -> Option<ShellLevel> {
        use OrchestrationState::*;
        match self {
            BasePrompt => None,
            RestrictedShell | Exited => Some(ShellLevel::Restricted),
            SubShell | Invoking | HarvestingLogs => Some(ShellLevel::SubShell),
        }
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
