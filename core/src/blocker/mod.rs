//! Input blocking: the scoped resource a task uses to make part of the
//! foreground surface non-interactive while it runs.

mod input;
mod surface;

pub use input::{BlockerPhase, InputBlocker};
pub use surface::{ForegroundSurface, HeadlessSurface};

use serde::{Deserialize, Serialize};

/// How much of the foreground surface is disabled while a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingScope {
    #[default]
    None,
    Action,
    Component,
    Window,
    Application,
}

impl BlockingScope {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockingScope::None => "none",
            BlockingScope::Action => "action",
            BlockingScope::Component => "component",
            BlockingScope::Window => "window",
            BlockingScope::Application => "application",
        }
    }
}

impl std::fmt::Display for BlockingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BlockingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BlockingScope::None),
            "action" => Ok(BlockingScope::Action),
            "component" => Ok(BlockingScope::Component),
            "window" => Ok(BlockingScope::Window),
            "application" | "app" => Ok(BlockingScope::Application),
            other => Err(format!("unknown blocking scope: {other}")),
        }
    }
}
