use std::str::FromStr;
use std::sync::Arc;

use deskjob_core::render::LifecycleRenderer;

use crate::renderers::{JsonlRendererPlugin, ProgressRendererPlugin, TextRendererPlugin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    #[default]
    Text,
    Jsonl,
    Progress,
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "jsonl" => Ok(Self::Jsonl),
            "progress" => Ok(Self::Progress),
            other => Err(format!(
                "unknown format '{other}', expected text, jsonl or progress"
            )),
        }
    }
}

/// `interactive` says whether stderr is a terminal; progress bars fall back
/// to text output when it is not.
pub fn build_renderer(format: RenderFormat, interactive: bool) -> Arc<dyn LifecycleRenderer> {
    match format {
        RenderFormat::Jsonl => Arc::new(JsonlRendererPlugin::new(false)),
        RenderFormat::Progress if interactive => Arc::new(ProgressRendererPlugin::new(true)),
        RenderFormat::Progress => {
            tracing::debug!("stderr is not a terminal, rendering progress as text");
            Arc::new(TextRendererPlugin::new(true))
        }
        RenderFormat::Text => Arc::new(TextRendererPlugin::new(false)),
    }
}
