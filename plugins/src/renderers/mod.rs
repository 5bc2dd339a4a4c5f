mod jsonl;
mod progress;
mod text;

pub use jsonl::JsonlRendererPlugin;
pub use progress::ProgressRendererPlugin;
pub use text::TextRendererPlugin;

use uuid::Uuid;

/// First eight hex digits, enough to tell tasks apart in a terminal.
pub(crate) fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
