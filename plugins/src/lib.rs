pub mod factory;
pub mod renderers;

pub use factory::{build_renderer, RenderFormat};
pub use renderers::{JsonlRendererPlugin, ProgressRendererPlugin, TextRendererPlugin};
