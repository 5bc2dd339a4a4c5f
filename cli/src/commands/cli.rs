use clap::{Args as ClapArgs, Parser, Subcommand};
use deskjob_core::BlockingScope;
use deskjob_plugins::RenderFormat;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatArg {
    #[default]
    Text,
    Jsonl,
    Progress,
}

impl From<FormatArg> for RenderFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => RenderFormat::Text,
            FormatArg::Jsonl => RenderFormat::Jsonl,
            FormatArg::Progress => RenderFormat::Progress,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "deskjob", version, about = "Run background tasks through a deskjob service")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of ~/.deskjob/config.toml or ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value_t = FormatArg::Text, global = true)]
    pub format: FormatArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a simulated workload and render its lifecycle.
    Run(RunArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Number of tasks to submit.
    #[arg(long, default_value_t = 4)]
    pub tasks: usize,

    /// Steps per task; each step publishes one interim value.
    #[arg(long, default_value_t = 10)]
    pub steps: u32,

    #[arg(long, default_value_t = 50)]
    pub step_ms: u64,

    /// Make every Nth task fail halfway through.
    #[arg(long)]
    pub fail_every: Option<usize>,

    /// Request cancellation of all unfinished tasks after this many milliseconds.
    #[arg(long)]
    pub cancel_after_ms: Option<u64>,

    /// Input-blocking scope for each task: none, action, component, window, application.
    #[arg(long, default_value = "none", value_parser = parse_scope)]
    pub blocking: BlockingScope,

    /// Service to submit to. Defaults to the configured default service.
    #[arg(long)]
    pub service: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Print as JSON instead of TOML.
    #[arg(long)]
    pub json: bool,
}

fn parse_scope(s: &str) -> Result<BlockingScope, String> {
    s.parse()
}
