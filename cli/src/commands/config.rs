use deskjob_core::config::AppConfig;
use deskjob_core::CliError;

use super::cli::ConfigArgs;

pub fn config_cmd(args: &ConfigArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    println!("{}", render_config(args, cfg)?);
    Ok(0)
}

pub fn render_config(args: &ConfigArgs, cfg: &AppConfig) -> Result<String, CliError> {
    if args.json {
        serde_json::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
    } else {
        toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
    }
}
