use clap::Parser;
use deskjob_cli::commands::{cli, config, run};
use deskjob_core::config::AppConfig;
use deskjob_core::error::{self, ErrorCode};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    dispatch(args, cfg).await
}

fn load_config(path: Option<&str>) -> Result<AppConfig, error::CliError> {
    let loaded = match path {
        Some(path) => deskjob_core::config::load_from(path).and_then(|mut cfg| {
            deskjob_core::config::apply_env_overrides(&mut cfg)?;
            Ok(cfg)
        }),
        None => deskjob_core::config::load_default(),
    };
    loaded.map_err(|e| error::CliError::Config(format!("{e:#}")))
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 1: run finished with failed or cancelled tasks (not an error)
    // 3/4: invalid argument / invalid state
    // 11: config error
    // 20: rejected submission / IO error
    // 30: coordinator unavailable
    // 31: interrupted wait
    // 50: internal/uncategorized
    match e {
        error::CliError::Config(_) => 11,
        error::CliError::Task(te) => match te.error_code() {
            ErrorCode::InvalidArgument => 3,
            ErrorCode::InvalidState => 4,
            ErrorCode::Rejected => 20,
            ErrorCode::Unavailable => 30,
            ErrorCode::Interrupted => 31,
        },
        error::CliError::Io(_) => 20,
        error::CliError::Command(_) => 20,
        error::CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(args: cli::Args, cfg: AppConfig) -> Result<i32, error::CliError> {
    match args.command {
        cli::Commands::Run(run_args) => run::run_cmd(run_args, args.format.into(), &cfg).await,
        cli::Commands::Config(config_args) => config::config_cmd(&config_args, &cfg),
    }
}

fn init_tracing(logging: &deskjob_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("deskjob"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("deskjob.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    // Console logs go to stderr so stdout stays clean for renderer output.
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
