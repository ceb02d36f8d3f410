use clap::{Parser, Subcommand};
use pomosync_lib::application::commands;
use pomosync_lib::domain::models::IdeKind;
use pomosync_lib::infrastructure::config::{
    ClientConfig, ServerConfig, StoreConfig, load_client_config_from_env,
    load_server_config_from_env, parse_base_url, parse_listen_addr, parse_timezone,
};
use pomosync_lib::infrastructure::error::InfraError;
use pomosync_lib::infrastructure::logging::{LogTarget, init_tracing};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "pomosync", version, about = "Shared pomodoro timer sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve /sync-state and /ide-connection over HTTP.
    Serve {
        #[arg(long)]
        listen: Option<String>,
        /// Use the file store rooted here, even when REST credentials are set.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// IANA zone used to bucket connection time into days.
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Run the editor agent on stdin/stdout.
    Agent {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Skip detection and report this editor.
        #[arg(long)]
        ide: Option<String>,
    },
    /// Poll the sync service like a dashboard tab and log what changes.
    Watch {
        #[arg(long)]
        base_url: Option<String>,
    },
}

fn server_config(
    listen: Option<String>,
    data_dir: Option<PathBuf>,
    timezone: Option<String>,
) -> Result<ServerConfig, InfraError> {
    let mut config = load_server_config_from_env()?;
    if let Some(listen) = listen {
        config.listen = parse_listen_addr(&listen)?;
    }
    if let Some(root) = data_dir {
        config.store = StoreConfig::File { root };
    }
    if let Some(timezone) = timezone {
        config.timezone = parse_timezone(&timezone)?;
    }
    Ok(config)
}

fn client_config(
    base_url: Option<String>,
    state_dir: Option<PathBuf>,
) -> Result<ClientConfig, InfraError> {
    let mut config = load_client_config_from_env()?;
    if let Some(base_url) = base_url {
        config.base_url = parse_base_url(&base_url)?;
    }
    if let Some(state_dir) = state_dir {
        config.state_dir = state_dir;
    }
    Ok(config)
}

async fn run(command: Command) -> Result<(), InfraError> {
    match command {
        Command::Serve {
            listen,
            data_dir,
            timezone,
        } => commands::serve(server_config(listen, data_dir, timezone)?).await,
        Command::Agent {
            base_url,
            state_dir,
            ide,
        } => {
            let config = client_config(base_url, state_dir)?;
            let ide = ide.as_deref().map(IdeKind::parse_lenient);
            commands::run_agent(config, ide).await
        }
        Command::Watch { base_url } => commands::watch(client_config(base_url, None)?).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let target = match cli.command {
        Command::Agent { .. } => LogTarget::Stderr,
        _ => LogTarget::Stdout,
    };
    init_tracing(target);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(event = "fatal", error = %error);
            ExitCode::FAILURE
        }
    }
}
