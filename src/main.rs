//! LTI Bridge - LTI 1.3 tool launch service for Moodle

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use lti_bridge::{
    cli::{Cli, Command},
    config::Config,
    lti::{LaunchRelay, LoginRequest, RelayError, SystemBrowserOpener},
    server::Bridge,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Launch {
            target_url,
            login_hint,
        }) => run_interactive_launch(config, target_url, login_hint).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides.
fn load_config(cli: &Cli) -> lti_bridge::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }

    Ok(config)
}

/// Validate the configuration and print the resolved registration.
fn run_check_config(config: &Config) -> ExitCode {
    match config.platform.validate() {
        Ok(()) => {
            println!("✅ Platform registration complete");
            println!("   Issuer:        {}", config.platform.issuer);
            println!("   Client ID:     {}", config.platform.client_id);
            println!("   Deployment ID: {}", config.platform.deployment_id);
            println!("   Redirect URI:  {}", config.platform.redirect_uri());
            println!("   Launch URL:    {}", config.platform.launch_url);
            if config.moodle.is_configured() {
                println!("   Moodle proxy:  {}", config.moodle.url);
            } else {
                println!("   Moodle proxy:  disabled (no credentials)");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the bridge server
async fn run_server(config: Config) -> ExitCode {
    let bridge = match Bridge::new(config) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to create bridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bridge.run().await {
        error!("Bridge error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Run one launch attempt through the system browser.
///
/// Starts the server (the platform must be able to reach the callback), then
/// drives the relay until it reaches a terminal state.
async fn run_interactive_launch(
    config: Config,
    target_url: Option<String>,
    login_hint: Option<String>,
) -> ExitCode {
    let timeout = config.relay.timeout;

    let bridge = match Bridge::new(config) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Failed to create bridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    let service = bridge.launch_service();
    let (tx, rx) = mpsc::channel(1);

    // The server must be up before the browser opens the authorization UI
    let server = tokio::spawn(bridge.run_with_relay(Some(tx)));
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let opener = SystemBrowserOpener;
    let outcome = LaunchRelay::new(&service, &opener, timeout)
        .run(
            LoginRequest {
                target_url,
                login_hint,
            },
            rx,
        )
        .await;

    let code = match outcome.result {
        Ok(completed) => {
            info!(
                subject = %completed.session.subject,
                deployment = %completed.session.deployment_id,
                "Launch validated"
            );
            println!("✅ Launch validated");
            println!("   Open: {}", completed.target_link_uri.as_deref().unwrap_or(&completed.launch_url));
            ExitCode::SUCCESS
        }
        Err(RelayError::PopupBlocked | RelayError::Timeout | RelayError::UserCancelled) => {
            eprintln!("❌ Launch did not complete");
            eprintln!("   You can open the tool directly: {}", outcome.fallback_url);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Launch rejected: {e}");
            eprintln!("   You can open the tool directly: {}", outcome.fallback_url);
            ExitCode::FAILURE
        }
    };

    server.abort();
    code
}
