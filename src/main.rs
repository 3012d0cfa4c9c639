use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    signal,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smart_home_client::{
    auth::{AuthService, SignupDetails},
    config::{self, Config},
    control::ControlService,
    device::{
        models::{AqiBand, Device, DoorAction, SensorReading, GAS_SENSORS},
        DeviceClient,
    },
    reading_cache::ReadingCache,
    rfid::{RfidEnrollment, RfidError, ScanOutcome},
    sensors::{SensorPoller, SensorService},
    session::{Route, SessionManager},
};

#[derive(Debug, Parser)]
#[command(name = "smart-home", about = "Control the home controller from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in with the account stored on the controller
    Login {
        username: String,
        #[arg(long, env = "SMART_HOME_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account (an OTP is emailed and read from stdin)
    Signup {
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SMART_HOME_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Show who is logged in
    Whoami,
    /// Confirmed status of every device
    Status,
    /// Switch a device and report what it confirms
    Set { device: Device, state: Toggle },
    Door {
        #[arg(value_enum)]
        action: DoorCommand,
    },
    /// Stream sensor snapshots until interrupted
    Watch,
    Rfid {
        #[command(subcommand)]
        command: RfidCommand,
    },
    /// Start voice capture on the controller
    Record,
}

impl Command {
    /// Everything except account management needs a live session.
    fn requires_session(&self) -> bool {
        !matches!(
            self,
            Command::Login { .. } | Command::Signup { .. } | Command::Logout | Command::Whoami
        )
    }

    /// Commands that only touch the local session file.
    fn is_local(&self) -> bool {
        matches!(self, Command::Logout | Command::Whoami)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DoorCommand {
    Open,
    Close,
    Status,
}

#[derive(Debug, Subcommand)]
enum RfidCommand {
    List,
    /// Scan a card and register it
    Enroll {
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.command.is_local() {
        return run_local(&cli.command, SessionManager::new(config::session_file())).await;
    }

    let config = Config::from_env()?;
    let device = DeviceClient::new(&config)?;
    let sessions = SessionManager::new(config.session_file.clone());
    info!(base_url = %device.base_url(), "Controller client ready");

    if cli.command.requires_session() && sessions.entry_route().await == Route::Authentication {
        bail!("not logged in (or session expired); run `smart-home login` first");
    }

    let cache = ReadingCache::new();
    match cli.command {
        Command::Login { username, password } => {
            let auth = AuthService::new(device, sessions);
            auth.login(&username, &password).await?;
            println!("Logged in as {username}");
        }
        Command::Signup {
            fullname,
            username,
            email,
            password,
        } => {
            let auth = AuthService::new(device, sessions);
            let pending = auth
                .request_otp(SignupDetails {
                    fullname,
                    username,
                    email,
                    password,
                })
                .await?;
            println!("Enter the OTP sent to {}:", pending.details().email);
            let otp = read_line().await?;
            auth.complete_signup(&pending, &otp).await?;
            println!("Welcome, {}", pending.details().fullname);
        }
        local @ (Command::Logout | Command::Whoami) => run_local(&local, sessions).await?,
        Command::Status => {
            let control = ControlService::new(device, cache);
            for (device, status) in control.refresh_all().await {
                println!("{device:<18} {status}");
            }
            println!("{:<18} {}", "fan-running", control.fan_running().await);
            println!("{:<18} {}", "door", control.door_status().await);
        }
        Command::Set { device: target, state } => {
            let control = ControlService::new(device, cache);
            let status = control.set(target, matches!(state, Toggle::On)).await;
            println!("{target}: {status}");
        }
        Command::Door { action } => {
            let control = ControlService::new(device, cache);
            let shown = match action {
                DoorCommand::Open => control.set_door(DoorAction::Open).await,
                DoorCommand::Close => control.set_door(DoorAction::Close).await,
                DoorCommand::Status => control.door_status().await,
            };
            println!("Door: {shown}");
        }
        Command::Watch => watch(device, cache, &config).await?,
        Command::Rfid { command } => {
            let mut rfid =
                RfidEnrollment::new(device, config.rfid_scan_interval, config.rfid_scan_timeout);
            match command {
                RfidCommand::List => {
                    for record in rfid.list().await? {
                        println!("{:<20} {}", record.owner, record.tag_id);
                    }
                }
                RfidCommand::Enroll { owner } => {
                    let dismissed = cancel_on_shutdown();
                    println!("Hold the card to the reader...");
                    match rfid.scan(&dismissed).await {
                        ScanOutcome::Tag(tag) => println!("Scanned {tag}"),
                        ScanOutcome::Cancelled => bail!("scan cancelled"),
                        ScanOutcome::TimedOut => bail!("no card scanned before timeout"),
                    }
                    match rfid.confirm(&owner).await {
                        Ok(reply) => println!("{}", reply.trim()),
                        Err(RfidError::Validation) => {
                            rfid.dismiss();
                            bail!(RfidError::Validation);
                        }
                        Err(e) => bail!(e),
                    }
                }
            }
        }
        Command::Record => {
            let control = ControlService::new(device, cache);
            match control.start_record().await {
                Some(reply) => println!("{}", reply.trim()),
                None => bail!("controller did not start recording"),
            }
        }
    }

    Ok(())
}

async fn watch(device: DeviceClient, cache: ReadingCache, config: &Config) -> Result<()> {
    let lifecycle = cancel_on_shutdown();
    let mut updates = cache.subscribe();
    let mut poller = SensorPoller::new(SensorService::new(
        device,
        cache.clone(),
        config.poll_interval,
    ));
    poller.start(&lifecycle);

    loop {
        tokio::select! {
            () = lifecycle.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(reading) = updates.borrow_and_update().as_ref() {
                    println!("{}", summarize(reading));
                }
            }
        }
    }

    if let Some(task) = poller.stop() {
        task.await?;
    }
    Ok(())
}

async fn run_local(command: &Command, sessions: SessionManager) -> Result<()> {
    match command {
        Command::Logout => {
            sessions.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => match sessions.entry_route().await {
            Route::Home => {
                let name = sessions.fullname().await;
                println!("Welcome home, {}", name.as_deref().unwrap_or("Unknown"));
            }
            Route::Authentication => println!("Not logged in"),
        },
        _ => {}
    }
    Ok(())
}

fn summarize(reading: &SensorReading) -> String {
    if reading.is_empty() {
        return "no sensors reported".to_owned();
    }
    let aqi = reading.air_quality_index();
    let gases = GAS_SENSORS
        .iter()
        .map(|name| format!("{name}={:.1}", reading.level(name)))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "temp={} humidity={} {gases} aqi={aqi:.1} ({})",
        reading.temperature(),
        reading.humidity(),
        AqiBand::of(aqi)
    )
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_owned())
}

/// Token cancelled on Ctrl+C or SIGTERM.
fn cancel_on_shutdown() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Command {
        Cli::try_parse_from(std::iter::once("smart-home").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn account_commands_skip_the_session_gate() {
        for args in [&["logout"][..], &["whoami"], &["login", "admin", "--password", "x"]] {
            assert!(!command(args).requires_session(), "{args:?}");
        }
        assert!(command(&["status"]).requires_session());
        assert!(command(&["set", "kitchen-light", "on"]).requires_session());
    }

    #[test]
    fn only_logout_and_whoami_run_without_controller() {
        assert!(command(&["logout"]).is_local());
        assert!(command(&["whoami"]).is_local());
        assert!(!command(&["door", "status"]).is_local());
        assert!(!command(&["login", "admin", "--password", "x"]).is_local());
    }

    #[tokio::test]
    async fn logout_needs_only_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path().join("session.json"));
        sessions.login("admin", None).await.unwrap();

        run_local(&Command::Logout, sessions).await.unwrap();

        let reopened = SessionManager::new(dir.path().join("session.json"));
        assert_eq!(reopened.entry_route().await, Route::Authentication);
    }

    #[test]
    fn summary_includes_air_quality_band() {
        let reading = SensorReading::from_json(
            r#"{"temperature":"24","smoke":"100","LPG":"100","CO":"100","CO2":"100","NH3":"100"}"#,
        )
        .unwrap();
        let line = summarize(&reading);
        assert!(line.contains("aqi=100.0 (poor)"), "{line}");
        assert_eq!(summarize(&SensorReading::default()), "no sensors reported");
    }
}
