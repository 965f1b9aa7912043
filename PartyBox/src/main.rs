mod app;
mod logging;
mod pause;
mod status;

use crate::app::App;
use clap::{Arg, ArgAction, ArgMatches, Command};
use pbxmode::{MediaMode, PauseHook};
use serde::Serialize;
use std::process::ExitCode;
use tracing::error;

fn cli() -> Command {
    let modes = MediaMode::ALL
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Command::new("partybox")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("DIR")
                .help("Configuration directory (default: $PARTYBOX_CONFIG, ./.partybox, ~/.partybox)")
                .global(true),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Record commands instead of running them, work on a copy of the settings")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("status")
                .about("Print media mode and Spotify status")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .help("Bypass the status caches")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("mode")
                .about("Switch the media mode")
                .arg(
                    Arg::new("mode")
                        .value_name("MODE")
                        .help(format!("Target mode: {modes}"))
                        .required(true),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Restart and verify the services of the current mode")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-pause")
                        .long("no-pause")
                        .help("Do not pause Spotify when leaving the spotify mode")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("discoverable")
                .about("Make the Bluetooth adapter discoverable")
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_name("N")
                        .help("Discoverable window, 30 to 1800 seconds (0: default 300)")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("0"),
                ),
        )
        .subcommand(
            Command::new("spotify")
                .about("Print the Spotify playback state")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Ignore the playback cache (never the rate-limit cooldown)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("cached-only")
                        .long("cached-only")
                        .help("Never call the Spotify API")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Exécute la sous-commande ; retourne `false` si l'opération a échoué
async fn run(app: &App, matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("status", sub)) => {
            let refresh = sub.get_flag("refresh");
            let value = status::combined_status(&app.orchestrator, &app.spotify, refresh).await;
            print_json(&value)?;
            Ok(true)
        }
        Some(("mode", sub)) => {
            let raw = sub.get_one::<String>("mode").map(String::as_str).unwrap_or_default();
            let hook = app.pause_hook();
            let pause: Option<&dyn PauseHook> = if sub.get_flag("no-pause") {
                None
            } else {
                Some(&hook)
            };
            let outcome = app
                .orchestrator
                .request_mode(raw, pause, sub.get_flag("force"))
                .await;
            print_json(&outcome)?;
            Ok(outcome.ok)
        }
        Some(("discoverable", sub)) => {
            let seconds = sub.get_one::<u32>("seconds").copied().unwrap_or(0);
            let outcome = app.orchestrator.make_discoverable(seconds).await;
            print_json(&outcome)?;
            Ok(outcome.ok)
        }
        Some(("spotify", sub)) => {
            let snapshot = app
                .spotify
                .get_state(sub.get_flag("force"), !sub.get_flag("cached-only"))
                .await;
            print_json(&snapshot)?;
            Ok(snapshot.ok)
        }
        _ => anyhow::bail!("missing subcommand"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    if let Some(dir) = matches.get_one::<String>("config") {
        pbxconfig::set_config_dir(dir.clone());
    }
    let config = pbxconfig::get_config();
    logging::init_logging(&config);

    let dry_run = matches.get_flag("dry-run");
    let app = match App::from_config(&config, dry_run) {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {e:#}");
            eprintln!("partybox: {e:#}");
            return ExitCode::from(2);
        }
    };

    let result = run(&app, &matches).await;

    if dry_run {
        for command in app.recorded_commands() {
            eprintln!("would run: {command}");
        }
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            eprintln!("partybox: {e:#}");
            ExitCode::from(2)
        }
    }
}
