use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use event_horizon_rust_lib::app::config::{config_path, save_config};
use event_horizon_rust_lib::app::error::AppError;
use event_horizon_rust_lib::app::models::{
    RootCheckResult, RootCommandResult, SystemTweakResult, TelemetrySnapshot, TweakEvent,
    TweakStatesView,
};
use event_horizon_rust_lib::app::prefs::PrefsStore;
use event_horizon_rust_lib::app::root::locator::{
    find_installed_su, validate_su_program, KNOWN_SU_PATHS,
};
use event_horizon_rust_lib::app::root::runner::{MountNamespace, RootExecutor, RootShell};
use event_horizon_rust_lib::app::state::AppState;
use event_horizon_rust_lib::app::telemetry::monitor::start_telemetry_monitor;
use event_horizon_rust_lib::app::tweaks::action::{TweakAction, TweakParams};
use event_horizon_rust_lib::app::tweaks::system::{apply_system_tweak, SystemTweak};
use event_horizon_rust_lib::init_console;
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str = "usage: event_horizon_rust [--json] <command>

commands:
  check-root
  exec [--mount-master] <batch>
  dispatch <ACTION> [--rgb R,G,B] [--gpu-max-mhz N]
  status
  boot
  serve
  telemetry [--samples N]
  system <tweak> [on|off]
  config [save]";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    CheckRoot,
    Exec { batch: String, mount_master: bool },
    Dispatch { action: TweakAction },
    Status,
    Boot,
    Serve,
    Telemetry { samples: usize },
    System { tweak: SystemTweak, enabled: bool },
    Config { save: bool },
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    json: bool,
    command: Command,
}

fn parse_args(raw: Vec<String>) -> Result<Args, String> {
    let mut json = false;
    let mut positional: Vec<String> = Vec::new();
    let mut mount_master = false;
    let mut rgb: Option<String> = None;
    let mut gpu_max_mhz: Option<String> = None;
    let mut samples: Option<String> = None;

    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--mount-master" => mount_master = true,
            "--rgb" => {
                rgb = Some(it.next().ok_or_else(|| "--rgb requires a value".to_string())?);
            }
            "--gpu-max-mhz" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--gpu-max-mhz requires a value".to_string())?;
                if value.trim().is_empty() || !value.trim().chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("Invalid --gpu-max-mhz value: {value}"));
                }
                gpu_max_mhz = Some(value.trim().to_string());
            }
            "--samples" => {
                samples = Some(
                    it.next()
                        .ok_or_else(|| "--samples requires a value".to_string())?,
                );
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().ok_or_else(|| USAGE.to_string())?;
    let command = match name.as_str() {
        "check-root" => Command::CheckRoot,
        "exec" => {
            let batch = positional.collect::<Vec<_>>().join(" ");
            if batch.trim().is_empty() {
                return Err("exec requires a command batch".to_string());
            }
            Command::Exec {
                batch,
                mount_master,
            }
        }
        "dispatch" => {
            let identifier = positional
                .next()
                .ok_or_else(|| "dispatch requires an action identifier".to_string())?;
            let action = identifier.parse::<TweakAction>()?;
            let color = rgb.map(|value| value.parse()).transpose()?;
            Command::Dispatch {
                action: action.with_params(TweakParams {
                    color,
                    gpu_max_freq_mhz: gpu_max_mhz,
                }),
            }
        }
        "status" => Command::Status,
        "boot" => Command::Boot,
        "serve" => Command::Serve,
        "telemetry" => {
            let samples = match samples {
                Some(value) => value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or_else(|| format!("Invalid --samples value: {value}"))?,
                None => 1,
            };
            Command::Telemetry { samples }
        }
        "system" => {
            let tweak = positional
                .next()
                .ok_or_else(|| "system requires a tweak name".to_string())?
                .parse::<SystemTweak>()?;
            let enabled = match positional.next().as_deref() {
                None | Some("on") => true,
                Some("off") => false,
                Some(other) => return Err(format!("Expected on|off but got '{other}'")),
            };
            Command::System { tweak, enabled }
        }
        "config" => match positional.next().as_deref() {
            None => Command::Config { save: false },
            Some("save") => Command::Config { save: true },
            Some(other) => return Err(format!("Unknown config action: {other}")),
        },
        other => return Err(format!("Unknown command: {other}\n\n{USAGE}")),
    };

    Ok(Args { json, command })
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_states(view: &TweakStatesView) {
    for (category, state) in &view.categories {
        println!("{category}: {state:?}");
    }
    match view.last_reconciled_at {
        Some(at) => println!("last_reconciled_at: {}", at.to_rfc3339()),
        None => println!("last_reconciled_at: never"),
    }
}

fn event_printer(json: bool) -> Arc<dyn Fn(TweakEvent) + Send + Sync> {
    Arc::new(move |event: TweakEvent| {
        if json {
            let line = serde_json::json!({
                "event": event.kind.name(),
                "trace_id": event.trace_id,
                "states": event.states,
            });
            println!("{line}");
        } else {
            let running: Vec<String> = event
                .states
                .categories
                .iter()
                .filter(|(_, state)| state.is_active())
                .map(|(category, _)| category.to_string())
                .collect();
            println!("[{}] active: {}", event.kind.name(), running.join(", "));
        }
    })
}

fn check_root(state: &AppState, trace_id: &str) -> RootCheckResult {
    let shell = RootShell::from_settings(&state.config.root);
    let available = match validate_su_program(shell.program()) {
        Ok(()) => shell.is_privilege_available(trace_id),
        Err(_) => false,
    };
    RootCheckResult {
        available,
        program: shell.program().to_string(),
        installed_su: find_installed_su(KNOWN_SU_PATHS),
    }
}

fn exec(
    state: &AppState,
    batch: &str,
    mount_master: bool,
    json: bool,
    trace_id: &str,
) -> Result<(), AppError> {
    let namespace = if mount_master {
        MountNamespace::Global
    } else {
        MountNamespace::Private
    };
    let executor = state.executor();
    if !json {
        print!("{}", executor.execute(batch, namespace, trace_id));
        return Ok(());
    }
    let output = executor.run(batch, namespace, trace_id)?;
    print_json(&RootCommandResult {
        text: output.to_text(),
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
    });
    Ok(())
}

fn finish_service(state: &AppState, json: bool, trace_id: &str) -> Result<(), AppError> {
    let view = match state.wait_for_tweak_service(trace_id)? {
        Some(view) => view,
        None => state.tweak_states(trace_id)?,
    };
    if json {
        print_json(&view);
    } else {
        print_states(&view);
    }
    Ok(())
}

fn serve(state: &AppState, json: bool, trace_id: &str) -> Result<(), AppError> {
    let (lines_tx, lines_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut started = false;
    loop {
        match lines_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let line_trace = Uuid::new_v4().to_string();
                match TweakAction::parse(line, &line_trace)
                    .and_then(|action| state.dispatch(action, &line_trace))
                {
                    Ok(()) => started = true,
                    Err(err) => eprintln!("{err}"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if started && !state.is_tweak_service_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    finish_service(state, json, trace_id)
}

fn telemetry(state: &AppState, samples: usize, json: bool, trace_id: &str) {
    let handle = start_telemetry_monitor(
        state.executor(),
        state.config.telemetry.poll_interval_ms,
        Some(samples),
        Arc::new(move |snapshot: TelemetrySnapshot| {
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
                );
            } else {
                println!(
                    "cpu temp={:?}C little={:?}% big={:?}% governor={} | gpu {:?}MHz usage={:?}% temp={:?}C",
                    snapshot.cpu.temp_celsius,
                    snapshot.cpu.little_usage_percent,
                    snapshot.cpu.big_usage_percent,
                    snapshot.cpu.governor.as_deref().unwrap_or("?"),
                    snapshot.gpu.freq_mhz,
                    snapshot.gpu.usage_percent,
                    snapshot.gpu.temp_celsius,
                );
            }
        }),
        trace_id,
    );
    handle.wait();
}

fn system(
    state: &AppState,
    tweak: SystemTweak,
    enabled: bool,
    trace_id: &str,
) -> Result<SystemTweakResult, AppError> {
    let options = state.system_options();
    let executor = state.executor();
    let verified = apply_system_tweak(executor.as_ref(), tweak, enabled, &options, trace_id)?;
    if let Some(key) = tweak.state_key().filter(|_| verified) {
        PrefsStore::open(state.config.prefs_path()).put_bool(key, enabled, trace_id)?;
    }
    Ok(SystemTweakResult {
        tweak: format!("{tweak:?}"),
        enabled,
        verified,
    })
}

fn run(args: Args, state: AppState, trace_id: &str) -> Result<(), AppError> {
    let json = args.json;
    match args.command {
        Command::CheckRoot => {
            let result = check_root(&state, trace_id);
            if json {
                print_json(&result);
            } else {
                println!(
                    "root: {}\nprogram: {}\ninstalled_su: {}",
                    if result.available { "available" } else { "unavailable" },
                    result.program,
                    result.installed_su.as_deref().unwrap_or("-")
                );
            }
            if !result.available {
                return Err(AppError::dependency("Root is not available", trace_id));
            }
            Ok(())
        }
        Command::Exec {
            batch,
            mount_master,
        } => exec(&state, &batch, mount_master, json, trace_id),
        Command::Dispatch { action } => {
            let state = state.with_emitter(event_printer(json));
            state.dispatch(action, trace_id)?;
            finish_service(&state, json, trace_id)
        }
        Command::Status => {
            let view = state.tweak_states(trace_id)?;
            if json {
                print_json(&view);
            } else {
                print_states(&view);
            }
            Ok(())
        }
        Command::Boot => {
            let state = state.with_emitter(event_printer(json));
            let report = state.boot(trace_id);
            if json {
                print_json(&report);
            } else {
                println!("started: {}", report.actions.join(", "));
                for result in &report.one_shots {
                    println!("{}: verified={}", result.tweak, result.verified);
                }
                for err in &report.errors {
                    eprintln!("{err}");
                }
            }
            finish_service(&state, json, trace_id)
        }
        Command::Serve => {
            let state = state.with_emitter(event_printer(json));
            serve(&state, json, trace_id)
        }
        Command::Telemetry { samples } => {
            telemetry(&state, samples, json, trace_id);
            Ok(())
        }
        Command::System { tweak, enabled } => {
            let result = system(&state, tweak, enabled, trace_id)?;
            if json {
                print_json(&result);
            } else {
                println!("{}: verified={}", result.tweak, result.verified);
            }
            Ok(())
        }
        Command::Config { save } => {
            if save {
                save_config(&state.config, trace_id)?;
                eprintln!("saved {}", config_path().display());
            }
            print_json(&state.config);
            Ok(())
        }
    }
}

fn main() {
    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let state = match init_console(&trace_id) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args.clone(), state, &trace_id) {
        if args.json {
            print_json(&err);
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }
}
