use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use event_horizon_rust_lib::app::config::load_config;
use event_horizon_rust_lib::app::logging::init_logging;
use event_horizon_rust_lib::app::root::runner::{MountNamespace, RootExecutor};
use event_horizon_rust_lib::app::state::AppState;
use event_horizon_rust_lib::app::telemetry::monitor::TelemetrySampler;
use event_horizon_rust_lib::app::tweaks::action::TweakAction;
use event_horizon_rust_lib::app::tweaks::category::TweakCategory;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    out_dir: Option<PathBuf>,
    json: bool,
    with_tweaks: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    su_program: Option<String>,
    out_dir: String,
    artifacts: HashMap<String, String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut out_dir: Option<PathBuf> = None;
    let mut json = false;
    let mut with_tweaks = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--json" => {
                json = true;
            }
            "--with-tweaks" => {
                with_tweaks = true;
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(Args {
        out_dir,
        json,
        with_tweaks,
    })
}

fn ensure_dir(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|err| format!("Failed to create dir {}: {err}", path.display()))
}

fn write_artifact<T: Serialize>(
    out_dir: &Path,
    name: &str,
    value: &T,
) -> Result<String, (&'static str, String)> {
    let path = out_dir.join(format!("{name}.json"));
    let body = serde_json::to_string_pretty(value)
        .map_err(|err| ("ERR_IO", format!("Failed to serialize {name}: {err}")))?;
    fs::write(&path, body).map_err(|err| ("ERR_IO", format!("Failed to write {name}: {err}")))?;
    Ok(path.to_string_lossy().to_string())
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<Vec<String>, (&'static str, String)>,
{
    let start = Instant::now();
    match f() {
        Ok(artifacts) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                artifacts,
                error_code: None,
                error: None,
            });
            Ok(())
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                artifacts: vec![],
                error_code: Some(code),
                error: Some(err),
            });
            Err(())
        }
    }
}

fn run_warn<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F)
where
    F: FnOnce() -> Result<Vec<String>, (&'static str, String)>,
{
    let start = Instant::now();
    match f() {
        Ok(artifacts) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                artifacts,
                error_code: None,
                error: None,
            });
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "warn",
                duration_ms: start.elapsed().as_millis(),
                artifacts: vec![],
                error_code: Some(code),
                error: Some(err),
            });
        }
    }
}

fn skip(checks: &mut Vec<SmokeCheck>, name: &'static str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        artifacts: vec![],
        error_code: None,
        error: None,
    });
}

fn emit_summary(summary: &SmokeSummary, json: bool) {
    let output = if json {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        format!(
            "status: {}\ntrace_id: {}\nout: {}\n",
            summary.status, summary.trace_id, summary.out_dir
        )
    };
    println!("{output}");
}

/// Starts the power LED through the service, confirms it by reconciliation and
/// stops it again.
fn tweak_round_trip(state: &AppState, trace_id: &str) -> Result<(), (&'static str, String)> {
    state
        .dispatch(TweakAction::start(TweakCategory::PowerLed), trace_id)
        .map_err(|err| ("ERR_DISPATCH", err.to_string()))?;
    std::thread::sleep(Duration::from_secs(2));
    state
        .dispatch(TweakAction::Refresh, trace_id)
        .map_err(|err| ("ERR_DISPATCH", err.to_string()))?;
    std::thread::sleep(Duration::from_millis(500));
    let observed = state
        .tweak_states(trace_id)
        .map_err(|err| ("ERR_STATUS", err.to_string()))?;
    state
        .dispatch(TweakAction::Stop(TweakCategory::PowerLed), trace_id)
        .map_err(|err| ("ERR_DISPATCH", err.to_string()))?;
    let final_view = state
        .wait_for_tweak_service(trace_id)
        .map_err(|err| ("ERR_DISPATCH", err.to_string()))?;

    if !observed.is_running(TweakCategory::PowerLed) {
        return Err((
            "ERR_TWEAK_NOT_RUNNING",
            "power_led.sh not found in the process table after start".to_string(),
        ));
    }
    if final_view.is_some_and(|view| view.any_active()) {
        return Err((
            "ERR_TWEAK_STILL_ACTIVE",
            "a tweak is still active after stop".to_string(),
        ));
    }
    Ok(())
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();

    let out_dir = args.out_dir.unwrap_or_else(|| {
        let mut p = std::env::temp_dir();
        p.push(format!("event_horizon_smoke_{trace_id}"));
        p
    });
    if let Err(err) = ensure_dir(&out_dir) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let mut artifacts: HashMap<String, String> = HashMap::new();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut status = "pass";

    let config = match load_config(&trace_id) {
        Ok(cfg) => cfg,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "fail",
                duration_ms: 0,
                artifacts: vec![],
                error_code: Some("ERR_CONFIG"),
                error: Some(err.to_string()),
            });
            let summary = SmokeSummary {
                tool: "event_horizon_smoke",
                status: "fail",
                trace_id,
                su_program: None,
                out_dir: out_dir.to_string_lossy().to_string(),
                artifacts,
                checks,
            };
            emit_summary(&summary, args.json);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);
    let state = AppState::from_config(config);
    let executor = state.executor();
    let su_program = state.config.root.su_program.clone();

    if run_check(&mut checks, "privilege_check", || {
        if executor.is_privilege_available(&trace_id) {
            Ok(vec![])
        } else {
            Err(("ERR_NO_ROOT", format!("{su_program} did not report uid 0")))
        }
    })
    .is_err()
    {
        status = "fail";
        let summary = SmokeSummary {
            tool: "event_horizon_smoke",
            status,
            trace_id,
            su_program: Some(su_program),
            out_dir: out_dir.to_string_lossy().to_string(),
            artifacts,
            checks,
        };
        emit_summary(&summary, args.json);
        std::process::exit(1);
    }

    if run_check(&mut checks, "exec_batch", || {
        let output = executor
            .run("id\necho __EH_SMOKE__", MountNamespace::Private, &trace_id)
            .map_err(|err| ("ERR_EXEC", err.to_string()))?;
        if !output.stdout.contains("uid=0") || !output.stdout.contains("__EH_SMOKE__") {
            return Err((
                "ERR_EXEC",
                format!("unexpected batch output: {}", output.to_text().trim()),
            ));
        }
        Ok(vec![])
    })
    .is_err()
    {
        status = "fail";
    }

    run_warn(&mut checks, "exec_mount_master", || {
        let text = executor.execute("echo __EH_SMOKE__", MountNamespace::Global, &trace_id);
        if text.contains("__EH_SMOKE__") {
            Ok(vec![])
        } else {
            Err(("WARN_MOUNT_MASTER", text.trim().to_string()))
        }
    });

    if run_check(&mut checks, "reconcile_status", || {
        let view = state
            .tweak_states(&trace_id)
            .map_err(|err| ("ERR_STATUS", err.to_string()))?;
        if view.last_reconciled_at.is_none() {
            return Err(("ERR_STATUS", "status read did not complete".to_string()));
        }
        let path = write_artifact(&out_dir, "tweak_states", &view)?;
        artifacts.insert("tweak_states".to_string(), path.clone());
        Ok(vec![path])
    })
    .is_err()
    {
        status = "fail";
    }

    run_warn(&mut checks, "telemetry_sample", || {
        let mut sampler = TelemetrySampler::new();
        let snapshot = sampler
            .sample(executor.as_ref(), &trace_id)
            .map_err(|err| ("WARN_TELEMETRY", err.to_string()))?;
        let path = write_artifact(&out_dir, "telemetry", &snapshot)?;
        artifacts.insert("telemetry".to_string(), path.clone());
        Ok(vec![path])
    });

    if args.with_tweaks {
        if run_check(&mut checks, "tweak_round_trip", || {
            tweak_round_trip(&state, &trace_id).map(|_| vec![])
        })
        .is_err()
        {
            status = "fail";
        }
    } else {
        skip(&mut checks, "tweak_round_trip");
    }

    let summary = SmokeSummary {
        tool: "event_horizon_smoke",
        status,
        trace_id: trace_id.clone(),
        su_program: Some(su_program),
        out_dir: out_dir.to_string_lossy().to_string(),
        artifacts,
        checks,
    };

    emit_summary(&summary, args.json);
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
