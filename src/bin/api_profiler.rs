use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use simpleperf_app_api::app::config::{load_config, load_config_from_path, SessionConfig};
use simpleperf_app_api::{
    init_logging, AppError, CallGraphMode, ProfileSession, RecordOptions, SessionState,
    SessionSummary,
};
use uuid::Uuid;

const USAGE: &str = "Usage: api_profiler [--app-dir DIR] [--config PATH] [--event NAME] [--freq HZ] [--duration SECS] [--threads 1,2,3] [--call-graph dwarf|fp] [--trace-offcpu] [--out FILE] [--record-ms N] [--pause-ms N] [--json]\n";

#[derive(Debug, Clone)]
struct Args {
    app_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    event: Option<String>,
    freq: Option<u32>,
    duration: Option<f64>,
    threads: Vec<u32>,
    call_graph: CallGraphMode,
    trace_offcpu: bool,
    out: Option<String>,
    record_ms: u64,
    pause_ms: Option<u64>,
    json: bool,
}

#[derive(Serialize)]
struct StepResult {
    name: &'static str,
    status: &'static str,
    duration_ms: u128,
    error_code: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    session: Option<SessionSummary>,
    steps: Vec<StepResult>,
}

fn next_value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    it.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{flag} expects a number, got {value:?}"))
}

fn parse_threads(value: &str) -> Result<Vec<u32>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number::<u32>(part, "--threads"))
        .collect()
}

fn parse_args_from(argv: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut app_dir = None;
    let mut config_path = None;
    let mut event = None;
    let mut freq = None;
    let mut duration = None;
    let mut threads = Vec::new();
    let mut call_graph = CallGraphMode::None;
    let mut trace_offcpu = false;
    let mut out = None;
    let mut record_ms = 1000u64;
    let mut pause_ms = None;
    let mut json = false;

    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--app-dir" => app_dir = Some(PathBuf::from(next_value(&mut it, "--app-dir")?)),
            "--config" => config_path = Some(PathBuf::from(next_value(&mut it, "--config")?)),
            "--event" => event = Some(next_value(&mut it, "--event")?),
            "--freq" => {
                let value = next_value(&mut it, "--freq")?;
                let hz = parse_number::<u32>(&value, "--freq")?;
                if hz == 0 {
                    return Err("--freq must be greater than zero".to_string());
                }
                freq = Some(hz);
            }
            "--duration" => {
                let value = next_value(&mut it, "--duration")?;
                let secs = parse_number::<f64>(&value, "--duration")?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err("--duration must be a non-negative number".to_string());
                }
                duration = Some(secs);
            }
            "--threads" => {
                let value = next_value(&mut it, "--threads")?;
                threads.extend(parse_threads(&value)?);
            }
            "--call-graph" => {
                call_graph = match next_value(&mut it, "--call-graph")?.as_str() {
                    "dwarf" => CallGraphMode::Dwarf,
                    "fp" => CallGraphMode::FramePointer,
                    other => return Err(format!("Unknown call graph mode: {other}")),
                };
            }
            "--trace-offcpu" => trace_offcpu = true,
            "--out" => out = Some(next_value(&mut it, "--out")?),
            "--record-ms" => {
                let value = next_value(&mut it, "--record-ms")?;
                record_ms = parse_number(&value, "--record-ms")?;
            }
            "--pause-ms" => {
                let value = next_value(&mut it, "--pause-ms")?;
                pause_ms = Some(parse_number(&value, "--pause-ms")?);
            }
            "--json" => json = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    if trace_offcpu && pause_ms.is_some() {
        return Err("--pause-ms cannot be combined with --trace-offcpu".to_string());
    }

    Ok(Args {
        app_dir,
        config_path,
        event,
        freq,
        duration,
        threads,
        call_graph,
        trace_offcpu,
        out,
        record_ms,
        pause_ms,
        json,
    })
}

fn record_options(args: &Args) -> RecordOptions {
    let mut options = RecordOptions::new().call_graph(args.call_graph);
    if let Some(out) = &args.out {
        options = options.output_filename(out.clone());
    }
    if let Some(event) = &args.event {
        options = options.event(event.clone());
    }
    if let Some(freq) = args.freq {
        options = options.sample_frequency(freq);
    }
    if let Some(duration) = args.duration {
        options = options.duration(duration);
    }
    if !args.threads.is_empty() {
        options = options.sample_threads(args.threads.iter().copied());
    }
    if args.trace_offcpu {
        options = options.trace_offcpu();
    }
    options
}

fn run_step<F>(steps: &mut Vec<StepResult>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<(), AppError>,
{
    let start = Instant::now();
    match f() {
        Ok(()) => {
            steps.push(StepResult {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                error_code: None,
                error: None,
            });
            Ok(())
        }
        Err(err) => {
            steps.push(StepResult {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                error_code: Some(err.code.clone()),
                error: Some(err.error),
            });
            Err(())
        }
    }
}

fn load_session_config(args: &Args, trace_id: &str) -> Result<SessionConfig, AppError> {
    match &args.config_path {
        Some(path) => load_config_from_path(path, trace_id),
        None => load_config(trace_id),
    }
}

fn open_session(args: &Args, config: SessionConfig) -> Result<ProfileSession, AppError> {
    match &args.app_dir {
        Some(dir) => Ok(ProfileSession::with_config(dir.clone(), config)),
        None => ProfileSession::for_current_app(config),
    }
}

fn record(session: &ProfileSession, args: &Args, steps: &mut Vec<StepResult>) -> Result<(), ()> {
    let options = record_options(args);
    run_step(steps, "start", || session.start(&options))?;
    thread::sleep(Duration::from_millis(args.record_ms));
    if let Some(pause_ms) = args.pause_ms {
        run_step(steps, "pause", || session.pause())?;
        thread::sleep(Duration::from_millis(pause_ms));
        run_step(steps, "resume", || session.resume())?;
        thread::sleep(Duration::from_millis(args.record_ms));
    }
    Ok(())
}

fn needs_stop(state: SessionState) -> bool {
    matches!(state, SessionState::Started | SessionState::Paused)
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("Failed to serialize summary: {err}"),
        }
        return;
    }
    println!("{} [{}] trace_id={}", summary.tool, summary.status, summary.trace_id);
    for step in &summary.steps {
        match (&step.error_code, &step.error) {
            (Some(code), Some(error)) => println!(
                "  {:<8} {:<4} {:>6}ms  {error} ({code})",
                step.name, step.status, step.duration_ms
            ),
            _ => println!(
                "  {:<8} {:<4} {:>6}ms",
                step.name, step.status, step.duration_ms
            ),
        }
    }
    if let Some(session) = &summary.session {
        println!("  state:    {}", session.state);
        println!("  data dir: {}", session.data_dir);
        if let Some(path) = &session.executable_path {
            println!("  simpleperf: {path}");
        }
    }
}

fn main() {
    let args = match parse_args_from(std::env::args().skip(1)) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    init_logging();
    let trace_id = Uuid::new_v4().to_string();
    let mut steps: Vec<StepResult> = Vec::new();

    let mut config = None;
    let _ = run_step(&mut steps, "config", || {
        config = Some(load_session_config(&args, &trace_id)?);
        Ok(())
    });

    let mut session = None;
    if let Some(config) = config {
        let _ = run_step(&mut steps, "session", || {
            session = Some(open_session(&args, config)?);
            Ok(())
        });
    }

    let mut status = if session.is_some() { "pass" } else { "fail" };
    if let Some(session) = &session {
        if record(session, &args, &mut steps).is_err() {
            status = "fail";
        }
        // Stop whenever a recorder is running, even after a failed pause or resume.
        if needs_stop(session.state()) && run_step(&mut steps, "stop", || session.stop()).is_err()
        {
            status = "fail";
        }
    }

    let summary = RunSummary {
        tool: "api_profiler",
        status,
        trace_id: session
            .as_ref()
            .map(|s| s.trace_id().to_string())
            .unwrap_or(trace_id),
        session: session.as_ref().map(ProfileSession::summary),
        steps,
    };
    print_summary(&summary, args.json);

    if summary.status != "pass" {
        std::process::exit(1);
    }
}
