use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Parser;
use serde::de::DeserializeOwned;
use slit_planner::batch::{self, WidthOverrides};
use slit_planner::config::{ScheduleMode, SolverConfig};
use slit_planner::master::MaterialMaster;
use slit_planner::render;
use slit_planner::schedule::compute_max_lateness;
use slit_planner::types::{BatchResult, DemandLine, Pattern, Width, WidthSource};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "slit_planner",
    about = "Coil slitting pattern optimizer and production scheduler"
)]
struct Cli {
    /// Demand lines as a JSON array
    #[arg(long)]
    demands: PathBuf,

    /// Solver configuration JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Material master JSON (default: bundled table)
    #[arg(long)]
    master: Option<PathBuf>,

    /// Parent width override per coil code as CODE=MM (repeatable)
    #[arg(long = "width", value_parser = parse_width_override)]
    widths: Vec<(String, f64)>,

    /// Best-of attempts (overrides config)
    #[arg(long)]
    attempts: Option<u32>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Schedule mode: none, forward, or alap
    #[arg(long, value_parser = parse_schedule)]
    schedule: Option<ScheduleArg>,

    /// First day of a forward schedule (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Show ASCII layout of each pattern
    #[arg(long)]
    layout: bool,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy)]
enum ScheduleArg {
    None,
    Mode(ScheduleMode),
}

fn parse_schedule(s: &str) -> Result<ScheduleArg, String> {
    match s {
        "none" => Ok(ScheduleArg::None),
        _ => s.parse::<ScheduleMode>().map(ScheduleArg::Mode).map_err(|_| {
            format!(
                "invalid schedule mode '{}', expected: none, forward, or alap",
                s
            )
        }),
    }
}

fn parse_width_override(s: &str) -> Result<(String, f64), String> {
    let (code, mm) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid width override '{}', expected CODE=MM", s))?;
    if code.trim().is_empty() {
        return Err(format!("missing coil code in '{}'", s));
    }
    let mm = mm
        .parse::<f64>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    if !(mm > 0.0) {
        return Err(format!("width must be positive in '{}'", s));
    }
    Ok((code.trim().to_string(), mm))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {}", path.display(), e))
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn source_label(source: WidthSource) -> &'static str {
    match source {
        WidthSource::Override => "override",
        WidthSource::Master => "master",
        WidthSource::Description => "description",
        WidthSource::Default => "default",
    }
}

fn describe_cuts(pattern: &Pattern) -> String {
    pattern
        .cuts
        .iter()
        .map(|c| format!("{}x{}", c.count, c.width))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn print_batch(batch: &BatchResult, layout: bool) {
    for row in &batch.summary {
        println!(
            "Group {} ({}): parent {} mm [{}]",
            row.coil_code,
            row.description,
            row.parent_width,
            source_label(row.width_source)
        );
        if let Some(err) = batch.failures.get(&row.coil_code) {
            println!("  failed: {}", err);
            println!();
            continue;
        }
        let Some(result) = batch.results.get(&row.coil_code) else {
            continue;
        };
        for p in &result.patterns {
            println!(
                "  #{}: {} x {:.2} units, {:.2}% yield",
                p.id,
                describe_cuts(p),
                p.assigned_units,
                p.yield_percent
            );
            if layout {
                print!(
                    "{}",
                    render::render_pattern(p, Width::from_mm(result.parent_width))
                );
            }
        }
        for f in &result.fulfillment {
            println!(
                "  {} mm: {:.2} / {:.2} t",
                f.width, f.produced_tons, f.target_tons
            );
        }
        for unmet in &result.unmet_demands {
            println!("  unmet: {}", unmet);
        }
        println!(
            "  {:.1} t in, {:.1} t out, {:.2}% yield",
            row.total_input_tons, row.total_output_tons, row.yield_percent
        );
        println!();
    }

    let groups = batch.summary.len();
    println!(
        "Summary: {} group{}, {} pattern{}, {:.1} t in, {:.2}% global yield",
        groups,
        if groups == 1 { "" } else { "s" },
        batch.total_patterns(),
        if batch.total_patterns() == 1 { "" } else { "s" },
        batch.total_global_input,
        batch.total_global_yield,
    );
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();

    let demands: Vec<DemandLine> = load_json(&cli.demands).unwrap_or_else(|e| fail(e));
    if demands.is_empty() {
        fail("demand file contains no lines");
    }

    let mut config: SolverConfig = match &cli.config {
        Some(path) => load_json(path).unwrap_or_else(|e| fail(e)),
        None => SolverConfig::default(),
    };
    if let Some(attempts) = cli.attempts {
        config.attempts = attempts;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.start.is_some() {
        config.schedule_start_date = cli.start;
    }
    let scheduled = match cli.schedule {
        Some(ScheduleArg::None) => false,
        Some(ScheduleArg::Mode(mode)) => {
            config.schedule_mode = mode;
            true
        }
        None => true,
    };
    if let Err(e) = config.validate() {
        fail(e);
    }

    let master = match &cli.master {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("cannot read {}: {}", path.display(), e)));
            MaterialMaster::from_json(&text)
                .unwrap_or_else(|e| fail(format!("invalid JSON in {}: {}", path.display(), e)))
        }
        None => MaterialMaster::bundled(),
    };
    let overrides: WidthOverrides = cli.widths.into_iter().collect();

    let result = if config.attempts > 1 {
        batch::solve_batch_best_of(
            &demands,
            &config,
            &master,
            &overrides,
            config.attempts,
            scheduled,
        )
    } else {
        batch::solve_batch(&demands, &config, &master, &overrides, scheduled)
    }
    .unwrap_or_else(|e| fail(e));

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(e),
        }
        return;
    }

    print_batch(&result, cli.layout);

    if let Some(schedule) = &result.schedule {
        println!();
        print!("{}", render::render_schedule(&schedule.days));
        for warning in &schedule.warnings {
            println!("warning: {}", warning);
        }
        let lateness = compute_max_lateness(&schedule.days, &demands, config.lead_buffer_days);
        println!(
            "Max lateness: {} day{}",
            lateness,
            if lateness == 1 { "" } else { "s" }
        );
    }
}
