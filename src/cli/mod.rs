//! treetune CLI
//!
//! Command-line interface for grid-tuned random forest regression runs.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::data::{read_csv, summarize, ColumnKind, Role, Schema};
use crate::error::{Result, TreetuneError};
use crate::metrics::Metric;
use crate::pipeline::{run, RunConfig};
use crate::tune::{GridSpec, IntRange, OnCellError, ParamAxis, SelectionRule, Simplicity};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "treetune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grid-tuned random forest regression for tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tune, select, and evaluate a random forest on one dataset
    Tune(TuneArgs),

    /// Show schema and per-column summary of a dataset
    Info {
        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Outcome column name
        #[arg(short, long)]
        outcome: String,

        /// Comma-separated id columns
        #[arg(long, value_delimiter = ',')]
        id_columns: Vec<String>,
    },
}

#[derive(Args)]
pub struct TuneArgs {
    /// Input data file (CSV)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Outcome column name
    #[arg(short, long)]
    pub outcome: String,

    /// Comma-separated id columns, carried through untransformed
    #[arg(long, value_delimiter = ',')]
    pub id_columns: Vec<String>,

    /// Comma-separated metadata columns stripped right after load
    #[arg(long, value_delimiter = ',')]
    pub drop_columns: Vec<String>,

    /// Keep the outcome on its original scale (skip the log transform)
    #[arg(long)]
    pub no_log: bool,

    /// Fraction of rows in the training split
    #[arg(long, default_value = "0.7")]
    pub train_fraction: f64,

    /// Seed behind every random decision in the run
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Cross-validation folds
    #[arg(long, default_value = "3")]
    pub folds: usize,

    /// Metric that ranks grid points (rmse, mae, rsq)
    #[arg(long, default_value = "rmse")]
    pub metric: String,

    /// mtry sweep as min:max:levels, or one fixed value
    #[arg(long, default_value = "5:40:8")]
    pub mtry: String,

    /// Tree-count sweep as min:max:levels, or one fixed value
    #[arg(long, default_value = "500:2500:10")]
    pub trees: String,

    /// min_n sweep as min:max:levels, or one fixed value
    #[arg(long, default_value = "1:10:5")]
    pub min_n: String,

    /// Collapse nominal levels rarer than this proportion (0 disables)
    #[arg(long, default_value = "0.05")]
    pub collapse: f64,

    /// Numeric predictor to Box-Cox transform
    #[arg(long)]
    pub boxcox: Option<String>,

    /// Worker threads for the sweep (0 = one per core)
    #[arg(long, default_value = "0")]
    pub workers: usize,

    /// Selection rule (best, one-std-err, pct-loss)
    #[arg(long, default_value = "best")]
    pub select: String,

    /// Simplicity axis for one-std-err and pct-loss (mtry, trees, min_n)
    #[arg(long, default_value = "trees")]
    pub simplicity: String,

    /// Percent the mean may trail the best under pct-loss
    #[arg(long, default_value = "2.0")]
    pub loss_limit: f64,

    /// Abort the sweep on the first failed cell
    #[arg(long)]
    pub fail_fast: bool,

    /// Most levels a nominal predictor may have before the run aborts
    #[arg(long, default_value = "53")]
    pub max_nominal_levels: usize,

    /// Output directory for artifacts
    #[arg(long, default_value = "treetune-out")]
    pub out_dir: PathBuf,
}

// ─── Argument parsing ──────────────────────────────────────────────────────────

/// Parse "min:max:levels" into a validated range, or a bare integer into a
/// fixed single-value axis.
fn parse_axis(name: &str, text: &str) -> Result<(IntRange, usize)> {
    let invalid = |reason: &str| TreetuneError::InvalidParameter {
        name: name.to_string(),
        value: text.to_string(),
        reason: reason.to_string(),
    };
    let number = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|_| invalid("expected an integer"))
    };

    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [value] => Ok((IntRange::single(number(value)?), 1)),
        [min, max, levels] => {
            let range = IntRange::new(number(min)?, number(max)?)?;
            Ok((range, number(levels)?))
        }
        _ => Err(invalid("expected min:max:levels or one fixed value")),
    }
}

fn parse_rule(select: &str, simplicity: &str, loss_limit: f64) -> Result<SelectionRule> {
    let axis: ParamAxis = simplicity.parse()?;
    let simplicity = Simplicity::new(axis, axis.default_simplicity());

    match select {
        "best" => Ok(SelectionRule::Best),
        "one-std-err" | "one_std_err" | "1se" => Ok(SelectionRule::OneStdErr(simplicity)),
        "pct-loss" | "pct_loss" => Ok(SelectionRule::PctLoss {
            limit: loss_limit,
            simplicity,
        }),
        other => Err(TreetuneError::InvalidParameter {
            name: "select".to_string(),
            value: other.to_string(),
            reason: "expected one of best, one-std-err, pct-loss".to_string(),
        }),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_tune(args: &TuneArgs) -> Result<()> {
    section("Tune");

    let (mtry, mtry_levels) = parse_axis("mtry", &args.mtry)?;
    let (trees, trees_levels) = parse_axis("trees", &args.trees)?;
    let (min_n, min_n_levels) = parse_axis("min_n", &args.min_n)?;

    let mut cfg = RunConfig::new(&args.data, &args.outcome);
    cfg.id_columns = args.id_columns.clone();
    cfg.drop_columns = args.drop_columns.clone();
    cfg.log_outcome = !args.no_log;
    cfg.train_fraction = args.train_fraction;
    cfg.seed = args.seed;
    cfg.folds = args.folds;
    cfg.metric = args.metric.parse::<Metric>()?;
    cfg.grid = GridSpec::new(mtry, trees, min_n);
    cfg.levels = (mtry_levels, trees_levels, min_n_levels);
    cfg.collapse_threshold = (args.collapse > 0.0).then_some(args.collapse);
    cfg.boxcox_column = args.boxcox.clone();
    cfg.workers = args.workers;
    cfg.rule = parse_rule(&args.select, &args.simplicity, args.loss_limit)?;
    cfg.on_error = if args.fail_fast {
        OnCellError::Fail
    } else {
        OnCellError::Exclude
    };
    cfg.max_nominal_levels = args.max_nominal_levels;
    cfg.out_dir = args.out_dir.clone();

    step_run(&format!("Tuning on {}", args.data.display()));
    let start = Instant::now();
    let report = run(&cfg)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!(
        "  {:<16} {}",
        muted("Chosen"),
        report.chosen.to_string().white().bold()
    );
    println!(
        "  {:<16} {}",
        muted(&format!("CV {}", report.metric)),
        format!("{:.4} ± {:.4}", report.cv_mean, report.cv_std_err).white()
    );
    println!(
        "  {:<16} {}",
        muted("Test"),
        format!(
            "rmse {:.4}  mae {:.4}  rsq {:.4}",
            report.test.rmse, report.test.mae, report.test.rsq
        )
        .white()
    );
    println!(
        "  {:<16} {}",
        muted("Split"),
        format!("{} train / {} test", report.n_train, report.n_test).white()
    );

    if !report.top.is_empty() {
        println!();
        println!(
            "  {:<30} {:>10} {:>10} {:>4}",
            muted("Top grid points"),
            muted("mean"),
            muted("std err"),
            muted("n")
        );
        for point in &report.top {
            println!(
                "  {:<30} {:>10.4} {:>10.4} {:>4}",
                point.params.to_string(),
                point.mean,
                point.std_err,
                point.n_completed
            );
        }
    }

    if report.selections.len() > 1 {
        println!();
        println!("  {}", muted("By rule"));
        for choice in &report.selections {
            println!(
                "  {:<16} {}  {}",
                choice.rule,
                choice.params.to_string().white(),
                dim(&format!("{:.4}", choice.cv_mean))
            );
        }
    }

    if !report.importance.is_empty() {
        println!();
        println!("  {}", muted("Leading features"));
        for (name, value) in report.importance.iter().take(5) {
            println!("  {:<30} {}", name, dim(&format!("{:.4}", value)));
        }
    }
    println!();

    if report.n_failures > 0 {
        println!(
            "  {:<16} {}",
            muted("Failures"),
            format!("{} cells; see tune_results.json", report.n_failures).yellow()
        );
    }
    println!(
        "  {:<16} {}",
        muted("Artifacts"),
        report.out_dir.display().to_string().white()
    );
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &PathBuf, outcome: &str, id_columns: &[String]) -> Result<()> {
    section("Data Info");

    step_run("Loading data");
    let df = read_csv(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let ids: Vec<&str> = id_columns.iter().map(String::as_str).collect();
    let schema = Schema::infer(&df, outcome, &ids)?;
    let summaries = summarize(&df, &schema)?;

    println!();
    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!();

    println!(
        "  {:<22} {:<9} {:<10} {:>6} {:>12} {:>8}",
        muted("Column"),
        muted("Kind"),
        muted("Role"),
        muted("Nulls"),
        muted("Mean"),
        muted("Levels")
    );
    println!("  {}", dim(&"─".repeat(72)));

    for s in &summaries {
        let kind = match s.kind {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Nominal => "nominal",
        };
        let role = match s.role {
            Role::Predictor => "predictor",
            Role::Outcome => "outcome",
            Role::Id => "id",
        };
        let mean = s
            .mean
            .map(|m| format!("{:.3}", m))
            .unwrap_or_else(|| "-".to_string());
        let levels = s
            .levels
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<22} {:<9} {:<10} {:>6} {:>12} {:>8}",
            s.name, kind, role, s.nulls, mean, levels
        );
    }

    println!();
    Ok(())
}
