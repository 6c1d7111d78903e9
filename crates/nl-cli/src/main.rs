//! NormLik CLI

mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nl_core::traits::LogDensityModel;
use nl_inference::{MaximumLikelihoodEstimator, NormalModel, profile, sdreport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "normlik")]
#[command(about = "NormLik - maximum-likelihood fitting of a normal model")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform MLE fit
    Fit {
        /// Input model JSON (`data.y_i`, optional `parameters`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optimizer config JSON (`max_iter`, `tol`, `m`)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Confidence level for reported intervals
        #[arg(long, default_value = "0.95")]
        level: f64,

        /// Threads (0 = auto). Use 1 for deterministic summation order.
        #[arg(long, default_value = "1")]
        threads: usize,
    },

    /// Evaluate the objective and its gradient at a point
    Eval {
        /// Input model JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Mean
        #[arg(long, allow_hyphen_values = true)]
        mean: f64,

        /// Log standard deviation
        #[arg(long, allow_hyphen_values = true)]
        log_sd: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Profile likelihood scan over the mean
    Profile {
        /// Input model JSON
        #[arg(short, long)]
        input: PathBuf,

        /// First scanned mean
        #[arg(long, allow_hyphen_values = true)]
        start: f64,

        /// Last scanned mean
        #[arg(long, allow_hyphen_values = true)]
        stop: f64,

        /// Number of points (>= 2)
        #[arg(long, default_value = "21")]
        points: usize,

        /// Optimizer config JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Confidence level for the profile interval
        #[arg(long, default_value = "0.95")]
        level: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Use 1 for deterministic summation order.
        #[arg(long, default_value = "1")]
        threads: usize,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fit { input, output, config, level, threads } => {
            cmd_fit(&input, output.as_ref(), config.as_ref(), level, threads)
        }
        Commands::Eval { input, mean, log_sd, output } => {
            cmd_eval(&input, mean, log_sd, output.as_ref())
        }
        Commands::Profile { input, start, stop, points, config, level, output, threads } => {
            let grid = (start, stop, points);
            cmd_profile(&input, grid, config.as_ref(), level, output.as_ref(), threads)
        }
        Commands::Version => {
            println!("normlik {}", nl_core::VERSION);
            Ok(())
        }
    }
}

fn setup_threads(threads: usize) -> bool {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }
    threads != 1
}

fn cmd_fit(
    input: &PathBuf,
    output: Option<&PathBuf>,
    config: Option<&PathBuf>,
    level: f64,
    threads: usize,
) -> Result<()> {
    let parallel = setup_threads(threads);
    let model = input::load_model(input, parallel)?;
    let config = input::load_config(config.map(|p| p.as_path()))?;

    if model.n_obs() > 0 && model.closed_form_mle().is_none() {
        anyhow::bail!("observations have zero variance: the likelihood has no maximum");
    }

    let mle = MaximumLikelihoodEstimator::with_config(config);
    let result = mle.fit(&model)?;
    tracing::info!(nll = result.nll, converged = result.converged, "fit complete");

    let report = match result.covariance {
        Some(_) => Some(sdreport(&result, &NormalModel::derived_quantities(), level)?),
        None => {
            tracing::warn!("no covariance available; skipping sd report");
            None
        }
    };
    let [mean, sd] = NormalModel::natural_scale(&result.parameters)?;

    let output_json = serde_json::json!({
        "parameter_names": model.parameter_names(),
        "bestfit": result.parameters,
        "uncertainties": result.uncertainties,
        "covariance": result.covariance,
        "natural": { "mean": mean, "sd": sd },
        "sdreport": report,
        "nll": result.nll,
        "twice_nll": 2.0 * result.nll,
        "converged": result.converged,
        "n_obs": model.n_obs(),
        "n_iter": result.n_iter,
        "n_fev": result.n_fev,
        "n_gev": result.n_gev,
        "message": result.message,
        "warnings": result.warnings,
    });

    write_json(output, output_json)
}

fn cmd_eval(input: &PathBuf, mean: f64, log_sd: f64, output: Option<&PathBuf>) -> Result<()> {
    let model = input::load_model(input, false)?;
    let (nll, grad) = nl_inference::evaluate_with_grad(model.observations(), mean, log_sd);
    tracing::debug!(nll, ?grad, "objective evaluated");

    let output_json = serde_json::json!({
        "parameter_names": model.parameter_names(),
        "parameters": [mean, log_sd],
        "sd": NormalModel::sd(log_sd),
        "nll": nll,
        "gradient": grad,
    });

    write_json(output, output_json)
}

fn cmd_profile(
    input: &PathBuf,
    (start, stop, points): (f64, f64, usize),
    config: Option<&PathBuf>,
    level: f64,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    if points < 2 {
        anyhow::bail!("points must be >= 2");
    }
    let parallel = setup_threads(threads);
    let model = input::load_model(input, parallel)?;
    if model.closed_form_mle().is_none() {
        anyhow::bail!("profile needs at least two distinct observations");
    }
    let config = input::load_config(config.map(|p| p.as_path()))?;
    let mle = MaximumLikelihoodEstimator::with_config(config);

    let values = profile::linspace(start, stop, points);
    let scan = profile::scan(&mle, &model, 0, &values)?;
    let interval = scan.interval(level)?;
    tracing::info!(hat = scan.hat, ?interval, "profile complete");

    let output_json = serde_json::json!({
        "parameter": scan.name,
        "hat": scan.hat,
        "nll_hat": scan.nll_hat,
        "level": level,
        "interval": interval.map(|(lo, hi)| [lo, hi]),
        "points": scan.points,
    });

    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
