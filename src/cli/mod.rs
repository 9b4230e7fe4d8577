//! Command-line parsing for the IV-curve fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code; `app` turns these structs into a `ModelConfiguration`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{AnalysisMode, CurrentUnit, MeasurementKind, ModelKind, ObjectiveWeighting};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pvfit", version, about = "Photovoltaic IV-curve parameter extraction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a measured IV sweep from CSV, print diagnostics and optionally export.
    Fit(FitArgs),
    /// Generate a synthetic diode curve, optionally fitting it right away.
    Synth(SynthArgs),
    /// Fit a light and a dark sweep of the same device and compare them.
    Compare(CompareArgs),
    /// Print the summary of a previously exported result JSON.
    Report(ReportArgs),
}

/// Model and solver options shared by every fitting command.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Equivalent-circuit model.
    #[arg(long, value_enum, default_value_t = ModelKind::OneDiode)]
    pub model: ModelKind,

    /// `exploration` is fast; `reference` is slow, single-threaded and hash-stable.
    #[arg(long, value_enum, default_value_t = AnalysisMode::Exploration)]
    pub mode: AnalysisMode,

    /// Optimizer seed (defaults to 42; reference mode always uses 42).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Residual weighting of the objective.
    #[arg(long, value_enum, default_value_t = ObjectiveWeighting::Uniform)]
    pub weighting: ObjectiveWeighting,

    /// Incident power density (mW/cm²).
    #[arg(long, default_value_t = 100.0)]
    pub irradiance: f64,

    /// Noise-stability trials (defaults to 10 in exploration, 20 in reference; 0 disables).
    #[arg(long)]
    pub trials: Option<usize>,

    /// Relative noise level of the stability trials.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,
}

/// Options for `pvfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// IV sweep CSV (voltage and current columns).
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    #[command(flatten)]
    pub sweep: SweepArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// How to read a sweep file.
#[derive(Debug, Args, Clone)]
pub struct SweepArgs {
    /// Device area (cm²).
    #[arg(long, default_value_t = 1.0)]
    pub area: f64,

    /// Cell temperature (K); 298.15 when omitted.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Measurement kind.
    #[arg(long, value_enum, default_value_t = MeasurementKind::Illuminated)]
    pub kind: MeasurementKind,

    /// Unit of the current column; `auto` uses the header or magnitude.
    #[arg(long = "current-unit", value_enum, default_value_t = CurrentUnit::Auto)]
    pub current_unit: CurrentUnit,

    /// Device label (defaults to the file stem).
    #[arg(long)]
    pub label: Option<String>,
}

/// Terminal plot and export options.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Render an ASCII plot of measured and fitted current.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export the full analysis to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export measured/fitted/residual current to CSV.
    #[arg(long = "export-curve", value_name = "CSV")]
    pub export_curve: Option<PathBuf>,
}

/// Options for `pvfit synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Photocurrent (A).
    #[arg(long, default_value_t = 0.030)]
    pub iph: f64,

    /// Saturation current (A).
    #[arg(long, default_value_t = 1e-10)]
    pub i0: f64,

    /// Ideality factor.
    #[arg(long, default_value_t = 1.1)]
    pub n: f64,

    /// Series resistance (Ω).
    #[arg(long, default_value_t = 0.5)]
    pub rs: f64,

    /// Shunt resistance (Ω).
    #[arg(long, default_value_t = 2000.0)]
    pub rsh: f64,

    /// Device area (cm²).
    #[arg(long, default_value_t = 1.0)]
    pub area: f64,

    /// Cell temperature (K).
    #[arg(long, default_value_t = 298.15)]
    pub temperature: f64,

    /// Number of sweep points.
    #[arg(long, default_value_t = 61)]
    pub points: usize,

    #[arg(long = "v-min", default_value_t = -0.1, allow_hyphen_values = true)]
    pub v_min: f64,

    #[arg(long = "v-max", default_value_t = 0.60)]
    pub v_max: f64,

    /// Relative Gaussian noise on the current (0 = noise-free).
    #[arg(long = "synth-noise", default_value_t = 0.0)]
    pub synth_noise: f64,

    /// Seed of the synthetic noise.
    #[arg(long = "synth-seed", default_value_t = 7)]
    pub synth_seed: u64,

    /// Write the synthetic sweep to CSV.
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,

    /// Fit the generated curve.
    #[arg(long)]
    pub fit: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for `pvfit compare`.
#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    /// Illuminated sweep CSV.
    #[arg(long, value_name = "CSV")]
    pub light: PathBuf,

    /// Dark sweep CSV.
    #[arg(long, value_name = "CSV")]
    pub dark: PathBuf,

    /// Device area (cm²).
    #[arg(long, default_value_t = 1.0)]
    pub area: f64,

    /// Cell temperature (K); 298.15 when omitted.
    #[arg(long)]
    pub temperature: Option<f64>,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Options for `pvfit report`.
#[derive(Debug, Args, Clone)]
pub struct ReportArgs {
    /// Result JSON written by `pvfit fit --export`.
    #[arg(long, value_name = "JSON")]
    pub result: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_command_parses_flattened_groups() {
        let cli = Cli::try_parse_from([
            "pvfit", "fit", "--csv", "cell.csv", "--area", "0.25", "--mode", "reference", "--model",
            "two-diode", "--kind", "dark", "--trials", "0", "--plot",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.sweep.area, 0.25);
        assert_eq!(args.sweep.kind, MeasurementKind::Dark);
        assert_eq!(args.model.mode, AnalysisMode::Reference);
        assert_eq!(args.model.model, ModelKind::TwoDiode);
        assert_eq!(args.model.trials, Some(0));
        assert!(args.output.plot);
    }

    #[test]
    fn synth_defaults_are_the_reference_cell() {
        let cli = Cli::try_parse_from(["pvfit", "synth", "--v-min", "-0.2"]).unwrap();
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.iph, 0.030);
        assert_eq!(args.v_min, -0.2);
        assert!(!args.fit);
    }
}
