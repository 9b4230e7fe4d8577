//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - ingests or synthesizes a sweep
//! - runs the analysis pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, CompareArgs, FitArgs, ModelArgs, OutputArgs, ReportArgs, SynthArgs};
use crate::data::{SynthConfig, generate_curve};
use crate::domain::{Analysis, DiodeParameters, MeasurementKind, ModelConfiguration, StabilityConfig};
use crate::error::AppError;
use crate::io::{IngestSpec, load_measurement};

pub mod pipeline;

pub use pipeline::{LightDarkAnalysis, analyze, analyze_light_dark};

/// Entry point for the `pvfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Compare(args) => handle_compare(args),
        Command::Report(args) => handle_report(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = config_from_args(&args.model);
    let ingest = load_measurement(&IngestSpec {
        path: args.csv.clone(),
        area_cm2: args.sweep.area,
        temperature_k: args.sweep.temperature,
        kind: args.sweep.kind,
        current_unit: args.sweep.current_unit,
        label: args.sweep.label.clone(),
    })?;
    println!("{}", crate::report::format_ingest_summary(&ingest));

    let analysis = analyze(&ingest.measurement, &config);
    present(&analysis, &args.output)
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let synth = SynthConfig {
        params: DiodeParameters::OneDiode {
            iph: args.iph,
            i0: args.i0,
            n: args.n,
            rs: args.rs,
            rsh: args.rsh,
        },
        area_cm2: args.area,
        temperature_k: args.temperature,
        points: args.points,
        v_min: args.v_min,
        v_max: args.v_max,
        noise: args.synth_noise,
        seed: args.synth_seed,
    };
    let measurement = generate_curve(&synth)?;

    if let Some(path) = &args.out {
        crate::io::write_sweep_csv(path, &measurement)?;
        println!("Wrote {} samples to {}", measurement.len(), path.display());
    }
    if !args.fit {
        if args.out.is_none() {
            for (v, i) in measurement.voltage.iter().zip(&measurement.current) {
                println!("{v:.6},{i:.9e}");
            }
        }
        return Ok(());
    }

    let analysis = analyze(&measurement, &config_from_args(&args.model));
    present(&analysis, &args.output)
}

fn handle_compare(args: CompareArgs) -> Result<(), AppError> {
    let config = config_from_args(&args.model);
    let load = |path: &std::path::Path, kind| {
        load_measurement(&IngestSpec {
            area_cm2: args.area,
            temperature_k: args.temperature,
            kind,
            ..IngestSpec::new(path)
        })
    };
    let light = load(&args.light, MeasurementKind::Illuminated)?;
    let dark = load(&args.dark, MeasurementKind::Dark)?;

    let result = analyze_light_dark(&light.measurement, &dark.measurement, &config);
    println!("{}", crate::report::format_one_line(&result.light.fit));
    println!("{}", crate::report::format_one_line(&result.dark.fit));

    let Some(cmp) = &result.comparison else {
        return Err(AppError::new(4, "Light/dark comparison needs fitted parameters for both sweeps."));
    };
    println!(
        "\nn_light={:.3} ({}) | n_dark={:.3} ({}) | Δn={:+.3}",
        cmp.n_light,
        cmp.light_mechanism.description(),
        cmp.n_dark,
        cmp.dark_mechanism.description(),
        cmp.delta_n
    );
    println!(
        "dark: J0={:.3e} mA/cm² | Rs={:.3} Ω·cm² | Rsh={:.3e} Ω·cm²",
        cmp.dark_j0_ma_cm2, cmp.dark_rs_ohm_cm2, cmp.dark_rsh_ohm_cm2
    );
    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<(), AppError> {
    let file = crate::io::read_result_json(&args.result)?;
    println!("Result written by {} {} at {}", file.tool, file.version, file.generated_at.to_rfc3339());
    println!("{}", crate::report::format_analysis(&file.analysis));
    Ok(())
}

/// Print, plot and export one analysis; a non-valid result exits with code 4.
fn present(analysis: &Analysis, output: &OutputArgs) -> Result<(), AppError> {
    println!("{}", crate::report::format_analysis(analysis));

    if output.plot && !analysis.fit.voltage.is_empty() {
        println!("{}", crate::plot::render_iv_plot(&analysis.fit, output.width, output.height));
    }
    if let Some(path) = &output.export {
        crate::io::write_result_json(path, analysis)?;
    }
    if let Some(path) = &output.export_curve {
        crate::io::write_curve_csv(path, &analysis.fit)?;
    }

    if analysis.fit.is_valid() {
        Ok(())
    } else {
        Err(AppError::new(
            4,
            format!(
                "Analysis of '{}' did not produce a valid result: {}",
                analysis.fit.device_label,
                analysis.fit.message.as_deref().unwrap_or("unknown reason")
            ),
        ))
    }
}

pub fn config_from_args(args: &ModelArgs) -> ModelConfiguration {
    let mut config = ModelConfiguration::new(args.model, args.mode);
    config.seed = args.seed;
    config.weighting = args.weighting;
    config.irradiance_mw_cm2 = args.irradiance;
    config.stability = StabilityConfig {
        trials: args.trials,
        noise_level: args.noise,
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::{AnalysisMode, ModelKind};

    #[test]
    fn config_from_args_maps_every_field() {
        let cli = Cli::try_parse_from([
            "pvfit", "fit", "--csv", "x.csv", "--mode", "reference", "--seed", "9", "--trials", "3",
            "--noise", "0.01", "--irradiance", "80",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = config_from_args(&args.model);
        assert_eq!(config.mode, AnalysisMode::Reference);
        assert_eq!(config.model, ModelKind::OneDiode);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.stability.trials, Some(3));
        assert_eq!(config.stability.noise_level, 0.01);
        assert_eq!(config.irradiance_mw_cm2, 80.0);
    }
}
