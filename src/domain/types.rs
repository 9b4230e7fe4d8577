//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON (the result field set is the transport contract)
//! - hashed through a canonical serialization for reproducibility audits

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Temperature assumed when a measurement does not carry one (25 °C).
pub const DEFAULT_TEMPERATURE_K: f64 = 298.15;

/// Seed used by the stochastic search unless the configuration overrides it.
pub const DEFAULT_SEED: u64 = 42;

/// One-sun reference irradiance (mW/cm²).
pub const ONE_SUN_MW_CM2: f64 = 100.0;

/// What the sweep was recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Illuminated,
    Dark,
    /// Open-circuit voltage versus irradiance, supplied as a pseudo IV curve.
    SunsVoc,
}

impl MeasurementKind {
    pub fn is_dark(self) -> bool {
        self == MeasurementKind::Dark
    }
}

/// Unit of the current column as declared by the caller.
///
/// Internally everything is in amps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CurrentUnit {
    /// Infer the unit from the magnitude of the peak current density.
    ///
    /// Heuristic (deterministic):
    /// - `max|I| / area <= 1` → amps
    /// - `<= 1000` → milliamps
    /// - otherwise → microamps
    Auto,
    Amps,
    Milliamps,
    Microamps,
}

impl CurrentUnit {
    /// Multiplicative scale to amps, or `None` for `Auto`.
    pub fn scale_to_amps(self) -> Option<f64> {
        match self {
            CurrentUnit::Auto => None,
            CurrentUnit::Amps => Some(1.0),
            CurrentUnit::Milliamps => Some(1e-3),
            CurrentUnit::Microamps => Some(1e-6),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CurrentUnit::Auto => "auto",
            CurrentUnit::Amps => "A",
            CurrentUnit::Milliamps => "mA",
            CurrentUnit::Microamps => "uA",
        }
    }

    /// Parse a unit suffix such as `mA`, `µA` or `A`.
    pub fn from_suffix(s: &str) -> Option<CurrentUnit> {
        match s.trim().to_lowercase().as_str() {
            "a" | "amp" | "amps" => Some(CurrentUnit::Amps),
            "ma" => Some(CurrentUnit::Milliamps),
            "ua" | "µa" | "μa" => Some(CurrentUnit::Microamps),
            _ => None,
        }
    }
}

/// A raw IV sweep as handed over by the calling layer.
///
/// The core only ever borrows a measurement; it is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub device_label: String,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub area_cm2: f64,
    /// Cell temperature in kelvin, if recorded.
    pub temperature_k: Option<f64>,
    pub kind: MeasurementKind,
    pub current_unit: CurrentUnit,
    /// SHA-256 (hex) of the raw bytes the samples were extracted from.
    pub fingerprint: String,
}

impl Measurement {
    /// Create an illuminated, 1 cm² measurement in auto-detected units.
    ///
    /// The fingerprint is computed over the sample bit patterns; callers that
    /// hold the original file bytes should override it with
    /// [`Measurement::with_fingerprint`].
    pub fn new(device_label: impl Into<String>, voltage: Vec<f64>, current: Vec<f64>) -> Self {
        let fingerprint = crate::determinism::fingerprint_samples(&voltage, &current);
        Self {
            device_label: device_label.into(),
            voltage,
            current,
            area_cm2: 1.0,
            temperature_k: None,
            kind: MeasurementKind::Illuminated,
            current_unit: CurrentUnit::Auto,
            fingerprint,
        }
    }

    pub fn with_area(mut self, area_cm2: f64) -> Self {
        self.area_cm2 = area_cm2;
        self
    }

    pub fn with_temperature(mut self, temperature_k: f64) -> Self {
        self.temperature_k = Some(temperature_k);
        self
    }

    pub fn with_kind(mut self, kind: MeasurementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_current_unit(mut self, unit: CurrentUnit) -> Self {
        self.current_unit = unit;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Temperature used for the thermal voltage.
    pub fn temperature_or_default(&self) -> f64 {
        self.temperature_k.unwrap_or(DEFAULT_TEMPERATURE_K)
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}

/// Equivalent-circuit variant to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    OneDiode,
    TwoDiode,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::OneDiode => "one-diode",
            ModelKind::TwoDiode => "two-diode",
        }
    }

    /// Number of physical parameters (including `Iph`).
    pub fn param_count(self) -> usize {
        match self {
            ModelKind::OneDiode => 5,
            ModelKind::TwoDiode => 7,
        }
    }
}

/// Speed/reproducibility trade-off for an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Relaxed tolerances and smaller budgets; hashes are informational.
    Exploration,
    /// Fixed seed, tight tolerances, single-threaded reductions.
    Reference,
}

/// How observations are weighted in the fit objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveWeighting {
    Uniform,
    /// Down-weight samples where the measured curve is steep (the exponential
    /// knee near Voc), so the flat photocurrent region is not swamped.
    KneeDeemphasis,
}

/// Search hypercube for the optimizers, in device units (A, Ω).
///
/// Saturation currents and `Rsh` are searched in log10 space, so their lower
/// bounds must be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub iph: (f64, f64),
    pub i0: (f64, f64),
    pub n: (f64, f64),
    /// Second-diode saturation current (two-diode only).
    pub i02: (f64, f64),
    /// Second-diode ideality (two-diode only).
    pub n2: (f64, f64),
    pub rs: (f64, f64),
    pub rsh: (f64, f64),
}

impl ParameterBounds {
    pub fn one_diode() -> Self {
        Self {
            iph: (1e-6, 2.0),
            i0: (1e-18, 1e-3),
            n: (0.5, 5.0),
            i02: (1e-18, 1e-3),
            n2: (1.0, 7.0),
            rs: (0.0, 1000.0),
            rsh: (1.0, 1e9),
        }
    }

    pub fn two_diode() -> Self {
        Self {
            iph: (0.0, 2.0),
            i0: (1e-18, 1e-3),
            n: (0.5, 3.0),
            i02: (1e-18, 1e-3),
            n2: (1.0, 7.0),
            rs: (0.0, 1000.0),
            rsh: (1.0, 1e9),
        }
    }

    pub fn for_model(model: ModelKind) -> Self {
        match model {
            ModelKind::OneDiode => Self::one_diode(),
            ModelKind::TwoDiode => Self::two_diode(),
        }
    }
}

/// Plausibility table a converged fit must satisfy to be reported as valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalBounds {
    /// Allowed one-diode ideality factor range (inclusive).
    pub ideality: (f64, f64),
    /// Allowed range for both ideality factors of the two-diode model.
    pub ideality_two_diode: (f64, f64),
    /// Fill factors at or above this are rejected.
    pub fill_factor_max: f64,
    /// Efficiencies above this (percent) are rejected.
    pub pce_max: f64,
}

impl Default for PhysicalBounds {
    fn default() -> Self {
        Self {
            ideality: (0.8, 2.5),
            ideality_two_diode: (0.5, 7.0),
            fill_factor_max: 0.95,
            pce_max: 100.0,
        }
    }
}

/// Table the boundary-stress diagnostic compares fitted values against.
///
/// Resistances are area-normalized (Ω·cm²).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryTable {
    pub n: (f64, f64),
    pub rs_ohm_cm2: (f64, f64),
    pub rsh_ohm_cm2: (f64, f64),
    pub fill_factor: (f64, f64),
}

impl Default for BoundaryTable {
    fn default() -> Self {
        Self {
            n: (0.8, 2.5),
            rs_ohm_cm2: (0.0, 1000.0),
            rsh_ohm_cm2: (1.0, 1e9),
            fill_factor: (0.0, 0.9),
        }
    }
}

/// Noise-stability diagnostic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Number of perturbed refits; `None` uses the mode default.
    pub trials: Option<usize>,
    /// Relative Gaussian noise level applied per sample (`σ_i = level·|I_i|`).
    pub noise_level: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            trials: None,
            noise_level: 0.02,
        }
    }
}

/// Weights of the aggregate risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub residual: f64,
    pub stability: f64,
    pub boundary: f64,
    /// `validation_passed` requires the risk score to be below this.
    pub pass_threshold: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            residual: 1.0,
            stability: 1.0,
            boundary: 1.0,
            pass_threshold: 50.0,
        }
    }
}

/// Solver budgets and tolerances.
///
/// Normally resolved from the analysis mode (see `determinism::ModeProfile`);
/// a configuration may pin its own values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Population size multiplier (members = popsize × dimension).
    pub de_popsize: usize,
    pub de_max_generations: usize,
    /// Relative spread of population energies at which the search stops.
    pub de_tol: f64,
    /// Dithering range of the mutation factor.
    pub de_mutation: (f64, f64),
    pub de_recombination: f64,
    pub lm_xtol: f64,
    pub lm_ftol: f64,
    pub lm_gtol: f64,
    pub lm_max_iterations: usize,
    /// Whether independent evaluations may run on the rayon pool.
    pub parallel: bool,
}

/// Everything that parameterizes one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub model: ModelKind,
    pub mode: AnalysisMode,
    pub bounds: ParameterBounds,
    pub physical: PhysicalBounds,
    /// Overrides of the mode's tolerance profile.
    pub tolerances: Option<Tolerances>,
    /// Seed for every stochastic step; `None` means [`DEFAULT_SEED`].
    pub seed: Option<u64>,
    pub weighting: ObjectiveWeighting,
    /// Incident power density Pin (mW/cm²).
    pub irradiance_mw_cm2: f64,
    pub stability: StabilityConfig,
    pub boundary: BoundaryTable,
    /// Relative margin around a bound that counts as a boundary hit.
    pub boundary_margin: f64,
    pub risk: RiskWeights,
}

impl ModelConfiguration {
    pub fn new(model: ModelKind, mode: AnalysisMode) -> Self {
        Self {
            model,
            mode,
            bounds: ParameterBounds::for_model(model),
            physical: PhysicalBounds::default(),
            tolerances: None,
            seed: None,
            weighting: ObjectiveWeighting::Uniform,
            irradiance_mw_cm2: ONE_SUN_MW_CM2,
            stability: StabilityConfig::default(),
            boundary: BoundaryTable::default(),
            boundary_margin: 0.10,
            risk: RiskWeights::default(),
        }
    }

    pub fn reference(model: ModelKind) -> Self {
        Self::new(model, AnalysisMode::Reference)
    }

    pub fn exploration(model: ModelKind) -> Self {
        Self::new(model, AnalysisMode::Exploration)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stability_trials(mut self, trials: usize) -> Self {
        self.stability.trials = Some(trials);
        self
    }

    pub fn with_noise_level(mut self, level: f64) -> Self {
        self.stability.noise_level = level;
        self
    }

    pub fn seed_or_default(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        Self::new(ModelKind::OneDiode, AnalysisMode::Exploration)
    }
}

/// Model parameters in device units (A, Ω), tagged by circuit variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DiodeParameters {
    OneDiode {
        iph: f64,
        i0: f64,
        n: f64,
        rs: f64,
        rsh: f64,
    },
    TwoDiode {
        iph: f64,
        i01: f64,
        n1: f64,
        i02: f64,
        n2: f64,
        rs: f64,
        rsh: f64,
    },
}

impl DiodeParameters {
    pub fn kind(&self) -> ModelKind {
        match self {
            DiodeParameters::OneDiode { .. } => ModelKind::OneDiode,
            DiodeParameters::TwoDiode { .. } => ModelKind::TwoDiode,
        }
    }

    pub fn iph(&self) -> f64 {
        match *self {
            DiodeParameters::OneDiode { iph, .. } | DiodeParameters::TwoDiode { iph, .. } => iph,
        }
    }

    /// Saturation current of the (first) diode.
    pub fn i0(&self) -> f64 {
        match *self {
            DiodeParameters::OneDiode { i0, .. } => i0,
            DiodeParameters::TwoDiode { i01, .. } => i01,
        }
    }

    /// Ideality factor of the (first) diode.
    pub fn n(&self) -> f64 {
        match *self {
            DiodeParameters::OneDiode { n, .. } => n,
            DiodeParameters::TwoDiode { n1, .. } => n1,
        }
    }

    pub fn rs(&self) -> f64 {
        match *self {
            DiodeParameters::OneDiode { rs, .. } | DiodeParameters::TwoDiode { rs, .. } => rs,
        }
    }

    pub fn rsh(&self) -> f64 {
        match *self {
            DiodeParameters::OneDiode { rsh, .. } | DiodeParameters::TwoDiode { rsh, .. } => rsh,
        }
    }

    /// Parameter values in canonical order (see [`DiodeParameters::names`]).
    pub fn values(&self) -> Vec<f64> {
        match *self {
            DiodeParameters::OneDiode { iph, i0, n, rs, rsh } => vec![iph, i0, n, rs, rsh],
            DiodeParameters::TwoDiode {
                iph,
                i01,
                n1,
                i02,
                n2,
                rs,
                rsh,
            } => vec![iph, i01, n1, i02, n2, rs, rsh],
        }
    }

    pub fn names(kind: ModelKind) -> &'static [&'static str] {
        match kind {
            ModelKind::OneDiode => &["iph", "i0", "n", "rs", "rsh"],
            ModelKind::TwoDiode => &["iph", "i01", "n1", "i02", "n2", "rs", "rsh"],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}

/// Fitted parameters with their area-normalized counterparts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameters {
    /// Device-level values used to re-evaluate the model.
    pub device: DiodeParameters,
    pub area_cm2: f64,
    pub jph_ma_cm2: f64,
    pub j0_ma_cm2: f64,
    pub n: f64,
    pub j02_ma_cm2: Option<f64>,
    pub n2: Option<f64>,
    pub rs_ohm_cm2: f64,
    pub rsh_ohm_cm2: f64,
}

impl FittedParameters {
    pub fn from_device(device: DiodeParameters, area_cm2: f64) -> Self {
        let per_area = 1000.0 / area_cm2;
        let (j02_ma_cm2, n2) = match device {
            DiodeParameters::OneDiode { .. } => (None, None),
            DiodeParameters::TwoDiode { i02, n2, .. } => (Some(i02 * per_area), Some(n2)),
        };
        Self {
            device,
            area_cm2,
            jph_ma_cm2: device.iph() * per_area,
            j0_ma_cm2: device.i0() * per_area,
            n: device.n(),
            j02_ma_cm2,
            n2,
            rs_ohm_cm2: device.rs() * area_cm2,
            rsh_ohm_cm2: device.rsh() * area_cm2,
        }
    }
}

/// Light-curve figures of merit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Short-circuit current density (mA/cm²).
    pub jsc_ma_cm2: f64,
    /// Open-circuit voltage (V).
    pub voc_v: f64,
    pub fill_factor: f64,
    /// Power conversion efficiency (%).
    pub pce_percent: f64,
    /// Maximum power (W).
    pub pmax_w: f64,
    pub vmpp_v: f64,
    pub impp_a: f64,
    /// Incident power density used for PCE (mW/cm²).
    pub pin_mw_cm2: f64,
}

/// Overall outcome of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStatus {
    Valid,
    Invalid,
    Failed,
}

/// Why the local refiner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    StepSize,
    ObjectiveChange,
    Gradient,
    /// Residuals reached the floating-point floor.
    ExactFit,
    IterationBudget,
    NonFinite,
}

impl Termination {
    pub fn converged(self) -> bool {
        !matches!(self, Termination::IterationBudget | Termination::NonFinite)
    }
}

/// Bookkeeping of the two optimizer stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSummary {
    pub global_objective: f64,
    pub global_generations: usize,
    pub iterations: usize,
    pub termination: Termination,
    pub sse: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSensitivity {
    pub parameter: String,
    /// ∂I/∂p at the maximum-power voltage (A per parameter unit).
    pub d_current: f64,
}

/// Local sensitivity of the fitted curve at the maximum-power point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MppSensitivity {
    pub voltage_v: f64,
    pub d_current: Vec<ParameterSensitivity>,
    /// ∂PCE/∂Rs (% per Ω); physically never positive.
    pub d_pce_d_rs: f64,
}

/// What the preconditioner did to the raw samples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreconditionNotes {
    pub sign_flipped: bool,
    pub current_scale: f64,
    pub unit_inferred: bool,
    pub reversed: bool,
    pub duplicates_merged: usize,
    pub notes: Vec<String>,
}

/// Fit outcome for one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub status: FitStatus,
    pub message: Option<String>,
    /// Error taxonomy name when the status is not valid.
    pub error_kind: Option<String>,
    pub device_label: String,
    pub model: ModelKind,
    pub mode: AnalysisMode,
    pub measurement_kind: MeasurementKind,
    pub temperature_k: f64,
    pub parameters: Option<FittedParameters>,
    /// Best global-search candidate, kept as context when refinement failed.
    pub global_candidate: Option<DiodeParameters>,
    /// Preconditioned voltage (V), ascending.
    pub voltage: Vec<f64>,
    /// Preconditioned current (A), generator convention.
    pub current: Vec<f64>,
    pub modeled_current: Vec<f64>,
    pub residuals: Vec<f64>,
    pub metrics: Option<DerivedMetrics>,
    pub refinement: Option<RefinementSummary>,
    pub sensitivity: Option<MppSensitivity>,
    pub preconditioning: Option<PreconditionNotes>,
    pub hash: String,
    /// True when the hash is guaranteed reproducible (reference mode).
    pub hash_stable: bool,
}

impl FitResult {
    pub fn is_valid(&self) -> bool {
        self.status == FitStatus::Valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualPattern {
    Random,
    LinearTrend,
    SystematicCurvature,
    SShaped,
}

impl ResidualPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            ResidualPattern::Random => "random",
            ResidualPattern::LinearTrend => "linear_trend",
            ResidualPattern::SystematicCurvature => "systematic_curvature",
            ResidualPattern::SShaped => "s_shaped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WarningLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl WarningLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningLevel::Low => "LOW",
            WarningLevel::Medium => "MEDIUM",
            WarningLevel::High => "HIGH",
            WarningLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualAnalysis {
    pub pattern: ResidualPattern,
    pub warning: WarningLevel,
    pub message: String,
    pub rms: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub quadratic_strength: f64,
    pub cubic_strength: f64,
    /// Wald–Wolfowitz z score of residual sign runs (negative = clustered).
    pub runs_z: f64,
    /// Confidence in the classification, 0–100.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDrift {
    pub parameter: String,
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub stable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseStability {
    pub noise_level: f64,
    pub trials: usize,
    pub failed_trials: usize,
    pub drifts: Vec<ParameterDrift>,
    /// 0–100, higher is more robust.
    pub stability_score: f64,
    pub worst_case_drift: f64,
    pub stable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundDirection {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryHit {
    pub parameter: String,
    pub value: f64,
    pub bound: f64,
    pub direction: BoundDirection,
    pub distance_percent: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryStress {
    pub hits: Vec<BoundaryHit>,
    pub recommendations: Vec<String>,
}

/// Physics cross-checks that do not feed the fit itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsInsight {
    pub ideality_from_slope: Option<f64>,
    pub recombination: String,
    /// Ideal-diode fill factor for the measured Voc and fitted n.
    pub ideal_fill_factor: Option<f64>,
}

/// Trustworthiness assessment of a finished fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub residuals: Option<ResidualAnalysis>,
    pub noise_stability: Option<NoiseStability>,
    pub boundary_stress: Option<BoundaryStress>,
    pub physics: Option<PhysicsInsight>,
    /// 0–100, higher is riskier.
    pub risk_score: f64,
    pub validation_passed: bool,
    pub recommendations: Vec<String>,
}

/// Everything `analyze` hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub fit: FitResult,
    pub diagnostics: DiagnosticReport,
}
