use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use perf_curve::{
    PredictionInputs, PredictionResult, QueryShape, Registry, SampleDataset, SamplePoint,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod plot;
mod weather;

use plot::{render_chart_guard, ChartData, ChartKind};

// Fallback polyline resolution when a dataset sets no chart step.
const DEFAULT_CHART_STEPS: f64 = 200.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aircraft performance chart prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict one metric for an observation
    Predict(PredictArgs),
    /// Evaluate every metric for one observation and write a CSV table
    Report(ReportArgs),
    /// Export a chart's samples and traced curves, optionally as a plot
    Chart(ChartArgs),
    /// Validate and list the available datasets
    Datasets(DatasetsArgs),
}

#[derive(Args, Debug)]
struct RegistryArgs {
    /// Extra dataset JSON file to load next to the built-in charts (repeatable)
    #[arg(long = "dataset", value_hint = ValueHint::FilePath)]
    datasets: Vec<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug, Default)]
struct ObservationArgs {
    /// Outside air temperature (°C)
    #[arg(long, allow_negative_numbers = true)]
    temperature: Option<f64>,

    /// Pressure altitude (ft); derived from --qnh/--elevation when omitted
    #[arg(long, allow_negative_numbers = true)]
    pressure_altitude: Option<f64>,

    /// Headwind component (kt)
    #[arg(long)]
    wind_speed: Option<f64>,

    /// Dropdown height (ft)
    #[arg(long)]
    dropdown: Option<f64>,

    /// ISA deviation (°C); derived from temperature and pressure altitude when omitted
    #[arg(long, allow_negative_numbers = true)]
    isa_deviation: Option<f64>,

    /// Aircraft weight (kg)
    #[arg(long)]
    weight: Option<f64>,

    /// Altimeter setting (hPa)
    #[arg(long, requires = "elevation")]
    qnh: Option<f64>,

    /// Field elevation (ft)
    #[arg(long, requires = "qnh", allow_negative_numbers = true)]
    elevation: Option<f64>,
}

impl ObservationArgs {
    /// Inputs as given, with pressure altitude and ISA deviation filled in
    /// from the weather when not supplied explicitly.
    fn inputs(&self) -> PredictionInputs {
        let pressure_altitude = self
            .pressure_altitude
            .or_else(|| match (self.qnh, self.elevation) {
                (Some(qnh), Some(elevation)) => Some(weather::pressure_altitude(qnh, elevation)),
                _ => None,
            });
        let isa_deviation =
            self.isa_deviation
                .or_else(|| match (self.temperature, pressure_altitude) {
                    (Some(t), Some(zp)) => Some(weather::isa_deviation(t, zp)),
                    _ => None,
                });
        PredictionInputs {
            temperature: self.temperature,
            pressure_altitude,
            wind_speed: self.wind_speed,
            dropdown_height: self.dropdown,
            isa_deviation,
            weight: self.weight,
        }
    }
}

#[derive(Parser, Debug)]
struct PredictArgs {
    /// Metric (dataset) id, e.g. mtow
    #[arg(short, long)]
    metric: String,

    #[command(flatten)]
    observation: ObservationArgs,

    /// Print the result as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    #[command(flatten)]
    registry: RegistryArgs,
}

#[derive(Parser, Debug)]
struct ReportArgs {
    #[command(flatten)]
    observation: ObservationArgs,

    /// Output CSV path ("-" for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    registry: RegistryArgs,
}

#[derive(Parser, Debug)]
struct ChartArgs {
    /// Metric (dataset) id, e.g. mtow
    #[arg(short, long)]
    metric: String,

    /// Polyline step along the fitted axis; defaults to the dataset's chart step
    #[arg(long)]
    step: Option<f64>,

    /// Output CSV path ("-" for stdout)
    #[arg(short, long, default_value = "chart.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Optional PNG path (defaults to output with .png)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Optional SVG path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plotting
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    #[command(flatten)]
    registry: RegistryArgs,
}

#[derive(Parser, Debug)]
struct DatasetsArgs {
    #[command(flatten)]
    registry: RegistryArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Predict(args) => args.registry.verbose,
        Command::Report(args) => args.registry.verbose,
        Command::Chart(args) => args.registry.verbose,
        Command::Datasets(args) => args.registry.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Predict(args) => handle_predict(args),
        Command::Report(args) => handle_report(args),
        Command::Chart(args) => handle_chart(args),
        Command::Datasets(args) => handle_datasets(args),
    }
}

fn load_registry(args: &RegistryArgs) -> Result<Registry> {
    let mut registry = Registry::builtin().context("built-in datasets failed validation")?;
    for path in &args.datasets {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let dataset = SampleDataset::from_json(&text)
            .with_context(|| format!("invalid dataset {}", path.display()))?;
        let id = dataset.id.clone();
        registry
            .insert(dataset)
            .with_context(|| format!("cannot register {}", path.display()))?;
        info!("Loaded dataset '{}' from {}", id, path.display());
    }
    Ok(registry)
}

fn require_dataset<'r>(registry: &'r Registry, metric: &str) -> Result<&'r SampleDataset> {
    registry.get(metric).ok_or_else(|| {
        let known: Vec<&str> = registry.ids().collect();
        anyhow!("unknown metric '{}' (known: {})", metric, known.join(", "))
    })
}

/// One metric's outcome, as printed by `predict --json` and `report`.
#[derive(Debug, Serialize)]
struct MetricRow<'a> {
    metric: &'a str,
    title: &'a str,
    value: Option<f64>,
    unit: &'a str,
    error: Option<String>,
    text: Option<String>,
}

impl<'a> MetricRow<'a> {
    fn new(dataset: &'a SampleDataset, result: PredictionResult) -> Self {
        Self {
            metric: &dataset.id,
            title: &dataset.title,
            value: result.value,
            unit: output_unit(dataset),
            error: result.error,
            text: result.text,
        }
    }
}

fn output_unit(dataset: &SampleDataset) -> &str {
    &dataset.axis(dataset.query.output_axis()).unit
}

fn handle_predict(args: PredictArgs) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    let dataset = require_dataset(&registry, &args.metric)?;
    let inputs = args.observation.inputs();
    let result = registry.predict(&args.metric, &inputs)?;
    if let Some(error) = result.error.as_deref() {
        warn!("{}: {}", dataset.id, error);
    }

    if args.json {
        let row = MetricRow::new(dataset, result);
        println!("{}", serde_json::to_string_pretty(&row)?);
    } else {
        println!(
            "{}: {} {}",
            dataset.title,
            result.display(dataset.rounding),
            if result.is_available() {
                output_unit(dataset)
            } else {
                ""
            }
        );
        if let Some(error) = result.error.as_deref() {
            println!("  {}", error);
        }
    }
    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    let inputs = args.observation.inputs();
    let datasets: Vec<&SampleDataset> = registry.datasets().collect();

    let rows = datasets
        .par_iter()
        .map(|dataset| -> Result<(&SampleDataset, PredictionResult)> {
            let result = registry
                .predict(&dataset.id, &inputs)
                .with_context(|| format!("failed to evaluate '{}'", dataset.id))?;
            Ok((*dataset, result))
        })
        .collect::<Result<Vec<_>>>()?;

    let available = rows.iter().filter(|(_, r)| r.is_available()).count();
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_report_rows(&rows, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_report_rows(&rows, &mut writer)?;
        info!("Wrote report CSV: {}", args.output.display());
    }
    info!("{} of {} metrics available", available, rows.len());
    Ok(())
}

fn write_report_rows<W: Write>(
    rows: &[(&SampleDataset, PredictionResult)],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record(["metric", "title", "value", "unit", "error", "text"])?;
    for (dataset, result) in rows {
        let value = match result.value {
            Some(v) => format!("{:.*}", dataset.rounding.decimals(), v),
            None => String::new(),
        };
        writer.write_record([
            dataset.id.as_str(),
            dataset.title.as_str(),
            value.as_str(),
            output_unit(dataset),
            result.error.as_deref().unwrap_or(""),
            result.text.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Step used to trace a dataset's curves when none is given.
fn default_chart_step(dataset: &SampleDataset) -> f64 {
    if let Some(step) = dataset.chart_step {
        return step;
    }
    let axis = dataset.direction().abscissa();
    let (lo, hi) = dataset
        .curves
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), curve| {
            (lo.min(curve.absolute_min(axis)), hi.max(curve.absolute_max(axis)))
        });
    ((hi - lo) / DEFAULT_CHART_STEPS).max(f64::EPSILON)
}

fn handle_chart(args: ChartArgs) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    let dataset = require_dataset(&registry, &args.metric)?;
    let step = args.step.unwrap_or_else(|| default_chart_step(dataset));
    let scatter = registry.scatter_points(&dataset.id)?;
    let lines = registry.curve_polylines(&dataset.id, step)?;
    info!(
        "{}: {} samples, {} curves traced at step {}",
        dataset.id,
        scatter.len(),
        lines.len(),
        step
    );

    let to_stdout = args.output.as_os_str() == "-";
    if to_stdout {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_chart_rows(scatter, &lines, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_chart_rows(scatter, &lines, &mut writer)?;
        info!("Wrote chart CSV: {}", args.output.display());
    }

    if args.no_plot {
        return Ok(());
    }
    let data = ChartData {
        dataset,
        scatter,
        lines: &lines,
    };
    let png_path = match &args.png {
        Some(path) => Some(path.clone()),
        None if !to_stdout => Some(args.output.with_extension("png")),
        None => None,
    };
    if let Some(path) = png_path {
        render_plot(&data, &path, ChartKind::Png);
    }
    if let Some(path) = args.svg.as_ref() {
        render_plot(&data, path, ChartKind::Svg);
    }
    Ok(())
}

fn render_plot(data: &ChartData, path: &Path, kind: ChartKind) {
    if let Err(err) = render_chart_guard(data, path, kind) {
        warn!("Skipping {:?} render ({}): {}", kind, path.display(), err);
    } else {
        info!("Wrote plot: {}", path.display());
    }
}

fn write_chart_rows<W: Write>(
    scatter: &[SamplePoint],
    lines: &perf_curve::Polylines,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record(["series", "key", "x", "y"])?;
    for (key, line) in lines {
        let key = key.to_string();
        for point in line {
            let (x, y) = (point.x.to_string(), point.y.to_string());
            writer.write_record(["curve", key.as_str(), x.as_str(), y.as_str()])?;
        }
    }
    for point in scatter {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        writer.write_record(["sample", "", x.as_str(), y.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_datasets(args: DatasetsArgs) -> Result<()> {
    let registry = load_registry(&args.registry)?;
    for dataset in registry.datasets() {
        let (min_key, max_key) = match (dataset.min_key(), dataset.max_key()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(anyhow!("dataset '{}' has no curves", dataset.id)),
        };
        let query = match dataset.query {
            QueryShape::ByAltitude => "by altitude",
            QueryShape::ByWeight => "by weight",
        };
        println!(
            "{:<6} {:<44} {} {}..{} {} step {}, {}, {} decimals",
            dataset.id,
            dataset.title,
            dataset.parameter.label,
            min_key,
            max_key,
            dataset.parameter.unit,
            dataset.step,
            query,
            dataset.rounding.decimals()
        );
    }
    info!("{} datasets valid", registry.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_predict_args_parse_negative_temperature() {
        let cli = Cli::try_parse_from([
            "perf_curve",
            "predict",
            "--metric",
            "mtow",
            "--temperature",
            "-35",
            "--pressure-altitude",
            "5000",
        ])
        .unwrap();
        match cli.command {
            Command::Predict(args) => {
                assert_eq!(args.metric, "mtow");
                assert_eq!(args.observation.temperature, Some(-35.0));
                assert_eq!(args.observation.pressure_altitude, Some(5000.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_qnh_requires_elevation() {
        let parsed = Cli::try_parse_from(["perf_curve", "report", "--qnh", "1000"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_inputs_derive_weather() {
        let observation = ObservationArgs {
            temperature: Some(20.0),
            qnh: Some(weather::STANDARD_QNH_HPA),
            elevation: Some(1000.0),
            ..ObservationArgs::default()
        };
        let inputs = observation.inputs();
        assert_eq!(inputs.pressure_altitude, Some(1000.0));
        let deviation = inputs.isa_deviation.unwrap();
        assert!((deviation - 6.98).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_inputs_win_over_derived() {
        let observation = ObservationArgs {
            temperature: Some(20.0),
            pressure_altitude: Some(3000.0),
            isa_deviation: Some(-4.0),
            qnh: Some(990.0),
            elevation: Some(1000.0),
            ..ObservationArgs::default()
        };
        let inputs = observation.inputs();
        assert_eq!(inputs.pressure_altitude, Some(3000.0));
        assert_eq!(inputs.isa_deviation, Some(-4.0));
    }

    #[test]
    fn test_report_rows_format_by_rounding() {
        let registry = Registry::builtin().unwrap();
        let inputs = PredictionInputs {
            temperature: Some(-35.0),
            pressure_altitude: Some(5000.0),
            ..PredictionInputs::default()
        };
        let mtow = registry.get("mtow").unwrap();
        let ttet = registry.get("ttet").unwrap();
        let rows = vec![
            (mtow, registry.predict("mtow", &inputs).unwrap()),
            (ttet, registry.predict("ttet", &inputs).unwrap()),
        ];
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_report_rows(&rows, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "metric,title,value,unit,error,text");
        assert!(lines[1].starts_with("mtow,"));
        assert!(lines[1].contains(",4542,kg,,"), "{}", lines[1]);
        assert!(lines[2].ends_with(",Missing weight input,N/A"), "{}", lines[2]);
    }

    #[test]
    fn test_default_chart_step_prefers_dataset() {
        let registry = Registry::builtin().unwrap();
        let mtow = registry.get("mtow").unwrap();
        assert_eq!(default_chart_step(mtow), 250.0);
    }
}
