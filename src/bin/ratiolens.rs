//! ratiolens CLI - Command-line interface for ratio-lens
//!
//! Commands:
//! - predict: Score measurement records from a file or stdin (batch mode)
//! - run: Score NDJSON records from stdin as they arrive (streaming mode)
//! - validate: Validate measurement records without scoring
//! - derive: Print the derived ratio features, no model needed
//! - score: Score a raw eleven-value feature vector
//! - inspect: Summarise a model artifact
//! - doctor: Diagnose configuration and model health
//! - schema: Print input/output schema information

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ratio_lens::config::RatioLensConfig;
use ratio_lens::engine::ScoringEngine;
use ratio_lens::explain::Explanation;
use ratio_lens::model::load_artifact;
use ratio_lens::pipeline::{derive_features, Predictor};
use ratio_lens::schema::{MeasurementInput, MeasurementInputAdapter, SCHEMA_VERSION};
use ratio_lens::types::{Feature, LengthUnit, MeasurementKey, PredictionPayload, FEATURE_COUNT};
use ratio_lens::{PredictError, PAYLOAD_VERSION, PRODUCER_NAME, RATIO_LENS_VERSION};

/// ratiolens - Sex prediction from anthropometric ratios with exact attributions
#[derive(Parser)]
#[command(name = "ratiolens")]
#[command(version = RATIO_LENS_VERSION)]
#[command(about = "Score body-measurement ratios and explain the result", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model artifact path (overrides config and RATIO_LENS_MODEL)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Unit for records that don't declare one: mm, cm, m, in
    #[arg(long, global = true)]
    unit: Option<String>,

    /// Treat measurements equal to 0 as missing
    #[arg(long, global = true)]
    strict: bool,

    /// Log filter, e.g. "debug" (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score measurement records (batch mode)
    Predict {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Score NDJSON records from stdin as they arrive (streaming mode)
    Run {
        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each record (`--flush false` to buffer)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Validate measurement records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the eleven derived features for each record
    Derive {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,
    },

    /// Score a feature vector given as a JSON array or a name -> value object
    Score {
        /// Feature vector JSON (reads stdin when omitted)
        #[arg(long)]
        features: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarise the model artifact
    Inspect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and model health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// A single JSON record or a JSON array of records
    Json,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one payload per line)
    Ndjson,
    /// JSON array of payloads
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Human-readable report
    Text,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (ratio_lens.measurements.v1)
    Input,
    /// Output schema (ratio_lens.prediction.v1)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RatioCliError> {
    let config = resolve_config(&cli.global);
    init_logging(
        config
            .as_ref()
            .map(|c| c.log_filter.as_str())
            .unwrap_or("info"),
    );

    match cli.command {
        Commands::Doctor { json } => cmd_doctor(config, json),
        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
        command => {
            let config = config?;
            match command {
                Commands::Predict {
                    input,
                    output,
                    input_format,
                    output_format,
                } => cmd_predict(config, &input, &output, input_format, output_format),
                Commands::Run {
                    output_format,
                    flush,
                } => cmd_run(config, output_format, flush),
                Commands::Validate {
                    input,
                    input_format,
                    json,
                } => cmd_validate(&config, &input, input_format, json),
                Commands::Derive {
                    input,
                    input_format,
                } => cmd_derive(&config, &input, input_format),
                Commands::Score { features, json } => cmd_score(&config, features, json),
                Commands::Inspect { json } => cmd_inspect(&config, json),
                Commands::Doctor { .. } | Commands::Schema { .. } => Ok(()),
            }
        }
    }
}

/// Defaults < config file < environment < command-line flags
fn resolve_config(global: &GlobalArgs) -> Result<RatioLensConfig, RatioCliError> {
    let mut config = RatioLensConfig::load(global.config.as_deref())?;
    if let Some(model) = &global.model {
        config.model_path = model.clone();
    }
    if let Some(unit) = &global.unit {
        config.input_unit = LengthUnit::parse(unit)?;
    }
    if global.strict {
        config.strict_zero_check = true;
    }
    if let Some(log) = &global.log {
        config.log_filter = log.clone();
    }
    config.validate()?;
    Ok(config)
}

// Logs go to stderr; stdout carries only payloads
fn init_logging(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn cmd_predict(
    config: RatioLensConfig,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
) -> Result<(), RatioCliError> {
    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(RatioCliError::NoRecords);
    }

    let predictor = Predictor::from_config(config)?;
    let payloads = records
        .iter()
        .map(|record| predictor.predict_input(record))
        .collect::<Result<Vec<_>, _>>()?;

    let output_data = format_output(&payloads, &output_format)?;
    write_output(output, &output_data)
}

fn cmd_run(
    config: RatioLensConfig,
    output_format: OutputFormat,
    flush: bool,
) -> Result<(), RatioCliError> {
    let predictor = Predictor::from_config(config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut count = 0usize;

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let record = MeasurementInputAdapter::parse_one(trimmed).map_err(|e| {
            RatioCliError::ParseError(format!("line {}: {}", line_num + 1, e))
        })?;

        let payload = predictor.predict_input(&record)?;
        write!(stdout, "{}", format_output(&[payload], &output_format)?)?;
        if flush {
            stdout.flush()?;
        }
        count += 1;
    }

    stdout.flush()?;
    tracing::info!(records = count, "stream finished");
    Ok(())
}

fn cmd_validate(
    config: &RatioLensConfig,
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), RatioCliError> {
    let records = read_records(input, &input_format)?;
    let results = MeasurementInputAdapter::validate_inputs(&records, config.strict_zero_check);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                subject_id: r.subject_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Subject {} (index {}): {}",
                    err.subject_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(RatioCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_derive(
    config: &RatioLensConfig,
    input: &Path,
    input_format: InputFormat,
) -> Result<(), RatioCliError> {
    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(RatioCliError::NoRecords);
    }

    let mut stdout = io::stdout();
    for record in &records {
        let (normalized, features) =
            derive_features(record, config.input_unit, config.strict_zero_check)?;
        let line = serde_json::json!({
            "subject_id": record.subject_id,
            "source_unit": normalized.source_unit,
            "flags": normalized.quality_flags.iter().map(|f| f.label()).collect::<Vec<_>>(),
            "features": features,
        });
        writeln!(stdout, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(())
}

fn cmd_score(
    config: &RatioLensConfig,
    features: Option<String>,
    json: bool,
) -> Result<(), RatioCliError> {
    let raw = match features {
        Some(raw) => raw,
        None => read_input(Path::new("-"))?,
    };
    let values = parse_feature_values(&raw)?;

    let engine = ScoringEngine::new(load_artifact(&config.model_path)?);
    let scored = engine.score_slice(&values)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scored)?);
    } else {
        let vector = ratio_lens::types::FeatureVector::from_slice(&values)?;
        print!("{}", Explanation::from_scored(&vector, &scored).render_text());
    }
    Ok(())
}

fn cmd_inspect(config: &RatioLensConfig, json: bool) -> Result<(), RatioCliError> {
    let scorer = load_artifact(&config.model_path)?;
    let summary = scorer.summary();

    if json {
        let report = serde_json::json!({
            "model_path": config.model_path,
            "summary": summary,
            "feature_names": Feature::ALL.iter().map(|f| f.name()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Model: {}", config.model_path.display());
        println!("Kind:      {}", summary.kind);
        println!("Trees:     {}", summary.trees);
        println!("Max depth: {}", summary.max_depth);
        println!("Leaves:    {}", summary.leaves);
        println!("Baseline:  {:+.6}", summary.baseline);
        println!("\nColumns:");
        for feature in Feature::ALL {
            println!("  {:>2} {:<8} {}", feature.index(), feature.name(), feature.description());
        }
    }
    Ok(())
}

fn cmd_doctor(
    config: Result<RatioLensConfig, RatioCliError>,
    json: bool,
) -> Result<(), RatioCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("ratio-lens version {}", RATIO_LENS_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}, output schema: {}", SCHEMA_VERSION, PAYLOAD_VERSION),
    });

    match &config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "input unit {}, strict zero check {}, log filter {:?}",
                    config.input_unit.as_str(),
                    config.strict_zero_check,
                    config.log_filter
                ),
            });

            if !config.model_path.exists() {
                checks.push(DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Model file {} does not exist", config.model_path.display()),
                });
            } else {
                match load_artifact(&config.model_path) {
                    Ok(scorer) => {
                        let summary = scorer.summary();
                        checks.push(DoctorCheck {
                            name: "model".to_string(),
                            status: CheckStatus::Ok,
                            message: format!(
                                "{} with {} trees loaded from {}",
                                summary.kind,
                                summary.trees,
                                config.model_path.display()
                            ),
                        });

                        // Sanity probe: an all-ones vector must score and add up
                        let engine = ScoringEngine::new(scorer);
                        let probe = engine.score_slice(&[1.0; FEATURE_COUNT]);
                        checks.push(match probe {
                            Ok(scored) if scored.additivity_gap <= 1e-6 => DoctorCheck {
                                name: "attribution".to_string(),
                                status: CheckStatus::Ok,
                                message: format!(
                                    "Attributions add up (gap {:.2e})",
                                    scored.additivity_gap
                                ),
                            },
                            Ok(scored) => DoctorCheck {
                                name: "attribution".to_string(),
                                status: CheckStatus::Warning,
                                message: format!(
                                    "Attribution gap {:.2e} exceeds tolerance",
                                    scored.additivity_gap
                                ),
                            },
                            Err(e) => DoctorCheck {
                                name: "attribution".to_string(),
                                status: CheckStatus::Error,
                                message: e.to_string(),
                            },
                        });
                    }
                    Err(e) => checks.push(DoctorCheck {
                        name: "model".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    }),
                }
            }
        }
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: CliError::from_ref(e).message,
        }),
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: RATIO_LENS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("ratiolens Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RatioCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), RatioCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("Each record is either an envelope");
                println!("  {{ schema_version, subject_id?, unit?, measurements: {{ ... }} }}");
                println!("or a bare measurements object. All twelve measurements are required:");
                println!();
                for key in MeasurementKey::ALL {
                    println!("  - {:<28} {}", key.as_str(), key.label());
                }
                println!();
                println!("Units: mm (default), cm, m, in");
                println!("A value of 0 is replaced with 0.1 before ratios are taken;");
                println!("with --strict it is rejected as not provided.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: {}", PAYLOAD_VERSION);
                println!();
                println!("- schema_version");
                println!("- producer: {{ name, version, instance_id }}");
                println!("- provenance: {{ subject_id, source_unit, model_kind, model_trees, computed_at_utc }}");
                println!("- quality: {{ flags, additivity_gap }}");
                println!("- features: {{ WHR, HBS, CS, FSR, CBR, BBSR, BBHB, ANKLS, FLS, WCS, stature }}");
                println!("- prediction: {{ probability_female, probability_male, passing_percent, margin }}");
                println!("- attribution: {{ baseline, contributions: {{ <feature>: value }} }}");
                println!("- explanation: [{{ feature, value, contribution, lean }}], strongest first");
                println!();
                println!("baseline + sum(contributions) == margin; positive contributions lean male.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, RatioCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), RatioCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
        io::stdout().flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn read_records(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<MeasurementInput>, RatioCliError> {
    let data = read_input(input)?;
    let records = match input_format {
        InputFormat::Ndjson => MeasurementInputAdapter::parse_ndjson(&data)?,
        InputFormat::Json if data.trim_start().starts_with('[') => {
            MeasurementInputAdapter::parse_array(&data)?
        }
        InputFormat::Json => vec![MeasurementInputAdapter::parse_one(&data)?],
    };
    Ok(records)
}

fn parse_feature_values(raw: &str) -> Result<Vec<f64>, RatioCliError> {
    let invalid = |message: String| RatioCliError::Predict(PredictError::InvalidFeatureVector(message));

    let value: serde_json::Value = serde_json::from_str(raw.trim())?;
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_f64()
                    .ok_or_else(|| invalid(format!("entry {} is not a number: {}", i, item)))
            })
            .collect(),
        serde_json::Value::Object(map) => Feature::ALL
            .iter()
            .map(|feature| match map.get(feature.name()) {
                Some(item) => item.as_f64().ok_or_else(|| {
                    invalid(format!("feature {} is not a number: {}", feature.name(), item))
                }),
                None => Err(invalid(format!("feature {} missing", feature.name()))),
            })
            .collect(),
        _ => Err(invalid(
            "expected a JSON array or object of feature values".to_string(),
        )),
    }
}

fn format_output(
    payloads: &[PredictionPayload],
    format: &OutputFormat,
) -> Result<String, RatioCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for payload in payloads {
                lines.push(serde_json::to_string(payload)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(payloads)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(payloads)? + "\n"),
        OutputFormat::Text => {
            let mut out = String::new();
            for payload in payloads {
                if let Some(subject) = &payload.provenance.subject_id {
                    out.push_str(&format!("subject: {}\n", subject));
                }
                let explanation = Explanation {
                    passing_percent: payload.prediction.passing_percent,
                    baseline: payload.attribution.baseline,
                    influences: payload.explanation.clone(),
                };
                out.push_str(&explanation.render_text());
                for flag in &payload.quality.flags {
                    out.push_str(&format!("warning: {}\n", flag));
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}

fn get_input_json_schema() -> String {
    let measurement_properties: serde_json::Map<String, serde_json::Value> = MeasurementKey::ALL
        .iter()
        .map(|key| {
            (
                key.as_str().to_string(),
                serde_json::json!({ "type": "number", "minimum": 0, "description": key.label() }),
            )
        })
        .collect();
    let required: Vec<&str> = MeasurementKey::ALL.iter().map(|k| k.as_str()).collect();

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Twelve anthropometric measurements for one subject",
        "type": "object",
        "required": ["measurements"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "subject_id": { "type": "string" },
            "unit": { "type": "string", "enum": ["mm", "cm", "m", "in"] },
            "measurements": {
                "type": "object",
                "required": required,
                "additionalProperties": false,
                "properties": measurement_properties
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let feature_properties: serde_json::Map<String, serde_json::Value> = Feature::ALL
        .iter()
        .map(|f| (f.name().to_string(), serde_json::json!({ "type": "number" })))
        .collect();

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": PAYLOAD_VERSION,
        "description": "Prediction with additive per-feature attribution",
        "type": "object",
        "required": ["schema_version", "producer", "provenance", "quality", "features", "prediction", "attribution", "explanation"],
        "properties": {
            "schema_version": { "type": "string", "const": PAYLOAD_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "provenance": {
                "type": "object",
                "properties": {
                    "subject_id": { "type": ["string", "null"] },
                    "source_unit": { "type": "string" },
                    "model_kind": { "type": "string" },
                    "model_trees": { "type": "integer" },
                    "computed_at_utc": { "type": "string", "format": "date-time" }
                }
            },
            "quality": {
                "type": "object",
                "properties": {
                    "flags": { "type": "array", "items": { "type": "string" } },
                    "additivity_gap": { "type": "number" }
                }
            },
            "features": { "type": "object", "properties": feature_properties.clone() },
            "prediction": {
                "type": "object",
                "properties": {
                    "probability_female": { "type": "number", "minimum": 0, "maximum": 1 },
                    "probability_male": { "type": "number", "minimum": 0, "maximum": 1 },
                    "passing_percent": { "type": "number" },
                    "margin": { "type": "number" }
                }
            },
            "attribution": {
                "type": "object",
                "properties": {
                    "baseline": { "type": "number" },
                    "contributions": { "type": "object", "properties": feature_properties }
                }
            },
            "explanation": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "feature": { "type": "string" },
                        "value": { "type": "number" },
                        "contribution": { "type": "number" },
                        "lean": { "type": "string", "enum": ["male", "female", "neutral"] }
                    }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum RatioCliError {
    Io(io::Error),
    Predict(PredictError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for RatioCliError {
    fn from(e: io::Error) -> Self {
        RatioCliError::Io(e)
    }
}

impl From<PredictError> for RatioCliError {
    fn from(e: PredictError) -> Self {
        RatioCliError::Predict(e)
    }
}

impl From<serde_json::Error> for RatioCliError {
    fn from(e: serde_json::Error) -> Self {
        RatioCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn from_ref(e: &RatioCliError) -> Self {
        match e {
            RatioCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RatioCliError::Predict(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: predict_hint(e).map(str::to_string),
            },
            RatioCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RatioCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No measurement records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RatioCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            RatioCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            RatioCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg.clone(),
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

impl From<RatioCliError> for CliError {
    fn from(e: RatioCliError) -> Self {
        CliError::from_ref(&e)
    }
}

fn predict_hint(e: &PredictError) -> Option<&'static str> {
    match e {
        PredictError::MissingMeasurement(_) => {
            Some("All twelve measurements are required; run 'ratiolens schema input'")
        }
        PredictError::UnknownMeasurement(_) => {
            Some("Check measurement names; run 'ratiolens schema input'")
        }
        PredictError::InvalidFeatureVector(_) => {
            Some("Provide exactly eleven finite values in column order")
        }
        PredictError::ArtifactLoadFailure { .. } | PredictError::InvalidArtifact(_) => {
            Some("Check --model or RATIO_LENS_MODEL; run 'ratiolens doctor'")
        }
        PredictError::ParseError(_) | PredictError::JsonError(_) => {
            Some("Ensure input matches ratio_lens.measurements.v1 schema")
        }
        PredictError::InvalidUnit(_) => Some("Use one of mm, cm, m, in"),
        PredictError::ConfigError(_) => Some("Check the config file and RATIO_LENS_* variables"),
        PredictError::EncodingError(_) => None,
        PredictError::Io(_) => Some("Check file paths and permissions"),
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    subject_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_code(err: RatioCliError) -> String {
        CliError::from(err).code
    }

    #[test]
    fn test_feature_array_parses() {
        let values = parse_feature_values("[0.8, 0.2, 1700]").unwrap();
        assert_eq!(values, vec![0.8, 0.2, 1700.0]);
    }

    #[test]
    fn test_non_numeric_feature_is_invalid_vector() {
        let err = parse_feature_values(r#"[0.8, "tall", 1700]"#).unwrap_err();
        assert_eq!(error_code(err), "INVALID_FEATURE_VECTOR");

        let mut object: serde_json::Map<String, serde_json::Value> = Feature::ALL
            .iter()
            .map(|f| (f.name().to_string(), serde_json::json!(0.5)))
            .collect();
        object.insert("CS".to_string(), serde_json::json!(null));
        let err = parse_feature_values(&serde_json::Value::Object(object.clone()).to_string())
            .unwrap_err();
        assert_eq!(error_code(err), "INVALID_FEATURE_VECTOR");

        object.remove("CS");
        let err =
            parse_feature_values(&serde_json::Value::Object(object).to_string()).unwrap_err();
        assert_eq!(error_code(err), "INVALID_FEATURE_VECTOR");
    }

    #[test]
    fn test_run_flush_can_be_disabled() {
        let cli = Cli::try_parse_from(["ratiolens", "run", "--flush", "false"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { flush: false, .. }));

        let cli = Cli::try_parse_from(["ratiolens", "run"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { flush: true, .. }));
    }
}
