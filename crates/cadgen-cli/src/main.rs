//! cadgen - text to 3D-printable solid models
//!
//! ## Commands
//!
//! - `generate`: run the generation-repair pipeline for one part description
//! - `show`: print a stored run result after verifying its digest
//! - `materials`: list the printable materials
//! - `health`: check that CadQuery and the model CLI are reachable

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use cadgen_core::{
    ArtifactStore, GenerationRequest, GenerationResult, MaterialCatalog, Pipeline, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "cadgen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate validated CadQuery solids from part descriptions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a part from a description
    Generate {
        /// What to build, e.g. "wall hook for a 20mm rail"
        task: String,

        /// Material id (see `cadgen materials`)
        #[arg(short, long, default_value = "PLA")]
        material: String,

        /// Existing CadQuery script to modify; TASK then describes the change
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Model passed to the model CLI
        #[arg(long, env = "CADGEN_MODEL")]
        model: Option<String>,

        /// Model CLI executable
        #[arg(long, env = "CADGEN_CLAUDE_CLI")]
        claude_cli: Option<String>,

        /// Python interpreter with CadQuery installed
        #[arg(long, env = "CADGEN_PYTHON")]
        python: Option<String>,

        /// Directory for run artifacts
        #[arg(short, long, env = "CADGEN_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Skip the visual check
        #[arg(long)]
        no_visual_check: bool,

        /// Print the final script to stdout
        #[arg(long)]
        print_code: bool,
    },

    /// Print a stored run result
    Show {
        /// Run id
        run_id: String,

        /// Directory for run artifacts
        #[arg(short, long, env = "CADGEN_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },

    /// List printable materials
    Materials,

    /// Check external dependencies
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cadgen_core::init_tracing(cli.json, level);

    let config = PipelineConfig::from_env().context("Invalid CADGEN_* environment")?;

    match cli.command {
        Commands::Generate {
            task,
            material,
            previous,
            model,
            claude_cli,
            python,
            output_dir,
            no_visual_check,
            print_code,
        } => {
            let mut config = config;
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(program) = claude_cli {
                config.generator_program = program;
            }
            if let Some(python) = python {
                config.python_program = python;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if no_visual_check {
                config.visual_check = false;
            }
            cmd_generate(&config, &task, &material, previous.as_deref(), print_code).await
        }
        Commands::Show { run_id, output_dir } => {
            let dir = output_dir.unwrap_or(config.output_dir);
            cmd_show(&dir, &run_id)
        }
        Commands::Materials => cmd_materials(&config, cli.json),
        Commands::Health => cmd_health(&config).await,
    }
}

fn load_catalog(config: &PipelineConfig) -> Result<MaterialCatalog> {
    match &config.materials_file {
        Some(path) => MaterialCatalog::from_path(path)
            .with_context(|| format!("Failed to load material catalog {:?}", path)),
        None => Ok(MaterialCatalog::embedded().clone()),
    }
}

/// Build the request, rejecting unknown materials before any model call.
fn build_request(
    catalog: &MaterialCatalog,
    task: &str,
    material: &str,
    previous: Option<&Path>,
) -> Result<GenerationRequest> {
    catalog.check(material)?;
    let request = GenerationRequest::new(task, material)?;
    match previous {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read previous script {:?}", path))?;
            Ok(request.with_previous_source(source)?)
        }
        None => Ok(request),
    }
}

async fn cmd_generate(
    config: &PipelineConfig,
    task: &str,
    material: &str,
    previous: Option<&Path>,
    print_code: bool,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let request = build_request(&catalog, task, material, previous)?;
    let pipeline = Pipeline::from_config(config).context("Failed to set up pipeline")?;

    let result = pipeline.run(&request).await;

    let store = ArtifactStore::new(&config.output_dir);
    let stored = store
        .write(&result, request.task_text())
        .with_context(|| format!("Failed to write run artifacts to {:?}", config.output_dir))?;
    info!(dir = %stored.dir.display(), "run stored");

    print_summary(&result);
    if print_code {
        if let Some(code) = &result.code {
            println!("\n{code}");
        }
    }
    if let Some(step) = &stored.step {
        println!("STEP: {}", step.display());
    }

    if !result.success {
        anyhow::bail!(
            "Run {} ended {:?}: {}",
            result.run_id,
            result.status,
            result.error.as_deref().unwrap_or("no diagnostic")
        );
    }
    Ok(())
}

fn print_summary(result: &GenerationResult) {
    println!("Run:      {}", result.run_id);
    println!("Status:   {:?}", result.status);
    println!("Model:    {}", result.model);
    println!("Attempts: {}", result.attempts);
    if let Some(m) = &result.measurements {
        println!("Measured: {}", m.summary());
    }
    if let Some(visual) = &result.visual_check {
        match (&visual.verdict, &visual.error) {
            (Some(v), _) => println!(
                "Visual:   {} (confidence {}/10{})",
                if v.valid { "match" } else { "mismatch" },
                v.confidence,
                v.category
                    .as_deref()
                    .map(|c| format!(", looks like {c}"))
                    .unwrap_or_default()
            ),
            (None, Some(err)) => println!("Visual:   skipped ({err})"),
            (None, None) => {}
        }
        match visual.retried {
            Some(true) => println!("          repaired from critique"),
            Some(false) => println!(
                "          repair discarded: {}",
                visual.retry_error.as_deref().unwrap_or("unknown")
            ),
            None => {}
        }
    }
    if let Some(err) = &result.error {
        println!("Error:    {err}");
    }
}

fn cmd_show(output_dir: &Path, run_id: &str) -> Result<()> {
    let run_id: uuid::Uuid = run_id
        .parse()
        .with_context(|| format!("Not a run id: {run_id}"))?;
    let result = ArtifactStore::new(output_dir)
        .read_result(&run_id)
        .with_context(|| format!("Failed to read run {run_id}"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_materials(config: &PipelineConfig, json: bool) -> Result<()> {
    let materials = load_catalog(config)?.list();
    if json {
        println!("{}", serde_json::to_string_pretty(&materials)?);
        return Ok(());
    }
    for m in materials {
        println!(
            "{:<6} {:<40} wall >= {} mm, service <= {} °C",
            m.id, m.name, m.wall_min_mm, m.temp_max_service
        );
    }
    Ok(())
}

async fn cmd_health(config: &PipelineConfig) -> Result<()> {
    let report = cadgen_core::probe(&config.python_program, &config.generator_program).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_ready() {
        anyhow::bail!("cadgen is not ready");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_args_parse() {
        let cli = Cli::try_parse_from([
            "cadgen",
            "--json",
            "generate",
            "a cable clip",
            "--material",
            "PETG",
            "--no-visual-check",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Generate {
                task,
                material,
                no_visual_check,
                ..
            } => {
                assert_eq!(task, "a cable clip");
                assert_eq!(material, "PETG");
                assert!(no_visual_check);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_unknown_material_is_rejected_before_run() {
        let err = build_request(MaterialCatalog::embedded(), "a cube", "unobtainium", None)
            .unwrap_err();
        assert!(err.to_string().contains("unknown material"));
    }

    #[test]
    fn test_previous_script_makes_modify_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.py");
        std::fs::write(&path, "import cadquery as cq\nresult = cq.Workplane().box(1, 1, 1)").unwrap();

        let request =
            build_request(MaterialCatalog::embedded(), "make it taller", "PLA", Some(&path)).unwrap();
        assert!(request.is_modify());
    }

    #[test]
    fn test_show_rejects_bad_run_id() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_show(dir.path(), "not-a-uuid").is_err());
    }
}
