//! CadQuery execution in an isolated Python subprocess.
//!
//! The generated script is written to a fresh temporary directory together
//! with a measurement harness (prints `BBOX:`, `SIZE:`, `VOLUME:`, `SOLIDS:`
//! lines) and an export harness (STEP, STL, best-effort SVG views). The
//! interpreter runs under a hard wall-clock timeout; every failure mode is
//! reported as a failed [`ExecutionOutcome`].

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::adapters::ArtifactExecutor;
use crate::domain::{
    BoundingBox, ExecutionOutcome, ExportedFiles, Measurements, RenderedViews,
    DEFAULT_EXPECTED_SOLIDS,
};

const MEASUREMENT_HARNESS: &str = r#"
# === MEASUREMENT ===
_r = result
_bb = _r.val().BoundingBox()
_vol = _r.val().Volume()
_solids = len(_r.val().Solids())
print(f"BBOX:{_bb.xmin:.2f},{_bb.ymin:.2f},{_bb.zmin:.2f},{_bb.xmax:.2f},{_bb.ymax:.2f},{_bb.zmax:.2f}")
print(f"SIZE:{_bb.xlen:.2f}x{_bb.ylen:.2f}x{_bb.zlen:.2f}")
print(f"VOLUME:{_vol:.2f}")
print(f"SOLIDS:{_solids}")
"#;

const EXPORT_HARNESS: &str = r#"
# === EXPORT ===
import os as _os
_out = _os.environ.get("OUT_DIR", ".")
import cadquery as _cq
_cq.exporters.export(result, _os.path.join(_out, "output.step"))
_cq.exporters.export(result, _os.path.join(_out, "output.stl"))
for _name, _dir in (("view_iso.svg", (1, -1, 0.75)), ("view_front.svg", (0, -1, 0))):
    try:
        _cq.exporters.export(
            result,
            _os.path.join(_out, _name),
            exportType="SVG",
            opt={"projectionDir": _dir, "showHidden": False},
        )
    except Exception:
        pass
"#;

/// Characters of stderr kept as diagnostic text.
const STDERR_EXCERPT: usize = 500;

/// Last [`STDERR_EXCERPT`] characters of `stderr`.
///
/// A traceback ends with the exception line, which is what the diagnoser
/// classifies on.
fn stderr_excerpt(stderr: &str) -> String {
    let total = stderr.chars().count();
    stderr.chars().skip(total.saturating_sub(STDERR_EXCERPT)).collect()
}

/// Configuration for [`CadQueryExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub python_program: String,
    pub timeout: Duration,
    pub expected_solids: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            python_program: "python3".to_string(),
            timeout: Duration::from_secs(60),
            expected_solids: DEFAULT_EXPECTED_SOLIDS,
        }
    }
}

/// Runs CadQuery scripts with `python3` in a throwaway directory.
#[derive(Debug, Clone, Default)]
pub struct CadQueryExecutor {
    config: ExecutorConfig,
}

impl CadQueryExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    async fn run_in(&self, dir: &Path, source_text: &str) -> ExecutionOutcome {
        let script_path = dir.join("code.py");
        let script = format!("{source_text}\n{MEASUREMENT_HARNESS}\n{EXPORT_HARNESS}");
        if let Err(e) = tokio::fs::write(&script_path, script).await {
            return ExecutionOutcome::failed(format!("failed to write script: {e}"), None);
        }

        let child = Command::new(&self.config.python_program)
            .arg(&script_path)
            .env("OUT_DIR", dir)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::failed(
                    format!("failed to spawn {}: {e}", self.config.python_program),
                    None,
                )
            }
        };

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ExecutionOutcome::failed(format!("execution error: {e}"), None),
            Err(_) => {
                return ExecutionOutcome::failed(
                    format!(
                        "Execution timed out after {}s",
                        self.config.timeout.as_secs()
                    ),
                    None,
                )
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = if stderr.trim().is_empty() {
                "CadQuery execution failed".to_string()
            } else {
                stderr_excerpt(&stderr)
            };
            return ExecutionOutcome::failed(diagnostic, None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let measurements = parse_measurements(&stdout);
        debug!(summary = %measurements.summary(), solids = ?measurements.solid_count, "script executed");

        if let Some(n) = measurements.solid_count {
            if n != self.config.expected_solids {
                let noun = if self.config.expected_solids == 1 {
                    "solid"
                } else {
                    "solids"
                };
                return ExecutionOutcome::failed(
                    format!("Expected {} {noun}, got {n}", self.config.expected_solids),
                    Some(measurements),
                );
            }
        }

        let step = match tokio::fs::read(dir.join("output.step")).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => return ExecutionOutcome::failed("STEP file not produced", Some(measurements)),
        };
        let stl = tokio::fs::read(dir.join("output.stl")).await.ok();
        let views = RenderedViews {
            iso_svg: tokio::fs::read_to_string(dir.join("view_iso.svg")).await.ok(),
            front_svg: tokio::fs::read_to_string(dir.join("view_front.svg")).await.ok(),
        };

        ExecutionOutcome::succeeded(measurements, ExportedFiles { step, stl, views })
            .validated(self.config.expected_solids)
    }
}

#[async_trait]
impl ArtifactExecutor for CadQueryExecutor {
    async fn run(&self, source_text: &str) -> ExecutionOutcome {
        let dir = match tempfile::Builder::new().prefix("cadgen_").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "failed to create execution directory");
                return ExecutionOutcome::failed(
                    format!("failed to create execution directory: {e}"),
                    None,
                );
            }
        };
        self.run_in(dir.path(), source_text).await
    }
}

fn bbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"BBOX:([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+),([-\d.]+)")
            .expect("static regex is valid")
    })
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"SIZE:([-\d.]+)x([-\d.]+)x([-\d.]+)").expect("static regex is valid")
    })
}

fn volume_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"VOLUME:([-\d.]+)").expect("static regex is valid"))
}

fn solids_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"SOLIDS:(\d+)").expect("static regex is valid"))
}

/// Parse the measurement harness lines out of interpreter stdout.
///
/// Lines that are absent or malformed leave their field empty.
pub fn parse_measurements(stdout: &str) -> Measurements {
    let floats = |caps: &regex::Captures<'_>, range: std::ops::RangeInclusive<usize>| {
        range
            .map(|i| caps[i].parse::<f64>().ok())
            .collect::<Option<Vec<f64>>>()
    };

    let bounding_box = bbox_re().captures(stdout).and_then(|caps| {
        let v = floats(&caps, 1..=6)?;
        Some(BoundingBox {
            min: [v[0], v[1], v[2]],
            max: [v[3], v[4], v[5]],
        })
    });
    let size = size_re().captures(stdout).and_then(|caps| {
        let v = floats(&caps, 1..=3)?;
        Some([v[0], v[1], v[2]])
    });
    let volume = volume_re()
        .captures(stdout)
        .and_then(|caps| caps[1].parse::<f64>().ok());
    let solid_count = solids_re()
        .captures(stdout)
        .and_then(|caps| caps[1].parse::<u32>().ok());

    Measurements {
        size,
        volume,
        solid_count,
        bounding_box,
    }
}
