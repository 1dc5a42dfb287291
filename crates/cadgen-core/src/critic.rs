//! Visual critic: ask a model whether rendered views match the task.
//!
//! The reply protocol is one labeled line per field:
//!
//! ```text
//! CATEGORY: bracket
//! MATCH: yes
//! MISSING: none
//! PROPORTIONS: none
//! CONFIDENCE: 8
//! FIX: none
//! ```
//!
//! Parsing is lenient: labels are case-insensitive, unknown or malformed
//! lines are ignored, `none`/`n/a` mean absent, and a missing confidence
//! defaults to a non-passing value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::VisualCritic;
use crate::domain::verdict::DEFAULT_CONFIDENCE;
use crate::domain::{AdapterError, AdapterResult, Measurements, RenderedViews, VisualVerdict};
use crate::generation::TextBackend;

/// System prompt for the critic.
pub const CRITIC_SYSTEM: &str = "\
You review 3D-printable parts. You are shown 2D SVG projections of a solid \
and its measured size. Judge only whether the geometry plausibly matches the \
request; ignore surface finish and colour.";

/// Longest SVG, in characters, embedded per view.
const MAX_VIEW_CHARS: usize = 60_000;

/// Build the critic prompt.
pub fn critic_prompt(task_text: &str, views: &RenderedViews, measurements: &Measurements) -> String {
    let mut prompt = format!(
        "Request:\n{task_text}\n\nMeasured: {}\n",
        measurements.summary()
    );
    if let Some(solids) = measurements.solid_count {
        prompt.push_str(&format!("Solids: {solids}\n"));
    }
    for (label, svg) in [("Isometric view", &views.iso_svg), ("Front view", &views.front_svg)] {
        if let Some(svg) = svg {
            let excerpt: String = svg.chars().take(MAX_VIEW_CHARS).collect();
            prompt.push_str(&format!("\n{label} (SVG):\n{excerpt}\n"));
        }
    }
    prompt.push_str(
        "\nAnswer with exactly these lines and nothing else:\n\
         CATEGORY: <one or two words naming what the shape looks like>\n\
         MATCH: <yes|no>\n\
         MISSING: <features from the request that are absent, or none>\n\
         PROPORTIONS: <proportion problems, or none>\n\
         CONFIDENCE: <1-10>\n\
         FIX: <one-line instruction to correct the model, or none>\n",
    );
    prompt
}

fn optional(value: &str) -> Option<String> {
    let v = value.trim();
    let lower = v.to_ascii_lowercase();
    if v.is_empty() || lower == "none" || lower == "n/a" || lower == "-" {
        None
    } else {
        Some(v.to_string())
    }
}

/// Parse a critic reply into a verdict.
pub fn parse_verdict(reply: &str) -> VisualVerdict {
    let mut matches = false;
    let mut confidence = DEFAULT_CONFIDENCE;
    let mut category = None;
    let mut missing = None;
    let mut proportions = None;
    let mut critique = None;

    for line in reply.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace());
        let value = value.trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace());
        match label.trim().to_ascii_lowercase().as_str() {
            "category" => category = optional(value),
            "match" => {
                let v = value.trim().to_ascii_lowercase();
                matches = v.starts_with("yes") || v.starts_with("true");
            }
            "missing" => missing = optional(value),
            "proportions" => proportions = optional(value),
            "confidence" => {
                let digits: String = value
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(n) = digits.parse::<u32>() {
                    confidence = n.min(10) as u8;
                }
            }
            "fix" => critique = optional(value),
            _ => {}
        }
    }

    let mut verdict = VisualVerdict::new(matches, confidence);
    verdict.category = category;
    verdict.missing = missing;
    verdict.proportions_issue = proportions;
    verdict.critique = critique;
    verdict
}

/// [`VisualCritic`] backed by a [`TextBackend`].
#[derive(Clone)]
pub struct ModelCritic {
    backend: Arc<dyn TextBackend>,
    timeout: Duration,
}

impl ModelCritic {
    pub fn new(backend: Arc<dyn TextBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }
}

#[async_trait]
impl VisualCritic for ModelCritic {
    async fn assess(
        &self,
        task_text: &str,
        views: &RenderedViews,
        measurements: &Measurements,
    ) -> AdapterResult<VisualVerdict> {
        if views.is_empty() {
            return Err(AdapterError::Malformed("no rendered views".to_string()));
        }
        let prompt = critic_prompt(task_text, views, measurements);
        let reply = self
            .backend
            .complete(CRITIC_SYSTEM, &prompt, self.timeout)
            .await?;
        Ok(parse_verdict(&reply))
    }
}
