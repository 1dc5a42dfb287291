//! Code generation over a text backend.
//!
//! [`ModelGenerator`] wraps a [`TextBackend`] with the create/modify prompt
//! shapes and runs every response through the code extractor.

pub mod backend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::GenerationAdapter;
use crate::domain::{AdapterError, AdapterResult, DEFAULT_MATERIAL};
use crate::extract::extract_source;

pub use backend::{CliBackend, TextBackend};

/// Preamble for fresh generations.
pub const CREATE_WRAPPER: &str = "\
You are a CadQuery code generator. Generate ONLY a complete, runnable Python CadQuery script.

CRITICAL RULES:
- Output ONLY Python code inside a single ```python``` block
- Do NOT explain, validate, execute, or export. Just output the code
- The script must assign the final shape to a variable named `result`
- Include proper parametric variables with [mm] comments
- Follow all CadQuery best practices from your system prompt

User request:
";

/// Preamble for edits of an existing script.
pub const MODIFY_WRAPPER: &str = "\
You are a CadQuery code editor. Apply the requested change to the existing script \
and output the COMPLETE updated script.

CRITICAL RULES:
- Output ONLY Python code inside a single ```python``` block
- Keep every parameter and feature that the change does not touch
- The script must assign the final shape to a variable named `result`
- Do NOT explain, validate, execute, or export. Just output the code
";

/// Build the create-mode prompt.
pub fn create_prompt(task_text: &str, material: &str) -> String {
    let mut prompt = format!("{CREATE_WRAPPER}{task_text}");
    push_material(&mut prompt, material);
    prompt
}

/// Build the modify-mode prompt.
pub fn modify_prompt(previous_source: &str, directive: &str, material: &str) -> String {
    let mut prompt = format!(
        "{MODIFY_WRAPPER}\nExisting script:\n```python\n{previous_source}\n```\n\nRequested change:\n{directive}"
    );
    push_material(&mut prompt, material);
    prompt
}

fn push_material(prompt: &mut String, material: &str) {
    if material != DEFAULT_MATERIAL {
        prompt.push_str("\n\nMaterial: ");
        prompt.push_str(material);
    }
}

/// [`GenerationAdapter`] backed by any [`TextBackend`].
#[derive(Clone)]
pub struct ModelGenerator {
    backend: Arc<dyn TextBackend>,
    timeout: Duration,
}

impl ModelGenerator {
    pub fn new(backend: Arc<dyn TextBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    async fn complete_code(&self, system: &str, prompt: &str) -> AdapterResult<String> {
        let response = self.backend.complete(system, prompt, self.timeout).await?;
        extract_source(&response).ok_or(AdapterError::NoCode)
    }
}

#[async_trait]
impl GenerationAdapter for ModelGenerator {
    fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    async fn generate(
        &self,
        context: &str,
        task_text: &str,
        material: &str,
    ) -> AdapterResult<String> {
        self.complete_code(context, &create_prompt(task_text, material))
            .await
    }

    async fn modify(
        &self,
        context: &str,
        previous_source: &str,
        directive: &str,
        material: &str,
    ) -> AdapterResult<String> {
        self.complete_code(context, &modify_prompt(previous_source, directive, material))
            .await
    }
}
