//! Generative dimension lookup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::DimensionLookup;
use crate::domain::AdapterResult;
use crate::generation::TextBackend;

/// Reply meaning "nothing to look up".
pub const NO_DIMENSIONS: &str = "NONE";

pub const LOOKUP_SYSTEM: &str = "\
You are a dimensions reference. Answer with measured real-world dimensions \
only. Never invent values you are unsure of.";

/// Header placed above a lookup answer.
pub const LOOKUP_HEADER: &str = "REAL-WORLD DIMENSIONS (from dimension lookup):";

pub fn lookup_prompt(task_text: &str) -> String {
    format!(
        "List the real-world dimensions (in mm) of every commercially available \
         object named in this request that the printed part must fit or hold. \
         One object per line: `- <object>: <L> x <W> x <H> mm` plus any hole or \
         port positions. If the request names no such object, reply with exactly \
         {NO_DIMENSIONS}.\n\nRequest:\n{task_text}"
    )
}

/// [`DimensionLookup`] backed by a [`TextBackend`].
#[derive(Clone)]
pub struct ModelDimensionLookup {
    backend: Arc<dyn TextBackend>,
    timeout: Duration,
}

impl ModelDimensionLookup {
    pub fn new(backend: Arc<dyn TextBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }
}

#[async_trait]
impl DimensionLookup for ModelDimensionLookup {
    async fn lookup_generative(&self, task_text: &str) -> AdapterResult<Option<String>> {
        let reply = self
            .backend
            .complete(LOOKUP_SYSTEM, &lookup_prompt(task_text), self.timeout)
            .await?;
        let reply = reply.trim();
        if reply.is_empty() || reply.eq_ignore_ascii_case(NO_DIMENSIONS) {
            return Ok(None);
        }
        Ok(Some(format!("{LOOKUP_HEADER}\n{reply}")))
    }
}
