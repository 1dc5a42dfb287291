//! Prompt enrichment with reference dimensions.
//!
//! Two sources run concurrently: the static [`ReferenceLibrary`] keyword
//! match and an optional generative [`DimensionLookup`]. Either may come back
//! empty, fail or time out; all three mean "no contribution".

pub mod dynamic;
pub mod library;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapters::{bounded, DimensionLookup, ReferenceLookup};

pub use dynamic::ModelDimensionLookup;
pub use library::ReferenceLibrary;

/// Separator between the enrichment block and the task.
pub const USER_REQUEST_MARKER: &str = "\n\nUser request:\n";

/// Contributions gathered for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub static_text: Option<String>,
    pub dynamic_text: Option<String>,
    /// Whether the generative lookup was invoked.
    pub lookup_called: bool,
    /// Why the generative lookup contributed nothing, if it failed.
    pub lookup_error: Option<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.static_text.is_none() && self.dynamic_text.is_none()
    }

    /// Enriched task text: static first, then dynamic, then the task.
    pub fn compose(&self, task_text: &str) -> String {
        let parts: Vec<&str> = [self.static_text.as_deref(), self.dynamic_text.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            return task_text.to_string();
        }
        format!("{}{USER_REQUEST_MARKER}{task_text}", parts.join("\n\n"))
    }
}

/// Runs both lookups for a task.
#[derive(Clone)]
pub struct Enricher {
    reference: Arc<dyn ReferenceLookup>,
    dimensions: Option<Arc<dyn DimensionLookup>>,
    lookup_timeout: Duration,
}

impl Enricher {
    pub fn new(reference: Arc<dyn ReferenceLookup>, lookup_timeout: Duration) -> Self {
        Self {
            reference,
            dimensions: None,
            lookup_timeout,
        }
    }

    pub fn with_dimension_lookup(mut self, lookup: Arc<dyn DimensionLookup>) -> Self {
        self.dimensions = Some(lookup);
        self
    }

    /// Static library only, no generative lookup.
    pub fn static_only() -> Self {
        Self::new(
            Arc::new(ReferenceLibrary::embedded().clone()),
            Duration::from_secs(30),
        )
    }

    pub async fn enrich(&self, task_text: &str) -> Enrichment {
        let static_fut = async {
            let text = self.reference.lookup_by_keyword(task_text);
            (!text.trim().is_empty()).then_some(text)
        };
        let dynamic_fut = async {
            match &self.dimensions {
                None => (false, None, None),
                Some(lookup) => {
                    match bounded(
                        "dimension lookup",
                        self.lookup_timeout,
                        lookup.lookup_generative(task_text),
                    )
                    .await
                    {
                        Ok(Some(text)) if !text.trim().is_empty() => (true, Some(text), None),
                        Ok(_) => (true, None, None),
                        Err(e) => {
                            warn!(error = %e, "dimension lookup failed; continuing without it");
                            (true, None, Some(e.to_string()))
                        }
                    }
                }
            }
        };

        let (static_text, (lookup_called, dynamic_text, lookup_error)) =
            tokio::join!(static_fut, dynamic_fut);

        debug!(
            static_chars = static_text.as_ref().map_or(0, String::len),
            dynamic_chars = dynamic_text.as_ref().map_or(0, String::len),
            "enrichment gathered"
        );

        Enrichment {
            static_text,
            dynamic_text,
            lookup_called,
            lookup_error,
        }
    }
}
