//! Ordered interception chains applied around the stub-match step.
//!
//! Both chains are built exactly once at server start from the collected
//! [`ExtensionRegistration`]s and are read-only for the server's lifetime,
//! so any number of workers can traverse them without locking. Ordering is
//! explicit data: an ascending priority key, defaulting to registration
//! order, with registration order as the tie-breaker. For a fixed set of
//! registrations and a fixed request the pipeline output is reproducible;
//! the shared settings store is the only sanctioned external influence.

mod correlation;

pub use correlation::CorrelationFilter;

use crate::error::{ExtensionError, StartError};
use crate::exchange::{FilterAction, MockResponse, ServedRequest};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Per-call parameter bag handed to response transformers, taken from the
/// matched stub's `transformerParameters` (empty for filter-stop responses).
pub type TransformParams = HashMap<String, serde_json::Value>;

/// A request filter runs before stub matching and may short-circuit it.
pub trait RequestFilter: Send + Sync {
    fn filter(&self, request: ServedRequest) -> anyhow::Result<FilterAction>;
}

/// A response transformer replaces the outbound response after one exists,
/// with read-only access to the original request.
pub trait ResponseTransformer: Send + Sync {
    fn transform(
        &self,
        response: MockResponse,
        request: &ServedRequest,
        parameters: &TransformParams,
    ) -> anyhow::Result<MockResponse>;
}

/// The capability carried by a registration.
#[derive(Clone)]
pub enum ExtensionKind {
    Filter(Arc<dyn RequestFilter>),
    Transformer(Arc<dyn ResponseTransformer>),
}

/// A named, ordered extension collected at server start.
#[derive(Clone)]
pub struct ExtensionRegistration {
    pub name: String,
    /// Explicit ordering key. `None` means "registration order": the
    /// registration's index is used as the effective priority.
    pub priority: Option<i32>,
    pub kind: ExtensionKind,
}

impl ExtensionRegistration {
    pub fn filter(name: impl Into<String>, filter: Arc<dyn RequestFilter>) -> Self {
        Self {
            name: name.into(),
            priority: None,
            kind: ExtensionKind::Filter(filter),
        }
    }

    pub fn transformer(
        name: impl Into<String>,
        transformer: Arc<dyn ResponseTransformer>,
    ) -> Self {
        Self {
            name: name.into(),
            priority: None,
            kind: ExtensionKind::Transformer(transformer),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

struct NamedFilter {
    name: String,
    filter: Arc<dyn RequestFilter>,
}

struct NamedTransformer {
    name: String,
    transformer: Arc<dyn ResponseTransformer>,
}

/// Outcome of running the request filter chain.
#[derive(Debug)]
pub enum FilterOutcome {
    /// Every filter returned `Continue`; this is the final request for the
    /// stub-match step.
    Pass(ServedRequest),
    /// A filter stopped the chain; remaining filters and stub matching are
    /// skipped. The name of the stopping filter travels with the response.
    Stopped {
        response: MockResponse,
        stopped_by: String,
    },
}

/// Immutable filter/transformer chains, shared across all workers.
pub struct Pipeline {
    filters: Arc<[NamedFilter]>,
    transformers: Arc<[NamedTransformer]>,
}

impl Pipeline {
    /// Build both chains. Duplicate registration names are a fatal
    /// configuration error, surfaced before any port is bound.
    pub fn build(registrations: &[ExtensionRegistration]) -> Result<Self, StartError> {
        let mut seen = HashSet::new();
        for registration in registrations {
            if !seen.insert(registration.name.clone()) {
                return Err(StartError::DuplicateExtension(registration.name.clone()));
            }
        }

        // Effective priority defaults to registration order; the stable sort
        // keeps registration order as the tie-breaker for equal priorities.
        let mut ordered: Vec<(i32, usize, &ExtensionRegistration)> = registrations
            .iter()
            .enumerate()
            .map(|(index, r)| (r.priority.unwrap_or(index as i32), index, r))
            .collect();
        ordered.sort_by_key(|(priority, index, _)| (*priority, *index));

        let mut filters = Vec::new();
        let mut transformers = Vec::new();
        for (_, _, registration) in ordered {
            match &registration.kind {
                ExtensionKind::Filter(filter) => filters.push(NamedFilter {
                    name: registration.name.clone(),
                    filter: Arc::clone(filter),
                }),
                ExtensionKind::Transformer(transformer) => transformers.push(NamedTransformer {
                    name: registration.name.clone(),
                    transformer: Arc::clone(transformer),
                }),
            }
        }

        Ok(Self {
            filters: filters.into(),
            transformers: transformers.into(),
        })
    }

    /// Run the filter chain in ascending priority order. The first `Stop`
    /// short-circuits the rest of the chain.
    pub fn apply_filters(&self, request: ServedRequest) -> Result<FilterOutcome, ExtensionError> {
        let mut current = request;
        for entry in self.filters.iter() {
            match entry.filter.filter(current) {
                Ok(FilterAction::Continue(next)) => current = next,
                Ok(FilterAction::Stop(response)) => {
                    return Ok(FilterOutcome::Stopped {
                        response,
                        stopped_by: entry.name.clone(),
                    })
                }
                Err(source) => {
                    return Err(ExtensionError {
                        extension: entry.name.clone(),
                        source,
                    })
                }
            }
        }
        Ok(FilterOutcome::Pass(current))
    }

    /// Run the transformer chain in ascending priority order. Every response
    /// that reaches write-out passes through here, whether it came from a
    /// filter stop or a stub match.
    pub fn apply_transformers(
        &self,
        response: MockResponse,
        request: &ServedRequest,
        parameters: &TransformParams,
    ) -> Result<MockResponse, ExtensionError> {
        let mut current = response;
        for entry in self.transformers.iter() {
            current = entry
                .transformer
                .transform(current, request, parameters)
                .map_err(|source| ExtensionError {
                    extension: entry.name.clone(),
                    source,
                })?;
        }
        Ok(current)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn transformer_count(&self) -> usize {
        self.transformers.len()
    }
}
