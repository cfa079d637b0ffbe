//! The request pipeline: filtering, orchestration and the host facade.

mod filters;
mod format;
mod orchestrator;
mod service;

pub use filters::{SkipReason, TextFilter};
pub use format::format_translation;
pub use orchestrator::{Orchestrator, Outcome, PipelineStats, Translation};
pub use service::{ServiceBuilder, ServiceStats, TranslationService};
