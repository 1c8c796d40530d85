//! Runtime for CMS-authored page journeys.
//!
//! A flow is a graph of `start`, `page`, `condition`, `apiCondition` and `end` nodes joined
//! by optionally conditioned edges. [`FlowRunner`] keeps a per-flow JSON context, merges form
//! submissions into it, calls node APIs with templated bodies, maps their responses back into
//! the context and picks the next node with first-match edge selection.
#![forbid(unsafe_code)]

pub mod api;
pub mod condition;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod json_output;
pub mod lint;
pub mod loader;
pub mod mapping;
pub mod model;
pub mod navigator;
pub mod resolve;
pub mod runner;
pub mod storage;
pub mod template;

pub use api::{ApiFailurePolicy, ApiInvoker, HttpTransport, ReqwestTransport};
pub use condition::Condition;
pub use config::RunnerConfig;
pub use content::{ContentResolver, Destination, StaticContent};
pub use context::{ContextStore, FlowContext};
pub use error::{ApiError, FlowError, Result};
pub use loader::{load_flow_from_path, load_flow_from_str, load_flow_from_value};
pub use mapping::extract_and_map;
pub use model::{Edge, FlowDoc, FlowGraph, Node, NodeKind};
pub use navigator::FlowNavigator;
pub use runner::{FlowRunner, FormSubmission, StepOutcome};
pub use storage::{ContextPersistence, FileStorage, MemoryStorage};
pub use template::interpolate;
