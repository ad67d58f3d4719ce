//! Stub compilation and text-to-endpoint routing.
//!
//! A [`Descriptor`](sa_protocol::Descriptor) is compiled into [`Stub`]s held
//! by a [`StubStore`]; the [`RulesEngine`] routes free text to one of them
//! and classifies the outcome with a [`Policy`].

pub mod confidence;
pub mod error;
pub mod extractor;
pub mod patterns;
pub mod policy;
pub mod rerank;
pub mod rules;
pub mod store;
pub mod stubs;
pub mod vocab;

pub use confidence::{ConfidenceScorer, ScoreWeights};
pub use error::{RouterError, RouterResult};
pub use extractor::ParameterExtractor;
pub use policy::{Policy, PolicyPreset, RerankerBackend, TelemetryConfig};
pub use rerank::{LinearReranker, Reranker};
pub use rules::{Candidate, RulesEngine};
pub use store::{StubIndex, StubStore};
pub use stubs::{Stub, compile_descriptor};
