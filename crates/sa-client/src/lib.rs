//! Client orchestrator for socket-agent services.
//!
//! A [`Client`] consumes a descriptor once, compiles it into stubs, and
//! then answers free text or explicit stub calls: route, check the cache,
//! execute over HTTP, render, and record telemetry. Text the rules engine
//! cannot place confidently goes to an optional [`Interpreter`].

pub mod client;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod render;
pub mod telemetry;

pub use client::{Client, ClientBuilder, LLM_FALLBACK, Request, StubExport};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use interpreter::Interpreter;
pub use render::{PlainRenderer, Renderer};
pub use telemetry::{EndpointStats, EventFilter, Telemetry, TelemetryExport, TelemetrySummary};
