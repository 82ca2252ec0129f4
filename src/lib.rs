//! Serving shell for a single predictive model over HTTP.
//!
//! Clients post `multipart/form-data` inputs to `/predict`; the server
//! validates and converts them against the model's declared schema, runs the
//! prediction on a dedicated worker thread, and answers with a file download,
//! plain text, or JSON, carrying `X-Setup-Time`/`X-Run-Time` headers.

pub mod engine;
pub mod inputs;
pub mod model;
pub mod schema;
pub mod server;

pub use engine::{Engine, EngineError, EngineState, TimedPrediction};
pub use inputs::{CleanupRegistry, InputError, InputValue, Inputs, RawValue, Upload};
pub use model::{Prediction, PredictiveModel};
pub use schema::{FieldSpec, InputKind, Schema};
pub use server::{ServerState, create_router, serve};
