use std::path::PathBuf;

use crate::inputs::Inputs;
use crate::schema::Schema;

/// Trait for implementing predictive models that can be served by the engine.
///
/// Users implement this trait to define their model's one-time setup, its
/// declared input schema, and the prediction logic itself.
pub trait PredictiveModel {
    /// The error type that can be returned during setup or prediction.
    type Error: std::error::Error + Send + Sync + 'static;

    /// One-time initialization, run exactly once before any prediction is
    /// served. Expensive work (loading weights, warming caches) belongs here.
    fn setup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// The declared input schema. Models without one return `Schema::Absent`
    /// and receive the raw form inputs unvalidated.
    fn input_schema(&self) -> Schema {
        Schema::Absent
    }

    /// Runs a prediction on validated inputs and returns the result.
    fn predict(&mut self, inputs: Inputs) -> Result<Prediction, Self::Error>;
}

/// The result of one prediction.
///
/// This is a closed union: the response builder dispatches exhaustively on
/// these three shapes and no others exist.
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    /// A file on disk, returned to the client as a binary download.
    File(PathBuf),
    /// Verbatim text, returned as `text/plain`.
    Text(String),
    /// Any other structured value, returned as JSON.
    Structured(serde_json::Value),
}
