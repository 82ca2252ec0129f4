use std::{
    sync::{Arc, Mutex, mpsc},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::inputs::Inputs;
use crate::model::{Prediction, PredictiveModel};
use crate::schema::Schema;

/// Represents the current state of the prediction engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// The engine is idle and ready to accept a new prediction request.
    Idle,
    /// The engine is currently running a prediction.
    Processing,
}

impl EngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
        }
    }
}

/// A prediction together with the wall-clock time its model call took.
#[derive(Debug)]
pub struct TimedPrediction {
    pub prediction: Prediction,
    pub run_time: Duration,
}

/// Errors surfaced when requesting a prediction from the engine.
#[derive(Debug, Error)]
pub enum EngineError<E: std::error::Error> {
    /// The worker thread has shut down and no longer accepts requests.
    #[error("prediction engine has stopped")]
    Stopped,
    /// The model's own prediction logic failed.
    #[error("model prediction failed: {0}")]
    Model(E),
}

struct Job<M: PredictiveModel> {
    inputs: Inputs,
    reply_tx: tokio::sync::oneshot::Sender<Result<TimedPrediction, M::Error>>,
}

/// Prediction engine that owns the model on a dedicated worker thread.
///
/// Construction runs the model's one-time setup, timing it once for the
/// lifetime of the engine. Requests are processed strictly one at a time in
/// arrival order; the worker thread is the serialization point for the
/// shared model instance. Each model call is individually timed.
pub struct Engine<M: PredictiveModel + Send + 'static> {
    schema: Schema,
    setup_time: Duration,
    state: Arc<Mutex<EngineState>>,
    req_tx: Option<mpsc::Sender<Job<M>>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl<M: PredictiveModel + Send + 'static> Engine<M> {
    /// Creates a new engine, running and timing the model's setup.
    ///
    /// The input schema is captured here, once; the model then moves to the
    /// background worker thread. Setup failure aborts construction.
    pub fn new(mut model: M) -> Result<Self, M::Error> {
        let schema = model.input_schema();

        let setup_start = Instant::now();
        model.setup()?;
        let setup_time = setup_start.elapsed();
        log::info!("Model setup completed in {:.3}s", setup_time.as_secs_f64());

        let (req_tx, req_rx) = mpsc::channel::<Job<M>>();
        let state = Arc::new(Mutex::new(EngineState::Idle));

        let worker_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(job) = req_rx.recv() {
                    log::debug!("Scheduling a new prediction");

                    set_state(&state, EngineState::Processing);
                    let run_start = Instant::now();

                    let result = model.predict(job.inputs);
                    let run_time = run_start.elapsed();

                    match &result {
                        Ok(_) => {
                            log::debug!("Prediction completed in {:.3}s", run_time.as_secs_f64())
                        }
                        Err(e) => log::warn!("Prediction failed: {e}"),
                    }

                    let _ = job
                        .reply_tx
                        .send(result.map(|prediction| TimedPrediction {
                            prediction,
                            run_time,
                        }));

                    set_state(&state, EngineState::Idle);
                }
            }
        });

        Ok(Self {
            schema,
            setup_time,
            state,
            req_tx: Some(req_tx),
            worker_handle: Some(worker_handle),
        })
    }

    /// The input schema captured at construction.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// How long the model's one-time setup took.
    pub fn setup_time(&self) -> Duration {
        self.setup_time
    }

    /// Returns the current state of the prediction engine.
    pub fn state(&self) -> EngineState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs one prediction to completion and returns it with its run time.
    ///
    /// The request is queued to the worker thread and awaited; a model error
    /// is reported for this request only, the worker keeps serving.
    pub async fn predict(&self, inputs: Inputs) -> Result<TimedPrediction, EngineError<M::Error>> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.req_tx
            .as_ref()
            .ok_or(EngineError::Stopped)?
            .send(Job { inputs, reply_tx })
            .map_err(|_| EngineError::Stopped)?;
        reply_rx
            .await
            .map_err(|_| EngineError::Stopped)?
            .map_err(EngineError::Model)
    }

    /// Stops the engine and shuts down the background worker thread.
    ///
    /// Closes the request channel and waits for the worker to finish any
    /// request it is still processing.
    pub fn stop(&mut self) {
        log::debug!("Stopping prediction engine ({})", self.state().as_str());
        self.req_tx.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: PredictiveModel + Send + 'static> Drop for Engine<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<EngineState>, next: EngineState) {
    *state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::InputValue;
    use crate::schema::{FieldSpec, InputKind};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct ToyError(String);

    struct ToyModel {
        setup_calls: Arc<AtomicUsize>,
        fail_on: Option<String>,
    }

    impl PredictiveModel for ToyModel {
        type Error = ToyError;

        fn setup(&mut self) -> Result<(), ToyError> {
            self.setup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn input_schema(&self) -> Schema {
            Schema::Declared(vec![FieldSpec::new("text", InputKind::Str)])
        }

        fn predict(&mut self, inputs: Inputs) -> Result<Prediction, ToyError> {
            let Some(InputValue::Str(text)) = inputs.get("text") else {
                return Err(ToyError("missing text".to_string()));
            };
            if self.fail_on.as_deref() == Some(text.as_str()) {
                return Err(ToyError(format!("refusing {text}")));
            }
            Ok(Prediction::Text(text.to_uppercase()))
        }
    }

    fn text_inputs(text: &str) -> Inputs {
        let mut map = HashMap::new();
        map.insert("text".to_string(), InputValue::Str(text.to_string()));
        Inputs::Typed(map)
    }

    #[tokio::test]
    async fn setup_runs_once_and_is_timed() {
        let setup_calls = Arc::new(AtomicUsize::new(0));
        let engine = Engine::new(ToyModel {
            setup_calls: setup_calls.clone(),
            fail_on: None,
        })
        .unwrap();

        assert_eq!(setup_calls.load(Ordering::SeqCst), 1);

        let first = engine.predict(text_inputs("hi")).await.unwrap();
        let second = engine.predict(text_inputs("there")).await.unwrap();
        assert_eq!(first.prediction, Prediction::Text("HI".to_string()));
        assert_eq!(second.prediction, Prediction::Text("THERE".to_string()));
        assert_eq!(setup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_error_does_not_stop_the_worker() {
        let engine = Engine::new(ToyModel {
            setup_calls: Arc::new(AtomicUsize::new(0)),
            fail_on: Some("bad".to_string()),
        })
        .unwrap();

        let err = engine.predict(text_inputs("bad")).await.unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));

        let ok = engine.predict(text_inputs("good")).await.unwrap();
        assert_eq!(ok.prediction, Prediction::Text("GOOD".to_string()));
    }

    #[tokio::test]
    async fn stopped_engine_rejects_requests() {
        let mut engine = Engine::new(ToyModel {
            setup_calls: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
        })
        .unwrap();
        engine.stop();

        let err = engine.predict(text_inputs("hi")).await.unwrap_err();
        assert!(matches!(err, EngineError::Stopped));
        assert_eq!(engine.state(), EngineState::Idle);
    }
}
