use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::engine::{Engine, TimedPrediction};
use crate::inputs::{
    CleanupRegistry, InputError, Inputs, RawValue, Upload, merge_raw_inputs, validate_and_convert,
};
use crate::model::{Prediction, PredictiveModel};
use crate::schema::Schema;

/// Maximum accepted request body size; file inputs can be large.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Shared state behind the HTTP handlers: the engine owning the model.
pub struct ServerState<M: PredictiveModel + Send + 'static> {
    engine: Engine<M>,
}

impl<M: PredictiveModel + Send + 'static> ServerState<M> {
    /// Builds the state, running the model's one-time setup via the engine.
    pub fn new(model: M) -> Result<Self, M::Error> {
        Ok(Self {
            engine: Engine::new(model)?,
        })
    }
}

/// Wires the HTTP surface for one model.
pub fn create_router<M>(state: Arc<ServerState<M>>) -> Router
where
    M: PredictiveModel + Send + 'static,
{
    Router::new()
        .route("/predict", post(handle_predict::<M>))
        // deprecated alias of /predict
        .route("/infer", post(handle_predict::<M>))
        .route("/ping", get(ping))
        .route("/help", get(help::<M>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Runs the model's setup, binds `addr` and serves the router until shutdown.
pub async fn serve<M>(model: M, addr: &str) -> Result<(), Box<dyn std::error::Error>>
where
    M: PredictiveModel + Send + 'static,
{
    let state = Arc::new(ServerState::new(model)?);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on: {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Body of a client input error response.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// How a failed request is rendered.
enum RequestError {
    /// Client input error: 400 with `{"message": ...}`.
    Input(InputError),
    /// Model or engine fault: plain 500 with the error text.
    Server(String),
}

impl From<InputError> for RequestError {
    fn from(err: InputError) -> Self {
        RequestError::Input(err)
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        match self {
            RequestError::Input(err) => {
                log::debug!("Rejecting request: {err}");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody {
                        message: err.to_string(),
                    }),
                )
                    .into_response()
            }
            RequestError::Server(message) => {
                log::error!("Request failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

async fn handle_predict<M>(
    State(state): State<Arc<ServerState<M>>>,
    multipart: Multipart,
) -> Response
where
    M: PredictiveModel + Send + 'static,
{
    // Run time covers the whole request path: input collection, validation
    // and conversion (upload materialization included), and the model call.
    let run_start = Instant::now();

    let raw = match collect_raw_inputs(multipart).await {
        Ok(raw) => raw,
        Err(err) => return RequestError::Input(err).into_response(),
    };

    // Cleanup actions registered during conversion run after the prediction
    // finishes, success or failure, before the response goes out.
    let mut cleanup = CleanupRegistry::new();
    let outcome = run_pipeline(&state, raw, &mut cleanup).await;
    let run_time = run_start.elapsed();
    cleanup.run_all();

    match outcome {
        Ok(timed) => {
            build_response(timed.prediction, state.engine.setup_time(), run_time).await
        }
        Err(err) => err.into_response(),
    }
}

/// Reads every multipart part into the raw input map. Parts carrying a file
/// name are uploads, the rest are form fields.
async fn collect_raw_inputs(
    mut multipart: Multipart,
) -> Result<HashMap<String, RawValue>, InputError> {
    let read_err = |e: axum::extract::multipart::MultipartError| {
        InputError::Malformed(e.to_string())
    };
    let mut fields = Vec::new();
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(read_err)? {
        let Some(name) = field.name().map(str::to_string) else {
            return Err(InputError::Malformed(
                "multipart part is missing a field name".to_string(),
            ));
        };
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let bytes = field.bytes().await.map_err(read_err)?;
                uploads.push((
                    name,
                    Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    },
                ));
            }
            None => {
                let text = field.text().await.map_err(read_err)?;
                fields.push((name, text));
            }
        }
    }
    merge_raw_inputs(fields, uploads)
}

/// Validation/conversion and model invocation: everything the cleanup scope
/// wraps. Validation failures short-circuit before the model is invoked.
async fn run_pipeline<M>(
    state: &ServerState<M>,
    raw: HashMap<String, RawValue>,
    cleanup: &mut CleanupRegistry,
) -> Result<TimedPrediction, RequestError>
where
    M: PredictiveModel + Send + 'static,
{
    let inputs = match state.engine.schema() {
        Schema::Declared(specs) => Inputs::Typed(validate_and_convert(specs, raw, cleanup)?),
        Schema::Absent => Inputs::Raw(raw),
    };
    state
        .engine
        .predict(inputs)
        .await
        .map_err(|e| RequestError::Server(e.to_string()))
}

/// Turns the prediction into the matching response shape and attaches the
/// timing headers. Closed three-way dispatch: file, text, or JSON.
async fn build_response(
    prediction: Prediction,
    setup_time: Duration,
    run_time: Duration,
) -> Response {
    let mut response = match prediction {
        Prediction::File(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".to_string());
                let disposition =
                    HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
                        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
                (
                    [
                        (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
                        (CONTENT_DISPOSITION, disposition),
                    ],
                    bytes,
                )
                    .into_response()
            }
            Err(e) => {
                return RequestError::Server(format!(
                    "could not read prediction output {}: {e}",
                    path.display()
                ))
                .into_response();
            }
        },
        Prediction::Text(text) => text.into_response(),
        Prediction::Structured(value) => Json(value).into_response(),
    };
    let headers = response.headers_mut();
    headers.insert("X-Setup-Time", duration_header(setup_time));
    headers.insert("X-Run-Time", duration_header(run_time));
    response
}

fn duration_header(duration: Duration) -> HeaderValue {
    HeaderValue::from_str(&duration.as_secs_f64().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}

async fn ping() -> &'static str {
    "PONG"
}

async fn help<M>(State(state): State<Arc<ServerState<M>>>) -> Json<serde_json::Value>
where
    M: PredictiveModel + Send + 'static,
{
    Json(state.engine.schema().help_document())
}
