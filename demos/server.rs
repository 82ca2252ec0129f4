use argh::FromArgs;
use auspex::{
    FieldSpec, InputKind, InputValue, Inputs, Prediction, PredictiveModel, Schema, serve,
};
use thiserror::Error;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(FromArgs)]
/// Serve a demo text-repeating model over HTTP.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,
}

#[derive(Debug, Error)]
enum RepeaterError {
    #[error("input {0} did not match the declared schema")]
    BadInput(&'static str),
}

/// Demo model: repeats a line of text, optionally shouting.
struct RepeaterModel;

impl PredictiveModel for RepeaterModel {
    type Error = RepeaterError;

    fn input_schema(&self) -> Schema {
        Schema::Declared(vec![
            FieldSpec::new("text", InputKind::Str).with_help("the text to repeat"),
            FieldSpec::new("count", InputKind::Int)
                .with_help("how many times to repeat it")
                .with_default(InputValue::Int(1))
                .with_min(1.0)
                .with_max(100.0),
            FieldSpec::new("shout", InputKind::Bool)
                .with_help("uppercase the output")
                .with_default(InputValue::Bool(false)),
        ])
    }

    fn predict(&mut self, inputs: Inputs) -> Result<Prediction, RepeaterError> {
        let Some(InputValue::Str(text)) = inputs.get("text") else {
            return Err(RepeaterError::BadInput("text"));
        };
        let Some(InputValue::Int(count)) = inputs.get("count") else {
            return Err(RepeaterError::BadInput("count"));
        };
        let Some(InputValue::Bool(shout)) = inputs.get("shout") else {
            return Err(RepeaterError::BadInput("shout"));
        };

        let line = if *shout { text.to_uppercase() } else { text.clone() };
        let lines = vec![line; *count as usize];
        Ok(Prediction::Text(lines.join("\n")))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    let addr = format!("{}:{}", args.host, args.port);
    log::info!("Starting the demo model server on {addr}");

    serve(RepeaterModel, &addr).await
}
