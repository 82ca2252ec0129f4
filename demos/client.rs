use argh::FromArgs;
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5000;

#[derive(FromArgs)]
/// Client for a model server: run predictions and inspect the input schema.
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "predict", "schema" or "ping"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Predict(PredictCommand),
    Help(HelpCommand),
    Ping(PingCommand),
}

#[derive(FromArgs)]
/// Run a prediction from form fields and optional file uploads
#[argh(subcommand, name = "predict")]
struct PredictCommand {
    /// a form field as name=value, repeatable
    #[argh(option, short = 'f')]
    field: Vec<String>,

    /// a file upload as name=path, repeatable
    #[argh(option, short = 'u')]
    upload: Vec<String>,
}

#[derive(FromArgs)]
/// Fetch the model's input schema
#[argh(subcommand, name = "schema")]
struct HelpCommand {}

#[derive(FromArgs)]
/// Check that the server is alive
#[argh(subcommand, name = "ping")]
struct PingCommand {}

fn split_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Predict(predict) => {
            let mut form = reqwest::multipart::Form::new();
            for raw in &predict.field {
                let (name, value) = split_pair(raw)?;
                form = form.text(name, value);
            }
            for raw in &predict.upload {
                let (name, path) = split_pair(raw)?;
                let path = PathBuf::from(path);
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = tokio::fs::read(&path).await?;
                form = form.part(
                    name,
                    reqwest::multipart::Part::bytes(bytes).file_name(filename),
                );
            }

            let response = client
                .post(format!("http://{addr}/predict"))
                .multipart(form)
                .send()
                .await?;

            println!("Status: {}", response.status());
            for header in ["X-Setup-Time", "X-Run-Time"] {
                if let Some(value) = response.headers().get(header) {
                    println!("{header}: {}", value.to_str().unwrap_or("?"));
                }
            }
            println!("{}", response.text().await?);
        }
        ClientCommands::Help(_) => {
            let response = client.get(format!("http://{addr}/help")).send().await?;
            let result = response.json::<serde_json::Value>().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ClientCommands::Ping(_) => {
            let response = client.get(format!("http://{addr}/ping")).send().await?;
            println!("{}", response.text().await?);
        }
    }

    Ok(())
}
