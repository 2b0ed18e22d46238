use std::io::Write;

use clap::Parser;
use futures::StreamExt;
use ollama_relay::config::Config;
use ollama_relay::relay::{GenerationRequest, RelayStream, StreamEnd, StreamRelay};

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct GenerateCommand {
    #[clap(long, short, help = "Model to generate with")]
    pub model: String,

    #[clap(long, short, help = "System prompt (defaults to the configured one)")]
    pub system: Option<String>,

    #[clap(long, short, help = "Sampling temperature")]
    pub temperature: Option<f32>,

    #[clap(help = "Prompt text")]
    pub prompt: String,
}

impl GenerateCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let relay = StreamRelay::new(config)?;

        let stream = match relay.open(self.request()).await {
            Ok(stream) => stream,
            Err(e) => {
                if format == OutputFormat::Json {
                    println!("{}", serde_json::to_string_pretty(&e.to_body())?);
                }
                return Err(e.into());
            }
        };

        let mut stdout = std::io::stdout();
        let end = write_stream(stream, &mut stdout).await?;
        writeln!(stdout)?;

        match end {
            StreamEnd::Done | StreamEnd::Exhausted => Ok(()),
            StreamEnd::ReadFailed(reason) => {
                Err(CliError(format!("Output truncated: upstream read failed: {reason}")))
            }
            StreamEnd::ConsumerGone => Err(CliError("Output truncated".to_string())),
        }
    }

    fn request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(&self.model, &self.prompt);
        if let Some(system) = &self.system {
            request = request.with_system_prompt(system);
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}

/// Copy every chunk to `out` as it arrives, then report how the relay ended
pub async fn write_stream<W: Write>(mut stream: RelayStream, out: &mut W) -> CliResult<StreamEnd> {
    let completion = stream
        .take_completion()
        .ok_or_else(|| CliError("Relay stream has no completion handle".to_string()))?;

    while let Some(chunk) = stream.next().await {
        out.write_all(&chunk)?;
        out.flush()?;
    }

    let end = completion.wait().await;
    tracing::debug!(end = ?end, "Relay finished");
    Ok(end)
}
