use std::path::Path;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use ollama_relay::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Parser)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the effective configuration (file plus environment overrides)")]
    Show,
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config: &Config,
        config_path: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config, config_path, format),
        }
    }

    fn show(config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&config_json(config))?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (default search paths)"),
                }
                println!("==============================\n");

                for (section, rows) in config_sections(config) {
                    println!("[{section}]");
                    let mut table = Table::new();
                    table
                        .load_preset(UTF8_FULL_CONDENSED)
                        .set_content_arrangement(ContentArrangement::Dynamic)
                        .set_header(["Setting", "Value"]);

                    for (key, value) in rows {
                        table.add_row([key, value.as_str()]);
                    }

                    println!("{table}\n");
                }
            }
        }

        Ok(())
    }
}

fn config_json(config: &Config) -> serde_json::Value {
    serde_json::json!({
        "upstream": {
            "base_url": config.upstream.base_url,
            "timeout_ms": config.upstream.timeout_ms,
            "stream": config.upstream.stream,
        },
        "relay": {
            "forwarding": config.relay.forwarding.as_str(),
            "token_delay_ms": config.relay.token_delay_ms,
            "channel_capacity": config.relay.channel_capacity,
        },
        "defaults": {
            "system_prompt": config.defaults.system_prompt,
            "temperature": config.defaults.temperature,
        },
        "server": {
            "listen_addr": config.server.listen_addr,
        }
    })
}

fn config_sections(config: &Config) -> Vec<(&'static str, Vec<(&'static str, String)>)> {
    vec![
        (
            "Upstream",
            vec![
                ("base_url", config.upstream.base_url.clone()),
                ("timeout_ms", config.upstream.timeout_ms.to_string()),
                ("stream", config.upstream.stream.to_string()),
            ],
        ),
        (
            "Relay",
            vec![
                ("forwarding", config.relay.forwarding.as_str().to_string()),
                ("token_delay_ms", config.relay.token_delay_ms.to_string()),
                ("channel_capacity", config.relay.channel_capacity.to_string()),
            ],
        ),
        (
            "Defaults",
            vec![
                ("system_prompt", config.defaults.system_prompt.clone()),
                ("temperature", config.defaults.temperature.to_string()),
            ],
        ),
        (
            "Server",
            vec![("listen_addr", config.server.listen_addr.clone())],
        ),
    ]
}
