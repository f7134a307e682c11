// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zeus_config::ZeusConfig;
use zeus_msg::send::{self, SendArgs};

#[derive(Parser, Debug)]
#[command(
    name = "zeus-msg",
    version,
    about = "Queue autonomous polemarch/hoplite messages for Zeus delivery"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue one outbound message.
    Send {
        /// polemarch | phalanx | hoplite:<id> | agent:<id> | <display-name>.
        #[arg(long)]
        to: String,

        /// Payload file path (must be under the message tmp dir).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Inline payload text.
        #[arg(long)]
        text: Option<String>,

        /// Read the payload from stdin.
        #[arg(long)]
        stdin: bool,

        /// Sender display name override (defaults to ZEUS_AGENT_NAME).
        #[arg(long = "from")]
        from_sender: Option<String>,

        /// Block until the dispatcher confirms delivery.
        #[arg(long)]
        wait_delivery: bool,

        /// Seconds to wait with --wait-delivery.
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("zeus=debug")
    } else {
        EnvFilter::new("zeus=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match ZeusConfig::load(None) {
        Ok(config) => config,
        Err(err) => return fail(&err.to_string()),
    };

    match cli.command {
        Commands::Send {
            to,
            file,
            text,
            stdin,
            from_sender,
            wait_delivery,
            timeout,
        } => {
            let args = SendArgs {
                to,
                file,
                text,
                stdin,
                from_sender,
                wait_delivery,
                timeout,
            };
            match send::run(&config, &args, &mut std::io::stdin().lock()) {
                Ok(report) => {
                    println!("ZEUS_MSG_ENQUEUED={}", report.envelope_id);
                    if report.delivered {
                        println!("ZEUS_MSG_DELIVERED={}", report.envelope_id);
                    }
                    ExitCode::SUCCESS
                }
                Err(send::SendError::DeliveryTimeout { id }) => {
                    // The envelope stays queued; only the wait failed.
                    println!("ZEUS_MSG_ENQUEUED={id}");
                    fail(&format!("timed out waiting for delivery of {id}"))
                }
                Err(err) => fail(&err.to_string()),
            }
        }
    }
}

fn fail(message: &str) -> ExitCode {
    eprintln!("zeus-msg: {message}");
    ExitCode::FAILURE
}
