//! Case intake CLI
//!
//! Drives the current case: attach evidence, ask questions, seal and submit
//! reports. The case persists between invocations.

use case_intake::ai::Location;
use case_intake::case::{ChatMessage, LoadingState, MessageKind, ReportVerification, TurnIntent};
use case_intake::commands::{self, AppState, SendMessage};
use case_intake::config::AppConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "case-intake", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt about the current case.
    Send(SendArgs),
    /// Attach evidence files to the case.
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Seal a report into a QR-stamped PDF.
    Seal {
        /// Message id; defaults to the latest report.
        #[arg(long)]
        message: Option<String>,
    },
    /// Seal a report and compose the submission email.
    Email {
        #[arg(long)]
        message: Option<String>,
        /// Recipient address.
        #[arg(long)]
        to: Option<String>,
        /// Print the mailto link instead of opening the mail client.
        #[arg(long)]
        no_open: bool,
    },
    /// Print the case transcript.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Start over with an empty case.
    Clear,
    /// Manage provider API keys.
    #[command(subcommand)]
    Key(KeyCommand),
}

#[derive(Args, Debug)]
struct SendArgs {
    prompt: String,
    /// Get independent strategies from both providers.
    #[arg(long)]
    complex: bool,
    /// Resolve the pending dual strategy into a final report.
    #[arg(long, conflicts_with = "analyze")]
    synthesize: bool,
    /// Never treat the prompt as a synthesis request.
    #[arg(long)]
    analyze: bool,
    /// Approximate latitude, used as a jurisdiction hint.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
    /// Evidence to send with this prompt. Files from earlier runs are only
    /// hashes on record until attached again.
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,
}

impl SendArgs {
    fn into_message(self) -> SendMessage {
        let intent = if self.synthesize {
            TurnIntent::Synthesize
        } else if self.analyze {
            TurnIntent::Analyze
        } else {
            TurnIntent::Auto
        };
        let location = match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
            }),
            _ => None,
        };
        SendMessage {
            prompt: self.prompt,
            complex: self.complex,
            intent,
            location,
            files: self.files,
        }
    }
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Store a key in the OS keychain.
    Set { provider: String, key: String },
    /// Remove a stored key.
    Delete { provider: String },
    /// Show which providers have a key.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    case_intake::load_env();
    case_intake::init_tracing();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), String> {
    // Key management never touches the case
    let command = match command {
        Command::Key(key) => return run_key(key),
        other => other,
    };

    let config = AppConfig::from_env();
    let state = AppState::from_config(&config)?;

    match command {
        Command::Send(args) => {
            let mut loading = state.orchestrator.subscribe();
            let progress = tokio::spawn(async move {
                while loading.changed().await.is_ok() {
                    let current = *loading.borrow_and_update();
                    if current != LoadingState::Idle {
                        eprintln!("{:?}...", current);
                    }
                }
            });

            let result = commands::send_message(&state, args.into_message()).await;
            progress.abort();

            let case = commands::get_case(&state).await;
            if let Some(reply) = case.messages.last() {
                print_message(reply);
            }
            result.map(|_| ())
        }
        Command::Add { files } => {
            let added = commands::add_files(&state, files).await?;
            println!("{} file(s) added to case.", added);
            Ok(())
        }
        Command::Seal { message } => {
            let sealed = commands::seal_report(&state, message).await?;
            println!("Sealed report written to {}", sealed.path.display());
            println!("SHA-512: {}", sealed.sha512);
            println!("Pages: {}", sealed.page_count);
            if let Some(anchor) = sealed.cloud_anchor {
                println!("Cloud anchor: {:?}", anchor.status);
                if let Some(error) = anchor.error {
                    println!("  {}", error);
                }
            }
            Ok(())
        }
        Command::Email {
            message,
            to,
            no_open,
        } => {
            let draft = commands::seal_and_email(&state, message, to, !no_open).await?;
            println!("Sealed report written to {}", draft.sealed.path.display());
            if no_open {
                println!("{}", draft.mailto);
            } else {
                println!("Opened email to {}. Attach the sealed PDF before sending.", draft.email.recipient);
            }
            Ok(())
        }
        Command::Show { json } => {
            let case = commands::get_case(&state).await;
            if json {
                let text = serde_json::to_string_pretty(&case).map_err(|e| e.to_string())?;
                println!("{}", text);
            } else {
                for file in &case.files {
                    println!("[file] {} ({} bytes)", file.name, file.size);
                }
                for message in &case.messages {
                    print_message(message);
                }
            }
            Ok(())
        }
        Command::Clear => {
            commands::clear_case(&state).await?;
            println!("Case cleared.");
            Ok(())
        }
        Command::Key(_) => Ok(()),
    }
}

fn run_key(command: KeyCommand) -> Result<(), String> {
    match command {
        KeyCommand::Set { provider, key } => {
            commands::set_api_key(&provider, &key)?;
            println!("Stored {} key.", provider);
        }
        KeyCommand::Delete { provider } => {
            commands::delete_api_key(&provider)?;
            println!("Deleted {} key.", provider);
        }
        KeyCommand::Status => {
            for status in commands::get_configured_providers() {
                let state = if status.configured { "configured" } else { "missing" };
                println!("{}: {}", status.provider.display_name(), state);
            }
        }
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!("--- {:?} [{}]", message.author, message.id);
    println!("{}", message.content);
    if let MessageKind::Report { verification, .. } = &message.kind {
        match verification {
            ReportVerification::Verified(result) => println!("Verification: {}", result.notes),
            ReportVerification::Unverified { reason } => println!("Unverified: {}", reason),
        }
    }
    if let Some(metadata) = &message.sealing_metadata {
        println!("Sealed as {} (SHA-512 {})", metadata.file_name, metadata.sha512);
    }
    println!();
}
