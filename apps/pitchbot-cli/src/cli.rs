use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pitchbot_core::{CancellationToken, Engine, EngineConfig, Provider};
use tracing::warn;

use crate::logging::LogTarget;
use crate::output::{self, PitchReport};
use crate::tui;

#[derive(Debug, Parser)]
#[command(
    name = "pitchbot",
    version,
    about = "Generate, rate and refine startup pitches"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory holding `.pitchbot/` (config, prompt overrides, logs)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub workdir: PathBuf,

    /// Model provider: gemini or claude
    #[arg(long, global = true)]
    pub provider: Option<Provider>,

    /// Model name (defaults to the provider's default)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Deadline for each model call, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a business pitch for a startup idea
    Pitch {
        /// The startup idea, in English or Hinglish
        #[arg(short, long)]
        idea: String,

        /// Where you are based; biases the competitor analysis
        #[arg(short, long)]
        location: Option<String>,

        /// Also rate the generated pitch
        #[arg(long)]
        rate: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Rate an idea against a pitch saved with `pitch --json`
    Rate {
        /// The startup idea the pitch was generated for
        #[arg(short, long)]
        idea: String,

        /// Pitch file (output of `pitch --json`, or a bare pitch object)
        #[arg(short, long, value_name = "FILE")]
        pitch: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Chat with the pitch coach in an interactive terminal UI
    Chat {
        /// Generate a pitch for this idea before chatting
        #[arg(short, long)]
        idea: Option<String>,

        /// Where you are based; biases the competitor analysis
        #[arg(short, long)]
        location: Option<String>,
    },
}

impl GlobalArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::builder()
            .workdir(self.workdir.clone())
            .provider(self.provider)
            .model(self.model.clone())
            .timeout_secs(self.timeout)
            .build()
    }
}

impl Cli {
    /// Working directory and log target for the selected command.
    pub fn log_context(&self) -> (PathBuf, LogTarget) {
        let target = match self.command {
            Commands::Pitch { .. } => LogTarget {
                command: "pitch",
                stderr: true,
            },
            Commands::Rate { .. } => LogTarget {
                command: "rate",
                stderr: true,
            },
            Commands::Chat { .. } => LogTarget {
                command: "chat",
                stderr: false,
            },
        };
        (self.global.workdir.clone(), target)
    }

    pub async fn run(self) -> Result<()> {
        let engine =
            Engine::new(self.global.engine_config()).context("failed to initialize engine")?;

        match self.command {
            Commands::Pitch {
                idea,
                location,
                rate,
                json,
            } => {
                let cancel = cancel_on_ctrl_c();
                let pitch = engine
                    .generate_pitch(&idea, location.as_deref(), &cancel)
                    .await
                    .context("pitch generation failed")?;

                let rating = if rate {
                    Some(
                        engine
                            .rate_idea(&idea, &pitch, &cancel)
                            .await
                            .context("rating failed")?,
                    )
                } else {
                    None
                };

                if json {
                    let report = PitchReport {
                        idea: &idea,
                        location: location.as_deref().filter(|l| !l.trim().is_empty()),
                        pitch: &pitch,
                        rating: rating.as_ref(),
                    };
                    println!("{}", output::to_json(&report)?);
                } else {
                    println!("{}", output::pitch_lines(&pitch).join("\n"));
                    if let Some(rating) = &rating {
                        println!();
                        println!("{}", output::rating_lines(rating).join("\n"));
                    }
                }
                Ok(())
            }
            Commands::Rate { idea, pitch, json } => {
                let pitch = output::read_pitch_file(&pitch)?;
                let cancel = cancel_on_ctrl_c();
                let rating = engine
                    .rate_idea(&idea, &pitch, &cancel)
                    .await
                    .context("rating failed")?;

                if json {
                    println!("{}", output::to_json(&rating)?);
                } else {
                    println!("{}", output::rating_lines(&rating).join("\n"));
                }
                Ok(())
            }
            Commands::Chat { idea, location } => tui::run_chat(engine, idea, location).await,
        }
    }
}

/// A token that fires on Ctrl-C, for one-shot commands.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling model call");
            trigger.cancel();
        }
    });
    cancel
}
