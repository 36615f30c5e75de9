use std::path::PathBuf;

use clap::{Parser, Subcommand};
use company_brain::{RagError, Result};
use company_brain::commands::{ask, chat, index, status};
use company_brain::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "company-brain")]
#[command(about = "Answer questions about your company documents with a local LLM")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $COMPANY_BRAIN_HOME or ~/.company-brain)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the document folder and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the documents in the source directory
    Index {
        /// Re-index even if an index already exists
        #[arg(long)]
        rebuild: bool,
    },
    /// Ask a single question
    Ask {
        question: String,
        /// List the documents the answer was drawn from
        #[arg(long)]
        sources: bool,
    },
    /// Start an interactive chat session
    Chat,
    /// Show configuration, Ollama reachability and index state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir().map_err(|e| RagError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Index { rebuild } => {
            index(&Config::load(&config_dir)?, rebuild).await?;
        }
        Commands::Ask { question, sources } => {
            ask(&Config::load(&config_dir)?, &question, sources).await?;
        }
        Commands::Chat => {
            chat(&Config::load(&config_dir)?).await?;
        }
        Commands::Status => {
            status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn chat_command() {
        let cli = Cli::try_parse_from(["company-brain", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat));
            assert!(parsed.config_dir.is_none());
        }
    }

    #[test]
    fn ask_command_with_sources() {
        let cli = Cli::try_parse_from([
            "company-brain",
            "ask",
            "Is the office open on Friday?",
            "--sources",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli
            && let Commands::Ask { question, sources } = parsed.command
        {
            assert_eq!(question, "Is the office open on Friday?");
            assert!(sources);
        }
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["company-brain", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn index_rebuild_flag() {
        let cli = Cli::try_parse_from(["company-brain", "index", "--rebuild"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli
            && let Commands::Index { rebuild } = parsed.command
        {
            assert!(rebuild);
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["company-brain", "status", "--config-dir", "/tmp/brain"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/brain")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["company-brain", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli
            && let Commands::Config { show } = parsed.command
        {
            assert!(show);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["company-brain", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["company-brain", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
