//! Command-line surface.

use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Debug, Parser)]
#[command(
    name = "dombridge",
    version,
    about = "Drive a remote DOM executor through a local broker daemon",
    long_about = "dombridge brokers page-automation commands between local callers and a \
                  browser-side executor attached over a single websocket. The daemon owns \
                  the executor connection; this CLI talks to the daemon over its Unix socket.",
    after_long_help = "EXAMPLES:\n    \
        dombridge daemon start\n    \
        dombridge click '#submit'\n    \
        dombridge fill 'input[name=q]' 'rust broker'\n    \
        dombridge exec get_page_info\n    \
        dombridge selectors save login '#login-button' click_element"
)]
pub struct Cli {
    /// Print raw JSON results instead of human-oriented output.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the broker daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
    /// Send an arbitrary catalog action with key=value parameters.
    Exec {
        /// Action name, e.g. click_element.
        action: String,
        /// Parameters as key=value pairs.
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Click the element matching a selector.
    Click {
        selector: String,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Type text into the element matching a selector.
    Fill {
        selector: String,
        text: String,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Read the text content of the element matching a selector.
    Text {
        selector: String,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Send a key press to the element matching a selector.
    Key {
        selector: String,
        key: String,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Report the current page title and URL.
    Page {
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Check whether a selector matches anything on the page.
    Find {
        selector: String,
        #[command(flatten)]
        opts: ExecOpts,
    },
    /// Manage saved selector shortcuts.
    Selectors {
        #[command(subcommand)]
        command: SelectorsCommand,
    },
}

#[derive(Debug, Args)]
pub struct ExecOpts {
    /// Per-command timeout in milliseconds.
    #[arg(long, env = "DOMBRIDGE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
    /// Caller class recorded with the command: interactive, tool or assistant.
    #[arg(long, default_value = "interactive")]
    pub source: String,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background.
    Start,
    /// Ask a running daemon to shut down.
    Stop,
    /// Show connection state and pending request count.
    Status,
    /// Run the daemon in the foreground. Used internally by `start`.
    #[command(hide = true)]
    Run,
}

#[derive(Debug, Subcommand)]
pub enum SelectorsCommand {
    /// List saved selectors.
    List,
    /// Save or replace a named selector.
    Save {
        name: String,
        selector: String,
        /// Action to replay with this selector, e.g. click_element.
        action: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a saved selector.
    Delete { name: String },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_click() {
        let cli = Cli::try_parse_from(["dombridge", "click", "#go"]).unwrap();
        assert!(matches!(cli.command, Command::Click { .. }));
    }

    #[test]
    fn test_cli_parses_exec_with_params() {
        let cli = Cli::try_parse_from([
            "dombridge",
            "exec",
            "input_text",
            "selector=#name",
            "text=hello",
            "--timeout-ms",
            "2000",
        ])
        .unwrap();
        match cli.command {
            Command::Exec { action, params, opts } => {
                assert_eq!(action, "input_text");
                assert_eq!(params.len(), 2);
                assert_eq!(opts.timeout_ms, Some(2000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_bare_param() {
        assert!(Cli::try_parse_from(["dombridge", "exec", "click_element", "selector"]).is_err());
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
