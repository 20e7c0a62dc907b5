#![expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "CLI output surface"
)]

//! Command execution against the daemon.

use std::os::unix::process::CommandExt;
use std::process::Command as ProcessCommand;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use anyhow::bail;
use serde_json::Value;
use serde_json::json;

use dombridge_common::error_codes::category_for_code;
use dombridge_common::error_codes::is_retryable;
use dombridge_router::RouterConfig;

use crate::client::ClientError;
use crate::client::DaemonClient;
use crate::commands::Cli;
use crate::commands::Command;
use crate::commands::DaemonCommand;
use crate::commands::ExecOpts;
use crate::commands::SelectorsCommand;

const START_POLL_INITIAL: Duration = Duration::from_millis(50);
const START_POLL_ATTEMPTS: u32 = 6;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Command::Daemon { command } => daemon(command, json),
        Command::Exec {
            action,
            params,
            opts,
        } => {
            let parameters = params
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            execute(&action, parameters, &opts, json)
        }
        Command::Click { selector, opts } => execute(
            "click_element",
            object(&[("selector", selector)]),
            &opts,
            json,
        ),
        Command::Fill {
            selector,
            text,
            opts,
        } => execute(
            "input_text",
            object(&[("selector", selector), ("text", text)]),
            &opts,
            json,
        ),
        Command::Text { selector, opts } => execute(
            "get_element_text",
            object(&[("selector", selector)]),
            &opts,
            json,
        ),
        Command::Key {
            selector,
            key,
            opts,
        } => execute(
            "send_key",
            object(&[("selector", selector), ("key", key)]),
            &opts,
            json,
        ),
        Command::Page { opts } => execute("get_page_info", serde_json::Map::new(), &opts, json),
        Command::Find { selector, opts } => execute(
            "find_element",
            object(&[("selector", selector)]),
            &opts,
            json,
        ),
        Command::Selectors { command } => selectors(command, json),
    }
}

fn object(pairs: &[(&str, String)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
        .collect()
}

fn execute(
    action: &str,
    parameters: serde_json::Map<String, Value>,
    opts: &ExecOpts,
    json: bool,
) -> anyhow::Result<()> {
    let mut client = DaemonClient::connect().context("is the daemon running? try `dombridge daemon start`")?;
    let mut params = json!({
        "source": opts.source,
        "parameters": parameters,
    });
    if let Some(timeout_ms) = opts.timeout_ms {
        params["timeout_ms"] = json!(timeout_ms);
    }
    let result = match client.call(action, params) {
        Ok(result) => result,
        Err(ClientError::Rpc { code, message }) => bail!("{}", describe_rpc_error(code, &message)),
        Err(err) => return Err(err.into()),
    };
    print_result(&result, json);
    Ok(())
}

/// Renders a daemon error with its category so scripted callers can decide
/// whether a retry makes sense.
fn describe_rpc_error(code: i32, message: &str) -> String {
    let category = category_for_code(code);
    if is_retryable(code) {
        format!("{message} ({category} error, retrying may succeed)")
    } else {
        format!("{message} ({category} error)")
    }
}

fn daemon(command: DaemonCommand, json: bool) -> anyhow::Result<()> {
    match command {
        DaemonCommand::Run => run_foreground(),
        DaemonCommand::Start => start_background(),
        DaemonCommand::Stop => {
            let mut client = match DaemonClient::connect() {
                Ok(client) => client,
                Err(ClientError::NotRunning(_)) => {
                    println!("daemon is not running");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            match client.call("shutdown", json!({})) {
                // The daemon may exit before flushing the response.
                Ok(_) | Err(ClientError::Disconnected) | Err(ClientError::Io(_)) => {
                    println!("daemon stopped");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
        DaemonCommand::Status => {
            let mut client = match DaemonClient::connect() {
                Ok(client) => client,
                Err(ClientError::NotRunning(_)) => {
                    println!("daemon is not running");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            let status = client.call("status", json!({}))?;
            if json {
                print_result(&status, true);
            } else {
                let connection = status["connection"].as_str().unwrap_or("unknown");
                let epoch = status["epoch"].as_u64().unwrap_or(0);
                let pending = status["pending"].as_u64().unwrap_or(0);
                let uptime = Duration::from_millis(status["uptime_ms"].as_u64().unwrap_or(0));
                println!("connection: {connection} (epoch {epoch})");
                println!("pending requests: {pending}");
                println!("uptime: {}s", uptime.as_secs());
            }
            Ok(())
        }
    }
}

fn run_foreground() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    runtime
        .block_on(dombridge_daemon::run(RouterConfig::from_env()))
        .context("daemon exited with error")?;
    Ok(())
}

/// Spawns `daemon run` detached and polls the socket with doubling delays
/// until the daemon answers a ping.
fn start_background() -> anyhow::Result<()> {
    if let Ok(mut client) = DaemonClient::connect() {
        if client.call("ping", json!({})).is_ok() {
            println!("daemon already running");
            return Ok(());
        }
    }

    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let mut command = ProcessCommand::new(exe);
    command
        .args(["daemon", "run"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);
    let child = command.spawn().context("failed to spawn daemon process")?;
    drop(child);

    let mut delay = START_POLL_INITIAL;
    for _ in 0..START_POLL_ATTEMPTS {
        std::thread::sleep(delay);
        if let Ok(mut client) = DaemonClient::connect() {
            if client.call("ping", json!({})).is_ok() {
                println!("daemon started");
                return Ok(());
            }
        }
        delay *= 2;
    }
    bail!("daemon did not come up in time; check DOMBRIDGE_LOG for details")
}

fn selectors(command: SelectorsCommand, json: bool) -> anyhow::Result<()> {
    let mut client = DaemonClient::connect().context("is the daemon running? try `dombridge daemon start`")?;
    match command {
        SelectorsCommand::List => {
            let result = client.call("selectors_list", json!({}))?;
            if json {
                print_result(&result, true);
            } else {
                let selectors = result["selectors"].as_array().cloned().unwrap_or_default();
                if selectors.is_empty() {
                    println!("no saved selectors");
                }
                for record in selectors {
                    let name = record["name"].as_str().unwrap_or("?");
                    let selector = record["selector"].as_str().unwrap_or("?");
                    let action = record["action"].as_str().unwrap_or("?");
                    println!("{name}: {selector} ({action})");
                }
            }
        }
        SelectorsCommand::Save {
            name,
            selector,
            action,
            text,
            key,
            description,
        } => {
            let mut params = json!({
                "name": name,
                "selector": selector,
                "action": action,
            });
            if let Some(text) = text {
                params["text"] = json!(text);
            }
            if let Some(key) = key {
                params["key"] = json!(key);
            }
            if let Some(description) = description {
                params["description"] = json!(description);
            }
            client.call("selectors_save", params)?;
            println!("saved");
        }
        SelectorsCommand::Delete { name } => {
            client.call("selectors_delete", json!({"name": name}))?;
            println!("deleted");
        }
    }
    Ok(())
}

fn print_result(result: &Value, json: bool) {
    if json {
        println!("{result}");
    } else {
        match serde_json::to_string_pretty(result) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{result}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dombridge_common::error_codes;

    #[test]
    fn test_retryable_error_is_flagged_as_such() {
        let rendered = describe_rpc_error(error_codes::REQUEST_TIMEOUT, "request timed out");
        assert_eq!(
            rendered,
            "request timed out (transient error, retrying may succeed)"
        );
    }

    #[test]
    fn test_non_retryable_error_carries_category_only() {
        let rendered = describe_rpc_error(error_codes::UNSUPPORTED_ACTION, "unknown action 'zap'");
        assert_eq!(rendered, "unknown action 'zap' (invalid_input error)");
    }

    #[test]
    fn test_unknown_code_falls_back_to_internal() {
        let rendered = describe_rpc_error(-32099, "boom");
        assert_eq!(rendered, "boom (internal error)");
    }
}
