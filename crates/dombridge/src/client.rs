//! Blocking JSON-RPC client for the daemon's control socket.

use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use dombridge_common::error_codes::GENERIC_ERROR;
use dombridge_common::socket_path;

const IO_TIMEOUT: Duration = Duration::from_secs(120);

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon is not running (no socket at {0})")]
    NotRunning(PathBuf),
    #[error("daemon closed the connection")]
    Disconnected,
    #[error("malformed response from daemon: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("{message}")]
    Rpc { code: i32, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct DaemonClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl DaemonClient {
    /// Connects to the daemon socket, failing fast when none is listening.
    pub fn connect() -> Result<Self, ClientError> {
        let path = socket_path();
        let stream =
            UnixStream::connect(&path).map_err(|_| ClientError::NotRunning(path.clone()))?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Issues one request and blocks for its response. An `error` member in
    /// the response becomes [`ClientError::Rpc`].
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = request.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;

        let mut response_line = String::new();
        let read = self.reader.read_line(&mut response_line)?;
        if read == 0 {
            return Err(ClientError::Disconnected);
        }
        let response: Value = serde_json::from_str(&response_line)?;
        if let Some(error) = response.get("error") {
            return Err(ClientError::Rpc {
                code: error
                    .get("code")
                    .and_then(Value::as_i64)
                    .and_then(|code| i32::try_from(code).ok())
                    .unwrap_or(GENERIC_ERROR),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown daemon error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}
