//! Process-backed interpreter runtime.
//!
//! Boots a persistent Python child running a small driver loop. Each
//! `run_async` call sends one hex-framed code block over stdin and reads one
//! JSON response line back; all blocks share a single namespace, so a session
//! can redirect the runtime's output channels in one block and read the
//! captured buffers back in a later one. Top-level `await` is allowed.
//!
//! The runtime's virtual filesystem is a temp working directory owned by the
//! handle; relative paths the guard library opens (`contracts.yaml`) resolve
//! inside it.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{PlaygroundError, Result};
use crate::runtime::{InterpreterRuntime, LoaderOptions, RuntimeLoader};

/// Driver loop executed by the child. Reads `{"code": <hex>}` lines from
/// stdin, exec/evals each block in one shared namespace, and answers with
/// `{"ok": true, "value": ...}` or `{"ok": false, "error": ...}` on a
/// dup'ed copy of the original stdout. `sys.stdout` itself is parked on a
/// scratch buffer so user prints cannot corrupt the response channel.
const DRIVER: &str = r#"
import sys, os, io, json, ast, asyncio
_resp = os.fdopen(os.dup(1), "w")
sys.stdout = io.StringIO()
_loop = asyncio.new_event_loop()
_ns = {}
_FLAGS = ast.PyCF_ALLOW_TOP_LEVEL_AWAIT
for _line in sys.stdin.buffer:
    try:
        _src = bytes.fromhex(json.loads(_line)["code"]).decode("utf-8")
        try:
            _code = compile(_src, "<session>", "eval", flags=_FLAGS)
            _is_expr = True
        except SyntaxError:
            _code = compile(_src, "<session>", "exec", flags=_FLAGS)
            _is_expr = False
        _val = eval(_code, _ns)
        if asyncio.iscoroutine(_val):
            _val = _loop.run_until_complete(_val)
        if _is_expr and _val is not None:
            _out = {"ok": True, "value": str(_val)}
        else:
            _out = {"ok": True, "value": None}
    except BaseException as _e:
        _out = {"ok": False, "error": "{}: {}".format(type(_e).__name__, _e)}
    _resp.write(json.dumps(_out) + "\n")
    _resp.flush()
"#;

#[derive(Debug, Deserialize)]
struct DriverResponse {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Interpreter runtime backed by a persistent local Python process.
pub struct PyProcessRuntime {
    executable: String,
    io: Mutex<DriverIo>,
    // Held for the handle's lifetime; kill_on_drop reaps the child.
    _child: Child,
    workdir: tempfile::TempDir,
}

impl PyProcessRuntime {
    /// Spawn the driver child and verify it answers.
    pub async fn spawn(executable: &str) -> Result<Self> {
        let workdir = tempfile::tempdir()?;

        let mut child = Command::new(executable)
            .args(["-u", "-c", DRIVER])
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlaygroundError::InterpreterLoad(format!("failed to spawn {executable}: {e}"))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PlaygroundError::InterpreterLoad("driver stdin not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PlaygroundError::InterpreterLoad("driver stdout not captured".to_string())
        })?;

        let runtime = Self {
            executable: executable.to_string(),
            io: Mutex::new(DriverIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            _child: child,
            workdir,
        };

        // Handshake: a trivial expression proves the driver loop is up.
        let answer = runtime.exchange("1 + 1").await.map_err(|e| {
            PlaygroundError::InterpreterLoad(format!("driver handshake failed: {e}"))
        })?;
        if answer.as_deref() != Some("2") {
            return Err(PlaygroundError::InterpreterLoad(format!(
                "driver handshake returned {answer:?}"
            )));
        }

        Ok(runtime)
    }

    /// Working directory backing the virtual filesystem.
    pub fn workdir(&self) -> &std::path::Path {
        self.workdir.path()
    }

    async fn exchange(&self, code: &str) -> Result<Option<String>> {
        let request = serde_json::json!({ "code": hex::encode(code.as_bytes()) });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let mut response = String::new();
        let n = io.stdout.read_line(&mut response).await?;
        if n == 0 {
            return Err(PlaygroundError::RuntimeUnavailable(
                "interpreter process exited".to_string(),
            ));
        }

        let response: DriverResponse = serde_json::from_str(response.trim_end())?;
        if response.ok {
            Ok(response.value)
        } else {
            Err(PlaygroundError::Raised(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl InterpreterRuntime for PyProcessRuntime {
    async fn load_package(&self, name: &str) -> Result<()> {
        // The package manager ships with the interpreter; loading it is a
        // module probe, not a download.
        let output = Command::new(&self.executable)
            .args(["-m", name, "--version"])
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(PlaygroundError::PackageInstall {
                package: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn install(&self, requirement: &str) -> Result<()> {
        let output = Command::new(&self.executable)
            .args(["-m", "pip", "install", "--quiet", requirement])
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(PlaygroundError::PackageInstall {
                package: requirement.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn run_async(&self, code: &str) -> Result<Option<String>> {
        self.exchange(code).await
    }

    async fn write_file(&self, path: &str, data: &str) -> Result<()> {
        let rel = std::path::Path::new(path);
        if rel.is_absolute() || rel.components().any(|c| c == std::path::Component::ParentDir) {
            return Err(PlaygroundError::RuntimeUnavailable(format!(
                "virtual filesystem path escapes the sandbox: {path}"
            )));
        }
        tokio::fs::write(self.workdir.path().join(rel), data).await?;
        Ok(())
    }
}

/// Loader for [`PyProcessRuntime`].
///
/// The local distribution is already on disk, so `acquire` only probes that
/// an interpreter exists; `load` spawns and handshakes the driver child.
#[derive(Debug, Default)]
pub struct PyProcessLoader;

impl PyProcessLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RuntimeLoader for PyProcessLoader {
    async fn acquire(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self, options: &LoaderOptions) -> Result<Arc<dyn InterpreterRuntime>> {
        let runtime = PyProcessRuntime::spawn(&options.index_url).await?;
        Ok(Arc::new(runtime))
    }
}
