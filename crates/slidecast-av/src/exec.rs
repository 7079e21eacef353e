//! Builder for executing external tool commands with captured output.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Output captured from a tool execution.
///
/// A non-zero exit status is *data*, not an error: the transcoding
/// cascade treats a failed attempt as an outcome that drives the next
/// attempt. Only failing to run the tool at all surfaces as [`Error`].
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use slidecast_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # fn example() -> slidecast_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v")
///     .arg("error")
///     .arg("/path/to/video.webm")
///     .run()?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<OsString>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Bound the execution time; the process is killed past the deadline.
    pub fn timeout(mut self, d: Option<Duration>) -> Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, blocking until it exits, capturing stdout and
    /// stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program cannot be spawned because
    ///   it does not exist.
    /// - [`Error::ToolFailed`] if the configured timeout expires (the
    ///   process is killed first).
    /// - [`Error::Io`] for other spawn or wait failures.
    ///
    /// A non-zero exit status is **not** an error; inspect
    /// [`ToolOutput::status`].
    pub fn run(&self) -> Result<ToolOutput> {
        let name = self.program_name();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(&name)
                } else {
                    Error::Io(e)
                }
            })?;

        // Drain both pipes on background threads so a chatty child cannot
        // deadlock against a full pipe buffer while we wait on it.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_thread = std::thread::spawn(move || read_all(stdout_pipe));
        let stderr_thread = std::thread::spawn(move || read_all(stderr_pipe));

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Reap the reader threads before bailing.
                        let _ = stdout_thread.join();
                        let _ = stderr_thread.join();
                        return Err(Error::tool_failed(
                            &name,
                            format!("timed out after {limit:?}"),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
            }
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
        })
    }
}

fn read_all(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).to_string()
}
