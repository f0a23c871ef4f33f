//! Shell command execution.
//!
//! A [`ShellCommand`] is an ordered, non-empty sequence of command lines
//! run as subprocesses with fail-stop semantics: the first unsuccessful
//! line ends the run and its status becomes the command's result. Command
//! lines are handed verbatim to `sh -c` — callers are responsible for
//! quoting. Keeping the spawn path behind [`CommandLine::run`] and
//! [`capture`] means an argument-vector execution path could be swapped in
//! without touching any orchestration code.
//!
//! While a child runs, an interrupt relay is installed so Ctrl-C reaches
//! the child before the parent tears itself down; the relay is scoped to
//! the child and removed once it exits.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

/// Environment variables private to the host dependency sandbox.
///
/// Spawned command lines frequently invoke tools that carry their own
/// dependency context (`bundle exec`, `rake`), so the child must see the
/// ambient system environment rather than ours.
const SCRUBBED_ENV_VARS: [&str; 5] = [
    "GEM_HOME",
    "GEM_PATH",
    "RUBYOPT",
    "RUBYLIB",
    "BUNDLER_VERSION",
];
const SCRUBBED_ENV_PREFIX: &str = "BUNDLE_";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("At least one command line is required")]
    NoCommandLines,

    #[error("Failed to open output file {}: {source}", .path.display())]
    OutputFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to run `{command_line}`: {source}")]
    Io {
        command_line: String,
        #[source]
        source: io::Error,
    },
}

/// The outcome of running a [`ShellCommand`]: a success flag plus the
/// process-level exit code or terminating signal of the last line run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl From<ExitStatus> for ExecutionResult {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// One command line, run as `sh -c <line>`.
#[derive(Debug, Clone)]
pub struct CommandLine {
    command_line: String,
}

impl CommandLine {
    fn new(command_line: &str) -> Self {
        Self {
            command_line: command_line.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.command_line
    }

    fn run(&self, out: Option<&mut Sink>) -> Result<ExecutionResult, ShellError> {
        debug!(command_line = %self.command_line, "spawning");
        let status = match out {
            Some(sink) => self.run_redirected(sink),
            None => self.run_inherited(),
        }
        .map_err(|source| ShellError::Io {
            command_line: self.command_line.clone(),
            source,
        })?;
        Ok(ExecutionResult::from(status))
    }

    /// Run with the child's stdout forwarded incrementally to `sink` and
    /// its stderr drained line-by-line to our own stderr. Stderr is read
    /// on its own thread so neither stream can back up against the other.
    fn run_redirected(&self, sink: &mut Sink) -> io::Result<ExitStatus> {
        let mut child = shell_process(&self.command_line)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let _relay = InterruptRelay::install(child.id());

        let stderr = child.stderr.take().expect("child stderr requested");
        let drain = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => eprintln!("{line}"),
                    Err(_) => break,
                }
            }
        });

        let mut stdout = child.stdout.take().expect("child stdout requested");
        let copied = io::copy(&mut stdout, sink);
        let status = child.wait();
        let _ = drain.join();
        copied?;
        status
    }

    fn run_inherited(&self) -> io::Result<ExitStatus> {
        let mut child = shell_process(&self.command_line).spawn()?;
        let _relay = InterruptRelay::install(child.id());
        child.wait()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line)
    }
}

enum Sink {
    File(File),
    Writer(Box<dyn Write + Send>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::File(file) => file.write(buf),
            Sink::Writer(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::File(file) => file.flush(),
            Sink::Writer(writer) => writer.flush(),
        }
    }
}

/// An ordered sequence of command lines run as one unit of work.
///
/// Created per task invocation, run exactly once, and discarded. A
/// file-backed output sink is opened at construction and closed on every
/// exit path, including failure, when the command is dropped.
pub struct ShellCommand {
    command_lines: Vec<String>,
    success_msg: Option<String>,
    error_msg: Option<String>,
    out: Option<Sink>,
}

impl ShellCommand {
    /// Build a command from one or more command lines.
    ///
    /// An empty sequence is a configuration error, caught here before any
    /// process spawns.
    pub fn new<I, S>(command_lines: I) -> Result<Self, ShellError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command_lines: Vec<String> = command_lines.into_iter().map(Into::into).collect();
        if command_lines.is_empty() {
            return Err(ShellError::NoCommandLines);
        }
        Ok(Self {
            command_lines,
            success_msg: None,
            error_msg: None,
            out: None,
        })
    }

    pub fn with_success_msg(mut self, msg: impl Into<String>) -> Self {
        self.success_msg = Some(msg.into());
        self
    }

    pub fn with_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Redirect the stdout of every command line into a file.
    pub fn with_output_path(mut self, path: impl AsRef<Path>) -> Result<Self, ShellError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ShellError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.out = Some(Sink::File(file));
        Ok(self)
    }

    /// Redirect the stdout of every command line into a writer.
    pub fn with_output_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.out = Some(Sink::Writer(writer));
        self
    }

    pub fn success_msg(&self) -> Option<&str> {
        self.success_msg.as_deref()
    }

    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    pub fn command_lines(&self) -> &[String] {
        &self.command_lines
    }

    /// Run every command line in order, stopping at the first failure.
    pub fn run(self) -> Result<ExecutionResult, ShellError> {
        self.run_with(|_| {})
    }

    /// Like [`ShellCommand::run`], invoking `before` with each command
    /// line just before it spawns.
    pub fn run_with(
        mut self,
        mut before: impl FnMut(&CommandLine),
    ) -> Result<ExecutionResult, ShellError> {
        let mut result = None;
        for line in &self.command_lines {
            let command_line = CommandLine::new(line);
            before(&command_line);
            let line_result = command_line.run(self.out.as_mut())?;
            let stop = !line_result.success();
            result = Some(line_result);
            if stop {
                break;
            }
        }
        if let Some(sink) = self.out.as_mut() {
            let _ = sink.flush();
        }
        Ok(result.expect("command lines are non-empty by construction"))
    }
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellCommand")
            .field("command_lines", &self.command_lines)
            .field("success_msg", &self.success_msg)
            .field("error_msg", &self.error_msg)
            .finish_non_exhaustive()
    }
}

/// Run a single command line and collect its stdout.
///
/// Stderr passes through to the caller's stderr. This is the one place a
/// command line's output is read programmatically (revision lookup,
/// migration counting).
pub fn capture(command_line: &str) -> Result<(String, ExecutionResult), ShellError> {
    let map_err = |source| ShellError::Io {
        command_line: command_line.to_string(),
        source,
    };
    let mut child = shell_process(command_line)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(map_err)?;
    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout).map_err(map_err)?;
    }
    let status = child.wait().map_err(map_err)?;
    Ok((stdout, ExecutionResult::from(status)))
}

/// A `sh -c` process with the dependency sandbox scrubbed from its
/// environment.
fn shell_process(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    for (key, _) in std::env::vars_os() {
        let key_str = key.to_string_lossy();
        if key_str.starts_with(SCRUBBED_ENV_PREFIX) || SCRUBBED_ENV_VARS.contains(&key_str.as_ref())
        {
            cmd.env_remove(&key);
        }
    }
    cmd
}

#[cfg(unix)]
use relay::InterruptRelay;

#[cfg(unix)]
mod relay {
    use std::sync::atomic::{AtomicI32, Ordering};

    static CHILD_PID: AtomicI32 = AtomicI32::new(0);

    extern "C" fn forward_interrupt(_signal: libc::c_int) {
        let pid = CHILD_PID.load(Ordering::SeqCst);
        unsafe {
            if pid > 0 {
                libc::kill(pid, libc::SIGINT);
            }
            libc::signal(libc::SIGINT, libc::SIG_DFL);
            // Re-raise against our own process group so the parent
            // terminates too instead of hanging on the wait.
            libc::kill(0, libc::SIGINT);
        }
    }

    /// Scoped interrupt relay for one child process.
    ///
    /// While installed, SIGINT is forwarded to the child before the
    /// default disposition is restored and the signal re-raised. Dropping
    /// the relay restores the previous handler, so each command line in a
    /// sequence installs its own relay for its own child.
    pub(super) struct InterruptRelay {
        previous: libc::sighandler_t,
    }

    impl InterruptRelay {
        pub(super) fn install(child_pid: u32) -> Self {
            CHILD_PID.store(child_pid as i32, Ordering::SeqCst);
            let handler = forward_interrupt as extern "C" fn(libc::c_int);
            let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
            Self { previous }
        }
    }

    impl Drop for InterruptRelay {
        fn drop(&mut self) {
            unsafe {
                libc::signal(libc::SIGINT, self.previous);
            }
            CHILD_PID.store(0, Ordering::SeqCst);
        }
    }
}

#[cfg(not(unix))]
struct InterruptRelay;

#[cfg(not(unix))]
impl InterruptRelay {
    fn install(_child_pid: u32) -> Self {
        Self
    }
}
