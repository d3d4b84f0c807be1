use std::fmt;
use std::process::Command;

use anyhow::Context;

/// Outcome of one external process: its exit status and nothing else.
///
/// Children inherit our standard streams, so there is no captured output.
/// The code is opaque to this layer: callers check it for zero/nonzero and
/// otherwise pass it along untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    code: i32,
}

impl ProcessResult {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// Exit code to mirror to our own caller.
    pub const fn code(self) -> i32 {
        self.code
    }

    pub const fn success(self) -> bool {
        self.code == 0
    }
}

/// An external command as an explicit program + argument vector.
///
/// Never passed through a shell, so arguments carry no quoting or injection
/// ambiguity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split `command` on whitespace into program + leading args, then append
    /// `extra` verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if `command` is empty or whitespace-only.
    pub fn parse(command: &str, extra: &[String]) -> anyhow::Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty command"))?
            .to_string();
        let mut args: Vec<String> = parts.map(str::to_string).collect();
        args.extend(extra.iter().cloned());
        Ok(Self { program, args })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Extract an exit code from a process status, mapping signals to 128+N on Unix.
fn exit_code_from_status(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| status.signal().map_or(1, |s| 128 + s))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

/// The spawn seam. Actions launch processes only through this trait, so tests
/// can substitute a scripted fake and count invocations.
pub trait Launcher {
    /// Launch `invocation` with inherited stdio and block until it exits.
    ///
    /// A nonzero exit is not an error; the returned result carries it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be started at all
    /// (program missing, not executable, ...).
    fn launch(&self, invocation: &Invocation) -> anyhow::Result<ProcessResult>;
}

/// Real launcher: spawns via `std::process`, hands the terminal to the child
/// and blocks for its full lifetime. One child at a time, strictly sequential.
pub struct SystemLauncher {
    verbose: bool,
}

impl SystemLauncher {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Launcher for SystemLauncher {
    fn launch(&self, invocation: &Invocation) -> anyhow::Result<ProcessResult> {
        if self.verbose {
            eprintln!("[kdev] $ {invocation}");
        }
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .with_context(|| format!("failed to launch {}", invocation.program))?;
        Ok(ProcessResult::new(exit_code_from_status(status)))
    }
}
