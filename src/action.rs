use clap::ValueEnum;

use crate::config::Config;
use crate::launcher::{Invocation, Launcher, ProcessResult};

/// The developer workflows kdev knows about.
///
/// Each short alias resolves to the same action as its long form, so argument
/// validation happens entirely inside clap and dispatch never sees a raw
/// token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionKind {
    /// Build the kernel image.
    #[value(alias = "b")]
    Build,
    /// Build the kernel image, then boot it under QEMU.
    #[value(alias = "r")]
    Run,
    /// Build, then boot under QEMU with interrupt logging and a halted GDB
    /// stub on tcp::1234.
    #[value(alias = "d")]
    Debug,
}

impl ActionKind {
    /// Materialise the action for this kind, resolving every command line it
    /// will launch up front.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured command is empty.
    pub fn action(self, config: &Config) -> anyhow::Result<Box<dyn Action>> {
        Ok(match self {
            Self::Build => Box::new(BuildAction::from_config(config)?),
            Self::Run => Box::new(RunAction {
                build: BuildAction::from_config(config)?,
                emulator: Invocation::parse(&config.qemu_binary, &run_args(config))?,
            }),
            Self::Debug => Box::new(DebugAction {
                build: BuildAction::from_config(config)?,
                emulator: Invocation::parse(&config.qemu_binary, &debug_args(config))?,
            }),
        })
    }
}

/// A workflow that launches one or more external processes and reports the
/// exit code the whole run should mirror.
pub trait Action: std::fmt::Debug {
    /// Canonical name, printed before dispatch.
    fn name(&self) -> &'static str;

    /// Execute the workflow through `launcher`.
    ///
    /// A nonzero [`ProcessResult`] is a normal outcome (the child failed);
    /// `Err` means a child could not be launched at all.
    ///
    /// # Errors
    ///
    /// Returns an error if a process could not be started.
    fn run(&self, launcher: &dyn Launcher) -> anyhow::Result<ProcessResult>;
}

/// Invoke the build tool and mirror its exit code.
#[derive(Debug)]
struct BuildAction {
    invocation: Invocation,
}

impl BuildAction {
    fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            invocation: Invocation::parse(&config.build_command, &config.build_args)?,
        })
    }
}

impl Action for BuildAction {
    fn name(&self) -> &'static str {
        "build"
    }

    fn run(&self, launcher: &dyn Launcher) -> anyhow::Result<ProcessResult> {
        launcher.launch(&self.invocation)
    }
}

/// Build, and boot the image under the emulator only if the build succeeded.
#[derive(Debug)]
struct RunAction {
    build: BuildAction,
    emulator: Invocation,
}

impl Action for RunAction {
    fn name(&self) -> &'static str {
        "run"
    }

    fn run(&self, launcher: &dyn Launcher) -> anyhow::Result<ProcessResult> {
        let built = self.build.run(launcher)?;
        if !built.success() {
            return Ok(built);
        }
        launcher.launch(&self.emulator)
    }
}

/// Like run, but the emulator starts halted with a GDB stub listening.
#[derive(Debug)]
struct DebugAction {
    build: BuildAction,
    emulator: Invocation,
}

impl Action for DebugAction {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn run(&self, launcher: &dyn Launcher) -> anyhow::Result<ProcessResult> {
        let built = self.build.run(launcher)?;
        if !built.success() {
            return Ok(built);
        }
        launcher.launch(&self.emulator)
    }
}

/// Emulator arguments for a plain boot: serial on stdio, and exit instead of
/// rebooting on triple fault so kernel panics end the process.
fn run_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "-kernel".to_string(),
        config.image.clone(),
        "-serial".to_string(),
        "stdio".to_string(),
        "-no-reboot".to_string(),
    ];
    args.extend(config.qemu_extra_args.iter().cloned());
    args
}

/// Debug boot: interrupt logging plus a GDB stub (`-s` is tcp::1234), halted
/// at the first instruction (`-S`) until a debugger attaches.
fn debug_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        "int".to_string(),
        "-s".to_string(),
        "-S".to_string(),
    ];
    args.extend(run_args(config));
    args
}
