use std::path::PathBuf;

use clap::Parser;

use kdev::action::ActionKind;
use kdev::config::Config;
use kdev::launcher::SystemLauncher;

#[derive(Parser)]
#[command(
    name = "kdev",
    version,
    about = "Build, run, and debug a kernel image under QEMU"
)]
struct Cli {
    /// What to do: build, run, or debug (aliases: b, r, d)
    #[arg(value_enum)]
    action: ActionKind,

    /// Read settings from this file instead of the usual lookup
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show config resolution and the commands being launched
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_file(path, cli.verbose)?,
        None => Config::load(cli.verbose)?,
    };
    let action = cli.action.action(&config)?;

    // Announce the canonical action name before anything is launched, so
    // aliases leave the same trail as their long forms.
    eprintln!("[kdev] {}", action.name());

    let launcher = SystemLauncher::new(cli.verbose);
    Ok(action.run(&launcher)?.code())
}

fn or_exit(r: anyhow::Result<i32>) -> i32 {
    r.unwrap_or_else(|e| {
        eprintln!("[kdev] error: {e:#}");
        1
    })
}

fn main() {
    let cli = Cli::parse();
    let exit_code = or_exit(run(&cli));
    std::process::exit(exit_code);
}
