use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Name of the project-local config file, looked up in the current directory.
pub const PROJECT_FILE: &str = "kdev.toml";

const DEFAULT_BUILD_COMMAND: &str = "make";
const DEFAULT_QEMU_BINARY: &str = "qemu-system-x86_64";
const DEFAULT_IMAGE: &str = "kernel.amd64.bin";

/// Resolved tool settings.
///
/// Precedence, highest first:
/// 1. `KDEV_BUILD` / `KDEV_QEMU` / `KDEV_IMAGE` environment variables
/// 2. `kdev.toml` in the current directory
/// 3. `{config_dir}/kdev/config.toml` (e.g. `~/.config/kdev/config.toml`)
/// 4. Built-in defaults: `make`, `qemu-system-x86_64`, `kernel.amd64.bin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Build command; split on whitespace, so it may embed leading arguments.
    pub build_command: String,
    /// Extra arguments appended verbatim to the build command.
    pub build_args: Vec<String>,
    /// Emulator binary; split on whitespace like `build_command`.
    pub qemu_binary: String,
    /// Kernel image path handed to the emulator as `-kernel <image>`.
    pub image: String,
    /// Extra emulator arguments appended after the mode-specific flag set.
    pub qemu_extra_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            build_args: Vec::new(),
            qemu_binary: DEFAULT_QEMU_BINARY.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            qemu_extra_args: Vec::new(),
        }
    }
}

/// Parsed shape of a kdev config file. Every field is optional; whatever is
/// present overrides the value resolved so far.
#[derive(Deserialize)]
struct FileConfig {
    build: Option<BuildSection>,
    qemu: Option<QemuSection>,
}

#[derive(Deserialize)]
struct BuildSection {
    command: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct QemuSection {
    binary: Option<String>,
    image: Option<String>,
    extra_args: Option<Vec<String>>,
}

/// Try to load a config file from `path`. Returns `Ok(None)` if the file does
/// not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or contains invalid
/// TOML.
fn try_load(path: &Path) -> anyhow::Result<Option<FileConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to read config file: {}", path.display())));
        }
    };
    let file: FileConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(Some(file))
}

impl Config {
    /// Load config using auto-detected paths (see the precedence list on
    /// [`Config`]).
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    /// Missing files are fine; defaults apply.
    pub fn load(verbose: bool) -> anyhow::Result<Self> {
        let project = std::env::current_dir().ok().map(|d| d.join(PROJECT_FILE));
        let user = dirs::config_dir().map(|d| d.join("kdev").join("config.toml"));
        Self::load_from(project.as_deref(), user.as_deref(), verbose)
    }

    /// Load config from explicit paths (both optional). Useful for testing.
    /// The project file shadows the user file; environment variables shadow
    /// both.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file exists but cannot be read or parsed.
    pub fn load_from(
        project: Option<&Path>,
        user: Option<&Path>,
        verbose: bool,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let mut applied = false;

        // Lower priority first, so the project file overwrites user values.
        for path in [user, project].into_iter().flatten() {
            if let Some(file) = try_load(path)? {
                if verbose {
                    eprintln!("[kdev] config: {}", path.display());
                }
                config.apply(file);
                applied = true;
            }
        }
        if verbose && !applied {
            eprintln!("[kdev] no config file, using defaults");
        }

        config.apply_env();
        Ok(config)
    }

    /// Load exactly `path` (the `--config` flag), skipping discovery.
    /// Environment variables still take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or invalid TOML.
    pub fn load_file(path: &Path, verbose: bool) -> anyhow::Result<Self> {
        let file = try_load(path)?
            .ok_or_else(|| anyhow::anyhow!("config file not found: {}", path.display()))?;
        if verbose {
            eprintln!("[kdev] config: {}", path.display());
        }
        let mut config = Self::default();
        config.apply(file);
        config.apply_env();
        Ok(config)
    }

    fn apply(&mut self, file: FileConfig) {
        if let Some(build) = file.build {
            if let Some(command) = build.command {
                self.build_command = command;
            }
            if let Some(args) = build.args {
                self.build_args = args;
            }
        }
        if let Some(qemu) = file.qemu {
            if let Some(binary) = qemu.binary {
                self.qemu_binary = binary;
            }
            if let Some(image) = qemu.image {
                self.image = image;
            }
            if let Some(extra_args) = qemu.extra_args {
                self.qemu_extra_args = extra_args;
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("KDEV_BUILD") {
            self.build_command = val;
        }
        if let Ok(val) = std::env::var("KDEV_QEMU") {
            self.qemu_binary = val;
        }
        if let Ok(val) = std::env::var("KDEV_IMAGE") {
            self.image = val;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.build_command, "make");
        assert!(config.build_args.is_empty());
        assert_eq!(config.qemu_binary, "qemu-system-x86_64");
        assert_eq!(config.image, "kernel.amd64.bin");
        assert!(config.qemu_extra_args.is_empty());
    }

    #[test]
    fn apply_full_file() {
        let file: FileConfig = toml::from_str(
            r#"
[build]
command = "ninja -C build"
args = ["kernel"]

[qemu]
binary = "qemu-system-i386"
image = "kernel.i686.bin"
extra_args = ["-m", "512M"]
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply(file);
        assert_eq!(config.build_command, "ninja -C build");
        assert_eq!(config.build_args, ["kernel"]);
        assert_eq!(config.qemu_binary, "qemu-system-i386");
        assert_eq!(config.image, "kernel.i686.bin");
        assert_eq!(config.qemu_extra_args, ["-m", "512M"]);
    }

    #[test]
    fn apply_partial_file_keeps_other_defaults() {
        let file: FileConfig = toml::from_str("[qemu]\nimage = \"out/kernel.bin\"\n").unwrap();
        let mut config = Config::default();
        config.apply(file);
        assert_eq!(config.image, "out/kernel.bin");
        // untouched
        assert_eq!(config.build_command, "make");
        assert_eq!(config.qemu_binary, "qemu-system-x86_64");
    }

    #[test]
    fn apply_empty_file_is_all_defaults() {
        let file: FileConfig = toml::from_str("").unwrap();
        let mut config = Config::default();
        config.apply(file);
        assert_eq!(config, Config::default());
    }

    // -----------------------------------------------------------------------
    // load_from / load_file go through apply_env, so they are serialised
    // against the env var tests below.
    // -----------------------------------------------------------------------

    #[test]
    #[serial]
    fn load_from_missing_files_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(
            Some(&dir.path().join("kdev.toml")),
            Some(&dir.path().join("config.toml")),
            false,
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn load_from_project_shadows_user() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("kdev.toml");
        std::fs::write(&user, "[build]\ncommand = \"user-make\"\nargs = [\"-j2\"]\n").unwrap();
        std::fs::write(&project, "[build]\ncommand = \"project-make\"\n").unwrap();

        let config = Config::load_from(Some(&project), Some(&user), false).unwrap();
        assert_eq!(config.build_command, "project-make");
        // user values survive where the project file is silent
        assert_eq!(config.build_args, ["-j2"]);
    }

    #[test]
    #[serial]
    fn load_from_user_file_alone_applies() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = dir.path().join("config.toml");
        std::fs::write(&user, "[qemu]\nbinary = \"qemu-system-aarch64\"\n").unwrap();

        let config =
            Config::load_from(Some(&dir.path().join("kdev.toml")), Some(&user), false).unwrap();
        assert_eq!(config.qemu_binary, "qemu-system-aarch64");
    }

    #[test]
    #[serial]
    fn load_from_invalid_toml_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let project = dir.path().join("kdev.toml");
        std::fs::write(&project, "not valid toml [[[").unwrap();

        let err = Config::load_from(Some(&project), None, false).unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains("failed to parse config file") && msg.contains("kdev.toml"),
            "unexpected error: {msg}"
        );
    }

    #[test]
    #[serial]
    fn load_file_requires_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load_file(&dir.path().join("nope.toml"), false).unwrap_err();
        assert!(
            format!("{err:#}").contains("config file not found"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    #[serial]
    fn load_file_applies_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("alt.toml");
        std::fs::write(&path, "[build]\ncommand = \"cargo build\"\n").unwrap();

        let config = Config::load_file(&path, false).unwrap();
        assert_eq!(config.build_command, "cargo build");
    }

    #[test]
    #[serial]
    fn env_overrides_file_and_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let project = dir.path().join("kdev.toml");
        std::fs::write(&project, "[build]\ncommand = \"file-make\"\n").unwrap();

        // SAFETY: test-only env mutation; #[serial] prevents races with other tests.
        unsafe {
            std::env::set_var("KDEV_BUILD", "env-make");
            std::env::set_var("KDEV_QEMU", "env-qemu");
            std::env::set_var("KDEV_IMAGE", "env.bin");
        }
        let config = Config::load_from(Some(&project), None, false).unwrap();
        unsafe {
            std::env::remove_var("KDEV_BUILD");
            std::env::remove_var("KDEV_QEMU");
            std::env::remove_var("KDEV_IMAGE");
        }

        assert_eq!(config.build_command, "env-make");
        assert_eq!(config.qemu_binary, "env-qemu");
        assert_eq!(config.image, "env.bin");
    }

    #[test]
    #[serial]
    fn env_overrides_apply_on_top_of_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("alt.toml");
        std::fs::write(&path, "[qemu]\nimage = \"file.bin\"\n").unwrap();

        // SAFETY: test-only env mutation; #[serial] prevents races with other tests.
        unsafe { std::env::set_var("KDEV_IMAGE", "env.bin") };
        let config = Config::load_file(&path, false).unwrap();
        unsafe { std::env::remove_var("KDEV_IMAGE") };

        assert_eq!(config.image, "env.bin");
    }
}
