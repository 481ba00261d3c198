use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // Release builds are tagged; use the tag as-is.
    if let Some(tag) = option_env!("RELINST_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("RELINST_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("RELINST_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup.
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

const INSTALL_EXAMPLES: &str = "Examples:
  relinst install vdot.yaml
  relinst install vdot.json --platform 'macOS x86_64'
  relinst install vdot.yaml --from-source";

#[derive(Parser)]
#[command(name = "relinst")]
#[command(about = "Fetch, verify and install release binaries from descriptors")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a release from a descriptor file
    #[command(after_help = INSTALL_EXAMPLES)]
    Install {
        /// Descriptor file (.json, .yaml or .yml)
        descriptor: PathBuf,
        /// Target platform (defaults to the host, e.g. 'linux-x86_64')
        #[arg(long)]
        platform: Option<String>,
        /// Build from the declared source archive instead of a prebuilt asset
        #[arg(long)]
        from_source: bool,
        /// Install into this directory instead of the configured bin_dir
        #[arg(long)]
        bin_dir: Option<PathBuf>,
        /// Skip the post-install self-test
        #[arg(long)]
        no_test: bool,
    },

    /// Run the self-test of an installed tool
    Test {
        /// Tool name
        name: String,
    },

    /// List installed tools
    List,

    /// Remove an installed tool
    Uninstall {
        /// Tool name
        name: String,
    },

    /// Check a local file against a SHA-256 digest
    Verify {
        file: PathBuf,
        /// Expected digest (64 hex characters)
        sha256: String,
    },

    /// Substitute {{KEY}} placeholders in a descriptor template
    Render {
        template: PathBuf,
        /// Placeholder value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a descriptor and show what would be installed
    Show {
        descriptor: PathBuf,
        #[arg(long)]
        platform: Option<String>,
    },

    /// Print the detected platform identifier
    Platform,

    /// Manage relinst's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration setting
    Get {
        /// Key to get (if omitted, shows all settings)
        key: Option<String>,
    },
    /// Set a configuration setting
    Set {
        /// Key and value (e.g., 'bin-dir=/opt/bin' or 'bin-dir /opt/bin')
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },
    /// Reset a configuration setting to its default
    Unset {
        /// Key to unset (e.g., 'bin-dir')
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_flags() {
        let cli = Cli::try_parse_from([
            "relinst",
            "-vv",
            "install",
            "vdot.yaml",
            "--platform",
            "macOS x86_64",
            "--no-test",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Install {
                descriptor,
                platform,
                from_source,
                no_test,
                bin_dir,
            } => {
                assert_eq!(descriptor, PathBuf::from("vdot.yaml"));
                assert_eq!(platform.as_deref(), Some("macOS x86_64"));
                assert!(no_test);
                assert!(!from_source);
                assert!(bin_dir.is_none());
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_parse_render_values() {
        let cli = Cli::try_parse_from([
            "relinst", "render", "t.yaml", "--set", "VERSION=v1", "--set", "SHA=abc",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { values, output, .. } => {
                assert_eq!(values, vec!["VERSION=v1", "SHA=abc"]);
                assert!(output.is_none());
            }
            _ => panic!("expected render"),
        }
    }
}
