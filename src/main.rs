mod archive;
mod cli;
mod config;
mod descriptor;
mod digest;
mod download;
mod error;
mod install;
mod platform;
mod template;
mod types;


use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use config::{get_setting, load_config, normalize_key, save_config, set_setting, unset_setting};
use console::style;
use descriptor::ReleaseDescriptor;
use digest::Sha256Digest;
use install::{install_release, remove_tool, test_installed, InstallOptions, InstallStrategy};
use platform::Platform;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config()?;

    match cli.command {
        Commands::Version => {
            println!("relinst v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Platform => {
            println!("{}", host_platform()?);
        }

        Commands::Install {
            descriptor,
            platform,
            from_source,
            bin_dir,
            no_test,
        } => {
            let descriptor = load_descriptor(&descriptor)?;
            let opts = InstallOptions {
                platform: resolve_platform(platform.as_deref())?,
                bin_dir: bin_dir.unwrap_or_else(|| PathBuf::from(&config.settings.bin_dir)),
                from_source,
                run_self_test: config.settings.run_self_test && !no_test,
            };

            eprintln!("Installing {} {}...", descriptor.name, descriptor.version);
            let path = install_release(&mut config, &descriptor, &opts).await?;
            println!(
                "{} {} {} -> {}",
                style("installed").green().bold(),
                descriptor.name,
                descriptor.version,
                path.display()
            );
        }

        Commands::Test { name } => {
            test_installed(&config, &name)?;
            println!("{} {}", style("ok").green().bold(), name);
        }

        Commands::List => list_installed_tools(&config),

        Commands::Uninstall { name } => {
            remove_tool(&mut config, &name)?;
            println!("removed {}", name);
        }

        Commands::Verify { file, sha256 } => {
            let expected: Sha256Digest = sha256.parse().map_err(|e: String| anyhow!(e))?;
            let actual = Sha256Digest::of_file(&file)
                .with_context(|| format!("Could not read {}", file.display()))?;
            if actual != expected {
                return Err(error::InstallError::Integrity {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                }
                .into());
            }
            println!("{} {}", style("ok").green().bold(), file.display());
        }

        Commands::Render {
            template: template_path,
            values,
            output,
        } => {
            let content = fs::read_to_string(&template_path)
                .with_context(|| format!("Could not read template {}", template_path.display()))?;
            let values = values
                .iter()
                .map(|v| template::parse_assignment(v))
                .collect::<Result<HashMap<_, _>>>()?;
            let rendered = template::render(&content, &values)?;
            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("Could not write {}", path.display()))?;
                    tracing::info!("Rendered {} to {}", template_path.display(), path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Commands::Show {
            descriptor,
            platform,
        } => {
            let descriptor = load_descriptor(&descriptor)?;
            let platform = resolve_platform(platform.as_deref())?;
            show_descriptor(&descriptor, platform);
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                if let Some(key) = key {
                    println!("{}", get_setting(&config.settings, &key)?);
                } else {
                    println!("--- relinst settings ---");
                    for key in config::SETTING_KEYS {
                        println!("  {}: {}", key, get_setting(&config.settings, key)?);
                    }
                }
            }
            ConfigAction::Set { args } => {
                let (key, value) = match args.as_slice() {
                    [single] => single
                        .split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .ok_or_else(|| anyhow!("Invalid format. Use 'key=value' or 'key value'."))?,
                    [key, rest @ ..] => (key.clone(), rest.join(" ")),
                    [] => return Err(anyhow!("Missing key")),
                };
                set_setting(&mut config.settings, &key, &value)?;
                save_config(&config)?;
                tracing::info!("Setting '{}' updated to '{}'", normalize_key(&key), value);
            }
            ConfigAction::Unset { key } => {
                unset_setting(&mut config.settings, &key)?;
                save_config(&config)?;
                tracing::info!("Setting '{}' unset", normalize_key(&key));
            }
        },
    }

    Ok(())
}

fn setup_logging(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();
}

fn load_descriptor(path: &std::path::Path) -> Result<ReleaseDescriptor> {
    ReleaseDescriptor::load(path).with_context(|| format!("Invalid descriptor {}", path.display()))
}

fn host_platform() -> Result<Platform> {
    Platform::current().ok_or_else(|| {
        anyhow!(
            "Unsupported host platform {}-{}; pass --platform",
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    })
}

fn resolve_platform(requested: Option<&str>) -> Result<Platform> {
    match requested {
        Some(p) => p.parse().map_err(|e: String| anyhow!(e)),
        None => host_platform(),
    }
}

fn show_descriptor(d: &ReleaseDescriptor, platform: Platform) {
    println!("{} {}", style(&d.name).bold(), d.version);
    if let Some(desc) = &d.desc {
        println!("  {}", desc);
    }
    if let Some(homepage) = &d.homepage {
        println!("  Homepage: {}", homepage);
    }
    println!("  Binary:   {}", d.executable_name(platform));
    let resolved = d.resolve_url(platform).ok();
    for (key, asset) in &d.assets {
        let marker = if resolved == Some(asset.url.as_str()) { "*" } else { " " };
        println!("  {} {:<16} {} ({})", marker, key.to_string(), asset.url, asset.format);
        println!("    sha256: {}", asset.sha256);
    }
    if let Some(src) = &d.source {
        println!("  Source:   {} ({})", src.url, src.format);
        println!("    sha256: {}", src.sha256);
        println!("    build:  {} {}", src.toolchain.program, src.toolchain.args.join(" "));
    }

    match InstallStrategy::select(d, platform, false) {
        Ok(strategy) => println!(
            "  For {}: {} from {}",
            platform,
            strategy.kind(),
            strategy.url()
        ),
        Err(e) => println!("  For {}: {}", platform, style(e).yellow()),
    }
}

fn list_installed_tools(config: &types::RelinstConfig) {
    println!("--- Installed tools ---");
    if config.tools.is_empty() {
        println!("  No tools installed yet.");
        return;
    }

    for info in config.tools.values() {
        println!(
            "  - {} (v{}) [{}, {}]",
            style(&info.name).bold(),
            info.version,
            info.kind,
            info.platform
        );
        println!("    Path:      {}", info.executable_path);
        println!("    Installed: {}\n", info.installed_at);
    }
    println!("-----------------------");
}
