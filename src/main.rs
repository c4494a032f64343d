use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Result};
use clap::Parser;

use muxbuf::buffer::{BufferStore, MemoryBufferStore};
use muxbuf::commands::Commands;
use muxbuf::config::Config;
use muxbuf::host::{
    ConsoleOutput, HostEnv, LinePrompter, LogObserver, NullGenerator, PromptConsent, Prompter,
    ShellPipes, TrustAll,
};
use muxbuf::plugin::{hooks, Manager, PluginError};

#[derive(Parser)]
#[command(name = "muxbuf")]
#[command(about = "Scriptable terminal buffer host with Lua plugins")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.muxbuf/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to load plugins from (overrides config)
    #[arg(short, long, global = true)]
    plugins: Option<PathBuf>,

    /// Approve capability and hook requests without prompting
    #[arg(long, global = true)]
    trust: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let plugin_dir = cli.plugins.unwrap_or_else(|| config.plugin_dir());

    let buffers = Rc::new(MemoryBufferStore::new());
    let mut manager = Manager::new(build_env(Rc::clone(&buffers), cli.trust));
    for name in &config.muted {
        if !manager.muted(name) {
            manager.toggle_mute(name);
        }
    }

    match cli.command {
        Commands::List => {
            manager.load_all(&plugin_dir).map_err(plugin_err)?;
            let plugins = manager.list();
            if plugins.is_empty() {
                println!("no plugins loaded from {}", plugin_dir.display());
            }
            for descriptor in plugins {
                println!("{:<20} {}", descriptor.name, descriptor.version);
            }
        }
        Commands::Check { path } => {
            let descriptor = manager.load(&path).map_err(plugin_err)?;
            println!("{} {} (compat {})", descriptor.name, descriptor.version, descriptor.muxbuf);
            for hook in manager.hook_names(&descriptor.name).map_err(plugin_err)? {
                println!("  hook    {hook}");
            }
            let prefix = format!("{}.", descriptor.name);
            for command in manager.command_names() {
                if command.starts_with(&prefix) {
                    println!("  command {command}");
                }
            }
        }
        Commands::Run { command, args } => {
            manager.load_all(&plugin_dir).map_err(plugin_err)?;
            // Plugins get a chance to rewrite the command line first, the
            // same way the REPL dispatches.
            let command = manager.run_hook(hooks::BEFORE_COMMAND, "", &command);
            if !manager.is_command(&command) {
                bail!("unknown plugin command {command:?}");
            }
            manager.run_command(&command, &args).map_err(plugin_err)?;
        }
        Commands::Hooks { name } => {
            manager.load_all(&plugin_dir).map_err(plugin_err)?;
            for hook in manager.hook_names(&name).map_err(plugin_err)? {
                println!("{hook}");
            }
        }
    }
    Ok(())
}

/// `PluginError` carries `mlua::Error`, which is not `Send + Sync`, so it
/// cannot cross into `anyhow` as a source; render it instead.
fn plugin_err(err: PluginError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}

fn build_env(buffers: Rc<MemoryBufferStore>, trust: bool) -> HostEnv {
    let prompter: Rc<dyn Prompter> = Rc::new(LinePrompter);
    let consent: Rc<dyn muxbuf::host::Consent> = if trust {
        Rc::new(TrustAll)
    } else {
        Rc::new(PromptConsent::new(Rc::clone(&prompter)))
    };
    HostEnv {
        buffers: Rc::clone(&buffers) as Rc<dyn BufferStore>,
        prompter,
        consent,
        output: Rc::new(ConsoleOutput),
        generator: Rc::new(NullGenerator),
        pipes: Rc::new(ShellPipes::new(buffers as Rc<dyn BufferStore>)),
        observer: Rc::new(LogObserver),
    }
}
