//! passgen: command-line password generator.
//!
//! # Usage
//!
//! ```text
//! passgen                       one password with the saved or default options
//! passgen -l 32 --off symbols   change options for this run
//! passgen --on spaces --save    change options and remember them
//! passgen -n 5 --show-options   five passwords plus the option table
//! passgen forget                delete saved preferences
//! ```

mod view;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use passgen_core::config::{self, AppConfig};
use passgen_core::monitor::Monitor;
use passgen_core::options::{self, ACTIVE, PLENGTH, PREFERENCES, TOGGLES};
use passgen_core::prefs::{self, PreferenceStore};

use view::OptionView;


#[derive(Parser, Debug)]
#[command(name = "passgen", version, about = "Generate random passwords")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Password length (clamped to 1..=1024).
    #[arg(short = 'l', long = "length", global = true)]
    length: Option<u64>,

    /// Switch an option on (repeatable).
    #[arg(long = "on", value_name = "OPTION", global = true)]
    on: Vec<String>,

    /// Switch an option off (repeatable).
    #[arg(long = "off", value_name = "OPTION", global = true)]
    off: Vec<String>,

    /// Remember the resulting options.
    #[arg(long, global = true)]
    save: bool,

    /// Start from the default options.
    #[arg(long, global = true)]
    reset: bool,

    /// Number of passwords to print.
    #[arg(short = 'n', long = "count", default_value_t = 1, global = true)]
    count: usize,

    /// Print the option table after the passwords.
    #[arg(long, global = true)]
    show_options: bool,

    /// Log dispatches (-v) or everything (-vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Print passwords (the default).
    Generate,
    /// Print the option table only.
    Options,
    /// Delete saved preferences.
    Forget,
}


fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_dir = resolve_config_dir();
    let app = config::load_or_default(&config_dir.join("passgen.yaml"))?;
    let prefs_path = preferences_path(&app, &config_dir);

    let store = Rc::new(RefCell::new(PreferenceStore::open(&prefs_path)?));
    if args.command == Some(Command::Forget) {
        store.borrow_mut().clear()?;
        println!("preferences removed: {}", prefs_path.display());
        return Ok(());
    }

    let mut monitor = build_monitor(&app, args.verbose > 0);
    let view = OptionView::attach(&mut monitor)?;
    options::install(&mut monitor, StdRng::from_os_rng())?;
    prefs::attach(&store, &mut monitor)?;

    prefs::start(&store, &mut monitor, args.reset)?;

    apply_args(&mut monitor, &args)?;

    if args.command != Some(Command::Options) {
        print_passwords(&mut monitor, args.count)?;
    }
    if args.show_options || args.command == Some(Command::Options) {
        print!("{}", view.render(&monitor));
    }
    Ok(())
}


fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "warn,passgen_core=debug,passgen=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}


fn resolve_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PASSGEN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("passgen")
}


fn preferences_path(app: &AppConfig, config_dir: &std::path::Path) -> PathBuf {
    app.preferences_file
        .clone()
        .unwrap_or_else(|| config_dir.join("preferences.json"))
}


fn build_monitor(app: &AppConfig, log_changes: bool) -> Monitor {
    let monitor = Monitor::with_root(options::initial_root()).with_config(app.monitor.clone());
    if log_changes {
        monitor.with_controller(|_m, c| debug!("{}", options::describe(c)))
    } else {
        monitor
    }
}


fn check_option(name: &str) -> Result<()> {
    if TOGGLES.contains(&name) {
        Ok(())
    } else {
        bail!("unknown option '{}' (expected one of: {})", name, TOGGLES.join(", "))
    }
}


fn apply_args(monitor: &mut Monitor, args: &Args) -> Result<()> {
    for name in &args.on {
        check_option(name)?;
        options::set_option(monitor, name, true)?;
    }
    for name in &args.off {
        check_option(name)?;
        options::set_option(monitor, name, false)?;
    }
    if let Some(length) = args.length {
        let applied = options::set_length(monitor, length)?;
        if applied != length {
            debug!(requested = length, applied, "{} clamped", PLENGTH);
        }
    }
    if args.save {
        options::set_option(monitor, PREFERENCES, true)?;
    }
    Ok(())
}


fn print_passwords(monitor: &mut Monitor, count: usize) -> Result<()> {
    for i in 0..count {
        if i > 0 {
            monitor.trigger(ACTIVE, true)?;
        }
        let pw = options::password(monitor)
            .context("no password generated: every character class is off")?;
        println!("{}", pw);
    }
    Ok(())
}
