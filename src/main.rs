//! csproj-info: print what a .NET project file evaluates to.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use csproj_rs::{properties, SwitcherConfiguration, XmlBuildEngine};

/// Inspect a .csproj / .vbproj file
#[derive(Parser)]
#[command(name = "csproj-info")]
#[command(author, version, long_about = None)]
struct Cli {
    /// Project file to load
    project: PathBuf,

    /// Switcher configuration whose `globals` become global properties
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an evaluated property (repeatable)
    #[arg(short, long = "get", value_name = "NAME")]
    get: Vec<String>,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long)]
    verbose: bool,

    /// Build arguments; `-property:Key=Value` entries become global properties
    #[arg(last = true, allow_hyphen_values = true, value_name = "ARGS")]
    build_args: Vec<String>,
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins; --verbose falls back to DEBUG.
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !csproj_rs::is_supported_project(&cli.project) {
        bail!(
            "unsupported project type: {} (expected .csproj or .vbproj)",
            cli.project.display()
        );
    }

    // Configuration globals first, then command-line switches; the first
    // value seen for a name is kept.
    let mut overrides: HashMap<String, String> = match &cli.config {
        Some(path) => SwitcherConfiguration::load(path)?.globals,
        None => HashMap::new(),
    };
    for (k, v) in properties::parse_args(&cli.build_args) {
        if !overrides.keys().any(|name| name.eq_ignore_ascii_case(&k)) {
            overrides.insert(k, v);
        }
    }

    let info = csproj_rs::load_project_with(&XmlBuildEngine, &cli.project, Some(&overrides))?;
    let has_version = info
        .has_version()
        .with_context(|| format!("reading {}", cli.project.display()))?;

    let requested: BTreeMap<&str, Option<&str>> = cli
        .get
        .iter()
        .map(|name| (name.as_str(), info.project().get_property(name)))
        .collect();

    if cli.json {
        let out = serde_json::json!({
            "path": info.project().full_path(),
            "legacyFormat": info.is_legacy_format(),
            "generatesPackage": info.generates_package(),
            "hasVersion": has_version,
            "globalProperties": info.collection().global_properties(),
            "properties": requested,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let format = if info.is_legacy_format() { "legacy" } else { "sdk" };

    println!("Project:           {}", info.project().full_path().display());
    println!("Format:            {format}");
    println!("Generates package: {}", yes_no(info.generates_package()));
    println!("Has version:       {}", yes_no(has_version));
    println!("Global properties:");
    for (name, value) in info.collection().global_properties().iter() {
        println!("  {name} = {value}");
    }
    if !requested.is_empty() {
        println!("Properties:");
        for (name, value) in &requested {
            println!("  {name} = {}", value.unwrap_or(""));
        }
    }

    Ok(())
}
