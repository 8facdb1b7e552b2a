use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use pkcs11_module::{ModuleInfo, Pkcs11Module, SlotId, SlotInfo, Template};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Inspect PKCS#11 middleware modules",
    propagate_version = true
)]
struct Cli {
    /// PKCS#11 library to load, as a path or a name known to the platform loader.
    #[arg(long, env = "PKCS11_MODULE", global = true)]
    library: Option<String>,

    /// Structure layout of the library (e.g. linux-x64, windows-x64). Defaults to the host.
    #[arg(long, global = true)]
    template: Option<Template>,

    /// Configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show general information about the module.
    Info,
    /// List slots with their descriptions.
    Slots {
        /// Include slots without a token.
        #[arg(long)]
        all: bool,
        /// Maximum number of slots to request.
        #[arg(long, value_name = "COUNT")]
        max: Option<usize>,
    },
    /// Write a configuration file with the default settings.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

enum Action {
    Info,
    Slots { all: bool, max: Option<usize> },
}

const SLOT_COLUMNS: [&str; 8] = [
    "ID",
    "Description",
    "Manufacturer",
    "Token",
    "Removable",
    "HW slot",
    "HW version",
    "FW version",
];

#[derive(Serialize)]
struct SlotRow {
    id: SlotId,
    #[serde(flatten)]
    info: SlotInfo,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(CliConfig::default_path);
    let action = match cli.command {
        Commands::InitConfig { force } => return init_config(&config_path, force),
        Commands::Info => Action::Info,
        Commands::Slots { all, max } => Action::Slots { all, max },
    };

    let config = CliConfig::load(&config_path)?;
    let library = cli.library.or(config.library.clone()).context(
        "no PKCS#11 library given; pass --library, set PKCS11_MODULE or add `library` to the config file",
    )?;
    let template = cli.template.or(config.template).unwrap_or_default();
    debug!(%library, %template, config = %config_path.display(), "opening PKCS#11 module");

    let module = Pkcs11Module::new(&library, template)
        .with_context(|| format!("cannot open PKCS#11 module {library}"))?;
    module
        .activate()
        .context("failed to initialize the PKCS#11 module")?;

    let outcome = match action {
        Action::Info => show_info(&module, cli.json),
        Action::Slots { all, max } => {
            let present = !all && config.token_present;
            list_slots(&module, present, max.unwrap_or(config.max_slots), cli.json)
        }
    };
    let closed = module
        .close()
        .context("failed to finalize the PKCS#11 module");
    outcome?;
    closed
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    CliConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn show_info(module: &Pkcs11Module, json: bool) -> anyhow::Result<()> {
    let info: ModuleInfo = module.info()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Cryptoki version".to_string(), info.cryptoki_version.to_string()]);
    table.add_row(vec!["Manufacturer".to_string(), info.manufacturer]);
    table.add_row(vec!["Library".to_string(), info.library_description]);
    table.add_row(vec!["Library version".to_string(), info.library_version.to_string()]);
    table.add_row(vec!["Flags".to_string(), format!("0x{:X}", info.flags)]);
    println!("{table}");
    Ok(())
}

fn list_slots(
    module: &Pkcs11Module,
    present: bool,
    max_count: usize,
    json: bool,
) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for slot in module.slots(present, max_count)? {
        let info = slot
            .info()
            .with_context(|| format!("failed to read slot {}", slot.id()))?;
        rows.push(SlotRow { id: slot.id(), info });
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No slots found.");
        return Ok(());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(SLOT_COLUMNS);
    for SlotRow { id, info } in rows {
        table.add_row(vec![
            id.to_string(),
            info.description.clone(),
            info.manufacturer.clone(),
            yes_no(info.token_present()),
            yes_no(info.removable_device()),
            yes_no(info.hardware_slot()),
            info.hardware_version.to_string(),
            info.firmware_version.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn yes_no(flag: bool) -> String {
    let answer = if flag { "yes" } else { "no" };
    answer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_columns_name_flags_and_versions_apart() {
        for (i, column) in SLOT_COLUMNS.iter().enumerate() {
            assert!(!SLOT_COLUMNS[..i].contains(column), "duplicate column {column}");
        }
        assert!(SLOT_COLUMNS.contains(&"HW slot"));
        assert!(SLOT_COLUMNS.contains(&"HW version"));
        assert!(SLOT_COLUMNS.contains(&"FW version"));
    }
}
