//! `locus settings`: effective settings and first-time setup.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use locus_core::settings::{self, Settings};

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the effective settings as YAML.
    Show(HomeArg),
    /// Write default settings to ~/.locus/settings.yaml.
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct HomeArg {
    /// Directory holding `.locus/`; defaults to the home directory.
    #[arg(long)]
    pub home: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub home: HomeArg,

    /// Overwrite an existing settings file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show(args) => {
            let home = super::resolve_home(args.home)?;
            let effective = settings::load_at(&home).context("failed to load settings")?;
            let path = settings::settings_path_at(&home);
            let source = if path.exists() { "file" } else { "defaults" };
            println!("# {} ({source})", path.display());
            print!(
                "{}",
                serde_yaml::to_string(&effective).context("failed to render settings")?
            );
        }
        SettingsCommand::Init(args) => {
            let home = super::resolve_home(args.home.home)?;
            let path = settings::settings_path_at(&home);
            if path.exists() && !args.force {
                bail!(
                    "settings already exist at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let written = settings::save_at(&home, &Settings::default())
                .context("failed to write settings")?;
            println!("✓ Wrote default settings to {}", written.display());
        }
    }
    Ok(())
}
