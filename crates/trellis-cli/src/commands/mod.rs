//! CLI command definitions and dispatch.

pub mod check;
pub mod plan;
pub mod scan;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use trellis_common::config::TrellisConfig;
use trellis_common::constants::DESCRIPTOR_EXTENSION;
use trellis_context::AnnotationConfigContainer;
use trellis_core::source::ClassIndex;

/// trellis: resolve annotated configuration classes into bean definitions.
#[derive(Parser, Debug)]
#[command(name = "trellis", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve root configuration classes and print the bean definitions.
    Plan(plan::PlanArgs),
    /// Scan packages for components and print what would be registered.
    Scan(scan::ScanArgs),
    /// Parse descriptors and validate every configuration class in them.
    Check(check::CheckArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => plan::execute(&args, cli.json),
        Command::Scan(args) => scan::execute(&args, cli.json),
        Command::Check(args) => check::execute(&args, cli.json),
    }
}

/// Descriptor inputs and container settings shared by every command.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Descriptor files, or directories searched for `.tcd` files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// JSON file with container configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Profile to activate; repeatable.
    #[arg(long = "profile")]
    pub profiles: Vec<String>,

    /// Property as `key=value`; repeatable, wins over the configuration file.
    #[arg(long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,
}

impl SourceArgs {
    /// Descriptor files named directly or found under the given directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a path does not exist or no descriptor is found.
    pub fn descriptor_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|entry| entry.file_type().is_file() && is_descriptor(entry.path()))
                    .map(walkdir::DirEntry::into_path)
                    .collect();
                found.sort();
                files.extend(found);
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                anyhow::bail!("no such file or directory: {}", path.display());
            }
        }
        if files.is_empty() {
            anyhow::bail!("no {DESCRIPTOR_EXTENSION} descriptors found");
        }
        tracing::debug!(count = files.len(), "descriptor files collected");
        Ok(files)
    }

    /// Loads every descriptor into one class index.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor cannot be read or is invalid.
    pub fn class_index(&self) -> anyhow::Result<ClassIndex> {
        let files = self.descriptor_files()?;
        Ok(trellis_descriptor::index_from_files(files.as_slice())?)
    }

    /// Container configuration with flag overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn trellis_config(&self) -> anyhow::Result<TrellisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                TrellisConfig::from_json(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => TrellisConfig::default(),
        };
        if !self.profiles.is_empty() {
            config.active_profiles.clone_from(&self.profiles);
        }
        for (key, value) in &self.properties {
            let _ = config.properties.insert(key.clone(), value.clone());
        }
        Ok(config)
    }

    /// An empty container over the loaded descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if descriptors or configuration cannot be loaded.
    pub fn container(&self) -> anyhow::Result<AnnotationConfigContainer> {
        let index = self.class_index()?;
        let config = self.trellis_config()?;
        Ok(AnnotationConfigContainer::builder(Rc::new(index))
            .config(config)
            .build())
    }
}

fn is_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(DESCRIPTOR_EXTENSION))
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
