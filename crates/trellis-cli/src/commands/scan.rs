//! `trellis scan`: show which components a package scan would register.

use clap::Args;
use std::fmt::Write as _;

use super::SourceArgs;
use crate::output::{self, BeanView};

/// Arguments for the `scan` command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Descriptor inputs and container settings.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Base package to scan; repeatable.
    #[arg(long = "package", required = true)]
    pub packages: Vec<String>,
}

/// Executes the `scan` command.
///
/// # Errors
///
/// Returns an error if descriptors cannot be loaded or the scan fails.
pub fn execute(args: &ScanArgs, json: bool) -> anyhow::Result<()> {
    let container = args.source.container()?;
    let count = container.scan(&args.packages)?;
    let beans = BeanView::all(&*container.registry().borrow());

    let rendered = if json {
        output::to_json(&beans)?
    } else {
        let mut out = String::new();
        output::heading(&mut out, &format!("Scan of {}", args.packages.join(", ")));
        output::bean_lines(&mut out, &beans);
        let _ = writeln!(out);
        let _ = writeln!(out, "  {count} component(s) registered.");
        out
    };
    output::emit(&rendered)
}
