//! `trellis plan`: resolve root configuration classes and show the result.

use clap::Args;
use serde::Serialize;
use std::fmt::Write as _;
use trellis_context::processor::ConfigurationClassSummary;

use super::SourceArgs;
use crate::output::{self, BeanView};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Descriptor inputs and container settings.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Fully qualified root configuration class; repeatable.
    #[arg(long = "root", required = true)]
    pub roots: Vec<String>,

    /// Base package scanned before processing; repeatable.
    #[arg(long = "scan")]
    pub scan: Vec<String>,

    /// Print the import graph in Graphviz DOT format instead.
    #[arg(long)]
    pub dot: bool,
}

/// Everything `plan` reports, in one serializable value.
#[derive(Debug, Serialize)]
struct Plan<'a> {
    configuration_classes: &'a [ConfigurationClassSummary],
    beans: Vec<BeanView>,
    initialization_order: &'a [String],
    property_sources: &'a [String],
    rounds: usize,
}

/// Executes the `plan` command.
///
/// Registers the roots, runs any requested scan, refreshes the container,
/// and prints the configuration classes and bean definitions it produced.
///
/// # Errors
///
/// Returns an error if descriptors cannot be loaded or processing fails.
pub fn execute(args: &PlanArgs, json: bool) -> anyhow::Result<()> {
    let mut container = args.source.container()?;
    let _ = container.register(&args.roots)?;
    if !args.scan.is_empty() {
        let found = container.scan(&args.scan)?;
        tracing::info!(count = found, "components scanned");
    }
    let _ = container.refresh()?;

    let Some(report) = container.report() else {
        anyhow::bail!("container refreshed without a processing report");
    };
    if args.dot {
        return output::emit(&report.import_graph().to_dot());
    }

    let beans = BeanView::all(&*container.registry().borrow());
    let plan = Plan {
        configuration_classes: &report.configuration_classes,
        beans,
        initialization_order: container.initialization_order(),
        property_sources: &report.property_sources,
        rounds: report.rounds,
    };
    let rendered = if json {
        output::to_json(&plan)?
    } else {
        render(&plan)
    };
    output::emit(&rendered)
}

fn render(plan: &Plan<'_>) -> String {
    let mut out = String::new();
    output::heading(&mut out, "Configuration classes");
    for class in plan.configuration_classes {
        let _ = write!(out, "  * {}", class.class_name);
        if let Some(bean_name) = &class.bean_name {
            let _ = write!(out, " as {bean_name}");
        }
        let _ = writeln!(out);
        if !class.imported_by.is_empty() {
            let _ = writeln!(out, "      imported by: {}", class.imported_by.join(", "));
        }
        if !class.skipped_bean_methods.is_empty() {
            let _ = writeln!(out, "      skipped: {}", class.skipped_bean_methods.join(", "));
        }
        for location in &class.imported_resources {
            let _ = writeln!(out, "      resource: {location}");
        }
    }
    let _ = writeln!(out);

    output::heading(&mut out, "Bean definitions");
    output::bean_lines(&mut out, &plan.beans);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "  {} bean definition(s) from {} configuration class(es) in {} round(s).",
        plan.beans.len(),
        plan.configuration_classes.len(),
        plan.rounds
    );
    if !plan.initialization_order.is_empty() {
        let _ = writeln!(out, "  Initialization order: {}", plan.initialization_order.join(" -> "));
    }
    if !plan.property_sources.is_empty() {
        let _ = writeln!(out, "  Property sources: {}", plan.property_sources.join(", "));
    }
    out
}
