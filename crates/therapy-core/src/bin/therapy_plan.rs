//! Therapy Planning CLI Tool
//!
//! Finds the minimum-risk drug combination covering a patient's diseases.
//!
//! Usage:
//!   therapy-plan --age 67 --weight 82 --sex male --conditions asthma \
//!       --treat "Type 2 Diabetes" --treat hypertension --facts facts.json
//!   therapy-plan ... --adverse-events ae.json --frailty frailty.json --json

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use safetherapy_core::oracle::UnavailableModel;
use safetherapy_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "therapy-plan")]
#[command(author = "Mycelix Health")]
#[command(version, about = "Minimum-risk multi-target drug combination search", long_about = None)]
struct Cli {
    /// Patient age in years
    #[arg(long)]
    age: f64,

    /// Patient body weight in kilograms
    #[arg(long)]
    weight: f64,

    /// Patient sex
    #[arg(long, value_enum, default_value = "unknown")]
    sex: SexArg,

    /// Concomitant conditions (repeatable or comma-separated)
    #[arg(short, long = "conditions", value_name = "CONDITION", value_delimiter = ',')]
    conditions: Vec<String>,

    /// Diseases to treat (repeatable or comma-separated, free text is normalised)
    #[arg(short, long = "treat", value_name = "DISEASE", value_delimiter = ',', required = true)]
    treat: Vec<String>,

    /// Knowledge base JSON (indications and interactions)
    #[arg(long)]
    facts: PathBuf,

    /// Adverse-event probability table JSON
    #[arg(long)]
    adverse_events: Option<PathBuf>,

    /// Frailty table JSON
    #[arg(long)]
    frailty: Option<PathBuf>,

    /// Atom -> display name map JSON
    #[arg(long)]
    names: Option<PathBuf>,

    /// Search configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the expansion budget
    #[arg(long)]
    max_expansions: Option<usize>,

    /// Emit the plan as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SexArg {
    #[value(alias = "m")]
    Male,
    #[value(alias = "f")]
    Female,
    #[value(alias = "u")]
    Unknown,
}

impl From<SexArg> for Sex {
    fn from(sex: SexArg) -> Self {
        match sex {
            SexArg::Male => Sex::Male,
            SexArg::Female => Sex::Female,
            SexArg::Unknown => Sex::Unknown,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("loading search config {}", path.display()))?,
        None => SearchConfig::default(),
    }
    .apply_env_overrides();
    if let Some(max) = cli.max_expansions {
        config = config.with_max_expansions(Some(max));
    }

    let facts = FactBase::from_file_or_empty(&cli.facts);
    let oracles = load_oracles(cli.adverse_events.as_deref(), cli.frailty.as_deref());
    let names = cli
        .names
        .as_ref()
        .map(NameMap::from_file_or_empty)
        .unwrap_or_default();

    let patient = PatientProfile::new(
        cli.age,
        cli.weight,
        cli.sex.into(),
        cli.conditions.iter().map(|c| canonical_atom(c)).collect(),
    );
    let targets: Vec<DiseaseId> = cli
        .treat
        .iter()
        .map(|d| DiseaseId::from(canonical_atom(d)))
        .collect();

    let optimizer = TherapyOptimizer::new(Arc::new(facts), oracles, config);
    let plan = optimizer.solve(&patient, &targets)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, &names);
    }

    Ok(())
}

fn load_oracles(adverse_events: Option<&Path>, frailty: Option<&Path>) -> RiskOracles {
    let adverse_table = adverse_events.map(AdverseEventTable::from_file);
    let adverse: Arc<dyn AdverseEventModel> = match adverse_table {
        Some(Ok(table)) => Arc::new(table),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "adverse-event table unavailable, using neutral risk");
            Arc::new(UnavailableModel)
        }
        None => Arc::new(UnavailableModel),
    };
    let frailty: Arc<dyn FrailtyModel> = match frailty.map(FrailtyTable::from_file) {
        Some(Ok(table)) => Arc::new(table),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "frailty table unavailable, using neutral frailty");
            Arc::new(UnavailableModel)
        }
        None => Arc::new(UnavailableModel),
    };
    RiskOracles::new(adverse, frailty)
}

fn print_plan(plan: &TherapyPlan, names: &NameMap) {
    println!("{}", "Optimal therapy".bold().green());
    println!("{}", "=".repeat(60));

    for (drug, diseases) in &plan.assignments {
        let treated: Vec<&str> = diseases.iter().map(|d| names.display_name(d.as_str())).collect();
        let line = format!(
            "  {:<28} -> {}",
            names.display_name(drug.as_str()),
            treated.join(", ")
        );
        if diseases.len() > 1 {
            println!("{} {}", line, "[multi-target]".cyan());
        } else {
            println!("{}", line);
        }
    }

    println!("{}", "-".repeat(60));
    println!("  {:<28} {:.2}", "Total cost (g)", plan.g);
    println!("  {:<28} {:.2}", "Estimate (f)", plan.f);
    println!(
        "  {:<28} {} expanded, {} generated, {} pruned",
        "Search",
        plan.stats.expanded,
        plan.stats.generated,
        plan.stats.pruned
    );

    if !plan.dropped.is_empty() {
        let dropped: Vec<&str> = plan
            .dropped
            .iter()
            .map(|d| names.display_name(d.as_str()))
            .collect();
        println!(
            "{} no approved therapy for: {}",
            "warning:".yellow().bold(),
            dropped.join(", ")
        );
    }
}
