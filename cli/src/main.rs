//! Tidepool CLI - scenario driver for the lending-pool ledger
//!
//! Runs JSON scenarios against an in-memory pool, walks a scripted
//! demo of the loan lifecycle, and previews default settlements.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tidepool_engine::{preview_default, GovParams, Obligation, PositionKey};

mod demo;
mod scenario;

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Tidepool lending ledger - simulate pools, loans, and defaults", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON scenario file against a fresh pool
    Simulate {
        /// Path to the scenario file
        scenario: PathBuf,

        /// Print the final pool summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scripted walkthrough of the full loan lifecycle
    Demo,

    /// Preview the seizure and penalty split for a defaulting loan
    ExplainDefault {
        /// Outstanding debt on the loan
        #[arg(long)]
        debt: u128,

        /// Position principal at loan open (the penalty base)
        #[arg(long)]
        penalty_base: u128,

        /// Treasury share of the post-enforcer remainder, in bps
        #[arg(long, default_value = "1000")]
        treasury_bps: u64,

        /// Active-credit share of the post-treasury remainder, in bps
        #[arg(long, default_value = "2500")]
        active_credit_bps: u64,

        /// Fold the treasury cut back into the depositor share
        #[arg(long)]
        no_treasury: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { scenario, json } => {
            let summary = scenario::run_file(&scenario, cli.verbose)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                summary.print();
            }
        }
        Commands::Demo => {
            demo::run()?;
        }
        Commands::ExplainDefault {
            debt,
            penalty_base,
            treasury_bps,
            active_credit_bps,
            no_treasury,
        } => {
            let gov = GovParams {
                treasury: (!no_treasury).then(|| PositionKey::from_u64(0)),
                treasury_bps,
                active_credit_bps,
                ..GovParams::relaxed()
            };
            let obligation = Obligation { outstanding_debt: debt, penalty_base };
            let outcome = preview_default(obligation, &gov)
                .map_err(|e| anyhow::anyhow!("ledger arithmetic failed: {e:?}"))?;

            println!("{}", "Default settlement preview".bold());
            println!("{} {}", "Outstanding debt:".bright_cyan(), outcome.outstanding_debt);
            println!("{} {}", "Penalty applied: ".bright_cyan(), outcome.penalty_applied);
            println!("{} {}", "Total seized:    ".bright_cyan(), outcome.total_seized);
            println!();
            println!("{} {}", "Enforcer share:     ".bright_yellow(), outcome.enforcer_share);
            println!("{} {}", "Treasury share:     ".bright_yellow(), outcome.treasury_share);
            println!("{} {}", "Active-credit share:".bright_yellow(), outcome.active_credit_share);
            println!("{} {}", "Depositor fee share:".bright_yellow(), outcome.fee_index_share);
        }
    }

    Ok(())
}
