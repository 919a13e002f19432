use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pretty_print_nalgebra::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use latticestat::concurrence_matrix::ConcurrenceMatrix;
use latticestat::layout::generate_layout;
use latticestat::simulate::FieldSimulatorBuilder;
use latticestat::{AnalysisOptions, LatticeDesign, LatticeType, Procedure};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LatticeArg {
    Simple,
    Triple,
}

impl From<LatticeArg> for LatticeType {
    fn from(value: LatticeArg) -> Self {
        match value {
            LatticeArg::Simple => LatticeType::Simple,
            LatticeArg::Triple => LatticeType::Triple,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProcedureArg {
    Tukey,
    Duncan,
}

impl From<ProcedureArg> for Procedure {
    fn from(value: ProcedureArg) -> Self {
        match value {
            ProcedureArg::Tukey => Procedure::Tukey,
            ProcedureArg::Duncan => Procedure::Duncan,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "latticestat", version, about = "Simple and triple lattice designs for field trials")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a lattice layout and its concurrence summary
    Layout {
        /// Block size k (k² treatments)
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        #[arg(short, long, value_enum, default_value = "simple")]
        lattice: LatticeArg,
        /// Shuffle blocks and plots for field planting
        #[arg(long)]
        randomize: bool,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Simulate yields on a lattice and analyse them
    Simulate {
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        #[arg(short, long, value_enum, default_value = "simple")]
        lattice: LatticeArg,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 40.0)]
        mean: f64,
        #[arg(long, default_value_t = 2.0)]
        block_sd: f64,
        #[arg(long, default_value_t = 1.5)]
        error_sd: f64,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        #[arg(long, value_enum, default_value = "tukey")]
        procedure: ProcedureArg,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Layout {
            k,
            lattice,
            randomize,
            seed,
        } => print_layout(k, lattice.into(), randomize.then_some(seed)),
        Command::Simulate {
            k,
            lattice,
            seed,
            mean,
            block_sd,
            error_sd,
            alpha,
            procedure,
        } => {
            let mut simulator = FieldSimulatorBuilder::default()
                .seed(seed)
                .mean(mean)
                .block_sd(block_sd)
                .error_sd(error_sd)
                .build()
                .context("invalid simulator settings")?;
            let lattice: LatticeType = lattice.into();
            let design = LatticeDesign::simulate(k * k, lattice.replications(), &mut simulator)
                .context("failed to build lattice design")?;
            let options = AnalysisOptions {
                alpha,
                procedure: procedure.into(),
            };
            print_analysis(&design, &options)
        }
    }
}

fn print_layout(k: usize, lattice: LatticeType, seed: Option<u64>) -> Result<()> {
    let mut layout = generate_layout(k, lattice).context("failed to generate layout")?;
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        layout = layout.randomized(&mut rng);
        info!(seed, "randomized layout");
    }
    let concurrence = ConcurrenceMatrix::from_layout(&layout);

    println!("{} lattice, {} treatments in blocks of {}", lattice.name(), k * k, k);
    println!("block array (one row per block): {}", pretty_print!(&layout.to_block_array()));
    println!(
        "max concurrence: {}, mean concurrence: {:.4}, balanced: {}",
        concurrence.max_concurrence(),
        concurrence.lambda(),
        concurrence.is_balanced()
    );
    Ok(())
}

fn print_analysis(design: &LatticeDesign, options: &AnalysisOptions) -> Result<()> {
    let analysis = design.analyze().context("lattice analysis failed")?;
    let comparison = design.compare(options).context("mean comparison failed")?;

    if let Some(data) = design.data() {
        println!("yields: {}", pretty_print!(data));
    }
    println!("{}", analysis.anova);
    println!(
        "weight: {:.4}  SE(mean): {:.4}  SE(diff): {:.4}  RE: {:.1}%  CV: {:.2}%",
        analysis.weight(),
        analysis.se(),
        analysis.adjusted.se_difference,
        analysis.efficiency,
        analysis.cv
    );
    match (comparison.hsd(), comparison.ladder()) {
        (Some(hsd), _) => println!("Tukey HSD ({}): {:.4}", options.alpha, hsd),
        (None, Some(ladder)) => println!("Duncan ranges ({}): {:.3?}", options.alpha, ladder),
        (None, None) => {}
    }

    println!("{:>9}{:>12}{:>12}{:>10}", "treatment", "adjusted", "unadjusted", "group");
    for &t in &comparison.ranking {
        println!(
            "{:>9}{:>12.3}{:>12.3}{:>10}",
            t,
            analysis.adjusted.means[t],
            analysis.adjusted.unadjusted_means[t],
            comparison.groups[t]
        );
    }
    Ok(())
}
