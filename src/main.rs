use clap::Parser;
use tracing::Level;
use slater_qmc::{read_config, Result, VmcSimulation};

#[derive(Parser, Debug)]
#[command(version, about = "VMC with a multi-determinant Slater wavefunction", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.yml")]
    config: String,

    /// Print debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the number of sampling steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override the number of walkers
    #[arg(long)]
    walkers: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = read_config(&args.config)?;
    let mut params = config.vmc;
    if let Some(steps) = args.steps {
        params.n_steps = steps;
    }
    if let Some(walkers) = args.walkers {
        params.n_walkers = walkers;
    }
    if let Some(seed) = args.seed {
        params.seed = seed;
    }

    let mut wavefunction = config.build()?;
    let mut simulation = VmcSimulation::new(&mut wavefunction, params);
    let results = simulation.run()?;

    println!("VMC Results for {} ({} electrons, {} CI terms)", args.config, wavefunction.num_electrons(), wavefunction.expansion().num_terms());
    println!("----------------------------------------");
    println!("Number of walkers: {}", params.n_walkers);
    println!("Number of steps: {}", params.n_steps);
    println!("Acceptance rate: {:.3}", results.acceptance_rate);
    println!("Final step size: {:.3}", results.step_size);
    println!("Kinetic energy: {:.6} ± {:.6} Ha", results.kinetic_energy, results.kinetic_error);
    println!("Mean ln|Ψ|: {:.6}", results.mean_logabs);
    println!("Autocorrelation time: {:.2} steps", results.autocorrelation_time);
    println!("Max inverse drift: {:.2e}", results.drift.max_inverse_error);
    Ok(())
}
