//! Global optimizer - command-line driver
//!
//! This binary:
//! 1. Loads the TOML config and applies command-line overrides
//! 2. Loads the parameter-space file
//! 3. Builds a particle swarm or a genetic algorithm population
//! 4. Evaluates generations in parallel until the budget or Ctrl-C
//! 5. Records every generation (SQLite and/or JSON) and prints the best model

mod args;
mod run;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;

use globopt::config::Config;
use globopt::driver::RunSummary;
use globopt::store::RunStore;
use globopt::{ParameterSpace, Result};

use args::Args;
use run::run_optimization;

fn main() {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match try_main(&args) {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn try_main(args: &Args) -> Result<RunSummary> {
    let mut config = Config::load(&args.config)?;
    args.apply(&mut config)?;
    config.validate()?;

    print_banner(&config);

    println!("Loading parameter space from {}...", config.paths.pspace);
    let space = Arc::new(ParameterSpace::load(&config.paths.pspace)?);
    println!("  {} point(s) x {} parameter(s)", space.npts(), space.npar());

    let store = match &config.paths.database {
        Some(path) => {
            println!("Opening run database at {}...", path);
            Some(RunStore::open(path)?)
        }
        None => None,
    };
    println!();

    let interrupt_flag = Arc::new(AtomicBool::new(false));
    setup_interrupt_handler(interrupt_flag.clone());

    run_optimization(&config, space, store.as_ref(), args.verbose, interrupt_flag)
}

fn print_banner(config: &Config) {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  GLOBAL OPTIMIZER - {:?} ({:?})", config.run.algorithm, config.run.sense);
    println!("  function: {}  population: {}  generations: {}",
        config.run.function, config.run.population_size, config.run.generations);
    match config.run.seed {
        Some(seed) => println!("  seed: {}", seed),
        None => println!("  seed: entropy"),
    }
    println!("═══════════════════════════════════════════════════════════════");
    println!();
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "Finished after {} generation(s), {} evaluation(s){}",
        summary.generations,
        summary.total_evaluated,
        if summary.stopped_early { " (stopped early)" } else { "" }
    );
    if let Some(best) = &summary.best {
        println!("Best misfit {:.6} (generation {}, individual {})", best.misfit, best.generation, best.index);
        for point in 0..best.position.npts() {
            let values: Vec<String> = best.position.point(point).iter().map(|v| format!("{:.6}", v)).collect();
            println!("  point {:3}: {}", point, values.join("  "));
        }
    }
}

fn setup_interrupt_handler(interrupt_flag: Arc<AtomicBool>) {
    let interrupt_count = Arc::new(AtomicUsize::new(0));
    let ic = interrupt_count.clone();

    let result = ctrlc::set_handler(move || {
        let count = ic.fetch_add(1, Ordering::SeqCst);
        interrupt_flag.store(true, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nInterrupt received, will stop after current generation...");
        } else {
            eprintln!("\nForce quit.");
            std::process::exit(1);
        }
    });
    if let Err(e) = result {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
}
