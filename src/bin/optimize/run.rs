//! Generation loop of the command-line optimizer

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use globopt::config::{Algorithm, Config};
use globopt::driver::{Driver, Population, RunSummary};
use globopt::functions::{self, TestFunction};
use globopt::genalg::Genalg;
use globopt::random::make_rng;
use globopt::store::{save_snapshot, RunStore};
use globopt::swarm::Swarm;
use globopt::{OptError, ParameterSpace, Result};

/// Build the population named by the config and run it to completion
pub fn run_optimization(
    config: &Config,
    space: Arc<ParameterSpace>,
    store: Option<&RunStore>,
    verbose: bool,
    interrupt_flag: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let objective = functions::by_name(&config.run.function)?;
    let nvalues = space.npts() * space.npar();
    if nvalues < objective.min_values {
        return Err(OptError::Config(format!(
            "'{}' needs at least {} parameter value(s), the parameter space has {}",
            objective.name, objective.min_values, nvalues
        )));
    }

    let mut rng = make_rng(config.run.seed);
    let n = config.run.population_size;
    let sense = config.run.sense;

    let (algorithm, settings) = match config.run.algorithm {
        Algorithm::Pso => ("pso", serde_json::to_string(&config.pso)?),
        Algorithm::Ga => ("ga", serde_json::to_string(&config.ga)?),
    };
    let run_id = match store {
        Some(s) => Some(s.insert_run(algorithm, &settings, n)?),
        None => None,
    };

    let ctx = LoopContext {
        objective,
        store: store.zip(run_id),
        output_dir: config.paths.output_dir.as_deref().map(Path::new),
        verbose,
        interrupt_flag,
    };

    match config.run.algorithm {
        Algorithm::Pso => {
            let mut swarm = Swarm::new(space, config.pso.clone(), sense)?;
            swarm.init_particles(n, &mut rng)?;
            let driver = Driver::new(swarm, rng, config.run.generations)?
                .with_nan_penalty(config.run.nan_penalty);
            drive(driver, &ctx)
        }
        Algorithm::Ga => {
            let mut ga = Genalg::new(space, config.ga.clone(), sense)?;
            ga.init_chromosomes(n, config.ga.cvt_iterations, &mut rng)?;
            let driver = Driver::new(ga, rng, config.run.generations)?
                .with_nan_penalty(config.run.nan_penalty);
            drive(driver, &ctx)
        }
    }
}

struct LoopContext<'a> {
    objective: TestFunction,
    store: Option<(&'a RunStore, i64)>,
    output_dir: Option<&'a Path>,
    verbose: bool,
    interrupt_flag: Arc<AtomicBool>,
}

fn drive<P: Population>(mut driver: Driver<P, rand::rngs::StdRng>, ctx: &LoopContext) -> Result<RunSummary> {
    println!("Starting generation loop ({} individuals)...", driver.population().len());
    println!();

    loop {
        let stats = driver.evaluate_generation(&ctx.objective)?;

        if ctx.store.is_some() || ctx.output_dir.is_some() {
            let record = driver.snapshot()?;
            if let Some((store, run_id)) = ctx.store {
                store.record_generation(run_id, &record)?;
            }
            if let Some(dir) = ctx.output_dir {
                let path = save_snapshot(dir, &record)?;
                log::debug!("Saved snapshot to {}", path.display());
            }
        }

        let best_ever = driver.best().map(|b| b.misfit).unwrap_or(stats.best);
        println!(
            "Gen {:4} | best: {:>12.6} | mean: {:>12.6} | worst: {:>12.6} | best ever: {:>12.6}",
            stats.generation, stats.best, stats.mean, stats.worst, best_ever
        );
        if ctx.verbose {
            println!("         spread: {:.6}  evaluations: {}", stats.spread, stats.total_evaluated);
        }

        if driver.is_finished() {
            break;
        }
        if ctx.interrupt_flag.load(Ordering::Relaxed) {
            println!("Interrupt flag set, stopping after generation {}", stats.generation);
            break;
        }
        driver.advance()?;
    }

    let summary = driver.terminate()?;
    if let Some((store, run_id)) = ctx.store {
        store.finish_run(run_id, &summary)?;
    }
    Ok(summary)
}
