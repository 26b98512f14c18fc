use crate::algorithms::metropolis::{FormulationOptimizer, OptimizationRun};
use crate::algorithms::multistart;
use crate::routines::evaluation::{Objective, Surrogate};
use crate::routines::initialization::gibbs;
use crate::routines::logger;
use crate::routines::output::{write_runs, write_samples};
use crate::routines::settings::Settings;
use crate::structs::formulation::Formulation;

use eyre::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Primary entrypoint for fmcore
///
/// Runs `config.chains` Metropolis-Hastings chains over the ingredients defined in the settings,
/// searching for the formulation minimizing `objective(surrogate(x))`.
/// When output is enabled, the chain and result of every run are written to the output folder.
///
/// The settings are usually read from a TOML configuration file with [read](crate::routines::settings::read).
pub fn optimize<S, O>(settings: Settings, surrogate: S, objective: O) -> Result<Vec<OptimizationRun>>
where
    S: Surrogate + Sync,
    O: Objective + Sync,
{
    let now = Instant::now();
    logger::setup_log(&settings)?;
    tracing::info!("Starting fmcore");

    announce_output(&settings);

    let optimizer = FormulationOptimizer::from_settings(&settings, surrogate, objective)?;
    optimizer.stop_signal().reset()?;
    tracing::info!(
        "Optimizing {} ingredients with moves {:?} at T = {}",
        optimizer.bounds().len(),
        optimizer.engine().moves(),
        optimizer.temperature()
    );

    let runs = match settings.config.chains {
        1 => vec![optimizer.optimize(
            None,
            settings.config.iterations,
            settings.config.burn_in,
        )?],
        n => multistart::run(
            &optimizer,
            n,
            None,
            settings.config.iterations,
            settings.config.burn_in,
        )?,
    };

    if let Some(best) = multistart::best_run(&runs) {
        tracing::info!(
            "Best objective {:.6} at {:?}",
            best.result.best_objective,
            best.result.best_formulation.values()
        );
    }

    if settings.output.write {
        write_runs(&runs, optimizer.bounds(), &settings.output.path)
            .context("Failed to write the optimization output")?;
    }

    tracing::info!("fmcore finished in {:.2} seconds", now.elapsed().as_secs_f64());
    Ok(runs)
}

/// Draw formulations from the bounded simplex with the Gibbs sampler
///
/// Uses the `sampler` section of the settings together with `config.seed`.
/// When output is enabled, the samples are written to `samples.csv` in the output folder.
pub fn sample(settings: Settings) -> Result<Vec<Formulation>> {
    let now = Instant::now();
    logger::setup_log(&settings)?;
    tracing::info!("Starting fmcore sampler");

    announce_output(&settings);

    let bounds = settings.bounds_table()?;
    let mut rng = StdRng::seed_from_u64(settings.config.seed);
    let samples = gibbs::sample(
        &bounds,
        settings.sampler.samples,
        settings.sampler.burn_in,
        &mut rng,
    )?;

    if settings.output.write {
        write_samples(&samples, &bounds, &settings.output.path)
            .context("Failed to write the samples")?;
    }

    tracing::info!(
        "Drew {} samples in {:.2} seconds",
        samples.len(),
        now.elapsed().as_secs_f64()
    );
    Ok(samples)
}

fn announce_output(settings: &Settings) {
    match settings.output.write {
        true => {
            tracing::info!("Output files will be written to {}", settings.output.path)
        }
        false => {
            tracing::info!("Output files will not be written - set `output.write = true` in the configuration file to enable output files")
        }
    }
}
