use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use eyre::{Context, Result};

use crate::algorithms::metropolis::OptimizationRun;
use crate::structs::bounds::BoundsTable;
use crate::structs::chain::Transition;
use crate::structs::formulation::Formulation;

/// A file in the output folder, created along with any missing parent folders
///
/// Existing files are truncated.
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .with_context(|| format!("Failed to open file: {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}

/// Writes every state of the chain to `chain.csv`
///
/// Columns are `iteration`, `objective`, `move`, `accepted`, one column per ingredient and,
/// when the chain collected them, one `pred.k` column per predicted property.
pub fn write_chain(run: &OptimizationRun, bounds: &BoundsTable, folder: &str) -> Result<()> {
    tracing::debug!("Writing chain...");
    let chain = &run.chain;
    let outputfile = OutputFile::new(folder, "chain.csv").context("Failed to create output file for the chain")?;
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(outputfile.file());

    let n_predictions = chain
        .predictions()
        .iter()
        .flatten()
        .map(|p| p.len())
        .max()
        .unwrap_or(0);

    let mut header = vec![
        "iteration".to_string(),
        "objective".to_string(),
        "move".to_string(),
        "accepted".to_string(),
    ];
    header.extend(bounds.names().iter().cloned());
    header.extend((0..n_predictions).map(|k| format!("pred.{}", k)));
    writer.write_record(&header)?;

    for (t, (formulation, transition)) in chain
        .formulations()
        .iter()
        .zip(chain.transitions())
        .enumerate()
    {
        let mut row = vec![
            t.to_string(),
            chain.objectives()[t].to_string(),
            transition.proposal().to_string(),
            transition.accepted().to_string(),
        ];
        row.extend(formulation.iter().map(|v| v.to_string()));
        if n_predictions > 0 {
            let predictions = chain.predictions().get(t).cloned().flatten();
            for k in 0..n_predictions {
                let value = predictions
                    .as_ref()
                    .and_then(|p| p.get(k))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                row.push(value);
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    tracing::debug!("Chain written to {:?}", outputfile.relative_path());
    Ok(())
}

/// Writes the result and diagnostics of a run to `result.json`
pub fn write_result(run: &OptimizationRun, bounds: &BoundsTable, folder: &str) -> Result<()> {
    let best: serde_json::Map<String, serde_json::Value> = bounds
        .names()
        .iter()
        .zip(run.result.best_formulation.iter())
        .map(|(name, value)| (name.clone(), serde_json::json!(value)))
        .collect();

    let rejected = run
        .chain
        .transitions()
        .iter()
        .filter(|t| matches!(t, Transition::ConstraintRejected { .. }))
        .count();

    let summary = serde_json::json!({
        "result": run.result,
        "best": best,
        "temperature": run.temperature,
        "burn_in": run.burn_in,
        "constraint_rejected": rejected,
        "diagnostics": run.diagnostics,
    });

    let outputfile = OutputFile::new(folder, "result.json")?;
    serde_json::to_writer_pretty(outputfile.file(), &summary)
        .with_context(|| format!("Failed to write {:?}", outputfile.relative_path()))?;
    tracing::debug!("Result written to {:?}", outputfile.relative_path());
    Ok(())
}

/// Writes the chain and result of every run
///
/// A single run is written directly to `folder`, multiple runs to `folder/chain_k`.
pub fn write_runs(runs: &[OptimizationRun], bounds: &BoundsTable, folder: &str) -> Result<()> {
    if let [run] = runs {
        write_chain(run, bounds, folder)?;
        return write_result(run, bounds, folder);
    }

    for (k, run) in runs.iter().enumerate() {
        let subfolder = Path::new(folder).join(format!("chain_{}", k));
        let subfolder = subfolder.to_string_lossy();
        write_chain(run, bounds, &subfolder)?;
        write_result(run, bounds, &subfolder)?;
    }
    Ok(())
}

/// Writes formulations, one row per sample, to `samples.csv`
pub fn write_samples(samples: &[Formulation], bounds: &BoundsTable, folder: &str) -> Result<()> {
    let outputfile = OutputFile::new(folder, "samples.csv")?;
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(outputfile.file());

    writer.write_record(bounds.names())?;
    for sample in samples {
        writer.write_record(sample.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    tracing::debug!(
        "{} samples written to {:?}",
        samples.len(),
        outputfile.relative_path()
    );
    Ok(())
}
