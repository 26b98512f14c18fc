//! Synthetic datasets with known response functions
//!
//! Useful to exercise surrogate models and the optimizer against a ground truth.
//! Every output is a sigmoid of a linear combination of the inputs, `y_k = 1 / (1 + exp(-x · c_k))`.
//!
//! General inputs and outputs may carry a range and units. On export, general inputs are rescaled from `[-2, 2]`
//! and outputs from `(0, 1)` onto their range, and the units are appended to the column name as `name-units`.
//! Formulations are exported either wide, one column per ingredient, or compact, as
//! `component-k_identifier` / `component-k_amount` pairs of the ingredients present, in percent.

use std::collections::BTreeSet;

use csv::{StringRecord, WriterBuilder};
use eyre::{bail, eyre, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_derive::{Deserialize, Serialize};

use crate::routines::evaluation::Surrogate;
use crate::routines::initialization::{gibbs, simplex};
use crate::routines::output::OutputFile;
use crate::structs::bounds::BoundsTable;

/// Range of the uniformly drawn general (non-formulation) inputs
const GENERAL_RANGE: (f64, f64) = (-2.0, 2.0);
/// Range of the uniformly drawn response coefficients
const COEFFICIENT_RANGE: (f64, f64) = (-1.0, 1.0);

/// Range of the sigmoid outputs
const OUTPUT_RANGE: (f64, f64) = (0.0, 1.0);
/// Formulation fractions are exported in percent in the compact format
const PERCENT: f64 = 100.0;

pub fn sigmoid(inputs: ArrayView1<f64>, coefficients: ArrayView1<f64>) -> f64 {
    1.0 / (1.0 + (-inputs.dot(&coefficients)).exp())
}

/// How the formulation inputs of each row are drawn
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FormulationSource {
    /// Independent draws with [simplex::sample]
    #[default]
    Simplex,
    /// Consecutive states of a [gibbs::sample] chain
    Gibbs { burn_in: usize },
}

/// A general input or an output column of a synthetic dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Range the column is rescaled onto when exported, `None` keeps the generated values
    pub range: Option<(f64, f64)>,
    /// Appended to the exported column name when not empty
    pub units: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            range: None,
            units: String::new(),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    /// The exported name, `name-units` when units are given
    pub fn label(&self) -> String {
        if self.units.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.units)
        }
    }

    /// Map `value` from `from` onto the range of the column
    fn rescale(&self, value: f64, from: (f64, f64)) -> f64 {
        match self.range {
            Some((min, max)) => (value - from.0) / (from.1 - from.0) * (max - min) + min,
            None => value,
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some((min, max)) = self.range {
            if !min.is_finite() || !max.is_finite() || min > max {
                bail!(
                    "Invalid range [{}, {}] for column {}",
                    min,
                    max,
                    self.name
                );
            }
        }
        Ok(())
    }
}

/// Layout of the formulation columns in an exported dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One column per ingredient, holding its mass fraction
    Wide,
    /// `component-k_identifier` / `component-k_amount` pairs of the ingredients present, in percent
    #[default]
    Compact,
}

/// Generator of synthetic datasets
#[derive(Debug, Clone)]
pub struct Synthetic {
    general: Vec<Column>,
    formulation: BoundsTable,
    outputs: Vec<Column>,
    coefficients: Option<Array2<f64>>,
    source: FormulationSource,
}

impl Synthetic {
    pub fn new(general: Vec<String>, formulation: BoundsTable, outputs: Vec<String>) -> Self {
        Synthetic {
            general: general.into_iter().map(Column::new).collect(),
            formulation,
            outputs: outputs.into_iter().map(Column::new).collect(),
            coefficients: None,
            source: FormulationSource::default(),
        }
    }

    /// A generator whose general inputs and outputs carry a range and units
    pub fn with_columns(
        general: Vec<Column>,
        formulation: BoundsTable,
        outputs: Vec<Column>,
    ) -> Result<Self> {
        for column in general.iter().chain(&outputs) {
            column.validate()?;
        }
        Ok(Synthetic {
            general,
            formulation,
            outputs,
            coefficients: None,
            source: FormulationSource::default(),
        })
    }

    /// A dataset of `n_inputs` general inputs `x_i` and `n_outputs` outputs `y_k`, without formulation inputs
    pub fn with_dimensions(n_inputs: usize, n_outputs: usize) -> Self {
        Synthetic::new(
            (1..=n_inputs).map(|i| format!("x_{}", i)).collect(),
            BoundsTable::with_dimensions(0),
            (1..=n_outputs).map(|k| format!("y_{}", k)).collect(),
        )
    }

    /// Use fixed coefficients, one row per output and one column per input
    ///
    /// General inputs come first, followed by the formulation inputs.
    pub fn with_coefficients(mut self, coefficients: Array2<f64>) -> Result<Self> {
        let expected = (self.outputs.len(), self.n_inputs());
        if coefficients.dim() != expected {
            bail!(
                "Expected coefficients of shape {:?}, found {:?}",
                expected,
                coefficients.dim()
            );
        }
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    pub fn with_source(mut self, source: FormulationSource) -> Self {
        self.source = source;
        self
    }

    pub fn n_inputs(&self) -> usize {
        self.general.len() + self.formulation.len()
    }

    /// Draw `n_rows` rows using a generator seeded with `seed`
    pub fn generate(&self, n_rows: usize, seed: u64) -> Result<Dataset> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_general = self.general.len();
        let n_inputs = self.n_inputs();

        let coefficients = match &self.coefficients {
            Some(coefficients) => coefficients.clone(),
            None => Array2::from_shape_fn((self.outputs.len(), n_inputs), |_| {
                rng.random_range(COEFFICIENT_RANGE.0..=COEFFICIENT_RANGE.1)
            }),
        };

        let mut inputs: Array2<f64> = Array2::zeros((n_rows, n_inputs));
        for mut row in inputs.rows_mut() {
            for value in row.iter_mut().take(n_general) {
                *value = rng.random_range(GENERAL_RANGE.0..=GENERAL_RANGE.1);
            }
        }

        if !self.formulation.is_empty() {
            let formulations = match self.source {
                FormulationSource::Simplex => (0..n_rows)
                    .map(|_| simplex::sample(&self.formulation, &mut rng))
                    .collect::<Result<Vec<_>, _>>()?,
                FormulationSource::Gibbs { burn_in } => {
                    gibbs::sample(&self.formulation, n_rows, burn_in, &mut rng)?
                }
            };
            for (mut row, formulation) in inputs.rows_mut().into_iter().zip(&formulations) {
                for (value, x) in row.iter_mut().skip(n_general).zip(formulation.iter()) {
                    *value = *x;
                }
            }
        }

        let outputs = Array2::from_shape_fn((n_rows, self.outputs.len()), |(j, k)| {
            sigmoid(inputs.row(j), coefficients.row(k))
        });

        let mut input_names: Vec<String> = self.general.iter().map(|c| c.name.clone()).collect();
        input_names.extend(self.formulation.names().iter().cloned());

        tracing::debug!(
            "Generated synthetic dataset with {} rows, {} inputs and {} outputs",
            n_rows,
            n_inputs,
            self.outputs.len()
        );

        Ok(Dataset {
            n_general,
            input_names,
            output_names: self.outputs.iter().map(|c| c.name.clone()).collect(),
            general_columns: self.general.clone(),
            output_columns: self.outputs.clone(),
            inputs,
            outputs,
            coefficients,
        })
    }
}

/// A generated dataset together with the coefficients of its response functions
#[derive(Debug, Clone)]
pub struct Dataset {
    n_general: usize,
    input_names: Vec<String>,
    output_names: Vec<String>,
    general_columns: Vec<Column>,
    output_columns: Vec<Column>,
    inputs: Array2<f64>,
    outputs: Array2<f64>,
    coefficients: Array2<f64>,
}

impl Dataset {
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn outputs(&self) -> &Array2<f64> {
        &self.outputs
    }

    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }

    /// The true response of the dataset, as a surrogate over the formulation inputs
    ///
    /// The general inputs are held fixed at `general`, given in the generated `[-2, 2]` space.
    pub fn response(&self, general: &[f64]) -> Result<SigmoidResponse> {
        if general.len() != self.n_general {
            bail!(
                "Expected {} general inputs, found {}",
                self.n_general,
                general.len()
            );
        }
        Ok(SigmoidResponse {
            general: general.to_vec(),
            coefficients: self.coefficients.clone(),
        })
    }

    /// Inputs with the general columns rescaled from `[-2, 2]` onto their range
    pub fn scaled_inputs(&self) -> Array2<f64> {
        let mut scaled = self.inputs.clone();
        for (i, column) in self.general_columns.iter().enumerate() {
            scaled
                .column_mut(i)
                .mapv_inplace(|v| column.rescale(v, GENERAL_RANGE));
        }
        scaled
    }

    /// Outputs rescaled from `(0, 1)` onto the range of each output column
    pub fn scaled_outputs(&self) -> Array2<f64> {
        let mut scaled = self.outputs.clone();
        for (k, column) in self.output_columns.iter().enumerate() {
            scaled
                .column_mut(k)
                .mapv_inplace(|v| column.rescale(v, OUTPUT_RANGE));
        }
        scaled
    }

    /// The formulation inputs, one column per ingredient
    pub fn formulations(&self) -> ArrayView2<f64> {
        self.inputs.slice(ndarray::s![.., self.n_general..])
    }

    /// Writes the rescaled dataset to `file_name` in `folder`, with a header of column names
    ///
    /// [OutputFormat::Wide] writes general inputs, formulation and outputs in that order.
    /// [OutputFormat::Compact] writes general inputs and outputs, followed by the formulation as component pairs.
    pub fn write_csv(&self, folder: &str, file_name: &str, format: OutputFormat) -> Result<()> {
        let outputfile = OutputFile::new(folder, file_name)?;
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_writer(outputfile.file());

        let general_labels = self.general_columns.iter().map(Column::label);
        let output_labels: Vec<String> = self.output_columns.iter().map(Column::label).collect();
        let inputs = self.scaled_inputs();
        let outputs = self.scaled_outputs();

        match format {
            OutputFormat::Wide => {
                let header: Vec<String> = general_labels
                    .chain(self.input_names[self.n_general..].iter().cloned())
                    .chain(output_labels)
                    .collect();
                writer.write_record(header)?;

                let rows = ndarray::concatenate(Axis(1), &[inputs.view(), outputs.view()])?;
                for row in rows.rows() {
                    writer.write_record(row.iter().map(|v| v.to_string()))?;
                }
            }
            OutputFormat::Compact => {
                let percent = self.formulations().mapv(|v| v * PERCENT);
                let components =
                    wide_to_compact(&self.input_names[self.n_general..], percent.view());
                let width = components.iter().map(Vec::len).max().unwrap_or(0);

                let header: Vec<String> = general_labels
                    .chain(output_labels)
                    .chain(compact_header(width))
                    .collect();
                writer.write_record(header)?;

                for (j, row) in components.iter().enumerate() {
                    let mut record: Vec<String> = inputs
                        .row(j)
                        .iter()
                        .take(self.n_general)
                        .chain(outputs.row(j).iter())
                        .map(|v| v.to_string())
                        .collect();
                    for (name, amount) in row {
                        record.push(name.clone());
                        record.push(amount.to_string());
                    }
                    // Formulations with fewer ingredients leave the trailing pairs empty
                    record.resize(record.len() + 2 * (width - row.len()), String::new());
                    writer.write_record(record)?;
                }
            }
        }

        writer.flush()?;
        tracing::debug!("Dataset written to {:?}", outputfile.relative_path());
        Ok(())
    }
}

/// The ingredients present in a formulation, as `(name, amount)` pairs in column order
pub type Components = Vec<(String, f64)>;

/// Convert formulations with one column per ingredient into the components present in each row
///
/// Only strictly positive amounts are kept.
pub fn wide_to_compact(names: &[String], rows: ArrayView2<f64>) -> Vec<Components> {
    rows.rows()
        .into_iter()
        .map(|row| {
            names
                .iter()
                .zip(row.iter())
                .filter(|(_, amount)| **amount > 0.0)
                .map(|(name, amount)| (name.clone(), *amount))
                .collect()
        })
        .collect()
}

/// Convert component lists back into one column per ingredient
///
/// The columns are every ingredient named in any row, sorted by name. Absent ingredients are zero.
pub fn compact_to_wide(rows: &[Components]) -> (Vec<String>, Array2<f64>) {
    let names: Vec<String> = rows
        .iter()
        .flatten()
        .map(|(name, _)| name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut wide = Array2::zeros((rows.len(), names.len()));
    for (j, row) in rows.iter().enumerate() {
        for (name, amount) in row {
            if let Ok(i) = names.binary_search(name) {
                wide[[j, i]] = *amount;
            }
        }
    }
    (names, wide)
}

/// Header of `n_components` compact component pairs
pub fn compact_header(n_components: usize) -> Vec<String> {
    (1..=n_components)
        .flat_map(|k| {
            [
                format!("component-{}_identifier", k),
                format!("component-{}_amount", k),
            ]
        })
        .collect()
}

/// Read the component pairs of a compact CSV record
///
/// Pairs are read for `k = 1, 2, ...` until the header has no `component-k_identifier` column. Empty identifiers are skipped.
pub fn read_components(header: &StringRecord, record: &StringRecord) -> Result<Components> {
    let position = |name: &str| header.iter().position(|h| h == name);
    let mut components = Components::new();

    for k in 1.. {
        let Some(identifier) = position(&format!("component-{}_identifier", k)) else {
            break;
        };
        let amount = position(&format!("component-{}_amount", k))
            .ok_or_else(|| eyre!("Missing column component-{}_amount", k))?;

        let name = record.get(identifier).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let value: f64 = record
            .get(amount)
            .unwrap_or_default()
            .parse()
            .map_err(|e| eyre!("Invalid amount for {}: {}", name, e))?;
        components.push((name.to_string(), value));
    }
    Ok(components)
}

/// Sigmoid response functions evaluated at fixed general inputs
#[derive(Debug, Clone)]
pub struct SigmoidResponse {
    general: Vec<f64>,
    coefficients: Array2<f64>,
}

impl Surrogate for SigmoidResponse {
    fn predict(&self, formulation: &[f64]) -> Result<Vec<f64>> {
        let inputs: Array1<f64> = self
            .general
            .iter()
            .chain(formulation)
            .copied()
            .collect();
        if inputs.len() != self.coefficients.ncols() {
            bail!(
                "Expected {} inputs, found {}",
                self.coefficients.ncols(),
                inputs.len()
            );
        }
        Ok(self
            .coefficients
            .rows()
            .into_iter()
            .map(|c| sigmoid(inputs.view(), c))
            .collect())
    }
}
