use crate::algorithms::metropolis::DEFAULT_SEED;
use crate::error::FormulationError;
use crate::routines::initialization::Seeding;
use crate::routines::output::OutputFile;
use crate::routines::proposal::{Move, DEFAULT_EPSILON, DEFAULT_LOCALITY_FACTOR};
use crate::structs::bounds::BoundsTable;
use config::Config as eConfig;
use eyre::{bail, Result};
use serde_derive::{Deserialize, Serialize};

/// Contains all settings for fmcore
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// General configuration of the optimizer
    pub config: Config,
    /// Ingredients of the formulation, in order, with their bounds
    pub ingredients: Vec<Ingredient>,
    /// Configuration of the proposal moves
    pub proposal: Proposal,
    /// Configuration of the Gibbs sampler
    pub sampler: Sampler,
    /// Configuration for logging
    pub log: Log,
    /// Configuration for the output files
    pub output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.proposal.validate()?;
        self.bounds_table()?.check_feasible()?;
        Ok(())
    }

    /// Builds the [BoundsTable] described by the `ingredients` section
    pub fn bounds_table(&self) -> Result<BoundsTable, FormulationError> {
        BoundsTable::from_entries(
            self.ingredients
                .iter()
                .map(|ingredient| (ingredient.name.clone(), ingredient.min, ingredient.max)),
        )
    }
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Number of Metropolis-Hastings iterations per chain
    pub iterations: usize,
    /// Number of leading iterations the caller intends to discard
    pub burn_in: usize,
    /// Temperature of the Metropolis rule, must be positive
    pub temperature: f64,
    /// The seed for the random number generator
    pub seed: u64,
    /// Number of independent chains, chain `k` is seeded with `seed + k`
    pub chains: usize,
    /// If true (default), store the surrogate predictions of every chain state
    pub collect_predictions: bool,
    /// How the starting point of each chain is chosen
    pub seeding: Seeding,
    /// Optionally, a file whose presence stops all running chains
    pub stop_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            iterations: 10_000,
            burn_in: 1_000,
            temperature: 1.0,
            seed: DEFAULT_SEED,
            chains: 1,
            collect_predictions: true,
            seeding: Seeding::default(),
            stop_file: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            bail!(
                "The temperature must be finite and positive, got {}",
                self.temperature
            );
        }
        if self.chains == 0 {
            bail!("At least one chain must be run");
        }
        Ok(())
    }
}

/// A single ingredient and its mass fraction bounds
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Ingredient {
            name: name.into(),
            min,
            max,
        }
    }
}

/// Configuration of the proposal engine
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Proposal {
    /// The moves to draw from, uniformly
    pub moves: Vec<Move>,
    /// Concentration of the Dirichlet move around the current point
    pub locality_factor: f64,
    /// Added to every Dirichlet concentration parameter to keep it positive
    pub epsilon: f64,
}

impl Default for Proposal {
    fn default() -> Self {
        Proposal {
            moves: Move::ALL.to_vec(),
            locality_factor: DEFAULT_LOCALITY_FACTOR,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Proposal {
    pub fn validate(&self) -> Result<()> {
        if self.moves.is_empty() {
            bail!("At least one proposal move must be enabled");
        }
        let positive = |value: f64| value.is_finite() && value > 0.0;
        if !positive(self.locality_factor) || !positive(self.epsilon) {
            bail!(
                "The locality factor and epsilon of the Dirichlet move must be finite and positive, got {} and {}",
                self.locality_factor,
                self.epsilon
            );
        }
        Ok(())
    }
}

/// Configuration of the Gibbs sampler
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Sampler {
    /// Number of samples to return
    pub samples: usize,
    /// Number of leading iterations to discard
    pub burn_in: usize,
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler {
            samples: 1_000,
            burn_in: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// The log level is defined as a string, and can be one of the following:
    /// - `trace`
    /// - `debug`
    /// - `info`
    /// - `warn`
    /// - `error`
    pub level: String,
    /// The file to write the log to
    pub file: String,
    /// Whether to write logs
    ///
    /// If set to `false`, a global subscriber will not be set by fmcore.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: true,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: true,
            path: String::from("outputs/"),
        }
    }
}

impl Output {
    /// Parses the output folder location
    ///
    /// If a `#` symbol is found, it is replaced by the lowest number for which the folder does not exist yet.
    pub fn parse_output_folder(&mut self) -> Result<()> {
        if self.path.is_empty() {
            self.path = Output::default().path;
        }

        match self.path.matches('#').count() {
            0 => Ok(()),
            1 => {
                let mut num = 1;
                while std::path::Path::new(&self.path.replace('#', &num.to_string())).exists() {
                    num += 1;
                }
                self.path = self.path.replace('#', &num.to_string());
                Ok(())
            }
            _ => {
                bail!("Only one `#` symbol is allowed in the output path. Rename the `output.path` setting in the configuration file and re-run the program.")
            }
        }
    }
}

fn default_max() -> f64 {
    1.0
}

/// Parses the settings from a TOML configuration file
///
/// The settings are validated, and a copy is written to the output folder when output is enabled.
///
/// Entries in the TOML file may be overridden by environment variables prefixed with `FMCORE_`.
/// Nested entries are separated by a double underscore, e.g. `FMCORE_CONFIG__TEMPERATURE=0.5`.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("FMCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut settings: Settings = parsed.try_deserialize()?;
    settings.validate()?;
    settings.output.parse_output_folder()?;

    if settings.output.write {
        if let Err(error) = write_settings_to_file(&settings) {
            bail!("Could not write settings to file: {}", error);
        }
    }

    Ok(settings)
}

/// Writes a copy of the parsed settings to `settings.json` in the output folder
pub fn write_settings_to_file(settings: &Settings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;

    let outputfile = OutputFile::new(settings.output.path.as_str(), "settings.json")?;
    let mut file = outputfile.file_owned();
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.config.iterations, 10_000);
        assert_eq!(settings.config.seed, 347);
        assert_eq!(settings.proposal.moves.len(), 6);
        assert!(settings.ingredients.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_bounds_table_follows_ingredient_order() {
        let mut settings = Settings::new();
        settings.ingredients = vec![
            Ingredient::new("water", 0.2, 0.9),
            Ingredient::new("salt", 0.0, 0.1),
            Ingredient::new("sugar", 0.0, 1.0),
        ];
        let table = settings.bounds_table().unwrap();
        assert_eq!(table.names(), &["water", "salt", "sugar"]);
        assert_eq!(table.bound(1).max, 0.1);
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::new();
        settings.config.temperature = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::new();
        settings.proposal.moves.clear();
        assert!(settings.validate().is_err());

        let mut settings = Settings::new();
        settings.ingredients = vec![Ingredient::new("a", 0.6, 1.0), Ingredient::new("b", 0.6, 1.0)];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_dirichlet_parameters_must_be_finite_and_positive() {
        for value in [f64::NAN, f64::INFINITY, 0.0, -1.0] {
            let mut settings = Settings::new();
            settings.proposal.locality_factor = value;
            assert!(settings.validate().is_err(), "locality factor {}", value);

            let mut settings = Settings::new();
            settings.proposal.epsilon = value;
            assert!(settings.validate().is_err(), "epsilon {}", value);
        }
    }

    #[test]
    fn test_parse_output_folder() {
        let base = std::env::temp_dir().join(format!("fmcore-output-{}", std::process::id()));
        let template = format!("{}/run_#", base.display());
        std::fs::create_dir_all(format!("{}/run_1", base.display())).unwrap();

        let mut output = Output {
            write: true,
            path: template,
        };
        output.parse_output_folder().unwrap();
        assert_eq!(output.path, format!("{}/run_2", base.display()));

        let mut output = Output {
            write: true,
            path: String::from("a#/b#"),
        };
        assert!(output.parse_output_folder().is_err());

        let mut output = Output {
            write: true,
            path: String::new(),
        };
        output.parse_output_folder().unwrap();
        assert_eq!(output.path, "outputs/");

        std::fs::remove_dir_all(base).unwrap();
    }
}
