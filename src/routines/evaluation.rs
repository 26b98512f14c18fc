use eyre::{eyre, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A model predicting the properties of a formulation
///
/// Implemented for every `Fn(&[f64]) -> Result<Vec<f64>>`.
/// The model should be deterministic, otherwise runs are not reproducible.
/// Failures should be returned as `Err`. A panic is caught by [evaluate] and counted as a failed evaluation.
pub trait Surrogate {
    fn predict(&self, formulation: &[f64]) -> Result<Vec<f64>>;
}

impl<F> Surrogate for F
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    fn predict(&self, formulation: &[f64]) -> Result<Vec<f64>> {
        self(formulation)
    }
}

/// Maps predicted properties to a scalar cost, lower is better
///
/// Implemented for every `Fn(&[f64]) -> Result<f64>`.
/// As for [Surrogate], a panic is counted as a failed evaluation.
pub trait Objective {
    fn cost(&self, properties: &[f64]) -> Result<f64>;
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> Result<f64>,
{
    fn cost(&self, properties: &[f64]) -> Result<f64> {
        self(properties)
    }
}

/// Outcome of evaluating a single formulation
///
/// Failed evaluations carry an infinite objective, which the Metropolis rule always rejects.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub objective: f64,
    pub predictions: Option<Vec<f64>>,
    pub failed: bool,
}

impl Evaluation {
    fn failure(predictions: Option<Vec<f64>>) -> Self {
        Evaluation {
            objective: f64::INFINITY,
            predictions,
            failed: true,
        }
    }
}

/// Evaluate a formulation through the surrogate model and the objective function
///
/// Errors and panics from either collaborator, and costs that are `NaN`, are logged and turned into a failed [Evaluation].
pub fn evaluate<S, O>(surrogate: &S, objective: &O, formulation: &[f64]) -> Evaluation
where
    S: Surrogate + ?Sized,
    O: Objective + ?Sized,
{
    let predicted = catch_unwind(AssertUnwindSafe(|| surrogate.predict(formulation)))
        .unwrap_or_else(|payload| Err(panic_error(payload)));
    let predictions = match predicted {
        Ok(predictions) => predictions,
        Err(error) => {
            tracing::warn!("Surrogate model failed on {:?}: {}", formulation, error);
            return Evaluation::failure(None);
        }
    };

    let cost = catch_unwind(AssertUnwindSafe(|| objective.cost(&predictions)))
        .unwrap_or_else(|payload| Err(panic_error(payload)));
    let cost = cost.and_then(|cost| {
        if cost.is_nan() {
            Err(eyre!("objective returned NaN"))
        } else {
            Ok(cost)
        }
    });

    match cost {
        Ok(objective) => Evaluation {
            objective,
            predictions: Some(predictions),
            failed: false,
        },
        Err(error) => {
            tracing::warn!(
                "Objective function failed on predictions {:?}: {}",
                predictions,
                error
            );
            Evaluation::failure(Some(predictions))
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> eyre::Report {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown cause"));
    eyre!("panicked: {}", message)
}
