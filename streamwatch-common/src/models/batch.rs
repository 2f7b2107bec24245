use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Ok,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item: String,
    pub cause: String,
}

/// Per-item outcomes of a batch operation that keeps going past failures.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub operation: String,
    pub outcomes: Vec<(String, ItemOutcome)>,
}

impl BatchReport {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            outcomes: Vec::new(),
        }
    }

    pub fn record_ok(&mut self, item: impl fmt::Display) {
        self.outcomes.push((item.to_string(), ItemOutcome::Ok));
    }

    pub fn record_failure(&mut self, item: impl fmt::Display, cause: &Error) {
        self.outcomes.push((item.to_string(), ItemOutcome::Failed(cause.to_string())));
    }

    pub fn record(&mut self, item: impl fmt::Display, result: &Result<(), Error>) {
        match result {
            Ok(()) => self.record_ok(item),
            Err(e) => self.record_failure(item, e),
        }
    }

    /// Folds another report's outcomes into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
    }

    pub fn failures(&self) -> Vec<ItemFailure> {
        self.outcomes
            .iter()
            .filter_map(|(item, outcome)| match outcome {
                ItemOutcome::Failed(cause) => Some(ItemFailure {
                    item: item.clone(),
                    cause: cause.clone(),
                }),
                ItemOutcome::Ok => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Ok))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| matches!(o, ItemOutcome::Ok))
    }

    /// `Ok(self)` if every item succeeded, otherwise a `PartialFailure`
    /// carrying the failed subset.
    pub fn into_result(self) -> Result<BatchReport, Error> {
        if self.is_success() {
            return Ok(self);
        }
        Err(Error::PartialFailure(BatchFailure {
            operation: self.operation.clone(),
            attempted: self.outcomes.len(),
            failures: self.failures(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub operation: String,
    pub attempted: usize,
    pub failures: Vec<ItemFailure>,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} items failed in {}",
            self.failures.len(),
            self.attempted,
            self.operation
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.item, failure.cause)?;
        }
        Ok(())
    }
}
