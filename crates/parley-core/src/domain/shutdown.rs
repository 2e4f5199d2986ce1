//! ShutdownResult - 停止中に起きたことの記録
//!
//! 記録は欠落なし。キャンセルも本物の失敗と並べて残すが、
//! [`ShutdownResult::failed`] に数えるのは本物の失敗だけ。

use std::fmt;

use thiserror::Error;

use super::errors::BrokerError;

#[derive(Debug, Default)]
pub struct ShutdownResult {
    recorded: Vec<BrokerError>,
}

impl ShutdownResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: BrokerError) {
        self.recorded.push(error);
    }

    /// Append everything `other` recorded, keeping order.
    pub fn merge(&mut self, other: ShutdownResult) {
        self.recorded.extend(other.recorded);
    }

    /// `true` if anything other than a cancellation was recorded.
    pub fn failed(&self) -> bool {
        self.recorded.iter().any(|e| !e.is_cancellation())
    }

    /// Recorded errors that are real faults.
    pub fn exceptions(&self) -> Vec<&BrokerError> {
        self.recorded.iter().filter(|e| !e.is_cancellation()).collect()
    }

    /// Recorded errors whose root cause is cancellation.
    pub fn cancellations(&self) -> Vec<&BrokerError> {
        self.recorded.iter().filter(|e| e.is_cancellation()).collect()
    }

    pub fn all(&self) -> &[BrokerError] {
        &self.recorded
    }

    pub fn into_result(self) -> Result<(), ShutdownError> {
        let errors: Vec<BrokerError> = self
            .recorded
            .into_iter()
            .filter(|e| !e.is_cancellation())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { errors })
        }
    }
}

/// Aggregate of the real faults seen while stopping.
#[derive(Debug, Error)]
pub struct ShutdownError {
    errors: Vec<BrokerError>,
}

impl ShutdownError {
    pub fn errors(&self) -> &[BrokerError] {
        &self.errors
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) while stopping", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {}", err.chain_message())?;
        }
        Ok(())
    }
}
