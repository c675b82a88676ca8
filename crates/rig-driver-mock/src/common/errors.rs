//! Error injection for simulated hardware.
//!
//! Every simulated backend call runs through [`ErrorConfig::check_operation`]
//! with a short operation name (`"acquire"`, `"read"`, `"apply"`,
//! `"identify"`, `"transact"`). Scenarios and failure rates decide whether
//! the call fails and with which [`HardwareErrorKind`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rig_core::{HardwareError, HardwareErrorKind};

use super::rng::MockRng;

/// Deterministic failure patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScenario {
    /// Succeed `count` times, then fail every call of `operation`
    FailAfterN {
        /// Operation name passed to `check_operation`.
        operation: &'static str,
        /// Successful calls before the first failure.
        count: u32,
    },
    /// Every call of `operation` times out
    Timeout {
        /// Operation that times out.
        operation: &'static str,
    },
    /// First checked call loses the link; every later call fails too
    CommunicationLoss,
    /// First checked call latches a hardware fault code
    HardwareFault {
        /// Vendor fault code reported in the error message.
        code: u32,
    },
}

#[derive(Debug, Default)]
struct ErrorState {
    calls: HashMap<&'static str, u32>,
    communication_lost: bool,
    fault_code: Option<u32>,
}

/// Shareable error-injection policy. Clones share counters and latches.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

impl ErrorConfig {
    /// No injected errors.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Every operation fails with probability `rate`.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// Policy with a single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Policy with several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Per-operation failure rates; `"*"` is the fallback.
    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Decide whether `operation` fails now.
    pub fn check_operation(&self, operation: &'static str) -> Result<(), HardwareError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(HardwareError::communication("communication lost"));
        }
        if let Some(code) = state.fault_code {
            return Err(HardwareError::hardware(format!("hardware fault 0x{:04X}", code)));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN { operation: op, count } if *op == operation => {
                    let calls = state.calls.entry(operation).or_insert(0);
                    *calls += 1;
                    if *calls > *count {
                        return Err(HardwareError::hardware(format!(
                            "injected '{}' failure after {} calls",
                            operation, count
                        )));
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(HardwareError::timeout(format!(
                        "'{}' timed out",
                        operation
                    )));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(HardwareError::communication("communication lost"));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.fault_code = Some(*code);
                    return Err(HardwareError::hardware(format!("hardware fault 0x{:04X}", code)));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(HardwareError::new(
                HardwareErrorKind::Hardware,
                format!("random failure on '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Clear counters and latched faults.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }

    /// Number of checked calls of `operation` so far.
    pub fn calls(&self, operation: &str) -> u32 {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_fails() {
        let config = ErrorConfig::none();
        assert!((0..100).all(|_| config.check_operation("read").is_ok()));
    }

    #[test]
    fn fail_after_n_counts_only_its_operation() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "read",
            count: 3,
        });

        for _ in 0..3 {
            assert!(config.check_operation("read").is_ok());
        }
        assert!(config.check_operation("apply").is_ok());
        let err = config.check_operation("read").unwrap_err();
        assert_eq!(err.kind, HardwareErrorKind::Hardware);
        assert_eq!(config.calls("read"), 4);
    }

    #[test]
    fn timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout { operation: "acquire" });
        let err = config.check_operation("acquire").unwrap_err();
        assert_eq!(err.kind, HardwareErrorKind::Timeout);
        assert!(config.check_operation("read").is_ok());
    }

    #[test]
    fn communication_loss_latches() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);
        assert_eq!(
            config.check_operation("read").unwrap_err().kind,
            HardwareErrorKind::Communication
        );
        assert!(config.check_operation("apply").is_err());

        config.reset();
        // The scenario fires again on the next call after a reset.
        assert!(config.check_operation("read").is_err());
    }

    #[test]
    fn hardware_fault_reports_code() {
        let config = ErrorConfig::scenario(ErrorScenario::HardwareFault { code: 0x42 });
        let err = config.check_operation("read").unwrap_err();
        assert!(err.message.contains("0x0042"));
    }

    #[test]
    fn clones_share_state() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "read",
            count: 1,
        });
        let clone = config.clone();
        assert!(config.check_operation("read").is_ok());
        assert!(clone.check_operation("read").is_err());
    }

    #[test]
    fn per_operation_rates() {
        let mut rates = HashMap::new();
        rates.insert("read", 1.0);
        rates.insert("*", 0.0);
        let config = ErrorConfig::with_rates(rates, Some(9));
        assert!(config.check_operation("read").is_err());
        assert!(config.check_operation("apply").is_ok());
    }
}
