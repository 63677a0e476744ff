use crate::approval_log::{ApprovalLog, ApprovalRecord};
use crate::decider::Decider;
use crate::error::{OverseerError, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ApprovalGate
// ---------------------------------------------------------------------------

/// Decides whether a proposed mutating step may proceed.
///
/// Every check appends exactly one [`ApprovalRecord`] to the log, approved
/// or not. The gate fails closed: a decider error, panic or timeout is
/// recorded and reported as a rejection, never propagated as an error that
/// a caller could mistake for "no answer yet".
pub struct ApprovalGate {
    decider: Arc<dyn Decider>,
    log: Arc<dyn ApprovalLog>,
    timeout: Option<Duration>,
}

impl ApprovalGate {
    pub fn new(decider: Arc<dyn Decider>, log: Arc<dyn ApprovalLog>) -> Self {
        Self {
            decider,
            log,
            timeout: None,
        }
    }

    /// Bound how long the decider may take. Expiry counts as a rejection.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `true` only if the decider explicitly approved `step` and the record
    /// was written.
    pub fn request_approval(&self, step: &str) -> Result<bool> {
        Ok(self.review(step)?.approved)
    }

    /// Like [`request_approval`](Self::request_approval) but returns the
    /// full record that was appended.
    ///
    /// Errors only for an empty step (nothing logged) or when the log append
    /// itself fails; in the latter case the caller must not proceed.
    pub fn review(&self, step: &str) -> Result<ApprovalRecord> {
        let step = step.trim();
        if step.is_empty() {
            return Err(OverseerError::InvalidStep(
                "step description must not be empty".to_string(),
            ));
        }

        let (approved, note) = match self.consult(step) {
            Ok(approved) => (approved, None),
            Err(reason) => {
                tracing::warn!(step, %reason, "approval failed closed");
                (false, Some(reason))
            }
        };

        let record = ApprovalRecord::new(step, approved, self.decider.name(), note);
        self.log.append(&record)?;
        tracing::info!(step, approved, decider = self.decider.name(), "approval recorded");
        Ok(record)
    }

    /// Ask the decider on a worker thread so a panic or a hang cannot
    /// escape the gate. `Err` carries the reason no decision was reached.
    fn consult(&self, step: &str) -> std::result::Result<bool, String> {
        let (tx, rx) = mpsc::channel();
        let decider = Arc::clone(&self.decider);
        let owned = step.to_string();
        // The worker is detached on timeout and finishes on its own.
        std::thread::spawn(move || {
            let _ = tx.send(decider.decide(&owned));
        });

        let received = match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "decider timed out after {}s",
                self.timeout.unwrap_or_default().as_secs_f64()
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err("decider stopped without answering".to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval_log::MemoryApprovalLog;
    use crate::decider::StaticDecider;

    struct FailingDecider;

    impl Decider for FailingDecider {
        fn name(&self) -> &str {
            "failing"
        }
        fn decide(&self, _step: &str) -> Result<bool> {
            Err(OverseerError::Decider("service unreachable".to_string()))
        }
    }

    struct SlowDecider(Duration);

    impl Decider for SlowDecider {
        fn name(&self) -> &str {
            "slow"
        }
        fn decide(&self, _step: &str) -> Result<bool> {
            std::thread::sleep(self.0);
            Ok(true)
        }
    }

    struct PanickingDecider;

    impl Decider for PanickingDecider {
        fn name(&self) -> &str {
            "panicking"
        }
        fn decide(&self, _step: &str) -> Result<bool> {
            panic!("decider bug");
        }
    }

    struct BrokenLog;

    impl ApprovalLog for BrokenLog {
        fn append(&self, _record: &ApprovalRecord) -> Result<()> {
            Err(OverseerError::ApprovalLog("disk full".to_string()))
        }
    }

    fn gate(decider: impl Decider + 'static) -> (ApprovalGate, Arc<MemoryApprovalLog>) {
        let log = Arc::new(MemoryApprovalLog::new());
        let gate = ApprovalGate::new(Arc::new(decider), log.clone());
        (gate, log)
    }

    #[test]
    fn approval_is_recorded() {
        let (gate, log) = gate(StaticDecider::new(true));
        assert!(gate.request_approval("Refine Repository Structure").unwrap());

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, "Refine Repository Structure");
        assert!(records[0].approved);
        assert_eq!(records[0].decider, "static");
        assert!(records[0].note.is_none());
    }

    #[test]
    fn rejection_is_recorded() {
        let (gate, log) = gate(StaticDecider::new(false));
        assert!(!gate.request_approval("Integrate CMS").unwrap());
        assert_eq!(log.records().len(), 1);
        assert!(!log.records()[0].approved);
    }

    #[test]
    fn decider_error_fails_closed() {
        let (gate, log) = gate(FailingDecider);
        let record = gate.review("Integrate CMS").unwrap();
        assert!(!record.approved);
        assert!(record.note.unwrap().contains("service unreachable"));
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn timeout_fails_closed() {
        let log = Arc::new(MemoryApprovalLog::new());
        let gate = ApprovalGate::new(
            Arc::new(SlowDecider(Duration::from_secs(2))),
            log.clone(),
        )
        .with_timeout(Some(Duration::from_millis(50)));

        let record = gate.review("slow step").unwrap();
        assert!(!record.approved);
        assert!(record.note.unwrap().contains("timed out"));
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn fast_decider_within_timeout_is_honoured() {
        let log = Arc::new(MemoryApprovalLog::new());
        let gate = ApprovalGate::new(Arc::new(StaticDecider::new(true)), log)
            .with_timeout(Some(Duration::from_secs(5)));
        assert!(gate.request_approval("quick step").unwrap());
    }

    #[test]
    fn panicking_decider_fails_closed() {
        // No timeout: the decider still runs off the caller's thread.
        let (gate, log) = gate(PanickingDecider);
        let record = gate.review("step").unwrap();
        assert!(!record.approved);
        assert!(record.note.unwrap().contains("without answering"));
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    fn empty_step_is_rejected_without_logging() {
        let (gate, log) = gate(StaticDecider::new(true));
        assert!(matches!(
            gate.request_approval("   "),
            Err(OverseerError::InvalidStep(_))
        ));
        assert!(log.records().is_empty());
    }

    #[test]
    fn log_failure_is_an_error() {
        let gate = ApprovalGate::new(Arc::new(StaticDecider::new(true)), Arc::new(BrokenLog));
        assert!(matches!(
            gate.request_approval("step"),
            Err(OverseerError::ApprovalLog(_))
        ));
    }
}
