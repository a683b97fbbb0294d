//! Ordered mutate-then-wait steps.
//!
//! A multi-step update runs each mutation, waits for the resource to settle,
//! then moves on. The first failure stops the run. Steps already applied
//! stay applied; nothing is rolled back.

use tracing::{info, warn};

use crate::error::{ClientError, ReconcileError, Result};
use crate::model::RootUser;
use crate::poller::{Observation, PollSpec, wait_for};

type Mutation<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;
type Probe<'a> = Box<dyn FnMut() -> std::result::Result<Observation, ClientError> + 'a>;

struct Wait<'a> {
    spec: PollSpec,
    probe: Probe<'a>,
}

/// One mutation and the wait that follows it.
pub struct Step<'a> {
    name: String,
    mutate: Mutation<'a>,
    wait: Option<Wait<'a>>,
}

impl<'a> Step<'a> {
    pub fn new(name: impl Into<String>, mutate: impl FnOnce() -> Result<()> + 'a) -> Self {
        Self {
            name: name.into(),
            mutate: Box::new(mutate),
            wait: None,
        }
    }

    /// Poll `probe` against `spec` after the mutation succeeds.
    pub fn then_wait(
        mut self,
        spec: PollSpec,
        probe: impl FnMut() -> std::result::Result<Observation, ClientError> + 'a,
    ) -> Self {
        self.wait = Some(Wait {
            spec,
            probe: Box::new(probe),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn waits(&self) -> bool {
        self.wait.is_some()
    }
}

/// Steps of one logical update, in execution order.
#[derive(Default)]
pub struct StepPlan<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> StepPlan<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, step: Step<'a>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }
}

/// What a completed run applied.
#[derive(Debug, Default)]
pub struct SequenceReport {
    pub completed: Vec<String>,
    /// Observation returned by the last wait, if any step waited.
    pub last: Option<Observation>,
    /// Credentials handed back by a root enable step.
    pub root_user: Option<RootUser>,
}

/// Run every step in order. Stops at the first failing mutation or wait.
pub fn run_steps(plan: StepPlan<'_>) -> Result<SequenceReport> {
    let total = plan.steps.len();
    let mut report = SequenceReport::default();

    for (idx, step) in plan.steps.into_iter().enumerate() {
        let Step { name, mutate, wait } = step;
        info!(step = idx + 1, total, %name, "Applying update step");

        let outcome = mutate().and_then(|()| match wait {
            Some(Wait { spec, mut probe }) => wait_for(&spec, &mut probe).map(Some),
            None => Ok(None),
        });

        match outcome {
            Ok(observation) => {
                if observation.is_some() {
                    report.last = observation;
                }
                report.completed.push(name);
            }
            Err(source) => {
                warn!(step = idx + 1, total, %name, error = %source, "Update step failed");
                return Err(ReconcileError::StepFailed {
                    step: idx + 1,
                    total,
                    name,
                    completed: report.completed,
                    source: Box::new(source),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::kind::ResourceKind;
    use crate::status::CanonicalStatus;

    fn gone_spec() -> PollSpec {
        PollSpec::new(ResourceKind::Volume, "vol-1")
            .pending([CanonicalStatus::ShuttingDown])
            .target([CanonicalStatus::Deleted])
            .timeout(Duration::from_secs(1))
            .poll_interval(Duration::ZERO)
    }

    #[test]
    fn test_steps_run_in_order() {
        let log = RefCell::new(Vec::new());
        let mut plan = StepPlan::new();
        for name in ["first", "second", "third"] {
            let log = &log;
            plan.push(Step::new(name, move || {
                log.borrow_mut().push(name);
                Ok(())
            }));
        }
        assert_eq!(plan.names(), vec!["first", "second", "third"]);

        let report = run_steps(plan).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
        assert_eq!(report.completed, vec!["first", "second", "third"]);
        assert!(report.last.is_none());
    }

    #[test]
    fn test_failed_mutation_skips_its_wait() {
        let probed = RefCell::new(0);
        let mut plan = StepPlan::new();
        plan.push(
            Step::new("detach", || Err(ReconcileError::Unsupported("nope".into()))).then_wait(
                gone_spec(),
                || {
                    *probed.borrow_mut() += 1;
                    Ok(Observation::NotFound)
                },
            ),
        );

        let err = run_steps(plan).unwrap_err();
        match err {
            ReconcileError::StepFailed {
                step,
                total,
                name,
                completed,
                ..
            } => {
                assert_eq!((step, total), (1, 1));
                assert_eq!(name, "detach");
                assert!(completed.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*probed.borrow(), 0);
    }

    #[test]
    fn test_wait_result_is_reported() {
        let mut plan = StepPlan::new();
        plan.push(Step::new("delete", || Ok(())).then_wait(gone_spec(), || Ok(Observation::NotFound)));
        let report = run_steps(plan).unwrap();
        assert!(matches!(report.last, Some(Observation::NotFound)));
    }
}
