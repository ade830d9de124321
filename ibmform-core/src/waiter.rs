//! Waiter - Poll a remote resource until it reaches a target status
//!
//! Providers issue asynchronous operations (create, stop, delete) and then
//! have to wait for the remote control plane to converge. A wait is described
//! by a [`WaitSpec`]: which statuses mean "keep polling", which mean "done",
//! and which mean "give up". The caller supplies a refresh function that
//! fetches the current status; the waiter drives it at a fixed cadence until
//! a terminal result or the timeout.
//!
//! [`wait_for_state_with_escalation`] additionally runs an escalation timer
//! next to the poll loop, used to force an action (e.g. a hard stop) when the
//! resource is slow to converge.

use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::provider::ProviderError;

/// Synthetic status reported when the resource no longer exists
pub const ABSENT: &str = "deleted";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);

/// What to wait for and for how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    /// Statuses that mean the resource is still transitioning
    pub pending: Vec<String>,
    /// Statuses that satisfy the wait
    pub target: Vec<String>,
    /// Statuses that abort the wait even if listed as a target
    pub failure: Vec<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Delay before the first refresh
    pub delay: Duration,
}

impl WaitSpec {
    pub fn new<P, T, S>(pending: P, target: T) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            failure: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            delay: DEFAULT_DELAY,
        }
    }

    pub fn with_failure<F, S>(mut self, failure: F) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = failure.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Pending and target must be disjoint and the loop must make progress
    pub fn validate(&self) -> Result<(), WaitError> {
        if self.target.is_empty() {
            return Err(WaitError::InvalidSpec(
                "at least one target state is required".to_string(),
            ));
        }
        if let Some(overlap) = self.pending.iter().find(|s| self.target.contains(s)) {
            return Err(WaitError::InvalidSpec(format!(
                "state '{}' is both pending and target",
                overlap
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(WaitError::InvalidSpec(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn accepts_absent(&self) -> bool {
        self.target.iter().any(|s| s == ABSENT)
    }
}

/// One refresh result
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// The resource exists and reports `status`
    Found { snapshot: T, status: String },
    /// The remote API reported the resource as not found
    Gone,
}

impl<T> Observation<T> {
    pub fn found(snapshot: T, status: impl Into<String>) -> Self {
        Observation::Found {
            snapshot,
            status: status.into(),
        }
    }
}

/// Successful end of a wait
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome<T> {
    /// Last observed snapshot; `None` when the resource is gone
    pub snapshot: Option<T>,
    pub status: String,
    /// Number of refresh calls made
    pub polls: u32,
    /// Number of escalation actions issued
    pub escalations: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("invalid wait specification: {0}")]
    InvalidSpec(String),

    #[error(
        "timeout after {timeout:?} waiting for {handle} to become {} (last status: {})",
        target.join(" or "),
        last_status.as_deref().unwrap_or("none")
    )]
    Timeout {
        handle: String,
        timeout: Duration,
        target: Vec<String>,
        last_status: Option<String>,
    },

    #[error("{handle} entered unexpected state '{status}', expected one of: {}", expected.join(", "))]
    UnexpectedState {
        handle: String,
        status: String,
        expected: Vec<String>,
    },

    #[error("{handle} reached failure state '{status}'")]
    FailureState { handle: String, status: String },

    #[error("{handle} was not found")]
    NotFound { handle: String },

    #[error("failed to refresh {handle}: {source}")]
    Refresh {
        handle: String,
        source: ProviderError,
    },

    #[error("escalation for {handle} failed: {source}")]
    Escalation {
        handle: String,
        source: ProviderError,
    },
}

impl From<WaitError> for ProviderError {
    fn from(err: WaitError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

/// How often the escalation action may fire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EscalationPolicy {
    /// Fire once, then leave the rest to the poll loop
    #[default]
    Once,
    /// Fire again every `after` until the poll loop finishes
    Repeat,
}

/// Action forced when the primary wait takes longer than `after`
pub struct Escalation<A> {
    pub after: Duration,
    pub policy: EscalationPolicy,
    pub action: A,
}

impl<A> Escalation<A> {
    pub fn new(after: Duration, action: A) -> Self {
        Self {
            after,
            policy: EscalationPolicy::Once,
            action,
        }
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Poll `refresh` until the status satisfies `spec`
pub async fn wait_for_state<T, F, Fut>(
    handle: &str,
    spec: &WaitSpec,
    refresh: F,
) -> Result<WaitOutcome<T>, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, ProviderError>>,
{
    spec.validate()?;
    info!(
        "Waiting for {} to become {}",
        handle,
        spec.target.join(" or ")
    );

    let mut last_status = None;
    let result = timeout(
        spec.timeout,
        poll(handle, spec, refresh, &mut last_status, None),
    )
    .await;

    finish(handle, spec, result, last_status)
}

/// Poll `refresh` like [`wait_for_state`] while an escalation timer runs
/// alongside.
///
/// The poll loop owns the outcome. When it finishes it signals the timer to
/// stop; when the escalation action fails, the error is handed to the poll
/// loop, which aborts with [`WaitError::Escalation`].
pub async fn wait_for_state_with_escalation<T, F, Fut, A, AFut>(
    handle: &str,
    spec: &WaitSpec,
    refresh: F,
    escalation: Escalation<A>,
) -> Result<WaitOutcome<T>, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, ProviderError>>,
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<(), ProviderError>>,
{
    spec.validate()?;
    if escalation.after.is_zero() {
        return Err(WaitError::InvalidSpec(
            "escalation delay must be greater than zero".to_string(),
        ));
    }
    info!(
        "Waiting for {} to become {} (escalating after {:?})",
        handle,
        spec.target.join(" or "),
        escalation.after
    );

    let (error_tx, mut error_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel();
    let mut last_status = None;

    let last_status_ref = &mut last_status;
    let error_rx_ref = &mut error_rx;
    let primary = async move {
        let result = timeout(
            spec.timeout,
            poll(handle, spec, refresh, last_status_ref, Some(error_rx_ref)),
        )
        .await;
        // The timer may already be gone; nothing to do then.
        let _ = stop_tx.send(());
        result
    };

    let (result, escalations) =
        tokio::join!(primary, escalate(handle, escalation, error_tx, stop_rx));

    finish(handle, spec, result, last_status).map(|mut outcome| {
        outcome.escalations = escalations;
        outcome
    })
}

fn finish<T>(
    handle: &str,
    spec: &WaitSpec,
    result: Result<Result<WaitOutcome<T>, WaitError>, tokio::time::error::Elapsed>,
    last_status: Option<String>,
) -> Result<WaitOutcome<T>, WaitError> {
    match result {
        Ok(Ok(outcome)) => {
            info!(
                "{} reached '{}' after {} poll(s)",
                handle, outcome.status, outcome.polls
            );
            Ok(outcome)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(WaitError::Timeout {
            handle: handle.to_string(),
            timeout: spec.timeout,
            target: spec.target.clone(),
            last_status,
        }),
    }
}

async fn poll<T, F, Fut>(
    handle: &str,
    spec: &WaitSpec,
    mut refresh: F,
    last_status: &mut Option<String>,
    mut escalation_errors: Option<&mut mpsc::Receiver<ProviderError>>,
) -> Result<WaitOutcome<T>, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, ProviderError>>,
{
    pause(handle, spec.delay, &mut escalation_errors).await?;

    let mut polls = 0;
    loop {
        polls += 1;
        let observation = refresh().await.map_err(|source| WaitError::Refresh {
            handle: handle.to_string(),
            source,
        })?;

        match observation {
            Observation::Gone if spec.accepts_absent() => {
                *last_status = Some(ABSENT.to_string());
                return Ok(WaitOutcome {
                    snapshot: None,
                    status: ABSENT.to_string(),
                    polls,
                    escalations: 0,
                });
            }
            Observation::Gone => {
                return Err(WaitError::NotFound {
                    handle: handle.to_string(),
                });
            }
            Observation::Found { snapshot, status } => {
                debug!("{} status: {} (poll {})", handle, status, polls);
                *last_status = Some(status.clone());

                if spec.failure.contains(&status) {
                    return Err(WaitError::FailureState {
                        handle: handle.to_string(),
                        status,
                    });
                }
                if spec.target.contains(&status) {
                    return Ok(WaitOutcome {
                        snapshot: Some(snapshot),
                        status,
                        polls,
                        escalations: 0,
                    });
                }
                if !spec.pending.contains(&status) {
                    let mut expected = spec.pending.clone();
                    expected.extend(spec.target.iter().cloned());
                    return Err(WaitError::UnexpectedState {
                        handle: handle.to_string(),
                        status,
                        expected,
                    });
                }
            }
        }

        pause(handle, spec.poll_interval, &mut escalation_errors).await?;
    }
}

/// Sleep between ticks, waking early if the escalation reported an error
async fn pause(
    handle: &str,
    duration: Duration,
    escalation_errors: &mut Option<&mut mpsc::Receiver<ProviderError>>,
) -> Result<(), WaitError> {
    match escalation_errors {
        Some(errors) => {
            tokio::select! {
                _ = sleep(duration) => Ok(()),
                Some(source) = errors.recv() => Err(WaitError::Escalation {
                    handle: handle.to_string(),
                    source,
                }),
            }
        }
        None => {
            sleep(duration).await;
            Ok(())
        }
    }
}

/// Escalation timer; returns the number of times the action fired
async fn escalate<A, AFut>(
    handle: &str,
    mut escalation: Escalation<A>,
    errors: mpsc::Sender<ProviderError>,
    mut stop: oneshot::Receiver<()>,
) -> u32
where
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<(), ProviderError>>,
{
    let mut next = Instant::now().checked_add(escalation.after);
    let mut fired = 0;

    loop {
        // Past the clock's range the action can never fire
        let Some(at) = next else {
            let _ = (&mut stop).await;
            return fired;
        };
        tokio::select! {
            biased;
            _ = &mut stop => return fired,
            _ = sleep_until(at) => {}
        }

        fired += 1;
        warn!(
            "{} has not reached its target state, escalating (attempt {})",
            handle, fired
        );

        let result = tokio::select! {
            biased;
            _ = &mut stop => return fired,
            result = (escalation.action)() => result,
        };

        if let Err(e) = result {
            // Capacity is one and this is the only send.
            let _ = errors.send(e).await;
            return fired;
        }

        if escalation.policy == EscalationPolicy::Once {
            return fired;
        }
        next = at.checked_add(escalation.after);
    }
}
