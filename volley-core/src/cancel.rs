use tokio_util::sync::CancellationToken;

/// Run/stop flag of a plan or a thread group, plus the token in-flight HTTP calls race against.
///
/// Stopping is two-phase. [`request_stop`](Self::request_stop) flips the running flag so loops
/// exit at their next check. [`cancel_in_flight`](Self::cancel_in_flight) additionally aborts calls
/// that are already on the wire. [`stop`](Self::stop) does both.
///
/// Group controllers are created with [`child`](Self::child); stopping a plan stops all of its
/// groups, stopping a group leaves the plan and its sibling groups alone.
#[derive(Debug, Clone)]
pub struct CancellationController {
    running: CancellationToken,
    in_flight: CancellationToken,
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationController {
    pub fn new() -> Self {
        Self {
            running: CancellationToken::new(),
            in_flight: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            running: self.running.child_token(),
            in_flight: self.in_flight.child_token(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    /// Hard stop: no new work, and in-flight calls are aborted.
    pub fn stop(&self) {
        self.running.cancel();
        self.in_flight.cancel();
    }

    /// Soft stop: no new work, current iterations run to completion.
    pub fn request_stop(&self) {
        self.running.cancel();
    }

    pub fn cancel_in_flight(&self) {
        self.in_flight.cancel();
    }

    pub fn is_in_flight_cancelled(&self) -> bool {
        self.in_flight.is_cancelled()
    }

    /// Resolves once the running flag is cleared.
    pub async fn stopped(&self) {
        self.running.cancelled().await;
    }

    pub fn in_flight_token(&self) -> &CancellationToken {
        &self.in_flight
    }
}
