//! # Drain Controller
//!
//! The state machine that decides when a delivery cycle starts, when it may
//! park, and when the gateway is finally allowed to close. It is plain data;
//! the dispatcher keeps it behind one mutex together with the single-flight
//! `running` flag so both are always read and written as a unit.
//!
//! ```text
//!  Idle --enqueue / connect with backlog--> Draining
//!  Draining --queue empty or no sessions--> Idle
//!  any --stop--> ClosingRequested --cycle ends with empty queue--> Closed
//! ```

/// Lifecycle of the broadcast core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// No cycle is running and no stop was requested.
    Idle,
    /// A cycle is delivering the backlog.
    Draining,
    /// Stop was requested; new connections are refused while the backlog drains.
    ClosingRequested,
    /// The backlog drained after a stop request. Terminal.
    Closed,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// Back to waiting for work.
    Parked,
    /// The controller just reached [`DrainState::Closed`].
    Closed,
}

/// State plus the single-flight flag.
#[derive(Debug)]
pub struct DrainController {
    state: DrainState,
    running: bool,
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainController {
    /// Starts in [`DrainState::Idle`].
    pub fn new() -> Self {
        Self { state: DrainState::Idle, running: false }
    }

    /// Current state.
    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Whether a delivery cycle is active.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether new sessions may register.
    pub fn admits_connections(&self) -> bool {
        matches!(self.state, DrainState::Idle | DrainState::Draining)
    }

    /// Claims the single cycle slot. Returns `false` when a cycle already
    /// runs (it will pick up the new work) or the controller is closed.
    pub fn begin_cycle(&mut self) -> bool {
        if self.running || self.state == DrainState::Closed {
            return false;
        }
        self.running = true;
        if self.state == DrainState::Idle {
            self.state = DrainState::Draining;
        }
        true
    }

    /// Releases the cycle slot. `queue_empty` is the backlog as observed
    /// under the same lock.
    pub fn finish_cycle(&mut self, queue_empty: bool) -> CycleEnd {
        self.running = false;
        match self.state {
            DrainState::Draining => {
                self.state = DrainState::Idle;
                CycleEnd::Parked
            }
            DrainState::ClosingRequested if queue_empty => {
                self.state = DrainState::Closed;
                CycleEnd::Closed
            }
            _ => CycleEnd::Parked,
        }
    }

    /// Records a stop request. Returns `false` if one was already recorded.
    pub fn request_stop(&mut self) -> bool {
        match self.state {
            DrainState::ClosingRequested | DrainState::Closed => false,
            DrainState::Idle | DrainState::Draining => {
                self.state = DrainState::ClosingRequested;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_slot_is_single_flight() {
        let mut d = DrainController::new();
        assert!(d.begin_cycle());
        assert_eq!(d.state(), DrainState::Draining);
        assert!(!d.begin_cycle());
        assert_eq!(d.finish_cycle(true), CycleEnd::Parked);
        assert_eq!(d.state(), DrainState::Idle);
        assert!(d.begin_cycle());
    }

    #[test]
    fn aborted_cycle_parks_in_idle_with_backlog() {
        let mut d = DrainController::new();
        d.begin_cycle();
        assert_eq!(d.finish_cycle(false), CycleEnd::Parked);
        assert_eq!(d.state(), DrainState::Idle);
    }

    #[test]
    fn stop_refuses_connections_and_is_idempotent() {
        let mut d = DrainController::new();
        assert!(d.request_stop());
        assert!(!d.admits_connections());
        assert!(!d.request_stop());
        assert_eq!(d.state(), DrainState::ClosingRequested);
    }

    #[test]
    fn closing_waits_for_an_empty_queue() {
        let mut d = DrainController::new();
        d.request_stop();
        assert!(d.begin_cycle());
        assert_eq!(d.finish_cycle(false), CycleEnd::Parked);
        assert_eq!(d.state(), DrainState::ClosingRequested);
        assert!(d.begin_cycle());
        assert_eq!(d.finish_cycle(true), CycleEnd::Closed);
        assert_eq!(d.state(), DrainState::Closed);
        assert!(!d.begin_cycle());
        assert!(!d.request_stop());
    }

    #[test]
    fn stop_during_a_cycle_closes_when_it_finishes() {
        let mut d = DrainController::new();
        d.begin_cycle();
        assert!(d.request_stop());
        assert!(d.is_running());
        assert_eq!(d.finish_cycle(true), CycleEnd::Closed);
    }
}
