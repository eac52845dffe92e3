//! Connection state machine for the feed transport.
//!
//! This module provides a pure, side-effect-free state machine for the
//! transport lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the stream, polling the fallback endpoint) is
//! performed by feed-client, not by this module. This enables instant unit
//! testing without network mocks.
//!
//! Once degraded to polling the machine never re-attempts the stream; it
//! polls indefinitely until closed.

use std::time::Duration;

/// Transport lifecycle state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Stream connection attempt in progress.
    Connecting,
    /// Streaming connection is live.
    Open,
    /// Stream is gone; polling the fallback endpoint instead.
    Degraded {
        /// Consecutive failed polls since the last successful one.
        failures: u32,
    },
    /// Engine disposed; no further work is scheduled.
    Closed,
}

impl ConnectionState {
    /// Create a new state machine, ready to open the stream.
    pub fn new() -> Self {
        Self::Connecting
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (feed-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Connecting
            (Self::Connecting, Event::StreamOpened) => (
                Self::Open,
                vec![Action::EmitEvent(EngineEvent::StreamLive)],
            ),
            (Self::Connecting, Event::StreamFailed { error }) => (
                Self::Degraded { failures: 0 },
                vec![
                    Action::EmitEvent(EngineEvent::TransportDown { error }),
                    Action::SchedulePoll {
                        delay: RetryDelay::Immediate,
                    },
                ],
            ),

            // From Open
            (Self::Open, Event::StreamFailed { error }) => (
                Self::Degraded { failures: 0 },
                vec![
                    Action::EmitEvent(EngineEvent::TransportDown { error }),
                    Action::SchedulePoll {
                        delay: RetryDelay::Immediate,
                    },
                ],
            ),
            (Self::Open, Event::StreamClosed { reason }) => (
                Self::Degraded { failures: 0 },
                vec![
                    Action::EmitEvent(EngineEvent::TransportDown { error: reason }),
                    Action::SchedulePoll {
                        delay: RetryDelay::Immediate,
                    },
                ],
            ),

            // From Degraded
            (Self::Degraded { .. }, Event::PollSucceeded) => (
                Self::Degraded { failures: 0 },
                vec![Action::SchedulePoll {
                    delay: RetryDelay::Interval,
                }],
            ),
            (Self::Degraded { failures }, Event::PollFailed { error }) => {
                let next = failures.saturating_add(1);
                (
                    Self::Degraded { failures: next },
                    vec![
                        Action::EmitEvent(EngineEvent::PollFailed {
                            attempt: next,
                            error,
                        }),
                        Action::SchedulePoll {
                            delay: RetryDelay::Backoff { failures: next },
                        },
                    ],
                )
            }

            // Close from anywhere
            (Self::Degraded { .. }, Event::CloseRequested) => (
                Self::Closed,
                vec![
                    Action::CancelPoll,
                    Action::EmitEvent(EngineEvent::Closed),
                ],
            ),
            (_, Event::CloseRequested) => (
                Self::Closed,
                vec![
                    Action::CloseStream,
                    Action::EmitEvent(EngineEvent::Closed),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the streaming connection is live.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the machine has fallen back to polling.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Check if the engine has been disposed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the transport lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The streaming connection was established.
    StreamOpened,
    /// The streaming connection failed to open or errored mid-stream.
    StreamFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The streaming connection was closed by the remote side.
    StreamClosed {
        /// Reason for the close.
        reason: String,
    },
    /// A fallback poll returned a batch.
    PollSucceeded,
    /// A fallback poll failed.
    PollFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The engine is being disposed.
    CloseRequested,
}

/// Actions to be executed by feed-client.
///
/// These are instructions, not side effects. The client interprets them and
/// performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Schedule the next fallback poll.
    SchedulePoll {
        /// When to run it, relative to the configured cadence.
        delay: RetryDelay,
    },
    /// Cancel any pending poll timer.
    CancelPoll,
    /// Close the streaming connection.
    CloseStream,
    /// Emit an event to the application.
    EmitEvent(EngineEvent),
}

/// How long to wait before the next poll.
///
/// The machine carries no clock and no configuration; the client resolves
/// these against its configured interval via [`backoff_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDelay {
    /// Poll right away (first poll after losing the stream).
    Immediate,
    /// Poll after the regular polling interval.
    Interval,
    /// Poll after a capped exponential backoff.
    Backoff {
        /// Consecutive failures so far.
        failures: u32,
    },
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The streaming connection is live.
    StreamLive,
    /// The stream is gone; fallback polling is taking over.
    TransportDown {
        /// Error message describing the failure.
        error: String,
    },
    /// A fallback poll failed.
    PollFailed {
        /// Which consecutive failure this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// The engine was disposed.
    Closed,
}

/// Calculate poll retry backoff with jitter.
///
/// Uses exponential backoff with random jitter so repeated failures do not
/// hammer the fallback endpoint at a fixed cadence.
///
/// Formula: min(base * 2^failures, cap) + random(0..1000ms)
pub fn backoff_delay(base: Duration, failures: u32, cap: Duration) -> Duration {
    let multiplier = 2u32.saturating_pow(failures.min(5));
    let backed_off = base.saturating_mul(multiplier).min(cap);

    let jitter = Duration::from_millis(random_jitter_ms());
    backed_off + jitter
}

/// Generate random jitter between 0 and 1000 milliseconds.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    let random = u64::from_le_bytes(bytes);
    random % 1001 // 0..1000 inclusive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting() {
        let state = ConnectionState::new();
        assert!(matches!(state, ConnectionState::Connecting));
    }

    #[test]
    fn stream_open_transitions_to_open() {
        let state = ConnectionState::Connecting;
        let (new_state, actions) = state.on_event(Event::StreamOpened);

        assert!(new_state.is_open());
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(EngineEvent::StreamLive))));
    }

    #[test]
    fn connect_failure_degrades_with_immediate_poll() {
        let state = ConnectionState::Connecting;
        let (new_state, actions) = state.on_event(Event::StreamFailed {
            error: "refused".into(),
        });

        assert!(matches!(
            new_state,
            ConnectionState::Degraded { failures: 0 }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SchedulePoll {
                delay: RetryDelay::Immediate
            }
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(EngineEvent::TransportDown { .. }))));
    }

    #[test]
    fn mid_stream_failure_degrades() {
        let state = ConnectionState::Open;
        let (new_state, _) = state.on_event(Event::StreamFailed {
            error: "reset".into(),
        });
        assert!(new_state.is_degraded());
    }

    #[test]
    fn remote_close_degrades() {
        let state = ConnectionState::Open;
        let (new_state, actions) = state.on_event(Event::StreamClosed {
            reason: "server went away".into(),
        });

        assert!(new_state.is_degraded());
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(EngineEvent::TransportDown { error }) if error == "server went away"
        )));
    }

    #[test]
    fn successful_poll_resets_failures_and_schedules_interval() {
        let state = ConnectionState::Degraded { failures: 4 };
        let (new_state, actions) = state.on_event(Event::PollSucceeded);

        assert!(matches!(
            new_state,
            ConnectionState::Degraded { failures: 0 }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SchedulePoll {
                delay: RetryDelay::Interval
            }
        )));
    }

    #[test]
    fn failed_poll_increments_failures_and_backs_off() {
        let state = ConnectionState::Degraded { failures: 2 };
        let (new_state, actions) = state.on_event(Event::PollFailed {
            error: "timeout".into(),
        });

        assert!(matches!(
            new_state,
            ConnectionState::Degraded { failures: 3 }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SchedulePoll {
                delay: RetryDelay::Backoff { failures: 3 }
            }
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(EngineEvent::PollFailed { attempt: 3, .. })
        )));
    }

    #[test]
    fn degraded_never_reattempts_stream() {
        // StreamOpened is meaningless once degraded; the machine stays put.
        let state = ConnectionState::Degraded { failures: 1 };
        let (new_state, actions) = state.on_event(Event::StreamOpened);

        assert!(matches!(
            new_state,
            ConnectionState::Degraded { failures: 1 }
        ));
        assert!(actions.is_empty());
    }

    #[test]
    fn close_from_open_closes_stream() {
        let state = ConnectionState::Open;
        let (new_state, actions) = state.on_event(Event::CloseRequested);

        assert!(new_state.is_closed());
        assert!(actions.iter().any(|a| matches!(a, Action::CloseStream)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(EngineEvent::Closed))));
    }

    #[test]
    fn close_from_degraded_cancels_poll() {
        let state = ConnectionState::Degraded { failures: 7 };
        let (new_state, actions) = state.on_event(Event::CloseRequested);

        assert!(new_state.is_closed());
        assert!(actions.iter().any(|a| matches!(a, Action::CancelPoll)));
    }

    #[test]
    fn closed_is_terminal() {
        let state = ConnectionState::Closed;
        let (new_state, actions) = state.on_event(Event::PollSucceeded);

        assert!(new_state.is_closed());
        assert!(actions.is_empty());
    }

    #[test]
    fn full_degradation_flow() {
        let state = ConnectionState::new();

        // Stream opens, then dies
        let (state, _) = state.on_event(Event::StreamOpened);
        let (state, _) = state.on_event(Event::StreamFailed {
            error: "reset".into(),
        });
        assert!(state.is_degraded());

        // A poll fails, then one succeeds
        let (state, _) = state.on_event(Event::PollFailed {
            error: "timeout".into(),
        });
        assert!(matches!(state, ConnectionState::Degraded { failures: 1 }));
        let (state, _) = state.on_event(Event::PollSucceeded);
        assert!(matches!(state, ConnectionState::Degraded { failures: 0 }));
    }

    #[test]
    fn backoff_increases_with_failures() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(60);

        let d1 = backoff_delay(base, 1, cap);
        let d3 = backoff_delay(base, 3, cap);

        // Base components: 10s and 40s; jitter adds at most 1s each.
        assert!(d1 >= Duration::from_secs(10));
        assert!(d3 >= Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(60);

        let delay = backoff_delay(base, 20, cap);

        // Max possible: 60s cap + 1s jitter
        assert!(delay <= Duration::from_secs(61));
    }

    #[test]
    fn backoff_jitter_creates_variance() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(60);

        let delays: Vec<Duration> = (0..20).map(|_| backoff_delay(base, 2, cap)).collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();

        // Probabilistic: 20 samples over 1001 jitter values, collision of
        // all of them is vanishingly unlikely.
        assert!(max > min, "expected jitter variance");
    }

    #[test]
    fn state_helpers() {
        assert!(!ConnectionState::Connecting.is_open());
        assert!(ConnectionState::Open.is_open());
        assert!(ConnectionState::Degraded { failures: 0 }.is_degraded());
        assert!(ConnectionState::Closed.is_closed());
    }
}
