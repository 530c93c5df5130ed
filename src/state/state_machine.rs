use thiserror::Error;

/// Lifecycle phases of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Fewer than two players seated; no sessions exist yet.
    Waiting,
    /// Both sessions are live.
    InProgress(PlayState),
    /// Terminal: the match ended and nothing mutates anymore.
    Finished(FinishReason),
}

/// Whether the automatic drop schedule is currently allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// At least one spectator is watching; ticks and commands are processed.
    Running,
    /// Nobody is watching; ticks are suspended and commands rejected.
    Paused,
}

/// Indicates why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// One of the boards overflowed.
    GameOver,
    /// A player left while the match was running.
    Forfeit,
}

/// Events that can be applied to the room state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// The second player took a seat.
    Start {
        /// Whether spectators were already present when the match started.
        watched: bool,
    },
    /// The spectator set became non-empty.
    SpectatorArrived,
    /// The last spectator left.
    SpectatorsGone,
    /// The match ended.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoomEvent,
}

/// State machine implementing the waiting / in progress / finished flow of a room.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    phase: RoomPhase,
    version: usize,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self {
            phase: RoomPhase::Waiting,
            version: 0,
        }
    }
}

impl RoomStateMachine {
    /// Create a new state machine initialised in the waiting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Whether the match is live and unpaused.
    pub fn is_running(&self) -> bool {
        self.phase == RoomPhase::InProgress(PlayState::Running)
    }

    /// Whether the match is live but suspended.
    pub fn is_paused(&self) -> bool {
        self.phase == RoomPhase::InProgress(PlayState::Paused)
    }

    /// Whether the match is live, paused or not.
    pub fn is_in_progress(&self) -> bool {
        matches!(self.phase, RoomPhase::InProgress(_))
    }

    /// Whether the match already ended.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RoomPhase::Finished(_))
    }

    /// Validate and apply an event, returning the new phase.
    pub fn apply(&mut self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (RoomPhase::Waiting, RoomEvent::Start { watched: true }) => {
                RoomPhase::InProgress(PlayState::Running)
            }
            (RoomPhase::Waiting, RoomEvent::Start { watched: false }) => {
                RoomPhase::InProgress(PlayState::Paused)
            }
            (RoomPhase::InProgress(PlayState::Paused), RoomEvent::SpectatorArrived) => {
                RoomPhase::InProgress(PlayState::Running)
            }
            (RoomPhase::InProgress(PlayState::Running), RoomEvent::SpectatorsGone) => {
                RoomPhase::InProgress(PlayState::Paused)
            }
            (RoomPhase::InProgress(_), RoomEvent::Finish(reason)) => RoomPhase::Finished(reason),
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut RoomStateMachine, event: RoomEvent) -> RoomPhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_waiting() {
        let sm = RoomStateMachine::new();
        assert_eq!(sm.phase(), RoomPhase::Waiting);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn unwatched_start_is_paused() {
        let mut sm = RoomStateMachine::new();
        assert_eq!(
            apply(&mut sm, RoomEvent::Start { watched: false }),
            RoomPhase::InProgress(PlayState::Paused)
        );
        assert!(sm.is_paused());
        assert!(!sm.is_running());
    }

    #[test]
    fn full_happy_path_through_match() {
        let mut sm = RoomStateMachine::new();

        assert_eq!(
            apply(&mut sm, RoomEvent::Start { watched: false }),
            RoomPhase::InProgress(PlayState::Paused)
        );
        assert_eq!(
            apply(&mut sm, RoomEvent::SpectatorArrived),
            RoomPhase::InProgress(PlayState::Running)
        );
        assert_eq!(
            apply(&mut sm, RoomEvent::SpectatorsGone),
            RoomPhase::InProgress(PlayState::Paused)
        );
        assert_eq!(
            apply(&mut sm, RoomEvent::SpectatorArrived),
            RoomPhase::InProgress(PlayState::Running)
        );
        assert_eq!(
            apply(&mut sm, RoomEvent::Finish(FinishReason::GameOver)),
            RoomPhase::Finished(FinishReason::GameOver)
        );
        assert!(sm.is_finished());
        assert_eq!(sm.version(), 5);
    }

    #[test]
    fn paused_match_can_still_be_forfeited() {
        let mut sm = RoomStateMachine::new();
        apply(&mut sm, RoomEvent::Start { watched: false });
        assert_eq!(
            apply(&mut sm, RoomEvent::Finish(FinishReason::Forfeit)),
            RoomPhase::Finished(FinishReason::Forfeit)
        );
    }

    #[test]
    fn finished_is_terminal() {
        let mut sm = RoomStateMachine::new();
        apply(&mut sm, RoomEvent::Start { watched: true });
        apply(&mut sm, RoomEvent::Finish(FinishReason::GameOver));

        for event in [
            RoomEvent::Start { watched: true },
            RoomEvent::SpectatorArrived,
            RoomEvent::SpectatorsGone,
            RoomEvent::Finish(FinishReason::Forfeit),
        ] {
            let err = sm.apply(event).unwrap_err();
            assert_eq!(err.from, RoomPhase::Finished(FinishReason::GameOver));
            assert_eq!(err.event, event);
        }
    }

    #[test]
    fn invalid_transition_leaves_phase_untouched() {
        let mut sm = RoomStateMachine::new();
        let err = sm.apply(RoomEvent::SpectatorArrived).unwrap_err();
        assert_eq!(err.from, RoomPhase::Waiting);
        assert_eq!(sm.phase(), RoomPhase::Waiting);
        assert_eq!(sm.version(), 0);
    }
}
