//! Working state of one engine run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    FailureReason, HeadwayDeviation, Minutes, Move, RejectedMove, Schedule, WindowClass,
};

/// How an opportunity was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    /// A serving trip reaches the target class.
    Connected {
        /// Trip making the connection.
        trip_number: u32,
        /// Achieved gap.
        gap: Minutes,
        /// Achieved class.
        class: WindowClass,
    },
    /// The connection is not made.
    Failed(FailureReason),
}

impl Resolution {
    /// Whether the opportunity was made.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Working schedule plus the audit trail of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationState {
    /// Owned working copy of the input schedule.
    pub schedule: Schedule,
    /// Score of the working schedule.
    pub score: f64,
    /// Applied moves, in order.
    pub applied_moves: Vec<Move>,
    /// Candidates that were tried and not applied.
    pub rejected_moves: Vec<RejectedMove>,
    /// Headway deviations of the working schedule.
    pub headway_deviations: Vec<HeadwayDeviation>,
    /// Resolution per opportunity id.
    pub resolutions: BTreeMap<String, Resolution>,
    /// `Σ |delta|` of applied moves.
    pub schedule_shift_used: Minutes,
}

impl OptimizationState {
    /// Fresh state over a copy of `schedule`.
    pub fn new(schedule: Schedule, score: f64) -> Self {
        Self {
            schedule,
            score,
            applied_moves: Vec::new(),
            rejected_moves: Vec::new(),
            headway_deviations: Vec::new(),
            resolutions: BTreeMap::new(),
            schedule_shift_used: 0,
        }
    }

    /// Applies a move and records it.
    pub fn apply(&mut self, mv: Move) {
        self.schedule.apply_shift(mv.trip_number, mv.delta, &mv.loans);
        self.schedule_shift_used += mv.delta.abs();
        self.score += mv.score_delta;
        self.applied_moves.push(mv);
    }

    /// Records a rejected candidate.
    pub fn reject(&mut self, candidate: Move, reason: FailureReason) {
        self.rejected_moves.push(RejectedMove { candidate, reason });
    }

    /// Number of connected opportunities.
    pub fn connections_made(&self) -> usize {
        self.resolutions.values().filter(|r| r.is_connected()).count()
    }

    /// Trips that carry a made connection.
    pub fn protected_trips(&self) -> BTreeSet<u32> {
        self.resolutions
            .values()
            .filter_map(|r| match r {
                Resolution::Connected { trip_number, .. } => Some(*trip_number),
                Resolution::Failed(_) => None,
            })
            .collect()
    }

    /// Re-applies `moves` to `base` one at a time.
    ///
    /// `check` sees the schedule and schedule-wide shift after each move and
    /// may abort the replay with an error.
    pub fn replay<E>(
        base: &Schedule,
        moves: &[Move],
        mut check: impl FnMut(usize, &Schedule, Minutes) -> Result<(), E>,
    ) -> Result<Schedule, E> {
        let mut schedule = base.clone();
        let mut used = 0;
        for (step, mv) in moves.iter().enumerate() {
            schedule.apply_shift(mv.trip_number, mv.delta, &mv.loans);
            used += mv.delta.abs();
            check(step, &schedule, used)?;
        }
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Loan, Trip};

    fn make_schedule() -> Schedule {
        Schedule::new("S", "R")
            .with_trip(Trip::new(1, 1).with_stop("A", 600, 600).with_recovery("A", 5))
            .with_trip(Trip::new(2, 1).with_stop("A", 620, 620).with_recovery("A", 5))
    }

    #[test]
    fn test_apply_records_move() {
        let mut state = OptimizationState::new(make_schedule(), 1.0);
        state.apply(Move::new(2, -3, "C", 0.5));
        assert_eq!(state.schedule_shift_used, 3);
        assert!((state.score - 1.5).abs() < 1e-12);
        assert_eq!(state.schedule.trip(2).unwrap().deviation(), -3);
        assert_eq!(state.applied_moves.len(), 1);
    }

    #[test]
    fn test_protected_trips() {
        let mut state = OptimizationState::new(make_schedule(), 0.0);
        state.resolutions.insert(
            "C1".into(),
            Resolution::Connected { trip_number: 2, gap: 5, class: WindowClass::Ideal },
        );
        state
            .resolutions
            .insert("C2".into(), Resolution::Failed(FailureReason::NotAttempted));
        assert_eq!(state.connections_made(), 1);
        assert_eq!(state.protected_trips().into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_replay_matches_state() {
        let base = make_schedule();
        let mut state = OptimizationState::new(base.clone(), 0.0);
        let mut mv = Move::new(2, 4, "C", 0.0);
        mv.loans.push(Loan::new("A", 2, 1));
        state.apply(mv);
        state.apply(Move::new(1, -2, "D", 0.0));

        let mut steps = Vec::new();
        let replayed = OptimizationState::replay(&base, &state.applied_moves, |step, _, used| {
            steps.push((step, used));
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(replayed, state.schedule);
        assert_eq!(steps, vec![(0, 4), (1, 6)]);
    }

    #[test]
    fn test_replay_aborts_on_error() {
        let base = make_schedule();
        let moves = vec![Move::new(1, 1, "C", 0.0), Move::new(1, 1, "C", 0.0)];
        let err = OptimizationState::replay(&base, &moves, |step, _, _| {
            if step == 1 { Err(step) } else { Ok(()) }
        });
        assert_eq!(err, Err(1));
    }
}
