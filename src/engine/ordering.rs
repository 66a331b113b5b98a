//! Deterministic processing order.
//!
//! Opportunities: priority (desc), target time (asc), id (asc).
//! Candidates: score delta (desc), |shift| (asc), trip number (asc).

use std::cmp::Ordering;

use crate::models::Minutes;
use crate::windows::AnalyzedOpportunity;

/// Indices of `opportunities` in processing order.
pub fn opportunity_order(opportunities: &[AnalyzedOpportunity]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..opportunities.len()).collect();
    indices.sort_by(|&a, &b| {
        let a = &opportunities[a].opportunity;
        let b = &opportunities[b].opportunity;
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.target_time.cmp(&b.target_time))
            .then_with(|| a.id.cmp(&b.id))
    });
    indices
}

/// A candidate shift with its score change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    /// Shifted trip.
    pub trip_number: u32,
    /// Signed shift.
    pub delta: Minutes,
    /// Score change the shift causes.
    pub score_delta: f64,
}

fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score_delta
        .total_cmp(&a.score_delta)
        .then_with(|| a.delta.abs().cmp(&b.delta.abs()))
        .then_with(|| a.trip_number.cmp(&b.trip_number))
}

/// Sorts candidates best-first.
pub fn rank_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare_candidates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionOpportunity, ConnectionType, ConnectionWindows, Schedule};
    use crate::windows::analyze_opportunities;

    #[test]
    fn test_opportunity_order() {
        let opps = vec![
            ConnectionOpportunity::new("c", ConnectionType::BusRoute, "A", 500).with_priority(3),
            ConnectionOpportunity::new("b", ConnectionType::BusRoute, "A", 480).with_priority(9),
            ConnectionOpportunity::new("a", ConnectionType::BusRoute, "A", 500).with_priority(3),
            ConnectionOpportunity::new("d", ConnectionType::BusRoute, "A", 470).with_priority(3),
        ];
        let analyzed = analyze_opportunities(&Schedule::new("S", "R"), &opps, &ConnectionWindows::new());
        let order: Vec<&str> = opportunity_order(&analyzed)
            .into_iter()
            .map(|i| analyzed[i].opportunity.id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_rank_candidates() {
        let mut c = vec![
            ScoredCandidate { trip_number: 3, delta: 2, score_delta: 1.0 },
            ScoredCandidate { trip_number: 1, delta: -4, score_delta: 2.0 },
            ScoredCandidate { trip_number: 2, delta: -2, score_delta: 1.0 },
            ScoredCandidate { trip_number: 4, delta: 1, score_delta: 1.0 },
        ];
        rank_candidates(&mut c);
        let trips: Vec<u32> = c.iter().map(|x| x.trip_number).collect();
        assert_eq!(trips, vec![1, 4, 2, 3]);
    }
}
