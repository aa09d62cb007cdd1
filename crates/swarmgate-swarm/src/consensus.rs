//! Pure consensus functions over a set of parallel agent results.
//!
//! No I/O and no shared state: given the same result set, each protocol
//! returns the same decision.

use crate::types::ConsensusType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One agent's entry in a parallel result set. Failed executions appear
/// with `content = None` so consensus can still proceed over the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelResult {
    pub agent: String,
    /// Vote weight: the agent's declared capability count, minimum 1.
    pub weight: usize,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ParallelResult {
    pub fn is_success(&self) -> bool {
        self.content.is_some()
    }
}

/// Outcome of a consensus computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Consensus {
    /// A winner was selected.
    Decided {
        content: String,
        /// Winning share: votes (or weight) over the whole result set.
        agreement: f64,
        /// The byzantine quorum threshold was met.
        byzantine_safe: bool,
        /// Leader consensus fell back to the first result because the
        /// designated leader produced nothing.
        leader_fallback: bool,
    },
    /// A non-fatal "no decision": the best group fell short of the
    /// required quorum, or no result succeeded at all.
    NoQuorum { votes: usize, required: usize },
}

impl Consensus {
    fn decided(content: String, agreement: f64) -> Self {
        Consensus::Decided {
            content,
            agreement,
            byzantine_safe: false,
            leader_fallback: false,
        }
    }
}

/// Compute consensus of the given type over a result set.
///
/// `leader` names the designated leader agent (the hierarchical queen) and
/// is only consulted for [`ConsensusType::Leader`].
pub fn decide(kind: ConsensusType, results: &[ParallelResult], leader: Option<&str>) -> Consensus {
    match kind {
        ConsensusType::Majority => majority(results),
        ConsensusType::Weighted => weighted(results),
        ConsensusType::Byzantine => byzantine(results),
        ConsensusType::Leader => leader_choice(results, leader),
    }
}

/// Group successful results by exact content equality, preserving first-seen
/// order so ties resolve deterministically.
fn group_by_content(results: &[ParallelResult]) -> Vec<(&str, Vec<&ParallelResult>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&ParallelResult>> = HashMap::new();
    for result in results {
        if let Some(content) = &result.content {
            if !groups.contains_key(content.as_str()) {
                order.push(content);
            }
            groups.entry(content).or_default().push(result);
        }
    }
    order
        .into_iter()
        .map(|content| {
            let members = groups.remove(content).unwrap_or_default();
            (content, members)
        })
        .collect()
}

/// First-seen entry with the strictly largest score.
fn top_group<'a, T>(groups: &'a [(&'a str, T)], score: impl Fn(&T) -> usize) -> Option<&'a (&'a str, T)> {
    groups.iter().fold(None, |best: Option<&(&str, T)>, cur| match best {
        Some(b) if score(&b.1) >= score(&cur.1) => Some(b),
        _ => Some(cur),
    })
}

fn majority(results: &[ParallelResult]) -> Consensus {
    let groups = group_by_content(results);
    let Some((content, members)) = top_group(&groups, |m| m.len()) else {
        return Consensus::NoQuorum {
            votes: 0,
            required: 1,
        };
    };
    Consensus::decided(
        (*content).to_string(),
        members.len() as f64 / results.len() as f64,
    )
}

fn weighted(results: &[ParallelResult]) -> Consensus {
    let total_weight: usize = results.iter().map(|r| r.weight).sum();
    let groups: Vec<(&str, usize)> = group_by_content(results)
        .iter()
        .map(|(content, members)| (*content, members.iter().map(|m| m.weight).sum::<usize>()))
        .collect();
    let Some(&(content, weight)) = top_group(&groups, |w| *w) else {
        return Consensus::NoQuorum {
            votes: 0,
            required: 1,
        };
    };
    Consensus::decided(content.to_string(), weight as f64 / total_weight as f64)
}

/// Byzantine-style quorum: with `n` results tolerate `f = (n-1)/3` faulty
/// participants and require the top group to reach `ceil(2(n-f)/3)` votes.
fn byzantine(results: &[ParallelResult]) -> Consensus {
    let n = results.len();
    if n == 0 {
        return Consensus::NoQuorum {
            votes: 0,
            required: 1,
        };
    }
    let f = (n - 1) / 3;
    let required = (2 * (n - f)).div_ceil(3);

    let groups = group_by_content(results);
    let Some((content, members)) = top_group(&groups, |m| m.len()) else {
        return Consensus::NoQuorum { votes: 0, required };
    };
    if members.len() >= required {
        Consensus::Decided {
            content: (*content).to_string(),
            agreement: members.len() as f64 / n as f64,
            byzantine_safe: true,
            leader_fallback: false,
        }
    } else {
        Consensus::NoQuorum {
            votes: members.len(),
            required,
        }
    }
}

/// Leader consensus: the designated leader's content wins unconditionally
/// when present; otherwise the first successful result is returned flagged
/// as a fallback decision.
fn leader_choice(results: &[ParallelResult], leader: Option<&str>) -> Consensus {
    if let Some(name) = leader {
        if let Some(result) = results
            .iter()
            .find(|r| r.agent == name && r.is_success())
        {
            let content = result.content.clone().unwrap_or_default();
            let agreeing = results
                .iter()
                .filter(|r| r.content.as_deref() == Some(content.as_str()))
                .count();
            return Consensus::Decided {
                content,
                agreement: agreeing as f64 / results.len() as f64,
                byzantine_safe: false,
                leader_fallback: false,
            };
        }
    }
    match results.iter().find(|r| r.is_success()) {
        Some(first) => Consensus::Decided {
            content: first.content.clone().unwrap_or_default(),
            agreement: 1.0 / results.len() as f64,
            byzantine_safe: false,
            leader_fallback: true,
        },
        None => Consensus::NoQuorum {
            votes: 0,
            required: 1,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ok(agent: &str, content: &str) -> ParallelResult {
        ParallelResult {
            agent: agent.to_string(),
            weight: 1,
            content: Some(content.to_string()),
            error: None,
            elapsed_ms: 1,
        }
    }

    fn ok_weighted(agent: &str, content: &str, weight: usize) -> ParallelResult {
        ParallelResult {
            weight,
            ..ok(agent, content)
        }
    }

    fn failed(agent: &str) -> ParallelResult {
        ParallelResult {
            agent: agent.to_string(),
            weight: 1,
            content: None,
            error: Some("boom".to_string()),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_majority_picks_largest_group() {
        let results = vec![ok("a", "x"), ok("b", "x"), ok("c", "y")];
        match decide(ConsensusType::Majority, &results, None) {
            Consensus::Decided {
                content, agreement, ..
            } => {
                assert_eq!(content, "x");
                assert!((agreement - 2.0 / 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_majority_idempotent() {
        let results = vec![ok("a", "x"), ok("b", "y"), ok("c", "x"), failed("d")];
        let first = decide(ConsensusType::Majority, &results, None);
        let second = decide(ConsensusType::Majority, &results, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_majority_counts_failures_in_denominator() {
        let results = vec![ok("a", "x"), failed("b")];
        match decide(ConsensusType::Majority, &results, None) {
            Consensus::Decided { agreement, .. } => assert!((agreement - 0.5).abs() < 1e-9),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_weighted_outvotes_plain_majority() {
        // Two single-weight agents agree, one heavyweight disagrees.
        let results = vec![
            ok_weighted("a", "x", 1),
            ok_weighted("b", "x", 1),
            ok_weighted("c", "y", 5),
        ];
        match decide(ConsensusType::Weighted, &results, None) {
            Consensus::Decided {
                content, agreement, ..
            } => {
                assert_eq!(content, "y");
                assert!((agreement - 5.0 / 7.0).abs() < 1e-9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_byzantine_quorum_met() {
        // n=4 → f=1 → required = ceil(2*3/3) = 2; the 3-vote group passes.
        let results = vec![ok("a", "x"), ok("b", "x"), ok("c", "x"), ok("d", "y")];
        match decide(ConsensusType::Byzantine, &results, None) {
            Consensus::Decided {
                content,
                byzantine_safe,
                ..
            } => {
                assert_eq!(content, "x");
                assert!(byzantine_safe);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_byzantine_no_quorum_is_not_an_error() {
        // n=6 → f=1 → required = ceil(10/3) = 4; best group has 2.
        let results = vec![
            ok("a", "x"),
            ok("b", "x"),
            ok("c", "y"),
            ok("d", "y"),
            ok("e", "z"),
            ok("f", "w"),
        ];
        match decide(ConsensusType::Byzantine, &results, None) {
            Consensus::NoQuorum { votes, required } => {
                assert_eq!(votes, 2);
                assert_eq!(required, 4);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_leader_wins_unconditionally() {
        let results = vec![ok("w1", "x"), ok("w2", "x"), ok("queen", "y")];
        match decide(ConsensusType::Leader, &results, Some("queen")) {
            Consensus::Decided {
                content,
                leader_fallback,
                ..
            } => {
                assert_eq!(content, "y");
                assert!(!leader_fallback);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_leader_absent_falls_back_to_first() {
        let results = vec![ok("w1", "x"), ok("w2", "y")];
        match decide(ConsensusType::Leader, &results, Some("queen")) {
            Consensus::Decided {
                content,
                leader_fallback,
                ..
            } => {
                assert_eq!(content, "x");
                assert!(leader_fallback);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_all_failed_yields_no_quorum() {
        let results = vec![failed("a"), failed("b")];
        assert!(matches!(
            decide(ConsensusType::Majority, &results, None),
            Consensus::NoQuorum { .. }
        ));
        assert!(matches!(
            decide(ConsensusType::Leader, &results, Some("a")),
            Consensus::NoQuorum { .. }
        ));
    }
}
