//! Merging per-node result sets into one ranked, paginated answer.
//!
//! The merger imposes deterministic output ordering no matter what order the
//! nodes completed in: score ties break by node id, then by the hit's rank
//! within its node's returned list. Failed nodes contribute no hits and are
//! excluded from `total_hits`, but still appear (with their error) in the
//! aggregate's `node_responses`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{AggregateResult, Hit, NodeResponse};

/// How per-node result sets are combined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Best score first. The default.
    #[default]
    ScoreDesc,
    /// Worst score first.
    ScoreAsc,
    /// Nodes in selection order, each node's hits in its own order.
    NodeOrder,
    /// One hit at a time from each node in turn, skipping exhausted nodes.
    RoundRobin,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScoreDesc => "score_desc",
            Self::ScoreAsc => "score_asc",
            Self::NodeOrder => "node_order",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score_desc" => Ok(Self::ScoreDesc),
            "score_asc" => Ok(Self::ScoreAsc),
            "node_order" => Ok(Self::NodeOrder),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// Combine responses (in node selection order) into the aggregate answer.
///
/// `total_hits` sums each successful node's reported total, not the page
/// lengths; `took_ms` is the slowest participant including failed ones, since
/// a node that burned its timeout bounded the fan-in.
pub fn merge(
    responses: Vec<NodeResponse>,
    strategy: MergeStrategy,
    limit: usize,
    offset: usize,
) -> AggregateResult {
    let total_hits: u64 = responses
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.total_hits)
        .sum();
    let took_ms = responses.iter().map(|r| r.took_ms).max().unwrap_or(0);
    let errors: Vec<String> = responses
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.node_id)))
        .collect();

    let hits = match strategy {
        MergeStrategy::ScoreDesc => sorted_hits(&responses, true, limit, offset),
        MergeStrategy::ScoreAsc => sorted_hits(&responses, false, limit, offset),
        MergeStrategy::NodeOrder => paginate(concatenated(&responses), limit, offset),
        MergeStrategy::RoundRobin => paginate(interleaved(&responses), limit, offset),
    };

    AggregateResult {
        total_hits,
        hits,
        took_ms,
        node_responses: responses,
        errors,
    }
}

/// All successful hits tagged with their per-node rank, in node order.
fn ranked<'a>(responses: &'a [NodeResponse]) -> impl Iterator<Item = (&'a Hit, usize)> {
    responses
        .iter()
        .filter(|r| r.is_success())
        .flat_map(|r| r.hits.iter().enumerate().map(|(rank, hit)| (hit, rank)))
}

fn sorted_hits(
    responses: &[NodeResponse],
    descending: bool,
    limit: usize,
    offset: usize,
) -> Vec<Hit> {
    let mut tagged: Vec<(&Hit, usize)> = ranked(responses).collect();
    tagged.sort_by(|(a, a_rank), (b, b_rank)| {
        let by_score = if descending {
            b.score.total_cmp(&a.score)
        } else {
            a.score.total_cmp(&b.score)
        };
        by_score
            .then_with(|| a.node_id.cmp(&b.node_id))
            .then_with(|| a_rank.cmp(b_rank))
    });
    paginate(tagged.into_iter().map(|(hit, _)| hit.clone()).collect(), limit, offset)
}

fn concatenated(responses: &[NodeResponse]) -> Vec<Hit> {
    ranked(responses).map(|(hit, _)| hit.clone()).collect()
}

/// One hit per node per pass, skipping exhausted lists, until all exhausted.
fn interleaved(responses: &[NodeResponse]) -> Vec<Hit> {
    let lists: Vec<&[Hit]> = responses
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.hits.as_slice())
        .collect();
    let total: usize = lists.iter().map(|l| l.len()).sum();
    let mut out = Vec::with_capacity(total);
    let mut depth = 0;
    while out.len() < total {
        for list in &lists {
            if let Some(hit) = list.get(depth) {
                out.push(hit.clone());
            }
        }
        depth += 1;
    }
    out
}

fn paginate(hits: Vec<Hit>, limit: usize, offset: usize) -> Vec<Hit> {
    hits.into_iter().skip(offset).take(limit).collect()
}
