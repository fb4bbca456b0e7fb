//! Response-selection strategies.
//!
//! Stateless algorithms choosing the next candidate from a route's response
//! pool; all per-request state lives in the responses' usage counters.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::response::RouteResponse;
use crate::collections::IdList;

/// How a route picks the next response from its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Least-used active response, ties broken by definition order.
    Cycle,
    /// Weighted random draw with replacement over active responses.
    Random,
    /// First active response in definition order.
    #[default]
    Greedy,
}

impl SelectionStrategy {
    /// Pick the next response, or `None` when no active response exists.
    pub fn select_response<'a>(
        &self,
        responses: &'a IdList<RouteResponse>,
    ) -> Option<&'a RouteResponse> {
        match self {
            SelectionStrategy::Cycle => Self::select_cycle(responses),
            SelectionStrategy::Random => Self::select_random(responses),
            SelectionStrategy::Greedy => Self::select_greedy(responses),
        }
    }

    /// Round-robin weighted by remaining capacity: the active response with
    /// the fewest uses wins, the strict less-than keeps the first-seen
    /// minimum on ties.
    fn select_cycle(responses: &IdList<RouteResponse>) -> Option<&RouteResponse> {
        let mut candidate: Option<&RouteResponse> = None;
        for response in responses {
            if response.is_active()
                && candidate.is_none_or(|c| response.used_count() < c.used_count())
            {
                candidate = Some(response);
            }
        }
        candidate
    }

    fn select_random(responses: &IdList<RouteResponse>) -> Option<&RouteResponse> {
        let population: Vec<&RouteResponse> =
            responses.iter().filter(|r| r.is_active()).collect();
        population
            .choose_weighted(&mut rand::thread_rng(), |r| r.weight())
            .ok()
            .copied()
    }

    /// Exhausts each response's budget before falling through to the next;
    /// a response without a `repeat` limit is never bypassed.
    fn select_greedy(responses: &IdList<RouteResponse>) -> Option<&RouteResponse> {
        responses.iter().find(|r| r.is_active())
    }
}
