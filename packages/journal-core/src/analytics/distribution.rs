//! R-multiple histogram.

use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Bucket edges; buckets are `[edge[i], edge[i+1])` plus two open ends.
const EDGES: [f64; 7] = [-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RBucket {
    pub label: String,
    /// Inclusive lower bound, `None` for the open low end
    pub lower: Option<f64>,
    /// Exclusive upper bound, `None` for the open high end
    pub upper: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RDistribution {
    pub buckets: Vec<RBucket>,
    /// Closed positions left out because their R used the fallback basis
    pub excluded_degenerate: usize,
}

fn empty_buckets() -> Vec<RBucket> {
    let mut buckets = Vec::with_capacity(EDGES.len() + 1);
    buckets.push(RBucket {
        label: format!("<{}", EDGES[0]),
        lower: None,
        upper: Some(EDGES[0]),
        count: 0,
    });
    for pair in EDGES.windows(2) {
        buckets.push(RBucket {
            label: format!("{}..{}", pair[0], pair[1]),
            lower: Some(pair[0]),
            upper: Some(pair[1]),
            count: 0,
        });
    }
    buckets.push(RBucket {
        label: format!(">={}", EDGES[EDGES.len() - 1]),
        lower: Some(EDGES[EDGES.len() - 1]),
        upper: None,
        count: 0,
    });
    buckets
}

fn bucket_index(r: f64) -> usize {
    EDGES.iter().take_while(|edge| r >= **edge).count()
}

impl RDistribution {
    pub fn from_positions(positions: &[&Position]) -> Self {
        let mut buckets = empty_buckets();
        let mut excluded_degenerate = 0;

        for position in positions.iter().filter(|p| p.is_closed()) {
            let Some(r) = position.r_multiple.filter(|r| r.is_finite()) else {
                continue;
            };
            if position.r_multiple_degenerate {
                excluded_degenerate += 1;
                continue;
            }
            buckets[bucket_index(r)].count += 1;
        }

        Self {
            buckets,
            excluded_degenerate,
        }
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }
}
