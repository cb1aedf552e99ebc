//! Confirmation-step totals over the scanned lines.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accumulator::AccumulatedLine;

/// Totals shown before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_scanned: u64,
    /// Scanned units per human-readable position label.
    pub by_position: BTreeMap<String, u64>,
}

/// Recomputed from scratch on every call; line counts per session are small.
pub fn summarize(lines: &[AccumulatedLine]) -> Summary {
    let mut summary = Summary::default();
    for line in lines {
        let qty = u64::from(line.scanned_quantity());
        summary.total_scanned += qty;
        *summary
            .by_position
            .entry(line.position_label().to_string())
            .or_insert(0) += qty;
    }
    summary
}
