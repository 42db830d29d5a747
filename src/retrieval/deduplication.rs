//! Result deduplication by evidence ID

use ahash::AHashMap;

use crate::types::RetrievalResult;

/// Deduplicate results by evidence id, keeping the highest fused score
///
/// First-seen order is kept for surviving entries; ranking happens afterwards.
pub fn deduplicate_results(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut positions: AHashMap<_, usize> = AHashMap::with_capacity(results.len());
    let mut kept: Vec<RetrievalResult> = Vec::with_capacity(results.len());

    for result in results {
        match positions.get(&result.evidence_id) {
            Some(&pos) => {
                if result.fused_score > kept[pos].fused_score {
                    kept[pos] = result;
                }
            }
            None => {
                positions.insert(result.evidence_id.clone(), kept.len());
                kept.push(result);
            }
        }
    }

    kept
}
