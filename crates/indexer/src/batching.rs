use crate::{MAX_BATCH_TOKENS, MAX_ITEM_TOKENS};

/// Rough token estimate; embedding providers bill ~4 chars per token for
/// code-heavy text.
pub(crate) fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Pack `texts` into sub-batches bounded by both the total and per-item
/// token ceilings. Items over the per-item ceiling are skipped with a
/// warning; providers reject oversized inputs outright.
///
/// Returns groups of indices into `texts`, preserving input order.
pub(crate) fn pack_by_token_budget(texts: &[String]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_tokens = 0usize;

    for (index, text) in texts.iter().enumerate() {
        let tokens = estimate_tokens(text);
        if tokens > MAX_ITEM_TOKENS {
            log::warn!(
                "Skipping oversized embedding input ({tokens} estimated tokens, limit {MAX_ITEM_TOKENS})"
            );
            continue;
        }
        if !current.is_empty() && current_tokens + tokens > MAX_BATCH_TOKENS {
            groups.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(index);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
