//! Pairing `ActionExecuted` events with decoded calldata actions.
//!
//! Calldata yields an ordered `Action[]` without per-action identifiers, and
//! the events carry only `(actionTreeRoot, actionTagCount)`. Each event takes
//! the first unclaimed decoded action whose logic input count equals its tag
//! count; if none has that count it takes the first unclaimed action.
//!
//! Two actions with equal tag counts in one transaction can be swapped by
//! this rule. Matching on a recomputed action tree root would remove the
//! ambiguity.

use paindex_abi::DecodedAction;

/// For each event tag count (in log order), the index of the decoded action
/// it is paired with, or `None` once all decoded actions are claimed.
pub fn match_actions(tag_counts: &[u64], decoded: &[DecodedAction]) -> Vec<Option<usize>> {
    let mut claimed = vec![false; decoded.len()];
    tag_counts
        .iter()
        .map(|count| {
            let exact = decoded.iter().enumerate().position(|(j, action)| {
                !claimed[j] && action.logic_verifier_inputs.len() as u64 == *count
            });
            let chosen = exact.or_else(|| claimed.iter().position(|c| !c));
            if let Some(j) = chosen {
                claimed[j] = true;
            }
            chosen
        })
        .collect()
}
