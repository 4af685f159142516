use crate::{
    batching::PendingStore,
    types::{BatchResult, CallOutcome},
};

const MISSING_OUTCOME: &str = "no result returned for call";

/// Expands a flat batch result back onto every waiting caller.
///
/// Each physical outcome is handed to every hook registered for its identity. Entries the
/// result says nothing about resolve with an error, so every hook of the cycle fires exactly
/// once. Outcomes for identities with no entry are ignored.
///
/// Hooks are taken out of the store as they fire, so expanding the same result twice
/// resolves nothing the second time.
///
/// Returns the number of hooks invoked.
pub fn expand(result: &BatchResult, store: &mut PendingStore) -> usize {
    let identities: Vec<_> = store.identities().copied().collect();
    let mut invoked = 0;

    for identity in identities {
        let Some(entry) = store.entry(&identity) else {
            continue;
        };
        if entry.hooks.is_empty() {
            continue;
        }

        let outcome = result
            .outcome(&entry.call.address, &identity)
            .cloned()
            .unwrap_or_else(|| CallOutcome::Failed(MISSING_OUTCOME.to_string()));

        for hook in store.take_hooks(&identity) {
            hook.resolve(&outcome);
            invoked += 1;
        }
    }

    invoked
}
