//! Merging candidates retrieved for several query variants
//!
//! Variants are visited in order (original query first), and candidates within
//! a variant in the order the retriever returned them. For each document id
//! the lowest distance wins; an equal distance never replaces the candidate
//! seen first.

use crate::candidate::{Candidate, CandidateSet};

/// Merge per-variant candidate lists into one [`CandidateSet`].
///
/// Pure and total: any input, including no variants at all, produces a set.
#[must_use]
pub fn merge<V>(per_variant: V) -> CandidateSet
where
    V: IntoIterator,
    V::Item: IntoIterator<Item = Candidate>,
{
    per_variant.into_iter().flatten().collect()
}
