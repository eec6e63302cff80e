//! Follow-up speaker selection for story mode.
//!
//! After a round of replies lands, previously-silent characters may get a
//! follow-up round: anyone named in the latest reply responds, and when
//! nobody is named a random one or two characters are nudged instead.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::story::types::{Character, Message};

/// Upper bound on the randomized fallback pick.
pub const MAX_FALLBACK_SPEAKERS: usize = 2;

/// Decides which still-silent characters should speak in a follow-up round.
///
/// Scans the most recent reply for each available character's name with a
/// case-insensitive substring match. The naive scan can false-positive on
/// names that are substrings of ordinary words; that only nudges an extra
/// character to speak, so it stays as-is. When nothing matches, falls back
/// to a uniform shuffle taking a random 1–2 prefix. `available` must
/// already exclude everyone who spoke this round; an empty `available`
/// ends the round.
pub fn choose_follow_up_speakers<'a>(
    last_responses: &[Message],
    available: &[&'a Character],
) -> Vec<&'a Character> {
    if available.is_empty() {
        return Vec::new();
    }
    let Some(latest) = last_responses.last() else {
        return Vec::new();
    };

    let haystack = latest.content.to_lowercase();
    let mentioned: Vec<&Character> = available
        .iter()
        .copied()
        .filter(|c| haystack.contains(&c.name.to_lowercase()))
        .collect();
    if !mentioned.is_empty() {
        return mentioned;
    }

    let mut rng = rand::thread_rng();
    let mut pool: Vec<&Character> = available.to_vec();
    pool.shuffle(&mut rng);
    let take = rng.gen_range(1..=MAX_FALLBACK_SPEAKERS).min(pool.len());
    pool.truncate(take);
    pool
}
