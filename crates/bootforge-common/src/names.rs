//! Placeholder display names for freshly seen nodes.
//!
//! Operators rename nodes through the management API; until then a node
//! needs something friendlier than its raw client identifier. The name is
//! derived only from the identifier, so the same node always gets the same
//! placeholder no matter which listener saw it first.

const ADJECTIVES: [&str; 24] = [
    "amber", "ashen", "bold", "brisk", "calm", "cedar", "clear", "copper",
    "dusky", "eager", "frost", "gilded", "hazel", "iron", "keen", "lively",
    "mellow", "noble", "quiet", "rapid", "slate", "steady", "tidal", "vivid",
];

const BIRDS: [&str; 24] = [
    "auk", "bittern", "crane", "dunlin", "egret", "falcon", "gannet", "heron",
    "ibis", "jackdaw", "kite", "lapwing", "merlin", "nightjar", "osprey",
    "petrel", "quail", "raven", "shrike", "tern", "veery", "wagtail",
    "whimbrel", "wren",
];

/// Generate the placeholder display name for a node identifier.
///
/// Two words picked by hashing the identifier, plus a short fragment of the
/// identifier itself so adjacent nodes stay tell-apart-able even on a word
/// collision.
pub fn placeholder_name(id: &str) -> String {
    let hash = fnv1a(id.as_bytes());
    let adjective = ADJECTIVES[(hash >> 32) as usize % ADJECTIVES.len()];
    let bird = BIRDS[(hash >> 16) as usize % BIRDS.len()];

    let fragment: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect();

    if fragment.is_empty() {
        format!("{}-{}", adjective, bird)
    } else {
        format!("{}-{}-{}", adjective, bird, fragment.to_ascii_lowercase())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
