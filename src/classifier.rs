// =============================================================================
// classifier.rs — THE RELEVANCE ORACLE
// =============================================================================
//
// This module answers the only editorial question the monitor ever asks:
// "is this movement a legally significant event, or just the docket
// clearing its throat?" The answer comes from a fixed six-word vocabulary,
// matched case-insensitively and diacritic-insensitively, because court
// clerks type SENTENÇA, Sentenca, and sentença with equal conviction.
//
// Machinery, in order of engagement:
//
// 1. Diacritic folding + lowercasing, so "Decisão" and "DECISAO" land on
//    the same bytes.
// 2. A memchr SIMD pre-filter — if none of the keyword stems appear,
//    the movement is generic and we never start the automaton.
// 3. An Aho-Corasick automaton that matches all six keywords in a single
//    pass. Antivirus-grade technology, deployed against despachos.
//
// One structural quirk to respect: the type is the FIRST matching keyword
// in vocabulary order, and relevance is "any keyword matched". Both checks
// walk the same list, so a movement typed `Andamento` is by definition
// not relevant. Downstream code leans on that.
// =============================================================================

use aho_corasick::AhoCorasick;
use std::sync::LazyLock;

use crate::models::MovementType;

/// The relevance vocabulary, in priority order. The first entry whose
/// keyword appears in the (normalized) text names the movement type.
///
/// Note the shadowing: "decisao" is a prefix of "decisao interlocutoria",
/// and "decisao" outranks it, so the interlocutória variant can only be
/// assigned through vocabulary reordering. Long-standing behavior; keep
/// the entry and the order as-is.
const VOCABULARY: &[(&str, MovementType)] = &[
    ("sentenca", MovementType::Sentenca),
    ("decisao", MovementType::Decisao),
    ("decisao interlocutoria", MovementType::DecisaoInterlocutoria),
    ("despacho", MovementType::Despacho),
    ("publicacao", MovementType::Publicacao),
    ("intimacao", MovementType::Intimacao),
];

/// The automaton over the normalized vocabulary. Built once, used forever.
/// Pattern ids line up with VOCABULARY indices, which is exactly what the
/// priority rule needs.
static VOCABULARY_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(VOCABULARY.iter().map(|(kw, _)| *kw))
        .expect("vocabulary automaton must build — the keywords are fixed literals")
});

/// What the oracle says about one movement's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub movement_type: MovementType,
    pub is_relevant: bool,
}

/// Classify a movement's free text.
///
/// Returns the first matching keyword's type (vocabulary order) and
/// whether anything matched at all. No match means
/// (`Andamento`, not relevant) — always both, never one.
pub fn classify(text: &str) -> Classification {
    let normalized = normalize(text);

    // The "should I even bother?" check. If none of the keyword stems are
    // present, the automaton has nothing to find.
    if !quick_keyword_check(&normalized) {
        return Classification {
            movement_type: MovementType::Andamento,
            is_relevant: false,
        };
    }

    // Single pass over the text, all keywords at once. We keep the lowest
    // pattern id seen: pattern ids are vocabulary indices, so lowest id
    // equals highest priority.
    let best = VOCABULARY_AUTOMATON
        .find_iter(&normalized)
        .map(|m| m.pattern().as_usize())
        .min();

    match best {
        Some(idx) => Classification {
            movement_type: VOCABULARY[idx].1,
            is_relevant: true,
        },
        None => Classification {
            movement_type: MovementType::Andamento,
            is_relevant: false,
        },
    }
}

/// Lowercase and fold diacritics down to ASCII. Covers the Latin-1 range
/// Brazilian court text actually uses; anything more exotic passes through
/// unchanged and simply won't match the vocabulary.
fn normalize(text: &str) -> String {
    text.to_lowercase().chars().map(fold_diacritic).collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// SIMD-accelerated pre-filter over already-normalized text. The stems
/// below cover every vocabulary entry; if none appear, a full scan cannot
/// match either.
fn quick_keyword_check(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    memchr::memmem::find(bytes, b"sentenc").is_some()
        || memchr::memmem::find(bytes, b"decis").is_some()
        || memchr::memmem::find(bytes, b"despach").is_some()
        || memchr::memmem::find(bytes, b"publicac").is_some()
        || memchr::memmem::find(bytes, b"intimac").is_some()
}
