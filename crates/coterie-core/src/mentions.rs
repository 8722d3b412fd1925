//! @mention parsing
//!
//! Resolves `@Name` tokens in raw user text against the roster.
//! Matching is case-insensitive and bounded: `@Back` does not match an
//! agent named `Backend`, and when one display name is a prefix of
//! another the longer name wins. `@all` addresses every agent.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::roster::Roster;

static ALL_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@all\b").unwrap_or_else(|e| panic!("invalid @all pattern: {e}"))
});

/// Result of scanning user text for agent mentions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionMatch {
    /// Input with every matched mention token removed, trimmed
    pub clean_text: String,
    /// Matched agent ids in roster order, deduplicated
    pub agent_ids: Vec<String>,
}

/// Whether the byte position after a mention token sits on a word boundary
fn boundary_at(text: &str, end: usize) -> bool {
    match text[end..].chars().next() {
        None => true,
        Some(c) => !c.is_alphanumeric() && c != '_',
    }
}

/// Scan text for `@Name` mentions against the roster
///
/// Returns matched agent ids in roster order and the text with mention
/// tokens stripped. `@all` selects the full roster. Unmatched `@` tokens
/// are left in place; text without mentions comes back unchanged apart
/// from trimming.
#[must_use]
pub fn parse_mentions(text: &str, roster: &Roster) -> MentionMatch {
    if ALL_MENTION.is_match(text) {
        let clean_text = ALL_MENTION.replace_all(text, "").trim().to_string();
        return MentionMatch {
            clean_text,
            agent_ids: roster.ids(),
        };
    }

    // Longest display name first, so "@Backend Lead" is never claimed
    // by an agent named "Backend"
    let mut candidates: Vec<(&str, &str)> = roster
        .iter()
        .map(|agent| (agent.id.as_str(), agent.name.as_str()))
        .collect();
    candidates.sort_by_key(|(_, name)| std::cmp::Reverse(name.len()));

    let mut matched: HashSet<&str> = HashSet::new();
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for (id, name) in candidates {
        let pattern = format!("(?i)@{}", regex::escape(name));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        for m in re.find_iter(text) {
            if !boundary_at(text, m.end()) {
                continue;
            }
            if claimed.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            claimed.push((m.start(), m.end()));
            matched.insert(id);
        }
    }

    let agent_ids: Vec<String> = roster
        .ids()
        .into_iter()
        .filter(|id| matched.contains(id.as_str()))
        .collect();

    claimed.sort_unstable();
    let mut clean_text = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in claimed {
        clean_text.push_str(&text[cursor..start]);
        cursor = end;
        // A stripped token usually sits between spaces; drop one so
        // "a @X b" reads "a b". Interior newlines stay untouched.
        let after_whitespace =
            clean_text.is_empty() || clean_text.ends_with(char::is_whitespace);
        if after_whitespace && text[cursor..].starts_with(' ') {
            cursor += 1;
        }
    }
    clean_text.push_str(&text[cursor..]);

    MentionMatch {
        clean_text: clean_text.trim().to_string(),
        agent_ids,
    }
}
