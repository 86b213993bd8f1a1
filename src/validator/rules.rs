//! Individual validation passes. Each pass appends every violation it finds.

use std::collections::{HashMap, HashSet};

use super::scanner::{Scan, Token, TokenKind};
use super::Violation;
use crate::domain::TargetLanguage;

/// Delimiter families crossing each other, e.g. `@icon$`.
/// Fragments already present in the source were not introduced by translation.
pub(super) fn crossed_delimiters(source: &Scan<'_>, candidate: &Scan<'_>, out: &mut Vec<Violation>) {
    let inherited: HashSet<&str> = source.crossings().into_iter().collect();
    for fragment in candidate.crossings() {
        if !inherited.contains(fragment) {
            out.push(Violation::CrossedDelimiters {
                fragment: fragment.to_string(),
            });
        }
    }
}

/// `[`/`]` counts must balance the same way they do in the source.
/// Returns false when unbalanced, which disables the finer bracket-token pass.
pub(super) fn bracket_balance(source: &Scan<'_>, candidate: &Scan<'_>, out: &mut Vec<Violation>) -> bool {
    if candidate.bracket_surplus() == source.bracket_surplus() {
        return true;
    }
    out.push(Violation::UnbalancedBrackets {
        open: candidate.open_brackets,
        close: candidate.close_brackets,
    });
    false
}

/// Apologetic or meta phrases a chat-style translator likes to prepend.
pub(super) fn boilerplate(
    source: &str,
    candidate: &str,
    phrases: &[String],
    exceptions: &[String],
    out: &mut Vec<Violation>,
) {
    let source_lc = source.to_lowercase();
    let cand_lc = candidate.to_lowercase();
    let exception_spans: Vec<(usize, usize)> = exceptions
        .iter()
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
        .flat_map(|e| {
            let len = e.len();
            cand_lc
                .match_indices(e.as_str())
                .map(move |(at, _)| (at, at + len))
                .collect::<Vec<_>>()
        })
        .collect();

    for phrase in phrases {
        let phrase_lc = phrase.to_lowercase();
        if phrase_lc.is_empty() || source_lc.contains(&phrase_lc) {
            continue;
        }
        let unexcused = cand_lc.match_indices(phrase_lc.as_str()).any(|(at, _)| {
            let end = at + phrase_lc.len();
            !exception_spans.iter().any(|&(s, e)| s <= at && end <= e)
        });
        if unexcused {
            out.push(Violation::Boilerplate {
                phrase: phrase.clone(),
            });
        }
    }
}

/// `snake_case` identifiers from the source must survive verbatim, unless every
/// occurrence sits inside a quoted literal of a bracket call.
pub(super) fn identifiers(source: &Scan<'_>, candidate: &str, out: &mut Vec<Violation>) {
    let mut required: Vec<&str> = Vec::new();
    for (pos, ident) in snake_identifiers(source.text) {
        if !source.in_literal(pos) && !required.contains(&ident) {
            required.push(ident);
        }
    }
    for ident in required {
        if !candidate.contains(ident) {
            out.push(Violation::MissingIdentifier {
                identifier: ident.to_string(),
            });
        }
    }
}

/// Bracket calls must keep their structure; only literal contents may change.
/// Gender helper calls may be dropped entirely.
pub(super) fn bracket_tokens(
    source: &Scan<'_>,
    candidate: &Scan<'_>,
    target: TargetLanguage,
    out: &mut Vec<Violation>,
) {
    let mut available: HashMap<String, usize> = HashMap::new();
    for token in candidate.tokens_of(TokenKind::Bracket) {
        *available.entry(shape(token)).or_default() += 1;
    }

    for token in source.tokens_of(TokenKind::Bracket) {
        let key = shape(token);
        match available.get_mut(&key) {
            Some(count) if *count > 0 => *count -= 1,
            _ if is_gender_helper(token.text) => {}
            _ => out.push(Violation::MissingGameToken {
                token: token.text.to_string(),
            }),
        }
    }

    for token in candidate.tokens_of(TokenKind::Bracket) {
        let translated = token.text.char_indices().any(|(offset, c)| {
            let pos = token.span.start + offset;
            target.is_script_char(c) && !token.literals.iter().any(|r| r.contains(&pos))
        });
        if translated {
            out.push(Violation::TranslatedGameToken {
                token: token.text.to_string(),
            });
        }
    }
}

/// `$var$`, `£icon£`, `@icon!` and `<var>` tokens must all be kept.
pub(super) fn template_tokens(source: &Scan<'_>, candidate: &Scan<'_>, out: &mut Vec<Violation>) {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for token in candidate
        .tokens
        .iter()
        .filter(|t| t.kind.is_template() && t.kind != TokenKind::Bracket)
    {
        *available.entry(token.text).or_default() += 1;
    }
    for token in source
        .tokens
        .iter()
        .filter(|t| t.kind.is_template() && t.kind != TokenKind::Bracket)
    {
        match available.get_mut(token.text) {
            Some(count) if *count > 0 => *count -= 1,
            _ => out.push(Violation::MissingTemplateToken {
                token: token.text.to_string(),
            }),
        }
    }
}

/// Style keywords (`#bold`) stay in the source script. A single trailing
/// non-ASCII character is accepted as a grammatical particle.
pub(super) fn style_keywords(
    source: &Scan<'_>,
    candidate: &Scan<'_>,
    target: TargetLanguage,
    out: &mut Vec<Violation>,
) {
    let wanted: HashSet<&str> = source
        .tokens_of(TokenKind::StyleOpen)
        .filter_map(Token::keyword)
        .collect();
    let mut kept: HashSet<&str> = HashSet::new();
    let mut translated = false;

    for keyword in candidate.tokens_of(TokenKind::StyleOpen).filter_map(Token::keyword) {
        if wanted.contains(keyword) {
            kept.insert(keyword);
            continue;
        }
        if let Some((idx, last)) = keyword.char_indices().last() {
            let stem = &keyword[..idx];
            if !last.is_ascii() && wanted.contains(stem) {
                kept.insert(stem);
                continue;
            }
        }
        if target.contains_script(keyword) {
            translated = true;
            out.push(Violation::TranslatedStyleKeyword {
                keyword: keyword.to_string(),
            });
        }
    }

    if translated {
        return;
    }
    let mut missing: Vec<&str> = wanted.difference(&kept).copied().collect();
    missing.sort_unstable();
    for keyword in missing {
        out.push(Violation::MissingStyleKeyword {
            keyword: keyword.to_string(),
        });
    }
}

/// A candidate identical to a source that has real prose was not translated.
pub(super) fn untranslated(source: &Scan<'_>, candidate: &str, out: &mut Vec<Violation>) {
    if source.text.trim() != candidate.trim() {
        return;
    }
    let free = source.free_text();
    let has_word = free
        .split(|c: char| !c.is_ascii_alphabetic())
        .any(|w| w.len() >= 3);
    if has_word {
        out.push(Violation::Untranslated);
    }
}

/// Structural shape of a bracket token: whitespace and quote escapes outside
/// literals removed, literal contents replaced by nothing (the quote characters stay).
fn shape(token: &Token<'_>) -> String {
    let mut out = String::with_capacity(token.text.len());
    for (offset, c) in token.text.char_indices() {
        let pos = token.span.start + offset;
        if token.literals.iter().any(|r| r.contains(&pos)) {
            continue;
        }
        if !c.is_whitespace() && c != '\\' {
            out.push(c);
        }
    }
    out
}

/// Byte position and text of every lowercase `snake_case` identifier
/// with at least two segments.
pub(crate) fn snake_identifiers(text: &str) -> Vec<(usize, &str)> {
    let mut found = Vec::new();
    let mut start: Option<usize> = None;
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    for (pos, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (start, is_word(c)) {
            (None, true) => start = Some(pos),
            (Some(s), false) => {
                let word = &text[s..pos];
                if is_snake_case(word) {
                    found.push((s, word));
                }
                start = None;
            }
            _ => {}
        }
    }
    found
}

fn is_snake_case(word: &str) -> bool {
    let mut segments = word.split('_');
    let Some(first) = segments.next() else {
        return false;
    };
    if !first.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    let mut count = 1;
    for seg in segments {
        if seg.is_empty() {
            return false;
        }
        count += 1;
    }
    count >= 2
        && word
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

const GENDER_WORDS: [&str; 26] = [
    "Herself", "Himself", "Daughter", "Brother", "Husband", "Mother", "Father", "Sister",
    "Female", "Woman", "Queen", "Hers", "Lady", "Lord", "King", "Male", "Girl", "Wife", "Son",
    "Boy", "Man", "Her", "His", "Him", "She", "He",
];

/// `[Root.GetHerHis]`, `[CHARACTER.GetSheHe|U]`, `[GetWomanManCap]` and friends.
pub(crate) fn is_gender_helper(token_text: &str) -> bool {
    let inner = token_text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(token_text);
    let call = inner.split('|').next().unwrap_or(inner);
    let last = call.rsplit('.').next().unwrap_or(call);
    let name = last.split('(').next().unwrap_or(last).trim();
    let Some(rest) = name.strip_prefix("Get") else {
        return false;
    };
    let rest = rest.strip_suffix("Cap").unwrap_or(rest);
    gender_words(rest) >= 2
}

/// Number of gender words `s` splits into exactly, or 0 if it does not.
fn gender_words(s: &str) -> usize {
    if s.is_empty() {
        return 0;
    }
    for word in GENDER_WORDS {
        if let Some(rest) = s.strip_prefix(word) {
            if rest.is_empty() {
                return 1;
            }
            let n = gender_words(rest);
            if n > 0 {
                return n + 1;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_identifiers() {
        let found: Vec<&str> = snake_identifiers("Set mod_name and my_var_2 but not Foo_bar or solo")
            .into_iter()
            .map(|(_, w)| w)
            .collect();
        assert_eq!(found, vec!["mod_name", "my_var_2"]);
    }

    #[test]
    fn test_snake_identifier_next_to_hangul() {
        let found = snake_identifiers("값은 my_var입니다");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, "my_var");
    }

    #[test]
    fn test_gender_helpers() {
        assert!(is_gender_helper("[Root.GetHerHis]"));
        assert!(is_gender_helper("[CHARACTER.GetSheHe|U]"));
        assert!(is_gender_helper("[GetWomanManCap]"));
        assert!(is_gender_helper("[ROOT.Char.GetDaughterSon]"));
        assert!(!is_gender_helper("[GetName]"));
        assert!(!is_gender_helper("[GetHer]"));
        assert!(!is_gender_helper("[Root.GetHeroName]"));
    }

    #[test]
    fn test_shape_ignores_literal_text_and_spaces() {
        let a = super::super::scanner::scan("[Concatenate(' or ', GetName)]");
        let b = super::super::scanner::scan("[Concatenate(' 혹은 ',GetName)]");
        assert_eq!(shape(&a.tokens[0]), shape(&b.tokens[0]));
        assert_eq!(shape(&a.tokens[0]), "[Concatenate('',GetName)]");
    }

    #[test]
    fn test_shape_same_for_escaped_and_bare_quotes() {
        let escaped = super::super::scanner::scan(r#"[Concatenate(\" or \", GetName)]"#);
        let bare = super::super::scanner::scan(r#"[Concatenate(" 또는 ", GetName)]"#);
        assert_eq!(shape(&escaped.tokens[0]), shape(&bare.tokens[0]));
        assert_eq!(shape(&bare.tokens[0]), r#"[Concatenate("",GetName)]"#);
    }
}
