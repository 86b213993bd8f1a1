//! Single-pass scanner for the localisation template language.
//!
//! Recognised forms:
//! - `$name$`, `$@name$`, `$name|Y$` (dollar variables)
//! - `£name£` (pound icons)
//! - `@name@`, `@name!` (at icons; names may contain `:`)
//! - `<name>` (angle variables)
//! - `[Scope.Func('literal', Other).Method]` (bracket calls, nestable)
//! - `#keyword ... #!` (text styles) and `§Y ... §!` (colour codes)
//!
//! Quoted literals are only recognised inside brackets; outside them `'` is an apostrophe.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Dollar,
    Pound,
    At,
    Angle,
    Bracket,
    StyleOpen,
    StyleClose,
    ColorOpen,
    ColorClose,
}

impl TokenKind {
    /// Tokens that must come through translation untouched.
    pub fn is_template(self) -> bool {
        matches!(
            self,
            TokenKind::Dollar | TokenKind::Pound | TokenKind::At | TokenKind::Angle | TokenKind::Bracket
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Byte span in the scanned text.
    pub span: Range<usize>,
    pub text: &'a str,
    /// Byte spans of quoted literal contents (quotes excluded). Bracket tokens only.
    pub literals: Vec<Range<usize>>,
}

impl Token<'_> {
    /// Style keyword without the leading `#`.
    pub fn keyword(&self) -> Option<&str> {
        match self.kind {
            TokenKind::StyleOpen => self.text.strip_prefix('#'),
            _ => None,
        }
    }

    /// Overlaps `span` or shares a boundary with it.
    fn touches(&self, span: &Range<usize>) -> bool {
        span.start <= self.span.end && self.span.start <= span.end
    }
}

/// The five delimiter families that must never be mixed inside one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Dollar,
    Pound,
    At,
    Bracket,
    Angle,
}

impl Family {
    /// Characters a name may contain after this family's opener.
    fn is_name_char(self, c: char) -> bool {
        match self {
            Family::Dollar => c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | ' ' | '.' | ':' | '-' | '\'' | '|'),
            Family::Pound => c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '|'),
            Family::At => c.is_ascii_alphanumeric() || matches!(c, '_' | ':'),
            Family::Bracket | Family::Angle => c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'),
        }
    }

    fn is_valid_name(self, name: &str) -> bool {
        match self {
            Family::Dollar => is_dollar_name(name),
            _ => !name.is_empty(),
        }
    }
}

fn opener_family(c: char) -> Option<Family> {
    match c {
        '$' => Some(Family::Dollar),
        '£' => Some(Family::Pound),
        '@' => Some(Family::At),
        '[' => Some(Family::Bracket),
        '<' => Some(Family::Angle),
        _ => None,
    }
}

fn closer_family(c: char) -> Option<Family> {
    match c {
        '$' => Some(Family::Dollar),
        '£' => Some(Family::Pound),
        '@' | '!' => Some(Family::At),
        ']' => Some(Family::Bracket),
        '>' => Some(Family::Angle),
        _ => None,
    }
}

/// Result of scanning one string.
#[derive(Debug, Clone)]
pub struct Scan<'a> {
    pub text: &'a str,
    pub tokens: Vec<Token<'a>>,
    pub open_brackets: usize,
    pub close_brackets: usize,
}

impl<'a> Scan<'a> {
    pub fn tokens_of(&self, kind: TokenKind) -> impl Iterator<Item = &Token<'a>> {
        self.tokens.iter().filter(move |t| t.kind == kind)
    }

    pub fn literals(&self) -> impl Iterator<Item = &Range<usize>> {
        self.tokens.iter().flat_map(|t| t.literals.iter())
    }

    /// True if byte `pos` lies inside a quoted literal.
    pub fn in_literal(&self, pos: usize) -> bool {
        self.literals().any(|r| r.contains(&pos))
    }

    /// Surplus of `[` over `]` (negative when `]` dominates).
    pub fn bracket_surplus(&self) -> i64 {
        self.open_brackets as i64 - self.close_brackets as i64
    }

    /// Text with every recognised token cut out.
    pub fn free_text(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for token in &self.tokens {
            out.push_str(&self.text[cursor..token.span.start]);
            cursor = token.span.end;
        }
        out.push_str(&self.text[cursor..]);
        out
    }

    /// Fragments where one delimiter family opens and another closes,
    /// e.g. `@icon$` or `$my var@`. Names follow the opener's own grammar.
    /// Matches overlapping or abutting a well-formed token (the `@var$` inside
    /// `$@var$`) or lying inside a literal are not reported.
    pub fn crossings(&self) -> Vec<&'a str> {
        let chars: Vec<(usize, char)> = self.text.char_indices().collect();
        let byte_at = |i: usize| chars.get(i).map_or(self.text.len(), |&(b, _)| b);
        let mut found = Vec::new();
        // Openers inside an already reported fragment are not scanned again.
        let mut covered_until = 0;

        for i in 0..chars.len() {
            if i < covered_until {
                continue;
            }
            let Some(open) = opener_family(chars[i].1) else {
                continue;
            };
            let mut j = i + 1;
            let mut end = None;
            while let Some(&(_, c)) = chars.get(j) {
                if j > i + 1 {
                    if let Some(close) = closer_family(c) {
                        if close != open {
                            end = Some(j);
                        }
                        break;
                    }
                }
                if !open.is_name_char(c) {
                    break;
                }
                j += 1;
            }
            let Some(j) = end else {
                continue;
            };
            let name = &self.text[byte_at(i + 1)..byte_at(j)];
            if !open.is_valid_name(name) {
                continue;
            }
            let span = byte_at(i)..byte_at(j + 1);
            if self.in_literal(span.start) || self.tokens.iter().any(|t| t.touches(&span)) {
                continue;
            }
            found.push(&self.text[span]);
            covered_until = j + 1;
        }
        found
    }
}

/// Scan `text` left to right, collecting tokens and bracket counts.
pub fn scan(text: &str) -> Scan<'_> {
    let scanner = Scanner::new(text);
    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = scanner.char_at(i) {
        let matched = match c {
            '[' => scanner.bracket(i),
            '$' => scanner.delimited(i, '$', TokenKind::Dollar, is_dollar_name),
            '£' => scanner.delimited(i, '£', TokenKind::Pound, is_pound_name),
            '@' => scanner.at_icon(i),
            '<' => scanner.angle(i),
            '#' => scanner.style(i),
            '§' => scanner.color(i),
            _ => None,
        };
        match matched {
            Some((token, next)) => {
                tokens.push(token);
                i = next;
            }
            None => i += 1,
        }
    }

    Scan {
        text,
        tokens,
        open_brackets: text.matches('[').count(),
        close_brackets: text.matches(']').count(),
    }
}

/// True if `text` has anything besides template tokens, whitespace and punctuation.
pub fn has_free_text(text: &str) -> bool {
    scan(text).free_text().chars().any(char::is_alphanumeric)
}

struct Scanner<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
}

/// An open quoted literal inside a bracket call.
#[derive(Debug, Clone, Copy)]
struct Quote {
    ch: char,
    /// Char index of the first content character.
    content_start: usize,
    /// Opened by `\"` rather than a bare quote.
    escaped: bool,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
        }
    }

    fn char_at(&self, i: usize) -> Option<char> {
        self.chars.get(i).map(|&(_, c)| c)
    }

    fn byte_at(&self, i: usize) -> usize {
        self.chars.get(i).map_or(self.text.len(), |&(b, _)| b)
    }

    /// Token covering chars `start..=end`; returns it with the index after it.
    fn token(&self, kind: TokenKind, start: usize, end: usize, literals: Vec<Range<usize>>) -> (Token<'a>, usize) {
        let span = self.byte_at(start)..self.byte_at(end + 1);
        let text = &self.text[span.clone()];
        (
            Token {
                kind,
                span,
                text,
                literals,
            },
            end + 1,
        )
    }

    fn bracket(&self, start: usize) -> Option<(Token<'a>, usize)> {
        let mut depth = 0usize;
        let mut quote: Option<Quote> = None;
        let mut literals = Vec::new();
        let mut j = start;

        while let Some(c) = self.char_at(j) {
            if let Some(q) = quote {
                if c == '\\' {
                    // Stored text escapes `"` as `\"`, so such a literal closes on `\"`.
                    if q.escaped && self.char_at(j + 1) == Some(q.ch) {
                        literals.push(self.byte_at(q.content_start)..self.byte_at(j));
                        quote = None;
                    }
                    j += 2;
                    continue;
                }
                if !q.escaped && c == q.ch {
                    literals.push(self.byte_at(q.content_start)..self.byte_at(j));
                    quote = None;
                }
            } else {
                match c {
                    '\\' if depth > 0 && matches!(self.char_at(j + 1), Some('\'' | '"')) => {
                        quote = Some(Quote {
                            ch: self.char_at(j + 1).unwrap_or('"'),
                            content_start: j + 2,
                            escaped: true,
                        });
                        j += 2;
                        continue;
                    }
                    '\'' | '"' if depth > 0 => {
                        quote = Some(Quote {
                            ch: c,
                            content_start: j + 1,
                            escaped: false,
                        })
                    }
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(self.token(TokenKind::Bracket, start, j, literals));
                        }
                    }
                    '\n' => return None,
                    _ => {}
                }
            }
            j += 1;
        }
        None
    }

    fn delimited(
        &self,
        start: usize,
        delim: char,
        kind: TokenKind,
        valid_name: fn(&str) -> bool,
    ) -> Option<(Token<'a>, usize)> {
        let mut j = start + 1;
        loop {
            match self.char_at(j)? {
                '\n' => return None,
                c if c == delim => break,
                _ => j += 1,
            }
        }
        let name = &self.text[self.byte_at(start + 1)..self.byte_at(j)];
        valid_name(name).then(|| self.token(kind, start, j, Vec::new()))
    }

    fn at_icon(&self, start: usize) -> Option<(Token<'a>, usize)> {
        let mut j = start + 1;
        while self
            .char_at(j)
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        {
            j += 1;
        }
        if j == start + 1 {
            return None;
        }
        matches!(self.char_at(j), Some('@') | Some('!'))
            .then(|| self.token(TokenKind::At, start, j, Vec::new()))
    }

    fn angle(&self, start: usize) -> Option<(Token<'a>, usize)> {
        let mut j = start + 1;
        while self
            .char_at(j)
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'))
        {
            j += 1;
        }
        (j > start + 1 && self.char_at(j) == Some('>'))
            .then(|| self.token(TokenKind::Angle, start, j, Vec::new()))
    }

    fn style(&self, start: usize) -> Option<(Token<'a>, usize)> {
        match self.char_at(start + 1)? {
            '!' => Some(self.token(TokenKind::StyleClose, start, start + 1, Vec::new())),
            c if c.is_whitespace() || is_style_stop(c) => None,
            _ => {
                let mut j = start + 1;
                while self
                    .char_at(j)
                    .is_some_and(|c| !c.is_whitespace() && !is_style_stop(c))
                {
                    j += 1;
                }
                Some(self.token(TokenKind::StyleOpen, start, j - 1, Vec::new()))
            }
        }
    }

    fn color(&self, start: usize) -> Option<(Token<'a>, usize)> {
        match self.char_at(start + 1)? {
            '!' => Some(self.token(TokenKind::ColorClose, start, start + 1, Vec::new())),
            c if c.is_ascii_alphanumeric() => {
                Some(self.token(TokenKind::ColorOpen, start, start + 1, Vec::new()))
            }
            _ => None,
        }
    }
}

fn is_style_stop(c: char) -> bool {
    matches!(c, '#' | '$' | '[' | ']' | '§' | '£' | '@' | '"')
}

fn is_dollar_name(name: &str) -> bool {
    let (head, format) = match name.split_once('|') {
        Some((head, format)) => (head, Some(format)),
        None => (name, None),
    };
    let Some(first) = head.chars().next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '@') || head.ends_with(' ') {
        return false;
    }
    let head_ok = head
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | ' ' | '.' | ':' | '-' | '\''));
    head_ok && format.map_or(true, |f| !f.contains(char::is_whitespace))
}

fn is_pound_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '|'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, &str)> {
        scan(text).tokens.iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn test_dollar_variants() {
        assert_eq!(
            kinds("Gain $VALUE|Y$ and $@var$ from $my var$"),
            vec![
                (TokenKind::Dollar, "$VALUE|Y$"),
                (TokenKind::Dollar, "$@var$"),
                (TokenKind::Dollar, "$my var$"),
            ]
        );
    }

    #[test]
    fn test_prices_are_not_variables() {
        assert!(kinds("Costs $5 and $10 total").is_empty());
    }

    #[test]
    fn test_icons_and_angles() {
        assert_eq!(
            kinds("£energy£ @gold! @mod:icon@ <country_name>"),
            vec![
                (TokenKind::Pound, "£energy£"),
                (TokenKind::At, "@gold!"),
                (TokenKind::At, "@mod:icon@"),
                (TokenKind::Angle, "<country_name>"),
            ]
        );
    }

    #[test]
    fn test_nested_bracket_with_literals() {
        let text = "[Concatenate(' or ', [GetName])] rest";
        let s = scan(text);
        assert_eq!(s.tokens.len(), 1);
        let token = &s.tokens[0];
        assert_eq!(token.kind, TokenKind::Bracket);
        assert_eq!(token.text, "[Concatenate(' or ', [GetName])]");
        assert_eq!(token.literals.len(), 1);
        assert_eq!(&text[token.literals[0].clone()], " or ");
    }

    #[test]
    fn test_escaped_quote_inside_literal() {
        let text = r"[Say('it\'s ] fine')]";
        let s = scan(text);
        assert_eq!(s.tokens.len(), 1);
        assert_eq!(s.tokens[0].text, text);
    }

    #[test]
    fn test_apostrophe_outside_brackets_is_text() {
        let s = scan("[Root.GetName]'s fleet and the captain's log");
        assert_eq!(s.tokens.len(), 1);
        assert_eq!(s.literals().count(), 0);
    }

    #[test]
    fn test_unterminated_bracket_is_not_a_token() {
        let s = scan("[GetTitle에 오신");
        assert!(s.tokens.is_empty());
        assert_eq!((s.open_brackets, s.close_brackets), (1, 0));
    }

    #[test]
    fn test_style_and_color_markers() {
        assert_eq!(
            kinds("#bold Big#! and #italic$x$#! §Y$VALUE$§!"),
            vec![
                (TokenKind::StyleOpen, "#bold"),
                (TokenKind::StyleClose, "#!"),
                (TokenKind::StyleOpen, "#italic"),
                (TokenKind::Dollar, "$x$"),
                (TokenKind::StyleClose, "#!"),
                (TokenKind::ColorOpen, "§Y"),
                (TokenKind::Dollar, "$VALUE$"),
                (TokenKind::ColorClose, "§!"),
            ]
        );
    }

    #[test]
    fn test_crossing_detected() {
        let s = scan("@icon$ 값");
        assert_eq!(s.crossings(), vec!["@icon$"]);
        assert_eq!(scan("$name] and [x$").crossings(), vec!["$name]", "[x$"]);
    }

    #[test]
    fn test_crossing_inside_token_is_suppressed() {
        assert!(scan("$@var$ value").crossings().is_empty());
        assert!(scan("@icon! 값").crossings().is_empty());
    }

    #[test]
    fn test_crossing_inside_literal_is_suppressed() {
        assert!(scan("[Concat('@odd$', GetName)]").crossings().is_empty());
        assert!(scan(r#"[Concat(\"@odd$\", GetName)]"#).crossings().is_empty());
    }

    #[test]
    fn test_crossing_every_family_pair() {
        let openers = ['$', '£', '@', '[', '<'];
        let closers = ['$', '£', '@', ']', '>'];
        for (a, open) in openers.iter().enumerate() {
            for (b, close) in closers.iter().enumerate() {
                if a == b {
                    continue;
                }
                let fragment = format!("{open}name{close}");
                let text = format!("값 {fragment} 값");
                assert_eq!(scan(&text).crossings(), vec![fragment.as_str()], "{text}");
            }
        }
    }

    #[test]
    fn test_crossing_uses_family_name_grammar() {
        assert_eq!(scan("@mod:icon$ 값").crossings(), vec!["@mod:icon$"]);
        assert_eq!(scan("$my var@ 값").crossings(), vec!["$my var@"]);
        assert_eq!(scan("$@var£ 값").crossings(), vec!["$@var£"]);
        // A price followed by prose is not a dollar name.
        assert!(scan("Only $5 today!").crossings().is_empty());
    }

    #[test]
    fn test_crossing_abutting_token_is_suppressed() {
        assert!(scan("@gold!@icon$ 값").crossings().is_empty());
        assert!(scan("[GetName]<name$ 값").crossings().is_empty());
        assert_eq!(scan("@gold! @icon$ 값").crossings(), vec!["@icon$"]);
    }

    #[test]
    fn test_escaped_double_quoted_literal() {
        let text = r#"[Concatenate(\" or \", GetName)] rest"#;
        let s = scan(text);
        assert_eq!(s.tokens.len(), 1);
        let token = &s.tokens[0];
        assert_eq!(token.text, r#"[Concatenate(\" or \", GetName)]"#);
        assert_eq!(token.literals.len(), 1);
        assert_eq!(&text[token.literals[0].clone()], " or ");
    }

    #[test]
    fn test_escaped_literal_holding_other_quote() {
        let text = r#"[Say(\"it's ] fine\")]"#;
        let s = scan(text);
        assert_eq!(s.tokens.len(), 1);
        assert_eq!(s.tokens[0].text, text);
    }

    #[test]
    fn test_free_text() {
        assert!(!has_free_text("$VALUE$ £energy£ [GetName]"));
        assert!(has_free_text("$VALUE$ energy"));
        assert_eq!(scan("a $B$ c").free_text(), "a  c");
    }
}
