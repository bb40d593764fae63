//! The construct table shared by every dialect.
//!
//! Rows are listed in encode order: escapes before the metacharacters they
//! escape, lazy quantifiers before the plain quantifiers they end with.

use super::Flavor;

/// How a construct is written in one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Spelling {
    /// Recognized on encode and emitted on decode.
    Native(&'static str),
    /// Emitted on decode only; matches the same language.
    Substitute(&'static str),
}

impl Spelling {
    pub(crate) fn text(self) -> &'static str {
        match self {
            Spelling::Native(text) | Spelling::Substitute(text) => text,
        }
    }

    pub(crate) fn native(self) -> Option<&'static str> {
        match self {
            Spelling::Native(text) => Some(text),
            Spelling::Substitute(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Backslash escapes and shorthand classes.
    Escape,
    /// Group openers that start with `(?`.
    Group,
    /// Multi-character quantifiers.
    Quantifier,
    /// Single-character metacharacters.
    Meta,
}

#[derive(Debug)]
pub(crate) struct Row {
    pub token: &'static str,
    pub phase: Phase,
    /// Indexed by [`Flavor::index`]: ecma, pcre, extended, rust.
    spellings: [Spelling; 4],
}

impl Row {
    pub(crate) fn spelling(&self, flavor: Flavor) -> Spelling {
        self.spellings[flavor.index()]
    }
}

use Phase::*;
use Spelling::{Native as N, Substitute as S};

const fn same(token: &'static str, phase: Phase, text: &'static str) -> Row {
    Row {
        token,
        phase,
        spellings: [N(text), N(text), N(text), N(text)],
    }
}

/// Shorthand classes: one escape in the backslash dialects, a bracket
/// expression in POSIX ERE.
const fn shorthand(token: &'static str, escape: &'static str, posix: &'static str) -> Row {
    Row {
        token,
        phase: Escape,
        spellings: [N(escape), N(escape), N(posix), N(escape)],
    }
}

/// PCRE-only shorthands, spelled out for every other dialect.
const fn pcre_only(token: &'static str, escape: &'static str, spelled: &'static str, posix: &'static str) -> Row {
    Row {
        token,
        phase: Escape,
        spellings: [S(spelled), N(escape), S(posix), S(spelled)],
    }
}

/// Named POSIX classes: native everywhere but ECMAScript.
const fn posix(token: &'static str, bracket: &'static str, ecma: &'static str) -> Row {
    Row {
        token,
        phase: Escape,
        spellings: [S(ecma), N(bracket), N(bracket), N(bracket)],
    }
}

/// Lazy forms have no ERE equivalent; the greedy form accepts the same strings.
const fn lazy(token: &'static str, text: &'static str, greedy: &'static str) -> Row {
    Row {
        token,
        phase: Quantifier,
        spellings: [N(text), N(text), S(greedy), N(text)],
    }
}

pub(crate) static ROWS: &[Row] = &[
    same("ESC_BACKSLASH", Escape, r"\\"),
    same("ESC_LPAREN", Escape, r"\("),
    same("ESC_RPAREN", Escape, r"\)"),
    same("ESC_LBRACKET", Escape, r"\["),
    same("ESC_RBRACKET", Escape, r"\]"),
    same("ESC_LBRACE", Escape, r"\{"),
    same("ESC_RBRACE", Escape, r"\}"),
    same("ESC_DOT", Escape, r"\."),
    same("ESC_PLUS", Escape, r"\+"),
    same("ESC_STAR", Escape, r"\*"),
    same("ESC_QMARK", Escape, r"\?"),
    same("ESC_PIPE", Escape, r"\|"),
    same("ESC_CARET", Escape, r"\^"),
    same("ESC_DOLLAR", Escape, r"\$"),
    Row {
        token: "ESC_SLASH",
        phase: Escape,
        spellings: [N(r"\/"), N(r"\/"), S("/"), S("/")],
    },
    Row {
        token: "NEWLINE",
        phase: Escape,
        spellings: [N(r"\n"), N(r"\n"), N("\n"), N(r"\n")],
    },
    Row {
        token: "TAB",
        phase: Escape,
        spellings: [N(r"\t"), N(r"\t"), N("\t"), N(r"\t")],
    },
    shorthand("DIGIT", r"\d", "[[:digit:]]"),
    shorthand("NOT_DIGIT", r"\D", "[^[:digit:]]"),
    shorthand("WORD", r"\w", "[[:alnum:]_]"),
    shorthand("NOT_WORD", r"\W", "[^[:alnum:]_]"),
    shorthand("SPACE", r"\s", "[[:space:]]"),
    shorthand("NOT_SPACE", r"\S", "[^[:space:]]"),
    pcre_only("HSPACE", r"\h", r"[ \t]", "[[:blank:]]"),
    pcre_only("NOT_HSPACE", r"\H", r"[^ \t]", "[^[:blank:]]"),
    pcre_only("VSPACE", r"\v", r"[\n\x0B\x0C\r]", "[\n\x0B\x0C\r]"),
    pcre_only("NOT_VSPACE", r"\V", r"[^\n\x0B\x0C\r]", "[^\n\x0B\x0C\r]"),
    pcre_only("NOT_NEWLINE", r"\N", r"[^\n]", "[^\n]"),
    pcre_only("LINEBREAK", r"\R", r"(?:\r\n|[\n\x0B\x0C\r])", "(\r\n|[\n\x0B\x0C\r])"),
    posix("ALNUM", "[[:alnum:]]", "[A-Za-z0-9]"),
    posix("ALPHA", "[[:alpha:]]", "[A-Za-z]"),
    posix("BLANK", "[[:blank:]]", r"[ \t]"),
    posix("CNTRL", "[[:cntrl:]]", r"[\x00-\x1F\x7F]"),
    posix("GRAPH", "[[:graph:]]", "[!-~]"),
    posix("LOWER", "[[:lower:]]", "[a-z]"),
    posix("PRINT", "[[:print:]]", "[ -~]"),
    posix("PUNCT", "[[:punct:]]", r"[!-\/:-@\[-`{-~]"),
    posix("UPPER", "[[:upper:]]", "[A-Z]"),
    posix("XDIGIT", "[[:xdigit:]]", "[0-9A-Fa-f]"),
    Row {
        token: "NONCAPTURE",
        phase: Group,
        spellings: [N("(?:"), N("(?:"), S("("), N("(?:")],
    },
    lazy("LAZY_PLUS", "+?", "+"),
    lazy("LAZY_STAR", "*?", "*"),
    lazy("LAZY_OPT", "??", "?"),
    same("GROUP", Meta, "("),
    same("END_GROUP", Meta, ")"),
    same("ALT", Meta, "|"),
    same("PLUS", Meta, "+"),
    same("STAR", Meta, "*"),
    same("OPT", Meta, "?"),
    same("ANY", Meta, "."),
    same("BOL", Meta, "^"),
    same("EOL", Meta, "$"),
];

pub(crate) fn by_token(token: &str) -> Option<&'static Row> {
    ROWS.iter().find(|row| row.token == token)
}

/// The row whose native bracket spelling in `flavor` is exactly `class`.
pub(crate) fn by_class(class: &str, flavor: Flavor) -> Option<&'static Row> {
    ROWS.iter()
        .find(|row| row.spelling(flavor).native() == Some(class))
}
