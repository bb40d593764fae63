//! Dialect-neutral pattern form.
//!
//! A mediary string is the source pattern with every recognized construct
//! replaced by a `<TOKEN>` or `<TOKEN:arg>` placeholder. Literal `<` and `>`
//! are themselves tokenized before anything else, so after encoding every
//! `<` in the string opens a placeholder.

use super::construct::{self, Phase, ROWS};
use super::Flavor;

const LT: &str = "<LT>";
const GT: &str = "<GT>";
const CLASS: &str = "CLASS";
const NAMED_GROUP: &str = "NAMED_GROUP";
const REPEAT: &str = "REPEAT";
const LAZY_REPEAT: &str = "LAZY_REPEAT";

/// A pattern in placeholder form plus the character classes lifted out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mediary {
    text: String,
    classes: Vec<String>,
}

impl Mediary {
    /// Encode `pattern`, written in `flavor`, into the neutral form.
    pub fn encode(pattern: &str, flavor: Flavor) -> Self {
        let escaped = escape_delimiters(pattern);

        let mut classes = Vec::new();
        let mut text = extract_classes(&escaped, flavor, &mut classes);

        text = replace_phase(text, Phase::Escape, flavor);
        text = substitute(&text, |rest| named_group(rest, flavor));
        text = replace_phase(text, Phase::Group, flavor);
        text = substitute(&text, |rest| repeat(rest, flavor));
        text = replace_phase(text, Phase::Quantifier, flavor);
        text = replace_phase(text, Phase::Meta, flavor);

        Self { text, classes }
    }

    /// Render the neutral form in `flavor`.
    ///
    /// Classes are put back first; their bodies only ever hold delimiter
    /// placeholders. The remaining placeholders are then expanded in a single
    /// left-to-right pass that never rescans its own output, so an emitted
    /// `(?P<name>` can't be mistaken for a placeholder.
    pub fn decode(&self, flavor: Flavor) -> String {
        let with_classes = substitute(&self.text, |rest| {
            let (len, name, arg) = placeholder(rest)?;
            if name != CLASS {
                return None;
            }
            let index: usize = arg?.parse().ok()?;
            let class = self.classes.get(index)?;
            Some((len, class.clone()))
        });

        substitute(&with_classes, |rest| {
            let (len, name, arg) = placeholder(rest)?;
            Some((len, render(name, arg, flavor)?))
        })
    }

    /// The placeholder text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Character classes in order of appearance, brackets included.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

fn escape_delimiters(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '<' => out.push_str(LT),
            '>' => out.push_str(GT),
            _ => out.push(ch),
        }
    }
    out
}

/// Lift every `[...]` out of `text`. Bracket expressions that are the native
/// spelling of a known class become that class's token instead.
fn extract_classes(text: &str, flavor: Flavor, classes: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        let len = match ch {
            '\\' => ch.len_utf8() + rest[1..].chars().next().map_or(0, char::len_utf8),
            '[' => match class_len(rest, flavor) {
                Some(len) => len,
                None => {
                    // Unbalanced: leave the tail for the later phases as is.
                    out.push_str(rest);
                    break;
                }
            },
            _ => ch.len_utf8(),
        };

        let (head, tail) = rest.split_at(len);
        if ch == '[' {
            match construct::by_class(head, flavor) {
                Some(row) => out.push_str(&format!("<{}>", row.token)),
                None => {
                    out.push_str(&format!("<{}:{}>", CLASS, classes.len()));
                    classes.push(head.to_string());
                }
            }
        } else {
            out.push_str(head);
        }
        rest = tail;
    }

    out
}

/// Byte length of the bracket expression at the start of `s`, if it closes.
fn class_len(s: &str, flavor: Flavor) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 1;
    if bytes.get(i) == Some(&b'^') {
        i += 1;
    }
    if bytes.get(i) == Some(&b']') {
        i += 1;
    }

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if flavor.escapes_in_classes() => i += 2,
            b'[' if matches!(bytes.get(i + 1), Some(b':' | b'.' | b'=')) => {
                let delim = bytes[i + 1];
                let close = bytes[i + 2..]
                    .windows(2)
                    .position(|pair| pair[0] == delim && pair[1] == b']');
                i = match close {
                    Some(offset) => i + 2 + offset + 2,
                    None => i + 1,
                };
            }
            b']' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn replace_phase(mut text: String, phase: Phase, flavor: Flavor) -> String {
    for row in ROWS.iter().filter(|row| row.phase == phase) {
        if let Some(native) = row.spelling(flavor).native() {
            // Bracket spellings were handled while extracting classes.
            if !native.starts_with('[') && text.contains(native) {
                text = text.replace(native, &format!("<{}>", row.token));
            }
        }
    }
    text
}

/// Leftmost, non-overlapping replacement driven by `matcher`, which gets the
/// unconsumed tail and answers with how much of it to replace and with what.
fn substitute<F>(text: &str, mut matcher: F) -> String
where
    F: FnMut(&str) -> Option<(usize, String)>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        match matcher(rest) {
            Some((len, replacement)) if len > 0 => {
                out.push_str(&replacement);
                rest = &rest[len..];
            }
            _ => {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }

    out
}

/// Opening/closing text of a named group, after delimiter escaping.
fn named_group_forms(flavor: Flavor) -> &'static [(&'static str, &'static str)] {
    match flavor {
        Flavor::Ecma => &[("(?<LT>", GT)],
        Flavor::Pcre => &[("(?P<LT>", GT), ("(?<LT>", GT), ("(?'", "'")],
        Flavor::Rust => &[("(?P<LT>", GT), ("(?<LT>", GT)],
        Flavor::Extended => &[],
    }
}

fn named_group(rest: &str, flavor: Flavor) -> Option<(usize, String)> {
    named_group_forms(flavor).iter().find_map(|&(open, close)| {
        let after_open = rest.strip_prefix(open)?;
        let name_len = group_name_len(after_open)?;
        let after_name = after_open[name_len..].strip_prefix(close)?;
        let len = rest.len() - after_name.len();
        Some((len, format!("<{}:{}>", NAMED_GROUP, &after_open[..name_len])))
    })
}

fn group_name_len(s: &str) -> Option<usize> {
    let first = s.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    Some(
        s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(s.len()),
    )
}

/// `{m}`, `{m,}` and `{m,n}`, plus the lazy `?` suffix where the dialect has one.
fn repeat(rest: &str, flavor: Flavor) -> Option<(usize, String)> {
    let body = rest.strip_prefix('{')?;
    let min_len = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
    if min_len == 0 {
        return None;
    }

    let mut arg_len = min_len;
    if body[arg_len..].starts_with(',') {
        arg_len += 1;
        arg_len += body[arg_len..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len() - arg_len);
    }

    let arg = &body[..arg_len];
    let after = body[arg_len..].strip_prefix('}')?;
    let len = rest.len() - after.len();

    if flavor.has_lazy_quantifiers() && after.starts_with('?') {
        Some((len + 1, format!("<{}:{}>", LAZY_REPEAT, arg)))
    } else {
        Some((len, format!("<{}:{}>", REPEAT, arg)))
    }
}

/// Parse the placeholder at the start of `rest`: total length, name, argument.
fn placeholder(rest: &str) -> Option<(usize, &str, Option<&str>)> {
    let inner = rest.strip_prefix('<')?;
    let end = inner.find('>')?;
    let body = &inner[..end];
    let (name, arg) = match body.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (body, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return None;
    }
    Some((end + 2, name, arg))
}

fn render(name: &str, arg: Option<&str>, flavor: Flavor) -> Option<String> {
    let text = match (name, arg) {
        ("LT", None) => "<".to_string(),
        ("GT", None) => ">".to_string(),
        (NAMED_GROUP, Some(group)) => match flavor {
            Flavor::Ecma => format!("(?<{}>", group),
            Flavor::Pcre | Flavor::Rust => format!("(?P<{}>", group),
            Flavor::Extended => "(".to_string(),
        },
        (REPEAT, Some(bounds)) => format!("{{{}}}", bounds),
        (LAZY_REPEAT, Some(bounds)) if flavor.has_lazy_quantifiers() => {
            format!("{{{}}}?", bounds)
        }
        (LAZY_REPEAT, Some(bounds)) => format!("{{{}}}", bounds),
        (token, None) => construct::by_token(token)?.spelling(flavor).text().to_string(),
        _ => return None,
    };
    Some(text)
}
