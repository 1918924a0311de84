//! Shell-style lexing of flag strings.
//!
//! Words are separated by whitespace, single and double quotes group words,
//! and a backslash escapes the following character (inside quotes too).
//! Globs and variables are never expanded.

use std::borrow::Cow;

/// Split `input` into words the way a shell would, without expansion.
pub fn split(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escape = false;

    for c in input.chars() {
        if escape {
            escape = false;
            current.push(c);
            continue;
        }

        match (quote, c) {
            (_, '\\') => escape = true,
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if open == c => quote = None,
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-+=/.,:@%^".contains(c)
}

/// Quote `word` so that a POSIX shell reads it back as one word.
pub fn quote(word: &str) -> Cow<'_, str> {
    if !word.is_empty() && word.chars().all(is_safe) {
        return Cow::Borrowed(word);
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\"'\"'");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Join words into a single shell-quoted string.
pub fn join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|word| quote(word.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
