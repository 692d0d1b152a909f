//! Expansion of `#{id}` and `#{id:sub}` macros in command strings.
//!
//! Two macro families share the grammar. Distribution macros rewrite to the
//! distribution file's manifest placeholder, optionally joined with one of its
//! named sub-paths. Interpreter group macros rewrite to the group selector or,
//! for the sub form, to a path built from the selector and a per-member
//! environment variable that is emitted alongside the command.

use std::collections::BTreeMap;

use crate::error::InputError;
use crate::model::{Distribution, InterpreterGroup};
use crate::platform::Platform;

/// A recognised `#{id}` or `#{id:sub}` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Macro<'a> {
    pub(crate) id: &'a str,
    pub(crate) sub: Option<&'a str>,
    raw: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Macro(Macro<'a>),
}

#[derive(Debug, Clone, Copy)]
enum State {
    Text,
    /// Saw `#` at the given offset.
    Hash(usize),
    /// Inside `#{`; the id starts at `start`.
    Id { hash: usize, start: usize },
    /// Inside `#{id:`; the id ends at `colon`.
    Sub { hash: usize, start: usize, colon: usize },
}

fn slice(text: &str, start: usize, end: usize) -> &str {
    text.get(start..end).unwrap_or_default()
}

/// Splits `text` into literal runs and macro tokens.
///
/// Ids and subs are non-empty and exclude `{`, `}` and `:`. Anything that
/// does not complete a token is literal text.
fn scan(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut state = State::Text;
    let mut previous = None;

    for (index, ch) in text.char_indices() {
        state = match (state, ch) {
            (State::Text, '#') => State::Hash(index),
            (State::Text, _) => State::Text,
            (State::Hash(_), '{') => State::Id {
                hash: index - 1,
                start: index + 1,
            },
            (State::Hash(_), '#') => State::Hash(index),
            (State::Hash(_), _) => State::Text,
            (State::Id { hash, start }, '}') if index > start => {
                push_macro(&mut segments, text, literal_start, hash, start, None, index);
                literal_start = index + 1;
                State::Text
            }
            (State::Id { hash, start }, ':') if index > start => State::Sub {
                hash,
                start,
                colon: index,
            },
            (State::Sub { hash, start, colon }, '}') if index > colon + 1 => {
                push_macro(&mut segments, text, literal_start, hash, start, Some(colon), index);
                literal_start = index + 1;
                State::Text
            }
            (State::Id { .. } | State::Sub { .. }, '{' | '}' | ':') => {
                restart_after(previous, ch, index)
            }
            (id_or_sub, _) => id_or_sub,
        };
        previous = Some(ch);
    }

    if literal_start < text.len() {
        segments.push(Segment::Literal(slice(text, literal_start, text.len())));
    }
    segments
}

/// A token was malformed at `ch`; a `#{` ending here may still open a new one.
const fn restart_after(previous: Option<char>, ch: char, index: usize) -> State {
    match (previous, ch) {
        (Some('#'), '{') => State::Id {
            hash: index - 1,
            start: index + 1,
        },
        _ => State::Text,
    }
}

fn push_macro<'a>(
    segments: &mut Vec<Segment<'a>>,
    text: &'a str,
    literal_start: usize,
    hash: usize,
    start: usize,
    colon: Option<usize>,
    close: usize,
) {
    if hash > literal_start {
        segments.push(Segment::Literal(slice(text, literal_start, hash)));
    }
    let (id, sub) = match colon {
        Some(colon) => (slice(text, start, colon), Some(slice(text, colon + 1, close))),
        None => (slice(text, start, close), None),
    };
    segments.push(Segment::Macro(Macro {
        id,
        sub,
        raw: slice(text, hash, close + 1),
    }));
}

/// Rewrites every macro in `text` for which `expand` returns a replacement,
/// leaving the rest untouched.
pub(crate) fn expand_macros<F>(text: &str, mut expand: F) -> Result<String, InputError>
where
    F: FnMut(&Macro<'_>) -> Result<Option<String>, InputError>,
{
    let mut expanded = String::with_capacity(text.len());
    for segment in scan(text) {
        match segment {
            Segment::Literal(literal) => expanded.push_str(literal),
            Segment::Macro(token) => match expand(&token)? {
                Some(replacement) => expanded.push_str(&replacement),
                None => expanded.push_str(token.raw),
            },
        }
    }
    Ok(expanded)
}

/// Joins manifest path fragments with POSIX semantics: an absolute `tail`
/// replaces `base`.
#[must_use]
pub fn join_path(base: &str, tail: &str) -> String {
    if tail.starts_with('/') || base.is_empty() {
        tail.to_owned()
    } else if base.ends_with('/') {
        format!("{base}{tail}")
    } else {
        format!("{base}/{tail}")
    }
}

impl Distribution {
    /// Resolves the bare (`None`) or named sub-path placeholder.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when `sub` names no placeholder.
    pub fn resolve_placeholder(&self, sub: Option<&str>) -> Result<String, InputError> {
        let file_placeholder = self.file.placeholder();
        let Some(name) = sub else {
            return Ok(file_placeholder);
        };
        self.placeholders
            .get(name)
            .map(|path| join_path(&file_placeholder, path))
            .ok_or_else(|| {
                InputError::new(format!(
                    "The distribution {} has no placeholder named {name:?}. Available placeholders: {}.",
                    self.id,
                    self.placeholders
                        .keys()
                        .map(|key| key.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// Expands this distribution's macros in `text`.
    ///
    /// # Examples
    /// ```
    /// use scie_lift::{Distribution, File, Identifier};
    ///
    /// let id = Identifier::parse("cpython")?;
    /// let python = Identifier::parse("python")?;
    /// let dist = Distribution::new(id.clone(), File::new("cpython.tar.gz").with_key(id))
    ///     .with_placeholder(python, "python/bin/python");
    /// assert_eq!(dist.expand_placeholders("#{cpython:python}")?, "{cpython}/python/bin/python");
    /// assert_eq!(dist.expand_placeholders("#{other}")?, "#{other}");
    /// # Ok::<(), scie_lift::InputError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] for an unknown sub-path name.
    pub fn expand_placeholders(&self, text: &str) -> Result<String, InputError> {
        expand_macros(text, |token| {
            if token.id == self.id.as_str() {
                self.resolve_placeholder(token.sub).map(Some)
            } else {
                Ok(None)
            }
        })
    }
}

impl InterpreterGroup {
    /// Env var name prefix for the fan-out of sub-path `sub`.
    #[must_use]
    pub fn env_var_prefix(&self, sub: &str) -> String {
        format!("_SCIENCE_IG_{}_{sub}_", self.id())
    }

    /// Expands this group's macros in `text` for `platform`.
    ///
    /// Each `#{group:sub}` also yields, for every member with a distribution
    /// on `platform`, an env var `<prefix><member-id>` holding that member's
    /// resolved sub-path. Members without a distribution are left out.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when a member's distribution lacks `sub`.
    pub fn expand_placeholders(
        &self,
        platform: Platform,
        text: &str,
    ) -> Result<(String, BTreeMap<String, String>), InputError> {
        let mut env = BTreeMap::new();
        let expanded = expand_macros(text, |token| {
            if token.id != self.id().as_str() {
                return Ok(None);
            }
            let Some(sub) = token.sub else {
                return Ok(Some(self.selector().to_owned()));
            };
            let prefix = self.env_var_prefix(sub);
            for member in self.members() {
                if let Some(distribution) = member.provider.distribution(platform) {
                    env.insert(
                        format!("{prefix}{}", member.id),
                        distribution.resolve_placeholder(Some(sub))?,
                    );
                }
            }
            Ok(Some(join_path(
                &format!("{{scie.files.{}}}", self.selector()),
                &format!("{{scie.env.{prefix}{}}}", self.selector()),
            )))
        })?;
        Ok((expanded, env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn macros(text: &str) -> Vec<(String, Option<String>)> {
        scan(text)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Macro(token) => {
                    Some((token.id.to_owned(), token.sub.map(str::to_owned)))
                }
                Segment::Literal(_) => None,
            })
            .collect()
    }

    #[rstest]
    #[case("#{cpython}", vec![("cpython", None)])]
    #[case("#{cpython:python}", vec![("cpython", Some("python"))])]
    #[case("a #{x} b #{y:z} c", vec![("x", None), ("y", Some("z"))])]
    #[case("##{x}", vec![("x", None)])]
    #[case("#{#{x}", vec![("x", None)])]
    #[case("#{}", vec![])]
    #[case("#{x:}", vec![])]
    #[case("#{x:y:z}", vec![])]
    #[case("{x}", vec![])]
    #[case("#x}", vec![])]
    fn scanner_recognises_tokens(#[case] text: &str, #[case] expected: Vec<(&str, Option<&str>)>) {
        let expected: Vec<_> = expected
            .into_iter()
            .map(|(id, sub)| (id.to_owned(), sub.map(str::to_owned)))
            .collect();
        assert_eq!(macros(text), expected);
    }

    #[rstest]
    #[case("plain text")]
    #[case("#{x:y:z} and {scie.env.FOO}")]
    #[case("trailing #{")]
    fn unknown_tokens_round_trip(#[case] text: &str) {
        assert_eq!(expand_macros(text, |_| Ok(None)), Ok(text.to_owned()));
    }

    #[test]
    fn expand_replaces_only_matching_tokens() {
        let expanded = expand_macros("#{a}-#{b}", |token| {
            Ok((token.id == "a").then(|| "A".to_owned()))
        });
        assert_eq!(expanded, Ok("A-#{b}".to_owned()));
    }

    #[rstest]
    #[case("{cpython}", "python/bin/python", "{cpython}/python/bin/python")]
    #[case("{cpython}/", "bin", "{cpython}/bin")]
    #[case("{cpython}", "/abs", "/abs")]
    fn join_follows_posix_rules(#[case] base: &str, #[case] tail: &str, #[case] joined: &str) {
        assert_eq!(join_path(base, tail), joined);
    }
}
