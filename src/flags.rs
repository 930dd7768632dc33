//! Splitting of free-form flag strings into compiler arguments
//!
//! Flags are configured as a single string (`"--foo 'a b' -Dx"`) and split
//! the way a POSIX shell would split words: whitespace separates arguments,
//! single quotes group literally, double quotes group with backslash escapes,
//! and a backslash outside single quotes escapes the next character.

use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while},
    character::complete::{anychar, char},
    combinator::map,
    multi::{many0, many1},
    sequence::{delimited, preceded},
    IResult,
};
use std::error::Error;
use std::fmt;

/// Errors raised while splitting a flag string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagsError {
    /// A quote was opened at the given byte offset and never closed
    UnterminatedQuote(char, usize),
    /// The string ends with an escaping backslash
    TrailingEscape,
}

impl fmt::Display for FlagsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagsError::UnterminatedQuote(quote, offset) => {
                write!(f, "Unterminated {} quote at offset {}", quote, offset)
            }
            FlagsError::TrailingEscape => write!(f, "Flags end with a dangling backslash"),
        }
    }
}

impl Error for FlagsError {}

fn single_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        str::to_string,
    )(input)
}

fn escaped_char(input: &str) -> IResult<&str, String> {
    map(preceded(char('\\'), anychar), |c: char| c.to_string())(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            many0(alt((escaped_char, map(is_not("\"\\"), str::to_string)))),
            char('"'),
        ),
        |parts: Vec<String>| parts.concat(),
    )(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    map(is_not(" \t\r\n'\"\\"), str::to_string)(input)
}

fn word(input: &str) -> IResult<&str, String> {
    map(
        many1(alt((single_quoted, double_quoted, escaped_char, bare))),
        |parts: Vec<String>| parts.concat(),
    )(input)
}

/// Split `input` into individual arguments
pub fn split_flags(input: &str) -> Result<Vec<String>, FlagsError> {
    let mut args = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let (remaining, arg) = match word(rest) {
            Ok(parsed) => parsed,
            Err(_) => return Err(dangling(input, rest)),
        };
        if !remaining.is_empty() && !remaining.starts_with(|c: char| c.is_whitespace()) {
            return Err(dangling(input, remaining));
        }
        args.push(arg);
        rest = remaining.trim_start();
    }

    Ok(args)
}

fn dangling(input: &str, at: &str) -> FlagsError {
    match at.chars().next() {
        Some(quote @ ('\'' | '"')) => FlagsError::UnterminatedQuote(quote, input.len() - at.len()),
        _ => FlagsError::TrailingEscape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split_flags("  --foo   -Dbar\t-v ").unwrap(),
            vec!["--foo", "-Dbar", "-v"]
        );
        assert!(split_flags("").unwrap().is_empty());
        assert!(split_flags("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_quoted_words() {
        assert_eq!(
            split_flags(r#"--name='a b' "--c_out=x y" pre"mid"post"#).unwrap(),
            vec!["--name=a b", "--c_out=x y", "premidpost"]
        );
        assert_eq!(split_flags("''").unwrap(), vec![""]);
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(
            split_flags(r#"a\ b "say \"hi\"" 'no\escape'"#).unwrap(),
            vec!["a b", r#"say "hi""#, r"no\escape"]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            split_flags("--ok 'broken"),
            Err(FlagsError::UnterminatedQuote('\'', 5))
        );
        assert_eq!(
            split_flags("x\"y"),
            Err(FlagsError::UnterminatedQuote('"', 1))
        );
    }

    #[test]
    fn test_trailing_escape() {
        assert_eq!(split_flags("abc \\"), Err(FlagsError::TrailingEscape));
    }
}
