#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the lock debug console.
//!
//! `regal` turns a line into a bounded token stream; the parser walks that
//! stream through `winnow`'s [`Stream`] interface and builds a [`Command`].

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::error::ErrMode;
use winnow::stream::Stream;

use super::catalog::{self, CommandTag};
use crate::encoder::Direction;
use crate::lock::MAX_DIGIT;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Unsigned decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword or argument word (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: TokenKind,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    UnknownCommand {
        lexeme: &'a str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    OutOfRange {
        span: Range<usize>,
        max: u32,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::UnknownCommand { lexeme } => {
                write!(f, "unknown command `{lexeme}`; try `help`")
            }
            GrammarErrorKind::InvalidInteger { span } => {
                write!(f, "invalid integer literal at {span:?}")
            }
            GrammarErrorKind::OutOfRange { span, max } => {
                write!(f, "value at {span:?} exceeds {max}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        let kind = match token {
            Some(tok) if tok.kind != TokenKind::Eol => GrammarErrorKind::UnexpectedToken {
                expected,
                found: tok.kind,
                span: tok.span.clone(),
            },
            _ => GrammarErrorKind::UnexpectedEnd { expected },
        };
        GrammarError { kind }
    }

    fn unknown_command(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownCommand {
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidInteger {
                span: token.span.clone(),
            },
        }
    }

    fn out_of_range(token: &Token<'a>, max: u32) -> Self {
        GrammarError {
            kind: GrammarErrorKind::OutOfRange {
                span: token.span.clone(),
                max,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ButtonSelection {
    Left,
    Right,
    Both,
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Turn { direction: Direction, clicks: u16 },
    Press(ButtonSelection),
    Release,
    Switch { switch: Side, position: Side },
    Key(u8),
    Tick(u16),
    Status,
    Timer { timer: u8, period_us: u32 },
    Servo,
    ResetCombination,
    Help { topic: Option<&'a str> },
}

type Input<'src, 'slice> = &'slice [Token<'src>];
type PResult<'src, T> = Result<T, ErrMode<GrammarError<'src>>>;

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(
            &mut buffer,
            Token {
                kind: record.token,
                lexeme,
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(
            &mut buffer,
            Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span,
            },
        )?;
    }

    Ok(buffer)
}

fn push_token<'a>(buffer: &mut TokenBuffer<'a>, token: Token<'a>) -> Result<(), LexError> {
    buffer.push(token).map_err(|_| LexError::TooManyTokens {
        processed: buffer.len() + 1,
    })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse one console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let mut input = tokens.as_slice();
    let command = match command(&mut input) {
        Ok(command) => command,
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => return Err(ParseError::Grammar(err)),
        Err(ErrMode::Incomplete(_)) => {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "token",
                input.first(),
            )));
        }
    };

    while let Some(token) = input.next_token() {
        if token.kind != TokenKind::Eol {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(&token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>(input: &mut Input<'src, 'slice>) -> PResult<'src, Command<'src>>
where
    'src: 'slice,
{
    let keyword = expect_kind(input, TokenKind::Ident, "command keyword")?;
    let Some(spec) = catalog::find(keyword.lexeme) else {
        return Err(ErrMode::Cut(GrammarError::unknown_command(&keyword)));
    };

    let command = match spec.tag {
        CommandTag::Turn => {
            let direction = choice(
                input,
                &[
                    ("cw", Direction::Clockwise),
                    ("ccw", Direction::Counterclockwise),
                ],
                "cw or ccw",
            )?;
            let clicks = optional_integer(input, u32::from(u16::MAX))?.unwrap_or(1);
            Command::Turn { direction, clicks }
        }
        CommandTag::Press => Command::Press(choice(
            input,
            &[
                ("left", ButtonSelection::Left),
                ("right", ButtonSelection::Right),
                ("both", ButtonSelection::Both),
            ],
            "left, right, or both",
        )?),
        CommandTag::Release => Command::Release,
        CommandTag::Switch => {
            let switch = side(input)?;
            let position = side(input)?;
            Command::Switch { switch, position }
        }
        CommandTag::Key => Command::Key(integer(input, "key number", u32::from(MAX_DIGIT))?),
        CommandTag::Tick => Command::Tick(optional_integer(input, u32::from(u16::MAX))?.unwrap_or(1)),
        CommandTag::Status => Command::Status,
        CommandTag::Timer => {
            let timer = integer(input, "timer number", u32::from(u8::MAX))?;
            let period_us = integer(input, "period in microseconds", u32::MAX)?;
            Command::Timer { timer, period_us }
        }
        CommandTag::Servo => Command::Servo,
        CommandTag::ResetCombination => Command::ResetCombination,
        CommandTag::Help => {
            let topic = match input.first() {
                Some(token) if token.kind == TokenKind::Ident => {
                    let token = expect_kind(input, TokenKind::Ident, "topic")?;
                    Some(token.lexeme)
                }
                _ => None,
            };
            Command::Help { topic }
        }
    };

    Ok(command)
}

fn side<'src, 'slice>(input: &mut Input<'src, 'slice>) -> PResult<'src, Side>
where
    'src: 'slice,
{
    choice(
        input,
        &[("left", Side::Left), ("right", Side::Right)],
        "left or right",
    )
}

fn choice<'src, 'slice, T: Copy>(
    input: &mut Input<'src, 'slice>,
    choices: &[(&'static str, T)],
    label: &'static str,
) -> PResult<'src, T>
where
    'src: 'slice,
{
    let checkpoint = input.checkpoint();
    let token = expect_kind(input, TokenKind::Ident, label)?;
    if let Some((_, value)) = choices
        .iter()
        .find(|(keyword, _)| keyword.eq_ignore_ascii_case(token.lexeme))
    {
        return Ok(*value);
    }
    input.reset(&checkpoint);
    Err(ErrMode::Backtrack(GrammarError::unexpected(
        label,
        Some(&token),
    )))
}

fn integer<'src, 'slice, T>(
    input: &mut Input<'src, 'slice>,
    label: &'static str,
    max: u32,
) -> PResult<'src, T>
where
    'src: 'slice,
    T: TryFrom<u32>,
{
    let token = expect_kind(input, TokenKind::Integer, label)?;
    let value = token
        .lexeme
        .parse::<u32>()
        .map_err(|_| ErrMode::Cut(GrammarError::invalid_integer(&token)))?;
    if value > max {
        return Err(ErrMode::Cut(GrammarError::out_of_range(&token, max)));
    }
    T::try_from(value).map_err(|_| ErrMode::Cut(GrammarError::out_of_range(&token, max)))
}

fn optional_integer<'src, 'slice, T>(
    input: &mut Input<'src, 'slice>,
    max: u32,
) -> PResult<'src, Option<T>>
where
    'src: 'slice,
    T: TryFrom<u32>,
{
    match input.first() {
        Some(token) if token.kind == TokenKind::Integer => integer(input, "integer", max).map(Some),
        _ => Ok(None),
    }
}

fn expect_kind<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    kind: TokenKind,
    label: &'static str,
) -> PResult<'src, Token<'src>>
where
    'src: 'slice,
{
    let checkpoint = input.checkpoint();
    match input.next_token() {
        Some(token) if token.kind == kind => Ok(token),
        other => {
            input.reset(&checkpoint);
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                label,
                other.as_ref(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    fn grammar_error(input: &str) -> GrammarErrorKind<'_> {
        match parse(input) {
            Err(ParseError::Grammar(err)) => err.kind,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn parses_turn_with_and_without_clicks() {
        assert_eq!(
            parse_ok("turn cw 37"),
            Command::Turn {
                direction: Direction::Clockwise,
                clicks: 37
            }
        );
        assert_eq!(
            parse_ok("turn CCW\n"),
            Command::Turn {
                direction: Direction::Counterclockwise,
                clicks: 1
            }
        );
    }

    #[test]
    fn parses_panel_commands() {
        assert_eq!(
            parse_ok("press both"),
            Command::Press(ButtonSelection::Both)
        );
        assert_eq!(parse_ok("release"), Command::Release);
        assert_eq!(
            parse_ok("switch left right"),
            Command::Switch {
                switch: Side::Left,
                position: Side::Right
            }
        );
        assert_eq!(parse_ok("key 15"), Command::Key(15));
    }

    #[test]
    fn parses_tick_timer_and_help() {
        assert_eq!(parse_ok("tick"), Command::Tick(1));
        assert_eq!(parse_ok("tick 40"), Command::Tick(40));
        assert_eq!(
            parse_ok("timer 2 1000"),
            Command::Timer {
                timer: 2,
                period_us: 1_000
            }
        );
        assert_eq!(parse_ok("help"), Command::Help { topic: None });
        assert_eq!(
            parse_ok("help turn"),
            Command::Help {
                topic: Some("turn")
            }
        );
        assert_eq!(parse_ok("reset-combination"), Command::ResetCombination);
    }

    #[test]
    fn rejects_key_beyond_keypad() {
        assert!(matches!(
            grammar_error("key 16"),
            GrammarErrorKind::OutOfRange { max: 15, .. }
        ));
    }

    #[test]
    fn rejects_unknown_command_and_bad_choice() {
        assert_eq!(
            grammar_error("open sesame"),
            GrammarErrorKind::UnknownCommand { lexeme: "open" }
        );
        assert!(matches!(
            grammar_error("turn left"),
            GrammarErrorKind::UnexpectedToken {
                expected: "cw or ccw",
                ..
            }
        ));
        assert_eq!(
            grammar_error("switch left"),
            GrammarErrorKind::UnexpectedEnd {
                expected: "left or right"
            }
        );
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(matches!(
            grammar_error("status now"),
            GrammarErrorKind::UnexpectedToken {
                expected: "end of command",
                ..
            }
        ));
    }

    #[test]
    fn rejects_invalid_token() {
        assert!(matches!(
            grammar_error("tick 3$"),
            GrammarErrorKind::InvalidToken { lexeme: "$", .. }
        ));
    }
}
