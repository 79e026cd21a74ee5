//! Line-oriented cue sheet reader.
//!
//! Only the per-track `TRACK`, `TITLE`, `PERFORMER` and `INDEX 01` commands
//! are interpreted; everything else in the sheet is ignored.

use std::path::Path;

use log::debug;

use crate::{ConvertError, Result};

/// Cue timestamps count frames at 75 per second
const FRAMES_PER_SECOND: u64 = 75;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    pub number: u32,
    pub title: Option<String>,
    pub performer: Option<String>,
    /// `INDEX 01` position in milliseconds
    pub start_ms: Option<u64>,
}

impl CueTrack {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            title: None,
            performer: None,
            start_ms: None,
        }
    }

    /// `Track NN`, used when the sheet gives no title
    pub fn label(&self) -> String {
        format!("Track {:02}", self.number)
    }

    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.label())
    }
}

#[derive(Debug)]
enum ParserState {
    NoTrack,
    InTrack(CueTrack),
}

#[derive(Debug, PartialEq, Eq)]
enum CueLine<'a> {
    Track(&'a str),
    Title(&'a str),
    Performer(&'a str),
    StartIndex(&'a str),
    Other,
}

fn classify(line: &str) -> CueLine<'_> {
    let line = line.trim();
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some("TRACK") => CueLine::Track(after(line, "TRACK")),
        Some("TITLE") => CueLine::Title(after(line, "TITLE")),
        Some("PERFORMER") => CueLine::Performer(after(line, "PERFORMER")),
        Some("INDEX") if tokens.next() == Some("01") => {
            CueLine::StartIndex(after(after(line, "INDEX"), "01"))
        }
        _ => CueLine::Other,
    }
}

fn after<'a>(line: &'a str, keyword: &str) -> &'a str {
    line[keyword.len()..].trim()
}

fn transition(state: ParserState, line: CueLine<'_>, line_no: usize, tracks: &mut Vec<CueTrack>) -> Result<ParserState> {
    let next = match (state, line) {
        (ParserState::NoTrack, CueLine::Track(args)) => ParserState::InTrack(parse_track_header(args, line_no)?),
        (ParserState::InTrack(finished), CueLine::Track(args)) => {
            tracks.push(finished);
            ParserState::InTrack(parse_track_header(args, line_no)?)
        }
        (ParserState::InTrack(mut track), CueLine::Title(value)) => {
            track.title = Some(unquote(value));
            ParserState::InTrack(track)
        }
        (ParserState::InTrack(mut track), CueLine::Performer(value)) => {
            track.performer = Some(unquote(value));
            ParserState::InTrack(track)
        }
        (ParserState::InTrack(mut track), CueLine::StartIndex(timestamp)) => {
            track.start_ms = Some(parse_timestamp(timestamp, line_no)?);
            ParserState::InTrack(track)
        }
        // Album-level fields before the first TRACK, and all other commands
        (state, _) => state,
    };
    Ok(next)
}

/// Parse cue sheet text into its tracks, in sheet order.
///
/// A malformed `TRACK` header or `INDEX 01` timestamp fails the whole parse.
pub fn parse(text: &str) -> Result<Vec<CueTrack>> {
    let mut tracks = Vec::new();
    let mut state = ParserState::NoTrack;

    for (index, line) in text.lines().enumerate() {
        state = transition(state, classify(line), index + 1, &mut tracks)?;
    }
    if let ParserState::InTrack(last) = state {
        tracks.push(last);
    }

    debug!("Parsed {} cue tracks", tracks.len());
    Ok(tracks)
}

/// Read and parse a cue file.
pub fn parse_file(path: &Path) -> Result<Vec<CueTrack>> {
    let bytes = std::fs::read(path)?;
    parse(&decode_text(&bytes))
}

/// UTF-8 when the bytes are valid UTF-8, Latin-1 otherwise. Never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn parse_track_header(args: &str, line_no: usize) -> Result<CueTrack> {
    let number = args.split_whitespace().next().unwrap_or("");
    match number.parse::<u32>() {
        Ok(n) if n > 0 => Ok(CueTrack::new(n)),
        _ => Err(ConvertError::CueSyntax {
            line: line_no,
            reason: format!("invalid track number '{}'", number),
        }),
    }
}

/// `MM:SS:FF` to milliseconds, rounding the frame part down.
pub fn parse_timestamp(timestamp: &str, line_no: usize) -> Result<u64> {
    let invalid = || ConvertError::CueSyntax {
        line: line_no,
        reason: format!("invalid INDEX 01 timestamp '{}'", timestamp),
    };

    let parts = timestamp
        .split(':')
        .map(|part| part.trim().parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let &[minutes, seconds, frames] = parts.as_slice() else {
        return Err(invalid());
    };

    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .and_then(|s| s.checked_mul(1000))
        .and_then(|ms| ms.checked_add(frames.checked_mul(1000)? / FRAMES_PER_SECOND))
        .ok_or_else(invalid)
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}
