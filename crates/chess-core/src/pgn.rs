//! PGN parsing utilities: a lightweight regex-based parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ChessError;
use crate::game_data::{GameData, GameMetadata};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid header regex"));
static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid header line regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}").expect("valid comment regex"));
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O")
        .expect("valid move regex")
});

/// Parse a single PGN game into a GameData struct.
pub fn parse_pgn(pgn: &str) -> Result<GameData, ChessError> {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..GameMetadata::default()
    };
    let mut setup = None;

    for cap in HEADER_RE.captures_iter(pgn) {
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = Some(value),
            "UTCDate" => metadata.utc_date = Some(value),
            "UTCTime" => metadata.utc_time = Some(value),
            "Termination" => metadata.termination = Some(value),
            "TimeControl" => metadata.time_control = Some(value),
            "Event" => metadata.event = Some(value),
            "Link" => metadata.link = Some(value),
            "SetUp" => setup = Some(value),
            "FEN" => metadata.start_fen = Some(value),
            _ => {}
        }
    }

    // A FEN header only counts when the game declares a custom setup
    if setup.as_deref() == Some("0") {
        metadata.start_fen = None;
    }

    let moves = extract_moves(pgn);
    if moves.is_empty() {
        return Err(ChessError::InvalidPgn("no moves found".to_string()));
    }

    Ok(GameData {
        metadata,
        moves,
        pgn: pgn.to_string(),
    })
}

/// Parse every game in a PGN file, in file order. A game that fails to
/// parse keeps its slot as an error so callers can report it.
pub fn parse_pgn_file(text: &str) -> Vec<Result<GameData, ChessError>> {
    split_games(text).iter().map(|game| parse_pgn(game)).collect()
}

/// Split a multi-game PGN text into one string per game.
/// A new game starts at a header line that follows movetext.
pub fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut seen_movetext = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && seen_movetext {
            games.push(std::mem::take(&mut current));
            seen_movetext = false;
        }
        if !trimmed.is_empty() && !trimmed.starts_with('[') {
            seen_movetext = true;
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        games.push(current);
    }

    games
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = HEADER_LINE_RE.replace_all(pgn, "");
    let no_comments = COMMENT_RE.replace_all(&no_headers, "");
    let mainline = strip_variations(&no_comments);

    MOVE_RE
        .find_iter(&mainline)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop parenthesised variations, including nested ones.
fn strip_variations(movetext: &str) -> String {
    let mut depth = 0usize;
    let mut mainline = String::with_capacity(movetext.len());
    for c in movetext.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => mainline.push(c),
            _ => {}
        }
    }
    mainline
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = r#"[Event "Live Chess"]
[White "alice"]
[Black "bob"]
[Result "1-0"]
[UTCDate "2024.09.15"]
[UTCTime "12:30:05"]
[Termination "alice won by checkmate"]

1. e4 {[%clk 0:09:58]} e5 2. Nf3 (2. Nc3 Nf6) Nc6 3. Bc4 Nf6 4. Qxf7# 1-0"#;

    #[test]
    fn test_parse_pgn_basic() {
        let game = parse_pgn(GAME).unwrap();
        assert_eq!(game.metadata.white, "alice");
        assert_eq!(game.metadata.black, "bob");
        assert_eq!(game.metadata.result, "1-0");
        assert_eq!(game.metadata.utc_date.as_deref(), Some("2024.09.15"));
        assert_eq!(game.metadata.utc_time.as_deref(), Some("12:30:05"));
        assert_eq!(
            game.metadata.termination.as_deref(),
            Some("alice won by checkmate")
        );
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bc4", "Nf6", "Qxf7#"]);
        assert!(game.metadata.start_fen.is_none());
    }

    #[test]
    fn test_parse_pgn_without_moves() {
        let err = parse_pgn("[White \"a\"]\n[Black \"b\"]\n\n*").unwrap_err();
        assert!(matches!(err, ChessError::InvalidPgn(_)));
    }

    #[test]
    fn test_setup_fen_header() {
        let pgn = r#"[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"]

1. e4 Kd7 *"#;
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(
            game.metadata.start_fen.as_deref(),
            Some("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1")
        );
    }

    #[test]
    fn test_split_games() {
        let text = format!("{GAME}\n\n{GAME}\n");
        let games = split_games(&text);
        assert_eq!(games.len(), 2);
        assert_eq!(parse_pgn_file(&text).len(), 2);
    }

    #[test]
    fn test_nested_variations_are_skipped() {
        let game = parse_pgn("1. e4 (1. d4 (1. c4 c5) d5) e5 2. Nf3 (2. Bc4) Nc6 *").unwrap();
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_unparseable_game_keeps_its_slot() {
        let text = format!("{GAME}\n\n[White \"a\"]\n[Black \"b\"]\n\n*\n\n{GAME}\n");
        let games = parse_pgn_file(&text);
        assert_eq!(games.len(), 3);
        assert!(games[0].is_ok());
        assert!(matches!(games[1], Err(ChessError::InvalidPgn(_))));
        assert!(games[2].is_ok());
    }
}
