use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2"
    pub date: Option<String>,
    pub utc_date: Option<String>,
    pub utc_time: Option<String>,
    pub termination: Option<String>,
    pub time_control: Option<String>,
    pub event: Option<String>,
    pub link: Option<String>,
    /// Start position when the game was set up from a FEN
    pub start_fen: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    pub metadata: GameMetadata,
    pub moves: Vec<String>, // SAN or UCI notation
    pub pgn: String,
}

impl GameData {
    /// Build a game from a bare move list, starting from the standard position.
    pub fn from_moves<I, S>(moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata: GameMetadata {
                result: "*".to_string(),
                ..GameMetadata::default()
            },
            moves: moves.into_iter().map(Into::into).collect(),
            pgn: String::new(),
        }
    }
}
