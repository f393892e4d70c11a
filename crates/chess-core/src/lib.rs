//! Chess primitives shared by the analysis pipeline: positions, parsed games,
//! PGN ingestion and game keys.

pub mod error;
pub mod game_data;
pub mod game_key;
pub mod pgn;
pub mod position;

pub use error::ChessError;
pub use game_data::{GameData, GameMetadata};
pub use position::{Position, PositionStatus, Side};
