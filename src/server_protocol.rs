use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MazeStatePatch, PersistedMazeState};

/// Body of `PUT /api/maze/{uid}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeStateEnvelope {
    #[serde(rename = "mazeState", alias = "maze_state")]
    pub maze_state: MazeStatePatch,
}

/// Body of a successful `GET /api/maze/{uid}`: the stored state or `null`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MazeLoadResponse(pub Option<PersistedMazeState>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutBodyError {
    NotJson,
    MissingMazeState,
    InvalidMazeState(String),
}

impl PutBodyError {
    pub fn message(&self) -> String {
        match self {
            Self::NotJson => "body is not valid json".to_string(),
            Self::MissingMazeState => "mazeState is required".to_string(),
            Self::InvalidMazeState(detail) => format!("invalid mazeState: {detail}"),
        }
    }
}

/// Parses a PUT body into a write. A `mazeState` carrying any grid is read as
/// a full snapshot, so a partial snapshot is an error rather than silently
/// degrading to a position-only write.
pub fn parse_put_body(raw: &str) -> Result<MazeStatePatch, PutBodyError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| PutBodyError::NotJson)?;
    let object = value.as_object().ok_or(PutBodyError::MissingMazeState)?;
    let maze_state = object
        .get("mazeState")
        .or_else(|| object.get("maze_state"))
        .ok_or(PutBodyError::MissingMazeState)?;
    let state_object = maze_state
        .as_object()
        .ok_or_else(|| PutBodyError::InvalidMazeState("expected an object".to_string()))?;

    let has_grid = ["maze", "visibleMaze", "visible_maze", "fogGroups", "fog_groups"]
        .iter()
        .any(|key| state_object.contains_key(*key));
    if has_grid {
        let state: PersistedMazeState = serde_json::from_value(maze_state.clone())
            .map_err(|error| PutBodyError::InvalidMazeState(error.to_string()))?;
        if !grids_agree(&state) {
            return Err(PutBodyError::InvalidMazeState(
                "grids must be square and of equal size".to_string(),
            ));
        }
        return Ok(MazeStatePatch::Full(state));
    }

    serde_json::from_value::<MazeStatePatch>(maze_state.clone())
        .map_err(|error| PutBodyError::InvalidMazeState(error.to_string()))
}

fn grids_agree(state: &PersistedMazeState) -> bool {
    let size = state.maze.size();
    size > 0
        && state.maze.is_square_of(size)
        && state.visible_maze.is_square_of(size)
        && state.fog_groups.is_square_of(size)
}
