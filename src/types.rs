use serde::{Deserialize, Serialize};

use crate::world::Grid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Wall,
    Path,
    Player,
    Exit,
}

impl CellState {
    pub fn is_wall(self) -> bool {
        self == Self::Wall
    }
}

/// A cell as the player currently sees it: either fogged or an exact copy of
/// the underlying maze cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CellTag", from = "CellTag")]
pub enum VisibleCell {
    Fog,
    Revealed(CellState),
}

impl VisibleCell {
    pub fn is_fog(self) -> bool {
        self == Self::Fog
    }

    /// True when the cell is fog or mirrors `actual`.
    pub fn is_consistent_with(self, actual: CellState) -> bool {
        match self {
            Self::Fog => true,
            Self::Revealed(cell) => cell == actual,
        }
    }
}

/// Flat wire tag shared by maze and visibility grids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CellTag {
    Wall,
    Path,
    Player,
    Exit,
    Fog,
}

impl From<VisibleCell> for CellTag {
    fn from(cell: VisibleCell) -> Self {
        match cell {
            VisibleCell::Fog => Self::Fog,
            VisibleCell::Revealed(CellState::Wall) => Self::Wall,
            VisibleCell::Revealed(CellState::Path) => Self::Path,
            VisibleCell::Revealed(CellState::Player) => Self::Player,
            VisibleCell::Revealed(CellState::Exit) => Self::Exit,
        }
    }
}

impl From<CellTag> for VisibleCell {
    fn from(tag: CellTag) -> Self {
        match tag {
            CellTag::Fog => Self::Fog,
            CellTag::Wall => Self::Revealed(CellState::Wall),
            CellTag::Path => Self::Revealed(CellState::Path),
            CellTag::Player => Self::Revealed(CellState::Player),
            CellTag::Exit => Self::Revealed(CellState::Exit),
        }
    }
}

/// Per-cell tag handed to the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderCell {
    Wall,
    Path,
    Player,
    Exit,
    Fog,
    FogHighlighted,
}

impl RenderCell {
    pub fn glyph(self) -> char {
        match self {
            Self::Wall => '#',
            Self::Path => '.',
            Self::Player => '@',
            Self::Exit => 'X',
            Self::Fog => '~',
            Self::FogHighlighted => '!',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::Up),
            (0, 1) => Some(Self::Down),
            (-1, 0) => Some(Self::Left),
            (1, 0) => Some(Self::Right),
            _ => None,
        }
    }

    /// WASD mapping used by keyboard front-ends.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'w' => Some(Self::Up),
            'a' => Some(Self::Left),
            's' => Some(Self::Down),
            'd' => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveRejection {
    OutOfBounds,
    Wall,
    Fog,
    Finished,
    InvalidStep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { to: Vec2 },
    Won { to: Vec2 },
    Rejected(MoveRejection),
}

impl MoveOutcome {
    pub const fn has_update(self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub const fn is_won(self) -> bool {
        matches!(self, Self::Won { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealRejection {
    UnknownGroup,
    AlreadyRevealed,
    InsufficientEnergy { needed: usize, available: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed { group_id: u32, cost: usize },
    Rejected(RevealRejection),
}

impl RevealOutcome {
    pub const fn has_update(self) -> bool {
        matches!(self, Self::Revealed { .. })
    }
}

/// Pending confirmation for revealing the fog group under a clicked cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RevealPrompt {
    #[serde(rename = "groupId")]
    pub group_id: u32,
    #[serde(rename = "groupSize")]
    pub group_size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMazeState {
    pub maze: Grid<CellState>,
    #[serde(rename = "visibleMaze", alias = "visible_maze")]
    pub visible_maze: Grid<VisibleCell>,
    #[serde(rename = "fogGroups", alias = "fog_groups")]
    pub fog_groups: Grid<u32>,
    #[serde(rename = "playerPosition", alias = "player_position")]
    pub player_position: Vec2,
}

/// A persistence write: either the whole snapshot or just the player position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MazeStatePatch {
    Full(PersistedMazeState),
    PositionOnly {
        #[serde(rename = "playerPosition", alias = "player_position")]
        player_position: Vec2,
    },
}

impl MazeStatePatch {
    pub fn player_position(&self) -> Vec2 {
        match self {
            Self::Full(state) => state.player_position,
            Self::PositionOnly { player_position } => *player_position,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Merges this write into whatever is currently stored. A position-only
    /// write has nothing to patch when no full state exists yet.
    pub fn apply_to(self, current: Option<PersistedMazeState>) -> Option<PersistedMazeState> {
        match self {
            Self::Full(state) => Some(state),
            Self::PositionOnly { player_position } => current.map(|mut state| {
                state.player_position = player_position;
                state
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_cell_uses_flat_lowercase_tags() {
        let cells = vec![
            VisibleCell::Fog,
            VisibleCell::Revealed(CellState::Wall),
            VisibleCell::Revealed(CellState::Player),
        ];
        let text = serde_json::to_string(&cells).expect("serialize cells");
        assert_eq!(text, r#"["fog","wall","player"]"#);

        let parsed: Vec<VisibleCell> =
            serde_json::from_str(r#"["exit","path","fog"]"#).expect("parse cells");
        assert_eq!(
            parsed,
            vec![
                VisibleCell::Revealed(CellState::Exit),
                VisibleCell::Revealed(CellState::Path),
                VisibleCell::Fog,
            ]
        );
    }

    #[test]
    fn maze_cells_reject_fog_tag() {
        assert!(serde_json::from_str::<CellState>(r#""fog""#).is_err());
        assert_eq!(
            serde_json::from_str::<CellState>(r#""wall""#).ok(),
            Some(CellState::Wall)
        );
    }

    #[test]
    fn visibility_consistency_check() {
        assert!(VisibleCell::Fog.is_consistent_with(CellState::Wall));
        assert!(VisibleCell::Revealed(CellState::Path).is_consistent_with(CellState::Path));
        assert!(!VisibleCell::Revealed(CellState::Path).is_consistent_with(CellState::Wall));
    }

    #[test]
    fn wasd_maps_to_unit_steps() {
        assert_eq!(Direction::from_key('w').map(Direction::delta), Some((0, -1)));
        assert_eq!(Direction::from_key('A').map(Direction::delta), Some((-1, 0)));
        assert_eq!(Direction::from_key('s').map(Direction::delta), Some((0, 1)));
        assert_eq!(Direction::from_key('d').map(Direction::delta), Some((1, 0)));
        assert_eq!(Direction::from_key('q'), None);
        assert_eq!(Direction::from_delta(1, 1), None);
        assert_eq!(Direction::from_delta(-1, 0), Some(Direction::Left));
    }

    #[test]
    fn position_patch_parses_without_grids() {
        let patch: MazeStatePatch =
            serde_json::from_str(r#"{"playerPosition":{"x":3,"y":5}}"#).expect("parse patch");
        assert_eq!(
            patch,
            MazeStatePatch::PositionOnly {
                player_position: Vec2::new(3, 5)
            }
        );
        assert!(!patch.is_full());
    }

    #[test]
    fn position_patch_needs_existing_state() {
        let patch = MazeStatePatch::PositionOnly {
            player_position: Vec2::new(1, 1),
        };
        assert_eq!(patch.apply_to(None), None);
    }
}
