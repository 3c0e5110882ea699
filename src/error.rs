use thiserror::Error;

use crate::types::Vec2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maze size {0} must be odd to keep an odd-coordinate carving lattice")]
    EvenSize(i32),
    #[error("maze size {size} is below the minimum of {min}")]
    SizeTooSmall { size: i32, min: i32 },
    #[error("fog group sizes must be at least 1")]
    EmptyGroupRange,
    #[error("fog group range is inverted: min {min} > max {max}")]
    InvertedGroupRange { min: usize, max: usize },
    #[error("fog group size {max} exceeds the {cells} cells of the board")]
    GroupRangeTooLarge { max: usize, cells: usize },
    #[error("entrance ({}, {}) must be an odd interior cell distinct from the exit", .0.x, .0.y)]
    InvalidEntrance(Vec2),
    #[error("initial visible radius must not be negative")]
    NegativeRadius,
    #[error("entrance ({}, {}) lies outside the revealed corner of radius {radius}", .entrance.x, .entrance.y)]
    EntranceOutsideViewport { entrance: Vec2, radius: i32 },
    #[error("position save quiet window must be longer than zero")]
    ZeroQuietWindow,
}

/// A persisted snapshot that cannot be hydrated into a live maze.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("grid is not {expected}x{expected}")]
    ShapeMismatch { expected: i32 },
    #[error("player position ({}, {}) is outside the interior or on a wall", .0.x, .0.y)]
    InvalidPlayerPosition(Vec2),
    #[error("revealed cell ({}, {}) does not mirror the maze", .0.x, .0.y)]
    DivergentVisibility(Vec2),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no maze state stored for this user")]
    NotFound,
    #[error("missing or rejected bearer credential")]
    Unauthorized,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
