use crate::types::{CellState, Vec2, VisibleCell};
use crate::world::Grid;

/// Strictly inside the outer wall ring.
pub(super) fn is_interior(pos: Vec2, size: i32) -> bool {
    pos.x > 0 && pos.y > 0 && pos.x < size - 1 && pos.y < size - 1
}

/// Reveals the square `[0, radius] x [0, radius]` around the top-left corner.
pub(super) fn initial_visibility(maze: &Grid<CellState>, radius: i32) -> Grid<VisibleCell> {
    maze.map(|pos, cell| {
        if pos.x <= radius && pos.y <= radius {
            VisibleCell::Revealed(cell)
        } else {
            VisibleCell::Fog
        }
    })
}

pub(super) fn first_divergent_cell(
    maze: &Grid<CellState>,
    visible: &Grid<VisibleCell>,
) -> Option<Vec2> {
    visible
        .iter()
        .find(|(pos, seen)| {
            maze.get(*pos)
                .map(|actual| !seen.is_consistent_with(actual))
                .unwrap_or(true)
        })
        .map(|(pos, _)| pos)
}
