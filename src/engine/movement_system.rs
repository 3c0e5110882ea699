use super::*;
use crate::types::{Direction, MoveOutcome, MoveRejection};

impl MazeEngine {
    pub fn move_player(&mut self, dir: Direction) -> MoveOutcome {
        if self.finished {
            return MoveOutcome::Rejected(MoveRejection::Finished);
        }

        let to = self.player.offset(dir);
        if !is_interior(to, self.config.size) {
            return MoveOutcome::Rejected(MoveRejection::OutOfBounds);
        }
        if self.maze[to].is_wall() {
            return MoveOutcome::Rejected(MoveRejection::Wall);
        }
        if self.visible[to].is_fog() {
            return MoveOutcome::Rejected(MoveRejection::Fog);
        }

        let won = self.maze[to] == CellState::Exit;
        let from = self.player;
        self.maze.set(from, CellState::Path);
        self.visible.set(from, VisibleCell::Revealed(CellState::Path));
        self.maze.set(to, CellState::Player);
        self.visible.set(to, VisibleCell::Revealed(CellState::Player));
        self.player = to;

        if won {
            self.finished = true;
            tracing::info!(generation = self.generation, "exit reached");
            MoveOutcome::Won { to }
        } else {
            MoveOutcome::Moved { to }
        }
    }

    /// Raw-delta entry point; anything but a single orthogonal step is refused.
    pub fn move_by(&mut self, dx: i32, dy: i32) -> MoveOutcome {
        match Direction::from_delta(dx, dy) {
            Some(dir) => self.move_player(dir),
            None => MoveOutcome::Rejected(MoveRejection::InvalidStep),
        }
    }
}
