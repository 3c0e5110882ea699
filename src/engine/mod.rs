use crate::config::MazeConfig;
use crate::error::StateError;
use crate::fog::{partition_with, FogGroupMap, FogLayout};
use crate::rng::RandomSource;
use crate::types::{CellState, PersistedMazeState, Vec2, VisibleCell};
use crate::world::{generate_maze, Grid};

mod movement_system;
mod reveal_system;
mod utils;

use self::utils::{first_divergent_cell, initial_visibility, is_interior};

/// Single in-memory owner of one player's maze: the true grid, what the player
/// can see, the fog partition and the player position.
#[derive(Clone, Debug, PartialEq)]
pub struct MazeEngine {
    config: MazeConfig,
    maze: Grid<CellState>,
    visible: Grid<VisibleCell>,
    fog_groups: FogGroupMap,
    player: Vec2,
    finished: bool,
    generation: u64,
}

impl MazeEngine {
    pub fn generate<R: RandomSource>(config: MazeConfig, rng: &mut R) -> Self {
        let (maze, visible, fog_groups) = build_board(&config, rng);
        let player = config.entrance;
        Self {
            config,
            maze,
            visible,
            fog_groups,
            player,
            finished: false,
            generation: 1,
        }
    }

    /// Throws away the current board and starts a fresh one at the entrance.
    pub fn regenerate<R: RandomSource>(&mut self, rng: &mut R) {
        let (maze, visible, fog_groups) = build_board(&self.config, rng);
        self.maze = maze;
        self.visible = visible;
        self.fog_groups = fog_groups;
        self.player = self.config.entrance;
        self.finished = false;
        self.generation += 1;
        tracing::info!(generation = self.generation, "maze regenerated");
    }

    /// Hydrates a stored snapshot. Position-only saves leave the stored grids
    /// with a stale `Player` tag, so tags are re-anchored on the stored
    /// position before the visibility invariant is checked.
    pub fn from_persisted(config: MazeConfig, state: PersistedMazeState) -> Result<Self, StateError> {
        let size = config.size;
        let shapes_match = state.maze.is_square_of(size)
            && state.visible_maze.is_square_of(size)
            && state.fog_groups.is_square_of(size);
        if !shapes_match {
            return Err(StateError::ShapeMismatch { expected: size });
        }

        let PersistedMazeState {
            mut maze,
            mut visible_maze,
            fog_groups,
            player_position,
        } = state;

        let standing_on = maze.get(player_position);
        if !is_interior(player_position, size)
            || standing_on.map(CellState::is_wall).unwrap_or(true)
        {
            return Err(StateError::InvalidPlayerPosition(player_position));
        }

        let exit = config.exit();
        for (pos, cell) in maze.clone().iter() {
            if cell == CellState::Player && pos != player_position {
                let restored = if pos == exit {
                    CellState::Exit
                } else {
                    CellState::Path
                };
                maze.set(pos, restored);
            }
        }
        if player_position != exit {
            maze.set(exit, CellState::Exit);
        }
        maze.set(player_position, CellState::Player);

        for (pos, cell) in visible_maze.clone().iter() {
            if cell == VisibleCell::Revealed(CellState::Player) && pos != player_position {
                visible_maze.set(pos, VisibleCell::Revealed(maze[pos]));
            }
        }
        visible_maze.set(player_position, VisibleCell::Revealed(CellState::Player));

        if let Some(pos) = first_divergent_cell(&maze, &visible_maze) {
            return Err(StateError::DivergentVisibility(pos));
        }

        Ok(Self {
            finished: player_position == exit,
            config,
            maze,
            visible: visible_maze,
            fog_groups,
            player: player_position,
            generation: 1,
        })
    }

    pub fn snapshot(&self) -> PersistedMazeState {
        PersistedMazeState {
            maze: self.maze.clone(),
            visible_maze: self.visible.clone(),
            fog_groups: self.fog_groups.clone(),
            player_position: self.player,
        }
    }

    pub fn config(&self) -> &MazeConfig {
        &self.config
    }

    pub fn maze(&self) -> &Grid<CellState> {
        &self.maze
    }

    pub fn visible(&self) -> &Grid<VisibleCell> {
        &self.visible
    }

    pub fn fog_groups(&self) -> &FogGroupMap {
        &self.fog_groups
    }

    pub fn player_position(&self) -> Vec2 {
        self.player
    }

    pub fn exit(&self) -> Vec2 {
        self.config.exit()
    }

    /// The player stands on the exit; moves are refused until regeneration.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn visibility_is_consistent(&self) -> bool {
        first_divergent_cell(&self.maze, &self.visible).is_none()
    }
}

fn build_board<R: RandomSource>(
    config: &MazeConfig,
    rng: &mut R,
) -> (Grid<CellState>, Grid<VisibleCell>, FogGroupMap) {
    let maze = generate_maze(config, rng);
    let visible = initial_visibility(&maze, config.initial_visible_radius);
    let fog_groups = partition_with(
        config.size,
        config.size,
        &FogLayout::from_config(config),
        rng,
    );
    (maze, visible, fog_groups)
}
