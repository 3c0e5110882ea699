use std::collections::{HashSet, VecDeque};
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::config::MazeConfig;
use crate::rng::RandomSource;
use crate::types::{CellState, Direction, Vec2};

/// Matrix indexed by `(x, y)`, stored row-major as `rows[y][x]`. Mazes are
/// square; the fog partitioner also accepts rectangles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid<T> {
    rows: Vec<Vec<T>>,
}

impl<T: Copy> Grid<T> {
    pub fn filled(size: i32, value: T) -> Self {
        Self::filled_rect(size, size, value)
    }

    pub fn filled_rect(width: i32, height: i32, value: T) -> Self {
        Self {
            rows: vec![vec![value; width.max(0) as usize]; height.max(0) as usize],
        }
    }

    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        Self { rows }
    }

    /// Side length of a square grid (the row count).
    pub fn size(&self) -> i32 {
        self.height()
    }

    pub fn width(&self) -> i32 {
        self.rows.first().map(|row| row.len() as i32).unwrap_or(0)
    }

    pub fn height(&self) -> i32 {
        self.rows.len() as i32
    }

    /// Every row has exactly `size` cells.
    pub fn is_square_of(&self, size: i32) -> bool {
        self.size() == size && self.rows.iter().all(|row| row.len() as i32 == size)
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && self
                .rows
                .get(pos.y as usize)
                .map(|row| (pos.x as usize) < row.len())
                .unwrap_or(false)
    }

    pub fn get(&self, pos: Vec2) -> Option<T> {
        if pos.x < 0 || pos.y < 0 {
            return None;
        }
        self.rows
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
            .copied()
    }

    pub fn set(&mut self, pos: Vec2, value: T) -> bool {
        if pos.x < 0 || pos.y < 0 {
            return false;
        }
        match self
            .rows
            .get_mut(pos.y as usize)
            .and_then(|row| row.get_mut(pos.x as usize))
        {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vec2, T)> + '_ {
        self.rows.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, cell)| (Vec2::new(x as i32, y as i32), *cell))
        })
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(Vec2, T) -> U) -> Grid<U> {
        Grid {
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(y, row)| {
                    row.iter()
                        .enumerate()
                        .map(|(x, cell)| f(Vec2::new(x as i32, y as i32), *cell))
                        .collect()
                })
                .collect(),
        }
    }

    pub fn neighbors(&self, pos: Vec2) -> impl Iterator<Item = Vec2> + '_ {
        Direction::ALL
            .into_iter()
            .map(move |dir| pos.offset(dir))
            .filter(move |next| self.contains(*next))
    }
}

impl<T> Index<Vec2> for Grid<T> {
    type Output = T;

    fn index(&self, pos: Vec2) -> &Self::Output {
        &self.rows[pos.y as usize][pos.x as usize]
    }
}

/// Carves a perfect maze over the odd lattice, repairs exit connectivity and
/// tags the entrance as `Player` and the exit as `Exit`.
pub fn generate_maze<R: RandomSource>(config: &MazeConfig, rng: &mut R) -> Grid<CellState> {
    let mut grid = Grid::filled(config.size, CellState::Wall);
    let entrance = config.entrance;
    let exit = config.exit();

    grid.set(entrance, CellState::Path);
    carve_passages(&mut grid, entrance, rng);
    repair_exit_path(&mut grid, entrance, exit);

    grid.set(entrance, CellState::Player);
    grid.set(exit, CellState::Exit);
    grid
}

/// Randomized depth-first backtracking with step size 2. An explicit stack of
/// frames keeps the visiting order of the recursive formulation: directions
/// are shuffled once on entry and each is re-checked when its turn comes.
pub fn carve_passages<R: RandomSource>(grid: &mut Grid<CellState>, start: Vec2, rng: &mut R) {
    let size = grid.size();
    let mut stack = vec![(start, shuffled_directions(rng), 0usize)];

    while let Some((cell, dirs, next_dir)) = stack.last_mut() {
        let Some(dir) = dirs.get(*next_dir).copied() else {
            stack.pop();
            continue;
        };
        *next_dir += 1;
        let cell = *cell;

        let (dx, dy) = dir.delta();
        let target = Vec2::new(cell.x + dx * 2, cell.y + dy * 2);
        let inside = target.x > 0 && target.x < size - 1 && target.y > 0 && target.y < size - 1;
        if !inside || grid.get(target) != Some(CellState::Wall) {
            continue;
        }

        grid.set(Vec2::new(cell.x + dx, cell.y + dy), CellState::Path);
        grid.set(target, CellState::Path);
        stack.push((target, shuffled_directions(rng), 0));
    }
}

fn shuffled_directions<R: RandomSource>(rng: &mut R) -> [Direction; 4] {
    let mut dirs = Direction::ALL;
    rng.shuffle(&mut dirs);
    dirs
}

/// Walks diagonally from a walled-in exit toward the entrance, opening walls
/// until it meets an existing passage. If that still leaves the exit cut off
/// (only possible off the default corner geometry) a straight corridor is
/// opened toward the entrance.
pub fn repair_exit_path(grid: &mut Grid<CellState>, entrance: Vec2, exit: Vec2) {
    if grid.get(exit) == Some(CellState::Wall) {
        let mut pos = exit;
        while grid.get(pos) == Some(CellState::Wall) {
            grid.set(pos, CellState::Path);
            if pos == entrance {
                break;
            }
            pos = Vec2::new(
                pos.x + (entrance.x - pos.x).signum(),
                pos.y + (entrance.y - pos.y).signum(),
            );
        }
    }

    if build_reachable_cells(grid, entrance).contains(&exit) {
        return;
    }
    tracing::debug!(?exit, "diagonal repair left exit unreachable, opening corridor");
    open_corridor(grid, exit, entrance);
}

fn open_corridor(grid: &mut Grid<CellState>, from: Vec2, to: Vec2) {
    let mut pos = from;
    while pos.x != to.x {
        grid.set(pos, CellState::Path);
        pos.x += (to.x - pos.x).signum();
    }
    while pos.y != to.y {
        grid.set(pos, CellState::Path);
        pos.y += (to.y - pos.y).signum();
    }
}

pub fn is_walkable(grid: &Grid<CellState>, pos: Vec2) -> bool {
    grid.get(pos).map(|cell| !cell.is_wall()).unwrap_or(false)
}

pub fn build_reachable_cells(grid: &Grid<CellState>, start: Vec2) -> HashSet<Vec2> {
    let mut out = HashSet::new();
    if !is_walkable(grid, start) {
        return out;
    }

    let mut queue = VecDeque::new();
    out.insert(start);
    queue.push_back(start);

    while let Some(pos) = queue.pop_front() {
        for next in grid.neighbors(pos) {
            if !is_walkable(grid, next) {
                continue;
            }
            if out.insert(next) {
                queue.push_back(next);
            }
        }
    }

    out
}
