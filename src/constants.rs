use crate::types::Vec2;

pub const MAZE_SIZE: i32 = 31;
pub const ENTRANCE: Vec2 = Vec2 { x: 1, y: 1 };

pub const FOG_GROUP_MIN_SIZE: usize = 25;
pub const FOG_GROUP_MAX_SIZE: usize = 30;
pub const FOG_GROUP_BASE_ID: u32 = 1;

/// Cells with both coordinates `<=` this value start revealed.
pub const INITIAL_VISIBLE_RADIUS: i32 = 2;

pub const POSITION_SAVE_QUIET_MS: u64 = 5_000;

pub const MIN_MAZE_SIZE: i32 = 5;

pub const DEFAULT_ENERGY: i64 = 100;

/// Exit sits at the corner opposite the entrance on the odd lattice.
pub fn exit_for_size(size: i32) -> Vec2 {
    Vec2 {
        x: size - 2,
        y: size - 2,
    }
}

/// Rows per band for the serpentine fog layout, close to the square root of
/// the mean group size so groups come out roughly square.
pub fn serpentine_band_height(min_size: usize, max_size: usize) -> i32 {
    let mean = (min_size + max_size) as f32 / 2.0;
    (mean.sqrt().round() as i32).max(1)
}
