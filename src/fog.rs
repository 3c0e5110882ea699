//! Partitioning of the whole board into contiguous fog groups.
//!
//! Group ids are handed out in discovery order from a configurable base and
//! stay fixed until the maze is regenerated. The partition ignores walls: every
//! coordinate maps to exactly one group so click and hover lookups are total.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::config::{MazeConfig, PartitionStrategy};
use crate::constants::{serpentine_band_height, FOG_GROUP_BASE_ID};
use crate::rng::RandomSource;
use crate::types::Vec2;
use crate::world::Grid;

pub type FogGroupMap = Grid<u32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FogLayout {
    pub min_size: usize,
    pub max_size: usize,
    pub base_id: u32,
    pub strategy: PartitionStrategy,
}

impl FogLayout {
    pub fn from_config(config: &MazeConfig) -> Self {
        Self {
            min_size: config.group_min_size,
            max_size: config.group_max_size,
            base_id: config.group_base_id,
            strategy: config.partition_strategy,
        }
    }
}

/// Default partition: serpentine bands, ids starting at the standard base.
pub fn partition<R: RandomSource>(
    width: i32,
    height: i32,
    min_size: usize,
    max_size: usize,
    rng: &mut R,
) -> FogGroupMap {
    partition_with(
        width,
        height,
        &FogLayout {
            min_size,
            max_size,
            base_id: FOG_GROUP_BASE_ID,
            strategy: PartitionStrategy::SerpentineBands,
        },
        rng,
    )
}

pub fn partition_with<R: RandomSource>(
    width: i32,
    height: i32,
    layout: &FogLayout,
    rng: &mut R,
) -> FogGroupMap {
    let min_size = layout.min_size.max(1);
    let max_size = layout.max_size.max(min_size);
    match layout.strategy {
        PartitionStrategy::SerpentineBands => {
            let band_height = serpentine_band_height(min_size, max_size);
            let order = serpentine_order(width, height, band_height);
            chunk_order(width, height, &order, min_size, max_size, layout.base_id, rng)
        }
        PartitionStrategy::FrontierBfs => {
            frontier_partition(width, height, min_size, max_size, layout.base_id, rng)
        }
    }
}

/// Visits every cell so that consecutive entries are 4-adjacent: the board is
/// cut into horizontal bands, each band is swept column by column alternating
/// down and up, and successive bands run in opposite horizontal directions.
/// With an even width the sweep cannot hand over between bands, so bands
/// collapse to single rows.
pub fn serpentine_order(width: i32, height: i32, band_height: i32) -> Vec<Vec2> {
    let band_height = if width % 2 == 0 { 1 } else { band_height.max(1) };
    let mut out = Vec::with_capacity((width.max(0) * height.max(0)) as usize);
    let mut top = 0;
    let mut band = 0;

    while top < height {
        let bottom = (top + band_height).min(height);
        for step in 0..width {
            let x = if band % 2 == 0 { step } else { width - 1 - step };
            if step % 2 == 0 {
                out.extend((top..bottom).map(|y| Vec2::new(x, y)));
            } else {
                out.extend((top..bottom).rev().map(|y| Vec2::new(x, y)));
            }
        }
        top = bottom;
        band += 1;
    }

    out
}

/// Cuts a path ordering into runs of random length in `[min_size, max_size]`.
/// Only the final run may come up short.
fn chunk_order<R: RandomSource>(
    width: i32,
    height: i32,
    order: &[Vec2],
    min_size: usize,
    max_size: usize,
    base_id: u32,
    rng: &mut R,
) -> FogGroupMap {
    let mut groups = Grid::filled_rect(width, height, base_id);
    let mut group_id = base_id;
    let mut start = 0;

    while start < order.len() {
        let target = rng.int(min_size as i32, max_size as i32) as usize;
        let end = (start + target).min(order.len());
        for pos in &order[start..end] {
            groups.set(*pos, group_id);
        }
        start = end;
        group_id += 1;
    }

    groups
}

/// Raster-seeded bounded BFS. Seeds are the lowest unassigned row-major cell;
/// regions stop at a random target size or when boxed in. Boxed-in pockets
/// below `min_size` are folded into an adjacent group whenever the merged size
/// still fits `max_size`.
///
/// Groups never exceed `max_size` and are always contiguous, but several
/// pockets can stay below `min_size` when every neighbour is too full to take
/// them. Only [`PartitionStrategy::SerpentineBands`] keeps all groups but the
/// last inside the range.
fn frontier_partition<R: RandomSource>(
    width: i32,
    height: i32,
    min_size: usize,
    max_size: usize,
    base_id: u32,
    rng: &mut R,
) -> FogGroupMap {
    let mut assigned: Grid<Option<u32>> = Grid::filled_rect(width, height, None);
    let mut next_id = base_id;

    for y in 0..height {
        for x in 0..width {
            let seed = Vec2::new(x, y);
            if assigned.get(seed).flatten().is_some() {
                continue;
            }
            let target = rng.int(min_size as i32, max_size as i32) as usize;
            grow_region(&mut assigned, seed, target, next_id);
            next_id += 1;
        }
    }

    let mut groups = assigned.map(|_, id| id.unwrap_or(base_id));
    merge_small_groups(&mut groups, min_size, max_size);
    renumber_in_discovery_order(&mut groups, base_id);
    groups
}

fn grow_region(assigned: &mut Grid<Option<u32>>, seed: Vec2, target: usize, id: u32) {
    let mut queue = VecDeque::new();
    assigned.set(seed, Some(id));
    queue.push_back(seed);
    let mut size = 1;

    while size < target {
        let Some(pos) = queue.pop_front() else {
            break;
        };
        let candidates: Vec<Vec2> = assigned
            .neighbors(pos)
            .filter(|next| assigned.get(*next) == Some(None))
            .collect();
        for next in candidates {
            if size >= target {
                break;
            }
            assigned.set(next, Some(id));
            queue.push_back(next);
            size += 1;
        }
    }
}

fn merge_small_groups(groups: &mut FogGroupMap, min_size: usize, max_size: usize) {
    loop {
        let sizes = group_sizes(groups);
        let mut merge: Option<(u32, u32)> = None;

        for (&id, &size) in &sizes {
            if size >= min_size {
                continue;
            }
            let best = adjacent_groups(groups, id)
                .into_iter()
                .filter(|other| sizes.get(other).copied().unwrap_or(0) + size <= max_size)
                .min_by_key(|other| (sizes.get(other).copied().unwrap_or(0), *other));
            if let Some(into) = best {
                merge = Some((id, into));
                break;
            }
        }

        let Some((from, into)) = merge else {
            return;
        };
        for (pos, id) in groups.clone().iter() {
            if id == from {
                groups.set(pos, into);
            }
        }
    }
}

fn adjacent_groups(groups: &FogGroupMap, id: u32) -> HashSet<u32> {
    let mut out = HashSet::new();
    for (pos, cell) in groups.iter() {
        if cell != id {
            continue;
        }
        for next in groups.neighbors(pos) {
            if let Some(other) = groups.get(next) {
                if other != id {
                    out.insert(other);
                }
            }
        }
    }
    out
}

fn renumber_in_discovery_order(groups: &mut FogGroupMap, base_id: u32) {
    let mut mapping: HashMap<u32, u32> = HashMap::new();
    let mut next = base_id;
    for (_, id) in groups.iter() {
        mapping.entry(id).or_insert_with(|| {
            let assigned = next;
            next += 1;
            assigned
        });
    }
    *groups = groups.map(|_, id| mapping.get(&id).copied().unwrap_or(id));
}

/// Cell count of one group. Linear in the board area; callers that need it
/// repeatedly should use [`group_sizes`].
pub fn group_size(groups: &FogGroupMap, id: u32) -> usize {
    groups.iter().filter(|(_, cell)| *cell == id).count()
}

pub fn group_cells(groups: &FogGroupMap, id: u32) -> Vec<Vec2> {
    groups
        .iter()
        .filter(|(_, cell)| *cell == id)
        .map(|(pos, _)| pos)
        .collect()
}

pub fn group_sizes(groups: &FogGroupMap) -> BTreeMap<u32, usize> {
    let mut out = BTreeMap::new();
    for (_, id) in groups.iter() {
        *out.entry(id).or_insert(0) += 1;
    }
    out
}

/// True when every cell of `id` is 4-connected to every other.
pub fn is_contiguous(groups: &FogGroupMap, id: u32) -> bool {
    let cells = group_cells(groups, id);
    let Some(&start) = cells.first() else {
        return false;
    };

    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(pos) = queue.pop_front() {
        for next in groups.neighbors(pos) {
            if groups.get(next) == Some(id) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen.len() == cells.len()
}
