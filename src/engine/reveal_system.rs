use super::*;
use crate::config::RevealPolicy;
use crate::energy::EnergyPool;
use crate::fog::{group_cells, group_size};
use crate::types::{RenderCell, RevealOutcome, RevealPrompt, RevealRejection};

impl MazeEngine {
    /// Cell at `pos` as the player sees it.
    pub fn query(&self, pos: Vec2) -> Option<VisibleCell> {
        self.visible.get(pos)
    }

    pub fn group_at(&self, pos: Vec2) -> Option<u32> {
        self.fog_groups.get(pos)
    }

    pub fn group_size_of(&self, group_id: u32) -> usize {
        group_size(&self.fog_groups, group_id)
    }

    /// At least one cell of the group is still fogged.
    pub fn is_group_hidden(&self, group_id: u32) -> bool {
        self.fog_groups
            .iter()
            .any(|(pos, id)| id == group_id && self.visible[pos].is_fog())
    }

    /// Clicking only offers a reveal on fogged cells.
    pub fn reveal_prompt_at(&self, pos: Vec2) -> Option<RevealPrompt> {
        if !self.query(pos)?.is_fog() {
            return None;
        }
        let group_id = self.group_at(pos)?;
        Some(RevealPrompt {
            group_id,
            group_size: self.group_size_of(group_id),
        })
    }

    /// Hover highlighting also registers on fogged cells only.
    pub fn hover_group_at(&self, pos: Vec2) -> Option<u32> {
        if !self.query(pos)?.is_fog() {
            return None;
        }
        self.group_at(pos)
    }

    /// Lifts the fog from every cell of `group_id` and charges the full group
    /// size, including cells that were already visible.
    pub fn request_reveal(&mut self, group_id: u32, energy: &mut dyn EnergyPool) -> RevealOutcome {
        let cells = group_cells(&self.fog_groups, group_id);
        if cells.is_empty() {
            return RevealOutcome::Rejected(RevealRejection::UnknownGroup);
        }
        if !cells.iter().any(|pos| self.visible[*pos].is_fog()) {
            return RevealOutcome::Rejected(RevealRejection::AlreadyRevealed);
        }

        let cost = cells.len();
        let available = energy.balance();
        if self.config.reveal_policy == RevealPolicy::RequireBalance
            && available < cost as i64
        {
            tracing::debug!(group_id, cost, available, "reveal refused for low energy");
            return RevealOutcome::Rejected(RevealRejection::InsufficientEnergy {
                needed: cost,
                available,
            });
        }

        for pos in &cells {
            self.visible.set(*pos, VisibleCell::Revealed(self.maze[*pos]));
        }
        energy.decrease(cost as u32);
        tracing::info!(
            group_id,
            cost,
            balance = energy.balance(),
            "fog group revealed"
        );
        RevealOutcome::Revealed { group_id, cost }
    }

    /// Display grid with the hovered group's fog cells highlighted.
    pub fn render(&self, hovered: Option<u32>) -> Grid<RenderCell> {
        self.visible.map(|pos, cell| match cell {
            VisibleCell::Fog if hovered.is_some() && self.fog_groups.get(pos) == hovered => {
                RenderCell::FogHighlighted
            }
            VisibleCell::Fog => RenderCell::Fog,
            VisibleCell::Revealed(CellState::Wall) => RenderCell::Wall,
            VisibleCell::Revealed(CellState::Path) => RenderCell::Path,
            VisibleCell::Revealed(CellState::Player) => RenderCell::Player,
            VisibleCell::Revealed(CellState::Exit) => RenderCell::Exit,
        })
    }

    pub fn render_ascii(&self, hovered: Option<u32>) -> Vec<String> {
        self.render(hovered)
            .rows()
            .iter()
            .map(|row| row.iter().map(|cell| cell.glyph()).collect())
            .collect()
    }
}
