use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    exit_for_size, ENTRANCE, FOG_GROUP_BASE_ID, FOG_GROUP_MAX_SIZE, FOG_GROUP_MIN_SIZE,
    INITIAL_VISIBLE_RADIUS, MAZE_SIZE, MIN_MAZE_SIZE, POSITION_SAVE_QUIET_MS,
};
use crate::error::ConfigError;
use crate::types::Vec2;

/// What happens when a reveal costs more energy than the balance holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevealPolicy {
    #[default]
    AllowOverdraft,
    RequireBalance,
}

impl RevealPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overdraft" | "allow_overdraft" => Some(Self::AllowOverdraft),
            "strict" | "require_balance" => Some(Self::RequireBalance),
            _ => None,
        }
    }
}

/// How a session reacts once the player steps onto the exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WinPolicy {
    #[default]
    RegenerateImmediately,
    AwaitConfirmation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Every group but the last has a size inside the configured range.
    #[default]
    SerpentineBands,
    /// Contiguous and capped at the maximum, but may leave several undersized
    /// pockets.
    FrontierBfs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MazeConfig {
    pub size: i32,
    pub entrance: Vec2,
    pub group_min_size: usize,
    pub group_max_size: usize,
    pub group_base_id: u32,
    pub initial_visible_radius: i32,
    pub reveal_policy: RevealPolicy,
    pub win_policy: WinPolicy,
    pub partition_strategy: PartitionStrategy,
    pub position_save_quiet_ms: u64,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            size: MAZE_SIZE,
            entrance: ENTRANCE,
            group_min_size: FOG_GROUP_MIN_SIZE,
            group_max_size: FOG_GROUP_MAX_SIZE,
            group_base_id: FOG_GROUP_BASE_ID,
            initial_visible_radius: INITIAL_VISIBLE_RADIUS,
            reveal_policy: RevealPolicy::default(),
            win_policy: WinPolicy::default(),
            partition_strategy: PartitionStrategy::default(),
            position_save_quiet_ms: POSITION_SAVE_QUIET_MS,
        }
    }
}

impl MazeConfig {
    pub fn exit(&self) -> Vec2 {
        exit_for_size(self.size)
    }

    pub fn total_cells(&self) -> usize {
        (self.size as usize) * (self.size as usize)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.position_save_quiet_ms)
    }

    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    pub fn with_group_range(mut self, min: usize, max: usize) -> Self {
        self.group_min_size = min;
        self.group_max_size = max;
        self
    }

    pub fn with_reveal_policy(mut self, policy: RevealPolicy) -> Self {
        self.reveal_policy = policy;
        self
    }

    pub fn with_win_policy(mut self, policy: WinPolicy) -> Self {
        self.win_policy = policy;
        self
    }

    pub fn with_partition_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.partition_strategy = strategy;
        self
    }

    pub fn with_quiet_ms(mut self, quiet_ms: u64) -> Self {
        self.position_save_quiet_ms = quiet_ms;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size < MIN_MAZE_SIZE {
            return Err(ConfigError::SizeTooSmall {
                size: self.size,
                min: MIN_MAZE_SIZE,
            });
        }
        if self.size % 2 == 0 {
            return Err(ConfigError::EvenSize(self.size));
        }
        if self.group_min_size == 0 || self.group_max_size == 0 {
            return Err(ConfigError::EmptyGroupRange);
        }
        if self.group_min_size > self.group_max_size {
            return Err(ConfigError::InvertedGroupRange {
                min: self.group_min_size,
                max: self.group_max_size,
            });
        }
        if self.group_max_size > self.total_cells() {
            return Err(ConfigError::GroupRangeTooLarge {
                max: self.group_max_size,
                cells: self.total_cells(),
            });
        }
        let entrance = self.entrance;
        let on_lattice = entrance.x % 2 == 1 && entrance.y % 2 == 1;
        let inside = entrance.x > 0
            && entrance.y > 0
            && entrance.x < self.size - 1
            && entrance.y < self.size - 1;
        if !on_lattice || !inside || entrance == self.exit() {
            return Err(ConfigError::InvalidEntrance(entrance));
        }
        if self.initial_visible_radius < 0 {
            return Err(ConfigError::NegativeRadius);
        }
        // The starting viewport is the top-left corner; the player must begin inside it.
        let radius = self.initial_visible_radius;
        if entrance.x > radius || entrance.y > radius {
            return Err(ConfigError::EntranceOutsideViewport { entrance, radius });
        }
        if self.position_save_quiet_ms == 0 {
            return Err(ConfigError::ZeroQuietWindow);
        }
        Ok(())
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub port: u16,
    pub db_path: PathBuf,
    pub static_dir: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);
        let db_path = std::env::var("MAZE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".data/maze.json"));
        let static_dir = std::env::var("STATIC_DIR").ok().map(PathBuf::from);
        Self {
            port,
            db_path,
            static_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MazeConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.exit(), Vec2::new(29, 29));
        assert_eq!(config.total_cells(), 961);
    }

    #[test]
    fn even_size_fails_fast() {
        let err = MazeConfig::default().with_size(30).validate();
        assert_eq!(err, Err(ConfigError::EvenSize(30)));
    }

    #[test]
    fn tiny_size_fails_fast() {
        let err = MazeConfig::default().with_size(3).validate();
        assert_eq!(err, Err(ConfigError::SizeTooSmall { size: 3, min: 5 }));
    }

    #[test]
    fn inverted_group_range_fails_fast() {
        let err = MazeConfig::default().with_group_range(30, 25).validate();
        assert_eq!(err, Err(ConfigError::InvertedGroupRange { min: 30, max: 25 }));
        let err = MazeConfig::default().with_group_range(0, 25).validate();
        assert_eq!(err, Err(ConfigError::EmptyGroupRange));
    }

    #[test]
    fn entrance_must_sit_on_the_lattice() {
        let mut config = MazeConfig::default();
        config.entrance = Vec2::new(2, 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidEntrance(Vec2::new(2, 1)))
        );
        config.entrance = Vec2::new(29, 29);
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_group_range_is_rejected() {
        let err = MazeConfig::default()
            .with_group_range(25, usize::MAX)
            .validate();
        assert_eq!(
            err,
            Err(ConfigError::GroupRangeTooLarge {
                max: usize::MAX,
                cells: 961
            })
        );
        let err = MazeConfig::default().with_size(5).with_group_range(1, 26).validate();
        assert_eq!(err, Err(ConfigError::GroupRangeTooLarge { max: 26, cells: 25 }));
        assert_eq!(
            MazeConfig::default().with_size(5).with_group_range(1, 25).validate(),
            Ok(())
        );
    }

    #[test]
    fn entrance_must_start_inside_the_viewport() {
        let mut config = MazeConfig::default();
        config.entrance = Vec2::new(29, 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EntranceOutsideViewport {
                entrance: Vec2::new(29, 1),
                radius: 2
            })
        );
        config.initial_visible_radius = 0;
        config.entrance = Vec2::new(1, 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EntranceOutsideViewport {
                entrance: Vec2::new(1, 1),
                radius: 0
            })
        );
        config.initial_visible_radius = 1;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn zero_quiet_window_is_rejected() {
        let err = MazeConfig::default().with_quiet_ms(0).validate();
        assert_eq!(err, Err(ConfigError::ZeroQuietWindow));
    }

    #[test]
    fn reveal_policy_parsing() {
        assert_eq!(RevealPolicy::parse(" Strict "), Some(RevealPolicy::RequireBalance));
        assert_eq!(RevealPolicy::parse("overdraft"), Some(RevealPolicy::AllowOverdraft));
        assert_eq!(RevealPolicy::parse("maybe"), None);
    }
}
