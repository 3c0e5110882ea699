use std::sync::Arc;

use crate::config::{MazeConfig, WinPolicy};
use crate::energy::EnergyPool;
use crate::engine::MazeEngine;
use crate::error::{ConfigError, StoreError};
use crate::rng::Rng;
use crate::store::MazeStore;
use crate::sync::{PersistenceSynchronizer, SyncStats};
use crate::types::{
    Direction, MoveOutcome, MoveRejection, RenderCell, RevealOutcome, RevealPrompt, Vec2,
};
use crate::world::Grid;

/// How the session obtained its maze.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartMode {
    /// A stored maze was hydrated.
    Restored,
    /// Nothing was stored; a new maze was generated and saved.
    Fresh,
    /// The stored maze could not be used and was replaced.
    Replaced,
    /// The backend was unreachable; play continues locally without saving.
    Offline,
}

/// One player's interactive session: the engine, the player's energy pool,
/// the pending reveal prompt, hover state and the persistence writer.
pub struct GameSession<E: EnergyPool> {
    engine: MazeEngine,
    energy: E,
    rng: Rng,
    sync: PersistenceSynchronizer,
    start_mode: StartMode,
    pending_prompt: Option<RevealPrompt>,
    hovered: Option<u32>,
    awaiting_win_ack: bool,
    completed_mazes: u32,
}

impl<E: EnergyPool> GameSession<E> {
    pub async fn start(
        config: MazeConfig,
        store: Arc<dyn MazeStore>,
        user_id: &str,
        credential: &str,
        energy: E,
        mut rng: Rng,
    ) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let loaded = store.load(user_id, credential).await;

        let (mut engine, start_mode) = match loaded {
            Ok(state) => match MazeEngine::from_persisted(config.clone(), state) {
                Ok(engine) => (engine, StartMode::Restored),
                Err(error) => {
                    tracing::warn!(user_id, %error, "stored maze rejected; generating a new one");
                    (MazeEngine::generate(config, &mut rng), StartMode::Replaced)
                }
            },
            Err(StoreError::NotFound) => (MazeEngine::generate(config, &mut rng), StartMode::Fresh),
            Err(error) => {
                tracing::warn!(user_id, %error, "maze load failed; playing offline");
                (MazeEngine::generate(config, &mut rng), StartMode::Offline)
            }
        };

        // A maze saved while standing on the exit was already won.
        if engine.is_finished() {
            engine.regenerate(&mut rng);
        }

        let sync = if start_mode == StartMode::Offline {
            PersistenceSynchronizer::disabled()
        } else {
            PersistenceSynchronizer::spawn(
                store,
                user_id.to_string(),
                credential.to_string(),
                engine.config().quiet_window(),
            )
        };
        if start_mode != StartMode::Restored || engine.generation() > 1 {
            sync.save_full(engine.snapshot());
        }

        tracing::info!(
            user_id,
            mode = ?start_mode,
            player = ?engine.player_position(),
            "session started"
        );
        Ok(Self {
            engine,
            energy,
            rng,
            sync,
            start_mode,
            pending_prompt: None,
            hovered: None,
            awaiting_win_ack: false,
            completed_mazes: 0,
        })
    }

    pub fn move_player(&mut self, dir: Direction) -> MoveOutcome {
        if self.awaiting_win_ack {
            return MoveOutcome::Rejected(MoveRejection::Finished);
        }
        let outcome = self.engine.move_player(dir);
        match outcome {
            MoveOutcome::Moved { to } => self.sync.position_moved(to),
            MoveOutcome::Won { to } => {
                self.completed_mazes += 1;
                self.energy.record_maze_completed();
                match self.engine.config().win_policy {
                    WinPolicy::RegenerateImmediately => self.start_next_maze(),
                    WinPolicy::AwaitConfirmation => {
                        self.awaiting_win_ack = true;
                        self.sync.position_moved(to);
                    }
                }
            }
            MoveOutcome::Rejected(_) => {}
        }
        outcome
    }

    /// Dismisses the win notice and starts the next maze.
    pub fn acknowledge_win(&mut self) -> bool {
        if !self.awaiting_win_ack {
            return false;
        }
        self.awaiting_win_ack = false;
        self.start_next_maze();
        true
    }

    /// Opens the reveal prompt for the fog group under `pos`. Only one prompt
    /// is open at a time; a new click replaces the old one.
    pub fn click_cell(&mut self, pos: Vec2) -> Option<RevealPrompt> {
        let prompt = self.engine.reveal_prompt_at(pos)?;
        self.pending_prompt = Some(prompt);
        Some(prompt)
    }

    pub fn confirm_reveal(&mut self) -> Option<RevealOutcome> {
        let prompt = self.pending_prompt.take()?;
        let outcome = self.engine.request_reveal(prompt.group_id, &mut self.energy);
        if outcome.has_update() {
            if self.hovered == Some(prompt.group_id) {
                self.hovered = None;
            }
            self.sync.save_full(self.engine.snapshot());
        }
        Some(outcome)
    }

    pub fn cancel_reveal(&mut self) {
        self.pending_prompt = None;
    }

    pub fn hover(&mut self, pos: Vec2) -> Option<u32> {
        self.hovered = self.engine.hover_group_at(pos);
        self.hovered
    }

    pub fn unhover(&mut self) {
        self.hovered = None;
    }

    pub fn render(&self) -> Grid<RenderCell> {
        self.engine.render(self.hovered)
    }

    pub fn render_ascii(&self) -> Vec<String> {
        self.engine.render_ascii(self.hovered)
    }

    pub fn engine(&self) -> &MazeEngine {
        &self.engine
    }

    pub fn energy(&self) -> &E {
        &self.energy
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn pending_prompt(&self) -> Option<RevealPrompt> {
        self.pending_prompt
    }

    pub fn hovered_group(&self) -> Option<u32> {
        self.hovered
    }

    pub fn completed_mazes(&self) -> u32 {
        self.completed_mazes
    }

    pub fn is_awaiting_win_ack(&self) -> bool {
        self.awaiting_win_ack
    }

    pub fn is_persistence_enabled(&self) -> bool {
        self.sync.is_enabled()
    }

    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Flushes pending saves and stops the writer. Dropping the session
    /// without this still writes the last position, but only when the store
    /// can complete the write without suspending.
    pub async fn shutdown(self) -> (E, SyncStats) {
        let stats = self.sync.shutdown().await;
        (self.energy, stats)
    }

    fn start_next_maze(&mut self) {
        self.engine.regenerate(&mut self.rng);
        self.pending_prompt = None;
        self.hovered = None;
        self.sync.save_full(self.engine.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::LocalEnergy;
    use crate::store::MemoryMazeStore;
    use crate::types::{CellState, MazeStatePatch, PersistedMazeState, VisibleCell};

    fn corridor_state() -> PersistedMazeState {
        let rows = [
            "#######",
            "#@....#",
            "#####.#",
            "#####.#",
            "#####.#",
            "#####X#",
            "#######",
        ];
        let maze = Grid::from_rows(
            rows.iter()
                .map(|row| {
                    row.chars()
                        .map(|glyph| match glyph {
                            '#' => CellState::Wall,
                            '@' => CellState::Player,
                            'X' => CellState::Exit,
                            _ => CellState::Path,
                        })
                        .collect()
                })
                .collect(),
        );
        PersistedMazeState {
            visible_maze: maze.map(|_, cell| VisibleCell::Revealed(cell)),
            fog_groups: Grid::filled(7, 1),
            maze,
            player_position: Vec2::new(1, 1),
        }
    }

    fn corridor_config() -> MazeConfig {
        MazeConfig::default().with_size(7).with_group_range(5, 7)
    }

    async fn start(
        config: MazeConfig,
        store: &Arc<MemoryMazeStore>,
    ) -> GameSession<LocalEnergy> {
        GameSession::start(
            config,
            store.clone(),
            "alice",
            "token",
            LocalEnergy::new(100),
            Rng::new(42),
        )
        .await
        .expect("valid config")
    }

    fn walk_to_exit(session: &mut GameSession<LocalEnergy>) -> MoveOutcome {
        let mut last = MoveOutcome::Rejected(MoveRejection::Finished);
        for dir in [Direction::Right; 4].into_iter().chain([Direction::Down; 4]) {
            last = session.move_player(dir);
        }
        last
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_user_gets_generated_maze_saved() {
        let store = Arc::new(MemoryMazeStore::new());
        let session = start(MazeConfig::default(), &store).await;
        assert_eq!(session.start_mode(), StartMode::Fresh);
        let snapshot = session.engine().snapshot();

        let (_, stats) = session.shutdown().await;
        assert_eq!(stats.full_saves, 1);
        assert_eq!(store.stored("alice"), Some(snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn stored_maze_is_restored_without_rewrite() {
        let stored = MazeEngine::generate(MazeConfig::default(), &mut Rng::new(5)).snapshot();
        let store = Arc::new(MemoryMazeStore::with_state("alice", stored.clone()));
        let session = start(MazeConfig::default(), &store).await;
        assert_eq!(session.start_mode(), StartMode::Restored);
        assert_eq!(session.engine().snapshot(), stored);
        session.shutdown().await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_stored_maze_is_replaced() {
        let mut stored = MazeEngine::generate(MazeConfig::default(), &mut Rng::new(5)).snapshot();
        stored.player_position = Vec2::new(0, 0);
        let store = Arc::new(MemoryMazeStore::with_state("alice", stored));
        let session = start(MazeConfig::default(), &store).await;
        assert_eq!(session.start_mode(), StartMode::Replaced);
        session.shutdown().await;
        assert_eq!(store.writes().len(), 1);
        assert!(store.writes()[0].1.is_full());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_plays_offline() {
        let store = Arc::new(MemoryMazeStore::new());
        store.set_offline(true);
        let mut session = start(MazeConfig::default(), &store).await;
        assert_eq!(session.start_mode(), StartMode::Offline);
        assert!(!session.is_persistence_enabled());

        store.set_offline(false);
        session.move_player(Direction::Right);
        session.move_player(Direction::Down);
        session.shutdown().await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_before_loading() {
        let store = Arc::new(MemoryMazeStore::new());
        let result = GameSession::start(
            MazeConfig::default().with_size(30),
            store.clone(),
            "alice",
            "token",
            LocalEnergy::new(100),
            Rng::new(1),
        )
        .await;
        assert!(matches!(result, Err(ConfigError::EvenSize(30))));
    }

    #[tokio::test(start_paused = true)]
    async fn moves_are_saved_as_one_debounced_position() {
        let store = Arc::new(MemoryMazeStore::with_state("alice", corridor_state()));
        let mut session = start(corridor_config(), &store).await;
        for _ in 0..3 {
            assert!(session.move_player(Direction::Right).has_update());
        }
        tokio::time::sleep(std::time::Duration::from_millis(5_100)).await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].1,
            MazeStatePatch::PositionOnly {
                player_position: Vec2::new(4, 1)
            }
        );
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_flushes_the_last_position() {
        let store = Arc::new(MemoryMazeStore::with_state("alice", corridor_state()));
        let mut session = start(corridor_config(), &store).await;
        session.move_player(Direction::Right);
        session.move_player(Direction::Right);
        drop(session);

        assert_eq!(
            store.stored("alice").map(|stored| stored.player_position),
            Some(Vec2::new(3, 1))
        );
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn click_confirm_reveals_and_saves() {
        let store = Arc::new(MemoryMazeStore::new());
        let mut session = start(MazeConfig::default(), &store).await;
        session.flush().await;

        assert_eq!(session.click_cell(Vec2::new(1, 1)), None);
        let prompt = session.click_cell(Vec2::new(20, 20)).expect("fog prompt");
        assert_eq!(session.pending_prompt(), Some(prompt));
        assert_eq!(session.hover(Vec2::new(20, 20)), Some(prompt.group_id));

        let outcome = session.confirm_reveal().expect("prompt pending");
        assert_eq!(
            outcome,
            RevealOutcome::Revealed {
                group_id: prompt.group_id,
                cost: prompt.group_size,
            }
        );
        assert_eq!(session.pending_prompt(), None);
        assert_eq!(session.hovered_group(), None);
        assert_eq!(
            session.energy().balance(),
            100 - prompt.group_size as i64
        );
        assert_eq!(session.confirm_reveal(), None);

        let (_, stats) = session.shutdown().await;
        assert_eq!(stats.full_saves, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_prompt_costs_nothing() {
        let store = Arc::new(MemoryMazeStore::new());
        let mut session = start(MazeConfig::default(), &store).await;
        session.click_cell(Vec2::new(20, 20)).expect("fog prompt");
        let replaced = session.click_cell(Vec2::new(10, 25)).expect("second prompt");
        assert_eq!(session.pending_prompt(), Some(replaced));
        session.cancel_reveal();
        assert_eq!(session.confirm_reveal(), None);
        assert_eq!(session.energy().balance(), 100);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hover_only_registers_on_fog() {
        let store = Arc::new(MemoryMazeStore::new());
        let mut session = start(MazeConfig::default(), &store).await;
        assert_eq!(session.hover(Vec2::new(1, 1)), None);
        let group_id = session.hover(Vec2::new(20, 20)).expect("fog group");
        assert_eq!(
            session.render()[Vec2::new(20, 20)],
            RenderCell::FogHighlighted
        );
        session.unhover();
        assert_eq!(session.render()[Vec2::new(20, 20)], RenderCell::Fog);
        assert_eq!(session.engine().group_at(Vec2::new(20, 20)), Some(group_id));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn win_regenerates_immediately_by_default() {
        let store = Arc::new(MemoryMazeStore::with_state("alice", corridor_state()));
        let mut session = start(corridor_config(), &store).await;

        assert!(walk_to_exit(&mut session).is_won());
        assert_eq!(session.engine().generation(), 2);
        assert_eq!(session.engine().player_position(), Vec2::new(1, 1));
        assert!(!session.engine().is_finished());
        assert_eq!(session.completed_mazes(), 1);

        let (energy, stats) = session.shutdown().await;
        assert_eq!(energy.completed_mazes(), 1);
        assert_eq!(stats.full_saves, 1);
        assert_ne!(store.stored("alice"), Some(corridor_state()));
    }

    #[tokio::test(start_paused = true)]
    async fn win_can_wait_for_acknowledgement() {
        let store = Arc::new(MemoryMazeStore::with_state("alice", corridor_state()));
        let config = corridor_config().with_win_policy(WinPolicy::AwaitConfirmation);
        let mut session = start(config, &store).await;

        assert!(walk_to_exit(&mut session).is_won());
        assert!(session.is_awaiting_win_ack());
        assert_eq!(
            session.move_player(Direction::Up),
            MoveOutcome::Rejected(MoveRejection::Finished)
        );

        assert!(session.acknowledge_win());
        assert!(!session.acknowledge_win());
        assert_eq!(session.engine().generation(), 2);
        assert_eq!(session.engine().player_position(), Vec2::new(1, 1));
        session.shutdown().await;
    }
}
