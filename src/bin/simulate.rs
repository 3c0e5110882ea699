use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use fog_maze_server::config::{MazeConfig, RevealPolicy};
use fog_maze_server::constants::DEFAULT_ENERGY;
use fog_maze_server::energy::{EnergyPool, LocalEnergy};
use fog_maze_server::engine::MazeEngine;
use fog_maze_server::logging::init_tracing;
use fog_maze_server::rng::Rng;
use fog_maze_server::session::GameSession;
use fog_maze_server::store::{FileMazeStore, MazeStore, MemoryMazeStore};
use fog_maze_server::types::{CellState, Direction, MoveOutcome, RevealOutcome, Vec2, VisibleCell};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 2)]
    scenarios: usize,
    #[arg(long, default_value_t = DEFAULT_ENERGY)]
    energy: i64,
    /// `overdraft` or `strict`.
    #[arg(long)]
    policy: Option<String>,
    /// JSON store file; an in-memory store is used when omitted.
    #[arg(long)]
    store: Option<PathBuf>,
    #[arg(long, default_value_t = 5_000)]
    max_steps: usize,
    #[arg(long, default_value = "sim")]
    user: String,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Scenario {
    name: String,
    user_id: String,
    seed: u32,
    energy: i64,
    policy: RevealPolicy,
    max_steps: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ScenarioEnd {
    Won,
    OutOfEnergy,
    NoFrontier,
    StepLimit,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    end: ScenarioEnd,
    steps: usize,
    moves: usize,
    #[serde(rename = "blockedMoves")]
    blocked_moves: usize,
    reveals: usize,
    #[serde(rename = "energySpent")]
    energy_spent: u64,
    #[serde(rename = "finalBalance")]
    final_balance: i64,
    #[serde(rename = "completedMazes")]
    completed_mazes: u32,
    #[serde(rename = "fullSaves")]
    full_saves: u32,
    #[serde(rename = "positionSaves")]
    position_saves: u32,
    #[serde(rename = "saveFailures")]
    save_failures: u32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "winCount")]
    win_count: usize,
    #[serde(rename = "averageSteps")]
    average_steps: usize,
    #[serde(rename = "endCounts")]
    end_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Step(Direction),
    Reveal(Vec2),
}

#[tokio::main]
async fn main() {
    init_tracing("warn");
    let cli = Cli::parse();
    let Some(scenarios) = resolve_scenarios(&cli) else {
        eprintln!("unknown --policy value; expected `overdraft` or `strict`");
        std::process::exit(2);
    };

    let store: Arc<dyn MazeStore> = match &cli.store {
        Some(path) => Arc::new(FileMazeStore::new(path.clone())),
        None => Arc::new(MemoryMazeStore::new()),
    };

    let started_at_ms = now_ms();
    let mut results = Vec::new();
    for scenario in scenarios {
        tracing::info!(scenario = %scenario.name, seed = scenario.seed, "scenario started");
        let result = run_scenario(&scenario, store.clone()).await;
        tracing::info!(
            scenario = %scenario.name,
            end = ?result.end,
            steps = result.steps,
            anomalies = result.anomalies.len(),
            "scenario finished"
        );
        match serde_json::to_string(&result) {
            Ok(line) => println!("{line}"),
            Err(error) => tracing::error!(%error, "failed to encode scenario result"),
        }
        results.push(result);
    }

    let has_anomaly = results.iter().any(|result| !result.anomalies.is_empty());
    let summary = build_run_summary(started_at_ms, now_ms(), results);
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            tracing::error!(path = %path.display(), %error, "summary write failed");
            std::process::exit(2);
        }
    }

    if has_anomaly {
        std::process::exit(1);
    }
}

fn resolve_scenarios(cli: &Cli) -> Option<Vec<Scenario>> {
    let policy = match cli.policy.as_deref() {
        None => RevealPolicy::default(),
        Some(raw) => RevealPolicy::parse(raw)?,
    };
    let seed = cli
        .seed
        .map(normalize_seed)
        .unwrap_or_else(|| Rng::from_entropy().seed());
    Some(
        (0..cli.scenarios.max(1))
            .map(|idx| Scenario {
                name: format!("autoplay-{}", idx + 1),
                user_id: format!("{}-{}", cli.user, idx + 1),
                seed: seed.wrapping_add(idx as u32),
                energy: cli.energy,
                policy,
                max_steps: cli.max_steps.max(1),
            })
            .collect(),
    )
}

async fn run_scenario(scenario: &Scenario, store: Arc<dyn MazeStore>) -> ScenarioResultLine {
    let config = MazeConfig::default().with_reveal_policy(scenario.policy);
    let mut session = match GameSession::start(
        config,
        store,
        &scenario.user_id,
        "sim-token",
        LocalEnergy::new(scenario.energy),
        Rng::new(scenario.seed),
    )
    .await
    {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(%error, "invalid maze configuration");
            std::process::exit(2);
        }
    };

    let mut anomalies = Vec::new();
    let mut seen = HashSet::new();
    let mut moves = 0;
    let mut blocked_moves = 0;
    let mut reveals = 0;
    let mut steps = 0;
    let mut end = ScenarioEnd::StepLimit;

    while steps < scenario.max_steps {
        steps += 1;
        let Some(action) = plan_next_action(session.engine()) else {
            end = ScenarioEnd::NoFrontier;
            break;
        };
        match action {
            Action::Step(dir) => match session.move_player(dir) {
                MoveOutcome::Moved { .. } => moves += 1,
                MoveOutcome::Won { .. } => {
                    moves += 1;
                    end = ScenarioEnd::Won;
                }
                MoveOutcome::Rejected(reason) => {
                    blocked_moves += 1;
                    push_anomaly(
                        &mut anomalies,
                        &mut seen,
                        format!("planned move rejected: {reason:?}"),
                    );
                }
            },
            Action::Reveal(pos) => {
                if session.click_cell(pos).is_none() {
                    push_anomaly(&mut anomalies, &mut seen, "frontier cell not fogged".to_string());
                    break;
                }
                match session.confirm_reveal() {
                    Some(RevealOutcome::Revealed { .. }) => reveals += 1,
                    Some(RevealOutcome::Rejected(_)) | None => {
                        end = ScenarioEnd::OutOfEnergy;
                        break;
                    }
                }
            }
        }

        for message in collect_engine_anomalies(session.engine()) {
            push_anomaly(&mut anomalies, &mut seen, message);
        }
        if end == ScenarioEnd::Won {
            break;
        }
    }

    tracing::debug!(
        scenario = %scenario.name,
        view = %session.render_ascii().join("\n"),
        "final view"
    );
    let completed_mazes = session.completed_mazes();
    let (energy, stats) = session.shutdown().await;
    ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        end,
        steps,
        moves,
        blocked_moves,
        reveals,
        energy_spent: energy.spent(),
        final_balance: energy.balance(),
        completed_mazes,
        full_saves: stats.full_saves,
        position_saves: stats.position_saves,
        save_failures: stats.failures,
        anomalies,
    }
}

/// Walks toward the exit when a revealed path exists, otherwise toward the
/// nearest fog cell bordering the revealed area, revealing it on arrival.
fn plan_next_action(engine: &MazeEngine) -> Option<Action> {
    let visible = engine.visible();
    let start = engine.player_position();
    let walkable = |pos: Vec2| {
        matches!(visible.get(pos), Some(VisibleCell::Revealed(cell)) if cell != CellState::Wall)
    };

    let mut parents: HashMap<Vec2, Vec2> = HashMap::new();
    let mut queue = VecDeque::new();
    let mut frontier: Option<(Vec2, Vec2)> = None;
    parents.insert(start, start);
    queue.push_back(start);

    while let Some(pos) = queue.pop_front() {
        if pos == engine.exit() {
            return first_step(&parents, start, pos).map(Action::Step);
        }
        for dir in Direction::ALL {
            let next = pos.offset(dir);
            if frontier.is_none() && is_fog_interior(engine, next) {
                frontier = Some((pos, next));
            }
            if walkable(next) && !parents.contains_key(&next) {
                parents.insert(next, pos);
                queue.push_back(next);
            }
        }
    }

    let (stand, fog) = frontier?;
    if stand == start {
        return Some(Action::Reveal(fog));
    }
    first_step(&parents, start, stand).map(Action::Step)
}

fn is_fog_interior(engine: &MazeEngine, pos: Vec2) -> bool {
    let size = engine.config().size;
    pos.x > 0
        && pos.y > 0
        && pos.x < size - 1
        && pos.y < size - 1
        && engine.query(pos).map(VisibleCell::is_fog).unwrap_or(false)
}

fn first_step(parents: &HashMap<Vec2, Vec2>, start: Vec2, target: Vec2) -> Option<Direction> {
    let mut cursor = target;
    loop {
        let parent = *parents.get(&cursor)?;
        if parent == start {
            return Direction::from_delta(cursor.x - start.x, cursor.y - start.y);
        }
        if parent == cursor {
            return None;
        }
        cursor = parent;
    }
}

fn collect_engine_anomalies(engine: &MazeEngine) -> Vec<String> {
    let mut anomalies = Vec::new();
    if !engine.visibility_is_consistent() {
        anomalies.push("visible cell diverges from maze".to_string());
    }
    let pos = engine.player_position();
    if engine.maze().get(pos).map(CellState::is_wall).unwrap_or(true) {
        anomalies.push(format!("player inside wall at ({}, {})", pos.x, pos.y));
    }
    let players = engine
        .maze()
        .iter()
        .filter(|(_, cell)| *cell == CellState::Player)
        .count();
    if players != 1 {
        anomalies.push(format!("expected one player cell, found {players}"));
    }
    anomalies
}

fn push_anomaly(anomalies: &mut Vec<String>, seen: &mut HashSet<String>, message: String) {
    if seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn build_run_summary(
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let mut end_counts = BTreeMap::new();
    for result in &scenarios {
        *end_counts.entry(end_key(result.end)).or_insert(0) += 1;
    }
    let total_steps: usize = scenarios.iter().map(|result| result.steps).sum();
    RunSummary {
        started_at_ms,
        finished_at_ms,
        scenario_count,
        win_count: scenarios
            .iter()
            .filter(|result| result.end == ScenarioEnd::Won)
            .count(),
        average_steps: if scenario_count == 0 {
            0
        } else {
            total_steps / scenario_count
        },
        end_counts,
        scenarios,
    }
}

fn end_key(end: ScenarioEnd) -> String {
    match end {
        ScenarioEnd::Won => "won",
        ScenarioEnd::OutOfEnergy => "out_of_energy",
        ScenarioEnd::NoFrontier => "no_frontier",
        ScenarioEnd::StepLimit => "step_limit",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(seed: u32, energy: i64, policy: RevealPolicy) -> Scenario {
        Scenario {
            name: "test".to_string(),
            user_id: format!("test-{seed}"),
            seed,
            energy,
            policy,
            max_steps: 20_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_reaches_exit_with_overdraft() {
        for seed in 1..=4u32 {
            let store = Arc::new(MemoryMazeStore::new());
            let result = run_scenario(&scenario(seed, DEFAULT_ENERGY, RevealPolicy::AllowOverdraft), store).await;
            assert_eq!(result.end, ScenarioEnd::Won, "seed={seed}");
            assert!(result.anomalies.is_empty(), "seed={seed}: {:?}", result.anomalies);
            assert_eq!(result.completed_mazes, 1);
            assert_eq!(result.final_balance, DEFAULT_ENERGY - result.energy_spent as i64);
            assert!(result.full_saves >= 1 + result.reveals as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn strict_policy_stops_when_energy_runs_out() {
        let store = Arc::new(MemoryMazeStore::new());
        let result = run_scenario(&scenario(3, 10, RevealPolicy::RequireBalance), store).await;
        assert_eq!(result.end, ScenarioEnd::OutOfEnergy);
        assert_eq!(result.reveals, 0);
        assert_eq!(result.final_balance, 10);
    }

    #[test]
    fn planner_reveals_when_standing_at_frontier() {
        let engine = MazeEngine::generate(MazeConfig::default(), &mut Rng::new(9));
        let action = plan_next_action(&engine).expect("fresh maze has a frontier");
        match action {
            Action::Step(dir) => {
                let next = engine.player_position().offset(dir);
                assert!(!engine.query(next).expect("in bounds").is_fog());
            }
            Action::Reveal(pos) => assert!(engine.query(pos).expect("in bounds").is_fog()),
        }
    }

    #[test]
    fn run_summary_counts_endings() {
        let line = |end, steps| ScenarioResultLine {
            scenario: "s".to_string(),
            seed: 1,
            end,
            steps,
            moves: 0,
            blocked_moves: 0,
            reveals: 0,
            energy_spent: 0,
            final_balance: 0,
            completed_mazes: 0,
            full_saves: 0,
            position_saves: 0,
            save_failures: 0,
            anomalies: Vec::new(),
        };
        let summary = build_run_summary(
            1,
            2,
            vec![line(ScenarioEnd::Won, 100), line(ScenarioEnd::StepLimit, 300)],
        );
        assert_eq!(summary.win_count, 1);
        assert_eq!(summary.average_steps, 200);
        assert_eq!(summary.end_counts.get("step_limit"), Some(&1));
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("fog-maze-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(1, 2, Vec::new());
        assert!(write_summary(&target, &summary).is_err());
    }
}
