/// Energy/quota capability owned outside the maze core. The core only reads the
/// balance and spends from it when a fog group is revealed.
pub trait EnergyPool {
    fn balance(&self) -> i64;

    fn decrease(&mut self, amount: u32);

    /// Called once per finished maze.
    fn record_maze_completed(&mut self) {}
}

/// In-process pool used by the simulator and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalEnergy {
    balance: i64,
    completed_mazes: u32,
    spent: u64,
}

impl LocalEnergy {
    pub fn new(balance: i64) -> Self {
        Self {
            balance,
            completed_mazes: 0,
            spent: 0,
        }
    }

    pub fn completed_mazes(&self) -> u32 {
        self.completed_mazes
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }
}

impl EnergyPool for LocalEnergy {
    fn balance(&self) -> i64 {
        self.balance
    }

    fn decrease(&mut self, amount: u32) {
        self.balance = self.balance.saturating_sub(i64::from(amount));
        self.spent += u64::from(amount);
    }

    fn record_maze_completed(&mut self) {
        self.completed_mazes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrease_may_go_negative() {
        let mut energy = LocalEnergy::new(10);
        energy.decrease(28);
        assert_eq!(energy.balance(), -18);
        assert_eq!(energy.spent(), 28);
    }

    #[test]
    fn completions_are_counted() {
        let mut energy = LocalEnergy::new(0);
        energy.record_maze_completed();
        energy.record_maze_completed();
        assert_eq!(energy.completed_mazes(), 2);
    }
}
