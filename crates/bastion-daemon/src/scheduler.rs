// crates/bastion-daemon/src/scheduler.rs
//
// Fee drip scheduler for the Bastion daemon.
//
// Drips fees on every deployed module at a fixed interval until the
// process receives ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use bastion_manager::Manager;

/// Scheduler that periodically drips fees across all modules.
pub struct DripScheduler {
    manager: Arc<Manager>,
    /// Seconds between drip rounds.
    interval_secs: u64,
    /// Number of completed drip rounds.
    rounds: u64,
}

impl DripScheduler {
    pub fn new(manager: Arc<Manager>, interval_secs: u64) -> Self {
        Self {
            manager,
            interval_secs: interval_secs.max(1),
            rounds: 0,
        }
    }

    /// Run the scheduler loop until ctrl-c.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(
            "Drip scheduler started (interval={}s)",
            self.interval_secs
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Drip scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.interval_secs)) => {
                    self.tick().await;
                }
            }
        }

        Ok(())
    }

    /// Run one drip round.
    pub async fn tick(&mut self) {
        self.rounds += 1;
        let dripped = self.manager.drip_all().await;
        tracing::debug!("Drip round {}: {} modules dripped", self.rounds, dripped);
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{AccountId, InMemoryAssetBank};
    use bastion_ledger::NoDrip;
    use bastion_manager::{ManagerRoles, ManualClock};

    #[tokio::test]
    async fn test_tick_counts_rounds() {
        let manager = Arc::new(Manager::new(
            ManagerRoles {
                manager: AccountId::repeat(1),
                owner: AccountId::repeat(2),
                pauser: AccountId::repeat(3),
            },
            Arc::new(InMemoryAssetBank::new()),
            Arc::new(NoDrip),
            Arc::new(ManualClock::new(0)),
        ));
        let mut scheduler = DripScheduler::new(manager, 0);
        assert_eq!(scheduler.interval_secs, 1);
        scheduler.tick().await;
        scheduler.tick().await;
        assert_eq!(scheduler.rounds(), 2);
    }
}
