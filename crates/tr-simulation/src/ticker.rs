use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::simulation::SharedSimulation;

/// Handle to the background task that drives the agent step and the food
/// respawn.
#[derive(Debug)]
pub struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking `sim` on the current tokio runtime.
    pub async fn spawn(sim: SharedSimulation) -> Self {
        let (step_every, respawn_every) = sim.lock().await.periods();
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut step = time::interval(step_every);
            step.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut respawn = time::interval(respawn_every);
            respawn.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Both intervals fire immediately; skip that first tick.
            step.tick().await;
            respawn.tick().await;

            info!(?step_every, ?respawn_every, "ticker started");
            loop {
                tokio::select! {
                    _ = step.tick() => {
                        let mut sim = sim.lock().await;
                        if let Err(err) = sim.step_agents() {
                            warn!(%err, "agent step failed");
                        }
                    }
                    _ = respawn.tick() => {
                        let mut sim = sim.lock().await;
                        if let Err(err) = sim.respawn_food() {
                            warn!(%err, "food respawn failed");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("ticker stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop after the tick in progress, if any, and wait for the task.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(%err, "ticker task ended abnormally");
        }
    }
}
