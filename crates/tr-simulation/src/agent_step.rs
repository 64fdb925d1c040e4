use std::time::Duration;

use tracing::debug;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::SimResult;
use crate::system::System;

/// Pushes each agent's observation to its remote model and, outside
/// training, charges the living cost.
#[derive(Debug, Default)]
pub struct AgentStepSystem {
    steps: u64,
}

impl AgentStepSystem {
    /// A system that has not stepped yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed steps since start-up.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl System for AgentStepSystem {
    fn name(&self) -> &str {
        "agent-step"
    }

    fn period(&self, config: &SimConfig) -> Duration {
        config.step_interval()
    }

    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()> {
        let charge_living_cost = !ctx.config.mode.applies_living_cost_inline();
        let agents = ctx.world.agents();
        let mut delivered = 0usize;
        let mut died = 0usize;

        for id in agents {
            let Some(observation) = ctx.world.observe(id) else {
                continue;
            };
            if let Some(agent) = ctx.world.get(id) {
                if ctx.models.push(&agent.owner_id, &agent.model_name, observation) {
                    delivered += 1;
                }
            }
            if charge_living_cost && !ctx.world.living_cost(id) {
                died += 1;
            }
        }

        self.steps += 1;
        debug!(step = self.steps, delivered, died, "agent step");
        Ok(())
    }
}
