//! Maintenance mode switching.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{DeckhandError, Result};
use crate::runner::{
    LoggerAware, MaintenanceStrategy, MaintenanceStrategyAware, StepAction, StepContext,
    StepLogger,
};

/// Turns maintenance mode on or off through the maintenance strategy.
///
/// Option `enabled` (default `true`) selects the direction.
#[derive(Default)]
pub struct ToggleMaintenance {
    logger: StepLogger,
    strategy: Option<Arc<dyn MaintenanceStrategy>>,
}

impl ToggleMaintenance {
    /// Factory for the registry.
    #[must_use]
    pub fn boxed() -> Box<dyn StepAction> {
        Box::new(Self::default())
    }
}

impl LoggerAware for ToggleMaintenance {
    fn set_logger(&mut self, logger: StepLogger) {
        self.logger = logger;
    }
}

impl MaintenanceStrategyAware for ToggleMaintenance {
    fn set_maintenance_strategy(&mut self, strategy: Arc<dyn MaintenanceStrategy>) {
        self.strategy = Some(strategy);
    }
}

#[async_trait]
impl StepAction for ToggleMaintenance {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>> {
        let strategy = self
            .strategy
            .as_ref()
            .ok_or_else(|| DeckhandError::internal("no maintenance strategy"))?;

        if ctx.option_bool("enabled", true) {
            strategy.enable().await?;
            self.logger.info("Maintenance mode enabled");
            Ok(Some(String::from("maintenance on")))
        } else {
            strategy.disable().await?;
            self.logger.info("Maintenance mode disabled");
            Ok(Some(String::from("maintenance off")))
        }
    }

    fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        Some(self)
    }

    fn as_maintenance_aware(&mut self) -> Option<&mut dyn MaintenanceStrategyAware> {
        Some(self)
    }
}
