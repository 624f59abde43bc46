use std::sync::Arc;

use crate::error::BacktestError;
use crate::input::PriceSeries;
use crate::profile::{ProfileRegistry, RiskProfile};
use crate::schedule::FixedIntervalSchedule;

use super::{BacktestSettings, SimContext, SimStatus};

pub struct SimContextBuilder {
    profile: Option<RiskProfile>,
    prices: Option<Arc<PriceSeries>>,
    settings: Option<BacktestSettings>,
}

impl Default for SimContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimContextBuilder {
    pub fn with_profile(&mut self, profile: RiskProfile) -> &mut Self {
        self.profile = Some(profile);
        self
    }

    /// Fails immediately when `name` is not registered.
    pub fn with_profile_from(
        &mut self,
        registry: &ProfileRegistry,
        name: &str,
    ) -> Result<&mut Self, BacktestError> {
        let profile = registry.get(name)?.clone();
        self.profile = Some(profile);
        Ok(self)
    }

    pub fn with_prices(&mut self, prices: Arc<PriceSeries>) -> &mut Self {
        self.prices = Some(prices);
        self
    }

    pub fn with_settings(&mut self, settings: BacktestSettings) -> &mut Self {
        self.settings = Some(settings);
        self
    }

    //The schedule is generated here so the context never exists without one. An invalid
    //allocation only warns, the run still goes ahead with the skewed target.
    pub fn build(&mut self) -> Result<SimContext, BacktestError> {
        let profile = self.profile.take().ok_or(BacktestError::MissingInput {
            field: "profile".to_string(),
        })?;
        let prices = self.prices.take().ok_or(BacktestError::MissingInput {
            field: "prices".to_string(),
        })?;
        let settings = self.settings.take().ok_or(BacktestError::MissingInput {
            field: "settings".to_string(),
        })?;

        profile.warn_if_invalid();
        let schedule =
            FixedIntervalSchedule::new(settings.start_date, settings.end_date, settings.frequency);

        Ok(SimContext {
            profile,
            prices,
            settings,
            schedule,
            status: SimStatus::NotStarted,
        })
    }

    pub fn new() -> Self {
        Self {
            profile: None,
            prices: None,
            settings: None,
        }
    }
}
