use crate::gaussian::settings::SplatSettings;


/// number of splats a node may draw this frame.
///
/// grows by `increment` per rendered frame up to `max` and snaps back to
/// `initial` whenever new splats are uploaded. when disabled every resident
/// splat is drawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressiveBudget {
    enabled: bool,
    budget: u32,
    initial: u32,
    increment: u32,
    max: u32,
}

impl ProgressiveBudget {
    pub fn new(
        initial: u32,
        increment: u32,
        max: u32,
    ) -> Self {
        Self {
            enabled: true,
            budget: initial.min(max),
            initial,
            increment,
            max,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            enabled: false,
            ..Self::new(u32::MAX, 0, u32::MAX)
        }
    }

    pub fn from_settings(settings: &SplatSettings) -> Self {
        if settings.progressive {
            Self::new(
                settings.budget_initial,
                settings.budget_increment,
                settings.budget_max,
            )
        } else {
            Self::unbounded()
        }
    }

    /// same ramp parameters, regardless of how far either has advanced
    pub fn same_config(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.initial == other.initial
            && self.increment == other.increment
            && self.max == other.max
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// splats to draw out of `resident`
    pub fn visible(&self, resident: u32) -> u32 {
        if self.enabled {
            self.budget.min(resident)
        } else {
            resident
        }
    }

    pub fn advance(&mut self) {
        if self.enabled && self.budget < self.max {
            self.budget = self.budget.saturating_add(self.increment).min(self.max);
        }
    }

    pub fn reset(&mut self) {
        self.budget = self.initial.min(self.max);
    }
}

impl Default for ProgressiveBudget {
    fn default() -> Self {
        Self::from_settings(&SplatSettings::default())
    }
}
