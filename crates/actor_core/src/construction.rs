//! Step-wise facility construction.

use crate::dispatch::TickContext;
use crate::unit::{Unit, WorkMode};

/// Ticks per construction step.
pub const CONSTRUCTION_INTERVAL: u64 = 20;

/// Routine for [`WorkMode::Construct`]: one step every
/// [`CONSTRUCTION_INTERVAL`] ticks until the facility is complete.
pub fn advance_construction(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if !ctx.every(CONSTRUCTION_INTERVAL) {
        return;
    }
    let total = unit.construction_total;
    unit.construction_step = (unit.construction_step + 1).min(total);
    if unit.construction_step < total {
        return;
    }
    tracing::info!(tick = ctx.tick, unit = unit.id(), "construction completed");
    unit.set_work(WorkMode::Idle);
    ctx.effects.construction_completed(unit.id());
}

impl Unit {
    /// Total construction steps of this unit's type.
    #[must_use]
    pub const fn construction_total(&self) -> u32 {
        self.construction_total
    }

    /// Restore construction progress, clamped to the total.
    ///
    /// A finished facility leaves [`WorkMode::Construct`].
    pub fn set_construction_step(&mut self, step: u32) {
        if step > self.construction_total {
            tracing::warn!(
                unit = self.id,
                step,
                total = self.construction_total,
                "construction step out of range, clamping"
            );
        }
        self.construction_step = step.min(self.construction_total);
        if self.construction_step >= self.construction_total && self.work == WorkMode::Construct {
            self.set_work(WorkMode::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::properties::UnitProperties;

    fn depot(steps: u32) -> Unit {
        let props = UnitProperties {
            id: 3,
            name: "depot".to_string(),
            size: 2,
            max_health: 500,
            max_shields: 0,
            armor: 0,
            max_speed: Fixed::ZERO,
            acceleration: Fixed::ZERO,
            deceleration: Fixed::ZERO,
            rotation_speed: Fixed::ZERO,
            crush_damage: 0,
            aircraft: false,
            preferred_altitude: Fixed::ZERO,
            depth: Fixed::ONE,
            construction_steps: steps,
            weapons: Vec::new(),
            plugins: Vec::new(),
        };
        Unit::new(1, 1, &props, Vec2Fixed::from_int(4, 4), Fixed::ZERO)
    }

    #[test]
    fn test_loaded_step_is_clamped() {
        let mut unit = depot(10);
        unit.set_construction_step(25);
        assert_eq!(unit.construction_step(), 10);
        assert_eq!(unit.work(), WorkMode::Idle);
        assert!(unit.is_construction_complete());
    }

    #[test]
    fn test_partial_step_keeps_constructing() {
        let mut unit = depot(10);
        unit.set_construction_step(4);
        assert_eq!(unit.work(), WorkMode::Construct);
        assert!(!unit.is_construction_complete());
    }
}
