//! Plugin work.

use crate::dispatch::TickContext;
use crate::unit::{Unit, WorkMode};

/// Routine for [`WorkMode::Plugin`]: advance the running plugin by one
/// tick of work. Without a running plugin the unit goes idle.
pub fn advance_plugin(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    let Some(index) = unit
        .current_plugin
        .filter(|&index| index < unit.plugins.len())
    else {
        tracing::warn!(tick = ctx.tick, unit = unit.id(), "plugin work without a plugin");
        unit.set_work(WorkMode::Idle);
        return;
    };
    let plugin = &mut unit.plugins[index];
    plugin.work_counter = plugin.work_counter.saturating_add(1);
}
