//! Local cell-intersection lookahead table.
//!
//! For every cell offset in the 11×11 neighborhood around a unit, the table
//! lists the cells a straight line from the center of the unit's cell to the
//! center of the offset cell crosses (excluding the start cell, including the
//! destination cell). The land mover uses it to skip path points when the
//! straight line between them is free, and to find the next cell it will
//! enter.
//!
//! The table is built once with [`GeometryTables::init`] and handed to the
//! simulation by reference.

use crate::math::Fixed;

/// Cells on each side of the unit covered by the table.
pub const LOOKAHEAD_RADIUS: i32 = 5;

/// Side length of the table.
pub const TABLE_SIZE: usize = 11;

/// Nudge past a cell border so the next sample lands inside the new cell.
const BORDER_EPSILON: Fixed = Fixed::from_bits(429_497);

/// Upper bound on crossings for any line inside the neighborhood.
const MAX_CROSSINGS: usize = 4 * TABLE_SIZE;

/// A cell offset relative to the unit's current cell.
pub type CellOffset = (i32, i32);

/// Precomputed straight-line cell crossings for the local neighborhood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryTables {
    cells: Vec<Vec<CellOffset>>,
}

impl GeometryTables {
    /// Build the table.
    #[must_use]
    pub fn init() -> Self {
        let mut cells = Vec::with_capacity(TABLE_SIZE * TABLE_SIZE);
        for y in 0..TABLE_SIZE {
            for x in 0..TABLE_SIZE {
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                let offset = (x as i32 - LOOKAHEAD_RADIUS, y as i32 - LOOKAHEAD_RADIUS);
                cells.push(line_crossings(offset));
            }
        }
        tracing::debug!(entries = cells.len(), "built cell intersection table");
        Self { cells }
    }

    /// Crossed cells for a line to `(dx, dy)`, or `None` outside the
    /// neighborhood.
    #[must_use]
    pub fn intersections(&self, dx: i32, dy: i32) -> Option<&[CellOffset]> {
        if dx.abs() > LOOKAHEAD_RADIUS || dy.abs() > LOOKAHEAD_RADIUS {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let index = (dy + LOOKAHEAD_RADIUS) as usize * TABLE_SIZE + (dx + LOOKAHEAD_RADIUS) as usize;
        self.cells.get(index).map(Vec::as_slice)
    }
}

fn floor_int(value: Fixed) -> i32 {
    value.floor().to_num::<i32>()
}

fn axis_run(target: Fixed, positive: bool) -> Vec<i32> {
    let end = floor_int(target);
    if positive {
        (1..=end).collect()
    } else {
        (end..=-1).rev().collect()
    }
}

fn line_crossings((cx, cy): CellOffset) -> Vec<CellOffset> {
    let half = Fixed::from_bits(1 << 31);
    let start = (half, half);
    let to = (Fixed::from_num(cx) + half, Fixed::from_num(cy) + half);
    let dx = to.0 - start.0;
    let dy = to.1 - start.1;

    if floor_int(start.0) == floor_int(to.0) {
        return axis_run(to.1, dy > Fixed::ZERO)
            .into_iter()
            .map(|a| (0, a))
            .collect();
    }
    if floor_int(start.1) == floor_int(to.1) {
        return axis_run(to.0, dx > Fixed::ZERO)
            .into_iter()
            .map(|a| (a, 0))
            .collect();
    }

    let (mut xp, mut yp) = start;
    let mut out = Vec::new();
    for _ in 0..MAX_CROSSINGS {
        let xn = if dx > Fixed::ZERO {
            (xp.floor() + Fixed::ONE - xp) / dx
        } else {
            (xp.floor() - xp) / dx
        };
        let yn = if dy > Fixed::ZERO {
            (yp.floor() + Fixed::ONE - yp) / dy
        } else {
            (yp.floor() - yp) / dy
        };
        let step = xn.min(yn) + BORDER_EPSILON;
        xp += step * dx;
        yp += step * dy;
        out.push((floor_int(xp), floor_int(yp)));

        let keep_going = (xp - start.0).abs() < dx.abs() && (yp - start.1).abs() < dy.abs();
        if !keep_going {
            break;
        }
    }
    // The final sample overshoots the destination cell.
    out.pop();
    out
}
