//! Player movement and arena bounds

use crate::ws::protocol::InputState;

use super::grid::{BlockGrid, CELL_SIZE};

/// Movement speed in arena units per tick
pub const PLAYER_SPEED: f32 = 3.0;

/// Shooter arena dimensions
pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;

/// Player collision radius in shooter mode; also the clamp inset
pub const PLAYER_RADIUS: f32 = 20.0;

/// Player radius in block mode (smaller avatar on the grid)
pub const BLOCK_PLAYER_RADIUS: f32 = 12.0;

/// Inclusive position bounds for one room's arena
#[derive(Debug, Clone, Copy)]
pub struct ArenaBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl ArenaBounds {
    /// Fixed shooter arena, inset by the player radius
    pub fn shooter() -> Self {
        Self {
            min_x: PLAYER_RADIUS,
            min_y: PLAYER_RADIUS,
            max_x: ARENA_WIDTH - PLAYER_RADIUS,
            max_y: ARENA_HEIGHT - PLAYER_RADIUS,
        }
    }

    /// Bounds derived from grid dimensions, inset by the block-mode radius
    pub fn for_grid(grid: &BlockGrid) -> Self {
        Self {
            min_x: BLOCK_PLAYER_RADIUS,
            min_y: BLOCK_PLAYER_RADIUS,
            max_x: grid.w as f32 * CELL_SIZE - BLOCK_PLAYER_RADIUS,
            max_y: grid.h as f32 * CELL_SIZE - BLOCK_PLAYER_RADIUS,
        }
    }

    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), y.clamp(self.min_y, self.max_y))
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Movement system for deriving and integrating player velocity
pub struct MovementSystem;

impl MovementSystem {
    /// Derive velocity from directional flags.
    ///
    /// Each flag assigns a signed component, so the later write per axis
    /// wins when opposite flags are both set. Diagonal movement is scaled
    /// to keep speed magnitude equal to axial movement.
    pub fn velocity(input: &InputState) -> (f32, f32) {
        let mut vx = 0.0;
        let mut vy = 0.0;
        if input.left {
            vx = -PLAYER_SPEED;
        }
        if input.right {
            vx = PLAYER_SPEED;
        }
        if input.up {
            vy = -PLAYER_SPEED;
        }
        if input.down {
            vy = PLAYER_SPEED;
        }

        if vx != 0.0 && vy != 0.0 {
            vx *= std::f32::consts::FRAC_1_SQRT_2;
            vy *= std::f32::consts::FRAC_1_SQRT_2;
        }

        (vx, vy)
    }

    /// Integrate one tick of movement and clamp to the arena.
    /// Returns (new_x, new_y).
    pub fn step(x: f32, y: f32, vx: f32, vy: f32, bounds: &ArenaBounds) -> (f32, f32) {
        bounds.clamp(x + vx, y + vy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(up: bool, down: bool, left: bool, right: bool) -> InputState {
        InputState {
            up,
            down,
            left,
            right,
            ..InputState::default()
        }
    }

    #[test]
    fn axial_speed_is_constant() {
        let (vx, vy) = MovementSystem::velocity(&input(false, false, false, true));
        assert_eq!((vx, vy), (PLAYER_SPEED, 0.0));
    }

    #[test]
    fn diagonal_speed_matches_axial_speed() {
        let (vx, vy) = MovementSystem::velocity(&input(true, false, false, true));
        let mag = (vx * vx + vy * vy).sqrt();
        assert!((mag - PLAYER_SPEED).abs() < 1e-4);
    }

    #[test]
    fn opposite_flags_resolve_by_last_write() {
        // Right overwrites left, down overwrites up.
        let (vx, vy) = MovementSystem::velocity(&input(true, true, true, true));
        let scaled = PLAYER_SPEED * std::f32::consts::FRAC_1_SQRT_2;
        assert!((vx - scaled).abs() < 1e-6);
        assert!((vy - scaled).abs() < 1e-6);
    }

    #[test]
    fn step_clamps_inclusively_to_bounds() {
        let bounds = ArenaBounds::shooter();
        let (x, y) = MovementSystem::step(bounds.min_x, bounds.max_y, -10.0, 10.0, &bounds);
        assert_eq!((x, y), (bounds.min_x, bounds.max_y));
        assert!(bounds.contains(x, y));
    }

    #[test]
    fn grid_bounds_follow_grid_dimensions() {
        let grid = BlockGrid::new(20, 15);
        let bounds = ArenaBounds::for_grid(&grid);
        assert_eq!(bounds.max_x, 20.0 * CELL_SIZE - BLOCK_PLAYER_RADIUS);
        assert_eq!(bounds.max_y, 15.0 * CELL_SIZE - BLOCK_PLAYER_RADIUS);
    }
}
