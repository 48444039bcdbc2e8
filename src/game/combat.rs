//! Combat system - projectiles, aim, hit detection

use super::movement::{ARENA_HEIGHT, ARENA_WIDTH, PLAYER_RADIUS};

/// Projectile speed in arena units per tick
pub const BULLET_SPEED: f32 = 7.0;

/// Projectile lifetime in ticks
pub const BULLET_TTL: u32 = 100;

/// Projectile collision radius
pub const BULLET_RADIUS: f32 = 4.0;

/// Minimum wall-clock gap between shots
pub const SHOT_COOLDOWN_MS: u64 = 300;

/// Distance from the shooter at which a projectile spawns
pub const MUZZLE_OFFSET: f32 = 24.0;

/// Margin beyond the arena before a projectile is culled
pub const CULL_MARGIN: f32 = 50.0;

/// Active projectile in a shooter room
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: String,
    pub ttl: u32,
}

impl Projectile {
    /// Advance one tick. Returns false once the projectile has expired or
    /// left the culling bounds.
    pub fn update(&mut self) -> bool {
        self.x += self.vx;
        self.y += self.vy;
        self.ttl = self.ttl.saturating_sub(1);
        self.ttl > 0 && !self.out_of_bounds()
    }

    fn out_of_bounds(&self) -> bool {
        self.x < -CULL_MARGIN
            || self.x > ARENA_WIDTH + CULL_MARGIN
            || self.y < -CULL_MARGIN
            || self.y > ARENA_HEIGHT + CULL_MARGIN
    }

    /// Circle test against a player at (target_x, target_y)
    pub fn check_hit(&self, target_x: f32, target_y: f32) -> bool {
        let dx = target_x - self.x;
        let dy = target_y - self.y;
        let dist_sq = dx * dx + dy * dy;
        let combined = PLAYER_RADIUS + BULLET_RADIUS;
        dist_sq <= combined * combined
    }
}

/// Combat system for firing and cooldown decisions
pub struct CombatSystem;

impl CombatSystem {
    /// Check if enough wall-clock time has passed since the last shot
    pub fn can_fire(now_millis: u64, last_shot_at: u64) -> bool {
        now_millis.saturating_sub(last_shot_at) > SHOT_COOLDOWN_MS
    }

    /// Normalized aim direction from the shooter toward an aim point.
    /// Falls back to straight up when no aim is supplied.
    pub fn aim_direction(x: f32, y: f32, aim_x: Option<f32>, aim_y: Option<f32>) -> (f32, f32) {
        match (aim_x, aim_y) {
            (Some(ax), Some(ay)) => {
                let dx = ax - x;
                let dy = ay - y;
                let mag = (dx * dx + dy * dy).sqrt();
                if mag > 0.0 {
                    (dx / mag, dy / mag)
                } else {
                    (0.0, -1.0)
                }
            }
            _ => (0.0, -1.0),
        }
    }

    /// Spawn a projectile for a shooter at (x, y)
    pub fn spawn(id: u64, owner: &str, x: f32, y: f32, dir_x: f32, dir_y: f32) -> Projectile {
        Projectile {
            id,
            x: x + dir_x * MUZZLE_OFFSET,
            y: y + dir_y * MUZZLE_OFFSET,
            vx: dir_x * BULLET_SPEED,
            vy: dir_y * BULLET_SPEED,
            owner: owner.to_string(),
            ttl: BULLET_TTL,
        }
    }
}
