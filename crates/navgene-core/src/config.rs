//! Static configuration for a navigation workspace and its episodes.

use crate::SimError;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Axis-aligned rectangle given by its bottom-left corner and extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSpec {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl ObstacleSpec {
    /// Construct a rectangle spec from its bottom-left corner and extents.
    #[must_use]
    pub const fn new(x: f64, y: f64, dx: f64, dy: f64) -> Self {
        Self { x, y, dx, dy }
    }
}

/// Static configuration shared by the environment, robots, and simulator.
///
/// Immutable once an [`Environment`](crate::Environment) has been built from
/// it. Obstacles must not overlap the goal region or lie outside the walls;
/// that is an authoring contract, not checked at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Side length of the square workspace.
    pub dimension: f64,
    /// Half-width of the boundary walls.
    pub wall_width: f64,
    /// Goal position.
    pub goal: (f64, f64),
    /// Radius of the goal disk.
    pub goal_radius: f64,
    /// Radius of the robot disk.
    pub robot_radius: f64,
    /// Length of each sensor ray.
    pub sensor_range: f64,
    /// Sensor angles relative to the robot heading, in reading order.
    pub sensor_angles: Vec<f64>,
    /// Rectangular obstacles, in detection order.
    pub obstacles: Vec<ObstacleSpec>,
    /// Integration step length in seconds.
    pub dt: f64,
    /// Episode length in recorded states (initial state included).
    pub max_steps: usize,
    /// Constant linear velocity applied every step.
    pub linear_velocity: f64,
    /// Terminal reward for reaching the goal.
    pub goal_reward: f64,
    /// Terminal reward for a collision.
    pub collision_reward: f64,
    /// Weight of the inverse-distance term in the shaped reward.
    pub dist_weight: f64,
    /// Weight of the heading-alignment term in the shaped reward.
    pub heading_weight: f64,
    /// Flat per-step cost in the shaped reward.
    pub time_weight: f64,
    /// Upper bound on spawn-pose rejection sampling per robot.
    pub spawn_attempts: u32,
    /// Optional RNG seed for reproducible spawn poses.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dimension: 15.0,
            wall_width: 0.15,
            goal: (6.5, 8.5),
            goal_radius: 0.8,
            robot_radius: 0.35,
            sensor_range: 2.0,
            sensor_angles: vec![FRAC_PI_2, FRAC_PI_4, 0.0, -FRAC_PI_4, -FRAC_PI_2],
            obstacles: vec![
                ObstacleSpec::new(2.0, 3.0, 1.0, 1.0),
                ObstacleSpec::new(8.0, 1.0, 0.5, 1.0),
            ],
            dt: 0.1,
            max_steps: 100,
            linear_velocity: 0.5,
            goal_reward: 100.0,
            collision_reward: -100.0,
            dist_weight: 10.0,
            heading_weight: 1.0,
            time_weight: 0.5,
            spawn_attempts: 10_000,
            rng_seed: None,
        }
    }
}

impl SimConfig {
    /// Validates the configuration before any geometry is built.
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.dimension.is_finite() || self.dimension <= 0.0 {
            return Err(SimError::InvalidConfig("dimension must be positive"));
        }
        if self.wall_width < 0.0 || self.wall_width * 2.0 >= self.dimension {
            return Err(SimError::InvalidConfig(
                "wall_width must be non-negative and leave free space between the walls",
            ));
        }
        if self.robot_radius <= 0.0 {
            return Err(SimError::InvalidConfig("robot_radius must be positive"));
        }
        if self.goal_radius <= self.robot_radius {
            return Err(SimError::InvalidConfig(
                "goal_radius must exceed robot_radius or the goal is unreachable",
            ));
        }
        if !(0.0..self.dimension).contains(&self.goal.0)
            || !(0.0..self.dimension).contains(&self.goal.1)
        {
            return Err(SimError::InvalidConfig("goal must lie inside the workspace"));
        }
        if self.sensor_range <= 0.0 {
            return Err(SimError::InvalidConfig("sensor_range must be positive"));
        }
        if self.sensor_angles.is_empty() {
            return Err(SimError::InvalidConfig(
                "at least one sensor angle is required",
            ));
        }
        if self.obstacles.iter().any(|o| o.dx <= 0.0 || o.dy <= 0.0) {
            return Err(SimError::InvalidConfig(
                "obstacle extents must be positive",
            ));
        }
        if self.dt <= 0.0 {
            return Err(SimError::InvalidConfig("dt must be positive"));
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidConfig("max_steps must be non-zero"));
        }
        if !self.linear_velocity.is_finite() {
            return Err(SimError::InvalidConfig("linear_velocity must be finite"));
        }
        if self.spawn_attempts == 0 {
            return Err(SimError::InvalidConfig("spawn_attempts must be non-zero"));
        }
        Ok(())
    }

    /// Chromosome width required for this sensor layout.
    #[must_use]
    pub fn chromosome_len(&self) -> usize {
        navgene_policy::required_len(self.sensor_angles.len())
    }

    /// Returns the configured master seed, drawing one from entropy if
    /// absent.
    pub(crate) fn master_seed(&self) -> u64 {
        self.rng_seed.unwrap_or_else(rand::random)
    }
}
