//! Robot kinematics, spawn sampling, and chromosome-driven action decode.

use crate::environment::{Environment, SensorRay};
use crate::SimError;
use navgene_policy::Chromosome;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Robot pose in the workspace frame. The heading is never normalized;
/// trigonometric queries are invariant to full turns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    /// Construct a pose from its components.
    #[must_use]
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub(crate) fn ensure_finite(&self) -> Result<(), SimError> {
        if self.x.is_finite() && self.y.is_finite() && self.theta.is_finite() {
            Ok(())
        } else {
            Err(SimError::InvalidPose {
                x: self.x,
                y: self.y,
                theta: self.theta,
            })
        }
    }
}

/// Reason a finished episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Collided,
    GoalReached,
    TimedOut,
}

/// One individual: a mutable pose, a fixed lookup-table chromosome, and the
/// append-only state histories recorded during its episode.
///
/// A robot is owned exclusively by the task running its episode and handed
/// back as a read-only result afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pose: Pose,
    chromosome: Chromosome,
    pose_history: Vec<Pose>,
    sensor_history: Vec<Vec<SensorRay>>,
    fitness: Option<f64>,
    termination: Option<Termination>,
}

impl Robot {
    /// Create a robot at an explicit pose.
    ///
    /// The chromosome width and pose finiteness are still checked when the
    /// episode starts.
    #[must_use]
    pub fn with_pose(pose: Pose, chromosome: Chromosome) -> Self {
        Self {
            pose,
            chromosome,
            pose_history: Vec::new(),
            sensor_history: Vec::new(),
            fitness: None,
            termination: None,
        }
    }

    /// Create a robot at a random collision-free pose.
    ///
    /// Rejection-samples positions uniformly over the wall- and
    /// radius-inset square and headings over `[0, 2*pi)`; fails with
    /// [`SimError::EnvironmentInfeasible`] once the configured attempt
    /// budget is exhausted.
    pub fn spawn(
        env: &Environment,
        chromosome: Chromosome,
        rng: &mut dyn RngCore,
    ) -> Result<Self, SimError> {
        chromosome.ensure_policy_width(env.config().sensor_angles.len())?;

        let config = env.config();
        let pos_min = config.wall_width + config.robot_radius;
        let pos_max = config.dimension - config.wall_width - config.robot_radius;
        if pos_max <= pos_min {
            return Err(SimError::InvalidConfig(
                "workspace leaves no free space for the robot",
            ));
        }

        for _ in 0..config.spawn_attempts {
            let x = round_to(rng.random_range(pos_min..pos_max), 10.0);
            let y = round_to(rng.random_range(pos_min..pos_max), 10.0);
            if !env.is_collision(x, y) {
                let theta = round_to(rng.random_range(0.0..TAU), 100.0);
                return Ok(Self::with_pose(Pose::new(x, y, theta), chromosome));
            }
        }
        Err(SimError::EnvironmentInfeasible {
            attempts: config.spawn_attempts,
        })
    }

    /// Current pose.
    #[must_use]
    pub const fn pose(&self) -> Pose {
        self.pose
    }

    /// The policy chromosome.
    #[must_use]
    pub fn chromosome(&self) -> &Chromosome {
        &self.chromosome
    }

    /// Recorded poses, one per simulated step.
    #[must_use]
    pub fn pose_history(&self) -> &[Pose] {
        &self.pose_history
    }

    /// Recorded per-sensor detection results, parallel to the pose history.
    #[must_use]
    pub fn sensor_history(&self) -> &[Vec<SensorRay>] {
        &self.sensor_history
    }

    /// Fitness assigned at episode end, if the episode has run.
    #[must_use]
    pub const fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// How the episode terminated, if it has run.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Unicycle integration over one sample interval.
    pub fn step(&mut self, v: f64, omega: f64, dt: f64) {
        self.pose.x += v * self.pose.theta.cos() * dt;
        self.pose.y += v * self.pose.theta.sin() * dt;
        self.pose.theta += omega * dt;
    }

    /// Decode the next angular velocity from the chromosome.
    ///
    /// Concatenates the sensor bits (most significant) with the heading
    /// one-hot bits into an unsigned table index and reads the 3-bit action
    /// slice at that offset.
    #[must_use]
    pub fn decide_action(&self, env: &Environment) -> f64 {
        let Pose { x, y, theta } = self.pose;
        let sensors = env.read_sensors(x, y, theta);
        let sectors = env.heading_sector(x, y, theta);
        let mut index = 0usize;
        for bit in sensors.iter().chain(sectors.iter()) {
            index = (index << 1) | usize::from(*bit);
        }
        self.chromosome.angular_velocity(index)
    }

    /// Append the current pose and sensor snapshot to the histories.
    pub(crate) fn record_state(&mut self, env: &Environment) {
        let Pose { x, y, theta } = self.pose;
        self.pose_history.push(self.pose);
        self.sensor_history.push(
            env.config()
                .sensor_angles
                .iter()
                .map(|angle| env.obstacle_detection(x, y, theta, *angle))
                .collect(),
        );
    }

    /// Repeat the final recorded state until both histories hold `len`
    /// entries, so every robot's replay is equally long.
    pub(crate) fn pad_history(&mut self, len: usize) {
        if let Some(last) = self.pose_history.last().copied() {
            while self.pose_history.len() < len {
                self.pose_history.push(last);
            }
        }
        if let Some(last) = self.sensor_history.last().cloned() {
            while self.sensor_history.len() < len {
                self.sensor_history.push(last.clone());
            }
        }
    }

    /// Store the episode fitness, truncated toward zero. Overwriting is
    /// idempotent.
    pub(crate) fn set_fitness(&mut self, value: f64) {
        self.fitness = Some(value.trunc());
    }

    pub(crate) fn set_termination(&mut self, termination: Termination) {
        self.termination = Some(termination);
    }
}

/// Round to a decimal grid: `scale` of 10 keeps one decimal, 100 keeps two.
fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn env() -> Environment {
        Environment::new(SimConfig::default()).expect("environment")
    }

    fn chromosome(seed: u64) -> Chromosome {
        let mut rng = SmallRng::seed_from_u64(seed);
        Chromosome::random(&mut rng, SimConfig::default().chromosome_len())
    }

    #[test]
    fn unicycle_step_advances_along_heading() {
        let env = env();
        let mut robot = Robot::with_pose(Pose::new(1.0, 1.0, 0.0), chromosome(0));
        robot.step(0.5, 0.0, 0.1);
        let pose = robot.pose();
        assert!((pose.x - 1.05).abs() < 1e-12);
        assert!((pose.y - 1.0).abs() < 1e-12);
        assert_eq!(pose.theta, 0.0);

        // Neither terminal branch applies one step into open space.
        let reward = env.reward(pose.x, pose.y, pose.theta);
        assert!(!reward.collided && !reward.goal_reached);
    }

    #[test]
    fn spawned_pose_is_collision_free_and_in_bounds() {
        let env = env();
        let mut rng = SmallRng::seed_from_u64(0xBEEF);
        for _ in 0..32 {
            let robot = Robot::spawn(&env, chromosome(1), &mut rng).expect("spawn");
            let pose = robot.pose();
            assert!(!env.is_collision(pose.x, pose.y));
            assert!((0.0..TAU).contains(&pose.theta));
        }
    }

    #[test]
    fn spawn_rejects_short_chromosomes() {
        let env = env();
        let mut rng = SmallRng::seed_from_u64(3);
        let short = Chromosome::random(&mut rng, 16);
        assert!(matches!(
            Robot::spawn(&env, short, &mut rng),
            Err(SimError::Policy(_))
        ));
    }

    #[test]
    fn infeasible_environment_fails_after_bounded_retries() {
        // One obstacle covering the whole free area.
        let config = SimConfig {
            obstacles: vec![crate::ObstacleSpec::new(0.0, 0.0, 15.0, 15.0)],
            spawn_attempts: 50,
            ..SimConfig::default()
        };
        let env = Environment::new(config).expect("environment");
        let mut rng = SmallRng::seed_from_u64(4);
        assert!(matches!(
            Robot::spawn(&env, chromosome(2), &mut rng),
            Err(SimError::EnvironmentInfeasible { attempts: 50 })
        ));
    }

    #[test]
    fn decide_action_always_hits_the_table() {
        let env = env();
        let robot = Robot::with_pose(Pose::new(7.0, 5.0, 0.3), chromosome(5));
        let omega = robot.decide_action(&env);
        assert!(
            navgene_policy::ACTION_TABLE.contains(&omega),
            "decoded action {omega} must come from the table"
        );
    }
}
