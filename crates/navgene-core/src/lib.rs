//! Simulation-and-scoring pipeline for chromosome-encoded navigation
//! policies.
//!
//! The pipeline has three tightly coupled parts: the [`Environment`] owns
//! the static world geometry and every physics/scoring query, a [`Robot`]
//! owns a mutable pose and a lookup-table [`Chromosome`], and the simulator
//! functions ([`run_episode`], [`run_generation`], [`run_evolution`]) drive
//! one bounded episode per robot and fan a whole population out across a
//! caller-sized worker pool. An external evolutionary optimizer plugs in
//! through the [`Evolver`] trait; rendering collaborators read the per-robot
//! pose and sensor histories.

pub mod config;
pub mod environment;
pub mod robot;
pub mod simulator;

pub use config::{ObstacleSpec, SimConfig};
pub use environment::{Environment, Obstacle, SensorRay, StepReward};
pub use navgene_policy::{Chromosome, PolicyError, ACTION_TABLE, HEADING_SECTORS};
pub use robot::{Pose, Robot, Termination};
pub use simulator::{
    run_episode, run_evolution, run_generation, EpisodeReport, EvolutionOutcome, Evolver,
    GenerationSummary,
};

use thiserror::Error;

/// Errors surfaced by the simulation engine.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration value fails validation before anything runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A chromosome in the population cannot address the policy table.
    #[error("chromosome {index}: {source}")]
    Chromosome {
        index: usize,
        #[source]
        source: PolicyError,
    },
    /// A single chromosome failed validation at the core boundary.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Rejection sampling found no collision-free spawn pose.
    #[error("no collision-free spawn pose found after {attempts} attempts")]
    EnvironmentInfeasible { attempts: u32 },
    /// A pose with NaN or infinite components reached the engine.
    #[error("non-finite robot pose ({x}, {y}, {theta})")]
    InvalidPose { x: f64, y: f64, theta: f64 },
    /// The optimizer changed the population size across a generation.
    #[error("evolver returned {actual} chromosomes for a population of {expected}")]
    EvolverContract { expected: usize, actual: usize },
    /// The requested worker pool could not be constructed.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
