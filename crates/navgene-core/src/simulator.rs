//! Episode state machine and population-level parallel execution.

use crate::environment::Environment;
use crate::robot::{Robot, Termination};
use crate::SimError;
use navgene_policy::Chromosome;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub termination: Termination,
    /// Number of control steps actually executed before termination.
    pub steps: usize,
    pub fitness: f64,
}

/// Run one bounded episode: sense, decide, move, score, and check
/// termination until collision, goal, or the step cap.
///
/// The robot's histories are padded so that
/// `pose_history.len() == sensor_history.len() == max_steps` regardless of
/// early termination, and its fitness is set to the truncated accumulated
/// episode reward.
pub fn run_episode(env: &Environment, robot: &mut Robot) -> Result<EpisodeReport, SimError> {
    robot
        .chromosome()
        .ensure_policy_width(env.config().sensor_angles.len())?;
    robot.pose().ensure_finite()?;

    let config = env.config();
    let max_steps = config.max_steps;
    let mut episode_reward = 0.0;
    let mut termination = Termination::TimedOut;
    let mut steps = 0usize;

    robot.record_state(env);
    // The initial record is entry 0; up to max_steps - 1 control steps
    // follow so every history is exactly max_steps entries long.
    for _ in 1..max_steps {
        let omega = robot.decide_action(env);
        robot.step(config.linear_velocity, omega, config.dt);
        robot.record_state(env);
        steps += 1;

        let pose = robot.pose();
        let reward = env.reward(pose.x, pose.y, pose.theta);
        episode_reward += reward.value;
        if reward.collided {
            termination = Termination::Collided;
            break;
        }
        if reward.goal_reached {
            termination = Termination::GoalReached;
            break;
        }
    }

    robot.pad_history(max_steps);
    robot.set_fitness(episode_reward);
    robot.set_termination(termination);
    let fitness = robot.fitness().unwrap_or_default();
    debug!(?termination, steps, fitness, "episode finished");
    Ok(EpisodeReport {
        termination,
        steps,
        fitness,
    })
}

/// Derive an order-independent RNG stream for one individual.
fn stream_seed(master: u64, index: usize) -> u64 {
    master ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Evaluate one population: spawn a robot per chromosome and run every
/// episode on a worker pool of exactly `nthreads` threads.
///
/// The output preserves the input order and size; any failing episode fails
/// the whole generation atomically. Spawn randomness comes from the
/// configured seed (or entropy when unseeded), with per-individual streams
/// derived by index so sequential and parallel runs agree.
pub fn run_generation(
    chromosomes: &[Chromosome],
    env: &Environment,
    nthreads: usize,
) -> Result<Vec<Robot>, SimError> {
    run_generation_seeded(chromosomes, env, nthreads, env.config().master_seed())
}

fn run_generation_seeded(
    chromosomes: &[Chromosome],
    env: &Environment,
    nthreads: usize,
    master_seed: u64,
) -> Result<Vec<Robot>, SimError> {
    // rayon treats 0 as "derive from the environment"; the pool size must
    // come from the caller.
    if nthreads == 0 {
        return Err(SimError::InvalidConfig("nthreads must be non-zero"));
    }

    let sensor_count = env.config().sensor_angles.len();
    for (index, chromosome) in chromosomes.iter().enumerate() {
        chromosome
            .ensure_policy_width(sensor_count)
            .map_err(|source| SimError::Chromosome { index, source })?;
    }

    let pool = ThreadPoolBuilder::new().num_threads(nthreads).build()?;
    let robots = pool.install(|| {
        chromosomes
            .par_iter()
            .enumerate()
            .map(|(index, chromosome)| {
                let mut rng = SmallRng::seed_from_u64(stream_seed(master_seed, index));
                let mut robot = Robot::spawn(env, chromosome.clone(), &mut rng)?;
                let report = run_episode(env, &mut robot)?;
                debug!(
                    individual = index,
                    termination = ?report.termination,
                    fitness = report.fitness,
                    "individual evaluated"
                );
                Ok(robot)
            })
            .collect::<Result<Vec<_>, SimError>>()
    })?;

    debug_assert_eq!(robots.len(), chromosomes.len());
    Ok(robots)
}

/// Optimizer boundary: given the evaluated population, produce the next
/// generation of chromosomes, preserving the population size.
pub trait Evolver {
    fn evolve(&mut self, population: &[(Chromosome, f64)]) -> Vec<Chromosome>;
}

/// Aggregate fitness statistics for one evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub collisions: usize,
    pub goals_reached: usize,
    pub timeouts: usize,
}

impl GenerationSummary {
    fn from_robots(generation: usize, robots: &[Robot]) -> Self {
        let mut best = f64::NEG_INFINITY;
        let mut total = 0.0;
        let mut collisions = 0;
        let mut goals_reached = 0;
        let mut timeouts = 0;
        for robot in robots {
            let fitness = robot.fitness().unwrap_or_default();
            best = best.max(fitness);
            total += fitness;
            match robot.termination() {
                Some(Termination::Collided) => collisions += 1,
                Some(Termination::GoalReached) => goals_reached += 1,
                Some(Termination::TimedOut) | None => timeouts += 1,
            }
        }
        let mean = if robots.is_empty() {
            0.0
        } else {
            total / robots.len() as f64
        };
        Self {
            generation,
            best_fitness: best,
            mean_fitness: mean,
            collisions,
            goals_reached,
            timeouts,
        }
    }
}

/// Final population and per-generation statistics of an evolution run.
#[derive(Debug)]
pub struct EvolutionOutcome {
    /// Evaluated robots of the last generation, in population order.
    pub robots: Vec<Robot>,
    /// One summary per evaluated generation.
    pub history: Vec<GenerationSummary>,
}

/// Alternate evaluation and optimization for `generations` rounds.
///
/// Each round evaluates the current chromosomes with [`run_generation`]
/// (spawn seeds vary per generation but derive from the configured master
/// seed) and hands the `(chromosome, fitness)` pairs to the evolver. A
/// population-size change at the optimizer boundary fails the run with
/// [`SimError::EvolverContract`].
pub fn run_evolution<E: Evolver>(
    env: &Environment,
    evolver: &mut E,
    mut chromosomes: Vec<Chromosome>,
    generations: usize,
    nthreads: usize,
) -> Result<EvolutionOutcome, SimError> {
    let population = chromosomes.len();
    let master_seed = env.config().master_seed();
    let mut history = Vec::with_capacity(generations);
    let mut robots = Vec::new();

    for generation in 0..generations {
        let generation_seed = master_seed.wrapping_add(generation as u64);
        robots = run_generation_seeded(&chromosomes, env, nthreads, generation_seed)?;

        let summary = GenerationSummary::from_robots(generation, &robots);
        info!(
            generation,
            best = summary.best_fitness,
            mean = summary.mean_fitness,
            goals = summary.goals_reached,
            collisions = summary.collisions,
            timeouts = summary.timeouts,
            "generation evaluated"
        );
        history.push(summary);

        if generation + 1 < generations {
            let pairs: Vec<(Chromosome, f64)> = robots
                .iter()
                .map(|robot| (robot.chromosome().clone(), robot.fitness().unwrap_or_default()))
                .collect();
            chromosomes = evolver.evolve(&pairs);
            if chromosomes.len() != population {
                return Err(SimError::EvolverContract {
                    expected: population,
                    actual: chromosomes.len(),
                });
            }
        }
    }

    Ok(EvolutionOutcome { robots, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::robot::Pose;

    fn env(seed: u64) -> Environment {
        Environment::new(SimConfig {
            rng_seed: Some(seed),
            ..SimConfig::default()
        })
        .expect("environment")
    }

    fn random_population(seed: u64, count: usize) -> Vec<Chromosome> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let len = SimConfig::default().chromosome_len();
        (0..count).map(|_| Chromosome::random(&mut rng, len)).collect()
    }

    #[test]
    fn histories_are_equal_length_after_any_termination() {
        let env = env(11);
        let max_steps = env.config().max_steps;
        for (i, chromosome) in random_population(21, 8).into_iter().enumerate() {
            let mut rng = SmallRng::seed_from_u64(i as u64);
            let mut robot = Robot::spawn(&env, chromosome, &mut rng).expect("spawn");
            run_episode(&env, &mut robot).expect("episode");
            assert_eq!(robot.pose_history().len(), max_steps);
            assert_eq!(robot.sensor_history().len(), max_steps);
        }
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let env = env(9);
        let population = random_population(13, 2);
        assert!(matches!(
            run_generation(&population, &env, 0),
            Err(SimError::InvalidConfig("nthreads must be non-zero"))
        ));
    }

    #[test]
    fn short_chromosome_fails_before_any_episode() {
        let env = env(1);
        let mut population = random_population(2, 3);
        population[1] = Chromosome::from_bits(vec![true; 8]);
        let err = run_generation(&population, &env, 2).expect_err("must fail fast");
        assert!(matches!(err, SimError::Chromosome { index: 1, .. }));
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let env = env(1);
        let chromosome = random_population(3, 1).remove(0);
        let mut robot = Robot::with_pose(Pose::new(f64::NAN, 1.0, 0.0), chromosome);
        assert!(matches!(
            run_episode(&env, &mut robot),
            Err(SimError::InvalidPose { .. })
        ));
    }

    #[test]
    fn evolver_size_drift_is_an_error() {
        struct Shrinking;
        impl Evolver for Shrinking {
            fn evolve(&mut self, population: &[(Chromosome, f64)]) -> Vec<Chromosome> {
                population
                    .iter()
                    .skip(1)
                    .map(|(chromosome, _)| chromosome.clone())
                    .collect()
            }
        }

        let env = env(5);
        let population = random_population(7, 4);
        let err = run_evolution(&env, &mut Shrinking, population, 2, 2)
            .expect_err("size drift must fail");
        assert!(matches!(
            err,
            SimError::EvolverContract {
                expected: 4,
                actual: 3
            }
        ));
    }
}
