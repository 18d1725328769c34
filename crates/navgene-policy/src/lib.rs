//! Bit-vector lookup-table policies addressed by perceptual state.
//!
//! A [`Chromosome`] is a fixed-width bit vector acting as a giant lookup
//! table: the robot concatenates its sensor bits and heading-sector bits
//! into an unsigned index, reads a 3-bit slice of the chromosome at that
//! offset, and maps the slice through the static [`ACTION_TABLE`] to an
//! angular velocity.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of one encoded action in bits.
pub const ACTION_CODE_BITS: usize = 3;
/// Number of discrete actions expressible by one code.
pub const ACTION_COUNT: usize = 1 << ACTION_CODE_BITS;
/// Number of heading-sector bits appended to the sensor bits.
pub const HEADING_SECTORS: usize = 8;

/// Angular velocities indexed by 3-bit action code, monotone from a sharp
/// left turn at `000` to a full turn at `111`, with `0` at `011`.
pub const ACTION_TABLE: [f64; ACTION_COUNT] = [
    -std::f64::consts::FRAC_PI_2,
    -std::f64::consts::FRAC_PI_3,
    -std::f64::consts::FRAC_PI_6,
    0.0,
    std::f64::consts::FRAC_PI_6,
    std::f64::consts::FRAC_PI_3,
    std::f64::consts::FRAC_PI_2,
    std::f64::consts::PI,
];

/// Chromosome length required to address every perceptual index plus a full
/// action slice beyond the last address.
#[must_use]
pub const fn required_len(sensor_count: usize) -> usize {
    (1 << (sensor_count + HEADING_SECTORS)) + ACTION_CODE_BITS - 1
}

/// Errors raised when validating or parsing chromosomes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The chromosome cannot address the full perceptual index space.
    #[error("chromosome has {actual} bits, policy for {sensor_count} sensors requires {required}")]
    LengthMismatch {
        sensor_count: usize,
        required: usize,
        actual: usize,
    },
    /// A bitstring contained a character other than `0` or `1`.
    #[error("invalid chromosome character {found:?} at offset {offset}")]
    InvalidBitChar { offset: usize, found: char },
}

/// Fixed-width bit vector encoding a lookup-table policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromosome {
    bits: Vec<bool>,
}

impl Chromosome {
    /// Wrap an explicit bit sequence.
    #[must_use]
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Sample a uniformly random chromosome of `len` bits.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore, len: usize) -> Self {
        let bits = (0..len).map(|_| rng.random::<bool>()).collect();
        Self { bits }
    }

    /// Sample a random chromosome sized for `sensor_count` range sensors.
    #[must_use]
    pub fn random_for_sensors(rng: &mut dyn RngCore, sensor_count: usize) -> Self {
        Self::random(rng, required_len(sensor_count))
    }

    /// Number of bits in the chromosome.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true when the chromosome holds no bits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Raw bit access.
    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Fail fast unless the chromosome covers the index space produced by
    /// `sensor_count` sensor bits plus the heading one-hot bits.
    pub fn ensure_policy_width(&self, sensor_count: usize) -> Result<(), PolicyError> {
        let required = required_len(sensor_count);
        if self.bits.len() < required {
            return Err(PolicyError::LengthMismatch {
                sensor_count,
                required,
                actual: self.bits.len(),
            });
        }
        Ok(())
    }

    /// Read the 3-bit action code starting at bit offset `index`, most
    /// significant bit first.
    ///
    /// Callers must have validated the width via [`ensure_policy_width`];
    /// the offset is in range for every index the perception encoding can
    /// produce.
    ///
    /// [`ensure_policy_width`]: Self::ensure_policy_width
    #[must_use]
    pub fn action_code(&self, index: usize) -> u8 {
        debug_assert!(
            index + ACTION_CODE_BITS <= self.bits.len(),
            "action slice at {index} exceeds chromosome width {}",
            self.bits.len()
        );
        let mut code = 0u8;
        for bit in &self.bits[index..index + ACTION_CODE_BITS] {
            code = (code << 1) | u8::from(*bit);
        }
        code
    }

    /// Decode the perceptual index straight to an angular velocity.
    #[must_use]
    pub fn angular_velocity(&self, index: usize) -> f64 {
        ACTION_TABLE[self.action_code(index) as usize]
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for Chromosome {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = Vec::with_capacity(s.len());
        for (offset, ch) in s.chars().enumerate() {
            match ch {
                '0' => bits.push(false),
                '1' => bits.push(true),
                found => return Err(PolicyError::InvalidBitChar { offset, found }),
            }
        }
        Ok(Self { bits })
    }
}
