use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Coloring, ColoringConfig, Direction, Error, Recovery};

/// Identifies the structure a coloring was computed for.
///
/// `structure` is a fingerprint supplied by the caller that must change
/// whenever declared sparsity, connections, or variable shapes change. The
/// detection and coloring settings are part of the signature because they
/// change which entries count as structural and how they are recovered.
/// `tol` is kept as its bit pattern so the comparison survives a text round
/// trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub shape: (usize, usize),
    pub structure: u64,
    tol_bits: u64,
    pub num_full_jacs: usize,
    pub seed: u64,
    pub direction: Direction,
    pub recovery: Recovery,
}

impl Signature {
    #[must_use]
    pub fn new(shape: (usize, usize), structure: u64, config: &ColoringConfig) -> Self {
        Self {
            shape,
            structure,
            tol_bits: config.tol.to_bits(),
            num_full_jacs: config.num_full_jacs,
            seed: config.seed,
            direction: config.direction,
            recovery: config.recovery,
        }
    }

    #[must_use]
    pub fn tol(&self) -> f64 {
        f64::from_bits(self.tol_bits)
    }
}

/// FNV-1a over a little-endian byte stream, for `Signature::structure`.
///
/// The value depends only on the words written, so it stays the same across
/// platforms and compiler releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(u64);

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    #[must_use]
    pub fn new() -> Self {
        Self(Self::OFFSET)
    }

    #[must_use]
    pub fn word(mut self, word: u64) -> Self {
        for byte in word.to_le_bytes() {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
        self
    }

    /// Adds a length-prefixed run of indices.
    #[must_use]
    pub fn indices(self, indices: &[usize]) -> Self {
        indices
            .iter()
            .fold(self.word(indices.len() as u64), |fp, &i| fp.word(i as u64))
    }

    #[must_use]
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Coloring {
    /// Serializes the coloring, including its signature.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a coloring and checks it against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleSignature`] if the stored signature differs
    /// from `expected`, or an error if the JSON is malformed.
    pub fn from_json(json: &str, expected: &Signature) -> Result<Self, Error> {
        let coloring: Self = serde_json::from_str(json)?;
        if coloring.is_valid_for(expected) {
            Ok(coloring)
        } else {
            Err(Error::StaleSignature)
        }
    }

    /// Writes the coloring to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a coloring from a JSON file and checks it against `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if its
    /// signature differs from `expected`.
    pub fn load(path: impl AsRef<Path>, expected: &Signature) -> Result<Self, Error> {
        Self::from_json(&fs::read_to_string(path)?, expected)
    }
}
