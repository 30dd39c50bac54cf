use std::path::PathBuf;

use tracing::{debug, warn};

use crate::{Coloring, Error, Signature};

/// Holds the coloring for the current structure, optionally backed by a file.
///
/// A cached coloring is reused only while its signature matches; anything
/// else is recomputed and replaces it.
#[derive(Debug, Default)]
pub struct ColoringCache {
    path: Option<PathBuf>,
    current: Option<Coloring>,
}

impl ColoringCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that loads from and saves to `path`.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            current: None,
        }
    }

    /// Returns the coloring for `signature`, computing it if needed.
    ///
    /// Looks in memory first, then in the backing file. A freshly computed
    /// coloring is stamped with `signature` and written to the file.
    ///
    /// # Errors
    ///
    /// Returns an error if `compute` fails or the file cannot be written.
    pub fn get_or_compute<F>(&mut self, signature: &Signature, compute: F) -> Result<&Coloring, Error>
    where
        F: FnOnce() -> Result<Coloring, Error>,
    {
        if self.current.as_ref().is_some_and(|c| c.is_valid_for(signature)) {
            debug!("reusing coloring from memory");
        } else if let Some(loaded) = self.load(signature) {
            self.current = Some(loaded);
        } else {
            let coloring = compute()?.with_signature(signature.clone());
            if let Some(path) = &self.path {
                coloring.save(path)?;
                debug!(path = %path.display(), "saved coloring");
            }
            self.current = Some(coloring);
        }
        self.current.as_ref().ok_or(Error::StaleSignature)
    }

    fn load(&self, signature: &Signature) -> Option<Coloring> {
        let path = self.path.as_ref().filter(|p| p.exists())?;
        match Coloring::load(path, signature) {
            Ok(coloring) => {
                debug!(path = %path.display(), "loaded coloring");
                Some(coloring)
            }
            Err(Error::StaleSignature) => {
                debug!(path = %path.display(), "stored coloring is stale");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable coloring file");
                None
            }
        }
    }

    /// Drops the in-memory coloring so the next request recomputes or reloads it.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<&Coloring> {
        self.current.as_ref()
    }
}
