//! Stage abstraction and process-wide constructor registry (spec §4.1, §4.5).
//!
//! A stage is polymorphic over `{process, destroy, prelude}`. Rather than the
//! source's open-struct-with-function-pointers pattern, stages here are
//! trait objects (`Box<dyn Stage>`), constructed exclusively through named
//! constructors held in [`Registry`].

pub mod amplify;
pub mod customfir;
pub mod dl;
pub mod firkernel;
pub mod fmdemod;
pub mod freqx;
pub mod kbfir;

use crate::error::{ConstructionError, ProcessFatal};
use std::collections::HashMap;

/// A single DSP stage. Implementors must uphold the realtime contract of
/// spec §5: `process` performs no allocation, no blocking I/O, and acquires
/// no locks (the `dl` stage's non-blocking watch poll is the one exception,
/// spec §4.3).
pub trait Stage: Send {
    /// Number of frames of history this stage requires immediately before
    /// the current block (spec §3). Fixed for the stage's lifetime.
    fn prelude(&self) -> u32;

    /// Read frames `[-prelude, n_frames)` from `input` (interleaved IQ,
    /// `input[0]`/`input[1]` is frame 0), write frames `[0, n_frames)` to
    /// `output`. `input` must contain `2 * (prelude + n_frames)` floats with
    /// the prelude region first; `output` must contain at least
    /// `2 * n_frames` floats.
    ///
    /// Built-in stages never fail (spec §4.2); only the `dl` stage's
    /// hotswap path can return `Err`, which is realtime-fatal (spec §7).
    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        n_frames: usize,
    ) -> Result<(), ProcessFatal>;

    /// Human-readable name, for diagnostics only.
    fn name(&self) -> &str {
        "stage"
    }
}

/// `(sample_rate, args) -> Stage | ConstructionError` (spec §4.1).
pub type Constructor = fn(sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError>;

/// Process-wide mapping from stage name to constructor, populated once at
/// startup (spec §4.5). Read-only after construction.
pub struct Registry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Registry {
    /// The built-in stages named in spec §4.5: `freqx`, `kbfir`, `customfir`,
    /// `fmdemod`, `amplify`, `dl`.
    pub fn with_builtins() -> Self {
        let mut constructors: HashMap<&'static str, Constructor> = HashMap::new();
        constructors.insert("freqx", freqx::construct);
        constructors.insert("kbfir", kbfir::construct);
        constructors.insert("customfir", customfir::construct);
        constructors.insert("fmdemod", fmdemod::construct);
        constructors.insert("amplify", amplify::construct);
        constructors.insert("dl", dl::construct);
        Registry { constructors }
    }

    pub fn register(&mut self, name: &'static str, ctor: Constructor) {
        self.constructors.insert(name, ctor);
    }

    pub fn construct(
        &self,
        name: &str,
        sample_rate: f32,
        args: &[String],
    ) -> Result<Box<dyn Stage>, ConstructionError> {
        match self.constructors.get(name) {
            Some(ctor) => ctor(sample_rate, args),
            None => Err(ConstructionError::UnknownStage(name.to_string())),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stage_name_is_reported() {
        let reg = Registry::with_builtins();
        let err = reg.construct("nope", 8000.0, &[]).unwrap_err();
        assert!(matches!(err, ConstructionError::UnknownStage(n) if n == "nope"));
    }

    #[test]
    fn all_builtin_names_resolve() {
        let reg = Registry::with_builtins();
        for name in ["freqx", "kbfir", "customfir", "fmdemod", "amplify", "dl"] {
            assert!(reg.constructors.contains_key(name), "{name} missing");
        }
    }
}
