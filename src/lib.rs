//! whistle: a realtime IQ (complex baseband) DSP pipeline engine for
//! software-defined radio.
//!
//! A description string of the form `stageA,arg1,arg2:stageB,arg1:...` is
//! parsed into a linear chain of [`stage::Stage`] implementations, wired
//! together by a [`pipeline::Pipeline`] that owns each stage's history
//! ("prelude") buffer and pumps blocks of interleaved IQ samples through the
//! chain once per realtime callback.
//!
//! ## Quick start
//!
//! ```no_run
//! use whistle::pipeline::Pipeline;
//! use whistle::stage::Registry;
//!
//! let registry = Registry::with_builtins();
//! let mut pipeline = Pipeline::new(8000.0, 512, "freqx,-10000:kbfir,41,0,1000,100", &registry)
//!     .expect("pipeline description should construct");
//!
//! let input = pipeline.input_buffer_view();
//! input.fill(0.0);
//!
//! let mut out = vec![0.0f32; 2 * 512];
//! pipeline.pass(&mut out, 512).expect("pass should succeed");
//! ```

pub mod audio;
pub mod error;
pub mod offline;
pub mod pipeline;
pub mod sample;
pub mod stage;

pub const DEFAULT_PIPELINE_DESC: &str = "freqx,-10000:kbfir,41,0,1000,100:freqx,1000:amplify,100";
pub const DEFAULT_CLIENT_NAME: &str = "whistle";
pub const DEFAULT_OFFLINE_BLOCK_SIZE: u32 = 8192;
