//! Offline mode (spec §6): reads interleaved `f32` IQ from a `Read`, writes
//! interleaved `f32` IQ to a `Write`, in fixed-size blocks. Used by `main.rs`
//! with stdin/stdout, and exercised directly in tests with `Cursor`s.

use crate::error::ProcessFatal;
use crate::pipeline::Pipeline;
use std::fmt;
use std::io::{self, Read, Write};
use tracing::{info, warn};

#[derive(Debug)]
pub enum OfflineError {
    Io(io::Error),
    Process(ProcessFatal),
}

impl fmt::Display for OfflineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineError::Io(e) => write!(f, "io error: {e}"),
            OfflineError::Process(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OfflineError {}

impl From<io::Error> for OfflineError {
    fn from(e: io::Error) -> Self {
        OfflineError::Io(e)
    }
}

impl From<ProcessFatal> for OfflineError {
    fn from(e: ProcessFatal) -> Self {
        OfflineError::Process(e)
    }
}

/// Pumps `input` through `pipeline` in blocks of `pipeline.block_size()`
/// frames, writing results to `output`. A short final read (spec §9, `n <
/// block_size`) is passed through as-is; a read of zero frames ends the loop
/// cleanly. Bytes are native-endian `f32`, interleaved I, Q.
pub fn run<R: Read, W: Write>(
    pipeline: &mut Pipeline,
    input: &mut R,
    output: &mut W,
) -> Result<(), OfflineError> {
    let block_size = pipeline.block_size() as usize;
    let mut read_buf = vec![0u8; 2 * block_size * std::mem::size_of::<f32>()];
    let mut out_floats = vec![0.0f32; 2 * block_size];
    let mut out_bytes = vec![0u8; 2 * block_size * std::mem::size_of::<f32>()];
    let mut total_frames: u64 = 0;

    loop {
        let n_bytes = read_fully_or_short(input, &mut read_buf)?;
        if n_bytes == 0 {
            break;
        }
        // Any partial trailing sample (not a full f32, or an unpaired I with
        // no Q) is discarded; it cannot represent a complete frame.
        let n_frames = n_bytes / (2 * std::mem::size_of::<f32>());
        if n_frames == 0 {
            break;
        }

        {
            let view = pipeline.input_buffer_view();
            for k in 0..(2 * n_frames) {
                let b = &read_buf[k * 4..k * 4 + 4];
                view[k] = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
            }
        }

        pipeline.pass(&mut out_floats[..2 * n_frames], n_frames as u32)?;

        for k in 0..(2 * n_frames) {
            out_bytes[k * 4..k * 4 + 4].copy_from_slice(&out_floats[k].to_ne_bytes());
        }
        output.write_all(&out_bytes[..2 * n_frames * 4])?;

        total_frames += n_frames as u64;

        if n_frames < block_size {
            // Short read: this was the final block (spec §9).
            break;
        }
    }

    output.flush()?;
    info!(total_frames, "offline pass complete");
    Ok(())
}

/// Reads into `buf` until it is full or the source is exhausted, returning
/// the number of bytes actually filled. Unlike `Read::read_exact`, a short
/// final chunk is not an error — it represents the last, partial block.
fn read_fully_or_short<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled % (2 * std::mem::size_of::<f32>()) != 0 {
        warn!(
            filled,
            "trailing bytes do not form whole IQ frames; truncating"
        );
        filled -= filled % (2 * std::mem::size_of::<f32>());
    }
    Ok(filled)
}
