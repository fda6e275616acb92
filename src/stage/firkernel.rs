//! Shared real FIR filtering kernel used by `kbfir` and `customfir` (spec §4.2).
//!
//! Ancestor: `original_source/whistle/whistle.c`'s `fir()`, which keeps a
//! 49-sample global history array and folds the tail of the previous block
//! into the head of the current one. Here the history lives in the stage's
//! per-channel buffers and the previous block's tail is provided by the
//! pipeline's prelude region instead of a private state array (spec §9:
//! "do not reintroduce globals").

/// Apply `coeffs` to one real channel. `input` must hold `coeffs.len() - 1`
/// prelude samples followed by `n_frames` new samples (i.e. `n_frames +
/// coeffs.len() - 1` samples total, with index `coeffs.len() - 1` being the
/// first new sample). `out[i] = sum_{x=0..coeffs.len()} coeffs[x] * input[i + (coeffs.len()-1) - x]`.
pub fn filter_channel(coeffs: &[f32], input: &[f32], output: &mut [f32], n_frames: usize) {
    let taps = coeffs.len();
    let prelude = taps - 1;
    debug_assert!(input.len() >= n_frames + prelude);
    debug_assert!(output.len() >= n_frames);

    for i in 0..n_frames {
        let base = i + prelude;
        let mut acc = 0.0f32;
        for (x, c) in coeffs.iter().enumerate() {
            acc += c * input[base - x];
        }
        output[i] = acc;
    }
}

/// Apply `coeffs` independently to the I and Q channels of an interleaved
/// IQ buffer. `input` carries `2 * (prelude + n_frames)` floats (prelude
/// frames first); `output` carries `2 * n_frames` floats.
pub fn filter_iq(coeffs: &[f32], input: &[f32], output: &mut [f32], n_frames: usize) {
    let taps = coeffs.len();
    let prelude = taps - 1;

    for i in 0..n_frames {
        let base = i + prelude;
        let mut acc_i = 0.0f32;
        let mut acc_q = 0.0f32;
        for (x, c) in coeffs.iter().enumerate() {
            let frame = base - x;
            acc_i += c * input[2 * frame];
            acc_q += c * input[2 * frame + 1];
        }
        output[2 * i] = acc_i;
        output[2 * i + 1] = acc_q;
    }
}
