//! Quadrature FM demodulator (spec §4.2 `fmdemod`, §9 Open Question).
//!
//! spec §9 flags that the exact frame the magnitude denominator is taken
//! from, and the exact span of the centred difference, are ambiguous in the
//! prototype source. We resolve this to the variant with the least
//! discontinuity across block boundaries: a frame-aligned two-frame-back
//! difference with the magnitude taken from the frame one step back from
//! the output index (matching the spec's "the frame one step back" note and
//! the `I_prev`/`Q_prev` naming in the output formula), rather than mixing
//! I from one frame with Q from another. Both channels use the same
//! two-frame span, so the kernel is continuous across a block boundary
//! when the caller supplies the prelude correctly.
//!
//! `out_I[i] = (I[i-1]*dQ - Q[i-1]*dI) / (I[i-1]^2 + Q[i-1]^2)`
//! `dI = I[i] - I[i-2]`, `dQ = Q[i] - Q[i-2]`, `out_Q[i] = 0`.

use crate::error::ConstructionError;
use crate::sample::read_frame;
use crate::stage::Stage;

const USAGE: &str = "fmdemod";

#[derive(Default)]
pub struct FmDemod;

impl Stage for FmDemod {
    fn prelude(&self) -> u32 {
        2
    }

    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        n_frames: usize,
    ) -> Result<(), crate::error::ProcessFatal> {
        let base = 2 * 2; // prelude frames precede the new region
        for i in 0..n_frames {
            let cur = read_frame(input, base, i as isize);
            let prev = read_frame(input, base, i as isize - 1);
            let prev2 = read_frame(input, base, i as isize - 2);

            let d_i = cur.i - prev2.i;
            let d_q = cur.q - prev2.q;
            let m = prev.i * prev.i + prev.q * prev.q;

            let out_i = if m > 0.0 {
                (prev.i * d_q - prev.q * d_i) / m
            } else {
                0.0
            };

            output[2 * i] = out_i;
            output[2 * i + 1] = 0.0;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fmdemod"
    }
}

pub fn construct(_sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError> {
    if !args.is_empty() {
        return Err(ConstructionError::Usage {
            stage: "fmdemod".to_string(),
            usage: USAGE.to_string(),
        });
    }
    Ok(Box::new(FmDemod))
}
