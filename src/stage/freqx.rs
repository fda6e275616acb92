//! Complex frequency-shift (mixer) stage (spec §4.2 `freqx`).

use crate::error::ConstructionError;
use crate::sample::Frame;
use crate::stage::Stage;

const USAGE: &str = "freqx,<freq_hz>";

pub struct Freqx {
    inc: Frame,
    phase: Frame,
}

impl Freqx {
    pub fn new(sample_rate: f32, freq_hz: f32) -> Self {
        let theta = 2.0 * std::f32::consts::PI * freq_hz / sample_rate;
        Freqx {
            inc: Frame::new(theta.cos(), theta.sin()),
            phase: Frame::new(1.0, 0.0),
        }
    }
}

impl Stage for Freqx {
    fn prelude(&self) -> u32 {
        0
    }

    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        n_frames: usize,
    ) -> Result<(), crate::error::ProcessFatal> {
        for i in 0..n_frames {
            let x = Frame::new(input[2 * i], input[2 * i + 1]);
            let y = x * self.phase;
            output[2 * i] = y.i;
            output[2 * i + 1] = y.q;
            self.phase = self.phase * self.inc;
        }
        // Renormalise to bound drift (spec §4.2).
        let mag = (self.phase.i * self.phase.i + self.phase.q * self.phase.q).sqrt();
        if mag > 0.0 {
            self.phase = self.phase * (1.0 / mag);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "freqx"
    }
}

pub fn construct(sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError> {
    if args.len() != 1 {
        return Err(ConstructionError::Usage {
            stage: "freqx".to_string(),
            usage: USAGE.to_string(),
        });
    }
    let freq_hz: f32 = args[0].parse().map_err(|_| ConstructionError::InvalidArgument {
        stage: "freqx".to_string(),
        message: format!("freq_hz must be a number, got {:?}", args[0]),
    })?;
    Ok(Box::new(Freqx::new(sample_rate, freq_hz)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stage: &mut Freqx, input: &[(f32, f32)]) -> Vec<(f32, f32)> {
        let n = input.len();
        let mut inbuf = vec![0.0f32; 2 * n];
        for (i, (si, sq)) in input.iter().enumerate() {
            inbuf[2 * i] = *si;
            inbuf[2 * i + 1] = *sq;
        }
        let mut out = vec![0.0f32; 2 * n];
        stage.process(&inbuf, &mut out, n).unwrap();
        (0..n).map(|i| (out[2 * i], out[2 * i + 1])).collect()
    }

    #[test]
    fn zero_freq_is_identity() {
        let mut s = Freqx::new(8000.0, 0.0);
        let input = vec![(1.0, 0.0), (0.5, -0.5), (-1.0, 2.0)];
        let out = run(&mut s, &input);
        for ((oi, oq), (ii, iq)) in out.iter().zip(input.iter()) {
            assert!((oi - ii).abs() < 1e-6);
            assert!((oq - iq).abs() < 1e-6);
        }
    }

    #[test]
    fn scenario_4_matches_spec() {
        // freqx,1000 at sample_rate 4000, theta = pi/2
        let mut s = Freqx::new(4000.0, 1000.0);
        let input = vec![(1.0, 0.0); 4];
        let out = run(&mut s, &input);
        let theta = std::f32::consts::FRAC_PI_2;
        let expected = [
            (1.0, 0.0),
            (theta.cos(), theta.sin()),
            ((2.0 * theta).cos(), (2.0 * theta).sin()),
            ((3.0 * theta).cos(), (3.0 * theta).sin()),
        ];
        for ((oi, oq), (ei, eq)) in out.iter().zip(expected.iter()) {
            assert!((oi - ei).abs() < 1e-6, "{oi} vs {ei}");
            assert!((oq - eq).abs() < 1e-6, "{oq} vs {eq}");
        }
    }

    #[test]
    fn positive_then_negative_shift_is_near_identity() {
        let sr = 8000.0;
        let mut up = Freqx::new(sr, 437.0);
        let mut down = Freqx::new(sr, -437.0);
        let n = 100_000usize;
        let block = 512usize;
        let mut max_err = 0.0f32;
        let mut i = 0usize;
        while i < n {
            let m = block.min(n - i);
            let input: Vec<(f32, f32)> = (0..m).map(|k| ((i + k) as f32 * 0.001, 0.3)).collect();
            let mid = run(&mut up, &input);
            let back = run(&mut down, &mid);
            for (orig, recovered) in input.iter().zip(back.iter()) {
                max_err = max_err.max((orig.0 - recovered.0).abs());
                max_err = max_err.max((orig.1 - recovered.1).abs());
            }
            i += m;
        }
        assert!(max_err < 1e-4, "max_err={max_err}");
    }
}
