//! Kaiser-Bessel windowed-sinc band-pass FIR (spec §4.2 `kbfir`).

use crate::error::ConstructionError;
use crate::stage::firkernel::filter_iq;
use crate::stage::Stage;

const USAGE: &str = "kbfir,<ntaps>,<fa_hz>,<fb_hz>,<att_db>";

/// Modified Bessel function of the first kind, order 0, by series expansion
/// (spec §4.2), terminated once the next term is below `1e-6` of the
/// running sum.
pub fn bessel_i0(x: f32) -> f32 {
    let mut sum = 1.0f32;
    let mut term = 1.0f32;
    let mut m = 1.0f32;
    loop {
        term *= (x * x) / (4.0 * m * m);
        if term < sum * 1e-6 {
            break;
        }
        sum += term;
        m += 1.0;
        if m > 1000.0 {
            break;
        }
    }
    sum
}

/// Kaiser window shape parameter alpha for a target stop-band attenuation
/// `att` dB (spec §4.2).
pub fn kaiser_alpha(att: f32) -> f32 {
    if att < 21.0 {
        0.0
    } else if att > 50.0 {
        0.1102 * (att - 8.7)
    } else {
        0.5842 * (att - 21.0).powf(0.4) + 0.07886 * (att - 21.0)
    }
}

/// Design a symmetric, linear-phase band-pass FIR of length `ntaps`
/// (spec §4.2). `ntaps` must already be validated as odd and positive.
pub fn design_kbfir(ntaps: usize, fa: f32, fb: f32, att: f32, sample_rate: f32) -> Vec<f32> {
    let np = (ntaps - 1) / 2;
    let alpha = kaiser_alpha(att);
    let i0_alpha = bessel_i0(alpha);

    let mut h = vec![0.0f32; ntaps];

    let a0 = 2.0 * (fb - fa) / sample_rate;
    h[np] = a0; // w[0] == 1

    for k in 1..=np {
        let kf = k as f32;
        let a_k = ((2.0 * std::f32::consts::PI * kf * fb / sample_rate).sin()
            - (2.0 * std::f32::consts::PI * kf * fa / sample_rate).sin())
            / (kf * std::f32::consts::PI);
        let ratio = kf / np as f32;
        let w_k = bessel_i0(alpha * (1.0 - ratio * ratio).max(0.0).sqrt()) / i0_alpha;
        let coeff = a_k * w_k;
        h[np + k] = coeff;
        h[np - k] = coeff;
    }

    h
}

pub struct Kbfir {
    coeffs: Vec<f32>,
}

impl Kbfir {
    pub fn new(ntaps: usize, fa: f32, fb: f32, att: f32, sample_rate: f32) -> Self {
        Kbfir {
            coeffs: design_kbfir(ntaps, fa, fb, att, sample_rate),
        }
    }
}

impl Stage for Kbfir {
    fn prelude(&self) -> u32 {
        (self.coeffs.len() - 1) as u32
    }

    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        n_frames: usize,
    ) -> Result<(), crate::error::ProcessFatal> {
        filter_iq(&self.coeffs, input, output, n_frames);
        Ok(())
    }

    fn name(&self) -> &str {
        "kbfir"
    }
}

pub fn construct(sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError> {
    if args.len() != 4 {
        return Err(ConstructionError::Usage {
            stage: "kbfir".to_string(),
            usage: USAGE.to_string(),
        });
    }
    let parse_f32 = |s: &str, what: &str| -> Result<f32, ConstructionError> {
        s.parse().map_err(|_| ConstructionError::InvalidArgument {
            stage: "kbfir".to_string(),
            message: format!("{what} must be a number, got {s:?}"),
        })
    };
    let ntaps: i64 = args[0].parse().map_err(|_| ConstructionError::InvalidArgument {
        stage: "kbfir".to_string(),
        message: format!("ntaps must be an integer, got {:?}", args[0]),
    })?;
    if ntaps <= 0 || ntaps % 2 == 0 {
        return Err(ConstructionError::InvalidArgument {
            stage: "kbfir".to_string(),
            message: format!("ntaps must be a positive odd integer, got {ntaps}"),
        });
    }
    let fa = parse_f32(&args[1], "fa")?;
    let fb = parse_f32(&args[2], "fb")?;
    let att = parse_f32(&args[3], "att")?;
    Ok(Box::new(Kbfir::new(ntaps as usize, fa, fb, att, sample_rate)))
}
