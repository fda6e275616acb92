//! Literal-coefficient FIR (spec §4.2 `customfir`) — same kernel as `kbfir`.

use crate::error::ConstructionError;
use crate::stage::firkernel::filter_iq;
use crate::stage::Stage;

const USAGE: &str = "customfir,<c1>,<c2>,...,<cN>";

pub struct CustomFir {
    coeffs: Vec<f32>,
}

impl CustomFir {
    pub fn new(coeffs: Vec<f32>) -> Self {
        CustomFir { coeffs }
    }
}

impl Stage for CustomFir {
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
        "customfir"
    }
}

pub fn construct(_sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError> {
    if args.is_empty() {
        return Err(ConstructionError::Usage {
            stage: "customfir".to_string(),
            usage: USAGE.to_string(),
        });
    }
    let mut coeffs = Vec::with_capacity(args.len());
    for (idx, arg) in args.iter().enumerate() {
        let c: f32 = arg.parse().map_err(|_| ConstructionError::InvalidArgument {
            stage: "customfir".to_string(),
            message: format!("coefficient {idx} must be a number, got {arg:?}"),
        })?;
        coeffs.push(c);
    }
    Ok(Box::new(CustomFir::new(coeffs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_kbfir_given_identical_coefficients() {
        use crate::stage::kbfir::design_kbfir;
        let coeffs = design_kbfir(41, 0.0, 1000.0, 100.0, 8000.0);
        let mut custom = CustomFir::new(coeffs.clone());
        let prelude = custom.prelude() as usize;
        let n = 128usize;
        let input: Vec<f32> = (0..2 * (prelude + n))
            .map(|k| ((k as f32) * 0.013).sin())
            .collect();
        let mut out_custom = vec![0.0f32; 2 * n];
        custom.process(&input, &mut out_custom, n).unwrap();

        let mut kb = crate::stage::kbfir::Kbfir::new(41, 0.0, 1000.0, 100.0, 8000.0);
        let mut out_kb = vec![0.0f32; 2 * n];
        kb.process(&input, &mut out_kb, n).unwrap();

        for (a, b) in out_custom.iter().zip(out_kb.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
