//! Scalar amplifier (spec §4.2 `amplify`).

use crate::error::ConstructionError;
use crate::stage::Stage;

const USAGE: &str = "amplify,<factor>";

pub struct Amplify {
    factor: f32,
}

impl Amplify {
    pub fn new(factor: f32) -> Self {
        Amplify { factor }
    }
}

impl Stage for Amplify {
    fn prelude(&self) -> u32 {
        0
    }

    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        n_frames: usize,
    ) -> Result<(), crate::error::ProcessFatal> {
        for i in 0..2 * n_frames {
            output[i] = self.factor * input[i];
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "amplify"
    }
}

pub fn construct(_sample_rate: f32, args: &[String]) -> Result<Box<dyn Stage>, ConstructionError> {
    if args.len() != 1 {
        return Err(ConstructionError::Usage {
            stage: "amplify".to_string(),
            usage: USAGE.to_string(),
        });
    }
    let factor: f32 = args[0].parse().map_err(|_| ConstructionError::InvalidArgument {
        stage: "amplify".to_string(),
        message: format!("factor must be a number, got {:?}", args[0]),
    })?;
    Ok(Box::new(Amplify::new(factor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_at_unit_gain() {
        let mut s = Amplify::new(1.0);
        let input = [1.0f32, -2.0, 3.5, 0.25];
        let mut out = [0.0f32; 4];
        s.process(&input, &mut out, 2).unwrap();
        assert_eq!(input, out);
    }

    #[test]
    fn scenario_1_matches_spec() {
        let mut s = Amplify::new(2.0);
        let input = [1.0f32, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0];
        let mut out = [0.0f32; 8];
        s.process(&input, &mut out, 4).unwrap();
        assert_eq!(out, [2.0, 0.0, 0.0, 2.0, -2.0, 0.0, 0.0, -2.0]);
    }
}
