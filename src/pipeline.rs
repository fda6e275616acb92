//! Linear pipeline container (spec §4.4).
//!
//! Owns an ordered list of stages and, for each stage, an input buffer sized
//! `block_size + prelude` frames. One `pass` chains stage `i`'s output into
//! stage `i+1`'s input (past its prelude region) and copies the tail of each
//! stage's presented input into its own prelude region for the next call.

use crate::error::{ConstructionError, ProcessFatal};
use crate::stage::{Registry, Stage};

/// A parsed `name,arg1,arg2,...` stage descriptor (spec §4.4 grammar).
struct StageDesc {
    name: String,
    args: Vec<String>,
}

fn parse_description(desc: &str) -> Result<Vec<StageDesc>, ConstructionError> {
    if desc.trim().is_empty() {
        return Err(ConstructionError::MalformedDescription(desc.to_string()));
    }
    let mut out = Vec::new();
    for stage_desc in desc.split(':') {
        let mut parts = stage_desc.split(',');
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConstructionError::MalformedDescription(desc.to_string()))?
            .to_string();
        let args = parts.map(|s| s.to_string()).collect();
        out.push(StageDesc { name, args });
    }
    Ok(out)
}

pub struct Pipeline {
    desc: String,
    stages: Vec<Box<dyn Stage>>,
    /// `buffers[i]` holds `2 * (block_size + stages[i].prelude())` floats;
    /// the first `2 * prelude[i]` floats are the prelude region.
    buffers: Vec<Vec<f32>>,
    preludes: Vec<u32>,
    block_size: u32,
    sample_rate: f32,
}

/// Drops stages in reverse of construction order (spec §3 Lifecycle: "Stage
/// destruction order is reverse of construction"). Load-bearing for `dl`
/// stages further down the chain that unload a shared-library image on
/// `Drop` — downstream stages may depend on an upstream one's resources
/// outliving them, so the default field-order (construction-order) drop
/// would invert that guarantee.
impl Drop for Pipeline {
    fn drop(&mut self) {
        while self.stages.pop().is_some() {}
    }
}

impl Pipeline {
    /// Parses `desc`, constructs every stage via `registry`, and allocates
    /// per-stage input buffers (spec §4.4 construction steps).
    pub fn new(
        sample_rate: f32,
        block_size: u32,
        desc: &str,
        registry: &Registry,
    ) -> Result<Self, ConstructionError> {
        let descs = parse_description(desc)?;

        let mut stages = Vec::with_capacity(descs.len());
        for sd in &descs {
            match registry.construct(&sd.name, sample_rate, &sd.args) {
                Ok(stage) => stages.push(stage),
                Err(e) => {
                    // Already-constructed stages free themselves via Drop
                    // as `stages` goes out of scope here.
                    return Err(e);
                }
            }
        }

        let preludes: Vec<u32> = stages.iter().map(|s| s.prelude()).collect();
        for (sd, &prelude) in descs.iter().zip(preludes.iter()) {
            if prelude > block_size {
                return Err(ConstructionError::PreludeExceedsBlockSize {
                    stage: sd.name.clone(),
                    prelude,
                    block_size,
                });
            }
        }

        let buffers = preludes
            .iter()
            .map(|&prelude| vec![0.0f32; 2 * (block_size + prelude) as usize])
            .collect();

        Ok(Pipeline {
            desc: desc.to_string(),
            stages,
            buffers,
            preludes,
            block_size,
            sample_rate,
        })
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// A writable view of where the caller should place the next block:
    /// the `2 * block_size` floats immediately after stage 0's prelude
    /// region, inside buffer 0 (spec §4.4 `input_buffer_view`).
    pub fn input_buffer_view(&mut self) -> &mut [f32] {
        let prelude0 = self.preludes[0] as usize;
        let start = 2 * prelude0;
        let end = start + 2 * self.block_size as usize;
        &mut self.buffers[0][start..end]
    }

    /// Executes one full pass over every stage (spec §4.4 `pass`). `n` must
    /// be at most `block_size`; `n < block_size` is expected on the final,
    /// short read of offline mode (spec §9).
    pub fn pass(&mut self, out: &mut [f32], n: u32) -> Result<(), ProcessFatal> {
        assert!(
            n <= self.block_size,
            "pass called with n={n} > block_size={}",
            self.block_size
        );
        let n = n as usize;
        let k = self.stages.len();

        for i in 0..k {
            let prelude_i = self.preludes[i] as usize;

            if i + 1 < k {
                let prelude_next = self.preludes[i + 1] as usize;
                let (left, right) = self.buffers.split_at_mut(i + 1);
                let s_in = &left[i][..];
                let s_out = &mut right[0][2 * prelude_next..2 * prelude_next + 2 * n];
                self.stages[i].process(s_in, s_out, n)?;
            } else {
                let s_in = &self.buffers[i][..];
                self.stages[i].process(s_in, &mut out[..2 * n], n)?;
            }

            // Copy the trailing `prelude_i` frames of the region just
            // presented as input into this buffer's own prelude region, for
            // the next call (spec §4.4 invariant).
            if prelude_i > 0 {
                let buf = &mut self.buffers[i];
                let new_region_start = 2 * prelude_i;
                let new_region_end = new_region_start + 2 * n;
                let tail_start = new_region_end - 2 * prelude_i.min(n);
                // When n < prelude_i, part of the carried-forward tail is
                // itself drawn from the previous prelude (still valid, since
                // it has not been overwritten).
                let (prelude_region, rest) = buf.split_at_mut(new_region_start);
                if n >= prelude_i {
                    let src_start = tail_start - new_region_start;
                    prelude_region.copy_from_slice(&rest[src_start..src_start + 2 * prelude_i]);
                } else {
                    // Shift: keep the last (prelude_i - n) frames of the old
                    // prelude, then append the n new frames.
                    let keep = prelude_i - n;
                    prelude_region.copy_within(2 * n.., 0);
                    prelude_region[2 * keep..].copy_from_slice(&rest[..2 * n]);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_block(pipeline: &mut Pipeline, block: &[f32]) {
        let view = pipeline.input_buffer_view();
        view.copy_from_slice(block);
    }

    #[test]
    fn single_stage_k_at_least_one() {
        let reg = Registry::with_builtins();
        let p = Pipeline::new(8000.0, 512, "amplify,1.0", &reg).unwrap();
        assert_eq!(p.stage_count(), 1);
    }

    #[test]
    fn empty_description_is_rejected() {
        let reg = Registry::with_builtins();
        assert!(Pipeline::new(8000.0, 512, "", &reg).is_err());
    }

    #[test]
    fn scenario_1_amplify_two() {
        let reg = Registry::with_builtins();
        let mut p = Pipeline::new(8000.0, 4, "amplify,2", &reg).unwrap();
        push_block(&mut p, &[1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0]);
        let mut out = vec![0.0f32; 8];
        p.pass(&mut out, 4).unwrap();
        assert_eq!(out, [2.0, 0.0, 0.0, 2.0, -2.0, 0.0, 0.0, -2.0]);
    }

    #[test]
    fn prelude_exceeding_block_size_is_rejected() {
        let reg = Registry::with_builtins();
        // kbfir,41 has prelude 40, larger than block_size 8.
        let err = Pipeline::new(8000.0, 8, "kbfir,41,0,1000,100", &reg).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::PreludeExceedsBlockSize { .. }
        ));
    }

    #[test]
    fn prelude_region_matches_tail_of_presented_input() {
        let reg = Registry::with_builtins();
        // customfir with 3 taps => prelude 2.
        let mut p = Pipeline::new(8000.0, 4, "customfir,0.2,0.3,0.5", &reg).unwrap();
        push_block(&mut p, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0]);
        let mut out = vec![0.0f32; 8];
        p.pass(&mut out, 4).unwrap();
        // After the pass, buffer 0's prelude region (2 frames) must equal
        // the last 2 frames presented as input this pass: (3,0),(4,0).
        assert_eq!(&p.buffers[0][0..4], &[3.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn split_across_two_blocks_matches_single_pass_at_the_prelude_boundary() {
        let reg = Registry::with_builtins();
        let coeffs = "0.1,0.2,0.3,0.25,0.15";
        let desc = format!("customfir,{coeffs}");

        // Single pass over the whole sequence.
        let full_len = 12usize;
        let full_input: Vec<f32> = (0..full_len)
            .map(|k| (k as f32 * 0.37).sin())
            .collect();
        let mut whole = Pipeline::new(8000.0, full_len as u32, &desc, &reg).unwrap();
        let mut whole_in = vec![0.0f32; 2 * full_len];
        for k in 0..full_len {
            whole_in[2 * k] = full_input[k];
            whole_in[2 * k + 1] = 0.0;
        }
        push_block(&mut whole, &whole_in);
        let mut whole_out = vec![0.0f32; 2 * full_len];
        whole.pass(&mut whole_out, full_len as u32).unwrap();

        // Split A|B with A of length 7, B of length 5, block_size = 7.
        let a_len = 7usize;
        let b_len = full_len - a_len;
        let mut split = Pipeline::new(8000.0, a_len as u32, &desc, &reg).unwrap();
        let mut a_in = vec![0.0f32; 2 * a_len];
        for k in 0..a_len {
            a_in[2 * k] = full_input[k];
        }
        push_block(&mut split, &a_in);
        let mut a_out = vec![0.0f32; 2 * a_len];
        split.pass(&mut a_out, a_len as u32).unwrap();

        let mut b_in = vec![0.0f32; 2 * b_len];
        for k in 0..b_len {
            b_in[2 * k] = full_input[a_len + k];
        }
        {
            let view = split.input_buffer_view();
            view[..2 * b_len].copy_from_slice(&b_in);
        }
        let mut b_out = vec![0.0f32; 2 * b_len];
        split.pass(&mut b_out, b_len as u32).unwrap();

        let prelude = 4usize; // 5 taps => prelude 4
        for k in prelude..b_len {
            let whole_idx = a_len + k;
            assert!(
                (b_out[2 * k] - whole_out[2 * whole_idx]).abs() < 1e-5,
                "k={k}: {} vs {}",
                b_out[2 * k],
                whole_out[2 * whole_idx]
            );
        }
    }
}
