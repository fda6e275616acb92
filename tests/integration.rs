//! End-to-end pipeline scenarios (spec §8) exercised through the public
//! crate surface rather than any single stage's unit tests.

use whistle::pipeline::Pipeline;
use whistle::stage::Registry;

fn push_block(pipeline: &mut Pipeline, block: &[f32]) {
    let view = pipeline.input_buffer_view();
    view.copy_from_slice(block);
}

/// Scenario 5: `freqx,-1000:kbfir,41,0,500,80:freqx,1000` at sample_rate 8000
/// is a band-pass filter centred at 1000 Hz. A 1000 Hz tone should retain
/// most of its magnitude in steady state; a 3000 Hz tone should be heavily
/// attenuated.
#[test]
fn scenario_5_bandpass_passes_1000hz_rejects_3000hz() {
    let reg = Registry::with_builtins();
    let sr = 8000.0f32;
    let desc = "freqx,-1000:kbfir,41,0,500,80:freqx,1000";

    let settle = 400usize;
    let measure = 2000usize;
    let total = settle + measure;
    let block = 512usize;

    let magnitude_ratio = |freq_hz: f32| -> f32 {
        let mut pipeline = Pipeline::new(sr, block as u32, desc, &reg).unwrap();
        let theta = 2.0 * std::f32::consts::PI * freq_hz / sr;

        let mut out_mag_sum = 0.0f64;
        let mut counted = 0usize;

        let mut k = 0usize;
        while k < total {
            let n = block.min(total - k);
            let mut input = vec![0.0f32; 2 * n];
            for j in 0..n {
                let phase = theta * (k + j) as f32;
                input[2 * j] = phase.cos();
                input[2 * j + 1] = phase.sin();
            }
            push_block(&mut pipeline, &vec_resize(&input, 2 * block));
            let mut out = vec![0.0f32; 2 * block];
            pipeline.pass(&mut out, n as u32).unwrap();

            if k >= settle {
                for j in 0..n {
                    if k + j >= settle {
                        let oi = out[2 * j];
                        let oq = out[2 * j + 1];
                        out_mag_sum += ((oi * oi + oq * oq) as f64).sqrt();
                        counted += 1;
                    }
                }
            }
            k += n;
        }

        (out_mag_sum / counted as f64) as f32
    };

    fn vec_resize(v: &[f32], len: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; len];
        out[..v.len()].copy_from_slice(v);
        out
    }

    // The inner kbfir,41,0,500,80 is a low-pass with designed passband gain
    // 2*(fb-fa)/sr (spec §4.2, confirmed by the kbfir DC-gain scenario), not
    // unity — so "retains its magnitude" is measured relative to that
    // designed gain, not the original unit-magnitude input.
    let designed_gain = 2.0 * (500.0 - 0.0) / 8000.0;

    let pass_mag = magnitude_ratio(1000.0) / designed_gain;
    let reject_mag = magnitude_ratio(3000.0);

    assert!(
        pass_mag >= 0.95,
        "1000 Hz tone should retain >=95% of the designed passband gain, got {pass_mag}"
    );
    assert!(
        reject_mag <= 0.01,
        "3000 Hz tone should be attenuated to <=1% of unit input magnitude, got {reject_mag}"
    );
}

/// Universal property (spec §8): for any stage with `prelude = 0`, block
/// [A|B] processed as one call produces the same output as A and B driven
/// through separate `pass` calls.
#[test]
fn zero_prelude_stage_is_blockwise_associative() {
    let reg = Registry::with_builtins();
    let a: Vec<f32> = vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0];
    let b: Vec<f32> = vec![4.0, 0.0, 5.0, 0.0];

    let mut whole = Pipeline::new(8000.0, 5, "amplify,3.0", &reg).unwrap();
    let mut whole_in = a.clone();
    whole_in.extend_from_slice(&b);
    push_block(&mut whole, &whole_in);
    let mut whole_out = vec![0.0f32; 10];
    whole.pass(&mut whole_out, 5).unwrap();

    let mut split = Pipeline::new(8000.0, 3, "amplify,3.0", &reg).unwrap();
    push_block(&mut split, &a);
    let mut a_out = vec![0.0f32; 6];
    split.pass(&mut a_out, 3).unwrap();

    {
        let view = split.input_buffer_view();
        view[..4].copy_from_slice(&b);
    }
    let mut b_out = vec![0.0f32; 4];
    split.pass(&mut b_out, 2).unwrap();

    assert_eq!(whole_out[..6], a_out[..]);
    assert_eq!(whole_out[6..], b_out[..]);
}
