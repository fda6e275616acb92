//! Realtime audio-server binding (spec §6) — deliberately peripheral per
//! spec §1: the core is the pipeline, this module is the external
//! collaborator that feeds it. Uses `cpal` exactly as the teacher's
//! `audio.rs` does (default host, default device, `build_output_stream`),
//! generalized from mono mixing to the four-array deinterleaved IQ contract
//! of spec §6, with input and output streams bridged by a lock-free
//! `ringbuf` SPSC queue (no contested locks on the realtime thread, per
//! spec §5). [`process`] itself allocates nothing: its interleaved scratch
//! buffer is owned by the output stream's callback closure and reused
//! across calls.

use crate::error::ProcessFatal;
use crate::pipeline::Pipeline;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The abstract contract spec §6 assigns to the core: four arrays of `n`
/// deinterleaved `f32` samples in, and out. The audio-server binding's job
/// is entirely to interleave/deinterleave around this call; `scratch` is a
/// caller-owned interleaved buffer of at least `2 * n` floats reused across
/// calls so that nothing here allocates or blocks (spec §5).
pub fn process(
    pipeline: &mut Pipeline,
    in_i: &[f32],
    in_q: &[f32],
    out_i: &mut [f32],
    out_q: &mut [f32],
    scratch: &mut [f32],
    n: usize,
) -> Result<(), ProcessFatal> {
    debug_assert_eq!(in_i.len(), n);
    debug_assert_eq!(in_q.len(), n);
    debug_assert_eq!(out_i.len(), n);
    debug_assert_eq!(out_q.len(), n);
    debug_assert!(scratch.len() >= 2 * n);

    {
        let view = pipeline.input_buffer_view();
        for k in 0..n {
            view[2 * k] = in_i[k];
            view[2 * k + 1] = in_q[k];
        }
    }

    pipeline.pass(&mut scratch[..2 * n], n as u32)?;

    for k in 0..n {
        out_i[k] = scratch[2 * k];
        out_q[k] = scratch[2 * k + 1];
    }
    Ok(())
}

/// Fatal flag set when a `dl` hotswap fails mid-callback (spec §7): the
/// realtime thread cannot safely return a usable block, so it stops writing
/// audio and the host is expected to shut the process down.
#[derive(Clone)]
pub struct FatalFlag(Arc<AtomicBool>);

impl FatalFlag {
    pub fn new() -> Self {
        FatalFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for FatalFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the cpal input/output streams and the ring buffer bridging them.
/// Rebuilt whenever the audio server reports a sample-rate or block-size
/// change (spec §5 "the pipeline is torn down and rebuilt inside the
/// reconfiguration callback").
pub struct AudioEngine {
    sample_rate: u32,
    block_size: u32,
    fatal: FatalFlag,
    _input_stream: Option<cpal::Stream>,
    _output_stream: cpal::Stream,
}

impl AudioEngine {
    /// Opens the default host's default input and output devices, builds a
    /// pipeline from `pipeline_desc` sized to the negotiated sample rate and
    /// block size, and starts streaming. `client_name` is surfaced in logs
    /// only (cpal has no notion of a JACK client name on non-JACK hosts).
    pub fn new(
        client_name: &str,
        pipeline_desc: &str,
        registry: &crate::stage::Registry,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let host = cpal::default_host();
        info!(client = client_name, host = ?host.id(), "starting realtime audio engine");

        let output_device = host
            .default_output_device()
            .ok_or("no audio output device found")?;
        let output_config = output_device.default_output_config()?;
        let sample_rate = output_config.sample_rate().0;
        let channels = output_config.channels().max(2) as usize;

        let block_size: u32 = match output_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => (*min).max(512),
            cpal::SupportedBufferSize::Unknown => 1024,
        };

        info!(sample_rate, block_size, "negotiated audio configuration");

        let pipeline = Pipeline::new(sample_rate as f32, block_size, pipeline_desc, registry)?;

        let ring = HeapRb::<(f32, f32)>::new(block_size as usize * 8);
        let (producer, consumer) = ring.split();

        let fatal = FatalFlag::new();

        let input_stream = match host.default_input_device() {
            Some(device) => match device.default_input_config() {
                Ok(cfg) => {
                    let in_channels = cfg.channels().max(1) as usize;
                    match Self::build_input_stream(&device, &cfg.into(), in_channels, producer) {
                        Ok(s) => Some(s),
                        Err(e) => {
                            warn!(%e, "failed to open input stream, running output-only");
                            None
                        }
                    }
                }
                Err(e) => {
                    warn!(%e, "no usable input config, running output-only");
                    None
                }
            },
            None => {
                warn!("no audio input device found, running output-only");
                None
            }
        };

        let output_stream = Self::build_output_stream(
            &output_device,
            &output_config.into(),
            channels,
            pipeline,
            consumer,
            fatal.clone(),
        )?;

        if let Some(s) = &input_stream {
            s.play()?;
        }
        output_stream.play()?;

        Ok(AudioEngine {
            sample_rate,
            block_size,
            fatal,
            _input_stream: input_stream,
            _output_stream: output_stream,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// True once a `dl` hotswap has failed and the process should shut down
    /// (spec §7 hotswap-failure path).
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_set()
    }

    fn build_input_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        mut producer: HeapProd<(f32, f32)>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let i = frame[0];
                    let q = if channels > 1 { frame[1] } else { 0.0 };
                    let _ = producer.push((i, q));
                }
            },
            |err| error!(%err, "input stream error"),
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build_output_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        mut pipeline: Pipeline,
        mut consumer: HeapCons<(f32, f32)>,
        fatal: FatalFlag,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        let block_size = pipeline.block_size() as usize;
        let mut in_i = vec![0.0f32; block_size];
        let mut in_q = vec![0.0f32; block_size];
        let mut out_i = vec![0.0f32; block_size];
        let mut out_q = vec![0.0f32; block_size];
        let mut scratch = vec![0.0f32; 2 * block_size];

        device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if fatal.is_set() {
                    for s in data.iter_mut() {
                        *s = 0.0;
                    }
                    return;
                }

                let n = (data.len() / channels).min(block_size);
                for k in 0..n {
                    let (i, q) = consumer.pop().unwrap_or((0.0, 0.0));
                    in_i[k] = i;
                    in_q[k] = q;
                }

                if let Err(e) = process(
                    &mut pipeline,
                    &in_i[..n],
                    &in_q[..n],
                    &mut out_i[..n],
                    &mut out_q[..n],
                    &mut scratch,
                    n,
                ) {
                    error!(%e, "realtime-fatal error in dl hotswap, silencing output");
                    fatal.set();
                }

                for (k, frame) in data.chunks_mut(channels).enumerate().take(n) {
                    frame[0] = out_i[k];
                    if channels > 1 {
                        frame[1] = out_q[k];
                    }
                    for ch in frame.iter_mut().skip(2) {
                        *ch = 0.0;
                    }
                }
                for frame in data.chunks_mut(channels).skip(n) {
                    for s in frame.iter_mut() {
                        *s = 0.0;
                    }
                }
            },
            |err| error!(%err, "output stream error"),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Registry;

    #[test]
    fn process_round_trips_identity_amplify() {
        let registry = Registry::with_builtins();
        let mut pipeline = Pipeline::new(8000.0, 4, "amplify,1.0", &registry).unwrap();
        let in_i = [1.0f32, 2.0, 3.0, 4.0];
        let in_q = [0.5f32, -0.5, 0.25, -0.25];
        let mut out_i = [0.0f32; 4];
        let mut out_q = [0.0f32; 4];
        let mut scratch = [0.0f32; 8];
        process(&mut pipeline, &in_i, &in_q, &mut out_i, &mut out_q, &mut scratch, 4).unwrap();
        assert_eq!(in_i, out_i);
        assert_eq!(in_q, out_q);
    }
}
