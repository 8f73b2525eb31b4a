//! Sample-rate conversion between device rates and the 24 kHz session rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

/// Frames fed to the resampler per call.
const RESAMPLER_CHUNK: usize = 512;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: u32,
    out_sampling_rate: u32,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate as f64 / in_sampling_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )?;
    Ok(resampler)
}

/// Resamples a continuous mono stream delivered in arbitrary slices.
///
/// Input is buffered until a full resampler chunk is available, so no samples
/// are lost at slice boundaries. Equal rates pass through untouched.
pub struct StreamResampler {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_sampling_rate: u32, out_sampling_rate: u32) -> anyhow::Result<Self> {
        let resampler = if in_sampling_rate == out_sampling_rate {
            None
        } else {
            Some(create_resampler(
                in_sampling_rate,
                out_sampling_rate,
                RESAMPLER_CHUNK,
            )?)
        };
        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(res) => out.extend_from_slice(&res[0]),
                Err(e) => warn!("Dropping audio the resampler rejected: {}", e),
            }
        }
        out
    }
}

/// Resamples one complete mono buffer, flushing the resampler's tail so the
/// output covers the whole input.
pub fn resample_buffer(
    samples: &[f32],
    in_sampling_rate: u32,
    out_sampling_rate: u32,
) -> anyhow::Result<Vec<f32>> {
    if in_sampling_rate == out_sampling_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(in_sampling_rate, out_sampling_rate, RESAMPLER_CHUNK)?;
    let ratio = out_sampling_rate as f64 / in_sampling_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut out = Vec::with_capacity(expected + resampler.output_delay());
    for chunk in samples.chunks(RESAMPLER_CHUNK) {
        let res = if chunk.len() == RESAMPLER_CHUNK {
            resampler.process(&[chunk], None)?
        } else {
            resampler.process_partial(Some(&[chunk]), None)?
        };
        out.extend_from_slice(&res[0]);
    }
    while out.len() < expected + resampler.output_delay() {
        let res = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if res[0].is_empty() {
            break;
        }
        out.extend_from_slice(&res[0]);
    }

    let delay = resampler.output_delay();
    Ok(out.into_iter().skip(delay).take(expected).collect())
}
