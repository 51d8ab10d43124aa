//! Fractional-rate resampling to the fixed audio rate.

/// Streaming linear-interpolation resampler.
///
/// Used after the integer decimation stages when the tuner rate does not
/// divide evenly down to the audio rate. The fractional read position and
/// the last input sample persist across calls.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next input block; may be
    /// negative (between `last` and the first new sample).
    pos: f64,
    last: f32,
}

impl LinearResampler {
    pub fn new(input_rate: f64, output_rate: f64) -> Self {
        Self {
            step: input_rate / output_rate.max(1.0),
            pos: 0.0,
            last: 0.0,
        }
    }

    pub fn ratio(&self) -> f64 {
        1.0 / self.step
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 2);
        let len = input.len() as f64;

        while self.pos < len - 1.0 {
            let (a, b, frac) = if self.pos < 0.0 {
                (self.last, input[0], (self.pos + 1.0) as f32)
            } else {
                let i = self.pos.floor() as usize;
                (input[i], input[i + 1], (self.pos - i as f64) as f32)
            };
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        self.pos -= len;
        self.last = input[input.len() - 1];
        out
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last = 0.0;
    }
}
