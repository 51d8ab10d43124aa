//! Audio automatic gain control.

/// Fast-attack, slow-release envelope follower driving a bounded gain.
///
/// Gain moves toward `target / envelope`, never above `max_gain`, and the
/// output is clipped to [-1, 1].
#[derive(Debug, Clone)]
pub struct Agc {
    gain: f32,
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    target: f32,
    max_gain: f32,
}

impl Agc {
    pub fn new(
        sample_rate: f32,
        attack_ms: f32,
        release_ms: f32,
        target: f32,
        max_gain_db: f32,
    ) -> Self {
        let sr = sample_rate.max(1.0);
        Self {
            gain: 1.0,
            envelope: 0.0,
            attack_coeff: 1.0 - (-1.0 / (attack_ms * 1e-3 * sr)).exp(),
            release_coeff: 1.0 - (-1.0 / (release_ms * 1e-3 * sr)).exp(),
            target: target.max(0.01),
            max_gain: 10.0_f32.powf(max_gain_db / 20.0),
        }
    }

    /// Defaults for 48 kHz audio: 5 ms attack, 500 ms release, 0.5 target, 40 dB ceiling.
    pub fn audio(sample_rate: f32) -> Self {
        Self::new(sample_rate, 5.0, 500.0, 0.5, 40.0)
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn update_gain(&mut self, level: f32) -> f32 {
        let env_coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope += env_coeff * (level - self.envelope);

        if self.envelope > 1e-6 {
            let desired = (self.target / self.envelope).min(self.max_gain);
            let gain_coeff = if desired < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain += gain_coeff * (desired - self.gain);
        }
        self.gain
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for x in samples.iter_mut() {
            let gain = self.update_gain(x.abs());
            *x = (*x * gain).clamp(-1.0, 1.0);
        }
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(amplitude: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| if (i / 24) % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn quiet_input_is_boosted() {
        let mut agc = Agc::audio(48_000.0);
        let mut samples = square(0.05, 96_000);
        agc.process(&mut samples);
        let tail_peak = samples[90_000..].iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!(tail_peak > 0.3, "peak {tail_peak}");
    }

    #[test]
    fn gain_is_bounded() {
        let mut agc = Agc::new(48_000.0, 5.0, 50.0, 0.5, 20.0);
        let mut samples = square(1e-4, 96_000);
        agc.process(&mut samples);
        assert!(agc.gain() <= 10.0 + 1e-3);
    }

    #[test]
    fn output_never_clips_past_unity() {
        let mut agc = Agc::audio(48_000.0);
        let mut samples = square(0.01, 48_000);
        samples.extend(square(1.0, 4_800));
        agc.process(&mut samples);
        assert!(samples.iter().all(|x| x.abs() <= 1.0));
    }
}
