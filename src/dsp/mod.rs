//! Signal processing: from raw IQ blocks to audio, level and spectrum.
//!
//! Stages are small stateful structs with `process`/`reset`; [`DspChain`]
//! wires them together for one demodulation mode.

pub mod agc;
pub mod chain;
pub mod demod;
pub mod filter;
pub mod mode;
pub mod resample;
pub mod spectrum;
pub mod squelch;

pub use chain::{BlockParams, DspChain, DspOutput};
pub use mode::DemodMode;
pub use spectrum::{SpectrumAnalyzer, SpectrumFrame};
pub use squelch::{Squelch, power_db, s_units};
