//! The real-time path: read a block, run the DSP chain, fan the results out.
//!
//! Everything downstream of the sample source is non-blocking: the audio
//! buffer drops oldest, recording queues drop oldest, and the event bus
//! lets lagging clients fall behind on their own.

use crate::clock::{Clock, SystemClock};
use crate::control::frame::Frame;
use crate::control::protocol::Event;
use crate::dsp::{DspChain, s_units};
use crate::engine::{EngineContext, EngineSettings, EngineSnapshot};
use crate::error::Result;
use crate::scanner::{RangePlan, ScanAction, ScanEntry, ScanOrigin, ScannerEngine};
use crate::dsp::DemodMode;
use crate::source::SampleSource;
use crossbeam_channel::Receiver;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

/// Scanner and tuning requests, applied at the next block boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanCommand {
    StartRange { plan: RangePlan, mode: DemodMode },
    StartMemory(Vec<ScanEntry>),
    Stop { restore: bool },
    Skip,
    /// Operator retune. Ends any scan in place, then tunes.
    Tune { frequency: u64 },
}

/// What one iteration did, for pacing and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockOutcome {
    /// Air time covered by the block.
    pub duration: Duration,
    pub level_db: f32,
    pub signal_present: bool,
}

pub struct AcquisitionLoop<C: Clock = SystemClock> {
    source: Box<dyn SampleSource>,
    chain: DspChain,
    scanner: ScannerEngine<C>,
    ctx: EngineContext,
    commands: Receiver<ScanCommand>,
    applied: Option<u64>,
    level_interval: u64,
    blocks: u64,
}

impl AcquisitionLoop<SystemClock> {
    pub fn new(
        source: Box<dyn SampleSource>,
        settings: &EngineSettings,
        ctx: EngineContext,
        commands: Receiver<ScanCommand>,
    ) -> Self {
        Self::with_clock(source, settings, ctx, commands, SystemClock)
    }
}

impl<C: Clock> AcquisitionLoop<C> {
    pub fn with_clock(
        source: Box<dyn SampleSource>,
        settings: &EngineSettings,
        ctx: EngineContext,
        commands: Receiver<ScanCommand>,
        clock: C,
    ) -> Self {
        let snapshot = ctx.shared.load();
        let chain = DspChain::new(
            source.sample_rate(),
            snapshot.mode,
            settings.fft_size,
            settings.spectrum_bins,
        );
        Self {
            source,
            chain,
            scanner: ScannerEngine::with_clock(clock),
            ctx,
            commands,
            applied: None,
            level_interval: settings.level_interval_blocks.max(1) as u64,
            blocks: 0,
        }
    }

    pub fn scanner(&self) -> &ScannerEngine<C> {
        &self.scanner
    }

    /// Process exactly one block.
    ///
    /// # Errors
    /// Only fatal sample-source failures are returned; everything else is
    /// reported on the event bus and the loop carries on.
    pub fn run_once(&mut self) -> Result<BlockOutcome> {
        self.drain_commands();
        let snapshot = self.apply_snapshot()?;

        let block = self.source.next_block()?;
        self.ctx.recorder.push_iq(&block.samples);

        let out = self.chain.process(&block, &snapshot.block_params());

        self.ctx
            .bus
            .publish_frame(Frame::Spectrum(Arc::from(out.spectrum.bins.as_slice())));
        if snapshot.streaming {
            self.ctx
                .audio
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write(&out.audio);
        }
        self.ctx.recorder.push_audio(&out.audio);

        self.blocks += 1;
        if self.blocks % self.level_interval == 0 {
            self.ctx.bus.publish(Event::SignalLevel {
                db: out.level_db,
                s_units: s_units(out.level_db).to_string(),
                min_db: out.spectrum.min_db,
                max_db: out.spectrum.max_db,
            });
        }

        // Blocks captured before the last retune say nothing about this entry.
        if block.center_freq == snapshot.tuner.center_freq {
            let actions = self.scanner.observe(out.signal_present);
            self.apply_actions(actions);
        }

        for (kind, error) in self.ctx.recorder.reap() {
            log::error!("{} recording stopped: {}", kind, error);
            self.ctx.bus.publish(Event::from(&error));
            self.ctx
                .bus
                .publish(Event::RecordStatus(self.ctx.recorder.status()));
        }

        Ok(BlockOutcome {
            duration: block.duration(),
            level_db: out.level_db,
            signal_present: out.signal_present,
        })
    }

    /// End any scan and report it, before the loop is dropped.
    pub fn finish(&mut self) {
        let actions = self.scanner.stop(false);
        for action in actions {
            if let ScanAction::Status(status) = action {
                self.ctx.bus.publish(Event::ScanStatus(status));
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            let snapshot = self.ctx.shared.load();
            let origin = Some(ScanOrigin {
                frequency: snapshot.tuner.center_freq,
                mode: snapshot.mode,
            });
            let actions = match command {
                ScanCommand::StartRange { plan, mode } => {
                    self.scanner.start_range(plan, mode, origin)
                }
                ScanCommand::StartMemory(entries) => {
                    match self.scanner.start_memory(entries, origin) {
                        Ok(actions) => actions,
                        Err(e) => {
                            self.ctx.bus.publish(Event::from(&e));
                            continue;
                        }
                    }
                }
                ScanCommand::Stop { restore } => {
                    let actions = self.scanner.stop(restore);
                    if actions.is_empty() {
                        vec![ScanAction::Status(self.scanner.status())]
                    } else {
                        actions
                    }
                }
                ScanCommand::Skip => self.scanner.skip(),
                ScanCommand::Tune { frequency } => {
                    let actions = self.scanner.stop(false);
                    self.apply_actions(actions);
                    self.ctx.shared.update(|s| s.tuner.center_freq = frequency);
                    self.ctx.bus.publish(Event::FreqChanged { value: frequency });
                    continue;
                }
            };
            self.apply_actions(actions);
        }
    }

    /// Hand a changed snapshot to the source, chain and scanner.
    fn apply_snapshot(&mut self) -> Result<Arc<EngineSnapshot>> {
        let snapshot = self.ctx.shared.load();
        if self.applied == Some(snapshot.generation) {
            return Ok(snapshot);
        }

        if let Err(e) = self.source.apply(&snapshot.tuner) {
            if e.is_fatal() {
                return Err(e);
            }
            log::warn!("Tuning rejected: {}", e);
            self.ctx.bus.publish(Event::from(&e));
        }
        self.chain.set_mode(snapshot.mode);
        if self.scanner.dwell().as_millis() as u64 != snapshot.scan_dwell_ms {
            self.scanner.set_dwell_ms(snapshot.scan_dwell_ms);
        }
        if self.scanner.resume_delay().as_millis() as u64 != snapshot.scan_resume_delay_ms {
            self.scanner.set_resume_delay_ms(snapshot.scan_resume_delay_ms);
        }
        self.applied = Some(snapshot.generation);
        Ok(snapshot)
    }

    fn apply_actions(&mut self, actions: Vec<ScanAction>) {
        for action in actions {
            match action {
                ScanAction::Tune(entry) => {
                    let mut previous = None;
                    self.ctx.shared.update(|s| {
                        previous = Some((s.tuner.center_freq, s.mode));
                        s.tuner.center_freq = entry.frequency;
                        s.mode = entry.mode;
                    });
                    let Some((freq, mode)) = previous else {
                        continue;
                    };
                    if freq != entry.frequency {
                        self.ctx.bus.publish(Event::FreqChanged {
                            value: entry.frequency,
                        });
                    }
                    if mode != entry.mode {
                        self.ctx.bus.publish(Event::ModeChanged { mode: entry.mode });
                    }
                }
                ScanAction::Status(status) => self.ctx.bus.publish(Event::ScanStatus(status)),
            }
        }
    }
}
