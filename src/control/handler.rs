//! Command dispatch: every control command ends up here.
//!
//! Replies go back to the requesting client only. State changes other
//! clients need to see are published on the event bus instead.

use crate::bookmarks::BookmarkStore;
use crate::config::Config;
use crate::control::protocol::{Command, Event, StateInfo};
use crate::defaults::AUDIO_RATE;
use crate::engine::{Engine, EngineContext, EngineSettings, Outbound, ScanCommand};
use crate::error::{Result, SdrError};
use crate::recording::RecordKind;
use crate::scanner::RangePlan;
use crate::source::{self, Driver, SourceConfig, TunerGain};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Handler trait for processing control commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return the replies for the requester.
    async fn handle(&self, command: Command) -> Vec<Event>;

    /// Sent to every client right after it connects.
    fn greeting(&self) -> Vec<Event>;

    /// Broadcast feed for one client.
    fn subscribe(&self) -> broadcast::Receiver<Outbound>;
}

/// Where the live engine is connected, for `CONNECTION_CHANGED`.
struct Link {
    engine: Option<Engine>,
    host: String,
    port: u16,
}

/// The engine as seen from the control side.
#[derive(Clone)]
pub struct ControlSurface {
    config: Arc<Config>,
    ctx: EngineContext,
    bookmarks: Arc<dyn BookmarkStore>,
    link: Arc<Mutex<Link>>,
}

impl ControlSurface {
    pub fn new(config: Config, bookmarks: Arc<dyn BookmarkStore>) -> Self {
        let ctx = EngineContext::new(EngineContext::initial_snapshot(&config), &config);
        Self::with_context(config, ctx, bookmarks)
    }

    pub fn with_context(
        config: Config,
        ctx: EngineContext,
        bookmarks: Arc<dyn BookmarkStore>,
    ) -> Self {
        let link = Link {
            engine: None,
            host: config.tuner.host.clone(),
            port: config.tuner.port,
        };
        Self {
            config: Arc::new(config),
            ctx,
            bookmarks,
            link: Arc::new(Mutex::new(link)),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.link().engine.as_ref().is_some_and(Engine::is_running)
    }

    /// Connect to the configured tuner, publishing the outcome.
    ///
    /// A failure is reported on the bus and otherwise ignored; a later
    /// `CONNECT` retries.
    pub fn autoconnect(&self) {
        let command = Command::Connect {
            host: None,
            port: None,
            driver: None,
            sample_rate: None,
        };
        for event in self.execute(command) {
            self.ctx.bus.publish(event);
        }
    }

    /// Run one command to completion.
    pub fn execute(&self, command: Command) -> Vec<Event> {
        let name = command.name();
        log::debug!("Control command: {}", name);
        self.dispatch(command).unwrap_or_else(|e| {
            log::warn!("{} failed: {}", name, e);
            vec![Event::from(&e)]
        })
    }

    pub fn state_info(&self) -> StateInfo {
        self.state_with(self.is_connected())
    }

    fn state_with(&self, connected: bool) -> StateInfo {
        let snapshot = self.ctx.shared.load();
        StateInfo {
            freq: snapshot.tuner.center_freq,
            mode: snapshot.mode,
            sample_rate: snapshot.tuner.sample_rate,
            streaming: snapshot.streaming,
            audio_recording: self.ctx.recorder.is_recording(RecordKind::Audio),
            iq_recording: self.ctx.recorder.is_recording(RecordKind::Iq),
            squelch: snapshot.tuner.squelch_db,
            gain: snapshot.tuner.gain,
            agc: snapshot.agc,
            connected,
            spectrum_bins: self.config.dsp.spectrum_bins,
            audio_rate: AUDIO_RATE,
        }
    }

    /// Stop the engine and every recording. Used on shutdown.
    pub fn shutdown(&self) {
        if let Some(mut engine) = self.link().engine.take() {
            engine.stop();
        }
        self.ctx.recorder.stop_all();
    }

    fn dispatch(&self, command: Command) -> Result<Vec<Event>> {
        let bus = &self.ctx.bus;
        match command {
            Command::Connect {
                host,
                port,
                driver,
                sample_rate,
            } => self.connect(host, port, driver, sample_rate),
            Command::Disconnect => self.disconnect(),
            Command::SetFreq { value } => {
                if value == 0 {
                    return Err(SdrError::config("frequency must be positive"));
                }
                if let Some(engine) = self.link().engine.as_ref().filter(|e| e.is_running()) {
                    // The acquisition thread owns the tuning while it runs.
                    engine.send_scan(ScanCommand::Tune { frequency: value })?;
                    return Ok(Vec::new());
                }
                self.ctx.shared.update(|s| s.tuner.center_freq = value);
                bus.publish(Event::FreqChanged { value });
                Ok(Vec::new())
            }
            Command::SetMode { mode } => {
                self.ctx.shared.update(|s| s.mode = mode);
                bus.publish(Event::ModeChanged { mode });
                Ok(Vec::new())
            }
            Command::SetGain { value } => {
                if let TunerGain::Manual(db) = value
                    && !db.is_finite()
                {
                    return Err(SdrError::config("gain must be a finite number or \"AGC\""));
                }
                self.ctx.shared.update(|s| s.tuner.gain = value);
                bus.publish(Event::State(self.state_info()));
                Ok(Vec::new())
            }
            Command::SetSquelch { value } => {
                if !value.is_finite() {
                    return Err(SdrError::config("squelch must be a finite number"));
                }
                self.ctx.shared.update(|s| s.tuner.squelch_db = value);
                bus.publish(Event::SquelchChanged { value });
                Ok(Vec::new())
            }
            Command::SetAgc { value } => {
                self.ctx.shared.update(|s| s.agc = value);
                bus.publish(Event::State(self.state_info()));
                Ok(Vec::new())
            }
            Command::StartStream => self.set_streaming(true),
            Command::StopStream => self.set_streaming(false),
            Command::StartScan { category } => {
                let document = self.bookmarks.load()?;
                let entries = document.entries(category.as_deref());
                if entries.is_empty() {
                    return Err(SdrError::config(match category {
                        Some(name) => format!("no bookmarks in category '{name}'"),
                        None => "no bookmarks to scan".to_string(),
                    }));
                }
                self.send_scan(ScanCommand::StartMemory(entries))
            }
            Command::StartRangeScan {
                start,
                end,
                step,
                mode,
            } => {
                let plan = RangePlan::new(start, end, step)?;
                let mode = mode.unwrap_or(self.ctx.shared.load().mode);
                self.send_scan(ScanCommand::StartRange { plan, mode })
            }
            Command::StopScan { restore } => {
                let restore = restore.unwrap_or(self.config.scanner.restore_on_stop);
                self.send_scan(ScanCommand::Stop { restore })
            }
            Command::SkipScan => self.send_scan(ScanCommand::Skip),
            Command::SetScanSpeed { value } => {
                self.ctx.shared.update(|s| s.scan_dwell_ms = value);
                self.publish_scan_timing();
                Ok(Vec::new())
            }
            Command::SetScanDelay { value } => {
                if !value.is_finite() || value < 0.0 {
                    return Err(SdrError::config("scan delay must be a non-negative number"));
                }
                let ms = (value * 1000.0).round() as u64;
                self.ctx.shared.update(|s| s.scan_resume_delay_ms = ms);
                self.publish_scan_timing();
                Ok(Vec::new())
            }
            Command::StartAudioRecord => {
                self.ctx.recorder.start_audio()?;
                bus.publish(Event::RecordStatus(self.ctx.recorder.status()));
                Ok(Vec::new())
            }
            Command::StartIqRecord => {
                let tuner = self.ctx.shared.load().tuner;
                self.ctx
                    .recorder
                    .start_iq(tuner.center_freq, tuner.sample_rate)?;
                bus.publish(Event::RecordStatus(self.ctx.recorder.status()));
                Ok(Vec::new())
            }
            Command::StopAudioRecord => self.stop_recording(RecordKind::Audio),
            Command::StopIqRecord => self.stop_recording(RecordKind::Iq),
            Command::GetScanCategories => Ok(vec![Event::ScanCategories {
                categories: self.bookmarks.load()?.categories(),
            }]),
            Command::GetState => Ok(vec![Event::State(self.state_info())]),
            Command::GetBookmarks => Ok(vec![Event::Bookmarks {
                document: self.bookmarks.load()?,
            }]),
            Command::SaveBookmarks { document } => {
                self.bookmarks.save(&document)?;
                log::info!("Saved {} bookmarks", document.station_count());
                bus.publish(Event::ScanCategories {
                    categories: document.categories(),
                });
                Ok(vec![Event::Bookmarks { document }])
            }
        }
    }

    fn connect(
        &self,
        host: Option<String>,
        port: Option<u16>,
        driver: Option<Driver>,
        sample_rate: Option<u32>,
    ) -> Result<Vec<Event>> {
        let defaults = self.config.tuner.source_config();
        let source_config = SourceConfig {
            host: host.unwrap_or(defaults.host.clone()),
            port: port.unwrap_or(defaults.port),
            driver: driver.unwrap_or(defaults.driver),
            sample_rate: sample_rate.unwrap_or(defaults.sample_rate),
            ..defaults
        };

        let mut link = self.link();
        if let Some(mut previous) = link.engine.take() {
            previous.stop();
        }

        let opened = source::connect(&source_config).and_then(|source| {
            let rate = source.sample_rate();
            self.ctx.shared.update(|s| s.tuner.sample_rate = rate);
            let settings = EngineSettings {
                host: source_config.host.clone(),
                port: source_config.port,
                ..EngineSettings::from_config(&self.config)
            };
            Engine::start(source, settings, self.ctx.clone())
        });

        link.host = source_config.host.clone();
        link.port = source_config.port;
        match opened {
            Ok(engine) => {
                link.engine = Some(engine);
                drop(link);
                self.ctx.bus.publish(Event::ConnectionChanged {
                    connected: true,
                    host: source_config.host,
                    port: source_config.port,
                });
                self.ctx.bus.publish(Event::State(self.state_info()));
                Ok(Vec::new())
            }
            Err(e) => {
                drop(link);
                self.ctx.bus.publish(Event::ConnectionChanged {
                    connected: false,
                    host: source_config.host,
                    port: source_config.port,
                });
                Err(e)
            }
        }
    }

    fn disconnect(&self) -> Result<Vec<Event>> {
        let mut link = self.link();
        let Some(mut engine) = link.engine.take() else {
            return Ok(vec![Event::State(self.state_with(false))]);
        };
        engine.stop();
        let (host, port) = (link.host.clone(), link.port);
        drop(link);

        let recording = self.ctx.recorder.is_recording(RecordKind::Audio)
            || self.ctx.recorder.is_recording(RecordKind::Iq);
        self.ctx.recorder.stop_all();
        self.ctx
            .audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let bus = &self.ctx.bus;
        if recording {
            bus.publish(Event::RecordStatus(self.ctx.recorder.status()));
        }
        bus.publish(Event::ConnectionChanged {
            connected: false,
            host,
            port,
        });
        bus.publish(Event::State(self.state_info()));
        Ok(Vec::new())
    }

    fn set_streaming(&self, streaming: bool) -> Result<Vec<Event>> {
        self.ctx.shared.update(|s| s.streaming = streaming);
        if !streaming {
            self.ctx
                .audio
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        self.ctx.bus.publish(Event::StreamState { streaming });
        Ok(Vec::new())
    }

    fn send_scan(&self, command: ScanCommand) -> Result<Vec<Event>> {
        let link = self.link();
        match link.engine.as_ref().filter(|e| e.is_running()) {
            Some(engine) => engine.send_scan(command)?,
            None => return Err(SdrError::connection("not connected to a tuner")),
        }
        Ok(Vec::new())
    }

    fn stop_recording(&self, kind: RecordKind) -> Result<Vec<Event>> {
        let result = self.ctx.recorder.stop(kind);
        self.ctx
            .bus
            .publish(Event::RecordStatus(self.ctx.recorder.status()));
        result.map(|_| Vec::new())
    }

    /// Re-announce the last scan status with the new timings.
    fn publish_scan_timing(&self) {
        let snapshot = self.ctx.shared.load();
        if let Some(mut status) = self.ctx.bus.last_scan_status() {
            status.dwell_ms = snapshot.scan_dwell_ms;
            status.resume_delay_ms = snapshot.scan_resume_delay_ms;
            self.ctx.bus.publish(Event::ScanStatus(status));
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for ControlSurface {
    async fn handle(&self, command: Command) -> Vec<Event> {
        let surface = self.clone();
        // Connecting and stopping join threads and open sockets.
        tokio::task::spawn_blocking(move || surface.execute(command))
            .await
            .unwrap_or_else(|e| {
                vec![Event::from(&SdrError::Other(format!(
                    "command handler panicked: {e}"
                )))]
            })
    }

    fn greeting(&self) -> Vec<Event> {
        let mut events = vec![Event::State(self.state_info())];
        if let Some(status) = self.ctx.bus.last_scan_status() {
            events.push(Event::ScanStatus(status));
        }
        events
    }

    fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.ctx.bus.subscribe()
    }
}
