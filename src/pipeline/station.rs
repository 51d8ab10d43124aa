//! Station abstraction and runner.

use crate::error::{Result, SdrError};
use crate::pipeline::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station running on its own thread.
///
/// Stations are connected by channels. A station without a downstream
/// (a file writer, say) is spawned with no output sender and its outputs are
/// discarded.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Successfully processed and produced output
    /// - `Ok(None)` - Successfully processed but no output
    /// - `Err(StationError)` - Processing failed
    fn process(&mut self, input: Self::Input) -> std::result::Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called once when the input channel closes or after a fatal error.
    ///
    /// Writers flush and close their files here.
    fn shutdown(&mut self) -> std::result::Result<(), StationError> {
        Ok(())
    }
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a station on a thread named after it.
    ///
    /// The thread runs until `input_rx` is disconnected, the downstream
    /// receiver is dropped, or the station reports a fatal error.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Option<Sender<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let station_name = station.name();

        let handle = thread::Builder::new()
            .name(station_name.to_string())
            .spawn(move || {
                Self::run_station(&mut station, input_rx, output_tx, error_reporter);
            })
            .map_err(|e| SdrError::Other(format!("failed to spawn {station_name}: {e}")))?;

        Ok(Self {
            handle: Some(handle),
            station_name,
            _phantom: PhantomData,
        })
    }

    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Option<Sender<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) {
        let station_name = station.name();

        while let Ok(input) = input_rx.recv() {
            match station.process(input) {
                Ok(Some(output)) => {
                    if let Some(tx) = &output_tx
                        && tx.send(output).is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error @ StationError::Recoverable(_)) => {
                    error_reporter.report(station_name, &error);
                }
                Err(error @ StationError::Fatal(_)) => {
                    error_reporter.report(station_name, &error);
                    break;
                }
            }
        }

        if let Err(error) = station.shutdown() {
            error_reporter.report(station_name, &error);
        }
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> std::result::Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Whether the station thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    pub fn name(&self) -> &'static str {
        self.station_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            Ok(Some(input * 2))
        }

        fn name(&self) -> &'static str {
            "doubler"
        }

        fn shutdown(&mut self) -> std::result::Result<(), StationError> {
            self.shutdown_called.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sums its inputs and fails on a poisoned value.
    struct SummingSink {
        total: Arc<Mutex<i32>>,
        poison: i32,
        fail_on_shutdown: bool,
    }

    impl Station for SummingSink {
        type Input = i32;
        type Output = ();

        fn process(&mut self, input: i32) -> std::result::Result<Option<()>, StationError> {
            if input == self.poison {
                return Err(StationError::Fatal(format!("poisoned by {input}")));
            }
            if input < 0 {
                return Err(StationError::Recoverable(format!("negative {input}")));
            }
            *self.total.lock().unwrap() += input;
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "summing-sink"
        }

        fn shutdown(&mut self) -> std::result::Result<(), StationError> {
            if self.fail_on_shutdown {
                Err(StationError::Fatal("close failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MockReporter {
        errors: Mutex<Vec<(String, StationError)>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            self.errors
                .lock()
                .unwrap()
                .push((station.to_string(), error.clone()));
        }
    }

    #[test]
    fn test_station_forwards_and_shuts_down() {
        let shutdown_called = Arc::new(AtomicBool::new(false));
        let (in_tx, in_rx) = bounded(4);
        let (out_tx, out_rx) = bounded(4);
        let runner = StationRunner::spawn(
            DoublerStation {
                shutdown_called: shutdown_called.clone(),
            },
            in_rx,
            Some(out_tx),
            Arc::new(MockReporter::default()),
        )
        .unwrap();
        assert_eq!(runner.name(), "doubler");

        in_tx.send(1).unwrap();
        in_tx.send(21).unwrap();
        assert_eq!(out_rx.recv().unwrap(), 2);
        assert_eq!(out_rx.recv().unwrap(), 42);

        drop(in_tx);
        runner.join().unwrap();
        assert!(shutdown_called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sink_reports_recoverable_and_continues() {
        let total = Arc::new(Mutex::new(0));
        let reporter = Arc::new(MockReporter::default());
        let (tx, rx) = bounded(8);
        let runner = StationRunner::spawn(
            SummingSink {
                total: total.clone(),
                poison: 1000,
                fail_on_shutdown: false,
            },
            rx,
            None,
            reporter.clone(),
        )
        .unwrap();

        for v in [1, -5, 2, 3] {
            tx.send(v).unwrap();
        }
        drop(tx);
        runner.join().unwrap();

        assert_eq!(*total.lock().unwrap(), 6);
        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "summing-sink");
        assert!(!errors[0].1.is_fatal());
    }

    #[test]
    fn test_fatal_error_stops_station() {
        let total = Arc::new(Mutex::new(0));
        let reporter = Arc::new(MockReporter::default());
        let (tx, rx) = bounded(8);
        let runner = StationRunner::spawn(
            SummingSink {
                total: total.clone(),
                poison: 7,
                fail_on_shutdown: true,
            },
            rx,
            None,
            reporter.clone(),
        )
        .unwrap();

        tx.send(1).unwrap();
        tx.send(7).unwrap();
        runner.join().unwrap();
        assert!(tx.send(2).is_err());
        assert_eq!(*total.lock().unwrap(), 1);

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].1, StationError::Fatal("poisoned by 7".to_string()));
        assert_eq!(errors[1].1, StationError::Fatal("close failed".to_string()));
    }
}
