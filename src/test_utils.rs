use slog::Drain;
use std::sync::{Arc, Mutex};

/// Logger whose output is captured by the test harness.
pub(crate) fn logger() -> slog::Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

/// Keeps the formatted message of every record, for tests that check what got logged.
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Drain for Recorder {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &slog::Record, _: &slog::OwnedKVList) -> Result<(), slog::Never> {
        self.0.lock().unwrap().push(record.msg().to_string());
        Ok(())
    }
}

/// Logger that records messages, along with the shared list they are recorded into.
pub(crate) fn recording_logger() -> (slog::Logger, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let logger = slog::Logger::root(Recorder(messages.clone()), slog::o!());
    (logger, messages)
}
