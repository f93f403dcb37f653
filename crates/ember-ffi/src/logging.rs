//! Dynamic logging control backing `set_log_level`/`set_log_output`.
//!
//! `tracing`'s global subscriber can only be installed once per process, so
//! [`init`] installs one whose filter lives behind a
//! [`tracing_subscriber::reload`] handle and whose writer is an
//! [`RwLock`]-guarded [`BoxMakeWriter`]; the `extern "C"` setters swap
//! those in place rather than reinstalling a subscriber.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, Registry};

use crate::error::{EmberError, EmberErrorCode};

/// A [`MakeWriter`] whose destination can be swapped after the subscriber
/// has been installed, since `tracing::subscriber::set_global_default` may
/// only be called once per process.
#[derive(Clone)]
struct SwappableWriter(Arc<RwLock<BoxMakeWriter>>);

impl<'a> MakeWriter<'a> for SwappableWriter {
    type Writer = SwappableWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        SwappableWriterHandle(Arc::clone(&self.0))
    }
}

/// The [`Write`] handle produced by [`SwappableWriter::make_writer`]; looks
/// up the current writer on each I/O call instead of holding the read lock
/// across the writer's lifetime, since the latter cannot outlive the
/// borrow that produced it.
struct SwappableWriterHandle(Arc<RwLock<BoxMakeWriter>>);

impl Write for SwappableWriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.read().expect("writer lock poisoned").make_writer().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.read().expect("writer lock poisoned").make_writer().flush()
    }
}

struct Handles {
    level: reload::Handle<LevelFilter, Registry>,
    writer: Arc<RwLock<BoxMakeWriter>>,
}

static HANDLES: OnceLock<Handles> = OnceLock::new();

/// Install the global subscriber, if one has not already been installed by
/// an earlier call in this process. Idempotent.
pub(crate) fn init() {
    if HANDLES.get().is_some() {
        return;
    }
    let (level_layer, level_handle) = reload::Layer::new(LevelFilter::INFO);
    let writer = Arc::new(RwLock::new(BoxMakeWriter::new(io::stderr)));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(SwappableWriter(Arc::clone(&writer)));
    let subscriber = Registry::default().with(level_layer).with(fmt_layer);
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = HANDLES.set(Handles {
            level: level_handle,
            writer,
        });
    }
}

/// `set_log_level`: `0` = trace .. `4` = error, matching spec §6.
pub(crate) fn set_level(level: i32) -> Result<(), EmberError> {
    let filter = match level {
        0 => LevelFilter::TRACE,
        1 => LevelFilter::DEBUG,
        2 => LevelFilter::INFO,
        3 => LevelFilter::WARN,
        4 => LevelFilter::ERROR,
        other => {
            return Err(EmberError::invalid_argument(format!(
                "log level out of range 0..4: {other}"
            )))
        }
    };
    let Some(handles) = HANDLES.get() else {
        return Err(EmberError::new(EmberErrorCode::InternalError, "logging not initialized"));
    };
    handles
        .level
        .reload(filter)
        .map_err(|e| EmberError::internal(e.to_string()))
}

/// `set_log_output`: `0` = stderr, `1` = stdout, `2` = file at `dir`, `3` =
/// discard.
pub(crate) fn set_output(mode: i32, dir: Option<&str>) -> Result<(), EmberError> {
    let Some(handles) = HANDLES.get() else {
        return Err(EmberError::new(EmberErrorCode::InternalError, "logging not initialized"));
    };
    let make_writer = match mode {
        0 => BoxMakeWriter::new(io::stderr),
        1 => BoxMakeWriter::new(io::stdout),
        2 => {
            let path = dir.ok_or_else(|| EmberError::invalid_argument("file log output requires a path"))?;
            BoxMakeWriter::new(SharedFile::open(Path::new(path))?)
        }
        3 => BoxMakeWriter::new(io::sink),
        other => {
            return Err(EmberError::invalid_argument(format!(
                "log output mode out of range 0..3: {other}"
            )))
        }
    };
    *handles.writer.write().expect("writer lock poisoned") = make_writer;
    Ok(())
}

/// A cloneable, lock-protected file writer so repeated log events share one
/// open file handle instead of reopening the path each time.
#[derive(Clone)]
struct SharedFile(Arc<std::sync::Mutex<File>>);

impl SharedFile {
    fn open(path: &Path) -> Result<Self, EmberError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EmberError::invalid_argument(format!("cannot open log file {}: {e}", path.display())))?;
        Ok(Self(Arc::new(std::sync::Mutex::new(file))))
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log file mutex poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().expect("log file mutex poisoned").flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_level() {
        init();
        assert_eq!(set_level(9).unwrap_err().code(), EmberErrorCode::InvalidArgument);
    }

    #[test]
    fn rejects_out_of_range_output_mode() {
        init();
        assert_eq!(set_output(9, None).unwrap_err().code(), EmberErrorCode::InvalidArgument);
    }

    #[test]
    fn file_output_requires_path() {
        init();
        assert_eq!(set_output(2, None).unwrap_err().code(), EmberErrorCode::InvalidArgument);
    }

    #[test]
    fn valid_level_and_output_succeed() {
        init();
        assert!(set_level(3).is_ok());
        assert!(set_output(3, None).is_ok());
        set_level(2).unwrap();
        set_output(0, None).unwrap();
    }
}
