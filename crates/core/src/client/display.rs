use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::Frame;

/// Status message weight, for colouring or filtering in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// The surface frames and status are presented on.
///
/// Called from the scheduler, receiver and control-listener threads, so
/// implementations must be internally synchronized.
pub trait Display: Send + Sync {
    fn render(&self, frame: &Frame);

    fn set_status(&self, text: &str, severity: Severity);

    fn set_buffer_level(&self, current: usize, capacity: usize);

    /// Playback time, updated after every rendered frame.
    fn set_elapsed(&self, _elapsed: Duration) {}

    /// Ask the user whether to quit. Called from the thread that invoked
    /// [`Client::request_quit`](crate::client::Client::request_quit).
    fn confirm_quit(&self) -> bool;
}

#[derive(Default)]
struct ArtifactState {
    current: Option<Frame>,
    path: Option<PathBuf>,
}

/// The frame currently on screen, plus its optional on-disk copy.
///
/// Writing the frame and handing it to the display happen under one lock,
/// so a reader never sees a half-written cache file.
#[derive(Default)]
pub struct FrameArtifact {
    state: Mutex<ArtifactState>,
}

impl FrameArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where rendered frames are mirrored, normally
    /// `<cache_dir>/cache-<sessionId>.jpg`.
    pub fn set_cache_path(&self, path: Option<PathBuf>) {
        self.state.lock().path = path;
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    /// Store `frame`, mirror it to disk, and render it.
    ///
    /// A failed cache write is returned after the frame has still been
    /// rendered.
    pub fn present(&self, frame: Frame, display: &dyn Display) -> Result<()> {
        let mut state = self.state.lock();
        let written = match &state.path {
            Some(path) => fs::write(path, &frame.data),
            None => Ok(()),
        };
        display.render(&frame);
        state.current = Some(frame);
        Ok(written?)
    }

    /// Run `f` with the frame currently on screen.
    pub fn with_current<T>(&self, f: impl FnOnce(Option<&Frame>) -> T) -> T {
        f(self.state.lock().current.as_ref())
    }

    /// Forget the current frame and delete the cache file.
    pub fn remove(&self) {
        let mut state = self.state.lock();
        state.current = None;
        if let Some(path) = state.path.take() {
            remove_quietly(&path);
        }
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "cache file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        rendered: Mutex<Vec<u16>>,
    }

    impl Display for Recorder {
        fn render(&self, frame: &Frame) {
            self.rendered.lock().push(frame.number);
        }
        fn set_status(&self, _text: &str, _severity: Severity) {}
        fn set_buffer_level(&self, _current: usize, _capacity: usize) {}
        fn confirm_quit(&self) -> bool {
            true
        }
    }

    #[test]
    fn present_writes_cache_and_renders() {
        let path = std::env::temp_dir().join(format!("cache-artifact-{}.jpg", std::process::id()));
        let display = Recorder::default();
        let artifact = FrameArtifact::new();
        artifact.set_cache_path(Some(path.clone()));

        let frame = Frame {
            number: 4,
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
        };
        artifact.present(frame, &display).unwrap();

        assert_eq!(*display.rendered.lock(), vec![4]);
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(artifact.with_current(|f| f.map(|f| f.number)), Some(4));

        artifact.remove();
        assert!(!path.exists());
        assert!(artifact.with_current(|f| f.is_none()));
        assert_eq!(artifact.cache_path(), None);
    }

    #[test]
    fn cache_failure_still_renders() {
        let display = Recorder::default();
        let artifact = FrameArtifact::new();
        artifact.set_cache_path(Some(PathBuf::from("/nonexistent-dir/cache-1.jpg")));
        let frame = Frame {
            number: 1,
            data: vec![1],
        };
        assert!(artifact.present(frame, &display).is_err());
        assert_eq!(*display.rendered.lock(), vec![1]);
    }
}
