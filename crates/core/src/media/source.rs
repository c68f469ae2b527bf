//! Sequential frame readers for MJPEG container files.
//!
//! Two on-disk framings are understood:
//!
//! - **normal**: every frame is preceded by its length as five ASCII
//!   digits (`"04817"` followed by 4817 JPEG bytes).
//! - **hd**: raw concatenated JPEG images; a frame runs from a start of
//!   image marker `FF D8` to the next end of image marker `FF D9`.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StreamError};

const LENGTH_PREFIX: usize = 5;
const SCAN_BLOCK: usize = 1024;
const START_OF_IMAGE: [u8; 2] = [0xFF, 0xD8];
const END_OF_IMAGE: [u8; 2] = [0xFF, 0xD9];

/// Quality mode negotiated by DESCRIBE. Selects the container framing on the
/// server and the buffer/pacing profile on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityMode {
    #[default]
    Normal,
    Hd,
}

impl QualityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Hd => "hd",
        }
    }
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "hd" => Ok(Self::Hd),
            other => Err(StreamError::InvalidQuality(other.to_string())),
        }
    }
}

/// Producer of whole video frames.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the container is exhausted.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Index of the frame most recently returned (first frame is 1).
    fn frame_index(&self) -> u32;
}

/// Frame reader over any byte stream.
pub struct VideoFile<R> {
    reader: R,
    mode: QualityMode,
    index: u32,
    /// Bytes read ahead while scanning for hd markers.
    pending: Vec<u8>,
}

impl VideoFile<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, mode: QualityMode) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), %mode, "video file opened");
        Ok(Self::new(BufReader::new(file), mode))
    }
}

impl<R: Read> VideoFile<R> {
    pub fn new(reader: R, mode: QualityMode) -> Self {
        Self {
            reader,
            mode,
            index: 0,
            pending: Vec::new(),
        }
    }

    pub fn mode(&self) -> QualityMode {
        self.mode
    }

    fn next_length_prefixed(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = Vec::with_capacity(LENGTH_PREFIX);
        (&mut self.reader)
            .take(LENGTH_PREFIX as u64)
            .read_to_end(&mut prefix)?;

        if prefix.is_empty() {
            return Ok(None);
        }
        if prefix.len() < LENGTH_PREFIX {
            tracing::warn!(bytes = prefix.len(), "truncated length prefix at end of file");
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&prefix);
        let length: usize = text
            .trim()
            .parse()
            .map_err(|_| StreamError::InvalidFrameHeader(text.to_string()))?;

        let mut frame = Vec::with_capacity(length);
        (&mut self.reader).take(length as u64).read_to_end(&mut frame)?;
        if frame.len() < length {
            tracing::warn!(expected = length, got = frame.len(), "truncated frame at end of file");
            return Ok(None);
        }

        Ok(Some(frame))
    }

    /// Pull another block into `pending`. Returns the number of bytes read.
    fn fill(&mut self) -> Result<usize> {
        let mut block = [0u8; SCAN_BLOCK];
        let n = self.reader.read(&mut block)?;
        self.pending.extend_from_slice(&block[..n]);
        Ok(n)
    }

    fn next_marker_delimited(&mut self) -> Result<Option<Vec<u8>>> {
        // Discard everything before the start marker.
        loop {
            if let Some(pos) = find(&self.pending, &START_OF_IMAGE) {
                self.pending.drain(..pos);
                break;
            }
            // A trailing 0xFF may be the first half of a marker.
            let keep = usize::from(self.pending.last() == Some(&0xFF));
            let discard = self.pending.len() - keep;
            self.pending.drain(..discard);
            if self.fill()? == 0 {
                return Ok(None);
            }
        }

        let mut searched = START_OF_IMAGE.len();
        loop {
            if let Some(pos) = find(&self.pending[searched..], &END_OF_IMAGE) {
                let end = searched + pos + END_OF_IMAGE.len();
                return Ok(Some(self.pending.drain(..end).collect()));
            }
            searched = self.pending.len().saturating_sub(1).max(START_OF_IMAGE.len());
            if self.fill()? == 0 {
                tracing::warn!(bytes = self.pending.len(), "frame without end marker at end of file");
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
        }
    }
}

impl<R: Read + Send> FrameSource for VideoFile<R> {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let frame = match self.mode {
            QualityMode::Normal => self.next_length_prefixed()?,
            QualityMode::Hd => self.next_marker_delimited()?,
        };
        if frame.is_some() {
            self.index += 1;
        }
        Ok(frame)
    }

    fn frame_index(&self) -> u32 {
        self.index
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
