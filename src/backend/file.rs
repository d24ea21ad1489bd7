//! Raw PCM file backends.

use super::{CaptureSource, RenderSink, audio_duration};
use crate::error::{AudioStreamError, AudioStreamResult};
use crate::info::AudioStreamParams;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::debug;

/// Capture source reading headerless PCM from a file, looping at EOF.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    file: Option<File>,
    params: Option<AudioStreamParams>,
    realtime: bool,
}

impl FileSource {
    /// Create a source for `path`. The file is opened by `open_port`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            name: format!("file:{}", path.as_ref().display()),
            path: path.as_ref().to_path_buf(),
            file: None,
            params: None,
            realtime: true,
        }
    }

    /// Read as fast as the worker asks instead of at the stream's rate
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

impl CaptureSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_port(&mut self, params: &AudioStreamParams, _device: &str) -> AudioStreamResult<()> {
        let file = File::open(&self.path)?;
        if file.metadata()?.len() == 0 {
            return Err(AudioStreamError::backend("file", "source file is empty"));
        }
        self.file = Some(file);
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> AudioStreamResult<()> {
        if self.file.is_none() {
            return Err(AudioStreamError::backend("file", "port not open"));
        }
        Ok(())
    }

    fn stop(&mut self) -> AudioStreamResult<()> {
        Ok(())
    }

    fn read_frame(&mut self, buf: &mut [u8]) -> AudioStreamResult<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AudioStreamError::backend("file", "port not open"))?;

        let mut filled = 0;
        let mut rewound = false;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                if rewound {
                    break;
                }
                debug!(path = %self.path.display(), "end of capture file, rewinding");
                file.seek(SeekFrom::Start(0))?;
                rewound = true;
                continue;
            }
            rewound = false;
            filled += n;
        }

        if self.realtime {
            if let Some(params) = &self.params {
                thread::sleep(audio_duration(params, filled));
            }
        }
        Ok(filled)
    }

    fn latency(&self) -> AudioStreamResult<u64> {
        Ok(0)
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// Render sink appending delivered PCM to a file.
#[derive(Debug)]
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Create a sink for `path`. The file is created by `open_port`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            name: format!("file:{}", path.as_ref().display()),
            path: path.as_ref().to_path_buf(),
            writer: None,
            bytes_written: 0,
        }
    }

    /// Bytes written since the port was opened
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn flush_writer(&mut self) -> AudioStreamResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl RenderSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_port(&mut self, _params: &AudioStreamParams, _device: &str) -> AudioStreamResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        self.bytes_written = 0;
        Ok(())
    }

    fn start(&mut self) -> AudioStreamResult<()> {
        if self.writer.is_none() {
            return Err(AudioStreamError::backend("file", "port not open"));
        }
        Ok(())
    }

    fn stop(&mut self) -> AudioStreamResult<()> {
        self.flush_writer()
    }

    fn write_frame(&mut self, data: &[u8]) -> AudioStreamResult<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| AudioStreamError::backend("file", "port not open"))?;
        writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    fn latency(&self) -> AudioStreamResult<u64> {
        Ok(0)
    }

    fn set_volume(&mut self, _volume: f32) -> AudioStreamResult<()> {
        Ok(())
    }

    fn drain(&mut self) -> AudioStreamResult<()> {
        self.flush_writer()
    }

    fn close(&mut self) {
        if let Err(e) = self.flush_writer() {
            debug!(error = %e, "flush on close failed");
        }
        self.writer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_file_source_rewinds() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3]).unwrap();
        tmp.flush().unwrap();

        let mut source = FileSource::new(tmp.path()).unpaced();
        source
            .open_port(&AudioStreamParams::voice(), "mic")
            .unwrap();
        source.start().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(source.read_frame(&mut buf).unwrap(), 8);
        assert_eq!(buf, [1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_file_source_rejects_empty() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut source = FileSource::new(tmp.path());
        assert!(
            source
                .open_port(&AudioStreamParams::voice(), "mic")
                .is_err()
        );
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcm");

        let mut sink = FileSink::new(&path);
        sink.open_port(&AudioStreamParams::cd_quality(), "speaker")
            .unwrap();
        sink.start().unwrap();
        sink.write_frame(&[9, 8, 7, 6]).unwrap();
        sink.drain().unwrap();
        sink.close();

        assert_eq!(std::fs::read(&path).unwrap(), vec![9, 8, 7, 6]);
    }
}
