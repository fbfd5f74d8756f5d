use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Uploaded audio materialized as a uniquely named file for the duration of
/// one inference call. The backing file is removed when the value is dropped,
/// on the success path, the error path and request abandonment alike.
#[derive(Debug)]
pub struct ScratchAudio {
    file: NamedTempFile,
}

impl ScratchAudio {
    pub fn write(bytes: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("whisper-relay-")
            .suffix(".wav")
            .tempfile()
            .context("failed to create scratch audio file")?;
        file.write_all(bytes)
            .context("failed to write scratch audio file")?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::ScratchAudio;

    #[test]
    fn file_removed_after_drop() {
        let scratch = ScratchAudio::write(b"RIFF").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn file_removed_when_work_fails() {
        fn failing_work() -> anyhow::Result<PathBuf> {
            let scratch = ScratchAudio::write(b"data")?;
            let path = scratch.path().to_path_buf();
            anyhow::bail!("decode error on {}", path.display());
        }

        let err = failing_work().unwrap_err();
        let path = PathBuf::from(
            err.to_string()
                .rsplit_once("decode error on ")
                .unwrap()
                .1
                .to_string(),
        );
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_scratch_files_do_not_collide() {
        let a = ScratchAudio::write(b"a").unwrap();
        let b = ScratchAudio::write(b"b").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
