use anyhow::{Context as _, Result};
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Arc,
};

/// log file shared by every writer the subscriber makes
///
/// the file is opened in append mode, created if it does not exist.
#[derive(Clone)]
pub struct LogFile(Arc<File>);

impl LogFile {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open log file: {}", path.display()))?;
        Ok(Self(Arc::new(file)))
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynarmord.log");
        std::fs::write(&path, "previous run\n").unwrap();

        let log = LogFile::open(&path).unwrap();
        let mut writer = log.clone();
        writer.write_all(b"first\n").unwrap();
        let mut writer = log;
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "previous run\nfirst\nsecond\n"
        );
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert!(LogFile::open(dir.path().join("missing").join("dynarmord.log")).is_err());
    }
}
