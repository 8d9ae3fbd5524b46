use crate::command::CmdLine;
use crate::resp::RespParser;
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Destination for committed writes, already in canonical form.
///
/// `append` receives every command of one committed transaction at once and
/// must either persist all of them or report an error.
pub trait DurabilitySink: Send {
    fn append(&mut self, entries: &[CmdLine]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Replace the whole log with `entries`.
    fn rewrite(&mut self, entries: Vec<CmdLine>) -> io::Result<()>;

    fn set_fsync_policy(&mut self, _policy: FsyncPolicy) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    Always,
    Everysec,
    No,
}

impl FsyncPolicy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Some(FsyncPolicy::Always),
            "everysec" => Some(FsyncPolicy::Everysec),
            "no" => Some(FsyncPolicy::No),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FsyncPolicy::Always => "always",
            FsyncPolicy::Everysec => "everysec",
            FsyncPolicy::No => "no",
        }
    }
}

/// Append-only file of RESP-encoded commands.
///
/// An inactive writer (appendonly off) accepts and drops everything.
pub struct AofWriter {
    file: Option<File>,
    path: PathBuf,
    fsync_policy: FsyncPolicy,
}

impl Default for AofWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl AofWriter {
    pub fn new() -> Self {
        AofWriter {
            file: None,
            path: PathBuf::new(),
            fsync_policy: FsyncPolicy::Everysec,
        }
    }

    /// Open or create the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AofWriter {
            file: Some(file),
            path,
            fsync_policy: policy,
        })
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    pub fn fsync_policy(&self) -> FsyncPolicy {
        self.fsync_policy
    }

    pub fn close(&mut self) {
        if let Some(f) = self.file.take()
            && let Err(e) = f.sync_all()
        {
            warn!(error = %e, "failed to sync append only file on close");
        }
    }
}

impl DurabilitySink for AofWriter {
    fn append(&mut self, entries: &[CmdLine]) -> io::Result<()> {
        let Some(file) = &mut self.file else {
            return Ok(());
        };
        let mut buf = Vec::new();
        for entry in entries {
            entry.write_resp(&mut buf);
        }
        file.write_all(&buf)?;
        if self.fsync_policy == FsyncPolicy::Always {
            file.sync_data()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(f) = &mut self.file {
            f.flush()?;
            f.sync_data()?;
        }
        Ok(())
    }

    /// Writes `<path>.tmp`, then renames it over the live log.
    fn rewrite(&mut self, entries: Vec<CmdLine>) -> io::Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut buf = Vec::new();
        for entry in &entries {
            entry.write_resp(&mut buf);
        }
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = Some(OpenOptions::new().append(true).open(&self.path)?);
        info!(entries = entries.len(), path = %self.path.display(), "append only file rewritten");
        Ok(())
    }

    fn set_fsync_policy(&mut self, policy: FsyncPolicy) {
        if policy != self.fsync_policy {
            info!(from = self.fsync_policy.as_str(), to = policy.as_str(), "append only file fsync policy changed");
            self.fsync_policy = policy;
        }
    }
}

impl Drop for AofWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// In-memory sink. Clones share the same log, so a test can keep a handle
/// while the engine owns the boxed sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<CmdLine>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CmdLine> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make subsequent appends fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DurabilitySink for MemorySink {
    fn append(&mut self, entries: &[CmdLine]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("sink unavailable"));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(entries);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn rewrite(&mut self, entries: Vec<CmdLine>) -> io::Result<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries;
        Ok(())
    }
}

/// Read every complete entry from the log at `path`.
///
/// A missing file is an empty log. A torn or corrupt tail (crash mid-append)
/// is dropped with a warning; everything before it is returned.
pub fn load(path: impl AsRef<Path>) -> io::Result<Vec<CmdLine>> {
    let path = path.as_ref();
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut buf = BytesMut::from(&data[..]);
    let mut entries = Vec::new();
    loop {
        match RespParser::parse_command(&mut buf) {
            Ok(Some(parts)) if parts.is_empty() => continue,
            Ok(Some(parts)) => entries.push(CmdLine::from_parts(parts)),
            Ok(None) => {
                if !buf.is_empty() {
                    warn!(path = %path.display(), bytes = buf.len(), "ignoring truncated tail of append only file");
                }
                break;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, bytes = buf.len(), "ignoring corrupt tail of append only file");
                break;
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kvtx-{}-{name}.aof", std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_append_and_load() {
        let path = temp_path("append");
        let mut writer = AofWriter::open(&path, FsyncPolicy::Always).unwrap();
        writer
            .append(&[
                CmdLine::new("HSET").arg("h").arg("f").arg("v"),
                CmdLine::new("DEL").arg("x"),
            ])
            .unwrap();
        writer.flush().unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], CmdLine::new("HSET").arg("h").arg("f").arg("v"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let path = temp_path("missing");
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_tail_ignored() {
        let path = temp_path("torn");
        let mut data = Vec::new();
        CmdLine::new("SET").arg("a").arg("1").write_resp(&mut data);
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nb");
        std::fs::write(&path, &data).unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(entries, vec![CmdLine::new("SET").arg("a").arg("1")]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let path = temp_path("rewrite");
        let mut writer = AofWriter::open(&path, FsyncPolicy::No).unwrap();
        for i in 0..5 {
            writer
                .append(&[CmdLine::new("SET").arg("k").arg(i.to_string())])
                .unwrap();
        }
        writer
            .rewrite(vec![CmdLine::new("SET").arg("k").arg("4")])
            .unwrap();
        writer.append(&[CmdLine::new("SET").arg("j").arg("1")]).unwrap();
        writer.flush().unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                CmdLine::new("SET").arg("k").arg("4"),
                CmdLine::new("SET").arg("j").arg("1"),
            ]
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_fsync_policy_change_applies_to_open_writer() {
        let path = temp_path("policy");
        let mut boxed: Box<dyn DurabilitySink> =
            Box::new(AofWriter::open(&path, FsyncPolicy::No).unwrap());
        boxed.set_fsync_policy(FsyncPolicy::Always);
        boxed.append(&[CmdLine::new("SET").arg("a").arg("1")]).unwrap();
        drop(boxed);

        let mut writer = AofWriter::open(&path, FsyncPolicy::No).unwrap();
        writer.set_fsync_policy(FsyncPolicy::Always);
        assert_eq!(writer.fsync_policy(), FsyncPolicy::Always);
        assert_eq!(load(&path).unwrap(), vec![CmdLine::new("SET").arg("a").arg("1")]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_inactive_writer_drops_entries() {
        let mut writer = AofWriter::new();
        assert!(!writer.is_active());
        writer.append(&[CmdLine::new("SET").arg("a").arg("1")]).unwrap();
        writer.rewrite(Vec::new()).unwrap();
    }

    #[test]
    fn test_memory_sink_failure_toggle() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn DurabilitySink> = Box::new(sink.clone());
        boxed.append(&[CmdLine::new("DEL").arg("a")]).unwrap();
        sink.set_failing(true);
        assert!(boxed.append(&[CmdLine::new("DEL").arg("b")]).is_err());
        assert_eq!(sink.entries(), vec![CmdLine::new("DEL").arg("a")]);
    }

    #[test]
    fn test_fsync_policy_names() {
        assert_eq!(FsyncPolicy::from_name("EVERYSEC"), Some(FsyncPolicy::Everysec));
        assert_eq!(FsyncPolicy::from_name("sometimes"), None);
        assert_eq!(FsyncPolicy::Always.as_str(), "always");
    }
}
