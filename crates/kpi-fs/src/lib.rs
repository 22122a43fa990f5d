//! Durable file helpers for the KPI sync cache.
//!
//! Every file the sync layer owns (the pending-edit queue and the local copy of
//! the remote table) must survive a crash at any point of a write. Writes go
//! through [`atomic_write`]:
//! - write to a temp file in the destination directory (no cross-device rename)
//! - flush + `sync_all`
//! - rename over the destination with replace semantics (including on Windows)
//!
//! Readers either see the previous contents or the new contents, never a torn file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtomicWriteError<E> {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("write error: {0}")]
    Writer(E),
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare file names like `table.json`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically replace `dest` with whatever `write_fn` writes into a temp file.
///
/// Missing parent directories are created. If `write_fn` fails, `dest` is left
/// untouched and the temp file is removed.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    replace_file(tmp_path.as_ref(), dest)?;
    // The rename already happened; a failed directory sync is not a failed write.
    let _ = sync_parent_dir(dest);

    Ok(out)
}

pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write(dest, |file| file.write_all(bytes)).map_err(|err| match err {
        AtomicWriteError::Io(err) | AtomicWriteError::Writer(err) => err,
    })
}

/// Serialize `value` as pretty-printed JSON and atomically replace `dest` with it.
///
/// Non-ASCII text (e.g. CJK column headers) is written verbatim, not escaped.
pub fn atomic_write_json<T: Serialize + ?Sized>(
    dest: impl AsRef<Path>,
    value: &T,
) -> Result<(), AtomicWriteError<serde_json::Error>> {
    atomic_write(dest, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(serde_json::Error::io)
    })
}

/// Read a whole file, mapping "not found" to `Ok(None)`.
pub fn read_if_exists(path: impl AsRef<Path>) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path.as_ref()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    // Opening a directory as a file works on most Unix platforms only.
    File::open(parent_dir_or_dot(path))?.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt as _;
        use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

        fn to_wide_null(path: &Path) -> Vec<u16> {
            let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            wide.push(0);
            wide
        }

        let from_w = to_wide_null(from);
        let to_w = to_wide_null(to);
        let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut out: Vec<_> = fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("dir entry").path())
            .filter(|p| p.is_file())
            .collect();
        out.sort();
        out
    }

    #[test]
    fn atomic_write_creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join(".cache").join("nested").join("table.json");

        atomic_write_bytes(&dest, b"{}").expect("atomic write");

        assert_eq!(fs::read(&dest).expect("read back"), b"{}");
    }

    #[test]
    fn failed_writer_leaves_existing_file_and_no_temp_files() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("pending_queue.json");
        fs::write(&dest, b"[]").expect("seed dest");

        let err = atomic_write(&dest, |file| {
            file.write_all(b"[{\"partial\"").expect("write partial");
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "disk full"))
        })
        .expect_err("writer error must surface");

        assert!(matches!(err, AtomicWriteError::Writer(_)));
        assert_eq!(fs::read(&dest).expect("read dest"), b"[]");
        assert_eq!(files_in(tmp.path()), vec![dest]);
    }

    #[test]
    fn atomic_write_fails_when_parent_is_a_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"x").expect("write blocker");

        let err = atomic_write_bytes(blocker.join("table.json"), b"{}")
            .expect_err("cannot create a directory over a file");
        assert_ne!(err.kind(), io::ErrorKind::NotFound);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        sector: String,
        value: String,
    }

    #[test]
    fn json_is_written_pretty_and_keeps_non_ascii_text() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("entries.json");
        let entries = vec![Entry {
            sector: "序号 No.".to_string(),
            value: "85".to_string(),
        }];

        atomic_write_json(&dest, &entries).expect("write json");

        let raw = fs::read_to_string(&dest).expect("read json");
        assert!(raw.contains("序号 No."), "non-ascii should not be escaped: {raw}");
        assert!(raw.contains('\n'), "expected pretty-printed json: {raw}");
        let back: Vec<Entry> = serde_json::from_str(&raw).expect("parse json");
        assert_eq!(back, entries);
    }

    #[test]
    fn read_if_exists_treats_missing_files_as_absent() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let path = tmp.path().join("missing.json");

        assert_eq!(read_if_exists(&path).expect("read missing"), None);

        fs::write(&path, b"data").expect("write");
        assert_eq!(read_if_exists(&path).expect("read"), Some(b"data".to_vec()));
    }
}
