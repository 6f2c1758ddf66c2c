//! End-to-end tests exercising the public API against the real filesystem
//! (via `tempfile`) and against an in-memory virtual device provider.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use virtfs::{
    Device, DeviceStat, DirBackend, DirEntry, Error, FileBackend, OpenMode, Result, StatInfo, Vfs,
    path_append,
};

fn join(dir: &tempfile::TempDir, name: &str) -> String {
    path_append(dir.path().to_str().unwrap(), name)
}

// ---------------------------------------------------------------------------
// Native backend through the Vfs facade

#[test]
fn open_missing_without_create_fails_noent() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();

    let err = vfs.open(&join(&dir, "missing.bin"), OpenMode::rw()).unwrap_err();
    assert_eq!(err, Error::NoEnt);
}

#[test]
fn excl_without_create_fails_inval() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();

    let err = vfs
        .open(&join(&dir, "f.bin"), OpenMode::WRITE | OpenMode::EXCL)
        .unwrap_err();
    assert_eq!(err, Error::Inval);
}

#[test]
fn write_seek_read_round_trip() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "round.bin");

    let payload = b"the quick brown fox jumps over the lazy dog";
    let mut file = vfs
        .open(&path, OpenMode::READ | OpenMode::rewrite())
        .unwrap();
    assert_eq!(file.write(payload).unwrap(), payload.len());

    file.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(file.read_to_end().unwrap(), payload);
    assert_eq!(file.size().unwrap(), payload.len() as u64);
}

#[test]
fn append_mode_writes_at_the_end() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "log.txt");

    vfs.open(&path, OpenMode::append())
        .unwrap()
        .write(b"one")
        .unwrap();
    vfs.open(&path, OpenMode::append())
        .unwrap()
        .write(b"two")
        .unwrap();

    let mut file = vfs.open(&path, OpenMode::read()).unwrap();
    assert_eq!(file.read_to_end().unwrap(), b"onetwo");
}

#[test]
fn create_new_refuses_existing_file() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "once.bin");

    vfs.open(&path, OpenMode::create_new()).unwrap();
    assert_eq!(
        vfs.open(&path, OpenMode::create_new()).unwrap_err(),
        Error::Exist
    );
}

#[test]
fn native_files_expose_a_handle() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();

    let file = vfs.open(&join(&dir, "h.bin"), OpenMode::rewrite()).unwrap();
    assert!(file.native_handle().is_some());
}

#[test]
fn stat_reports_size_and_kind() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "stat.bin");

    vfs.open(&path, OpenMode::rewrite())
        .unwrap()
        .write(&[7u8; 123])
        .unwrap();

    let info = vfs.stat(&path).unwrap();
    assert!(!info.is_directory);
    assert_eq!(info.size, 123);
    assert!(info.atime >= info.mtime);

    let sub = join(&dir, "sub");
    vfs.create_dir(&sub).unwrap();
    assert!(vfs.stat(&sub).unwrap().is_directory);
}

#[test]
fn statfs_reports_nonzero_capacity() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();

    let stat = vfs.statfs(dir.path().to_str().unwrap()).unwrap();
    assert!(stat.block_size > 0);
    assert!(stat.total_size >= stat.total_free);
}

#[test]
fn truncate_by_path_grows_and_shrinks() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "t.bin");

    vfs.open(&path, OpenMode::rewrite())
        .unwrap()
        .write(b"abcdef")
        .unwrap();

    vfs.truncate(&path, 3).unwrap();
    assert_eq!(vfs.stat(&path).unwrap().size, 3);

    vfs.truncate(&path, 10).unwrap();
    assert_eq!(vfs.stat(&path).unwrap().size, 10);
}

#[test]
fn set_times_round_trips_through_stat() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "stamped.bin");

    vfs.open(&path, OpenMode::rewrite())
        .unwrap()
        .write(b"x")
        .unwrap();

    // Whole seconds: the coarsest granularity any backend reports.
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let atime = mtime + Duration::from_secs(3600);
    vfs.set_times(&path, atime, mtime).unwrap();

    let info = vfs.stat(&path).unwrap();
    assert_eq!(info.mtime, mtime);
    assert_eq!(info.atime, atime);
}

#[test]
fn stale_access_time_is_clamped_to_modification_time() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let path = join(&dir, "clamped.bin");

    vfs.open(&path, OpenMode::rewrite())
        .unwrap()
        .write(b"x")
        .unwrap();

    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let stale_atime = mtime - Duration::from_secs(3600);
    vfs.set_times(&path, stale_atime, mtime).unwrap();

    // An access time earlier than the modification time is never surfaced.
    let info = vfs.stat(&path).unwrap();
    assert_eq!(info.mtime, mtime);
    assert_eq!(info.atime, mtime);
}

#[test]
fn dir_enumeration_lists_created_entries() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let root = join(&dir, "listing");
    vfs.create_dir(&root).unwrap();
    vfs.open(&path_append(&root, "a.bin"), OpenMode::rewrite())
        .unwrap();
    vfs.create_dir(&path_append(&root, "b")).unwrap();

    let mut handle = vfs.open_dir(&root).unwrap();
    let mut names: Vec<String> = (&mut handle)
        .filter(|e| e.name != "." && e.name != "..")
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, ["a.bin", "b"]);
}

// ---------------------------------------------------------------------------
// Gather stream over native fragments

#[test]
fn gather_concatenates_native_files() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();

    let mut fragments = Vec::new();
    for (name, data) in [("one", &b"abc"[..]), ("two", b"de"), ("three", b"fghij")] {
        let path = join(&dir, name);
        vfs.open(&path, OpenMode::rewrite())
            .unwrap()
            .write(data)
            .unwrap();
        fragments.push(vfs.open(&path, OpenMode::read()).unwrap());
    }

    let mut gathered = virtfs::File::gather(fragments).unwrap();
    assert_eq!(gathered.size().unwrap(), 10);
    assert_eq!(gathered.read_to_end().unwrap(), b"abcdefghij");

    gathered.seek(SeekFrom::Start(2)).unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(gathered.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"cde");
}

// ---------------------------------------------------------------------------
// Pending-write transactions

#[test]
fn discarded_pending_write_leaves_no_trace() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let dest = join(&dir, "config.bin");

    let temp_path;
    {
        let mut tx = vfs.pending(&dest).unwrap();
        tx.file().write(b"half-written").unwrap();
        temp_path = tx.temp_path().unwrap().to_owned();
        assert!(vfs.exists(&temp_path));
    }

    assert!(!vfs.exists(&dest));
    assert!(!vfs.exists(&temp_path));
}

#[test]
fn committed_pending_write_replaces_destination() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let dest = join(&dir, "config.bin");

    vfs.open(&dest, OpenMode::rewrite())
        .unwrap()
        .write(b"v1")
        .unwrap();

    let mut tx = vfs.pending(&dest).unwrap();
    let temp_path = tx.temp_path().unwrap().to_owned();
    tx.file().write(b"v2").unwrap();
    tx.commit(true).unwrap();

    assert!(!vfs.exists(&temp_path));
    assert_eq!(
        vfs.open(&dest, OpenMode::read()).unwrap().read_to_end().unwrap(),
        b"v2"
    );
}

#[test]
fn pending_commit_without_overwrite_keeps_both_files() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let dest = join(&dir, "config.bin");

    vfs.open(&dest, OpenMode::rewrite())
        .unwrap()
        .write(b"original")
        .unwrap();

    let mut tx = vfs.pending(&dest).unwrap();
    tx.file().write(b"replacement").unwrap();
    assert_eq!(tx.commit(false).unwrap_err(), Error::Exist);

    // Destination untouched and temp file intact until discard.
    assert_eq!(
        vfs.open(&dest, OpenMode::read()).unwrap().read_to_end().unwrap(),
        b"original"
    );
    let temp_path = tx.temp_path().unwrap().to_owned();
    assert!(vfs.exists(&temp_path));

    drop(tx);
    assert!(!vfs.exists(&temp_path));
}

#[test]
fn concurrent_pending_writes_use_distinct_temp_names() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let dest = join(&dir, "config.bin");

    let a = vfs.pending(&dest).unwrap();
    let b = vfs.pending(&dest).unwrap();
    assert_ne!(a.temp_path(), b.temp_path());
}

// ---------------------------------------------------------------------------
// Recursive utilities

#[test]
fn dir_size_rounds_to_alignment() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let root = join(&dir, "sized");
    vfs.create_dir(&root).unwrap();

    vfs.open(&path_append(&root, "ten"), OpenMode::rewrite())
        .unwrap()
        .write(&[0u8; 10])
        .unwrap();
    vfs.open(&path_append(&root, "twenty"), OpenMode::rewrite())
        .unwrap()
        .write(&[0u8; 20])
        .unwrap();

    assert_eq!(vfs.dir_size(&root, 16), Some(48));
}

#[test]
fn remove_all_stops_nothing_short_of_the_whole_tree() {
    let vfs = Vfs::new();
    let dir = tempfile::tempdir().unwrap();
    let root = join(&dir, "tree");

    vfs.create_path(&path_append(&root, "a/b/c")).unwrap();
    vfs.open(&path_append(&root, "a/b/f.bin"), OpenMode::rewrite())
        .unwrap()
        .write(b"x")
        .unwrap();

    vfs.remove_all(&root, true).unwrap();
    assert!(!vfs.exists(&root));
}

// ---------------------------------------------------------------------------
// In-memory virtual device provider

type MemMap = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[derive(Default)]
struct MemDevice {
    files: MemMap,
}

struct MemFile {
    files: MemMap,
    path: String,
    pos: u64,
    writable: bool,
}

impl FileBackend for MemFile {
    fn stat(&self) -> Result<StatInfo> {
        let files = self.files.lock();
        let data = files.get(&self.path).ok_or(Error::NoEnt)?;
        Ok(StatInfo {
            size: data.len() as u64,
            is_writable: true,
            ..Default::default()
        })
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let mut files = self.files.lock();
        let data = files.get_mut(&self.path).ok_or(Error::NoEnt)?;
        data.resize(length as usize, 0);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let files = self.files.lock();
        let data = files.get(&self.path).ok_or(Error::NoEnt)?;

        let size = data.len() as u64;
        if self.pos >= size {
            return Ok(0);
        }
        let count = buf.len().min((size - self.pos) as usize);
        let start = self.pos as usize;
        buf[..count].copy_from_slice(&data[start..start + count]);
        self.pos += count as u64;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let mut files = self.files.lock();
        let data = files.get_mut(&self.path).ok_or(Error::NoEnt)?;

        let end = self.pos as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.pos as usize..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = self.size()?;
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
            SeekFrom::End(offset) => size.checked_add_signed(offset),
        };
        self.pos = new_pos.ok_or(Error::Inval)?;
        Ok(self.pos)
    }

    fn size(&self) -> Result<u64> {
        let files = self.files.lock();
        Ok(files.get(&self.path).ok_or(Error::NoEnt)?.len() as u64)
    }
}

struct MemDir {
    entries: Vec<DirEntry>,
    pos: usize,
}

impl DirBackend for MemDir {
    fn read_next(&mut self) -> Result<Option<DirEntry>> {
        let entry = self.entries.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        Ok(entry)
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Device for MemDevice {
    fn stat(&self, path: &str) -> Result<StatInfo> {
        let files = self.files.lock();
        match files.get(path) {
            Some(data) => Ok(StatInfo {
                size: data.len() as u64,
                is_writable: true,
                ..Default::default()
            }),
            // The device root always exists as a directory.
            None if path.trim_end_matches('/').matches('/').count() <= 2 => Ok(StatInfo {
                is_directory: true,
                ..Default::default()
            }),
            None => Err(Error::NoEnt),
        }
    }

    fn statfs(&self, _path: &str) -> Result<DeviceStat> {
        Ok(DeviceStat {
            block_size: 4096,
            total_size: u64::MAX,
            total_free: u64::MAX,
            avail_free: u64::MAX,
        })
    }

    fn create_dir(&self, _path: &str) -> Result<()> {
        // Flat namespace; directories are implicit.
        Ok(())
    }

    fn remove_dir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.files.lock().remove(path).map(|_| ()).ok_or(Error::NoEnt)
    }

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let mut files = self.files.lock();
        if !overwrite && files.contains_key(to) {
            return Err(Error::Exist);
        }
        let data = files.remove(from).ok_or(Error::NoEnt)?;
        files.insert(to.to_owned(), data);
        Ok(())
    }

    fn truncate(&self, path: &str, length: u64) -> Result<()> {
        let mut files = self.files.lock();
        let data = files.get_mut(path).ok_or(Error::NoEnt)?;
        data.resize(length as usize, 0);
        Ok(())
    }

    fn set_times(&self, path: &str, _atime: SystemTime, _mtime: SystemTime) -> Result<()> {
        if self.files.lock().contains_key(path) {
            Ok(())
        } else {
            Err(Error::NoEnt)
        }
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileBackend>> {
        let mut files = self.files.lock();
        let exists = files.contains_key(path);

        if !exists {
            if !mode.contains(OpenMode::CREATE) {
                return Err(Error::NoEnt);
            }
            files.insert(path.to_owned(), Vec::new());
        } else if mode.contains(OpenMode::EXCL) {
            return Err(Error::Exist);
        } else if mode.contains(OpenMode::TRUNC) {
            files.get_mut(path).unwrap().clear();
        }
        drop(files);

        let pos = if mode.contains(OpenMode::APPEND) {
            self.files.lock().get(path).map_or(0, |d| d.len() as u64)
        } else {
            0
        };

        Ok(Box::new(MemFile {
            files: Arc::clone(&self.files),
            path: path.to_owned(),
            pos,
            writable: mode.contains(OpenMode::WRITE),
        }))
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirBackend>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let files = self.files.lock();

        let entries = files
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, data)| DirEntry {
                name: name[prefix.len()..].to_owned(),
                stat: StatInfo {
                    size: data.len() as u64,
                    is_writable: true,
                    ..Default::default()
                },
            })
            .collect();

        Ok(Box::new(MemDir { entries, pos: 0 }))
    }
}

#[test]
fn virtual_paths_dispatch_to_the_provider() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    let path = "//mem/save/slot0.bin";
    let mut file = vfs.open(path, OpenMode::rewrite() | OpenMode::READ).unwrap();
    file.write(b"state").unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(file.read_to_end().unwrap(), b"state");

    assert!(vfs.exists(path));
    assert_eq!(vfs.stat(path).unwrap().size, 5);

    // Missing virtual files honor the same error taxonomy.
    assert_eq!(
        vfs.open("//mem/absent", OpenMode::read()).unwrap_err(),
        Error::NoEnt
    );
}

#[test]
fn virtual_rename_stays_within_the_provider() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    vfs.open("//mem/a", OpenMode::rewrite())
        .unwrap()
        .write(b"payload")
        .unwrap();

    vfs.rename("//mem/a", "//mem/b", false).unwrap();
    assert!(!vfs.exists("//mem/a"));
    assert_eq!(
        vfs.open("//mem/b", OpenMode::read()).unwrap().read_to_end().unwrap(),
        b"payload"
    );

    vfs.open("//mem/c", OpenMode::rewrite()).unwrap();
    assert_eq!(vfs.rename("//mem/b", "//mem/c", false).unwrap_err(), Error::Exist);
}

#[test]
fn virtual_copy_runs_through_the_facades() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    vfs.open("//mem/src", OpenMode::rewrite())
        .unwrap()
        .write(b"copy me")
        .unwrap();

    vfs.copy("//mem/src", "//mem/dst", false).unwrap();
    assert_eq!(
        vfs.open("//mem/dst", OpenMode::read()).unwrap().read_to_end().unwrap(),
        b"copy me"
    );
}

#[test]
fn virtual_set_times_dispatches_to_the_provider() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    vfs.open("//mem/t", OpenMode::rewrite()).unwrap();

    let now = SystemTime::now();
    vfs.set_times("//mem/t", now, now).unwrap();
    assert_eq!(
        vfs.set_times("//mem/absent", now, now).unwrap_err(),
        Error::NoEnt
    );
}

#[test]
fn virtual_dir_enumeration() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    vfs.open("//mem/dir/a", OpenMode::rewrite()).unwrap();
    vfs.open("//mem/dir/b", OpenMode::rewrite()).unwrap();

    let mut handle = vfs.open_dir("//mem/dir").unwrap();
    let mut names: Vec<String> = (&mut handle).map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, ["a", "b"]);
}

#[test]
#[should_panic(expected = "cross-provider rename")]
fn cross_provider_rename_is_a_contract_violation() {
    let vfs = Vfs::new();
    vfs.register_device("//mem", Arc::new(MemDevice::default()));

    let _ = vfs.rename("//mem/a", "/tmp/b", false);
}

#[test]
fn concurrent_registration_and_lookup() {
    let vfs = Arc::new(Vfs::new());

    let a = {
        let vfs = Arc::clone(&vfs);
        std::thread::spawn(move || {
            vfs.register_device("//alpha", Arc::new(MemDevice::default()));
        })
    };
    let b = {
        let vfs = Arc::clone(&vfs);
        std::thread::spawn(move || {
            vfs.register_device("//beta", Arc::new(MemDevice::default()));
        })
    };

    // Lookups racing the registrations must never observe a torn entry:
    // either a full miss or a fully working provider.
    let reader = {
        let vfs = Arc::clone(&vfs);
        std::thread::spawn(move || {
            for _ in 0..1000 {
                match vfs.open("//alpha/x", OpenMode::rewrite()) {
                    Ok(mut file) => {
                        file.write(b"ok").unwrap();
                    }
                    Err(err) => assert_eq!(err, Error::NoEnt),
                }
            }
        })
    };

    a.join().unwrap();
    b.join().unwrap();
    reader.join().unwrap();

    vfs.open("//alpha/probe", OpenMode::rewrite()).unwrap();
    vfs.open("//beta/probe", OpenMode::rewrite()).unwrap();
}
