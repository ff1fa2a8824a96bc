use super::{
    check_name, child_path, is_valid_name, DirHandle, Directory, File, FileHandle, FileStream,
    FileSystem,
};
use crate::http::stream::Segment;
use std::{
    any::Any,
    io::{self, Cursor, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

/// A filesystem that lives entirely in memory.
///
/// # Access rules
///
/// Per file, either any number of readers or exactly one writer may be open.
/// Opening a stream that would break the rule fails with
/// [`WouldBlock`](io::ErrorKind::WouldBlock).
///
/// A reader sees the content as it was when it was opened. A writer works on
/// a private copy that becomes the file content when the writer is flushed or
/// dropped.
///
/// # Examples
/// ```
/// use std::io::ErrorKind;
/// use threadweb::{vfs::{FileSystem, MemoryFileSystem}, Segment};
///
/// let fs = MemoryFileSystem::new();
/// let file = fs.root().create_file("notes.txt").unwrap();
///
/// let mut writer = file.open_read_write().unwrap();
/// writer.push(b"hello").unwrap();
/// let busy = file.open_read().err().map(|err| err.kind());
/// assert_eq!(busy, Some(ErrorKind::WouldBlock));
///
/// drop(writer);
/// assert_eq!(file.len().unwrap(), 5);
/// ```
pub struct MemoryFileSystem {
    root: Arc<MemDir>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            root: MemDir::new("/".to_owned(), Weak::new()),
        }
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn root(&self) -> DirHandle {
        self.root.clone()
    }
}

// DIRECTORIES

struct MemDir {
    name: String,
    me: Weak<MemDir>,
    parent: Weak<MemDir>,
    entries: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    dirs: Vec<Arc<MemDir>>,
    files: Vec<Arc<MemFile>>,
}

impl MemDir {
    fn new(name: String, parent: Weak<MemDir>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            parent,
            entries: RwLock::default(),
        })
    }

    fn entries(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_file(&self, entries: &mut Entries, name: &str) -> FileHandle {
        let file = Arc::new(MemFile {
            name: name.to_owned(),
            parent: self.me.clone(),
            state: Arc::default(),
        });
        entries.files.push(file.clone());
        file
    }
}

fn already_exists(name: &str, kind: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{name:?} already exists as a {kind}"),
    )
}

impl Directory for MemDir {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        match self.parent.upgrade() {
            Some(parent) => child_path(&parent.path(), &self.name),
            None => "/".to_owned(),
        }
    }

    fn parent(&self) -> Option<DirHandle> {
        self.parent.upgrade().map(|parent| parent as DirHandle)
    }

    fn dirs(&self) -> io::Result<Vec<DirHandle>> {
        Ok(self
            .entries()
            .dirs
            .iter()
            .map(|dir| dir.clone() as DirHandle)
            .collect())
    }

    fn files(&self) -> io::Result<Vec<FileHandle>> {
        Ok(self
            .entries()
            .files
            .iter()
            .map(|file| file.clone() as FileHandle)
            .collect())
    }

    fn dir(&self, name: &str) -> Option<DirHandle> {
        if !is_valid_name(name) {
            return None;
        }

        self.entries()
            .dirs
            .iter()
            .find(|dir| dir.name == name)
            .map(|dir| dir.clone() as DirHandle)
    }

    fn file(&self, name: &str) -> Option<FileHandle> {
        if !is_valid_name(name) {
            return None;
        }

        self.entries()
            .files
            .iter()
            .find(|file| file.name == name)
            .map(|file| file.clone() as FileHandle)
    }

    fn create_dir(&self, name: &str) -> io::Result<DirHandle> {
        check_name(name)?;
        let mut entries = self.entries_mut();

        if let Some(dir) = entries.dirs.iter().find(|dir| dir.name == name) {
            return Ok(dir.clone());
        }
        if entries.files.iter().any(|file| file.name == name) {
            return Err(already_exists(name, "file"));
        }

        let dir = MemDir::new(name.to_owned(), self.me.clone());
        entries.dirs.push(dir.clone());
        Ok(dir)
    }

    fn create_file(&self, name: &str) -> io::Result<FileHandle> {
        check_name(name)?;
        let mut entries = self.entries_mut();

        if let Some(file) = entries.files.iter().find(|file| file.name == name) {
            file.truncate()?;
            return Ok(file.clone());
        }
        if entries.dirs.iter().any(|dir| dir.name == name) {
            return Err(already_exists(name, "directory"));
        }

        Ok(self.add_file(&mut entries, name))
    }

    fn create_new_file(&self, name: &str) -> io::Result<FileHandle> {
        check_name(name)?;
        let mut entries = self.entries_mut();

        if entries.files.iter().any(|file| file.name == name) {
            return Err(already_exists(name, "file"));
        }
        if entries.dirs.iter().any(|dir| dir.name == name) {
            return Err(already_exists(name, "directory"));
        }

        Ok(self.add_file(&mut entries, name))
    }

    fn remove_file(&self, name: &str) -> io::Result<()> {
        let mut entries = self.entries_mut();
        let Some(index) = entries.files.iter().position(|file| file.name == name) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file called {name:?}"),
            ));
        };

        if lock(&entries.files[index].state).writer {
            return Err(busy("file is open for writing"));
        }
        entries.files.remove(index);
        Ok(())
    }

    fn same_dir(&self, other: &dyn Directory) -> bool {
        other
            .as_any()
            .downcast_ref::<MemDir>()
            .is_some_and(|other| std::ptr::eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// FILES

struct MemFile {
    name: String,
    parent: Weak<MemDir>,
    state: Arc<Mutex<Access>>,
}

struct Access {
    data: Arc<[u8]>,
    readers: usize,
    writer: bool,
}

impl Default for Access {
    fn default() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            readers: 0,
            writer: false,
        }
    }
}

fn lock(state: &Mutex<Access>) -> MutexGuard<'_, Access> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn busy(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, reason)
}

impl MemFile {
    fn truncate(&self) -> io::Result<()> {
        let mut access = lock(&self.state);
        if access.writer {
            return Err(busy("file is open for writing"));
        }

        access.data = Arc::from(Vec::new());
        Ok(())
    }
}

impl File for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        match self.parent.upgrade() {
            Some(parent) => child_path(&parent.path(), &self.name),
            None => child_path("/", &self.name),
        }
    }

    fn parent(&self) -> Option<DirHandle> {
        self.parent.upgrade().map(|parent| parent as DirHandle)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(lock(&self.state).data.len() as u64)
    }

    fn open_read(&self) -> io::Result<FileStream> {
        let mut access = lock(&self.state);
        if access.writer {
            return Err(busy("file is open for writing"));
        }

        access.readers += 1;
        Ok(Box::new(Reader {
            cursor: Cursor::new(access.data.clone()),
            state: self.state.clone(),
        }))
    }

    fn open_read_write(&self) -> io::Result<FileStream> {
        let mut access = lock(&self.state);
        if access.writer {
            return Err(busy("file is open for writing"));
        }
        if access.readers > 0 {
            return Err(busy("file is open for reading"));
        }

        access.writer = true;
        Ok(Box::new(Writer {
            buffer: Cursor::new(access.data.to_vec()),
            state: self.state.clone(),
        }))
    }
}

/// Read-only snapshot of a file. Releases its read slot on drop.
struct Reader {
    cursor: Cursor<Arc<[u8]>>,
    state: Arc<Mutex<Access>>,
}

impl Segment for Reader {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        false
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        Some(self.cursor.get_ref().len() as u64)
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.cursor.set_position(offset);
        Ok(())
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        let mut access = lock(&self.state);
        access.readers = access.readers.saturating_sub(1);
    }
}

/// Private working copy of a file. Committed on flush and on drop.
struct Writer {
    buffer: Cursor<Vec<u8>>,
    state: Arc<Mutex<Access>>,
}

impl Writer {
    fn commit(&self) -> MutexGuard<'_, Access> {
        let mut access = lock(&self.state);
        access.data = Arc::from(self.buffer.get_ref().as_slice());
        access
    }
}

impl Segment for Writer {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        true
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        Some(self.buffer.get_ref().len() as u64)
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        self.buffer.write_all(buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.buffer.set_position(offset);
        Ok(())
    }
    fn flush_segment(&mut self) -> io::Result<()> {
        drop(self.commit());
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.commit().writer = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(file: &FileHandle) -> Vec<u8> {
        let mut stream = file.open_read().unwrap();
        let mut out = Vec::new();
        let mut buf = [0; 3];
        loop {
            match stream.pull(&mut buf).unwrap() {
                0 => break out,
                n => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    fn write(file: &FileHandle, bytes: &[u8]) {
        let mut stream = file.open_read_write().unwrap();
        stream.push(bytes).unwrap();
    }

    #[test]
    fn tree() {
        let fs = MemoryFileSystem::new();
        let root = fs.root();
        assert_eq!((root.name(), root.path()), ("/", "/".to_owned()));
        assert!(root.parent().is_none());

        let docs = root.create_dir("docs").unwrap();
        let deep = docs.create_dir("deep").unwrap();
        let note = deep.create_file("note.txt").unwrap();
        root.create_file("top.txt").unwrap();

        assert_eq!(deep.path(), "/docs/deep");
        assert_eq!(note.path(), "/docs/deep/note.txt");
        assert!(deep.parent().unwrap().same_dir(&*docs));
        assert!(note.parent().unwrap().same_dir(&*deep));

        let names = |dirs: Vec<DirHandle>| -> Vec<String> {
            dirs.iter().map(|dir| dir.name().to_owned()).collect()
        };
        assert_eq!(names(root.dirs().unwrap()), ["docs"]);
        assert_eq!(root.files().unwrap().len(), 1);
        assert!(root.dir("docs").unwrap().same_dir(&*docs));
        assert!(root.dir("top.txt").is_none());
        assert!(root.file("docs").is_none());

        #[rustfmt::skip]
        let cases = [
            ("note.txt", false, true),
            ("top.txt",  true,  true),
            ("deep",     false, false),
            ("../x",     false, false),
        ];

        for (name, here, anywhere) in cases {
            assert_eq!(root.contains_file(name, false), here, "{name}");
            assert_eq!(root.contains_file(name, true), anywhere, "{name}");
        }

        assert!(!root.contains_dir("deep", false));
        assert!(root.contains_dir("deep", true));
        assert!(root.contains_dir("docs", false));
        assert!(!root.contains_dir("..", true));
    }

    #[test]
    fn create_existing() {
        let fs = MemoryFileSystem::new();
        let root = fs.root();

        let a = root.create_dir("a").unwrap();
        assert!(root.create_dir("a").unwrap().same_dir(&*a));
        assert_eq!(root.dirs().unwrap().len(), 1);

        let file = root.create_file("f").unwrap();
        write(&file, b"content");
        assert_eq!(file.len().unwrap(), 7);

        let again = root.create_file("f").unwrap();
        assert_eq!(again.len().unwrap(), 0);
        assert_eq!(file.len().unwrap(), 0);
        assert_eq!(root.files().unwrap().len(), 1);

        #[rustfmt::skip]
        let cases = [
            ("a",   io::ErrorKind::AlreadyExists),
            ("",    io::ErrorKind::InvalidInput),
            ("x/y", io::ErrorKind::InvalidInput),
        ];
        for (name, kind) in cases {
            assert_eq!(root.create_file(name).err().map(|e| e.kind()), Some(kind));
        }
        assert_eq!(
            root.create_dir("f").err().map(|e| e.kind()),
            Some(io::ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn create_new_and_remove() {
        let fs = MemoryFileSystem::new();
        let root = fs.root();
        root.create_dir("d").unwrap();

        let file = root.create_new_file("f").unwrap();
        write(&file, b"kept");

        #[rustfmt::skip]
        let cases = [
            ("f",  io::ErrorKind::AlreadyExists),
            ("d",  io::ErrorKind::AlreadyExists),
            ("..", io::ErrorKind::InvalidInput),
        ];
        for (name, kind) in cases {
            assert_eq!(root.create_new_file(name).err().map(|e| e.kind()), Some(kind), "{name}");
        }
        assert_eq!(read_all(&file), b"kept");

        let writer = file.open_read_write().unwrap();
        assert_eq!(
            root.remove_file("f").err().map(|e| e.kind()),
            Some(io::ErrorKind::WouldBlock)
        );
        drop(writer);

        let reader = file.open_read().unwrap();
        root.remove_file("f").unwrap();
        drop(reader);
        assert!(root.file("f").is_none());
        assert_eq!(
            root.remove_file("f").err().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
        assert!(root.create_new_file("f").unwrap().is_empty().unwrap());
    }

    #[test]
    fn reader_writer_exclusion() {
        let fs = MemoryFileSystem::new();
        let file = fs.root().create_file("f").unwrap();
        let would_block = |result: io::Result<FileStream>| {
            result.err().map(|e| e.kind()) == Some(io::ErrorKind::WouldBlock)
        };

        let first = file.open_read().unwrap();
        let second = file.open_read().unwrap();
        assert!(!first.writable());
        assert!(would_block(file.open_read_write()));

        drop(first);
        assert!(would_block(file.open_read_write()));
        drop(second);

        let mut writer = file.open_read_write().unwrap();
        assert!(would_block(file.open_read()));
        assert!(would_block(file.open_read_write()));
        assert!(fs.root().create_file("f").is_err());

        writer.push(b"abc").unwrap();
        assert_eq!(file.len().unwrap(), 0);
        drop(writer);

        assert_eq!(read_all(&file), b"abc");
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let fs = MemoryFileSystem::new();
        let file = fs.root().create_file("f").unwrap();
        write(&file, b"old");

        let mut reader = file.open_read().unwrap();
        fs.root().create_file("f").unwrap();
        assert_eq!(file.len().unwrap(), 0);

        let mut buf = [0; 8];
        assert_eq!(reader.pull(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"old");
    }

    #[test]
    fn writer_edits_in_place() {
        let fs = MemoryFileSystem::new();
        let file = fs.root().create_file("f").unwrap();
        write(&file, b"hello world");

        let mut writer = file.open_read_write().unwrap();
        writer.seek_to(6).unwrap();
        writer.push(b"there").unwrap();
        writer.flush_segment().unwrap();
        assert_eq!(file.len().unwrap(), 11);
        drop(writer);

        assert_eq!(read_all(&file), b"hello there");
    }

    #[test]
    fn membership() {
        let fs = MemoryFileSystem::new();
        let other = MemoryFileSystem::new();

        let sub = fs.root().create_dir("a").unwrap().create_dir("b").unwrap();
        let file = sub.create_file("f").unwrap();
        let foreign = other.root().create_dir("a").unwrap();

        assert!(fs.contains_dir(&*fs.root()));
        assert!(fs.contains_dir(&*sub));
        assert!(fs.contains_file(&*file));
        assert!(!fs.contains_dir(&*foreign));
        assert!(!other.contains_file(&*file));
    }
}
