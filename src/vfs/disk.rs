use super::{
    check_name, child_path, is_valid_name, DirHandle, Directory, File, FileHandle, FileStream,
    FileSystem,
};
use crate::http::stream::Segment;
use std::{
    any::Any,
    collections::HashMap,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A filesystem backed by a host directory.
///
/// Handles only ever address entries below the base directory: names are
/// single components, and symbolic links are neither listed nor followed.
///
/// Streams follow the same access rules as
/// [`MemoryFileSystem`](super::MemoryFileSystem): any number of readers or
/// one writer per file, otherwise [`WouldBlock`](io::ErrorKind::WouldBlock).
/// The rules hold between handles of one `DiskFileSystem`; other processes
/// and other instances over the same directory are not seen.
pub struct DiskFileSystem {
    tree: Arc<Tree>,
}

impl DiskFileSystem {
    /// Serves the existing directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let base = fs::canonicalize(path)?;
        if !fs::metadata(&base)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", base.display()),
            ));
        }

        Ok(Self {
            tree: Arc::new(Tree {
                base,
                open: Mutex::default(),
            }),
        })
    }

    #[inline]
    pub fn base(&self) -> &Path {
        &self.tree.base
    }
}

impl FileSystem for DiskFileSystem {
    fn root(&self) -> DirHandle {
        Arc::new(DiskDir {
            tree: self.tree.clone(),
            names: Vec::new(),
        })
    }
}

fn location(names: &[String]) -> String {
    format!("/{}", names.join("/"))
}

fn busy(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, reason)
}

// ACCESS

/// State shared by every handle of one [`DiskFileSystem`].
struct Tree {
    base: PathBuf,
    /// Open streams per host path. Idle paths have no entry.
    open: Mutex<HashMap<PathBuf, Access>>,
}

#[derive(Default)]
struct Access {
    readers: usize,
    writer: bool,
}

type Table<'a> = MutexGuard<'a, HashMap<PathBuf, Access>>;

impl Tree {
    fn host_path(&self, names: &[String]) -> PathBuf {
        let mut path = self.base.clone();
        path.extend(names);
        path
    }

    fn table(&self) -> Table<'_> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(self: &Arc<Self>, path: PathBuf, writer: bool) -> io::Result<Claim> {
        let mut table = self.table();
        let access = table.entry(path.clone()).or_default();

        if access.writer {
            return Err(busy("file is open for writing"));
        }
        if writer && access.readers > 0 {
            return Err(busy("file is open for reading"));
        }

        if writer {
            access.writer = true;
        } else {
            access.readers += 1;
        }
        Ok(Claim {
            tree: self.clone(),
            path,
            writer,
        })
    }
}

/// One open stream's slot in the access table, released on drop.
struct Claim {
    tree: Arc<Tree>,
    path: PathBuf,
    writer: bool,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut table = self.tree.table();

        let idle = match table.get_mut(&self.path) {
            Some(access) => {
                if self.writer {
                    access.writer = false;
                } else {
                    access.readers = access.readers.saturating_sub(1);
                }
                !access.writer && access.readers == 0
            }
            None => false,
        };
        if idle {
            table.remove(&self.path);
        }
    }
}

// DIRECTORIES

struct DiskDir {
    tree: Arc<Tree>,
    names: Vec<String>,
}

impl DiskDir {
    fn host(&self) -> PathBuf {
        self.tree.host_path(&self.names)
    }

    fn kind_of(&self, name: &str) -> Option<fs::FileType> {
        if !is_valid_name(name) {
            return None;
        }

        fs::symlink_metadata(self.host().join(name))
            .ok()
            .map(|meta| meta.file_type())
    }

    /// Sorted names of the children accepted by `keep`.
    fn children(&self, keep: fn(&fs::FileType) -> bool) -> io::Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(self.host())? {
            let entry = entry?;
            if !keep(&entry.file_type()?) {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) if is_valid_name(&name) => names.push(name),
                _ => tracing::trace!(path = %entry.path().display(), "skipping entry"),
            }
        }

        names.sort();
        Ok(names)
    }

    fn child_dir(&self, name: &str) -> Arc<DiskDir> {
        let mut names = self.names.clone();
        names.push(name.to_owned());

        Arc::new(DiskDir {
            tree: self.tree.clone(),
            names,
        })
    }

    fn child_file(&self, name: &str) -> Arc<DiskFile> {
        Arc::new(DiskFile {
            tree: self.tree.clone(),
            dir: self.names.clone(),
            name: name.to_owned(),
        })
    }
}

impl Directory for DiskDir {
    fn name(&self) -> &str {
        self.names.last().map_or("/", String::as_str)
    }

    fn path(&self) -> String {
        location(&self.names)
    }

    fn parent(&self) -> Option<DirHandle> {
        let (_, parent) = self.names.split_last()?;

        Some(Arc::new(DiskDir {
            tree: self.tree.clone(),
            names: parent.to_vec(),
        }))
    }

    fn dirs(&self) -> io::Result<Vec<DirHandle>> {
        let names = self.children(fs::FileType::is_dir)?;
        Ok(names
            .iter()
            .map(|name| self.child_dir(name) as DirHandle)
            .collect())
    }

    fn files(&self) -> io::Result<Vec<FileHandle>> {
        let names = self.children(fs::FileType::is_file)?;
        Ok(names
            .iter()
            .map(|name| self.child_file(name) as FileHandle)
            .collect())
    }

    fn dir(&self, name: &str) -> Option<DirHandle> {
        self.kind_of(name)
            .filter(fs::FileType::is_dir)
            .map(|_| self.child_dir(name) as DirHandle)
    }

    fn file(&self, name: &str) -> Option<FileHandle> {
        self.kind_of(name)
            .filter(fs::FileType::is_file)
            .map(|_| self.child_file(name) as FileHandle)
    }

    fn create_dir(&self, name: &str) -> io::Result<DirHandle> {
        check_name(name)?;

        match fs::create_dir(self.host().join(name)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if !self.kind_of(name).is_some_and(|kind| kind.is_dir()) {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }

        Ok(self.child_dir(name))
    }

    fn create_file(&self, name: &str) -> io::Result<FileHandle> {
        check_name(name)?;

        if let Some(kind) = self.kind_of(name) {
            if !kind.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{name:?} exists and is not a regular file"),
                ));
            }
        }

        let path = self.host().join(name);
        let table = self.tree.table();
        if table.contains_key(&path) {
            return Err(busy("file is open"));
        }

        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        drop(table);

        Ok(self.child_file(name))
    }

    fn create_new_file(&self, name: &str) -> io::Result<FileHandle> {
        check_name(name)?;

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.host().join(name))?;

        Ok(self.child_file(name))
    }

    fn remove_file(&self, name: &str) -> io::Result<()> {
        if !self.kind_of(name).is_some_and(|kind| kind.is_file()) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file called {name:?}"),
            ));
        }

        let path = self.host().join(name);
        let table = self.tree.table();
        if table.get(&path).is_some_and(|access| access.writer) {
            return Err(busy("file is open for writing"));
        }

        fs::remove_file(&path)
    }

    fn same_dir(&self, other: &dyn Directory) -> bool {
        other
            .as_any()
            .downcast_ref::<DiskDir>()
            .is_some_and(|other| self.tree.base == other.tree.base && self.names == other.names)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// FILES

struct DiskFile {
    tree: Arc<Tree>,
    dir: Vec<String>,
    name: String,
}

impl DiskFile {
    fn host(&self) -> PathBuf {
        self.tree.host_path(&self.dir).join(&self.name)
    }
}

impl File for DiskFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> String {
        child_path(&location(&self.dir), &self.name)
    }

    fn parent(&self) -> Option<DirHandle> {
        Some(Arc::new(DiskDir {
            tree: self.tree.clone(),
            names: self.dir.clone(),
        }))
    }

    fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(self.host())?.len())
    }

    fn open_read(&self) -> io::Result<FileStream> {
        let path = self.host();
        let claim = self.tree.claim(path.clone(), false)?;

        Ok(Box::new(Claimed {
            file: fs::File::open(path)?,
            writable: false,
            _claim: claim,
        }))
    }

    fn open_read_write(&self) -> io::Result<FileStream> {
        let path = self.host();
        let claim = self.tree.claim(path.clone(), true)?;

        Ok(Box::new(Claimed {
            file: OpenOptions::new().read(true).write(true).open(path)?,
            writable: true,
            _claim: claim,
        }))
    }
}

/// A host file held open under an access claim.
struct Claimed {
    file: fs::File,
    writable: bool,
    _claim: Claim,
}

impl Segment for Claimed {
    fn readable(&self) -> bool {
        true
    }
    fn writable(&self) -> bool {
        self.writable
    }
    fn seekable(&self) -> bool {
        true
    }
    fn len(&self) -> Option<u64> {
        self.file.len()
    }
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.pull(buf)
    }
    fn push(&mut self, buf: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file is open for reading only",
            ));
        }
        self.file.push(buf)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek_to(offset)
    }
    fn flush_segment(&mut self) -> io::Result<()> {
        if self.writable {
            self.file.flush_segment()
        } else {
            Ok(())
        }
    }
}
