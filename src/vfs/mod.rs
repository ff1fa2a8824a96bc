//! Virtual filesystem served by [`FilesService`](crate::services::FilesService).
//!
//! A tree of [`Directory`] and [`File`] handles behind a [`FileSystem`]
//! root. Two backends exist:
//!
//! - [`MemoryFileSystem`]: everything lives in memory, with reader/writer
//!   exclusion per file.
//! - [`DiskFileSystem`]: a host directory; nothing outside it is reachable.
//!
//! Every name handed to a directory is a single path component. Names that
//! are empty, `.` or `..`, or that contain `/` or `\`, are rejected.

mod disk;
mod memory;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;

use crate::http::stream::Segment;
use std::{any::Any, io, sync::Arc};

pub type DirHandle = Arc<dyn Directory>;
pub type FileHandle = Arc<dyn File>;

/// Stream returned by [`File::open_read`] and [`File::open_read_write`].
pub type FileStream = Box<dyn Segment + Send>;

/// `true` if `name` is a single, non-special path component.
///
/// # Examples
/// ```
/// use threadweb::vfs::is_valid_name;
///
/// assert!(is_valid_name("notes.txt"));
/// assert!(!is_valid_name("a/b"));
/// assert!(!is_valid_name(".."));
/// ```
pub fn is_valid_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..") && !name.contains(['/', '\\'])
}

pub(crate) fn check_name(name: &str) -> io::Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid entry name {name:?}"),
        ))
    }
}

/// A directory node.
pub trait Directory: Send + Sync {
    /// Last path component, `/` for the root.
    fn name(&self) -> &str;

    /// Location below the root, `/`-separated with a leading `/`.
    fn path(&self) -> String;

    /// `None` for the root.
    fn parent(&self) -> Option<DirHandle>;

    fn dirs(&self) -> io::Result<Vec<DirHandle>>;
    fn files(&self) -> io::Result<Vec<FileHandle>>;

    /// Direct child directory called `name`.
    fn dir(&self, name: &str) -> Option<DirHandle>;

    /// Direct child file called `name`.
    fn file(&self, name: &str) -> Option<FileHandle>;

    /// Creates a child directory, or returns the existing one.
    fn create_dir(&self, name: &str) -> io::Result<DirHandle>;

    /// Creates an empty child file. An existing file is truncated and
    /// returned.
    fn create_file(&self, name: &str) -> io::Result<FileHandle>;

    /// Creates an empty child file. Fails with `AlreadyExists` if any entry
    /// called `name` is present; the check and the creation are one step.
    fn create_new_file(&self, name: &str) -> io::Result<FileHandle>;

    /// Removes the child file called `name`. Fails with `WouldBlock` while
    /// it is open for writing, and with `NotFound` if there is no such file.
    fn remove_file(&self, name: &str) -> io::Result<()>;

    /// `true` if both handles name the same node.
    fn same_dir(&self, other: &dyn Directory) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// Looks for a file called `name` here, then depth-first below if
    /// `recursive`.
    fn contains_file(&self, name: &str, recursive: bool) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        if self.file(name).is_some() {
            return true;
        }

        recursive
            && self
                .dirs()
                .map(|dirs| dirs.iter().any(|dir| dir.contains_file(name, true)))
                .unwrap_or(false)
    }

    /// Looks for a directory called `name` here, then depth-first below if
    /// `recursive`.
    fn contains_dir(&self, name: &str, recursive: bool) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        let Ok(dirs) = self.dirs() else {
            return false;
        };

        dirs.iter().any(|dir| dir.name() == name)
            || (recursive && dirs.iter().any(|dir| dir.contains_dir(name, true)))
    }
}

/// A file node.
pub trait File: Send + Sync {
    fn name(&self) -> &str;

    /// Location below the root, `/`-separated with a leading `/`.
    fn path(&self) -> String;

    /// `None` only if the tree the file belonged to is gone.
    fn parent(&self) -> Option<DirHandle>;

    /// Current length in bytes.
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Opens a stream that can read and seek but not write.
    fn open_read(&self) -> io::Result<FileStream>;

    /// Opens a stream that can read, write and seek.
    fn open_read_write(&self) -> io::Result<FileStream>;
}

/// The root of a tree.
pub trait FileSystem: Send + Sync {
    fn root(&self) -> DirHandle;

    /// `true` if `dir` belongs to this tree.
    fn contains_dir(&self, dir: &dyn Directory) -> bool {
        let root = self.root();
        let Some(mut top) = dir.parent() else {
            return root.same_dir(dir);
        };

        while let Some(parent) = top.parent() {
            top = parent;
        }
        root.same_dir(&*top)
    }

    /// `true` if `file` belongs to this tree.
    fn contains_file(&self, file: &dyn File) -> bool {
        file.parent()
            .is_some_and(|parent| self.contains_dir(&*parent))
    }
}

/// Joins a parent location and a child name into a location.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
