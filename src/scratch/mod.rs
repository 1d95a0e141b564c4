// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scratch space for intermediate data products.
//!
//! A [`ScratchArea`] owns a uniquely-named run directory underneath a
//! user-supplied parent (typically node-local disk). Stages allocate
//! [`ScratchHandle`]s inside it; a handle removes its path when dropped, so
//! scratch is released on every exit path, including errors. A handle whose
//! contents are still needed after its stage (e.g. a combined measurement set
//! recorded in a work unit's metadata) is [persisted](ScratchHandle::persist),
//! which defers its removal to [`ScratchArea::teardown`].


use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace, warn};
use thiserror::Error;

#[derive(Debug)]
struct Inner {
    run_dir: PathBuf,
    counter: AtomicUsize,
    deferred: Mutex<Vec<PathBuf>>,
    retain: AtomicCell<bool>,
    torn_down: AtomicCell<bool>,
}

/// A run-wide scratch directory. Cheap to clone; all clones share the same
/// allocation namespace.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Dir,
    File,
}

impl ScratchArea {
    /// Create a fresh run directory inside `parent`. `parent` is created if it
    /// doesn't exist.
    pub fn new<P: AsRef<Path>>(parent: P) -> Result<ScratchArea, ScratchError> {
        let parent = parent.as_ref();
        fs::create_dir_all(parent).map_err(|e| ScratchError::from_io(parent, e))?;
        let pid = std::process::id();
        let mut attempt = 0;
        let run_dir = loop {
            let candidate = parent.join(format!("rsm_imaging.{pid}.{attempt}"));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(ScratchError::from_io(&candidate, e)),
            }
        };
        debug!("Using scratch directory {}", run_dir.display());

        Ok(ScratchArea {
            inner: Arc::new(Inner {
                run_dir,
                counter: AtomicUsize::new(0),
                deferred: Mutex::new(vec![]),
                retain: AtomicCell::new(false),
                torn_down: AtomicCell::new(false),
            }),
        })
    }

    /// The directory that all allocations live in.
    pub fn run_dir(&self) -> &Path {
        &self.inner.run_dir
    }

    /// Keep everything on disk (including the run directory) for debugging.
    pub fn retain_all(&self, retain: bool) {
        self.inner.retain.store(retain);
    }

    pub fn retains_all(&self) -> bool {
        self.inner.retain.load()
    }

    /// Allocate a new, empty directory.
    pub fn allocate_dir(&self, label: &str) -> Result<ScratchHandle, ScratchError> {
        self.allocate(label, HandleKind::Dir)
    }

    /// Allocate a new, empty file.
    pub fn allocate_file(&self, label: &str) -> Result<ScratchHandle, ScratchError> {
        self.allocate(label, HandleKind::File)
    }

    fn allocate(&self, label: &str, kind: HandleKind) -> Result<ScratchHandle, ScratchError> {
        loop {
            // The counter makes names unique within this area; the creation
            // itself is atomic, so anything else squatting on a name is skipped
            // rather than shared.
            let n = self.inner.counter.fetch_add(1, Ordering::Relaxed);
            let path = self.inner.run_dir.join(format!("{label}.{n}"));
            let result = match kind {
                HandleKind::Dir => fs::create_dir(&path),
                HandleKind::File => fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map(|_| ()),
            };
            match result {
                Ok(()) => {
                    trace!("Allocated scratch {}", path.display());
                    return Ok(ScratchHandle {
                        path,
                        kind,
                        area: Arc::clone(&self.inner),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ScratchError::from_io(&path, e)),
            }
        }
    }

    /// Remove all persisted allocations and the run directory itself. This is
    /// also done when the last clone of the area is dropped.
    pub fn teardown(&self) -> Result<(), ScratchError> {
        self.inner.teardown()
    }
}

impl Inner {
    fn teardown(&self) -> Result<(), ScratchError> {
        if self.torn_down.swap(true) {
            return Ok(());
        }
        let deferred = std::mem::take(&mut *self.deferred.lock().unwrap());
        if self.retain.load() {
            debug!(
                "Retaining scratch directory {} ({} persisted entries)",
                self.run_dir.display(),
                deferred.len()
            );
            return Ok(());
        }
        for path in deferred {
            remove_path(&path)?;
        }
        remove_path(&self.run_dir)?;
        debug!("Removed scratch directory {}", self.run_dir.display());
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Couldn't clean up scratch: {e}");
        }
    }
}

fn remove_path(path: &Path) -> Result<(), ScratchError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        // Someone else (e.g. a tool overwriting its output) already removed it.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ScratchError::from_io(path, e)),
    }
}

/// A directory or file inside a [`ScratchArea`]. It is removed when dropped,
/// unless it has been persisted or the area retains everything.
#[derive(Debug)]
pub struct ScratchHandle {
    path: PathBuf,
    kind: HandleKind,
    area: Arc<Inner>,
    released: bool,
}

impl ScratchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.kind == HandleKind::Dir
    }

    /// A path inside this (directory) handle. Nothing is created.
    pub fn join<P: AsRef<Path>>(&self, p: P) -> PathBuf {
        self.path.join(p)
    }

    /// Remove the path now, reporting any error.
    pub fn release(mut self) -> Result<(), ScratchError> {
        self.released = true;
        if self.area.retain.load() {
            return Ok(());
        }
        trace!("Releasing scratch {}", self.path.display());
        remove_path(&self.path)
    }

    /// Hand ownership of the path to the scratch area; it will be removed at
    /// teardown instead of when this handle goes away.
    pub fn persist(mut self) -> PathBuf {
        self.released = true;
        let path = std::mem::take(&mut self.path);
        self.area.deferred.lock().unwrap().push(path.clone());
        path
    }
}

impl Drop for ScratchHandle {
    fn drop(&mut self) {
        if self.released || self.area.retain.load() {
            return;
        }
        if let Err(e) = remove_path(&self.path) {
            warn!("{e}");
        }
    }
}

impl AsRef<Path> for ScratchHandle {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("Scratch IO error on {path:?}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ScratchError {
    fn from_io(path: &Path, source: std::io::Error) -> ScratchError {
        ScratchError::IO {
            path: path.to_path_buf(),
            source,
        }
    }
}
