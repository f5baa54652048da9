//! High-level [`Archive`] API — the primary embedding surface.
//!
//! ```no_run
//! use star::archive::Archive;
//!
//! // Write
//! let mut ar = Archive::open("bundle.star")?;
//! ar.append("readme.txt", b"Hello, world!")?;
//!
//! // Read
//! let data = ar.read_member("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), star::StarError>(())
//! ```
//!
//! An `Archive` wraps the [`Container`] engine around a [`File`] and holds an
//! exclusive advisory lock on it for the lifetime of the handle, released on
//! every exit path when the handle drops. The engine assumes one writer at a
//! time; the lock enforces that across processes.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::container::{AppendOutcome, Container, DeleteOutcome, PackOutcome, Placement};
use crate::error::{Result, StarError};
use crate::free_table::FreeRange;
use crate::layout::FileInfo;
use crate::report::Reporter;

// ── CreateReport ─────────────────────────────────────────────────────────────

/// Partial-success report from [`Archive::create`]. Member files that could
/// not be read are skipped and enumerated here; the container's `num_files`
/// reflects the records actually written, never the declared input count.
#[derive(Debug, Default)]
pub struct CreateReport {
    pub written: Vec<String>,
    pub skipped: Vec<(PathBuf, io::Error)>,
}

impl CreateReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

// ── Archive ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    container: Container<File>,
    reporter: Reporter,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, Reporter::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, reporter: Reporter) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.try_lock_exclusive()?;
        let container = Container::open(file)?;
        reporter.simple(format!("opened {}", path.display()));
        Ok(Self {
            path,
            container,
            reporter,
        })
    }

    /// Create (or overwrite) an archive from the given member files. An
    /// unreadable member is diagnosed and skipped, not fatal; see
    /// [`CreateReport`].
    pub fn create<P: AsRef<Path>>(
        path: P,
        members: &[PathBuf],
        reporter: Reporter,
    ) -> Result<(Self, CreateReport)> {
        let path = path.as_ref().to_owned();
        let mut report = CreateReport::default();
        let mut payload: Vec<(String, Vec<u8>)> = Vec::new();

        for member in members {
            match fs::read(member) {
                Ok(data) => {
                    let name = member_name(member)?;
                    reporter.detailed(format!("read {} ({} bytes)", member.display(), data.len()));
                    report.written.push(name.clone());
                    payload.push((name, data));
                }
                Err(err) => {
                    reporter.simple(format!("cannot read {}: {}", member.display(), err));
                    report.skipped.push((member.clone(), err));
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.try_lock_exclusive()?;
        let container = Container::create(file, &payload)?;
        reporter.simple(format!(
            "created {} with {} member(s)",
            path.display(),
            payload.len()
        ));

        Ok((
            Self {
                path,
                container,
                reporter,
            },
            report,
        ))
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Append a member file, named by its final path component.
    pub fn append_path(&mut self, member: &Path) -> Result<AppendOutcome> {
        let data = fs::read(member)?;
        let name = member_name(member)?;
        self.append(&name, &data)
    }

    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<AppendOutcome> {
        let outcome = self.container.append(name, data)?;
        self.report_placement(name, &outcome);
        Ok(outcome)
    }

    pub fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        let outcome = self.container.delete(name)?;
        self.reporter.simple(format!("deleted {}", name));
        self.reporter.detailed(format!(
            "freed {} bytes at offset {}",
            outcome.freed.size, outcome.freed.start
        ));
        Ok(outcome)
    }

    /// Replace a member's contents with the current contents of `member`.
    pub fn update_path(&mut self, member: &Path) -> Result<AppendOutcome> {
        let data = fs::read(member)?;
        let name = member_name(member)?;
        self.update(&name, &data)
    }

    pub fn update(&mut self, name: &str, data: &[u8]) -> Result<AppendOutcome> {
        let outcome = self.container.update(name, data)?;
        self.report_placement(name, &outcome);
        Ok(outcome)
    }

    /// Defragment the container and truncate the file to its new length.
    pub fn pack(&mut self) -> Result<PackOutcome> {
        let outcome = self.container.defragment()?;
        self.container.get_mut().set_len(outcome.new_len)?;
        self.reporter.simple(format!(
            "packed {}: kept {} member(s), reclaimed {} bytes",
            self.path.display(),
            outcome.records_kept,
            outcome.bytes_reclaimed
        ));
        Ok(outcome)
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    pub fn list(&mut self) -> Result<Vec<FileInfo>> {
        self.container.list()
    }

    pub fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        self.container.read_file(name)
    }

    /// Extract one member into `dest`, creating the directory if necessary.
    pub fn extract<P: AsRef<Path>>(&mut self, name: &str, dest: P) -> Result<PathBuf> {
        let dest = dest.as_ref();
        if !dest.exists() {
            fs::create_dir_all(dest)?;
        }
        let data = self.container.read_file(name)?;
        let target = dest.join(name);
        fs::write(&target, &data)?;
        self.reporter.simple(format!("extracted {}", name));
        Ok(target)
    }

    /// Extract every active member into `dest`, creating it if necessary.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest: P) -> Result<Vec<PathBuf>> {
        let dest = dest.as_ref();
        if !dest.exists() {
            fs::create_dir_all(dest)?;
        }
        let members = self.container.read_all()?;
        let mut written = Vec::with_capacity(members.len());
        for (info, data) in members {
            let target = dest.join(&info.name);
            fs::write(&target, &data)?;
            self.reporter.simple(format!("extracted {}", info.name));
            written.push(target);
        }
        Ok(written)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn free_spaces(&self) -> &[FreeRange] {
        self.container.free_table().ranges()
    }

    pub fn container(&mut self) -> &mut Container<File> {
        &mut self.container
    }

    fn report_placement(&self, name: &str, outcome: &AppendOutcome) {
        self.reporter.simple(format!("added {}", name));
        match outcome.placement {
            Placement::Reused => self.reporter.detailed(format!(
                "reused free range at offset {}",
                outcome.header_offset
            )),
            Placement::EndOfFile => self.reporter.detailed(format!(
                "extended container at offset {}",
                outcome.header_offset
            )),
        }
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(self.container.get_ref());
    }
}

fn member_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StarError::InvalidName(path.display().to_string()))
}
