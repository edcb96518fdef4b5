use std::collections::{BTreeSet, BinaryHeap};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::warn;
use walkdir::WalkDir;

/// `path` with `suffix` appended to its last component.
pub fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Write `contents` so that `to` is either left untouched or fully replaced:
/// the data goes to a `.tmp` sibling first and is renamed into place.
pub fn write_file_atomically(to: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(to)?;
    let tmp = path_with_suffix(to, ".tmp");
    if let Err(err) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    // On Windows, replace by removing first if necessary
    if cfg!(windows) && to.exists() {
        fs::remove_file(to)?;
    }
    fs::rename(&tmp, to)
}

/// Remove a file, link or directory tree. Links are removed, never followed.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path, _is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Recreate the link at `from` as `to`, pointing at the same target. Dangling
/// links are copied as they are.
pub fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    let points_to_dir = fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false);
    remove_if_exists(to)?;
    ensure_parent_dir(to)?;
    make_symlink(&target, to, points_to_dir)
}

/// Copy a directory tree, leaving out everything `skip(path, is_dir)` rejects
/// and directories left with only rejected entries. Links are copied as
/// links. Returns the number of files and links copied.
pub fn copy_dir_recursive<F>(from: &Path, to: &Path, mut skip: F) -> io::Result<usize>
where
    F: FnMut(&Path, bool) -> bool,
{
    fs::create_dir_all(to)?;
    let mut copied = 0;
    let mut with_rejected: BTreeSet<PathBuf> = BTreeSet::new();

    let walker = WalkDir::new(from).min_depth(1).into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        let rejected = skip(e.path(), e.file_type().is_dir());
        if rejected {
            if let Some(parent) = e.path().parent() {
                with_rejected.insert(parent.to_path_buf());
            }
        }
        !rejected
    });
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let rel = match path.strip_prefix(from) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let dest = to.join(rel);
        let kind = entry.file_type();

        if kind.is_symlink() {
            copy_symlink(path, &dest)?;
            copied += 1;
        } else if kind.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if kind.is_file() {
            ensure_parent_dir(&dest)?;
            fs::copy(path, &dest)?;
            copied += 1;
        }
    }

    // deepest first, so a parent emptied by removing its child is seen too
    let mut pending: BinaryHeap<(usize, PathBuf)> =
        with_rejected.into_iter().map(|p| (p.components().count(), p)).collect();
    while let Some((depth, src_dir)) = pending.pop() {
        let rel = match src_dir.strip_prefix(from) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let dest = to.join(rel);
        if dest.is_dir() && fs::read_dir(&dest)?.next().is_none() {
            fs::remove_dir(&dest)?;
            if let Some(parent) = src_dir.parent() {
                pending.push((depth - 1, parent.to_path_buf()));
            }
        }
    }
    Ok(copied)
}

/// Copy the given relative entries from `from_root` into `to_root`, replacing
/// whatever kind of entry is at the destination.
pub fn copy_selected_files(from_root: &Path, to_root: &Path, rel_paths: &[String]) -> io::Result<()> {
    for rel in rel_paths {
        let src = from_root.join(rel);
        let dest = to_root.join(rel);
        let src_kind = fs::symlink_metadata(&src)?.file_type();
        let dest_kind = fs::symlink_metadata(&dest).ok().map(|m| m.file_type());

        if src_kind.is_symlink() {
            copy_symlink(&src, &dest)?;
        } else if src_kind.is_dir() {
            if dest_kind.is_some_and(|k| !k.is_dir()) {
                fs::remove_file(&dest)?;
            }
            fs::create_dir_all(&dest)?;
        } else {
            if dest_kind.is_some_and(|k| k.is_dir() || k.is_symlink()) {
                remove_if_exists(&dest)?;
            }
            ensure_parent_dir(&dest)?;
            fs::copy(&src, &dest)?;
        }
    }
    Ok(())
}

/// Remove `path` and everything below it that `skip` does not reject.
/// A directory still holding rejected entries is kept. Returns whether
/// `path` is gone.
fn remove_unskipped<F>(path: &Path, skip: &mut F) -> io::Result<bool>
where
    F: FnMut(&Path, bool) -> bool,
{
    if !fs::symlink_metadata(path)?.is_dir() {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let mut emptied = true;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let child = entry.path();
        let is_dir = entry.file_type()?.is_dir();
        if skip(&child, is_dir) || !remove_unskipped(&child, skip)? {
            emptied = false;
        }
    }
    if emptied {
        fs::remove_dir(path)?;
    }
    Ok(emptied)
}

/// Delete the given relative paths under `root`, sparing every entry that
/// `skip(path, is_dir)` rejects. Paths already removed along with a parent
/// directory are ignored.
pub fn delete_selected_paths<F>(root: &Path, rel_paths: &[String], mut skip: F) -> io::Result<()>
where
    F: FnMut(&Path, bool) -> bool,
{
    for rel in rel_paths {
        let path = root.join(rel);
        match fs::symlink_metadata(&path) {
            Ok(_) => {
                remove_unskipped(&path, &mut skip)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Move a fully written `staging` directory to `target`, replacing it. The
/// previous `target` is parked in a `.old` sibling until the new one is in
/// place, and put back if the move fails.
pub fn replace_dir(staging: &Path, target: &Path) -> io::Result<()> {
    let previous = path_with_suffix(target, ".old");
    remove_if_exists(&previous)?;

    let had_previous = fs::symlink_metadata(target).is_ok();
    if had_previous {
        fs::rename(target, &previous)?;
    }
    if let Err(err) = fs::rename(staging, target) {
        if had_previous {
            if let Err(back) = fs::rename(&previous, target) {
                warn!(error = %back, previous = %previous.display(), "could not put previous backup back");
            }
        }
        return Err(err);
    }
    if had_previous {
        if let Err(err) = remove_if_exists(&previous) {
            warn!(error = %err, path = %previous.display(), "stale backup left behind");
        }
    }
    Ok(())
}

/// Matcher for gitignore-style exclusion patterns rooted at `root`.
pub fn exclusion_matcher(root: &Path, patterns: &[String]) -> Result<Gitignore, ignore::Error> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder.add_line(None, pattern)?;
    }
    builder.build()
}
