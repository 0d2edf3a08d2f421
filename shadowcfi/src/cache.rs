//! Process-global, file-backed analysis cache (§5).
//!
//! Records are `library_path%function,reg1:reg2:…` lines. Readers tolerate
//! a missing or malformed file by starting from an empty cache; writers
//! take an exclusive OS advisory lock on the file for the duration of the
//! rewrite. Locking is implemented directly over `libc::flock` — the
//! library is already a dependency for every other raw-syscall need in this
//! crate, so no separate file-locking crate is pulled in for this alone.

use crate::error::IoFailure;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default)]
pub struct SharedLibraryEntry {
    pub path: String,
    pub register_usage: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct AnalysisCache {
    entries: BTreeMap<String, SharedLibraryEntry>,
    path: PathBuf,
}

fn flock(file: &File, op: libc::c_int) -> bool {
    // SAFETY: `file` owns a valid fd for the duration of this call.
    unsafe { libc::flock(file.as_raw_fd(), op) == 0 }
}

impl AnalysisCache {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cache at `path`. A missing or malformed file yields an
    /// empty cache rather than a hard error, per §5's tolerant-read policy.
    pub fn load(path: PathBuf) -> Self {
        let mut cache = Self {
            entries: BTreeMap::new(),
            path: path.clone(),
        };
        let Ok(mut file) = File::open(&path) else {
            log::info!("no analysis cache at {}, starting empty", path.display());
            return cache;
        };
        if !flock(&file, libc::LOCK_SH) {
            log::warn!("could not acquire shared lock on {}, reading anyway", path.display());
        }
        let mut contents = String::new();
        if file.read_to_string(&mut contents).is_err() {
            log::warn!("cache file {} unreadable, starting empty", path.display());
            return cache;
        }
        for line in contents.lines() {
            match parse_record(line) {
                Some((lib, func, regs)) => {
                    cache
                        .entries
                        .entry(lib.clone())
                        .or_insert_with(|| SharedLibraryEntry {
                            path: lib,
                            register_usage: BTreeMap::new(),
                        })
                        .register_usage
                        .insert(func, regs);
                }
                None => {
                    log::warn!("skipping malformed cache record: {line}");
                }
            }
        }
        cache
    }

    pub fn get(&self, lib_path: &str, func: &str) -> Option<&[String]> {
        self.entries
            .get(lib_path)
            .and_then(|e| e.register_usage.get(func))
            .map(|v| v.as_slice())
    }

    pub fn set(&mut self, lib_path: &str, func: &str, regs: Vec<String>) {
        self.entries
            .entry(lib_path.to_owned())
            .or_insert_with(|| SharedLibraryEntry {
                path: lib_path.to_owned(),
                register_usage: BTreeMap::new(),
            })
            .register_usage
            .insert(func.to_owned(), regs);
    }

    /// Whole-file rewrite under an exclusive advisory lock.
    pub fn flush(&self) -> Result<(), IoFailure> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| IoFailure::Open {
                path: self.path.display().to_string(),
                source,
            })?;
        if !flock(&file, libc::LOCK_EX) {
            return Err(IoFailure::Lock {
                path: self.path.display().to_string(),
            });
        }
        let mut out = String::new();
        for entry in self.entries.values() {
            for (func, regs) in &entry.register_usage {
                out.push_str(&entry.path);
                out.push('%');
                out.push_str(func);
                out.push(',');
                out.push_str(&regs.join(":"));
                out.push('\n');
            }
        }
        let result = file.write_all(out.as_bytes());
        let _ = flock(&file, libc::LOCK_UN);
        result.map_err(|source| IoFailure::Open {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn parse_record(line: &str) -> Option<(String, String, Vec<String>)> {
    if line.trim().is_empty() {
        return None;
    }
    let (lib, rest) = line.split_once('%')?;
    let (func, regs) = rest.split_once(',')?;
    let regs = if regs.is_empty() {
        Vec::new()
    } else {
        regs.split(':').map(|s| s.to_owned()).collect()
    };
    Some((lib.to_owned(), func.to_owned(), regs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_record() {
        let (lib, func, regs) = parse_record("/lib/libc.so.6%strlen,RBX:R12").unwrap();
        assert_eq!(lib, "/lib/libc.so.6");
        assert_eq!(func, "strlen");
        assert_eq!(regs, vec!["RBX".to_owned(), "R12".to_owned()]);
    }

    #[test]
    fn rejects_malformed_record() {
        assert!(parse_record("not-a-record-at-all").is_none());
    }

    #[test]
    fn missing_file_yields_empty_cache() {
        let cache = AnalysisCache::load(PathBuf::from("/nonexistent/path/shadowcfi.cache"));
        assert!(cache.get("anything", "anything").is_none());
    }
}
