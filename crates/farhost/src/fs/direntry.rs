//! An in-memory, once-sorted directory listing.

use std::collections::VecDeque;

use super::info::FileInfo;

/// Directory entries sorted directories-first, then alphabetically within
/// each group. Entries are popped in batches or iterated.
#[derive(Debug, Default)]
pub struct DirEntryBuffer {
    entries: VecDeque<FileInfo>,
}

impl DirEntryBuffer {
    pub(crate) fn new(mut entries: Vec<FileInfo>) -> Self {
        entries.sort_by(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.name().cmp(b.name()))
        });
        Self {
            entries: entries.into(),
        }
    }

    /// Pops up to `n` entries; `n <= 0` pops all remaining. `None` when
    /// the buffer is exhausted.
    pub fn next_batch(&mut self, n: i64) -> Option<Vec<FileInfo>> {
        if self.entries.is_empty() {
            return None;
        }
        let take = if n <= 0 {
            self.entries.len()
        } else {
            (n as usize).min(self.entries.len())
        };
        Some(self.entries.drain(..take).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Iterator for DirEntryBuffer {
    type Item = FileInfo;

    fn next(&mut self) -> Option<FileInfo> {
        self.entries.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mode::FileMode;
    use time::OffsetDateTime;

    fn entry(name: &str, dir: bool) -> FileInfo {
        let mode = if dir {
            FileMode::new(FileMode::DIR | 0o755)
        } else {
            FileMode::new(0o100644)
        };
        FileInfo::new(name, format!("/x/{name}"), 0, mode, OffsetDateTime::UNIX_EPOCH)
    }

    fn names(infos: &[FileInfo]) -> Vec<&str> {
        infos.iter().map(|i| i.name()).collect()
    }

    #[test]
    fn test_sort_dirs_first_then_alphabetical() {
        let mut buf = DirEntryBuffer::new(vec![
            entry("zeta", false),
            entry("beta", true),
            entry("alpha", false),
            entry("delta", true),
        ]);
        let all = buf.next_batch(-1).unwrap();
        assert_eq!(names(&all), vec!["beta", "delta", "alpha", "zeta"]);
        assert!(buf.next_batch(-1).is_none());
    }

    #[test]
    fn test_batched_pop() {
        let mut buf = DirEntryBuffer::new(vec![
            entry("a", false),
            entry("b", false),
            entry("c", false),
        ]);
        assert_eq!(names(&buf.next_batch(2).unwrap()), vec!["a", "b"]);
        assert_eq!(names(&buf.next_batch(2).unwrap()), vec!["c"]);
        assert!(buf.next_batch(2).is_none());
    }

    #[test]
    fn test_iteration() {
        let buf = DirEntryBuffer::new(vec![entry("b", false), entry("a", true)]);
        let collected: Vec<String> = buf.map(|e| e.name().to_string()).collect();
        assert_eq!(collected, vec!["a", "b"]);
    }
}
