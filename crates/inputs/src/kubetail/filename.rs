//! Container log filename grammar
//!
//! The runtime writes one file per container as
//! `<pod>_<namespace>_<container>-<64-hex-id>.log`, where `<pod>` is a
//! DNS-style label sequence. Anything else in the directory is ignored.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<pod>([a-z0-9][-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*)_(?P<namespace>[^_]+)_(?P<container>.+)-(?P<id>[a-z0-9]{64})\.log$",
    )
    .expect("filename grammar is a valid regex")
});

/// The pieces of a container log filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogFileName {
    pub pod: String,
    pub namespace: String,
    pub container: String,
    pub id: String,
}

/// Parse a path's file name against the grammar. `None` means the file
/// is not a container log and gets no watcher.
pub(crate) fn parse(path: &Path) -> Option<LogFileName> {
    let name = path.file_name()?.to_str()?;
    let captures = FILE_NAME.captures(name)?;
    Some(LogFileName {
        pod: captures.name("pod")?.as_str().to_string(),
        namespace: captures.name("namespace")?.as_str().to_string(),
        container: captures.name("container")?.as_str().to_string(),
        id: captures.name("id")?.as_str().to_string(),
    })
}

#[cfg(test)]
#[path = "filename_test.rs"]
mod filename_test;
