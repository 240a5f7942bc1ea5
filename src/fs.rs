//! Read-only asset volumes.
//!
//! Assets are linked into the firmware (`include_bytes!`) and grouped into
//! labelled partitions. A file is addressed as `/<label>/<relative path>`.
//!
//! ```rust,ignore
//! static SOUNDS: &[(&str, &[u8])] = &[("attack.wav", include_bytes!("attack.wav"))];
//!
//! let mut fs = AssetFs::new();
//! fs.mount(Partition::new("sounds", SOUNDS))?;
//! let file = fs.open("/sounds/attack.wav")?;
//! ```

use alloc::vec::Vec;

use embedded_io::{
    ErrorKind,
    ErrorType,
    Read,
    Seek,
    SeekFrom,
};

/// Partitions mounted at once.
pub const MAX_MOUNTED: usize = 8;
const SEPARATOR: char = '/';

/// Anything tracks can be opened from.
pub trait FileSystem {
    type File: Read + Seek;

    fn open(&self, path: &str) -> Result<Self::File, FsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum FsError {
    /// Not of the form `/<label>/<file>`.
    InvalidPath,
    NotMounted,
    NotFound,
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidPath => f.write_str("invalid path"),
            Self::NotMounted => f.write_str("partition not mounted"),
            Self::NotFound => f.write_str("file not found"),
        }
    }
}

impl core::error::Error for FsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum MountError {
    /// Empty label or a label containing `/`.
    InvalidArgument,
    AlreadyMounted,
    MaxMountedReached,
}

impl core::fmt::Display for MountError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("invalid partition label"),
            Self::AlreadyMounted => f.write_str("partition already mounted"),
            Self::MaxMountedReached => f.write_str("too many mounted partitions"),
        }
    }
}

impl core::error::Error for MountError {}

/// A labelled set of static files.
#[derive(Debug, Clone, Copy)]
pub struct Partition {
    label: &'static str,
    files: &'static [(&'static str, &'static [u8])],
}

impl Partition {
    pub const fn new(label: &'static str, files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { label, files }
    }

    pub const fn label(&self) -> &'static str {
        self.label
    }

    fn find(&self, name: &str) -> Option<&'static [u8]> {
        self.files
            .iter()
            .find(|(file, _)| *file == name)
            .map(|(_, data)| *data)
    }
}

/// Mount table of asset partitions.
#[derive(Debug, Default)]
pub struct AssetFs {
    mounted: Vec<Partition>,
}

impl AssetFs {
    pub const fn new() -> Self {
        Self {
            mounted: Vec::new(),
        }
    }

    pub fn mount(&mut self, partition: Partition) -> Result<(), MountError> {
        if partition.label.is_empty() || partition.label.contains(SEPARATOR) {
            return Err(MountError::InvalidArgument);
        }
        if self.is_mounted(partition.label) {
            return Err(MountError::AlreadyMounted);
        }
        if self.mounted.len() >= MAX_MOUNTED {
            return Err(MountError::MaxMountedReached);
        }
        debug!("mounted /{} ({} files)", partition.label, partition.files.len());
        self.mounted.push(partition);
        Ok(())
    }

    /// Returns `false` when nothing was mounted under `label`.
    pub fn unmount(&mut self, label: &str) -> bool {
        let before = self.mounted.len();
        self.mounted.retain(|partition| partition.label != label);
        before != self.mounted.len()
    }

    pub fn is_mounted(&self, label: &str) -> bool {
        self.mounted.iter().any(|partition| partition.label == label)
    }

    /// Whether `path` names a file on a mounted partition.
    pub fn can_open(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    fn lookup(&self, path: &str) -> Result<&'static [u8], FsError> {
        let (label, name) = path
            .strip_prefix(SEPARATOR)
            .and_then(|rest| rest.split_once(SEPARATOR))
            .filter(|(label, name)| !label.is_empty() && !name.is_empty())
            .ok_or(FsError::InvalidPath)?;

        let partition = self
            .mounted
            .iter()
            .find(|partition| partition.label == label)
            .ok_or(FsError::NotMounted)?;
        partition.find(name).ok_or(FsError::NotFound)
    }
}

impl FileSystem for AssetFs {
    type File = AssetFile;

    fn open(&self, path: &str) -> Result<AssetFile, FsError> {
        self.lookup(path).map(AssetFile::new)
    }
}

/// Read cursor over a static file image.
#[derive(Debug, Clone)]
pub struct AssetFile {
    data: &'static [u8],
    position: u64,
}

impl AssetFile {
    pub const fn new(data: &'static [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ErrorType for AssetFile {
    type Error = ErrorKind;
}

impl Read for AssetFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        let start = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for AssetFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, ErrorKind> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        self.position = target.ok_or(ErrorKind::InvalidInput)?;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SOUNDS: &[(&str, &[u8])] = &[
        ("attack.wav", b"RIFF"),
        ("music/theme.wav", b"0123456789"),
    ];

    fn mounted() -> AssetFs {
        let mut fs = AssetFs::new();
        fs.mount(Partition::new("sounds", SOUNDS)).unwrap();
        fs
    }

    #[test]
    fn opens_nested_paths() {
        let fs = mounted();
        assert!(fs.can_open("/sounds/attack.wav"));
        assert_eq!(fs.open("/sounds/music/theme.wav").unwrap().len(), 10);
    }

    #[test]
    fn open_errors() {
        let fs = mounted();
        assert_eq!(fs.open("sounds/attack.wav").err(), Some(FsError::InvalidPath));
        assert_eq!(fs.open("/sounds/").err(), Some(FsError::InvalidPath));
        assert_eq!(fs.open("/").err(), Some(FsError::InvalidPath));
        assert_eq!(fs.open("/music/attack.wav").err(), Some(FsError::NotMounted));
        assert_eq!(fs.open("/sounds/missing.wav").err(), Some(FsError::NotFound));
    }

    #[test]
    fn mount_table_limits() {
        let mut fs = mounted();
        assert_eq!(
            fs.mount(Partition::new("sounds", &[])),
            Err(MountError::AlreadyMounted)
        );
        assert_eq!(fs.mount(Partition::new("", &[])), Err(MountError::InvalidArgument));
        assert_eq!(fs.mount(Partition::new("a/b", &[])), Err(MountError::InvalidArgument));

        const LABELS: [&str; MAX_MOUNTED - 1] = ["p1", "p2", "p3", "p4", "p5", "p6", "p7"];
        for label in LABELS {
            fs.mount(Partition::new(label, &[])).unwrap();
        }
        assert_eq!(
            fs.mount(Partition::new("extra", &[])),
            Err(MountError::MaxMountedReached)
        );

        assert!(fs.unmount("p3"));
        assert!(!fs.unmount("p3"));
        assert!(!fs.is_mounted("p3"));
        fs.mount(Partition::new("extra", &[])).unwrap();
    }

    #[test]
    fn unmounted_files_cannot_be_opened() {
        let mut fs = mounted();
        fs.unmount("sounds");
        assert!(!fs.can_open("/sounds/attack.wav"));
    }

    #[test]
    fn cursor_reads_and_seeks() {
        let mut file = mounted().open("/sounds/music/theme.wav").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf), Ok(4));
        assert_eq!(&buf, b"0123");

        assert_eq!(file.seek(SeekFrom::Current(4)), Ok(8));
        assert_eq!(file.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"89");
        assert_eq!(file.read(&mut buf), Ok(0));

        assert_eq!(file.seek(SeekFrom::End(-1)), Ok(9));
        assert_eq!(file.seek(SeekFrom::Current(-20)), Err(ErrorKind::InvalidInput));

        assert_eq!(file.seek(SeekFrom::Start(100)), Ok(100));
        assert_eq!(file.read(&mut buf), Ok(0));
    }
}
