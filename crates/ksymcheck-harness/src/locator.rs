//! Locate the kernel image and loadable modules under a directory tree.

use std::path::{Path, PathBuf};

use ksymcheck_core::{AuditError, Binary};

/// File name of the kernel image.
pub const IMAGE_FILE_NAME: &str = "vmlinux";
/// Extension of loadable modules.
pub const MODULE_EXTENSION: &str = "ko";

/// Binaries found under `root`. Module order is traversal order, not sorted.
#[derive(Debug, Clone, Default)]
pub struct BinaryLayout {
    pub root: PathBuf,
    pub image: Option<Binary>,
    pub modules: Vec<Binary>,
}

impl BinaryLayout {
    /// The image, or [`AuditError::ImageNotFound`].
    pub fn require_image(&self) -> Result<&Binary, AuditError> {
        self.image.as_ref().ok_or_else(|| AuditError::ImageNotFound {
            root: self.root.clone(),
        })
    }
}

/// Walk `root` recursively and classify files.
///
/// Symlinked directories are not followed. More than one image is a
/// configuration error.
pub fn locate_binaries(root: &Path) -> Result<BinaryLayout, AuditError> {
    let mut layout = BinaryLayout {
        root: root.to_path_buf(),
        ..BinaryLayout::default()
    };

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)
            .map_err(|e| AuditError::io(&dir, e))?
            .collect::<Result<_, _>>()
            .map_err(|e| AuditError::io(&dir, e))?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| AuditError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !path.is_file() {
                continue;
            }
            if is_image(&path) {
                if let Some(existing) = &layout.image {
                    return Err(AuditError::DuplicateImage {
                        first: existing.path.clone(),
                        second: path,
                    });
                }
                layout.image = Some(Binary::image(path));
            } else if is_module(&path) {
                layout.modules.push(Binary::module(path));
            }
        }
    }

    Ok(layout)
}

fn is_image(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == IMAGE_FILE_NAME)
}

fn is_module(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == MODULE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn finds_image_and_nested_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("vmlinux"));
        touch(&root.join("drivers/net/foo.ko"));
        touch(&root.join("fs/bar.ko"));
        touch(&root.join("fs/bar.ko.cmd"));
        touch(&root.join("vmlinux.o"));
        touch(&root.join("System.map"));

        let layout = locate_binaries(root).unwrap();
        assert_eq!(layout.require_image().unwrap().path, root.join("vmlinux"));

        let mut names: Vec<String> = layout.modules.iter().map(Binary::display_name).collect();
        names.sort();
        assert_eq!(names, vec!["bar.ko", "foo.ko"]);
    }

    #[test]
    fn missing_image_is_an_error_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("foo.ko"));
        let layout = locate_binaries(dir.path()).unwrap();
        assert_eq!(layout.modules.len(), 1);
        assert!(matches!(
            layout.require_image(),
            Err(AuditError::ImageNotFound { .. })
        ));
    }

    #[test]
    fn second_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("vmlinux"));
        touch(&dir.path().join("debug/vmlinux"));
        assert!(matches!(
            locate_binaries(dir.path()),
            Err(AuditError::DuplicateImage { .. })
        ));
    }

    #[test]
    fn directory_named_like_a_module_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("odd.ko")).unwrap();
        touch(&dir.path().join("vmlinux"));
        let layout = locate_binaries(dir.path()).unwrap();
        assert!(layout.modules.is_empty());
    }

    #[test]
    fn unreadable_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_binaries(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
    }
}
