use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::media::domain::frame_sequence::{frame_file_pattern, FrameSequence};
use crate::shared::constants::{TEMP_DIRECTORY, TEMP_VIDEO_FILE};
use crate::shared::run_config::TempFrameFormat;

/// Per-input scratch directory holding extracted frames and the
/// intermediate muxed video: `<input-dir>/temp/<input-stem>/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempWorkspace {
    directory: PathBuf,
    frame_format: TempFrameFormat,
}

impl TempWorkspace {
    pub fn for_input(input_path: &Path, frame_format: TempFrameFormat) -> Self {
        let parent = input_path.parent().unwrap_or_else(|| Path::new(""));
        let stem = input_path.file_stem().unwrap_or_default();
        Self {
            directory: parent.join(TEMP_DIRECTORY).join(stem),
            frame_format,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn output_video_path(&self) -> PathBuf {
        self.directory.join(TEMP_VIDEO_FILE)
    }

    pub fn frame_pattern_path(&self) -> PathBuf {
        self.directory
            .join(frame_file_pattern(self.frame_format.extension()))
    }

    pub fn exists(&self) -> bool {
        self.directory.is_dir()
    }

    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.directory)
    }

    /// Frame files currently in the workspace, in frame-number order.
    pub fn frames(&self) -> io::Result<FrameSequence> {
        let extension = self.frame_format.extension();
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));
            if matches && path.is_file() {
                paths.push(path);
            }
        }
        Ok(FrameSequence::from_paths(paths))
    }

    pub fn has_frames(&self) -> bool {
        self.frames().map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// Moves the intermediate video to `output_path`, replacing any
    /// existing file there.
    pub fn move_output_to(&self, output_path: &Path) -> io::Result<()> {
        move_file(&self.output_video_path(), output_path)
    }

    /// Removes the workspace unless `keep_frames`, then removes the shared
    /// `temp` parent if nothing else is left in it.
    pub fn clean(&self, keep_frames: bool) -> io::Result<()> {
        if !keep_frames && self.directory.is_dir() {
            fs::remove_dir_all(&self.directory)?;
        }
        if let Some(parent) = self.directory.parent() {
            let is_empty = fs::read_dir(parent)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                fs::remove_dir(parent)?;
            }
        }
        Ok(())
    }
}

/// Replaces `to` with `from`. Falls back to copy-and-delete when a rename
/// crosses filesystems.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if to.is_file() {
        fs::remove_file(to)?;
    }
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
