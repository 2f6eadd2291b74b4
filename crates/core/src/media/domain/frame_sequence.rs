use std::path::{Path, PathBuf};

use crate::shared::constants::FRAME_NUMBER_WIDTH;

/// Ordered list of extracted frame files named by their frame number
/// (`0007.png`, `0008.png`, ...).
///
/// Numbers increase strictly but may start anywhere and may have gaps.
/// The first number fixes the playback offset used for audio alignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSequence {
    frames: Vec<(u64, PathBuf)>,
}

impl FrameSequence {
    /// Builds a sequence from arbitrary paths, keeping only files whose stem
    /// is a frame number and ordering them numerically.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut frames: Vec<(u64, PathBuf)> = paths
            .into_iter()
            .filter_map(|p| frame_number(&p).map(|n| (n, p)))
            .collect();
        frames.sort_by_key(|(n, _)| *n);
        frames.dedup_by_key(|(n, _)| *n);
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.frames.iter().map(|(_, p)| p.as_path())
    }

    pub fn to_paths(&self) -> Vec<PathBuf> {
        self.frames.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn first_frame_number(&self) -> Option<u64> {
        self.frames.first().map(|(n, _)| *n)
    }

    pub fn last_frame_number(&self) -> Option<u64> {
        self.frames.last().map(|(n, _)| *n)
    }

    /// Path at position `position` in the sequence, clamped to the last frame.
    pub fn reference_frame(&self, position: usize) -> Option<&Path> {
        let last = self.frames.len().checked_sub(1)?;
        self.frames
            .get(position.min(last))
            .map(|(_, p)| p.as_path())
    }
}

/// Frame number encoded in a frame file name, if the stem is all digits.
pub fn frame_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Zero-padded file name pattern understood by the encoder (`%04d.png`).
pub fn frame_file_pattern(extension: &str) -> String {
    format!("%0{FRAME_NUMBER_WIDTH}d.{extension}")
}

/// File name of frame `number` (`0042.png`).
pub fn frame_file_name(number: u64, extension: &str) -> String {
    format!("{number:0width$}.{extension}", width = FRAME_NUMBER_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/tmp/frames").join(n)).collect()
    }

    #[test]
    fn test_orders_numerically() {
        let seq = FrameSequence::from_paths(paths(&["0010.png", "0007.png", "0009.png", "0008.png"]));
        let names: Vec<_> = seq
            .paths()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0007.png", "0008.png", "0009.png", "0010.png"]);
    }

    #[test]
    fn test_orders_numerically_past_padding_width() {
        let seq = FrameSequence::from_paths(paths(&["10000.png", "9999.png"]));
        assert_eq!(seq.first_frame_number(), Some(9999));
        assert_eq!(seq.last_frame_number(), Some(10000));
    }

    #[test]
    fn test_ignores_non_frame_files() {
        let seq = FrameSequence::from_paths(paths(&["0001.png", "temp.mp4", "notes.txt", "0002.png"]));
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_tolerates_gaps() {
        let seq = FrameSequence::from_paths(paths(&["0003.png", "0010.png"]));
        assert_eq!(seq.first_frame_number(), Some(3));
        assert_eq!(seq.last_frame_number(), Some(10));
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_empty_sequence() {
        let seq = FrameSequence::from_paths(Vec::new());
        assert!(seq.is_empty());
        assert_eq!(seq.first_frame_number(), None);
        assert_eq!(seq.reference_frame(0), None);
    }

    #[rstest]
    #[case(0, "0001.png")]
    #[case(2, "0003.png")]
    #[case(99, "0003.png")]
    fn test_reference_frame_is_clamped(#[case] position: usize, #[case] expected: &str) {
        let seq = FrameSequence::from_paths(paths(&["0001.png", "0002.png", "0003.png"]));
        assert_eq!(
            seq.reference_frame(position).unwrap().file_name().unwrap(),
            expected
        );
    }

    #[rstest]
    #[case("0042.png", Some(42))]
    #[case("0000.jpg", Some(0))]
    #[case("frame_1.png", None)]
    #[case("temp.mp4", None)]
    #[case(".png", None)]
    fn test_frame_number(#[case] name: &str, #[case] expected: Option<u64>) {
        assert_eq!(frame_number(Path::new(name)), expected);
    }

    #[test]
    fn test_file_name_helpers() {
        assert_eq!(frame_file_pattern("png"), "%04d.png");
        assert_eq!(frame_file_name(7, "jpg"), "0007.jpg");
        assert_eq!(frame_file_name(12345, "png"), "12345.png");
    }
}
