use std::path::Path;
use walkdir::WalkDir;

/// List of clip file extensions the decoder is built with
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// Scanner for finding playable clips in the clip directory
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Scan a directory recursively and return clip names relative to it, sorted
    pub fn scan<P: AsRef<Path>>(directory: P) -> Result<Vec<String>, anyhow::Error> {
        let root = directory.as_ref();
        if !root.is_dir() {
            anyhow::bail!("clip directory {:?} does not exist", root);
        }

        let mut clips = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            if !path.is_file() || !Self::is_supported(path) {
                continue;
            }

            if let Ok(relative) = path.strip_prefix(root) {
                clips.push(Self::clip_name(relative));
            }
        }

        clips.sort();
        Ok(clips)
    }

    fn is_supported(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }

    // Clip names use '/' separators, the same form a payload carries
    fn clip_name(relative: &Path) -> String {
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_finds_supported_clips() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hi.mp3"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("extra")).unwrap();
        fs::write(dir.path().join("extra").join("Boop.WAV"), b"x").unwrap();

        let clips = DirectoryScanner::scan(dir.path()).unwrap();
        assert_eq!(clips, vec!["extra/Boop.WAV", "hi.mp3"]);
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryScanner::scan(dir.path().join("nope")).is_err());
    }
}
