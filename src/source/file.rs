//! Local file acquisition.
//!
//! Only presence is checked; format and size are left to the service.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Raw bytes and display name of a chosen file.
#[derive(Clone, Debug)]
pub struct ChosenFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn read_chosen_file(path: &Path) -> Result<ChosenFile> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("no file selected"));
    }
    if path.is_dir() {
        return Err(anyhow!("{} is a directory, not an image file", path.display()));
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("read selected file {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ChosenFile { filename, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_bytes_and_basename() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dog.png");
        std::fs::File::create(&path)?.write_all(b"not-really-a-png")?;

        let chosen = read_chosen_file(&path)?;
        assert_eq!(chosen.filename, "dog.png");
        assert_eq!(chosen.bytes, b"not-really-a-png");
        Ok(())
    }

    #[test]
    fn missing_file_and_directory_are_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(read_chosen_file(&dir.path().join("missing.jpg")).is_err());
        assert!(read_chosen_file(dir.path()).is_err());
        assert!(read_chosen_file(Path::new("")).is_err());
        Ok(())
    }
}
