use anyhow::{Context, Result, bail};
use std::fs;
use std::io::{self, Read};

const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB

/// Reads the lines to translate from a file or stdin.
pub struct InputReader;

impl InputReader {
    /// Reads `file_path`, or stdin when it is `None` or `-`.
    pub fn read(file_path: Option<&str>) -> Result<String> {
        match file_path {
            None | Some("-") => Self::read_stdin(),
            Some(path) => Self::read_file(path),
        }
    }

    /// Reads the input and splits it into lines, keeping blank ones so the
    /// output lines up with the input.
    pub fn read_lines(file_path: Option<&str>) -> Result<Vec<String>> {
        Ok(split_lines(&Self::read(file_path)?))
    }

    fn read_file(path: &str) -> Result<String> {
        let metadata =
            fs::metadata(path).with_context(|| format!("Failed to access file: {path}"))?;

        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > MAX_INPUT_SIZE {
            bail!(too_large(size, "file"));
        }

        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))
    }

    #[allow(clippy::significant_drop_tightening)]
    fn read_stdin() -> Result<String> {
        let mut buffer = Vec::new();
        let mut stdin = io::stdin().lock().take(MAX_INPUT_SIZE as u64 + 1);
        stdin
            .read_to_end(&mut buffer)
            .context("Failed to read from stdin")?;

        if buffer.len() > MAX_INPUT_SIZE {
            bail!(too_large(buffer.len(), "input"));
        }

        String::from_utf8(buffer).context("Input is not valid UTF-8")
    }
}

fn too_large(size: usize, what: &str) -> String {
    #[allow(clippy::cast_precision_loss)]
    let megabytes = size as f64 / 1024.0 / 1024.0;
    format!(
        "Input size ({megabytes:.1} MB) exceeds maximum allowed size (1 MB).\n\n\
         Consider splitting the {what} into smaller parts."
    )
}

/// Splits on `\n`, dropping a trailing `\r` from each line and the empty
/// line after a final newline.
fn split_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_read_lines_keeps_blank_lines() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "Hello\n\nWorld\n").unwrap();

        let lines = InputReader::read_lines(Some(temp_file.path().to_str().unwrap())).unwrap();
        assert_eq!(lines, vec!["Hello", "", "World"]);
    }

    #[test]
    fn test_read_nonexistent_file() {
        let err = InputReader::read(Some("/nonexistent/path/to/file.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to access file"));
    }

    #[test]
    fn test_read_file_unicode() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let content = "§6Sword of Light\n✦ +5 Strength";
        write!(temp_file, "{content}").unwrap();

        let result = InputReader::read(Some(temp_file.path().to_str().unwrap())).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_crlf_line_endings() {
        assert_eq!(split_lines("a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input_has_no_lines() {
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_read_file_exceeds_max_size() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("large_file.txt");
        fs::write(&file_path, "x".repeat(MAX_INPUT_SIZE + 1)).unwrap();

        let err = InputReader::read(Some(file_path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_read_file_at_max_size() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("max_file.txt");
        fs::write(&file_path, "x".repeat(MAX_INPUT_SIZE)).unwrap();

        let result = InputReader::read(Some(file_path.to_str().unwrap())).unwrap();
        assert_eq!(result.len(), MAX_INPUT_SIZE);
    }
}
