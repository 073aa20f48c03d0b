use crate::error::{ExpandError, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

/// Path that stands for stdin when reading a template
pub const STDIN_PATH: &str = "-";

/// Reads a template as raw bytes, `-` reads stdin
///
/// # Errors
///
/// - `ExpandError::FileNotFound` if the path doesn't exist or isn't a file.
/// - `ExpandError::Io` if there's an error reading the file or stdin.
pub fn read_template(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new(STDIN_PATH) {
        let mut buffer = Vec::new();
        io::stdin().lock().read_to_end(&mut buffer)?;
        return Ok(buffer);
    }

    if !path.is_file() {
        return Err(ExpandError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    fs::read(path).map_err(Into::into)
}

/// Writes expanded content to `path`, or to stdout when there is none
///
/// # Errors
///
/// Returns `ExpandError::Io` if writing fails.
pub fn write_output(path: Option<&Path>, content: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
