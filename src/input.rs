use std::fs::File;
use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};

/// Open the archive source: the file at `path`, or stdin when `path` is `-`.
/// Reading a tar from an interactive terminal is refused up front.
pub fn open(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            anyhow::bail!(
                "stdin is a terminal; pipe a `docker save` archive in or pass a file path"
            );
        }
        return Ok(Box::new(stdin));
    }

    let file =
        File::open(path).with_context(|| format!("Failed to open {path}"))?;
    Ok(Box::new(file))
}
