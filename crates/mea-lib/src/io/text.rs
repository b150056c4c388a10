use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Parse newline-delimited floating point samples, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Read samples from `path`, or from any reader (stdin for the CLI) when no path is given.
pub fn read_f64_input(path: Option<&Path>, mut fallback: impl Read) -> Result<Vec<f64>> {
    match path {
        Some(path) => read_f64_series(path),
        None => {
            let mut text = String::new();
            fallback
                .read_to_string(&mut text)
                .context("failed to read samples from stdin")?;
            parse_f64_series(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skips_blank_and_comment_lines() {
        let out = parse_f64_series("# electrode d4\n1.5\n\n  -2e-3 \n# end\n4\n").unwrap();
        assert_eq!(out, vec![1.5, -2e-3, 4.0]);
    }

    #[test]
    fn reports_the_bad_line() {
        let err = parse_f64_series("1.0\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_f64_series("# nothing\n\n").is_err());
    }

    #[test]
    fn reads_file_before_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.25\n0.5").unwrap();
        let from_file = read_f64_input(Some(file.path()), "9\n".as_bytes()).unwrap();
        assert_eq!(from_file, vec![0.25, 0.5]);
        let from_reader = read_f64_input(None, "9\n".as_bytes()).unwrap();
        assert_eq!(from_reader, vec![9.0]);
    }
}
