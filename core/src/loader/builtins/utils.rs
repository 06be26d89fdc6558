use glob::glob;
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

/// Expands glob patterns into files, walking matched directories recursively.
///
/// Results keep pattern order, each directory is walked in file-name order and
/// files matched more than once are only returned the first time.
pub(super) fn resolve_input_to_files(inputs: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut push = |path: PathBuf| {
        if !files.contains(&path) {
            files.push(path);
        }
    };

    for input in inputs {
        let entries = match glob(input) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %input, error = %e, "invalid glob pattern");
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_dir() => {
                    for entry in WalkDir::new(&path).sort_by_file_name() {
                        match entry {
                            Ok(entry) if entry.file_type().is_file() => {
                                push(entry.path().to_path_buf());
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "failed to walk directory"),
                        }
                    }
                }
                Ok(path) if path.is_file() => push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "glob error"),
            }
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("a.csv"), "x").unwrap();
        std::fs::write(nested.join("b.csv"), "y").unwrap();
        std::fs::write(nested.join("c.txt"), "z").unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let files = resolve_input_to_files(&[format!("{root}/*.csv"), format!("{root}/nested")]);
        assert_eq!(
            files,
            vec![dir.path().join("a.csv"), nested.join("b.csv"), nested.join("c.txt")]
        );

        let files = resolve_input_to_files(&[format!("{root}/**/*.csv"), format!("{root}/a.csv")]);
        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("a.csv")));
        assert!(files.contains(&nested.join("b.csv")));
    }
}
