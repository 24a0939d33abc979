use std::{
    env,
    path::{Path, PathBuf},
};

/// Locate an executable in the working directory or on `PATH`.
///
/// Names containing a path separator are only checked as given.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let bin = if cfg!(target_os = "windows") && !name.ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_owned()
    };

    if Path::new(&bin).is_file() {
        return Some(PathBuf::from(bin));
    }

    if bin.contains('/') || bin.contains('\\') {
        return None;
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|x| x.join(&bin))
            .find(|x| x.is_file())
    })
}

/// Replace path separators and characters reserved on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    let name = name
        .chars()
        .map(|x| match x {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            x if x.is_control() => '_',
            x => x,
        })
        .collect::<String>();
    let name = name.trim().trim_end_matches('.').trim();

    if name.is_empty() {
        "untitled".to_owned()
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Stalker (1979)"), "Stalker (1979)");
        assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(sanitize_filename("  ...  "), "untitled");
        assert_eq!(sanitize_filename("Mr. Klein."), "Mr. Klein");
    }

    #[test]
    fn test_find_binary_missing() {
        assert!(find_binary("surely-not-an-installed-binary-4f1c").is_none());
        assert!(find_binary("./surely/not/here").is_none());
    }
}
