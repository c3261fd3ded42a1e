//! Extension-based language tagging and the enrichability filter.

use std::path::Path;

/// Extensions (without the dot) whose files are sent to the summarizer.
pub const DEFAULT_ENRICH_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "java", "cpp", "hpp", "c", "h", "go", "rs", "php", "rb",
];

/// Directory names that are never enriched and never listed.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    "__pycache__",
    "dist",
    "build",
    ".next",
    "coverage",
];

/// Lowercased extension of `path`, without the leading dot.
pub fn file_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Language tag stored on a file record. Files are tagged by their
/// extension so `--skip-types py,md` can filter on it directly.
pub fn detect_language(path: &str) -> Option<String> {
    file_extension(path)
}

/// Human-readable name for a language tag, used in CLI output.
pub fn display_name(tag: &str) -> &str {
    match tag {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "jsx" => "JavaScript (JSX)",
        "ts" => "TypeScript",
        "tsx" => "TypeScript (TSX)",
        "java" => "Java",
        "cpp" | "cc" | "cxx" => "C++",
        "c" => "C",
        "h" | "hpp" => "C/C++ Header",
        "go" => "Go",
        "rb" => "Ruby",
        "php" => "PHP",
        "md" | "markdown" => "Markdown",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        other => other,
    }
}

/// True if any directory component of `path` is in `skip_dirs`.
pub fn in_skipped_dir<S: AsRef<str>>(path: &str, skip_dirs: &[S]) -> bool {
    let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    // last component is the file name
    components.pop();
    components
        .iter()
        .any(|c| skip_dirs.iter().any(|d| d.as_ref() == *c))
}

/// Whether a path qualifies for AI enrichment.
pub fn is_enrichable<S: AsRef<str>, T: AsRef<str>>(
    path: &str,
    extensions: &[S],
    skip_dirs: &[T],
) -> bool {
    if in_skipped_dir(path, skip_dirs) {
        return false;
    }
    match file_extension(path) {
        Some(ext) => extensions
            .iter()
            .any(|e| e.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file_extension("src/Main.PY"), Some("py".to_string()));
        assert_eq!(file_extension("Makefile"), None);
        assert_eq!(detect_language("a/b/c.tsx"), Some("tsx".to_string()));
    }

    #[test]
    fn enrichable_defaults() {
        let ext = DEFAULT_ENRICH_EXTENSIONS;
        let dirs = DEFAULT_SKIP_DIRS;
        assert!(is_enrichable("src/app.py", ext, dirs));
        assert!(is_enrichable("lib/x.RS", ext, dirs));
        assert!(!is_enrichable("README.md", ext, dirs));
        assert!(!is_enrichable("node_modules/react/index.js", ext, dirs));
        assert!(!is_enrichable("web/dist/bundle.js", ext, dirs));
    }

    #[test]
    fn skip_dirs_match_whole_components() {
        let dirs = DEFAULT_SKIP_DIRS;
        assert!(!in_skipped_dir("src/buildings.py", dirs));
        assert!(!in_skipped_dir("build.rs", dirs));
        assert!(in_skipped_dir("build/out.rs", dirs));
    }

    #[test]
    fn configured_extensions_accept_leading_dot() {
        let ext = vec![".kt".to_string()];
        assert!(is_enrichable("Main.kt", &ext, DEFAULT_SKIP_DIRS));
    }

    #[test]
    fn display_names() {
        assert_eq!(display_name("py"), "Python");
        assert_eq!(display_name("zig"), "zig");
    }
}
