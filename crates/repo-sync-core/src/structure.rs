//! Regex-based structural metadata for JavaScript/TypeScript and Python.
//!
//! This is deliberately shallow: it records names, not semantics. It runs
//! without an AI call and is recomputed whenever file content is fetched.

use std::sync::LazyLock;

use regex::Regex;

use crate::language::file_extension;
use crate::models::CodeStructure;

/// Patterns are literals; a compile failure is a programming error.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid structure pattern {pattern:?}: {e}"))
}

static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"import\s+(?:\{[^}]+\}|\*\s+as\s+\w+|\w+)\s+from\s+['"]([^'"]+)['"]"#)
});
static JS_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:export\s+)?(?:async\s+)?function\s+(\w+)"));
static JS_ARROW: LazyLock<Regex> =
    LazyLock::new(|| compile(r"const\s+(\w+)\s*=\s*(?:async\s+)?\([^)]*\)\s*=>"));
static JS_CLASS: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:export\s+)?class\s+(\w+)"));
static JS_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"export\s+(?:const|let|var|function|class)\s+(\w+)"));

static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:from\s+(\w+(?:\.\w+)*)\s+import|import\s+(\w+(?:\.\w+)*))")
});
static PY_FUNCTION: LazyLock<Regex> = LazyLock::new(|| compile(r"def\s+(\w+)\s*\("));
static PY_CLASS: LazyLock<Regex> = LazyLock::new(|| compile(r"class\s+(\w+)"));

fn captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Extract structure from `content`, choosing patterns by the extension of
/// `path`. Unsupported languages yield an empty [`CodeStructure`].
pub fn extract_structure(path: &str, content: &str) -> CodeStructure {
    match file_extension(path).as_deref() {
        Some("ts" | "tsx" | "js" | "jsx") => {
            let mut functions = captures(&JS_FUNCTION, content);
            functions.extend(captures(&JS_ARROW, content));
            CodeStructure {
                imports: captures(&JS_IMPORT, content),
                functions,
                classes: captures(&JS_CLASS, content),
                exports: captures(&JS_EXPORT, content),
            }
        }
        Some("py") => CodeStructure {
            imports: PY_IMPORT
                .captures_iter(content)
                .filter_map(|c| c.get(1).or_else(|| c.get(2)))
                .map(|m| m.as_str().to_string())
                .collect(),
            functions: captures(&PY_FUNCTION, content),
            classes: captures(&PY_CLASS, content),
            exports: Vec::new(),
        },
        _ => CodeStructure::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typescript_structure() {
        let src = r#"
import React, { useState } from 'react';
import { api } from "../lib/api";
import * as path from 'path';

export async function loadUser(id: string) {}
const handleClick = (e) => { };
export const fetchAll = async () => [];
export class Store {}
"#;
        let s = extract_structure("web/App.tsx", src);
        assert_eq!(s.imports, vec!["../lib/api", "path"]);
        assert_eq!(s.functions, vec!["loadUser", "handleClick", "fetchAll"]);
        assert_eq!(s.classes, vec!["Store"]);
        // `export async function` is not an export form the pattern knows
        assert_eq!(s.exports, vec!["fetchAll", "Store"]);
    }

    #[test]
    fn default_import_form() {
        let s = extract_structure("a.js", "import React from 'react';");
        assert_eq!(s.imports, vec!["react"]);
    }

    #[test]
    fn python_structure() {
        let src = "\
import os
from app.models import User
import json.decoder

class Repo(Base):
    def sync(self, token):
        pass

def main():
    pass
";
        let s = extract_structure("svc/main.py", src);
        assert_eq!(s.imports, vec!["os", "app.models", "json.decoder"]);
        assert_eq!(s.functions, vec!["sync", "main"]);
        assert_eq!(s.classes, vec!["Repo"]);
        assert!(s.exports.is_empty());
    }

    #[test]
    fn other_languages_are_empty() {
        assert!(extract_structure("main.go", "func main() {}").is_empty());
        assert!(extract_structure("README", "class Foo").is_empty());
    }
}
