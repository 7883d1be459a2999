//! Probe scripts that decide whether a candidate removed the original error.
//!
//! A probe loads the rewritten file inside the sandbox and re-raises only
//! the original error category; any other failure is reported as the
//! original error being gone.

use coordination::escalation::ValidationRequest;
use coordination::trace::GENERIC_ERROR_TYPE;

/// Interpreter the sandbox runs the probe with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeLanguage {
    Python,
    JavaScript,
}

impl ProbeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub language: ProbeLanguage,
    pub code: String,
}

/// Pick and render the probe for the request's target file.
pub fn probe_for(request: &ValidationRequest) -> Probe {
    let path = request.target_path.replace('\\', "/");
    match request.extension() {
        Some("py") => Probe {
            language: ProbeLanguage::Python,
            code: python_probe(&path, request),
        },
        Some("js") | Some("ts") => Probe {
            language: ProbeLanguage::JavaScript,
            code: javascript_probe(&path, &request.error_type),
        },
        _ => Probe {
            language: ProbeLanguage::Python,
            code: generic_probe(),
        },
    }
}

/// `pkg/sub/mod.py` → `pkg.sub.mod`
pub fn module_path(path: &str) -> String {
    path.trim_start_matches("./")
        .trim_end_matches(".py")
        .replace('/', ".")
}

/// `(search dir, module)` for a Python import of `path`.
///
/// Relative paths import from the sandbox working directory. A path that is
/// still absolute (outside the codebase root) imports by file stem from its
/// own directory; a dotted absolute path is never a valid module name.
pub fn python_import(path: &str) -> (String, String) {
    let path = path.trim_start_matches("./");
    let absolute = path.starts_with('/')
        || (path.len() > 2 && path.as_bytes()[1] == b':' && path.as_bytes()[2] == b'/');
    if !absolute {
        return (".".to_string(), module_path(path));
    }
    let (dir, file) = path.rsplit_once('/').unwrap_or(("/", path));
    let dir = if dir.is_empty() { "/" } else { dir };
    (dir.to_string(), file.trim_end_matches(".py").to_string())
}

/// Single-quoted Python string literal body.
fn py_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Exception class to re-raise in a Python probe.
///
/// The generic category is not a Python name, so it widens to `Exception`.
fn python_exception(error_type: &str) -> &str {
    let valid = !error_type.is_empty()
        && error_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if error_type == GENERIC_ERROR_TYPE || !valid {
        "Exception"
    } else {
        error_type
    }
}

fn python_probe(path: &str, request: &ValidationRequest) -> String {
    let (search_dir, module) = python_import(path);
    let search_dir = py_quote(&search_dir);
    let module = py_quote(&module);
    let exception = python_exception(&request.error_type);

    let function_check = match request.function_name.as_deref() {
        Some(func) if func != "<module>" => {
            let func = py_quote(func);
            format!(
                r#"
    func = getattr(target, '{func}', None)
    if func is not None:
        print("function '{func}' exists")
        if callable(func):
            print("function '{func}' is callable")
"#
            )
        }
        _ => String::new(),
    };

    // The module must resolve before the guarded import: a lookup failure
    // says nothing about the original error and must not count as fixed.
    format!(
        r#"
import sys
import importlib
import importlib.util
sys.path.insert(0, '{search_dir}')

if importlib.util.find_spec('{module}') is None:
    raise ImportError("module '{module}' not found in sandbox")

try:
    target = importlib.import_module('{module}')
    print("module imported")
{function_check}
    print("fix appears to work")
except {exception} as e:
    print(f"same error still occurs: {{e}}")
    raise
except Exception as e:
    print(f"different error (may be fine): {{e}}")
    print("original error is fixed")
"#
    )
}

fn javascript_probe(path: &str, error_type: &str) -> String {
    let path = path.trim_start_matches("./");
    let escaped = error_type.replace('\'', "\\'");
    format!(
        r#"
try {{
    require('./{path}');
    console.log('module loaded');
    console.log('fix appears to work');
}} catch (e) {{
    if (e.name === '{escaped}') {{
        console.log('same error still occurs:', e.message);
        throw e;
    }} else {{
        console.log('different error (may be fine):', e.message);
        console.log('original error is fixed');
    }}
}}
"#
    )
}

fn generic_probe() -> String {
    r#"
print("file was written")
print("fix generated; manual verification needed")
"#
    .to_string()
}
