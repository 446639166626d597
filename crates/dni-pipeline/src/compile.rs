//! The external byte-compiler sub-process bridge (spec §6, §4.8, §9).
//!
//! Byte-compiling a Python source requires the game's own interpreter
//! version, which this crate does not embed. Instead each source file is
//! handed to a small external tool script via a named interpreter binary:
//! one request written to its standard input, one response read from its
//! standard output, with standard error treated purely as log output. One
//! sub-process per source file — trivially parallelizable, and no
//! persistent interpreter is kept alive (spec §9).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::error::{AssetError, CompileResultCode, Result};

/// The sub-process's reported result code (spec §6 `PyToolsResultCodes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// Compiled (or, for `get_python_lib`, resolved) successfully.
    Success,
    /// The sub-process itself raised an uncaught exception.
    Crashed,
    /// The request's `cmd` field was not recognized.
    InvalidCommand,
    /// The module compiled with a Python-level syntax/traceback error.
    ModuleTraceback,
    /// The named source file could not be opened.
    FileNotFound,
}

impl From<ResultCode> for CompileResultCode {
    fn from(value: ResultCode) -> Self {
        match value {
            ResultCode::Success => unreachable!("Success never becomes a CompileResultCode"),
            ResultCode::Crashed => Self::ToolsCrashed,
            ResultCode::InvalidCommand => Self::InvalidCommand,
            ResultCode::ModuleTraceback => Self::ModuleTraceback,
            ResultCode::FileNotFound => Self::FileNotFound,
        }
    }
}

/// The AST verdict a `compyle` request reports for a source file (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PfmVerdict {
    /// The source defines a `ptAGEFileMod`-derived class: a page's
    /// `PythonFileMod` key may legitimately bind to it.
    Indeed,
    /// The source compiled but defines no file-mod class.
    NotAModifier,
    /// No top-level class definition was found at all.
    NoClass,
    /// The AST walk itself crashed; treat as unknown, not fatal.
    AstCrashed,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    Compyle {
        py_file_path: &'a Path,
        py_glue_path: Option<&'a Path>,
        module_name: &'a str,
        force_append_glue: bool,
    },
    GetPythonLib,
}

#[derive(Debug, Deserialize)]
struct Response {
    returncode: ResultCode,
    #[serde(default)]
    code: Option<Vec<u8>>,
    #[serde(default)]
    pfm: Option<PfmVerdict>,
    #[serde(default)]
    traceback: Option<String>,
    #[serde(default)]
    python_lib: Option<PathBuf>,
}

/// The successful outcome of a `compyle` request.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// The compiled byte-code blob.
    pub code: Vec<u8>,
    /// The AST's verdict on whether this source is a Python file mod.
    pub pfm: PfmVerdict,
}

async fn roundtrip(py_exe: &Path, tool_script: &Path, request: &Request<'_>) -> Result<Response> {
    let mut child = Command::new(py_exe)
        .arg(tool_script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let payload = serde_json::to_vec(request).map_err(|e| {
        AssetError::CompilerFailure {
            py_file_path: String::new(),
            code: CompileResultCode::InvalidCommand,
            detail: format!(": failed to encode request: {e}"),
        }
    })?;

    fn missing_pipe(which: &str) -> std::io::Error {
        std::io::Error::other(format!("sub-process {which} pipe unavailable"))
    }

    {
        let stdin = child.stdin.as_mut().ok_or_else(|| missing_pipe("stdin"))?;
        stdin.write_all(&payload).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await?;
    }

    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let mut lines = BufReader::new(stdout).lines();
    let response_line = lines.next_line().await?.unwrap_or_default();

    if let Some(stderr) = child.stderr.take() {
        let mut err_lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = err_lines.next_line().await {
            tracing::debug!(tool = %tool_script.display(), "{line}");
        }
    }

    child.wait().await?;

    serde_json::from_str(&response_line).map_err(|e| {
        AssetError::CompilerFailure {
            py_file_path: String::new(),
            code: CompileResultCode::InvalidCommand,
            detail: format!(": malformed response: {e}"),
        }
    })
}

/// Byte-compile one Python source via the external interpreter, appending
/// the page-reader glue if `force_append_glue` is set (spec §4.8: files the
/// page reader already flagged `python_file_mod` whose own AST verdict is
/// `Indeed` get the glue from the caller's compile loop instead, not here).
pub async fn compyle(
    py_exe: &Path,
    tool_script: &Path,
    py_file_path: &Path,
    py_glue_path: Option<&Path>,
    module_name: &str,
    force_append_glue: bool,
) -> Result<CompileOutcome> {
    let request = Request::Compyle {
        py_file_path,
        py_glue_path,
        module_name,
        force_append_glue,
    };
    let response = roundtrip(py_exe, tool_script, &request).await?;

    if response.returncode != ResultCode::Success {
        return Err(AssetError::CompilerFailure {
            py_file_path: py_file_path.display().to_string(),
            code: response.returncode.into(),
            detail: response
                .traceback
                .map(|t| format!(": {t}"))
                .unwrap_or_default(),
        }
        .into());
    }

    Ok(CompileOutcome {
        code: response.code.unwrap_or_default(),
        pfm: response.pfm.unwrap_or(PfmVerdict::AstCrashed),
    })
}

/// Ask the external interpreter where its standard library lives.
pub async fn get_python_lib(py_exe: &Path, tool_script: &Path) -> Result<PathBuf> {
    let response = roundtrip(py_exe, tool_script, &Request::GetPythonLib).await?;
    response.python_lib.ok_or_else(|| {
        AssetError::CompilerFailure {
            py_file_path: String::new(),
            code: CompileResultCode::FileNotFound,
            detail: ": get_python_lib returned no path".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_tagged_cmd_field() {
        let request = Request::Compyle {
            py_file_path: Path::new("Python/xFoo.py"),
            py_glue_path: None,
            module_name: "xFoo",
            force_append_glue: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""cmd":"compyle""#));
        assert!(json.contains(r#""module_name":"xFoo""#));
    }

    #[test]
    fn get_python_lib_request_has_no_extra_fields() {
        let json = serde_json::to_string(&Request::GetPythonLib).unwrap();
        assert_eq!(json, r#"{"cmd":"get_python_lib"}"#);
    }

    #[test]
    fn response_parses_success_with_code_and_pfm() {
        let json = r#"{"returncode": "success", "code": [1,2,3], "pfm": "indeed"}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert_eq!(response.returncode, ResultCode::Success);
        assert_eq!(response.code, Some(vec![1, 2, 3]));
        assert_eq!(response.pfm, Some(PfmVerdict::Indeed));
    }

    #[test]
    fn response_parses_failure_without_optional_fields() {
        let json = r#"{"returncode": "file_not_found"}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert_eq!(response.returncode, ResultCode::FileNotFound);
        assert!(response.code.is_none());
        assert!(response.pfm.is_none());
    }

    #[test]
    fn non_success_result_codes_map_into_compile_result_codes() {
        assert_eq!(CompileResultCode::from(ResultCode::Crashed), CompileResultCode::ToolsCrashed);
        assert_eq!(CompileResultCode::from(ResultCode::InvalidCommand), CompileResultCode::InvalidCommand);
        assert_eq!(CompileResultCode::from(ResultCode::ModuleTraceback), CompileResultCode::ModuleTraceback);
        assert_eq!(CompileResultCode::from(ResultCode::FileNotFound), CompileResultCode::FileNotFound);
    }

    #[tokio::test]
    async fn compyle_surfaces_compiler_failure_with_traceback() {
        // A tool script that isn't a real interpreter never returns a valid
        // response line, so `roundtrip` should surface a `CompilerFailure`
        // rather than panic or hang.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not_a_tool.py");
        std::fs::write(&script, b"").unwrap();
        let err = compyle(Path::new("true"), &script, Path::new("xFoo.py"), None, "xFoo", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::PipelineError::Asset(AssetError::CompilerFailure { .. })
        ));
    }
}
