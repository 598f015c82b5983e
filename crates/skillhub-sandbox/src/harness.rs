//! Per-language guest staging.
//!
//! A skill blob is written into a scratch directory next to a generated
//! runner. The runner owns the marshalling contract: it reads the inputs
//! JSON from stdin, calls the skill's `execute` entry point, and writes the
//! result JSON on a single stdout line prefixed with [`RESULT_SENTINEL`].
//! Anything the guest prints itself lacks the sentinel and is ignored by
//! the host. Exit code 2 means `execute` raised; exit code 3 means the
//! return value was not JSON-serialisable.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of the stdout line carrying the guest's result JSON.
pub const RESULT_SENTINEL: &str = "@@SKILLHUB_RESULT@@";

/// Guest exit code for an exception raised inside `execute`.
pub const EXIT_GUEST_RAISED: i32 = 2;
/// Guest exit code for a non-JSON-serialisable return value.
pub const EXIT_MARSHALLING: i32 = 3;

/// Source languages the runtime can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestLanguage {
    Python,
    TypeScript,
    Go,
}

impl GuestLanguage {
    /// File name the skill blob is staged under.
    pub fn skill_file(&self) -> &'static str {
        match self {
            GuestLanguage::Python => "skill.py",
            GuestLanguage::TypeScript => "skill.ts",
            GuestLanguage::Go => "skill.go",
        }
    }
}

impl std::fmt::Display for GuestLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestLanguage::Python => write!(f, "python"),
            GuestLanguage::TypeScript => write!(f, "typescript"),
            GuestLanguage::Go => write!(f, "go"),
        }
    }
}

impl std::str::FromStr for GuestLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(GuestLanguage::Python),
            "typescript" => Ok(GuestLanguage::TypeScript),
            "go" => Ok(GuestLanguage::Go),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Command line to run a staged guest, relative to its scratch dir.
#[derive(Debug, Clone)]
pub struct GuestCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Write the skill blob and its runner into `dir` and return the command
/// that executes them.
pub fn stage_guest(
    dir: &Path,
    language: GuestLanguage,
    blob: &[u8],
) -> std::io::Result<GuestCommand> {
    std::fs::write(dir.join(language.skill_file()), blob)?;

    let command = match language {
        GuestLanguage::Python => {
            std::fs::write(dir.join("_runner.py"), python_runner())?;
            GuestCommand {
                program: "python3".into(),
                args: vec!["_runner.py".into()],
            }
        }
        GuestLanguage::TypeScript => {
            std::fs::write(dir.join("_runner.ts"), typescript_runner())?;
            GuestCommand {
                program: "npx".into(),
                args: vec!["-y".into(), "ts-node".into(), "_runner.ts".into()],
            }
        }
        GuestLanguage::Go => {
            std::fs::write(dir.join("_runner.go"), go_runner())?;
            std::fs::write(dir.join("go.mod"), "module skillhubguest\n\ngo 1.21\n")?;
            GuestCommand {
                program: "go".into(),
                args: vec!["run".into(), ".".into()],
            }
        }
    };

    Ok(command)
}

fn python_runner() -> String {
    format!(
        r#"import json
import sys
import traceback

sys.path.insert(0, ".")
import skill

raw = sys.stdin.read()
inputs = json.loads(raw) if raw.strip() else {{}}

try:
    result = skill.execute(inputs)
except Exception:
    traceback.print_exc()
    sys.exit({raised})

try:
    payload = json.dumps(result if result is not None else {{}})
except (TypeError, ValueError):
    traceback.print_exc()
    sys.exit({marshal})

sys.stdout.write("{sentinel}" + payload + "\n")
"#,
        raised = EXIT_GUEST_RAISED,
        marshal = EXIT_MARSHALLING,
        sentinel = RESULT_SENTINEL,
    )
}

fn typescript_runner() -> String {
    format!(
        r#"import * as fs from "fs";

const skill = require("./skill");

const raw = fs.readFileSync(0, "utf8");
const inputs = raw.trim() ? JSON.parse(raw) : {{}};

Promise.resolve()
  .then(() => skill.execute(inputs))
  .then((result: any) => {{
    let payload: string | undefined;
    try {{
      payload = JSON.stringify(result === undefined ? {{}} : result);
    }} catch (err) {{
      console.error(err);
      process.exit({marshal});
    }}
    if (payload === undefined) {{
      process.exit({marshal});
    }}
    process.stdout.write("{sentinel}" + payload + "\n");
  }})
  .catch((err: any) => {{
    console.error(err && err.stack ? err.stack : String(err));
    process.exit({raised});
  }});
"#,
        raised = EXIT_GUEST_RAISED,
        marshal = EXIT_MARSHALLING,
        sentinel = RESULT_SENTINEL,
    )
}

fn go_runner() -> String {
    format!(
        r#"package main

import (
	"encoding/json"
	"fmt"
	"io"
	"os"
)

func main() {{
	raw, _ := io.ReadAll(os.Stdin)
	inputs := map[string]any{{}}
	if len(raw) > 0 {{
		if err := json.Unmarshal(raw, &inputs); err != nil {{
			fmt.Fprintln(os.Stderr, err)
			os.Exit({raised})
		}}
	}}
	result, err := execute(inputs)
	if err != nil {{
		fmt.Fprintln(os.Stderr, err)
		os.Exit({raised})
	}}
	payload, err := json.Marshal(result)
	if err != nil {{
		fmt.Fprintln(os.Stderr, err)
		os.Exit({marshal})
	}}
	fmt.Printf("{sentinel}%s\n", payload)
}}
"#,
        raised = EXIT_GUEST_RAISED,
        marshal = EXIT_MARSHALLING,
        sentinel = RESULT_SENTINEL,
    )
}
