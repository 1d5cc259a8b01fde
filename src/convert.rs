//! The external PDF -> JSON conversion step and the output completeness check.

use crate::config::ConverterConfig;
use crate::error::ConvertError;
use serde_json::{Map, Value};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Black-box conversion of one staged PDF into a JSON document.
pub trait Converter: Send + Sync {
    fn convert(&self, pdf: &Path) -> Result<Value, ConvertError>;
}

/// Runs an external program that prints one JSON document on stdout.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

const INPUT_PLACEHOLDER: &str = "{input}";

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(cfg: &ConverterConfig) -> Self {
        Self::new(cfg.program.clone(), cfg.args.clone())
    }

    /// `{input}` thay bằng path; không có placeholder thì path đứng cuối.
    fn build_args(&self, pdf: &Path) -> Vec<String> {
        let input = pdf.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &input))
            .collect();
        if !self.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(input.into_owned());
        }
        args
    }
}

impl Converter for CommandConverter {
    fn convert(&self, pdf: &Path) -> Result<Value, ConvertError> {
        let args = self.build_args(pdf);
        debug!(program = %self.program, ?args, "running converter");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Failed {
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Required fields that are absent, null, or empty in `doc`. A field may be
/// a dotted path (`project.latitude`). Empty result means the output is
/// complete.
pub fn missing_fields(doc: &Value, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|field| {
            let found = field
                .split('.')
                .try_fold(doc, |cur, seg| cur.as_object()?.get(seg));
            found.is_none_or(is_blank)
        })
        .cloned()
        .collect()
}

/// Audit fields added to every object output before upload.
pub struct Provenance<'a> {
    pub source_key: &'a str,
    pub source_digest: &'a str,
    pub processed_at: &'a str,
}

/// Stamp provenance onto an object document. Non-object documents are
/// wrapped as `{"record": <doc>, ...}` so the fields always have a home.
pub fn with_provenance(doc: Value, p: &Provenance<'_>) -> Value {
    let mut obj = match doc {
        Value::Object(o) => o,
        other => {
            let mut m = Map::new();
            m.insert("record".to_string(), other);
            m
        }
    };
    obj.insert("source_key".to_string(), Value::from(p.source_key));
    obj.insert("source_digest".to_string(), Value::from(p.source_digest));
    obj.insert("processed_at".to_string(), Value::from(p.processed_at));
    Value::Object(obj)
}
