use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::{FieldSpec, InputKind};

/// One uploaded file part, fully buffered.
#[derive(Clone, Debug, PartialEq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A request value before validation: a plain form field or a file upload.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Field(String),
    Upload(Upload),
}

/// A request value after validation, typed per its field spec.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Str(s) => write!(f, "{s}"),
            InputValue::Int(i) => write!(f, "{i}"),
            InputValue::Float(x) => write!(f, "{x}"),
            InputValue::Bool(b) => write!(f, "{b}"),
            InputValue::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// What the model receives: raw passthrough when no schema is declared,
/// typed values otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Inputs {
    Raw(HashMap<String, RawValue>),
    Typed(HashMap<String, InputValue>),
}

impl Inputs {
    /// Looks up a typed value by field name. Returns `None` for raw inputs.
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        match self {
            Inputs::Typed(map) => map.get(name),
            Inputs::Raw(_) => None,
        }
    }
}

/// A client-side input error, rendered as HTTP 400.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("duplicated argument name in form and files: {0}")]
    DuplicateKey(String),
    #[error("missing required argument: {0}")]
    MissingRequired(String),
    #[error("invalid value for argument {name}: {reason}")]
    Coercion { name: String, reason: String },
    #[error("argument {name} is below the minimum {min}: {value}")]
    BelowMin { name: String, min: f64, value: f64 },
    #[error("argument {name} is above the maximum {max}: {value}")]
    AboveMax { name: String, max: f64, value: f64 },
    #[error("argument {name} must be one of [{allowed}]: got {value}")]
    InvalidOption {
        name: String,
        allowed: String,
        value: String,
    },
    #[error("unexpected argument: {0}")]
    UnexpectedField(String),
    #[error("could not store uploaded file for argument {name}: {source}")]
    Materialize {
        name: String,
        source: std::io::Error,
    },
    #[error("could not read request body: {0}")]
    Malformed(String),
}

/// Ordered list of deferred teardown actions tied to one request's lifetime.
///
/// Actions run in registration order. Each failure is logged and swallowed so
/// one bad action cannot suppress the rest. Any actions still registered when
/// the registry is dropped run then.
#[derive(Default)]
pub struct CleanupRegistry {
    actions: Vec<Box<dyn FnOnce() -> std::io::Result<()> + Send>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl FnOnce() -> std::io::Result<()> + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drains every registered action, in registration order.
    pub fn run_all(&mut self) {
        for action in self.actions.drain(..) {
            if let Err(e) = action() {
                log::error!("Cleanup action failed: {e}");
            }
        }
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        self.run_all();
    }
}

/// Merges form fields and file uploads into one raw input map.
///
/// Form fields are inserted first; an upload whose name collides with a form
/// field is rejected rather than silently overwriting it.
pub fn merge_raw_inputs(
    fields: Vec<(String, String)>,
    uploads: Vec<(String, Upload)>,
) -> Result<HashMap<String, RawValue>, InputError> {
    let mut raw = HashMap::new();
    for (name, value) in fields {
        raw.insert(name, RawValue::Field(value));
    }
    for (name, upload) in uploads {
        if let Some(RawValue::Field(_)) = raw.get(&name) {
            return Err(InputError::DuplicateKey(name));
        }
        raw.insert(name, RawValue::Upload(upload));
    }
    Ok(raw)
}

/// Validates and converts raw inputs against the declared field specs.
///
/// Fields are processed in spec order. File-typed fields materialize their
/// upload to a temp directory and register its removal in `cleanup`; actions
/// registered before a later field fails stay in the registry and still run.
pub fn validate_and_convert(
    specs: &[FieldSpec],
    mut raw: HashMap<String, RawValue>,
    cleanup: &mut CleanupRegistry,
) -> Result<HashMap<String, InputValue>, InputError> {
    let mut converted = HashMap::new();
    for spec in specs {
        let value = match raw.remove(&spec.name) {
            Some(value) => coerce(spec, value, cleanup)?,
            None => match &spec.default {
                Some(default) => default.clone(),
                None => return Err(InputError::MissingRequired(spec.name.clone())),
            },
        };
        check_options(spec, &value)?;
        check_range(spec, &value)?;
        converted.insert(spec.name.clone(), value);
    }
    if !raw.is_empty() {
        let mut extras: Vec<String> = raw.into_keys().collect();
        extras.sort();
        return Err(InputError::UnexpectedField(extras.swap_remove(0)));
    }
    Ok(converted)
}

fn coerce(
    spec: &FieldSpec,
    value: RawValue,
    cleanup: &mut CleanupRegistry,
) -> Result<InputValue, InputError> {
    match value {
        RawValue::Field(text) => coerce_text(spec, text),
        RawValue::Upload(upload) => {
            if spec.kind != InputKind::Path {
                return Err(InputError::Coercion {
                    name: spec.name.clone(),
                    reason: format!("got a file upload but expected {}", spec.kind.as_str()),
                });
            }
            materialize_upload(&spec.name, upload, cleanup).map(InputValue::Path)
        }
    }
}

fn coerce_text(spec: &FieldSpec, text: String) -> Result<InputValue, InputError> {
    let fail = |reason: String| InputError::Coercion {
        name: spec.name.clone(),
        reason,
    };
    match spec.kind {
        InputKind::Str => Ok(InputValue::Str(text)),
        InputKind::Int => text
            .trim()
            .parse::<i64>()
            .map(InputValue::Int)
            .map_err(|_| fail(format!("{text:?} is not an integer"))),
        InputKind::Float => text
            .trim()
            .parse::<f64>()
            .map(InputValue::Float)
            .map_err(|_| fail(format!("{text:?} is not a number"))),
        InputKind::Bool => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(InputValue::Bool(true)),
            "false" | "0" => Ok(InputValue::Bool(false)),
            _ => Err(fail(format!("{text:?} is not a boolean"))),
        },
        InputKind::Path => Err(fail("expected a file upload".to_string())),
    }
}

/// Writes the upload into a fresh temp directory, keeping the client's file
/// name, and registers removal of the whole directory. The removal is
/// registered before the write so a failed write still gets cleaned up.
fn materialize_upload(
    name: &str,
    upload: Upload,
    cleanup: &mut CleanupRegistry,
) -> Result<PathBuf, InputError> {
    let io_err = |source| InputError::Materialize {
        name: name.to_string(),
        source,
    };
    let dir = tempfile::Builder::new()
        .prefix("auspex-input-")
        .tempdir()
        .map_err(io_err)?
        .keep();
    cleanup.register({
        let dir = dir.clone();
        move || std::fs::remove_dir_all(&dir)
    });
    let leaf = Path::new(&upload.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let path = dir.join(leaf);
    std::fs::write(&path, &upload.bytes).map_err(io_err)?;
    Ok(path)
}

fn check_options(spec: &FieldSpec, value: &InputValue) -> Result<(), InputError> {
    let Some(options) = &spec.options else {
        return Ok(());
    };
    if options.contains(value) {
        return Ok(());
    }
    let allowed: Vec<String> = options.iter().map(|o| o.to_string()).collect();
    Err(InputError::InvalidOption {
        name: spec.name.clone(),
        allowed: allowed.join(", "),
        value: value.to_string(),
    })
}

fn check_range(spec: &FieldSpec, value: &InputValue) -> Result<(), InputError> {
    let numeric = match value {
        InputValue::Int(i) => *i as f64,
        InputValue::Float(x) => *x,
        _ => return Ok(()),
    };
    if let Some(min) = spec.min
        && numeric < min
    {
        return Err(InputError::BelowMin {
            name: spec.name.clone(),
            min,
            value: numeric,
        });
    }
    if let Some(max) = spec.max
        && numeric > max
    {
        return Err(InputError::AboveMax {
            name: spec.name.clone(),
            max,
            value: numeric,
        });
    }
    Ok(())
}
