//! Interactive application form.
//!
//! [`Form`] is a state machine over an ordered list of [`Field`]s. Each
//! submitted line either advances it, yields [`Step::Invalid`] for the same
//! field, or ends it. End of input cancels. [`run`] drives a form over any
//! reader/writer pair so the prompts can be tested without a terminal.

use crate::theme::Theme;
use rollout_core::{AppSpec, SecretSource, DEFAULT_NETWORK};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// A question the form asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Image,
    Domain,
    Subdomain,
    Port,
    Network,
    SecretMode,
    EnvFile,
    Mounts,
}

const FIELDS: [Field; 9] = [
    Field::Name,
    Field::Image,
    Field::Domain,
    Field::Subdomain,
    Field::Port,
    Field::Network,
    Field::SecretMode,
    Field::EnvFile,
    Field::Mounts,
];

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Project Name",
            Field::Image => "Docker Image",
            Field::Domain => "Main Domain",
            Field::Subdomain => "Subdomain (optional)",
            Field::Port => "Container Port",
            Field::Network => "Network",
            Field::SecretMode => "Secrets (none | file | edit)",
            Field::EnvFile => "Environment file path",
            Field::Mounts => "Mounts (comma-separated)",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Field::Name => "my-awesome-app",
            Field::Image => "nginx:latest",
            Field::Domain => "example.com",
            Field::Subdomain => "api",
            Field::Port => "80",
            Field::Network => DEFAULT_NETWORK,
            Field::SecretMode => "none",
            Field::EnvFile => "/path/to/.env",
            Field::Mounts => "/host:/container:rw, name:/container:ro",
        }
    }

    pub fn help(self) -> Option<&'static str> {
        match self {
            Field::SecretMode => Some("file: path to env file, edit: open editor"),
            _ => None,
        }
    }
}

/// Where the form is after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Ask for this field.
    Prompt(Field),
    /// The last answer was rejected; ask for this field again.
    Invalid { field: Field, message: String },
    /// Every field was answered.
    Finished(AppSpec),
    /// Input ended before the form was complete.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecretMode {
    None,
    File,
    Edit,
}

/// The form's state.
#[derive(Debug, Clone)]
pub struct Form {
    position: usize,
    spec: AppSpec,
    secret_mode: SecretMode,
    cancelled: bool,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self {
            position: 0,
            spec: AppSpec::new("", "", 80, ""),
            secret_mode: SecretMode::None,
            cancelled: false,
        }
    }

    /// Current step without submitting anything.
    pub fn step(&self) -> Step {
        if self.cancelled {
            return Step::Cancelled;
        }
        match FIELDS.get(self.position) {
            Some(field) => Step::Prompt(*field),
            None => Step::Finished(self.spec.clone()),
        }
    }

    /// One-based index of the current field and the total field count.
    pub fn progress(&self) -> (usize, usize) {
        ((self.position + 1).min(FIELDS.len()), FIELDS.len())
    }

    /// Submits one line of input, or `None` at end of input.
    pub fn submit(&mut self, line: Option<&str>) -> Step {
        let field = match self.step() {
            Step::Prompt(field) => field,
            done => return done,
        };

        let Some(line) = line else {
            self.cancelled = true;
            return Step::Cancelled;
        };

        if let Err(message) = self.accept(field, line.trim()) {
            return Step::Invalid { field, message };
        }

        self.position += 1;
        if field == Field::SecretMode && self.secret_mode != SecretMode::File {
            self.position += 1;
        }
        self.step()
    }

    fn accept(&mut self, field: Field, value: &str) -> Result<(), String> {
        match field {
            Field::Name => {
                check(field, value)?;
                self.spec.name = value.to_string();
            }
            Field::Image => {
                check(field, value)?;
                self.spec.image = value.to_string();
            }
            Field::Domain => {
                check(field, value)?;
                self.spec.domain = value.to_string();
            }
            Field::Subdomain => {
                check(field, value)?;
                self.spec.subdomain = value.to_string();
            }
            Field::Port => {
                let value = if value.is_empty() { "80" } else { value };
                self.spec.container_port = value
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port > 0)
                    .ok_or_else(|| "Enter a valid port (1-65535)".to_string())?;
            }
            Field::Network => {
                if !value.is_empty() {
                    check(field, value)?;
                    self.spec.network = value.to_string();
                }
            }
            Field::SecretMode => {
                self.secret_mode = match value.to_ascii_lowercase().as_str() {
                    "" | "none" => SecretMode::None,
                    "file" => SecretMode::File,
                    "edit" => SecretMode::Edit,
                    _ => return Err("Choose one: none, file, or edit".to_string()),
                };
                self.spec.secret = match self.secret_mode {
                    SecretMode::Edit => SecretSource::Edit,
                    _ => SecretSource::None,
                };
            }
            Field::EnvFile => {
                if value.is_empty() {
                    return Err("Provide a file path or choose a different secret mode".to_string());
                }
                self.spec.secret = SecretSource::File(PathBuf::from(value));
            }
            Field::Mounts => {
                let mounts = split_mounts(value);
                check_mounts(&mounts)?;
                self.spec.mounts = mounts;
            }
        }
        Ok(())
    }
}

fn split_mounts(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validates one text field by substituting it into an otherwise valid spec.
fn check(field: Field, value: &str) -> Result<(), String> {
    let mut probe = AppSpec::new("app", "image", 80, "example.com");
    match field {
        Field::Name => probe.name = value.to_string(),
        Field::Image => probe.image = value.to_string(),
        Field::Domain => probe.domain = value.to_string(),
        Field::Subdomain => probe.subdomain = value.to_string(),
        Field::Network => probe.network = value.to_string(),
        _ => {}
    }
    probe.validate().map_err(|e| e.to_string())
}

fn check_mounts(mounts: &[String]) -> Result<(), String> {
    let mut probe = AppSpec::new("app", "image", 80, "example.com");
    probe.mounts = mounts.to_vec();
    probe.validate().map_err(|e| e.to_string())
}

/// Runs a form to completion, prompting on `output` and reading lines from
/// `input`.
///
/// Returns `None` if input ended first.
pub fn run<R: BufRead, W: Write>(
    mut input: R,
    output: &mut W,
    theme: &Theme,
) -> io::Result<Option<AppSpec>> {
    let mut form = Form::new();
    let mut step = form.step();

    writeln!(output, "{}", theme.header("Rollout Init"))?;

    loop {
        let field = match step {
            Step::Prompt(field) => field,
            Step::Invalid { field, message } => {
                writeln!(output, "{}", theme.error(&format!("Error: {message}")))?;
                field
            }
            Step::Finished(spec) => return Ok(Some(spec)),
            Step::Cancelled => return Ok(None),
        };

        let (index, total) = form.progress();
        writeln!(output, "{}", theme.muted(&format!("Step {index} of {total}")))?;
        if let Some(help) = field.help() {
            writeln!(output, "{}", theme.muted(help))?;
        }
        write!(
            output,
            "{} {} ",
            theme.prompt(&format!("{}:", field.label())),
            theme.muted(&format!("[{}]", field.placeholder()))
        )?;
        output.flush()?;

        let mut line = String::new();
        let read = input.read_line(&mut line)?;
        step = form.submit(if read == 0 { None } else { Some(line.as_str()) });
    }
}
