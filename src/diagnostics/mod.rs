use crate::span::Span;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal lowering error. Every variant aborts lowering of the enclosing
/// compilation unit; none are retried.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("Unsupported conversion: {msg}")]
    UnsupportedConversion { msg: String, span: Span },

    #[error("Unresolved reference: {msg}")]
    UnresolvedReference { msg: String, span: Span },

    #[error("Incompatible receiver: {msg}")]
    IncompatibleReceiver { msg: String, span: Span },

    #[error("Malformed constructor reference: {msg}")]
    MalformedConstructorReference { msg: String, span: Span },

    #[error("Incompatible inferred type: {msg}")]
    IncompatibleInferredType { msg: String, span: Span },

    #[error("Missing type: {msg}")]
    MissingType { msg: String, span: Span },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },
}

impl LowerError {
    pub fn unsupported_conversion(msg: impl Into<String>, span: Span) -> Self {
        Self::UnsupportedConversion { msg: msg.into(), span }
    }

    pub fn unresolved_reference(msg: impl Into<String>, span: Span) -> Self {
        Self::UnresolvedReference { msg: msg.into(), span }
    }

    pub fn incompatible_receiver(msg: impl Into<String>, span: Span) -> Self {
        Self::IncompatibleReceiver { msg: msg.into(), span }
    }

    pub fn malformed_constructor_reference(msg: impl Into<String>, span: Span) -> Self {
        Self::MalformedConstructorReference { msg: msg.into(), span }
    }

    pub fn incompatible_inferred_type(msg: impl Into<String>, span: Span) -> Self {
        Self::IncompatibleInferredType { msg: msg.into(), span }
    }

    pub fn missing_type(msg: impl Into<String>, span: Span) -> Self {
        Self::MissingType { msg: msg.into(), span }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            LowerError::UnsupportedConversion { span, .. }
            | LowerError::UnresolvedReference { span, .. }
            | LowerError::IncompatibleReceiver { span, .. }
            | LowerError::MalformedConstructorReference { span, .. }
            | LowerError::IncompatibleInferredType { span, .. }
            | LowerError::MissingType { span, .. } => Some(*span),
            LowerError::Codegen { .. } | LowerError::Config { .. } => None,
        }
    }

    fn kind_str(&self) -> &'static str {
        match self {
            LowerError::UnsupportedConversion { .. } => "unsupported conversion",
            LowerError::UnresolvedReference { .. } => "unresolved reference",
            LowerError::IncompatibleReceiver { .. } => "incompatible receiver",
            LowerError::MalformedConstructorReference { .. } => "malformed constructor reference",
            LowerError::IncompatibleInferredType { .. } => "incompatible inferred type",
            LowerError::MissingType { .. } => "missing type",
            LowerError::Codegen { .. } => "codegen",
            LowerError::Config { .. } => "config",
        }
    }

    fn message(&self) -> &str {
        match self {
            LowerError::UnsupportedConversion { msg, .. }
            | LowerError::UnresolvedReference { msg, .. }
            | LowerError::IncompatibleReceiver { msg, .. }
            | LowerError::MalformedConstructorReference { msg, .. }
            | LowerError::IncompatibleInferredType { msg, .. }
            | LowerError::MissingType { msg, .. }
            | LowerError::Codegen { msg }
            | LowerError::Config { msg, .. } => msg,
        }
    }
}

/// Render a LowerError with ariadne for terminal output.
pub fn render_error(source: &str, err: &LowerError) -> std::io::Result<()> {
    let mut out = Vec::new();
    write_error(source, err, &mut out, true)?;
    eprint!("{}", String::from_utf8_lossy(&out));
    Ok(())
}

/// Same report as [`render_error`], uncoloured, as a string.
pub fn render_error_to_string(source: &str, err: &LowerError) -> String {
    let mut out = Vec::new();
    if write_error(source, err, &mut out, false).is_err() {
        return err.to_string();
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn write_error(source: &str, err: &LowerError, out: &mut Vec<u8>, color: bool) -> std::io::Result<()> {
    use ariadne::{Config, Label, Report, ReportKind, Source};
    use std::io::Write;

    match (err.span(), err) {
        (Some(span), _) => Report::build(ReportKind::Error, (), span.start)
            .with_config(Config::default().with_color(color))
            .with_message(format!("{} error", err.kind_str()))
            .with_label(Label::new(span.range()).with_message(err.message()))
            .finish()
            .write(Source::from(source), out),
        (None, LowerError::Config { msg, path }) => {
            writeln!(out, "error[config]: {msg}")?;
            writeln!(out, "  --> {}", path.display())
        }
        (None, _) => writeln!(out, "error: {}", err.message()),
    }
}
