//! Logging setup with secret redaction.
//!
//! Every line written by the subscriber passes through [`RedactingWriter`],
//! which masks Discord bot tokens and authorization headers.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    bot_token: Regex,
    auth_header: Regex,
    token_env: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bot_token: Regex::new(r"[MNO][A-Za-z\d_-]{23,27}\.[\w-]{6}\.[\w-]{27,}")?,
            auth_header: Regex::new(r"(?i)(authorization:?\s*bot\s+)\S+")?,
            token_env: Regex::new(r"OCB_TOKEN=[^\s&]+")?,
        })
    }

    /// Mask secrets in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let mut output = self
            .auth_header
            .replace_all(input, "${1}[DISCORD_TOKEN]")
            .to_string();
        output = self
            .bot_token
            .replace_all(&output, "[DISCORD_TOKEN]")
            .to_string();
        output = self
            .token_env
            .replace_all(&output, "OCB_TOKEN=[MASKED]")
            .to_string();
        output
    }
}

/// Writer that redacts each buffer before passing it on
pub struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` wrapping each writer in a [`RedactingWriter`]
pub struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    pub const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

/// Install the global subscriber writing redacted output to stderr.
///
/// `RUST_LOG` wins over `default_level`.
///
/// # Errors
///
/// Returns an error if the redaction patterns fail to compile.
pub fn init_logging(default_level: &str) -> Result<(), regex::Error> {
    let patterns = Arc::new(RedactionPatterns::new()?);
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAKE_TOKEN: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4.GaBcDe.abcdefghijklmnopqrstuvwxyz0123";

    #[test]
    fn test_redacts_bare_token() {
        let patterns = RedactionPatterns::new().expect("patterns compile");
        let line = format!("connecting with {FAKE_TOKEN} now");
        assert_eq!(patterns.redact(&line), "connecting with [DISCORD_TOKEN] now");
    }

    #[test]
    fn test_redacts_authorization_header() {
        let patterns = RedactionPatterns::new().expect("patterns compile");
        let line = "Authorization: Bot abc.def.ghi";
        assert_eq!(patterns.redact(line), "Authorization: Bot [DISCORD_TOKEN]");
        assert_eq!(
            patterns.redact("OCB_TOKEN=secret other=1"),
            "OCB_TOKEN=[MASKED] other=1"
        );
    }

    #[test]
    fn test_writer_reports_original_length() {
        let patterns = Arc::new(RedactionPatterns::new().expect("patterns compile"));
        let mut out = Vec::new();
        {
            let mut writer = RedactingWriter::new(&mut out, patterns);
            let input = format!("token={FAKE_TOKEN}\n");
            let written = writer.write(input.as_bytes()).expect("write");
            assert_eq!(written, input.len());
        }
        assert_eq!(String::from_utf8_lossy(&out), "token=[DISCORD_TOKEN]\n");
    }

    #[test]
    fn test_plain_text_untouched() {
        let patterns = RedactionPatterns::new().expect("patterns compile");
        let line = "Poll table successfully updated";
        assert_eq!(patterns.redact(line), line);
    }
}
