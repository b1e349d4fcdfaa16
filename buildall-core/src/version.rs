//! Version tokens from the command line, and pre-release detection.
//!
//! Short tokens are rewritten by a blunt rule: every pair of adjacent digits
//! `dd` becomes `d.d`, scanning left to right without overlap. `27` becomes
//! `2.7`; `310` becomes `3.10` only because a single digit is left over, and
//! `3101` becomes `3.10.1`. Tokens that already contain a dot are kept as is.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;
use crate::types::CudaVersion;

fn digit_pair() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d)(\d)").expect("static regex"))
}

fn prerelease_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:^|[0-9._-])(?:a|alpha|b|beta|c|rc|pre|preview|dev)(?:[._-]?[0-9]+)?(?:[._-]|$)",
        )
        .expect("static regex")
    })
}

/// Split a `--python 27,36 37`-style argument into tokens.
pub fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Rewrite a short version token to dotted form (`27` → `2.7`).
pub fn normalize_token(token: &str) -> String {
    let token = token.trim();
    if token.contains('.') {
        return token.to_string();
    }
    digit_pair().replace_all(token, "$1.$2").into_owned()
}

/// Parse a CUDA token given either dotted (`9.2`, `10.0`) or compact
/// (`92`, `100`); the compact form is major followed by a one-digit minor.
pub fn parse_cuda_token(token: &str) -> Result<CudaVersion, CoreError> {
    let token = token.trim();
    let invalid = |reason: &str| CoreError::InvalidVersionToken {
        token: token.to_string(),
        reason: reason.to_string(),
    };

    let (major, minor) = match token.split_once('.') {
        Some((major, minor)) => (major, minor.chars().next().map(String::from).unwrap_or_default()),
        None => {
            if !token.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("expected digits"));
            }
            if token.len() < 2 {
                return Err(invalid("expected major and minor version"));
            }
            let (major, minor) = token.split_at(token.len() - 1);
            (major, minor.to_string())
        }
    };
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(major) || !all_digits(&minor) {
        return Err(invalid("expected digits"));
    }
    Ok(CudaVersion {
        full: format!("{major}.{minor}"),
        short: format!("{major}{minor}"),
    })
}

/// `true` if `version` carries a PEP 440 pre-release or dev segment.
/// Local suffixes (`+...`) are ignored.
pub fn is_prerelease(version: &str) -> bool {
    let public = version.split('+').next().unwrap_or_default();
    prerelease_segment().is_match(public.trim())
}
