//! Routing-rule domain extraction
//!
//! Collects the literal host names out of matcher expressions such as
//! ``Host(`a.example.com`) && PathPrefix(`/api`)`` or
//! ``HostSNI(`db.example.com`)``. Regexp matchers and wildcards never
//! produce managed domains.

use crate::error::{Error, Result};
use crate::traits::DomainExtractor;

/// Matchers whose arguments are literal host names
const HOST_MATCHERS: &[&str] = &["Host", "HostSNI", "HostHeader"];

/// Default [`DomainExtractor`] for proxy routing rules
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleDomainExtractor;

impl DomainExtractor for RuleDomainExtractor {
    fn extract_domains(&self, rule: &str) -> Result<Vec<String>> {
        let chars: Vec<char> = rule.chars().collect();
        let mut domains: Vec<String> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            // Skip quoted strings belonging to other matchers
            if chars[i] == '`' || chars[i] == '"' {
                let (_, next) = read_quoted(&chars, i, rule)?;
                i = next;
                continue;
            }

            let starts_ident =
                chars[i].is_ascii_alphabetic() && (i == 0 || !chars[i - 1].is_ascii_alphanumeric());
            if !starts_ident {
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j >= chars.len() || chars[j] != '(' || !HOST_MATCHERS.contains(&ident.as_str()) {
                continue;
            }

            i = read_arguments(&chars, j + 1, rule, &mut domains)?;
        }

        Ok(domains)
    }
}

/// Read matcher arguments up to the closing paren, returning the index
/// after it
fn read_arguments(
    chars: &[char],
    mut i: usize,
    rule: &str,
    domains: &mut Vec<String>,
) -> Result<usize> {
    while i < chars.len() {
        match chars[i] {
            ')' => return Ok(i + 1),
            '`' | '"' => {
                let (value, next) = read_quoted(chars, i, rule)?;
                push_domain(domains, &value);
                i = next;
            }
            _ => i += 1,
        }
    }
    Err(Error::config(format!("Unterminated matcher in rule: {rule}")))
}

/// Read a quoted literal starting at `i`, returning it and the index after
/// the closing quote
fn read_quoted(chars: &[char], i: usize, rule: &str) -> Result<(String, usize)> {
    let quote = chars[i];
    let rest = &chars[i + 1..];
    match rest.iter().position(|c| *c == quote) {
        Some(len) => Ok((rest[..len].iter().collect(), i + len + 2)),
        None => Err(Error::config(format!("Unterminated quote in rule: {rule}"))),
    }
}

fn push_domain(domains: &mut Vec<String>, value: &str) {
    let domain = value.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() || domain.contains('*') {
        return;
    }
    if !domains.contains(&domain) {
        domains.push(domain);
    }
}
