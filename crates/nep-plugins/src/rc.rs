//! rc-file parsing.
//!
//! An rc file is a flat list of `KEY=VALUE` lines. Lines may start with a
//! `[url-prefix]`; those only apply to remote access and are ignored here.
//! Plugin configuration lives under `NETCDF.UDFn.{LIBRARY,INIT,MAGIC}`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use nep_abi::{UdfSlot, MAX_MAGIC_LEN};

/// A problem found while reading configuration. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// `file:line`, or `UDFn` for per-slot problems.
    pub source: String,
    pub message: String,
}

impl Diagnostic {
    fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// One `KEY=VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcLine {
    pub url: Option<String>,
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// Split rc text into lines. Malformed lines become diagnostics.
pub fn parse_lines(text: &str, source: &str) -> (Vec<RcLine>, Vec<Diagnostic>) {
    let mut lines = Vec::new();
    let mut diags = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let mut rest = raw.trim();
        if rest.is_empty() || rest.starts_with('#') {
            continue;
        }

        let mut url = None;
        if let Some(tail) = rest.strip_prefix('[') {
            let Some((prefix, after)) = tail.split_once(']') else {
                diags.push(Diagnostic::new(
                    format!("{source}:{lineno}"),
                    "unterminated [url] prefix",
                ));
                continue;
            };
            url = Some(prefix.trim().to_string());
            rest = after.trim_start();
        }

        let Some((key, value)) = rest.split_once('=') else {
            diags.push(Diagnostic::new(
                format!("{source}:{lineno}"),
                format!("expected KEY=VALUE, got {rest:?}"),
            ));
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            diags.push(Diagnostic::new(format!("{source}:{lineno}"), "empty key"));
            continue;
        }

        lines.push(RcLine {
            url,
            key: key.to_string(),
            value: value.trim().to_string(),
            line: lineno,
        });
    }
    (lines, diags)
}

/// Decode the escapes allowed in a `MAGIC` value.
pub fn unescape_magic(s: &str) -> Result<Vec<u8>, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let Some(&esc) = bytes.get(i + 1) else {
            return Err("trailing backslash".into());
        };
        match esc {
            b'\\' => out.push(b'\\'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'x' => {
                let hex = s
                    .get(i + 2..i + 4)
                    .filter(|h| h.bytes().all(|c| c.is_ascii_hexdigit()))
                    .ok_or_else(|| format!("\\x at offset {i} needs two hex digits"))?;
                out.push(u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?);
                i += 4;
                continue;
            }
            b'0'..=b'7' => {
                let oct = s
                    .get(i + 1..i + 4)
                    .filter(|o| o.bytes().all(|c| (b'0'..=b'7').contains(&c)));
                match oct {
                    Some(oct) => {
                        let v = u16::from_str_radix(oct, 8).map_err(|e| e.to_string())?;
                        let v = u8::try_from(v)
                            .map_err(|_| format!("octal escape \\{oct} is out of range"))?;
                        out.push(v);
                        i += 4;
                        continue;
                    }
                    // A lone \0 not followed by two more octal digits.
                    None if esc == b'0' => out.push(0),
                    None => return Err(format!("octal escape at offset {i} needs three digits")),
                }
            }
            other => return Err(format!("unknown escape \\{}", other as char)),
        }
        i += 2;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Library,
    Init,
    Magic,
}

/// `NETCDF.UDFn.FIELD` split into its parts. `None` for keys outside the
/// plugin namespace; `Some(Err)` for malformed plugin keys.
fn plugin_key(key: &str) -> Option<Result<(UdfSlot, Field), String>> {
    let mut parts = key.splitn(3, '.');
    let ns = parts.next()?;
    let slot = parts.next()?;
    if !ns.eq_ignore_ascii_case("netcdf") || !slot.get(..3)?.eq_ignore_ascii_case("udf") {
        return None;
    }
    let Some(udf) = UdfSlot::parse(slot) else {
        return Some(Err(format!("{slot} is not a slot (UDF0..UDF9)")));
    };
    let field = parts.next().unwrap_or_default();
    let field = match field.to_ascii_uppercase().as_str() {
        "LIBRARY" => Field::Library,
        "INIT" => Field::Init,
        "MAGIC" => Field::Magic,
        _ => return Some(Err(format!("unknown plugin key {key}"))),
    };
    Some(Ok((udf, field)))
}

/// Configuration gathered for one user slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotConfig {
    pub library: Option<String>,
    pub init: Option<String>,
    pub magic: Option<Vec<u8>>,
}

/// A slot with everything needed to load it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginEntry {
    pub slot: UdfSlot,
    pub library: PathBuf,
    pub init: String,
    pub magic: Option<Vec<u8>>,
}

/// Plugin configuration merged over any number of rc files. Feed files in
/// search-path order: the first definition of each key is kept.
#[derive(Debug, Default)]
pub struct PluginConfig {
    slots: BTreeMap<UdfSlot, SlotConfig>,
    diagnostics: Vec<Diagnostic>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, text: &str, source: &str) {
        let (lines, diags) = parse_lines(text, source);
        self.diagnostics.extend(diags);

        for line in lines {
            if line.url.is_some() {
                continue;
            }
            let at = format!("{source}:{}", line.line);
            let (slot, field) = match plugin_key(&line.key) {
                None => continue,
                Some(Err(msg)) => {
                    self.diagnostics.push(Diagnostic::new(at, msg));
                    continue;
                }
                Some(Ok(parsed)) => parsed,
            };

            let entry = self.slots.entry(slot).or_default();
            match field {
                Field::Library if entry.library.is_none() => entry.library = Some(line.value),
                Field::Init if entry.init.is_none() => entry.init = Some(line.value),
                Field::Magic if entry.magic.is_none() => match unescape_magic(&line.value) {
                    Ok(m) if m.is_empty() => {
                        self.diagnostics.push(Diagnostic::new(at, "empty magic number"));
                    }
                    Ok(m) if m.len() > MAX_MAGIC_LEN => self.diagnostics.push(Diagnostic::new(
                        at,
                        format!("magic number is {} bytes, maximum is {MAX_MAGIC_LEN}", m.len()),
                    )),
                    Ok(m) => entry.magic = Some(m),
                    Err(msg) => self
                        .diagnostics
                        .push(Diagnostic::new(at, format!("bad magic: {msg}"))),
                },
                _ => debug!(key = %line.key, %at, "shadowed by an earlier definition"),
            }
        }
    }

    pub fn slot(&self, slot: UdfSlot) -> Option<&SlotConfig> {
        self.slots.get(&slot)
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Diagnostics from parsing so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Complete entries, plus a diagnostic for every slot that has only one
    /// of `LIBRARY` and `INIT`.
    pub fn entries(&self) -> (Vec<PluginEntry>, Vec<Diagnostic>) {
        let mut entries = Vec::new();
        let mut skipped = self.diagnostics.clone();

        for (&slot, cfg) in &self.slots {
            match (&cfg.library, &cfg.init) {
                (Some(library), Some(init)) => entries.push(PluginEntry {
                    slot,
                    library: PathBuf::from(library),
                    init: init.clone(),
                    magic: cfg.magic.clone(),
                }),
                (None, None) => {}
                (lib, _) => {
                    let missing = if lib.is_none() { "LIBRARY" } else { "INIT" };
                    warn!(%slot, missing, "partial plugin configuration skipped");
                    skipped.push(Diagnostic::new(
                        slot.name(),
                        format!("NETCDF.{}.{missing} is not set; slot skipped", slot.name()),
                    ));
                }
            }
        }
        (entries, skipped)
    }
}
