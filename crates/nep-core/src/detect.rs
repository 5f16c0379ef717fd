//! Format detection.
//!
//! Open requests are resolved by the first rule that matches:
//!
//! 0. an explicit format override supplied by the caller;
//! 1. mode flags that name exactly one format;
//! 2. a recognized network URL scheme (or a `#mode=` fragment);
//! 3. magic-number match on the first bytes of the target;
//! 4. filename-extension hint, if enabled and the hinted slot is registered.
//!
//! Anything else is "unknown format". Creates use rules 0 and 1, then the
//! configured default; no bytes are sniffed.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use url::Url;

use nep_abi::{BuiltinFormat, Mode, NcError, NcResult, Slot};

use crate::config::EngineConfig;
use crate::registry::Registry;

/// A request to open an existing dataset.
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub path: &'a str,
    pub mode: Mode,
    /// Explicit override; bypasses every other rule.
    pub format: Option<Slot>,
    /// Caller-supplied image for `INMEMORY` opens.
    pub memory: Option<&'a [u8]>,
}

impl<'a> OpenRequest<'a> {
    pub fn new(path: &'a str, mode: Mode) -> Self {
        Self {
            path,
            mode,
            format: None,
            memory: None,
        }
    }

    pub fn with_format(mut self, slot: Slot) -> Self {
        self.format = Some(slot);
        self
    }

    pub fn with_memory(mut self, image: &'a [u8]) -> Self {
        self.mode |= Mode::INMEMORY;
        self.memory = Some(image);
        self
    }
}

/// The rule that decided a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Explicit,
    ModeFlag,
    Url,
    Magic,
    Extension,
    CreateDefault,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rule::Explicit => "explicit",
            Rule::ModeFlag => "mode flag",
            Rule::Url => "url",
            Rule::Magic => "magic number",
            Rule::Extension => "extension",
            Rule::CreateDefault => "create default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub slot: Slot,
    pub rule: Rule,
    /// Path handed to the backend: the request path, or the local path a
    /// `file://` URL resolves to.
    pub path: String,
}

/// What mode flags alone say about the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeHint {
    None,
    Slot(Slot),
    Ambiguous,
}

/// Interpret mode flags. A single `UDFn` bit wins over `NETCDF4`, which then
/// reads as a capability; conflicting flags are ambiguous.
pub fn mode_hint(mode: Mode) -> ModeHint {
    let udfs = mode.udf_slots();
    match udfs.as_slice() {
        [slot] => return ModeHint::Slot(Slot::User(*slot)),
        [] => {}
        _ => return ModeHint::Ambiguous,
    }
    let netcdf4 = mode.contains(Mode::NETCDF4);
    let classic64 = mode.intersects(Mode::OFFSET_64BIT | Mode::DATA_64BIT);
    match (netcdf4, classic64) {
        (true, true) => ModeHint::Ambiguous,
        (true, false) => ModeHint::Slot(Slot::Builtin(BuiltinFormat::Hdf5)),
        (false, true) => ModeHint::Slot(Slot::Builtin(BuiltinFormat::Nc3)),
        (false, false) => ModeHint::None,
    }
}

/// Outcome of the URL rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlTarget {
    /// Not a URL this engine understands; treat the string as a path.
    NotUrl,
    /// A `file://` URL with no routing fragment: sniff this local path.
    Local(PathBuf),
    Remote(BuiltinFormat),
}

fn fragment_modes(url: &Url) -> Vec<String> {
    let Some(fragment) = url.fragment() else {
        return Vec::new();
    };
    fragment
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .filter(|(k, _)| k.trim().eq_ignore_ascii_case("mode"))
        .flat_map(|(_, v)| v.split(',').map(|m| m.trim().to_ascii_lowercase()))
        .collect()
}

pub fn classify_url(path: &str) -> UrlTarget {
    let Ok(url) = Url::parse(path) else {
        return UrlTarget::NotUrl;
    };
    let modes = fragment_modes(&url);
    let has = |m: &str| modes.iter().any(|x| x == m);
    let scheme = url.scheme();

    if has("zarr") || has("nczarr") || scheme == "s3" {
        return UrlTarget::Remote(BuiltinFormat::NcZarr);
    }
    match scheme {
        "dap4" => UrlTarget::Remote(BuiltinFormat::Dap4),
        "http" | "https" if has("dap4") => UrlTarget::Remote(BuiltinFormat::Dap4),
        "http" | "https" => UrlTarget::Remote(BuiltinFormat::Dap2),
        "file" if has("dap4") => UrlTarget::Remote(BuiltinFormat::Dap4),
        "file" if has("dap2") => UrlTarget::Remote(BuiltinFormat::Dap2),
        "file" => url
            .to_file_path()
            .map_or(UrlTarget::NotUrl, UrlTarget::Local),
        // Unknown schemes, Windows drive letters included, are plain paths.
        _ => UrlTarget::NotUrl,
    }
}

/// Well-known extensions of the built-in formats, consulted last.
pub fn extension_hint(path: &Path) -> Option<Slot> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let format = match ext.as_str() {
        "h5" | "hdf5" | "he5" | "nc4" => BuiltinFormat::Hdf5,
        "nc" | "cdl" => BuiltinFormat::Nc3,
        "zarr" => BuiltinFormat::NcZarr,
        _ => return None,
    };
    Some(Slot::Builtin(format))
}

fn read_prefix(path: &Path, len: usize) -> NcResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Quarantined user slots surface their recorded load error.
fn require_slot(registry: &Registry, slot: Slot) -> NcResult<()> {
    if registry.is_registered(slot) {
        return Ok(());
    }
    if let Slot::User(u) = slot {
        if let Some(q) = registry.quarantined(u) {
            return Err(q.reason.to_error(u));
        }
    }
    Err(NcError::NoSuchFormat(slot.name()))
}

fn decided(slot: Slot, rule: Rule, path: impl Into<String>) -> Detection {
    let d = Detection {
        slot,
        rule,
        path: path.into(),
    };
    debug!(slot = %d.slot, rule = %d.rule, path = %d.path, "format detected");
    d
}

/// Decide which registered format governs an open request.
pub fn detect_open(
    registry: &Registry,
    config: &EngineConfig,
    req: &OpenRequest<'_>,
) -> NcResult<Detection> {
    if let Some(slot) = req.format {
        require_slot(registry, slot)?;
        return Ok(decided(slot, Rule::Explicit, req.path));
    }

    match mode_hint(req.mode) {
        ModeHint::Slot(slot) => {
            require_slot(registry, slot)?;
            return Ok(decided(slot, Rule::ModeFlag, req.path));
        }
        ModeHint::Ambiguous => {
            debug!(mode = ?req.mode, "conflicting format flags; falling through");
        }
        ModeHint::None => {}
    }

    let mut local = PathBuf::from(req.path);
    if req.memory.is_none() {
        match classify_url(req.path) {
            UrlTarget::Remote(format) => {
                let slot = Slot::Builtin(format);
                require_slot(registry, slot)?;
                return Ok(decided(slot, Rule::Url, req.path));
            }
            UrlTarget::Local(p) => local = p,
            UrlTarget::NotUrl => {}
        }
    }

    let sniff_len = config.effective_sniff_len();
    let prefix = match req.memory {
        Some(image) if req.mode.contains(Mode::INMEMORY) => {
            image[..image.len().min(sniff_len)].to_vec()
        }
        _ => read_prefix(&local, sniff_len)?,
    };
    if let Some(d) = registry.find_by_magic(&prefix) {
        return Ok(decided(d.slot, Rule::Magic, local.to_string_lossy()));
    }
    if let Some(q) = registry.find_quarantined_by_magic(&prefix) {
        return Err(q.reason.to_error(q.slot));
    }

    if config.extension_hints {
        if let Some(slot) = extension_hint(&local).filter(|s| registry.is_registered(*s)) {
            return Ok(decided(slot, Rule::Extension, local.to_string_lossy()));
        }
    }

    Err(NcError::DetectionFailed(req.path.to_string()))
}

/// Decide the format of a new dataset from the caller's intent alone.
pub fn detect_create(
    registry: &Registry,
    config: &EngineConfig,
    path: &str,
    mode: Mode,
    format: Option<Slot>,
) -> NcResult<Detection> {
    if let Some(slot) = format {
        require_slot(registry, slot)?;
        return Ok(decided(slot, Rule::Explicit, path));
    }
    match mode_hint(mode) {
        ModeHint::Slot(slot) => {
            require_slot(registry, slot)?;
            Ok(decided(slot, Rule::ModeFlag, path))
        }
        ModeHint::Ambiguous => Err(NcError::InvalidArgument(format!(
            "mode {:#x} names more than one format",
            mode.bits()
        ))),
        ModeHint::None => match config.default_create_format {
            Some(slot) => {
                require_slot(registry, slot)?;
                Ok(decided(slot, Rule::CreateDefault, path))
            }
            None => Err(NcError::DetectionFailed(format!(
                "{path}: mode flags name no format and no default is configured"
            ))),
        },
    }
}
