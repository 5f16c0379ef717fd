use serde::{Deserialize, Serialize};

use nep_abi::{Slot, MAX_MAGIC_LEN};

/// Engine knobs. Everything here is optional; `EngineConfig::default()` is
/// what the process-wide engine uses unless told otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Format used by `create` when the mode flags name none. `None` makes
    /// such a create fail with "unknown format".
    pub default_create_format: Option<Slot>,
    /// Whether the filename-extension heuristic (last detection rule) runs.
    pub extension_hints: bool,
    /// Bytes read from the head of a file for magic sniffing.
    pub sniff_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_create_format: None,
            extension_hints: true,
            sniff_len: MAX_MAGIC_LEN,
        }
    }
}

impl EngineConfig {
    /// Sniff length actually used: never shorter than the longest magic.
    pub fn effective_sniff_len(&self) -> usize {
        self.sniff_len.max(MAX_MAGIC_LEN)
    }

    pub fn with_default_create_format(mut self, slot: Slot) -> Self {
        self.default_create_format = Some(slot);
        self
    }
}
