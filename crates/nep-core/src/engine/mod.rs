//! Handle/session layer.
//!
//! `Engine` owns the registry, the configuration, and the table of live
//! sessions. Registration needs `&mut Engine`; everything after startup
//! (open, create, routed operations, close) works on `&Engine`, so one engine
//! can serve several threads. Each session sits behind its own mutex: calls on
//! different handles never contend with each other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use nep_abi::{DispatchTable, Mode, NcError, NcResult, Ncid, OpenFile, Slot};

use crate::config::EngineConfig;
use crate::detect::{self, Detection, OpenRequest};
use crate::registry::Registry;

// Child modules can reach the private fields below.
mod lifecycle;
mod routed;

type SessionRef = Arc<Mutex<OpenFile>>;

#[derive(Default)]
struct Sessions {
    live: HashMap<u16, SessionRef>,
    /// Ids handed out to opens still in progress.
    reserved: HashSet<u16>,
    last: u16,
}

impl Sessions {
    /// Next free session id in `1..=Ncid::MAX_SESSION`. Ids grow
    /// monotonically, then wrap to 1 and skip ids still in use.
    fn reserve(&mut self) -> NcResult<u16> {
        for _ in 0..Ncid::MAX_SESSION {
            self.last = if self.last >= Ncid::MAX_SESSION {
                1
            } else {
                self.last + 1
            };
            if !self.live.contains_key(&self.last) && !self.reserved.contains(&self.last) {
                self.reserved.insert(self.last);
                return Ok(self.last);
            }
        }
        Err(NcError::InvalidArgument("too many open datasets".into()))
    }
}

pub struct Engine {
    registry: Registry,
    config: EngineConfig,
    sessions: Mutex<Sessions>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: Registry::new(),
            config,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Register a backend at any slot (built-in or user-defined).
    pub fn register(
        &mut self,
        slot: Slot,
        table: &'static DispatchTable,
        magic: Option<&[u8]>,
    ) -> NcResult<()> {
        self.registry.register(slot, table, magic, Mode::empty())
    }

    /// `nc_def_user_format` analogue: the slot and capabilities come from `mode`.
    pub fn def_user_format(
        &mut self,
        mode: Mode,
        table: &'static DispatchTable,
        magic: Option<&[u8]>,
    ) -> NcResult<()> {
        self.registry.register_mode(mode, table, magic)
    }

    /// Run format detection without opening anything.
    pub fn detect(&self, req: &OpenRequest<'_>) -> NcResult<Detection> {
        detect::detect_open(&self.registry, &self.config, req)
    }

    /// Number of live session handles.
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().expect("session table poisoned").live.len()
    }

    fn session(&self, ncid: Ncid) -> NcResult<SessionRef> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        sessions
            .live
            .get(&ncid.session())
            .cloned()
            .ok_or(NcError::BadHandle(ncid))
    }

    /// Run `f` against the session that owns `ncid`.
    fn with_session<R>(
        &self,
        ncid: Ncid,
        f: impl FnOnce(&mut OpenFile) -> NcResult<R>,
    ) -> NcResult<R> {
        let handle = self.session(ncid)?;
        let mut file = handle.lock().expect("session poisoned");
        f(&mut file)
    }

    /// Remove a session from the live table; later lookups see `BadHandle`.
    fn retire(&self, ncid: Ncid) -> NcResult<SessionRef> {
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        sessions
            .live
            .remove(&ncid.session())
            .ok_or(NcError::BadHandle(ncid))
    }
}
