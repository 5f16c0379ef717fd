use std::any::Any;

use crate::dispatch::DispatchTable;
use crate::error::{NcError, NcResult};
use crate::types::{Mode, Ncid, Slot};

/// Per-session context handed to every dispatch slot.
///
/// The engine fills in identity, path, mode, and the bound table; the backend
/// owns `state` (set during `open`/`create`, dropped by the engine after
/// `close`/`abort`).
pub struct OpenFile {
    session: u16,
    slot: Slot,
    path: String,
    mode: Mode,
    table: &'static DispatchTable,
    internal_id: Option<i32>,
    state: Option<Box<dyn Any + Send>>,
}

impl OpenFile {
    pub fn new(
        session: u16,
        slot: Slot,
        path: impl Into<String>,
        mode: Mode,
        table: &'static DispatchTable,
    ) -> Self {
        Self {
            session,
            slot,
            path: path.into(),
            mode,
            table,
            internal_id: None,
            state: None,
        }
    }

    /// Root-group id of this session.
    #[inline]
    pub fn ncid(&self) -> Ncid {
        Ncid::new(self.session, 0)
    }

    #[inline]
    pub fn session(&self) -> u16 {
        self.session
    }

    #[inline]
    pub fn slot(&self) -> Slot {
        self.slot
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.mode.contains(Mode::WRITE)
    }

    /// The table this session is bound to. Generic defaults route through it.
    #[inline]
    pub fn table(&self) -> &'static DispatchTable {
        self.table
    }

    /// Backend-private identifier, if the backend assigned one.
    pub fn internal_id(&self) -> Option<i32> {
        self.internal_id
    }

    pub fn set_internal_id(&mut self, id: i32) {
        self.internal_id = Some(id);
    }

    pub fn set_state<T: Any + Send>(&mut self, state: T) {
        self.state = Some(Box::new(state));
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub fn state<T: Any + Send>(&self) -> NcResult<&T> {
        self.state
            .as_deref()
            .and_then(|s| s.downcast_ref::<T>())
            .ok_or(NcError::BadHandle(self.ncid()))
    }

    pub fn state_mut<T: Any + Send>(&mut self) -> NcResult<&mut T> {
        let ncid = self.ncid();
        self.state
            .as_deref_mut()
            .and_then(|s| s.downcast_mut::<T>())
            .ok_or(NcError::BadHandle(ncid))
    }

    /// Remove the backend state; the engine calls this once the session ends.
    pub fn take_state(&mut self) -> Option<Box<dyn Any + Send>> {
        self.state.take()
    }

    /// Reject the call unless this session was opened for writing.
    pub fn require_writable(&self, what: &str) -> NcResult<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(NcError::read_only(format!("{what}: {} opened read-only", self.path)))
        }
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile")
            .field("session", &self.session)
            .field("slot", &self.slot)
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}
