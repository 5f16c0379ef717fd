use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use nep_abi::{DispatchTable, Mode, NcError, NcResult, Ncid, OpenFile, Slot, NEP_DISPATCH_VERSION};

use super::Engine;
use crate::detect::{self, Detection, OpenRequest};

impl Engine {
    /// Open an existing dataset. Returns the root-group id of a new session.
    pub fn open(&self, path: &str, mode: Mode) -> NcResult<Ncid> {
        self.open_with(&OpenRequest::new(path, mode))
    }

    /// Open a dataset held in memory. Detection sniffs `image`, not the disk.
    pub fn open_mem(&self, path: &str, mode: Mode, image: &[u8]) -> NcResult<Ncid> {
        self.open_with(&OpenRequest::new(path, mode).with_memory(image))
    }

    pub fn open_with(&self, req: &OpenRequest<'_>) -> NcResult<Ncid> {
        let detection = self.detect(req)?;
        let table = self.registry.lookup(detection.slot)?.table;
        let open = table
            .open
            .ok_or_else(|| NcError::unsupported(format!("open ({})", detection.slot)))?;
        let memory = req.memory;
        self.start_session(detection, table, req.mode, |file| open(file, memory))
    }

    /// Create a new dataset. The format comes from the mode flags (or the
    /// configured default); nothing is sniffed.
    pub fn create(&self, path: &str, mode: Mode) -> NcResult<Ncid> {
        self.create_with(path, mode, None, None)
    }

    /// Create with an explicit format and/or an initial in-memory image.
    pub fn create_with(
        &self,
        path: &str,
        mode: Mode,
        format: Option<Slot>,
        initial: Option<&[u8]>,
    ) -> NcResult<Ncid> {
        let detection = detect::detect_create(&self.registry, &self.config, path, mode, format)?;
        let on_disk = !mode.intersects(Mode::INMEMORY | Mode::DISKLESS);
        if mode.contains(Mode::NOCLOBBER) && on_disk && Path::new(path).exists() {
            return Err(NcError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{path} exists and NOCLOBBER is set"),
            )));
        }
        let table = self.registry.lookup(detection.slot)?.table;
        let create = table
            .create
            .ok_or_else(|| NcError::unsupported(format!("create ({})", detection.slot)))?;
        self.start_session(detection, table, mode | Mode::WRITE, |file| create(file, initial))
    }

    /// Bind `table` to a fresh session and run the backend's open/create.
    /// Nothing becomes visible to callers unless `init` succeeds.
    fn start_session(
        &self,
        detection: Detection,
        table: &'static DispatchTable,
        mode: Mode,
        init: impl FnOnce(&mut OpenFile) -> NcResult<()>,
    ) -> NcResult<Ncid> {
        if !table.is_current() {
            return Err(NcError::AbiMismatch {
                expected: NEP_DISPATCH_VERSION,
                found: table.version,
            });
        }

        let id = self.sessions.lock().expect("session table poisoned").reserve()?;
        let mut file = OpenFile::new(id, detection.slot, detection.path, mode, table);
        let result = init(&mut file);

        let mut sessions = self.sessions.lock().expect("session table poisoned");
        sessions.reserved.remove(&id);
        match result {
            Ok(()) => {
                let ncid = file.ncid();
                info!(%ncid, slot = %file.slot(), path = file.path(), "session opened");
                sessions.live.insert(id, Arc::new(Mutex::new(file)));
                Ok(ncid)
            }
            Err(e) => {
                drop(sessions);
                debug!(slot = %file.slot(), path = file.path(), error = %e, "open failed");
                file.take_state();
                Err(e)
            }
        }
    }

    /// Close a session. The handle is invalid afterwards even if the backend
    /// reports an error. In-memory datasets return their final image.
    pub fn close(&self, ncid: Ncid) -> NcResult<Option<Vec<u8>>> {
        let handle = self.retire(ncid)?;
        let mut file = handle.lock().expect("session poisoned");
        let result = match file.table().close {
            Some(close) => close(&mut file),
            None => Ok(None),
        };
        file.take_state();
        debug!(%ncid, path = file.path(), ok = result.is_ok(), "session closed");
        result
    }

    /// Close without committing pending changes.
    pub fn abort(&self, ncid: Ncid) -> NcResult<()> {
        let handle = self.retire(ncid)?;
        let mut file = handle.lock().expect("session poisoned");
        let table = file.table();
        let result = match (table.abort, table.close) {
            (Some(abort), _) => abort(&mut file),
            (None, Some(close)) => close(&mut file).map(|_| ()),
            (None, None) => Ok(()),
        };
        file.take_state();
        debug!(%ncid, path = file.path(), "session aborted");
        result
    }
}
