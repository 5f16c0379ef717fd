//! Format registry: routing value -> backend table (+ optional magic).
//!
//! The registry is a plain value with `&mut self` registration. It does no
//! locking of its own; the usage contract is "register everything at startup,
//! then only read". A process-wide instance, if wanted, is wrapped by the
//! caller (see `nep_plugins::runtime`).

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use nep_abi::{
    BuiltinFormat, DispatchTable, Mode, NcError, NcResult, Slot, UdfSlot, MAX_MAGIC_LEN,
    NEP_DISPATCH_VERSION,
};

/// One registered backend.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    pub slot: Slot,
    pub table: &'static DispatchTable,
    pub magic: Option<Vec<u8>>,
    /// Capability flags given at registration (e.g. `NETCDF4` = HDF5-backed).
    pub caps: Mode,
    /// Registry revision at which this descriptor was stored.
    pub revision: u64,
}

impl FormatDescriptor {
    pub fn matches_magic(&self, prefix: &[u8]) -> bool {
        self.magic.as_deref().is_some_and(|m| prefix.starts_with(m))
    }
}

/// Why a user slot's plugin could not be activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuarantineReason {
    AbiMismatch { expected: u32, found: u32 },
    PluginLoad(String),
}

impl QuarantineReason {
    pub fn from_error(err: &NcError) -> Self {
        match err {
            NcError::AbiMismatch { expected, found } => QuarantineReason::AbiMismatch {
                expected: *expected,
                found: *found,
            },
            other => QuarantineReason::PluginLoad(other.to_string()),
        }
    }

    pub fn to_error(&self, slot: UdfSlot) -> NcError {
        match self {
            QuarantineReason::AbiMismatch { expected, found } => NcError::AbiMismatch {
                expected: *expected,
                found: *found,
            },
            QuarantineReason::PluginLoad(why) => NcError::PluginLoad(format!("{slot}: {why}")),
        }
    }
}

/// A user slot whose configured plugin failed to load.
#[derive(Debug, Clone, Serialize)]
pub struct Quarantined {
    pub slot: UdfSlot,
    pub magic: Option<Vec<u8>>,
    pub reason: QuarantineReason,
}

/// User-slot state captured by [`Registry::snapshot_users`].
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    users: [Option<FormatDescriptor>; UdfSlot::COUNT as usize],
    user_order: Vec<UdfSlot>,
    quarantined: HashMap<UdfSlot, Quarantined>,
}

#[derive(Debug, Default)]
pub struct Registry {
    builtins: HashMap<BuiltinFormat, FormatDescriptor>,
    users: [Option<FormatDescriptor>; UdfSlot::COUNT as usize],
    /// User slots in first-registration order; the magic scan follows it.
    user_order: Vec<UdfSlot>,
    quarantined: HashMap<UdfSlot, Quarantined>,
    revision: u64,
}

fn validate_magic(magic: Option<&[u8]>) -> NcResult<()> {
    match magic {
        Some([]) => Err(NcError::InvalidArgument("empty magic number".into())),
        Some(m) if m.len() > MAX_MAGIC_LEN => Err(NcError::InvalidArgument(format!(
            "magic number is {} bytes, maximum is {MAX_MAGIC_LEN}",
            m.len()
        ))),
        _ => Ok(()),
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `table` at `slot`, replacing any previous occupant.
    ///
    /// All inputs are validated before anything changes: a rejected call
    /// leaves the registry exactly as it was.
    pub fn register(
        &mut self,
        slot: Slot,
        table: &'static DispatchTable,
        magic: Option<&[u8]>,
        caps: Mode,
    ) -> NcResult<()> {
        if table.version != NEP_DISPATCH_VERSION {
            return Err(NcError::AbiMismatch {
                expected: NEP_DISPATCH_VERSION,
                found: table.version,
            });
        }
        validate_magic(magic)?;
        if caps != caps.capabilities() {
            return Err(NcError::InvalidArgument(format!(
                "capability flags {:#x} include non-capability bits",
                caps.bits()
            )));
        }

        self.revision += 1;
        let descriptor = FormatDescriptor {
            slot,
            table,
            magic: magic.map(<[u8]>::to_vec),
            caps,
            revision: self.revision,
        };

        let previous = match slot {
            Slot::Builtin(b) => self.builtins.insert(b, descriptor),
            Slot::User(u) => {
                if !self.user_order.contains(&u) {
                    self.user_order.push(u);
                }
                if self.quarantined.remove(&u).is_some() {
                    info!(slot = %u, "registration clears quarantine");
                }
                self.users[u.index() as usize].replace(descriptor)
            }
        };

        match previous {
            Some(old) if std::ptr::eq(old.table, table) => {
                debug!(%slot, "re-registered same table");
            }
            Some(_) => info!(%slot, "replaced registered format"),
            None => debug!(%slot, magic = ?magic, "registered format"),
        }
        Ok(())
    }

    /// Registration keyed by mode flags: exactly one `UDFn` bit, optionally
    /// with capability flags. This is the call plugin initializers reach.
    pub fn register_mode(
        &mut self,
        mode: Mode,
        table: &'static DispatchTable,
        magic: Option<&[u8]>,
    ) -> NcResult<()> {
        let slot = Slot::from_registration_mode(mode)?;
        self.register(slot, table, magic, mode.capabilities())
    }

    pub fn lookup(&self, slot: Slot) -> NcResult<&FormatDescriptor> {
        let found = match slot {
            Slot::Builtin(b) => self.builtins.get(&b),
            Slot::User(u) => self.users[u.index() as usize].as_ref(),
        };
        found.ok_or_else(|| NcError::NoSuchFormat(slot.name()))
    }

    pub fn is_registered(&self, slot: Slot) -> bool {
        self.lookup(slot).is_ok()
    }

    /// Table and magic registered for a user slot.
    pub fn inq_user_format(&self, slot: UdfSlot) -> NcResult<(&'static DispatchTable, Option<&[u8]>)> {
        let d = self.lookup(Slot::User(slot))?;
        Ok((d.table, d.magic.as_deref()))
    }

    /// First descriptor whose magic is a prefix of `prefix`: built-ins in
    /// fixed priority order, then user slots in registration order.
    pub fn find_by_magic(&self, prefix: &[u8]) -> Option<&FormatDescriptor> {
        self.entries().find(|d| d.matches_magic(prefix))
    }

    /// All descriptors in magic-scan order.
    pub fn entries(&self) -> impl Iterator<Item = &FormatDescriptor> + '_ {
        let priority: &'static [BuiltinFormat] = &BuiltinFormat::MAGIC_PRIORITY;
        let all: &'static [BuiltinFormat] = &BuiltinFormat::ALL;
        let builtins = priority
            .iter()
            .chain(all.iter().filter(move |b| !priority.contains(b)))
            .filter_map(|b| self.builtins.get(b));
        let users = self
            .user_order
            .iter()
            .filter_map(|u| self.users[u.index() as usize].as_ref());
        builtins.chain(users)
    }

    /// Monotonic counter bumped by every successful registration.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn revision_of(&self, slot: Slot) -> Option<u64> {
        self.lookup(slot).ok().map(|d| d.revision)
    }

    /// Record that `slot`'s plugin failed to load. Detection that would pick
    /// it reports `reason` instead of "unknown format".
    pub fn quarantine(&mut self, slot: UdfSlot, magic: Option<Vec<u8>>, reason: QuarantineReason) {
        self.quarantined.insert(slot, Quarantined { slot, magic, reason });
    }

    pub fn quarantined(&self, slot: UdfSlot) -> Option<&Quarantined> {
        self.quarantined.get(&slot)
    }

    /// Quarantined slots whose configured magic prefixes `prefix`.
    pub fn find_quarantined_by_magic(&self, prefix: &[u8]) -> Option<&Quarantined> {
        UdfSlot::all()
            .filter_map(|u| self.quarantined.get(&u))
            .find(|q| q.magic.as_deref().is_some_and(|m| prefix.starts_with(m)))
    }

    pub fn quarantined_entries(&self) -> impl Iterator<Item = &Quarantined> + '_ {
        UdfSlot::all().filter_map(|u| self.quarantined.get(&u))
    }

    /// Capture every user slot, its scan order and the quarantine records.
    /// Built-in slots are not included: initializers cannot reach them.
    pub fn snapshot_users(&self) -> UserSnapshot {
        UserSnapshot {
            users: self.users.clone(),
            user_order: self.user_order.clone(),
            quarantined: self.quarantined.clone(),
        }
    }

    /// Put the user slots back as `snapshot` found them. The revision counter
    /// keeps counting up, so a slot re-registered later never reuses a
    /// revision handed out before the rollback.
    pub fn restore_users(&mut self, snapshot: UserSnapshot) {
        for (u, (now, then)) in UdfSlot::all().zip(self.users.iter().zip(&snapshot.users)) {
            let changed = match (now, then) {
                (Some(a), Some(b)) => a.revision != b.revision,
                (None, None) => false,
                _ => true,
            };
            if changed {
                info!(slot = %u, "registration rolled back");
            }
        }
        self.users = snapshot.users;
        self.user_order = snapshot.user_order;
        self.quarantined = snapshot.quarantined;
    }
}
