// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Name -> routine resolution against a dynamically loaded unit or an
// in-process registry.
//
// Trust boundary: a resolved foreign routine runs with the full privileges
// of the invoker process. Nothing here contains a crash, hang or memory
// corruption inside the callee; only load a unit you would link statically.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::identity::CallbackIdentity;

/// Signature every exported callback must have: no arguments, no return.
pub type RawRoutine = unsafe extern "C" fn();

type LocalRoutine = dyn Fn() + Send + Sync;

enum Target<'a> {
    Foreign(libloading::Symbol<'a, RawRoutine>),
    Local(&'a LocalRoutine),
}

/// An invocable entry point, borrowed from the source that resolved it.
pub struct ResolvedRoutine<'a> {
    name: String,
    target: Target<'a>,
}

impl ResolvedRoutine<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the routine. Fire-and-forget: no arguments, no result.
    pub fn invoke(&self) {
        match &self.target {
            // Foreign code past this point; see the module trust boundary.
            Target::Foreign(sym) => {
                let f: RawRoutine = **sym;
                unsafe { f() }
            }
            Target::Local(f) => f(),
        }
    }
}

impl fmt::Debug for ResolvedRoutine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            Target::Foreign(_) => "foreign",
            Target::Local(_) => "local",
        };
        f.debug_struct("ResolvedRoutine")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Something callback names can be looked up in.
pub trait RoutineSource {
    fn resolve(&self, identity: &CallbackIdentity) -> Result<ResolvedRoutine<'_>>;

    fn describe(&self) -> String;
}

impl<T: RoutineSource + ?Sized> RoutineSource for &T {
    fn resolve(&self, identity: &CallbackIdentity) -> Result<ResolvedRoutine<'_>> {
        (**self).resolve(identity)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Produces a fresh [`RoutineSource`] for each invocation attempt.
pub trait RoutinePool {
    fn open(&self) -> Result<Box<dyn RoutineSource + '_>>;
}

// ---------------------------------------------------------------------------
// LoadableUnit: shared library opened with the platform loader
// ---------------------------------------------------------------------------

/// A shared library whose exported `extern "C" fn()` symbols are callbacks.
/// The library is unloaded when this value is dropped or closed.
pub struct LoadableUnit {
    lib: libloading::Library,
    path: PathBuf,
}

impl LoadableUnit {
    /// Load the unit at `path`. Its initialisers run here, inside the
    /// invoker process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lib = unsafe { libloading::Library::new(&path) }.map_err(|source| Error::UnitLoad {
            path: path.clone(),
            source,
        })?;
        debug!("loaded unit {}", path.display());
        Ok(Self { lib, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unload explicitly, surfacing the loader's error instead of dropping it.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.lib.close().map_err(|source| Error::UnitLoad {
            path: path.clone(),
            source,
        })?;
        debug!("released unit {}", path.display());
        Ok(())
    }
}

impl RoutineSource for LoadableUnit {
    fn resolve(&self, identity: &CallbackIdentity) -> Result<ResolvedRoutine<'_>> {
        let sym = unsafe { self.lib.get::<RawRoutine>(identity.as_bytes()) }.map_err(|e| {
            Error::SymbolResolution {
                name: identity.to_string(),
                detail: e.to_string(),
            }
        })?;
        Ok(ResolvedRoutine {
            name: identity.to_string(),
            target: Target::Foreign(sym),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pool that loads the unit at a fixed path for every attempt.
#[derive(Debug, Clone)]
pub struct UnitPool {
    path: PathBuf,
}

impl UnitPool {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RoutinePool for UnitPool {
    fn open(&self) -> Result<Box<dyn RoutineSource + '_>> {
        Ok(Box::new(LoadableUnit::open(&self.path)?))
    }
}

// ---------------------------------------------------------------------------
// StaticRoutines: in-process registry
// ---------------------------------------------------------------------------

/// Callbacks linked into the invoker itself, keyed by name.
#[derive(Default)]
pub struct StaticRoutines {
    routines: HashMap<String, Box<LocalRoutine>>,
}

impl StaticRoutines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the routine registered under `identity`.
    pub fn register<F>(&mut self, identity: CallbackIdentity, f: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.routines.insert(identity.into_string(), Box::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

impl RoutineSource for StaticRoutines {
    fn resolve(&self, identity: &CallbackIdentity) -> Result<ResolvedRoutine<'_>> {
        let f = self
            .routines
            .get(identity.as_str())
            .ok_or_else(|| Error::SymbolResolution {
                name: identity.to_string(),
                detail: "no such routine registered".to_owned(),
            })?;
        Ok(ResolvedRoutine {
            name: identity.to_string(),
            target: Target::Local(f.as_ref()),
        })
    }

    fn describe(&self) -> String {
        format!("static registry ({} routines)", self.routines.len())
    }
}

impl RoutinePool for StaticRoutines {
    fn open(&self) -> Result<Box<dyn RoutineSource + '_>> {
        Ok(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn id(s: &str) -> CallbackIdentity {
        CallbackIdentity::new(s).unwrap()
    }

    #[test]
    fn static_resolve_and_invoke() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let mut reg = StaticRoutines::new();
        reg.register(id("R"), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let routine = reg.resolve(&id("R")).unwrap();
        assert_eq!(routine.name(), "R");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        routine.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_missing_is_symbol_error() {
        let reg = StaticRoutines::new();
        let err = reg.resolve(&id("R_missing")).unwrap_err();
        assert!(matches!(err, Error::SymbolResolution { ref name, .. } if name == "R_missing"));
        assert!(err.is_resolution_failure());
    }

    #[test]
    fn missing_unit_is_load_error() {
        let err = LoadableUnit::open("/nonexistent/dir/libnothing.so").err().unwrap();
        assert!(matches!(err, Error::UnitLoad { .. }));
        assert!(err.is_resolution_failure());
    }

    #[test]
    fn pool_over_static_registry() {
        let mut reg = StaticRoutines::new();
        reg.register(id("a"), || {}).register(id("b"), || {});
        assert_eq!(reg.len(), 2);
        let source = RoutinePool::open(&reg).unwrap();
        assert!(source.resolve(&id("b")).is_ok());
        assert!(source.describe().contains("2 routines"));
    }
}
