//! Parameter store placement for multi-device training

use crate::config::Placement;
use crate::error::{Error, Result};
use crate::model::ParamSet;
use std::ops::Deref;
use std::sync::{RwLock, RwLockReadGuard};

/// Master copy of the parameters shared by all replicas
///
/// `Device` keeps the parameters in the owning replica's slot; replicas
/// borrow them read-only while the step fans out and the update takes them
/// mutably after fan-in. `Host` keeps them behind a lock in host memory.
#[derive(Debug)]
pub enum ParameterStore {
    Device { owner: usize, params: ParamSet },
    Host(RwLock<ParamSet>),
}

/// Read access to the stored parameters
pub enum ParamsRef<'a> {
    Device(&'a ParamSet),
    Host(RwLockReadGuard<'a, ParamSet>),
}

impl Deref for ParamsRef<'_> {
    type Target = ParamSet;

    fn deref(&self) -> &ParamSet {
        match self {
            ParamsRef::Device(params) => *params,
            ParamsRef::Host(guard) => &**guard,
        }
    }
}

fn poisoned() -> Error {
    Error::Execution("host parameter store lock poisoned by a failed replica".into())
}

impl ParameterStore {
    /// Store `params` according to `placement`
    pub fn new(placement: Placement, params: ParamSet) -> Self {
        match placement {
            Placement::Gpu => ParameterStore::Device { owner: 0, params },
            Placement::Cpu => ParameterStore::Host(RwLock::new(params)),
        }
    }

    /// Placement of this store
    pub fn placement(&self) -> Placement {
        match self {
            ParameterStore::Device { .. } => Placement::Gpu,
            ParameterStore::Host(_) => Placement::Cpu,
        }
    }

    /// Replica slot holding a device-placed store
    pub fn owner(&self) -> Option<usize> {
        match self {
            ParameterStore::Device { owner, .. } => Some(*owner),
            ParameterStore::Host(_) => None,
        }
    }

    /// Shared read access for replicas
    pub fn read(&self) -> Result<ParamsRef<'_>> {
        match self {
            ParameterStore::Device { params, .. } => Ok(ParamsRef::Device(params)),
            ParameterStore::Host(lock) => lock.read().map(ParamsRef::Host).map_err(|_| poisoned()),
        }
    }

    /// Exclusive update after all replicas finished
    pub fn update<R>(&mut self, f: impl FnOnce(&mut ParamSet) -> Result<R>) -> Result<R> {
        match self {
            ParameterStore::Device { params, .. } => f(params),
            ParameterStore::Host(lock) => {
                let mut guard = lock.write().map_err(|_| poisoned())?;
                f(&mut guard)
            }
        }
    }

    /// Copy of the current parameters
    pub fn snapshot(&self) -> Result<ParamSet> {
        self.read().map(|params| params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> ParamSet {
        ParamSet::new().with("w", array![[1.0, 2.0]])
    }

    #[test]
    fn test_placement_roundtrip() {
        assert_eq!(ParameterStore::new(Placement::Gpu, params()).placement(), Placement::Gpu);
        assert_eq!(ParameterStore::new(Placement::Cpu, params()).placement(), Placement::Cpu);
    }

    #[test]
    fn test_owner_only_for_device_store() {
        assert_eq!(ParameterStore::new(Placement::Gpu, params()).owner(), Some(0));
        assert_eq!(ParameterStore::new(Placement::Cpu, params()).owner(), None);
    }

    #[test]
    fn test_update_visible_to_readers() {
        for placement in [Placement::Gpu, Placement::Cpu] {
            let mut store = ParameterStore::new(placement, params());
            store
                .update(|p| {
                    p.scale(2.0);
                    Ok(())
                })
                .unwrap();
            assert_eq!(store.read().unwrap().get("w").unwrap()[[0, 1]], 4.0);
            assert_eq!(store.snapshot().unwrap().get("w").unwrap()[[0, 0]], 2.0);
        }
    }

    #[test]
    fn test_failed_update_propagates() {
        let mut store = ParameterStore::new(Placement::Cpu, params());
        let result: Result<()> = store.update(|_| Err(Error::Execution("boom".into())));
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
