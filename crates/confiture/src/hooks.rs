//! Hook Registry & Executor (spec §4.7): resolves named hooks and invokes
//! them in phase order around a migration unit's apply, each call isolated
//! in its own savepoint.
//!
//! Hooks are explicitly registered by the embedding application — there is
//! no entry-point/plugin-discovery magic here (the teacher's `inventory`
//! registry doesn't fit a library whose hooks are authored by downstream
//! crates, not compiled into this one).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_postgres::Transaction;

use crate::error::{Error, HookError, Result};

/// The six points in a unit's apply lifecycle a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeValidation,
    BeforeDdl,
    AfterDdl,
    AfterValidation,
    Cleanup,
    OnError,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookPhase::BeforeValidation => "before_validation",
            HookPhase::BeforeDdl => "before_ddl",
            HookPhase::AfterDdl => "after_ddl",
            HookPhase::AfterValidation => "after_validation",
            HookPhase::Cleanup => "cleanup",
            HookPhase::OnError => "on_error",
        };
        f.write_str(s)
    }
}

/// Direction a unit is being applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Per-unit context passed to every hook invoked for that unit. Owned by
/// the Migration Engine for the unit's lifetime; hooks may read and write
/// `scratchpad` but must not retain references past their call.
pub struct HookContext {
    pub migration_name: String,
    pub migration_version: String,
    pub direction: Direction,
    pub scratchpad: HashMap<String, Value>,
}

impl HookContext {
    pub fn new(migration_version: impl Into<String>, migration_name: impl Into<String>, direction: Direction) -> Self {
        HookContext {
            migration_name: migration_name.into(),
            migration_version: migration_version.into(),
            direction,
            scratchpad: HashMap::new(),
        }
    }
}

/// A unit of lifecycle logic, run within the caller's transaction.
///
/// Implemented by hand rather than with an `async-trait`-style macro (not
/// part of this crate's dependency stack) so `Box<dyn Hook>` stays usable:
/// `run` returns a boxed future explicitly instead of using `async fn` in
/// the trait, which trait objects can't yet call.
pub trait Hook: Send + Sync {
    /// Unique, stable name used in error reporting and name-conflict checks.
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        tx: &'a Transaction<'a>,
        ctx: &'a mut HookContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Explicit phase-ordered registration of hooks. No discovery: the
/// embedding application registers every hook it wants run.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<HookPhase, Vec<Box<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, phase: HookPhase, hook: Box<dyn Hook>) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    fn hooks_for(&self, phase: HookPhase) -> &[Box<dyn Hook>] {
        self.hooks.get(&phase).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Runs the hooks of one phase against a savepoint, wrapping the first
/// failure in `HookError` and asking the caller to roll back to the given
/// savepoint name.
pub struct HookExecutor<'a> {
    registry: &'a HookRegistry,
}

impl<'a> HookExecutor<'a> {
    pub fn new(registry: &'a HookRegistry) -> Self {
        HookExecutor { registry }
    }

    /// Run every hook registered for `phase`, in registration order. On the
    /// first failure, returns a `HookError` naming the failing hook; the
    /// caller is responsible for rolling back to its savepoint (`ON_ERROR`
    /// phase is the one exception — failures there are logged, not raised,
    /// per spec).
    pub async fn run_phase(
        &self,
        tx: &Transaction<'_>,
        phase: HookPhase,
        ctx: &mut HookContext,
    ) -> Result<()> {
        for hook in self.registry.hooks_for(phase) {
            if let Err(err) = hook.run(tx, ctx).await {
                if phase == HookPhase::OnError {
                    tracing::warn!(
                        hook = hook.name(),
                        phase = %phase,
                        error = %err,
                        "on_error hook failed; continuing best-effort"
                    );
                    continue;
                }
                return Err(Error::Hook(HookError {
                    hook_name: hook.name().to_string(),
                    phase: phase.to_string(),
                    underlying: Box::new(err),
                }));
            }
        }
        Ok(())
    }
}
