//! Member discovery
//!
//! Walks the declared assemblies, validates each marked member and builds one
//! [`Profile`] per (declaring type, member) pair. Discovery can run on a
//! background thread through [`ProfilingTask`]; the finished [`ScanBatch`] is
//! handed back in one piece.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use hashbrown::HashSet;

use super::accessor::{AccessorTable, Instantiation, MemberKey, Processor};
use super::assembly::{Assembly, TypeDecl};
use super::member::{DiscoveryRules, MemberDecl};
use crate::error::{ErrorCategory, MonitorError};
use crate::logging::MonitoringLogger;
use crate::profile::{MemberDescriptor, Profile};
use crate::settings::{AssemblySettings, MonitoringSettings};
use crate::value::ValueType;

/// Exact- and prefix-denylist of assembly names
#[derive(Debug, Clone, Default)]
pub struct AssemblyFilter {
    prefixes: Vec<String>,
    names: HashSet<String>,
}

impl AssemblyFilter {
    pub fn new(settings: &AssemblySettings) -> Self {
        Self {
            prefixes: settings.banned_prefixes.clone(),
            names: settings.banned_names.iter().cloned().collect(),
        }
    }

    /// Whether an assembly must not be scanned
    pub fn is_banned(&self, name: &str) -> bool {
        self.names.contains(name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Counters collected during one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub assemblies_scanned: usize,
    pub assemblies_skipped: usize,
    pub types_scanned: usize,
    /// Marked members examined
    pub members_scanned: usize,
    pub profiles_created: usize,
    /// Members skipped because their signature fits no accessor shape
    pub incompatible_members: usize,
    errors: [u64; 6],
}

impl ScanStats {
    /// Errors reported in a category during the scan
    pub fn errors(&self, category: ErrorCategory) -> u64 {
        self.errors[category.index()]
    }
}

/// Output of a completed scan
#[derive(Debug)]
pub struct ScanBatch {
    pub profiles: Vec<Profile>,
    pub table: AccessorTable,
    pub stats: ScanStats,
}

/// Discovers monitored members and compiles their profiles
#[derive(Debug, Clone)]
pub struct ReflectionCache {
    settings: Arc<MonitoringSettings>,
    logger: MonitoringLogger,
    rules: DiscoveryRules,
    filter: AssemblyFilter,
}

impl ReflectionCache {
    pub fn new(
        settings: Arc<MonitoringSettings>,
        logger: MonitoringLogger,
        rules: DiscoveryRules,
    ) -> Self {
        let filter = AssemblyFilter::new(&settings.assemblies);
        Self {
            settings,
            logger,
            rules,
            filter,
        }
    }

    /// Scan every assembly
    ///
    /// Fails only on cancellation or when an error category is configured as
    /// fatal. Incompatible members are skipped and counted.
    pub fn scan(
        &self,
        assemblies: &[Assembly],
        cancel: &AtomicBool,
    ) -> Result<ScanBatch, MonitorError> {
        let mut stats = ScanStats::default();
        let mut table = AccessorTable::new();
        let mut profiles = Vec::new();

        for assembly in assemblies {
            if cancel.load(Ordering::Relaxed) {
                return Err(MonitorError::OperationCanceled);
            }

            if self.filter.is_banned(&assembly.name) {
                tracing::trace!("Skipping banned assembly {}", assembly.name);
                stats.assemblies_skipped += 1;
                continue;
            }

            if let Some(reason) = &assembly.load_error {
                stats.assemblies_skipped += 1;
                self.report(
                    MonitorError::BadImage {
                        assembly: assembly.name.clone(),
                        reason: reason.clone(),
                    },
                    &mut stats,
                )?;
                continue;
            }

            stats.assemblies_scanned += 1;
            for ty in &assembly.types {
                stats.types_scanned += 1;
                for member in &ty.members {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(MonitorError::OperationCanceled);
                    }
                    if let Some(profile) = self.discover(ty, member, &mut table, &mut stats)? {
                        profiles.push(profile);
                    }
                }
            }
        }

        stats.profiles_created = profiles.len();
        tracing::debug!(
            "Scanned {} assemblies: {} profiles, {} incompatible members",
            stats.assemblies_scanned,
            stats.profiles_created,
            stats.incompatible_members
        );

        Ok(ScanBatch {
            profiles,
            table,
            stats,
        })
    }

    /// Build the profile of one member, if it is marked and compatible
    fn discover(
        &self,
        ty: &TypeDecl,
        member: &MemberDecl,
        table: &mut AccessorTable,
        stats: &mut ScanStats,
    ) -> Result<Option<Profile>, MonitorError> {
        let Some(marker) = member.marker else {
            return Ok(None);
        };
        let Some(rule) = self.rules.rule(marker) else {
            return Ok(None);
        };
        stats.members_scanned += 1;

        let value_type = if rule.allowed.contains(&member.kind) {
            member.check(&ty.name)
        } else {
            Err(MonitorError::IncompatibleMember {
                member: format!("{}.{}", ty.name, member.name),
                reason: format!("{:?} cannot be placed on a {}", marker, member.kind),
            })
        };
        let value_type = match value_type {
            Ok(value_type) => value_type,
            Err(e) => {
                tracing::debug!("{}", e);
                stats.incompatible_members += 1;
                return Ok(None);
            }
        };

        let key = MemberKey::new(ty.type_id, &member.name);
        let Some(accessor) = member.accessor.clone() else {
            return Ok(None);
        };
        let inst = Instantiation {
            declaring_type: ty.name.clone(),
            value_type: member
                .signature
                .clone()
                .unwrap_or_else(|| value_type.type_name().to_string()),
            kind: member.kind,
        };
        if !table.insert(key.clone(), accessor.clone(), inst) {
            tracing::trace!("{}.{} already discovered", ty.name, member.name);
            return Ok(None);
        }

        let processor = self.resolve_processor(ty, member, value_type, stats)?;
        let descriptor = MemberDescriptor::new(ty, member, value_type, &self.settings);
        Ok(Some(Profile::new(key, descriptor, accessor, processor)))
    }

    /// Look up the value processor a member refers to
    ///
    /// Missing or mismatched processors fall back to default formatting
    /// unless their category is fatal.
    fn resolve_processor(
        &self,
        ty: &TypeDecl,
        member: &MemberDecl,
        value_type: ValueType,
        stats: &mut ScanStats,
    ) -> Result<Option<Processor>, MonitorError> {
        let Some(name) = &member.attrs.processor else {
            return Ok(None);
        };

        let error = match ty.processors.get(name) {
            Some(decl) if decl.input == value_type => return Ok(Some(decl.func.clone())),
            Some(decl) => MonitorError::InvalidProcessorSignature {
                member: format!("{}.{}", ty.name, member.name),
                processor: name.clone(),
                expected: decl.input.type_name(),
                found: value_type.type_name(),
            },
            None => MonitorError::ProcessorNotFound {
                member: format!("{}.{}", ty.name, member.name),
                processor: name.clone(),
            },
        };
        self.report(error, stats)?;
        Ok(None)
    }

    fn report(&self, error: MonitorError, stats: &mut ScanStats) -> Result<(), MonitorError> {
        stats.errors[error.category().index()] += 1;
        if self.logger.report(&error).is_fatal() {
            Err(error)
        } else {
            Ok(())
        }
    }
}

/// One-shot background scan
///
/// The batch becomes visible only once the whole scan has finished.
/// Dropping the task cancels it.
pub struct ProfilingTask {
    receiver: mpsc::Receiver<Result<ScanBatch, MonitorError>>,
    cancel: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProfilingTask {
    /// Start scanning `assemblies` on a new thread
    pub fn spawn(cache: ReflectionCache, assemblies: Vec<Assembly>) -> Result<Self, MonitorError> {
        let (sender, receiver) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();

        let handle = thread::Builder::new()
            .name("lookout-profiling".to_string())
            .spawn(move || {
                let result = cache.scan(&assemblies, &flag);
                // Receiver gone means the task was dropped
                let _ = sender.send(result);
            })
            .map_err(|e| MonitorError::ThreadAbort(e.to_string()))?;

        Ok(Self {
            receiver,
            cancel,
            handle: Some(handle),
        })
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Non-blocking check for the result
    pub fn poll(&mut self) -> Option<Result<ScanBatch, MonitorError>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.handle.take();
                Some(result)
            }
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(self.abort_reason())),
        }
    }

    /// Block until the scan finishes
    pub fn wait(mut self) -> Result<ScanBatch, MonitorError> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(self.abort_reason()),
        }
    }

    fn abort_reason(&mut self) -> MonitorError {
        match self.handle.take().map(|h| h.join()) {
            Some(Err(payload)) => match MonitorError::from_panic("profiling", payload.as_ref()) {
                MonitorError::Unknown(message) => MonitorError::ThreadAbort(message),
                other => other,
            },
            _ => MonitorError::ThreadAbort("profiling thread exited without a result".to_string()),
        }
    }
}

impl Drop for ProfilingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
