//! Subsystem registry
//!
//! The registry is the single context object of a manager process. It owns
//! one instance of every subsystem handler, created together by
//! [`Registry::init_globals`], and hands out shared references to them.
//! Accessors return `None` until initialization has run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use nm_core::config::{self, ManagerConfig};
use nm_core::error::{NmError, RegistryError};
use nm_core::traits::{HistoryStore, HostLookup, NameResolver, Presentation, RemoteShell};

use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownTargets};
use crate::locality::{LocalityResolver, SystemLookup};
use crate::subsystem::{FileWatcher, History, NameResolution, ScreenHandler, SshHandler, StartHandler};
use crate::terminal::TerminalLocator;

/// The subsystem handlers of one process
pub struct Subsystems {
    /// Remote shell sessions
    pub ssh: Arc<SshHandler>,
    /// Screen sessions
    pub screen: Arc<ScreenHandler>,
    /// Node starter
    pub starter: Arc<StartHandler>,
    /// Master URI and host name resolution
    pub nameres: Arc<NameResolution>,
    /// Entered parameter values
    pub history: Arc<History>,
    /// Loaded launch files
    pub file_watcher: Arc<FileWatcher>,
    /// Files referenced by parameter values
    pub file_watcher_param: Arc<FileWatcher>,
    /// Host locality cache
    pub locality: Arc<LocalityResolver>,
    /// Terminal emulator locator
    pub terminal: Arc<TerminalLocator>,
}

/// Process-wide registry of subsystems with a defined init and teardown
pub struct Registry {
    config: ManagerConfig,
    cfg_dir: PathBuf,
    lookup: Option<Arc<dyn HostLookup>>,
    name_resolver: Option<Arc<dyn NameResolver>>,
    subsystems: OnceLock<Subsystems>,
    presentation: RwLock<Option<Arc<dyn Presentation>>>,
    lifecycle: Lifecycle,
}

impl Registry {
    /// Create an uninitialized registry persisting state in `cfg_dir`
    pub fn new(config: ManagerConfig, cfg_dir: PathBuf) -> Self {
        Self {
            config,
            cfg_dir,
            lookup: None,
            name_resolver: None,
            subsystems: OnceLock::new(),
            presentation: RwLock::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Resolve host names through `lookup` instead of the system resolver
    pub fn with_lookup(mut self, lookup: Arc<dyn HostLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Translate the master URI through `resolver` instead of the
    /// registry's own [`NameResolution`]
    pub fn with_name_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.name_resolver = Some(resolver);
        self
    }

    /// Configuration the registry was created with
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Directory holding persisted state
    pub fn cfg_dir(&self) -> &Path {
        &self.cfg_dir
    }

    /// Create all subsystems and warm the locality cache.
    ///
    /// Returns whether the master's host is local, as far as known right
    /// now: a master on this machine reached through a symbolic name reads
    /// `false` until its background resolution completes.
    ///
    /// Fails if called twice, outside a tokio runtime, if the config
    /// directory cannot be created, or if `master_uri` has no host.
    pub async fn init_globals(&self, master_uri: &str) -> Result<bool, NmError> {
        if self.subsystems.get().is_some() {
            return Err(RegistryError::AlreadyInitialized.into());
        }
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        config::ensure_dir(&self.cfg_dir)?;

        let lookup: Arc<dyn HostLookup> = match &self.lookup {
            Some(lookup) => Arc::clone(lookup),
            None => Arc::new(SystemLookup::discover(self.config.resolve_timeout()).await),
        };

        let subsystems = Subsystems {
            ssh: Arc::new(SshHandler::from_config(&self.config)),
            screen: Arc::new(ScreenHandler::new(&self.cfg_dir)),
            starter: Arc::new(StartHandler::new()),
            nameres: Arc::new(NameResolution::new()),
            history: Arc::new(History::from_config(&self.cfg_dir, &self.config)),
            file_watcher: Arc::new(FileWatcher::new()),
            file_watcher_param: Arc::new(FileWatcher::new()),
            locality: Arc::new(
                LocalityResolver::new(lookup, runtime).with_timeout(self.config.resolve_timeout()),
            ),
            terminal: Arc::new(TerminalLocator::from_config(&self.config)),
        };
        self.subsystems
            .set(subsystems)
            .map_err(|_| RegistryError::AlreadyInitialized)?;
        let subsystems = self.subsystems()?;

        match subsystems.history.load() {
            Ok(keys) => tracing::debug!("History restored for {} keys", keys),
            Err(e) => tracing::warn!("Ignoring unreadable history: {}", e),
        }

        subsystems.locality.prewarm("localhost");
        let names: &dyn NameResolver = match &self.name_resolver {
            Some(resolver) => resolver.as_ref(),
            None => subsystems.nameres.as_ref(),
        };
        let master_host = names.get_hostname(master_uri)?;
        subsystems.locality.prewarm(&master_host);

        let local_master = subsystems.locality.is_local(&master_host);
        tracing::info!(
            "Subsystems initialized (master {} on {}, local: {})",
            master_uri,
            master_host,
            local_master
        );
        Ok(local_master)
    }

    /// All subsystems, or an error before `init_globals`
    pub fn subsystems(&self) -> Result<&Subsystems, RegistryError> {
        self.subsystems.get().ok_or(RegistryError::NotInitialized)
    }

    /// Whether `init_globals` has completed
    pub fn is_initialized(&self) -> bool {
        self.subsystems.get().is_some()
    }

    /// Remote shell handler, `None` before initialization
    pub fn ssh(&self) -> Option<&Arc<SshHandler>> {
        self.subsystems.get().map(|s| &s.ssh)
    }

    /// Screen session handler
    pub fn screen(&self) -> Option<&Arc<ScreenHandler>> {
        self.subsystems.get().map(|s| &s.screen)
    }

    /// Node starter
    pub fn starter(&self) -> Option<&Arc<StartHandler>> {
        self.subsystems.get().map(|s| &s.starter)
    }

    /// Master URI and host name resolution
    pub fn nameres(&self) -> Option<&Arc<NameResolution>> {
        self.subsystems.get().map(|s| &s.nameres)
    }

    /// Parameter value history
    pub fn history(&self) -> Option<&Arc<History>> {
        self.subsystems.get().map(|s| &s.history)
    }

    /// Watcher of loaded launch files
    pub fn file_watcher(&self) -> Option<&Arc<FileWatcher>> {
        self.subsystems.get().map(|s| &s.file_watcher)
    }

    /// Watcher of files referenced by parameters
    pub fn file_watcher_param(&self) -> Option<&Arc<FileWatcher>> {
        self.subsystems.get().map(|s| &s.file_watcher_param)
    }

    /// Host locality resolver
    pub fn locality(&self) -> Option<&Arc<LocalityResolver>> {
        self.subsystems.get().map(|s| &s.locality)
    }

    /// Terminal emulator locator
    pub fn terminal(&self) -> Option<&Arc<TerminalLocator>> {
        self.subsystems.get().map(|s| &s.terminal)
    }

    /// Whether `hostname` is this machine; see [`LocalityResolver::is_local`].
    ///
    /// Before initialization only the empty host name counts as local.
    pub fn is_local(&self, hostname: &str) -> bool {
        match self.locality() {
            Some(locality) => locality.is_local(hostname),
            None => hostname.is_empty(),
        }
    }

    /// Register the presentation layer told about shutdown
    pub fn set_presentation(&self, presentation: Arc<dyn Presentation>) {
        *self.presentation.write() = Some(presentation);
    }

    /// Token cancelled when the event loop should stop
    pub fn event_loop_token(&self) -> CancellationToken {
        self.lifecycle.event_loop_token()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Tear down all subsystems; see [`Lifecycle::shutdown`]
    pub async fn shutdown(&self) {
        let subsystems = self.subsystems.get();
        let presentation = self.presentation.read().clone();
        let targets = ShutdownTargets {
            shell: subsystems.map(|s| s.ssh.as_ref() as &dyn RemoteShell),
            history: subsystems.map(|s| s.history.as_ref() as &dyn HistoryStore),
            presentation: presentation.as_deref(),
        };
        self.lifecycle.shutdown(targets).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_before_init() {
        let registry = Registry::new(ManagerConfig::default(), PathBuf::from("/nonexistent"));
        assert!(!registry.is_initialized());
        assert!(registry.ssh().is_none());
        assert!(registry.history().is_none());
        assert!(registry.file_watcher_param().is_none());
        assert!(matches!(
            registry.subsystems(),
            Err(RegistryError::NotInitialized)
        ));
        assert!(registry.is_local(""));
        assert!(!registry.is_local("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_shutdown_before_init() {
        let registry = Registry::new(ManagerConfig::default(), PathBuf::from("/nonexistent"));
        registry.shutdown().await;
        assert_eq!(registry.state(), LifecycleState::Terminated);
        assert!(registry.event_loop_token().is_cancelled());
    }
}
