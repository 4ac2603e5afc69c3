//! Shared execution core of the processor and output stages.

use crate::bridge::{register_host_functions, HostContext};
use crate::console::register_console;
use crate::output::OutputChannels;
use crate::program::{create_engine, ScriptProgram};
use parking_lot::Mutex;
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::packages::{Package, StandardPackage};
use rhai::{Engine, Scope};
use sb_error::{BridgeError, Result, ScriptError};
use sb_traits::ResourceProvider;
use sb_types::{EngineLimits, Message, ScriptConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace};

/// Compiled program plus everything needed to run it against a message.
///
/// Executions are serialized by a stage-wide lock, so host functions of two
/// messages never interleave.
pub(crate) struct ScriptStage {
    program: ScriptProgram,
    cache_res: Arc<Vec<String>>,
    global_folders: Vec<PathBuf>,
    limits: EngineLimits,
    package: StandardPackage,
    resources: Arc<dyn ResourceProvider>,
    http: reqwest::Client,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl ScriptStage {
    pub(crate) async fn new(
        config: &ScriptConfig,
        resources: Arc<dyn ResourceProvider>,
    ) -> Result<Self> {
        let program = ScriptProgram::load(config).await?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        debug!(
            script = %program.name(),
            cache_res = ?config.cache_res,
            global_folders = ?config.registry_global_folders,
            "Created script stage"
        );

        Ok(Self {
            program,
            cache_res: Arc::new(config.cache_res.clone()),
            global_folders: config
                .registry_global_folders
                .iter()
                .map(PathBuf::from)
                .collect(),
            limits: config.limits,
            package: StandardPackage::new(),
            resources,
            http,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub(crate) fn program(&self) -> &ScriptProgram {
        &self.program
    }

    /// Runs the program against `message` and returns the mutated message.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        message: Message,
        outputs: Option<Arc<OutputChannels>>,
    ) -> Result<Message> {
        let guard = self.lock_executions().await;
        self.execute_locked(guard, message, outputs).await
    }

    /// Waits for the stage-wide execution lock.
    ///
    /// No script runs while the returned guard is held elsewhere.
    pub(crate) async fn lock_executions(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lock).lock_owned().await
    }

    /// Runs the program under an already acquired execution lock.
    ///
    /// The guard moves into the blocking task, so it is held until the
    /// script finishes even if the caller stops waiting.
    pub(crate) async fn execute_locked(
        self: &Arc<Self>,
        guard: OwnedMutexGuard<()>,
        message: Message,
        outputs: Option<Arc<OutputChannels>>,
    ) -> Result<Message> {
        let stage = Arc::clone(self);
        let runtime = Handle::current();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            stage.run(message, outputs, runtime)
        })
        .await
        .map_err(|e| BridgeError::Other(anyhow::anyhow!("script task failed: {e}")))?
    }

    fn run(
        &self,
        message: Message,
        outputs: Option<Arc<OutputChannels>>,
        runtime: Handle,
    ) -> Result<Message> {
        let shared = Arc::new(Mutex::new(message));
        let ctx = Arc::new(HostContext::new(
            Arc::clone(&shared),
            Arc::clone(&self.cache_res),
            Arc::clone(&self.resources),
            self.http.clone(),
            outputs,
            runtime,
        ));

        let result = {
            let engine = self.build_engine(&ctx);
            engine.run_ast_with_scope(&mut Scope::new(), self.program.ast())
        };
        drop(ctx);

        result.map_err(|e| ScriptError::Execution(format!("{}: {e}", self.program.name())))?;

        trace!(script = %self.program.name(), "Script executed");

        Ok(Arc::try_unwrap(shared)
            .map(Mutex::into_inner)
            .unwrap_or_else(|shared| shared.lock().clone()))
    }

    fn build_engine(&self, ctx: &Arc<HostContext>) -> Engine {
        let mut engine = create_engine(&self.limits);
        engine.register_global_module(self.package.as_shared_module());
        engine.set_module_resolver(self.module_resolver());
        register_console(&mut engine);
        register_host_functions(&mut engine, ctx);
        engine
    }

    /// Resolves imports from the configured folders, or the working directory.
    fn module_resolver(&self) -> ModuleResolversCollection {
        let mut resolvers = ModuleResolversCollection::new();
        if self.global_folders.is_empty() {
            resolvers.push(FileModuleResolver::new());
        } else {
            for folder in &self.global_folders {
                resolvers.push(FileModuleResolver::new_with_path(folder.clone()));
            }
        }
        resolvers
    }
}
