//! Script processor stage.

use crate::program::ScriptProgram;
use crate::stage::ScriptStage;
use async_trait::async_trait;
use sb_error::Result;
use sb_traits::{Processor, ResourceProvider};
use sb_types::{Message, ScriptConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs a script against each message in place.
///
/// The script mutates the message through host functions; whatever state the
/// message is in when the script finishes is forwarded. A script fault drops
/// the message and returns the error.
pub struct ScriptProcessor {
    stage: Arc<ScriptStage>,
    name: String,
}

impl std::fmt::Debug for ScriptProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptProcessor")
            .field("name", &self.name)
            .field("script", &self.stage.program().name())
            .finish_non_exhaustive()
    }
}

impl ScriptProcessor {
    /// Creates a processor from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be loaded or compiled.
    pub async fn new(config: &ScriptConfig, resources: Arc<dyn ResourceProvider>) -> Result<Self> {
        let stage = ScriptStage::new(config, resources).await?;
        Ok(Self {
            stage: Arc::new(stage),
            name: "script_processor".to_string(),
        })
    }

    /// Sets the processor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The compiled program.
    pub fn program(&self) -> &ScriptProgram {
        self.stage.program()
    }
}

#[async_trait]
impl Processor for ScriptProcessor {
    async fn process(&self, message: Message) -> Result<Vec<Message>> {
        match self.stage.execute(message, None).await {
            Ok(message) => Ok(vec![message]),
            Err(e) => {
                warn!(processor = %self.name, error = %e, "Script failed, message not forwarded");
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        debug!(processor = %self.name, "Closing script processor");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
