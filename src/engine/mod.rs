//! # Feature: Response Engines
//!
//! The two chat personalities behind one interface. Each engine lives in a
//! single [`EngineHandle`] shared by every conversation; the handle serializes
//! access so a reply and the state write that follows it never interleave with
//! another turn.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: ALICE (AIML) and ELIZA engines with shared, serialized handles

pub mod aiml;
pub mod eliza;

pub use aiml::AimlEngine;
pub use eliza::ElizaEngine;

use anyhow::Result;
use log::error;
use serenity::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Words beyond this are dropped before an engine sees the input.
pub const MAX_INPUT_WORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Alice,
    Eliza,
}

impl EngineKind {
    /// Parses the command group name (`alice`, `eliza`), case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("alice") {
            Some(EngineKind::Alice)
        } else if name.eq_ignore_ascii_case("eliza") {
            Some(EngineKind::Eliza)
        } else {
            None
        }
    }

    /// Command group name.
    pub fn command_name(&self) -> &'static str {
        match self {
            EngineKind::Alice => "alice",
            EngineKind::Eliza => "eliza",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Alice => write!(f, "ALICE"),
            EngineKind::Eliza => write!(f, "ELIZA"),
        }
    }
}

/// A chat personality.
#[async_trait]
pub trait ResponseEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn respond(&mut self, input: &str) -> Result<String>;

    /// Writes durable state. Engines without any keep the default no-op.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    /// Throws away learned state and starts over from the defaults.
    async fn reset(&mut self) -> Result<()> {
        anyhow::bail!("{} has no learned state to reset", self.kind())
    }
}

/// Shared, serialized access to one engine instance.
#[derive(Clone)]
pub struct EngineHandle {
    kind: EngineKind,
    engine: Arc<Mutex<Box<dyn ResponseEngine>>>,
}

impl EngineHandle {
    pub fn new(engine: impl ResponseEngine + 'static) -> Self {
        EngineHandle {
            kind: engine.kind(),
            engine: Arc::new(Mutex::new(Box::new(engine))),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Gets a reply and persists the engine's state while holding the lock.
    /// A failed write is logged; the reply is still returned.
    pub async fn respond(&self, input: &str) -> Result<String> {
        let input = clip_words(input, MAX_INPUT_WORDS);
        let mut engine = self.engine.lock().await;
        let reply = engine.respond(&input)?;

        if let Err(e) = engine.persist().await {
            error!("❌ Failed to persist {} state: {:#}", self.kind, e);
        }

        Ok(reply)
    }

    pub async fn reset(&self) -> Result<()> {
        self.engine.lock().await.reset().await
    }
}

fn clip_words(input: &str, limit: usize) -> Cow<'_, str> {
    if input.split_whitespace().nth(limit).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.split_whitespace().take(limit).collect::<Vec<_>>().join(" "))
}

/// The process-wide set of engines, one per kind.
#[derive(Clone)]
pub struct Engines {
    alice: EngineHandle,
    eliza: EngineHandle,
}

impl Engines {
    pub fn new(alice: EngineHandle, eliza: EngineHandle) -> Self {
        Engines { alice, eliza }
    }

    pub fn get(&self, kind: EngineKind) -> &EngineHandle {
        match kind {
            EngineKind::Alice => &self.alice,
            EngineKind::Eliza => &self.eliza,
        }
    }

    /// The engine used for mentions and the top-level `speak` command.
    pub fn default_engine(&self) -> &EngineHandle {
        &self.alice
    }
}
