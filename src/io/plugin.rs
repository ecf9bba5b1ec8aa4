//! Plugin registry resolving readers and writers by file extension
//!
//! **Why**: Sessions are codec-agnostic; each plugin turns a file into a
//! `FrameSource` or `FrameSink` and the registry wraps them in sessions.
//!
//! **Used by**: the CLI (`info`, `play`), hosts embedding the library
//!
//! Plugins are matched in registration order; the first plugin accepting a
//! file wins.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use super::image_seq::ImageSequencePlugin;
use super::options::{ReadOptions, WriteOptions};
use crate::core::session::ReadSession;
use crate::core::writer::WriteSession;
use crate::entities::file_info::FileInfo;
use crate::entities::info::Info;
use crate::entities::traits::{FrameSink, FrameSource};
use crate::error::IoError;
use crate::text::{IdentityText, TextResolver, ids};

pub trait IoPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description
    fn info(&self) -> &str;

    /// Lower-case extensions without the dot
    fn file_extensions(&self) -> &[&'static str];

    /// Reads numbered file sequences (as opposed to single containers)
    fn can_sequence(&self) -> bool {
        false
    }

    fn can_read(&self, file: &FileInfo) -> bool {
        self.file_extensions().contains(&file.extension_key().as_str())
    }

    fn can_write(&self, file: &FileInfo, _info: &Info) -> bool {
        self.file_extensions().contains(&file.extension_key().as_str())
    }

    fn read(&self, file: &FileInfo, options: &ReadOptions) -> Result<Box<dyn FrameSource>, IoError>;

    fn write(&self, file: &FileInfo, _info: &Info, _options: &WriteOptions) -> Result<Box<dyn FrameSink>, IoError> {
        Err(IoError::UnsupportedFormat(format!("{} cannot write {}", self.name(), file)))
    }

    /// Plugin settings as JSON
    fn options(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn set_options(&mut self, _options: serde_json::Value) -> Result<(), IoError> {
        Ok(())
    }
}

/// Registered plugins keyed by name
pub struct IoSystem {
    plugins: IndexMap<String, Box<dyn IoPlugin>>,
    text: Arc<dyn TextResolver>,
}

impl IoSystem {
    /// Empty registry
    pub fn new(text: Arc<dyn TextResolver>) -> Self {
        Self {
            plugins: IndexMap::new(),
            text,
        }
    }

    /// Registry with the built-in plugins
    pub fn with_defaults(text: Arc<dyn TextResolver>) -> Self {
        let mut system = Self::new(text);
        system.register(Box::new(ImageSequencePlugin::default()));
        system
    }

    /// Add a plugin; replaces a plugin with the same name
    pub fn register(&mut self, plugin: Box<dyn IoPlugin>) {
        debug!("Registered I/O plugin {} ({})", plugin.name(), plugin.file_extensions().join(", "));
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn file_extensions(&self) -> BTreeSet<String> {
        self.plugins
            .values()
            .flat_map(|p| p.file_extensions().iter().map(|e| e.to_string()))
            .collect()
    }

    /// Extensions of plugins reading numbered sequences
    pub fn sequence_extensions(&self) -> BTreeSet<String> {
        self.plugins
            .values()
            .filter(|p| p.can_sequence())
            .flat_map(|p| p.file_extensions().iter().map(|e| e.to_string()))
            .collect()
    }

    pub fn can_sequence(&self, file: &FileInfo) -> bool {
        self.sequence_extensions().contains(&file.extension_key())
    }

    pub fn can_read(&self, file: &FileInfo) -> bool {
        self.plugins.values().any(|p| p.can_read(file))
    }

    pub fn can_write(&self, file: &FileInfo, info: &Info) -> bool {
        self.plugins.values().any(|p| p.can_write(file, info))
    }

    pub fn options(&self, plugin: &str) -> Option<serde_json::Value> {
        self.plugins.get(plugin).map(|p| p.options())
    }

    pub fn set_options(&mut self, plugin: &str, options: serde_json::Value) -> Result<(), IoError> {
        let p = self
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| IoError::InvalidOptions(format!("Unknown plugin: {}", plugin)))?;
        p.set_options(options)
    }

    /// Open `file` and start its read session
    pub fn read(&self, file: &FileInfo, options: ReadOptions) -> Result<ReadSession, IoError> {
        let plugin = self
            .plugins
            .values()
            .find(|p| p.can_read(file))
            .ok_or_else(|| self.unsupported(file))?;
        debug!("Reading {} with {}", file, plugin.name());
        let source = plugin.read(file, &options)?;
        ReadSession::new(file.clone(), options, source, Arc::clone(&self.text))
    }

    /// Create `file` and start its write session
    pub fn write(&self, file: &FileInfo, info: &Info, options: WriteOptions) -> Result<WriteSession, IoError> {
        let plugin = self
            .plugins
            .values()
            .find(|p| p.can_write(file, info))
            .ok_or_else(|| self.unsupported(file))?;
        debug!("Writing {} with {}", file, plugin.name());
        let sink = plugin.write(file, info, &options)?;
        WriteSession::new(file.clone(), info, options, sink)
    }

    fn unsupported(&self, file: &FileInfo) -> IoError {
        IoError::UnsupportedFormat(format!("{}: {}", self.text.text(ids::ERROR_UNSUPPORTED), file))
    }
}

impl Default for IoSystem {
    fn default() -> Self {
        Self::with_defaults(Arc::new(IdentityText))
    }
}
